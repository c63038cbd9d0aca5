//! Stimulus scripts: ordered, immutable lists of TAP steps.

use once_cell::sync::Lazy;
use std::slice;

use crate::tap::{Step, TapState, TapState::*, Vector};

/// IR update followed by a three bit DR scan, each scan followed by five idle cycles.
pub const BYPASS_STEPS: [Step; 31] = [
    // IR scan
    Step::new(TestLogicReset, 1, 0),
    Step::new(TestLogicReset, 1, 0),
    Step::new(RunTestIdle, 0, 0),
    Step::new(SelectDrScan, 1, 0),
    Step::new(SelectIrScan, 1, 0),
    Step::new(CaptureIr, 0, 0),
    Step::new(ShiftIr, 0, 1),
    Step::new(ShiftIr, 0, 0),
    Step::new(Exit1Ir, 1, 1),
    Step::new(PauseIr, 0, 0),
    Step::new(Exit2Ir, 1, 0),
    Step::new(UpdateIr, 0, 0),
    Step::new(RunTestIdle, 0, 0),
    Step::new(RunTestIdle, 0, 0),
    Step::new(RunTestIdle, 0, 0),
    Step::new(RunTestIdle, 0, 0),
    Step::new(RunTestIdle, 0, 0),
    // DR scan
    Step::new(SelectDrScan, 1, 0),
    Step::new(CaptureDr, 0, 0),
    Step::new(ShiftDr, 0, 1),
    Step::new(ShiftDr, 0, 0),
    Step::new(ShiftDr, 0, 1),
    Step::new(Exit1Dr, 1, 0),
    Step::new(PauseDr, 0, 0),
    Step::new(Exit2Dr, 1, 0),
    Step::new(UpdateDr, 0, 0),
    Step::new(RunTestIdle, 0, 0),
    Step::new(RunTestIdle, 0, 0),
    Step::new(RunTestIdle, 0, 0),
    Step::new(RunTestIdle, 0, 0),
    Step::new(RunTestIdle, 0, 0),
];

/// The literal bypass table as a [`Script`].
pub static BYPASS: Lazy<Script> = Lazy::new(|| Script::new("bypass", BYPASS_STEPS.to_vec()));

/// Place where a script's phase label disagrees with the standard TAP walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Divergence {
    pub index: usize,
    pub labelled: TapState,
    pub actual: TapState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Script {
    name: String,
    steps: Vec<Step>,
}

impl Script {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Script {
            name: name.into(),
            steps,
        }
    }

    pub fn bypass() -> Self {
        BYPASS.clone()
    }

    pub fn builder(name: impl Into<String>) -> ScriptBuilder {
        ScriptBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn iter(&self) -> slice::Iter<'_, Step> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn vectors(&self) -> Vec<Vector> {
        self.steps.iter().map(|s| s.vector).collect()
    }

    /// States a standard TAP controller passes through, one per step.
    pub fn walk(&self, start: TapState) -> Vec<TapState> {
        self.steps
            .iter()
            .scan(start, |state, step| {
                *state = state.next(step.vector.tms);
                Some(*state)
            })
            .collect()
    }

    /// Steps whose label is not the state a standard controller would be in after them.
    pub fn audit(&self, start: TapState) -> Vec<Divergence> {
        self.walk(start)
            .into_iter()
            .zip(&self.steps)
            .enumerate()
            .filter(|(_, (actual, step))| *actual != step.phase)
            .map(|(index, (actual, step))| Divergence {
                index,
                labelled: step.phase,
                actual,
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a Script {
    type Item = &'a Step;
    type IntoIter = slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct ScriptBuilder {
    name: String,
    steps: Vec<Step>,
}

impl ScriptBuilder {
    pub fn cycle(mut self, phase: TapState, tms: u8, tdi: u8) -> Self {
        self.steps.push(Step::new(phase, tms, tdi));
        self
    }

    pub fn idle(mut self, cycles: usize) -> Self {
        self.steps
            .extend(std::iter::repeat(Step::new(RunTestIdle, 0, 0)).take(cycles));
        self
    }

    /// Shifts `bits` LSB first; the last bit is sent with TMS high to leave the shift state.
    pub fn shift(mut self, shift: TapState, exit: TapState, bits: &[u8]) -> Self {
        for (i, bit) in bits.iter().enumerate() {
            let last = i + 1 == bits.len();
            let phase = if last { exit } else { shift };
            self.steps.push(Step::new(phase, last as u8, *bit));
        }
        self
    }

    pub fn build(self) -> Script {
        Script::new(self.name, self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(script: &Script) -> Vec<(u8, u8)> {
        script
            .iter()
            .map(|s| (s.vector.tms as u8, s.vector.tdi as u8))
            .collect()
    }

    #[test]
    fn bypass_table_is_literal() {
        let mut expected = vec![
            (1, 0), (1, 0), (0, 0), (1, 0), (1, 0), (0, 0),
            (0, 1), (0, 0), (1, 1), (0, 0), (1, 0), (0, 0),
        ];
        expected.extend([(0, 0); 5]);
        expected.extend([
            (1, 0), (0, 0), (0, 1), (0, 0), (0, 1), (1, 0), (0, 0), (1, 0), (0, 0),
        ]);
        expected.extend([(0, 0); 5]);
        assert_eq!(pairs(&Script::bypass()), expected);
        assert_eq!(Script::bypass().len(), 31);
    }

    #[test]
    fn labels_follow_the_standard_until_the_ir_update() {
        let divergences = Script::bypass().audit(TapState::TestLogicReset);
        let first = divergences[0];
        // exit2-ir with TMS low goes back to shift-ir, not update-ir
        assert_eq!(
            first,
            Divergence {
                index: 11,
                labelled: TapState::UpdateIr,
                actual: TapState::ShiftIr
            }
        );
    }

    #[test]
    fn bypass_script_ends_in_pause_ir_on_a_standard_tap() {
        let walk = Script::bypass().walk(TapState::TestLogicReset);
        assert_eq!(walk.len(), 31);
        assert_eq!(walk.last(), Some(&TapState::PauseIr));
    }

    #[test]
    fn builder_produces_a_consistent_ir_scan() {
        let script = Script::builder("ir")
            .cycle(TapState::TestLogicReset, 1, 0)
            .cycle(TapState::RunTestIdle, 0, 0)
            .cycle(TapState::SelectDrScan, 1, 0)
            .cycle(TapState::SelectIrScan, 1, 0)
            .cycle(TapState::CaptureIr, 0, 0)
            .cycle(TapState::ShiftIr, 0, 0)
            .shift(TapState::ShiftIr, TapState::Exit1Ir, &[1, 1])
            .cycle(TapState::UpdateIr, 1, 0)
            .idle(2)
            .build();
        assert_eq!(script.len(), 11);
        assert!(script.audit(TapState::TestLogicReset).is_empty());
    }
}
