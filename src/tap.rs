//! TAP controller states and the stimulus vectors that walk through them.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TapState {
    TestLogicReset,
    RunTestIdle,
    SelectDrScan,
    CaptureDr,
    ShiftDr,
    Exit1Dr,
    PauseDr,
    Exit2Dr,
    UpdateDr,
    SelectIrScan,
    CaptureIr,
    ShiftIr,
    Exit1Ir,
    PauseIr,
    Exit2Ir,
    UpdateIr,
}

impl TapState {
    /// IEEE 1149.1 transition on a rising TCK edge with the given TMS.
    pub fn next(self, tms: bool) -> TapState {
        use TapState::*;
        match (self, tms) {
            (TestLogicReset, true) => TestLogicReset,
            (TestLogicReset, false) => RunTestIdle,
            (RunTestIdle, true) => SelectDrScan,
            (RunTestIdle, false) => RunTestIdle,

            (SelectDrScan, true) => SelectIrScan,
            (SelectDrScan, false) => CaptureDr,
            (CaptureDr, true) => Exit1Dr,
            (CaptureDr, false) => ShiftDr,
            (ShiftDr, true) => Exit1Dr,
            (ShiftDr, false) => ShiftDr,
            (Exit1Dr, true) => UpdateDr,
            (Exit1Dr, false) => PauseDr,
            (PauseDr, true) => Exit2Dr,
            (PauseDr, false) => PauseDr,
            (Exit2Dr, true) => UpdateDr,
            (Exit2Dr, false) => ShiftDr,
            (UpdateDr, true) => SelectDrScan,
            (UpdateDr, false) => RunTestIdle,

            (SelectIrScan, true) => TestLogicReset,
            (SelectIrScan, false) => CaptureIr,
            (CaptureIr, true) => Exit1Ir,
            (CaptureIr, false) => ShiftIr,
            (ShiftIr, true) => Exit1Ir,
            (ShiftIr, false) => ShiftIr,
            (Exit1Ir, true) => UpdateIr,
            (Exit1Ir, false) => PauseIr,
            (PauseIr, true) => Exit2Ir,
            (PauseIr, false) => PauseIr,
            (Exit2Ir, true) => UpdateIr,
            (Exit2Ir, false) => ShiftIr,
            (UpdateIr, true) => SelectDrScan,
            (UpdateIr, false) => RunTestIdle,
        }
    }

    pub fn name(self) -> &'static str {
        use TapState::*;
        match self {
            TestLogicReset => "test-logic-reset",
            RunTestIdle => "run-test-idle",
            SelectDrScan => "select-dr-scan",
            CaptureDr => "capture-dr",
            ShiftDr => "shift-dr",
            Exit1Dr => "exit1-dr",
            PauseDr => "pause-dr",
            Exit2Dr => "exit2-dr",
            UpdateDr => "update-dr",
            SelectIrScan => "select-ir-scan",
            CaptureIr => "capture-ir",
            ShiftIr => "shift-ir",
            Exit1Ir => "exit1-ir",
            PauseIr => "pause-ir",
            Exit2Ir => "exit2-ir",
            UpdateIr => "update-ir",
        }
    }

    pub fn is_shift(self) -> bool {
        matches!(self, TapState::ShiftDr | TapState::ShiftIr)
    }
}

impl fmt::Display for TapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One (TMS, TDI) pair, applied for one clock period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Vector {
    pub tms: bool,
    pub tdi: bool,
}

impl Vector {
    pub const fn new(tms: bool, tdi: bool) -> Self {
        Vector { tms, tdi }
    }

    /// Input bus encoding: TMS on bit 1, TDI on bit 0.
    pub const fn word(self) -> u32 {
        ((self.tms as u32) << 1) | self.tdi as u32
    }

    /// Decodes the two low bits of an input bus value.
    pub const fn from_word(word: u32) -> Self {
        Vector {
            tms: word & 0b10 != 0,
            tdi: word & 0b01 != 0,
        }
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.tms as u8, self.tdi as u8)
    }
}

/// A vector together with the TAP state its author meant to reach with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    pub phase: TapState,
    pub vector: Vector,
}

impl Step {
    pub const fn new(phase: TapState, tms: u8, tdi: u8) -> Self {
        Step {
            phase,
            vector: Vector::new(tms != 0, tdi != 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_tms_high_reaches_reset_from_anywhere() {
        let all = [
            TapState::RunTestIdle,
            TapState::ShiftDr,
            TapState::PauseIr,
            TapState::UpdateIr,
            TapState::Exit2Dr,
        ];
        for start in all {
            let end = (0..5).fold(start, |s, _| s.next(true));
            assert_eq!(end, TapState::TestLogicReset, "from {}", start);
        }
    }

    #[test]
    fn ir_scan_path() {
        let path = [true, true, false, false];
        let mut state = TapState::RunTestIdle;
        let mut seen = Vec::new();
        for tms in path {
            state = state.next(tms);
            seen.push(state);
        }
        assert_eq!(
            seen,
            [
                TapState::SelectDrScan,
                TapState::SelectIrScan,
                TapState::CaptureIr,
                TapState::ShiftIr
            ]
        );
    }

    #[test]
    fn vector_bus_layout() {
        assert_eq!(Vector::new(true, false).word(), 0b10);
        assert_eq!(Vector::new(false, true).word(), 0b01);
        assert_eq!(Vector::from_word(0b11), Vector::new(true, true));
        assert_eq!(Vector::from_word(0b100), Vector::new(false, false));
    }

    #[test]
    fn phase_names_are_kebab_case_in_config() {
        let parsed: TapState = toml::Value::String("exit2-ir".into()).try_into().unwrap();
        assert_eq!(parsed, TapState::Exit2Ir);
        assert_eq!(parsed.to_string(), "exit2-ir");
    }
}
