//! Behavioural device models, run as forked tasks next to the testbench.
//!
//! They stand in for the HDL design when no external simulator is attached.

use crate::error::TbResult;
use crate::executor::{JoinHandle, Task};
use crate::rstb_obj::RstbObj;
use crate::signal::SimObject;
use crate::tap::{TapState, Vector};
use crate::value::Val;

pub const IR_LEN: u32 = 2;
pub const IR_IDCODE: u32 = 0b01;
pub const IR_BYPASS: u32 = 0b11;
pub const DEFAULT_IDCODE: u32 = 0x1000_0001;

/// Internal state of [`TapModel`], readable from tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapProbe {
    pub state: TapState,
    pub ir: u32,
    pub ir_shift: u32,
    pub dr_shift: u32,
    pub tdo: bool,
    pub edges: u64,
}

impl TapProbe {
    fn reset() -> Self {
        TapProbe {
            state: TapState::TestLogicReset,
            ir: IR_IDCODE,
            ir_shift: 0,
            dr_shift: 0,
            tdo: false,
            edges: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TapPins {
    pub clk: SimObject,
    pub rst_n: SimObject,
    pub ena: SimObject,
    pub inputs: SimObject,
    pub output: SimObject,
}

/// Standard TAP controller with a two bit IR, an IDCODE and a bypass register.
///
/// TMS and TDI are taken from bits 1 and 0 of the input bus on the rising
/// edge; TDO is driven on bit 0 of the output on the falling edge and is low
/// outside of the shift states.
#[derive(Clone)]
pub struct TapModel {
    pins: TapPins,
    idcode: u32,
    probe: RstbObj<TapProbe>,
}

impl TapModel {
    pub fn new(pins: TapPins, idcode: u32) -> Self {
        TapModel {
            pins,
            idcode,
            probe: RstbObj::new(TapProbe::reset()),
        }
    }

    pub fn probe(&self) -> RstbObj<TapProbe> {
        self.probe.clone()
    }

    pub fn fork(&self) -> JoinHandle {
        Task::spawn_from_future(self.clone().exec(), "tap model")
    }

    fn dr_len(ir: u32) -> u32 {
        match ir {
            IR_IDCODE => 32,
            _ => 1,
        }
    }

    fn posedge(&self, p: &mut TapProbe, v: Vector) {
        let tdi = v.tdi as u32;
        match p.state {
            TapState::TestLogicReset => p.ir = IR_IDCODE,
            TapState::CaptureIr => p.ir_shift = 0b01,
            TapState::ShiftIr => p.ir_shift = (p.ir_shift >> 1) | (tdi << (IR_LEN - 1)),
            TapState::UpdateIr => p.ir = p.ir_shift,
            TapState::CaptureDr => {
                p.dr_shift = match p.ir {
                    IR_IDCODE => self.idcode,
                    _ => 0,
                }
            }
            TapState::ShiftDr => {
                let len = TapModel::dr_len(p.ir);
                p.dr_shift = (p.dr_shift >> 1) | (tdi << (len - 1));
            }
            _ => {}
        }
        p.state = p.state.next(v.tms);
    }

    fn negedge(p: &mut TapProbe) {
        p.tdo = match p.state {
            TapState::ShiftIr => p.ir_shift & 1 != 0,
            TapState::ShiftDr => p.dr_shift & 1 != 0,
            _ => false,
        };
    }

    #[allow(unreachable_code)]
    async fn exec(self) -> TbResult {
        let TapPins {
            clk,
            rst_n,
            ena,
            inputs,
            output,
        } = self.pins;
        loop {
            clk.edge().await?;
            let rising = clk.u32()? & 1 == 1;
            let reset = rst_n.u32()? == 0;
            let enabled = ena.u32()? != 0;
            let v = Vector::from_word(inputs.u32()?);
            let tdo = self.probe.with_mut(|p| {
                if reset {
                    *p = TapProbe { edges: p.edges, ..TapProbe::reset() };
                } else if enabled {
                    if rising {
                        self.posedge(p, v);
                        p.edges += 1;
                    } else {
                        TapModel::negedge(p);
                    }
                }
                p.tdo
            });
            output.set(tdo as u32)?;
        }
        Ok(Val::None)
    }
}

/// Drives a constant on the output and returns.
pub async fn tie_off(output: SimObject, value: u32) -> TbResult {
    output.set(value)?;
    Ok(Val::Int(value as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor;
    use crate::kernel::Simulator;
    use crate::trigger::{self, Trigger};

    fn setup() -> (Simulator, TapPins) {
        let sim = Simulator::new(-9);
        sim.add_scope("tb").unwrap();
        for (name, width) in [("clk", 1), ("rst_n", 1), ("ena", 1), ("ui_in", 8), ("uo_out", 8)] {
            sim.add_signal(&format!("tb.{}", name), width).unwrap();
        }
        sim.install();
        let root = crate::signal::SimObject::get_root().unwrap();
        let pins = TapPins {
            clk: root.c("clk").unwrap(),
            rst_n: root.c("rst_n").unwrap(),
            ena: root.c("ena").unwrap(),
            inputs: root.c("ui_in").unwrap(),
            output: root.c("uo_out").unwrap(),
        };
        (sim, pins)
    }

    fn teardown(sim: &Simulator) {
        trigger::cancel_all_triggers();
        executor::clear();
        sim.uninstall();
    }

    /// Drives `tms`/`tdi` pairs with a 10 step clock, first pair after reset.
    async fn drive(pins: TapPins, pairs: Vec<(u8, u8)>) -> TbResult {
        pins.ena.set(1)?;
        pins.rst_n.set(0)?;
        Trigger::timer_steps(5).await?;
        pins.rst_n.set(1)?;
        for (tms, tdi) in pairs {
            pins.inputs.set(Vector::new(tms != 0, tdi != 0).word())?;
            Trigger::timer_steps(5).await?;
            pins.clk.set(1)?;
            Trigger::timer_steps(5).await?;
            pins.clk.set(0)?;
        }
        Trigger::timer_steps(1).await?;
        Ok(Val::None)
    }

    #[test]
    fn reads_idcode_after_reset() {
        let (sim, pins) = setup();
        let model = TapModel::new(pins, DEFAULT_IDCODE);
        model.fork();
        let tdo = RstbObj::new(Vec::new());
        let seen = tdo.clone();
        // reset -> idle -> select-dr -> capture-dr -> shift-dr, then 32 shifts
        let mut pairs = vec![(1, 0), (0, 0), (1, 0), (0, 0), (0, 0)];
        pairs.extend(std::iter::repeat((0, 0)).take(32));
        Task::fork(async move {
            loop {
                pins.clk.falling_edge().await?;
                Trigger::read_only().await?;
                seen.get_mut().push(pins.output.u32()?);
            }
        });
        let mut driver = Task::fork(drive(pins, pairs));
        sim.run_until(|| false, Some(10_000));
        assert!(driver.try_result().is_some());

        // first bit appears on the falling edge after entering shift-dr
        let bits = tdo.get()[4..36].to_vec();
        let word = bits
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, b)| acc | (b << i));
        assert_eq!(word, DEFAULT_IDCODE);
        teardown(&sim);
    }

    #[test]
    fn bypass_delays_tdi_by_one_cycle() {
        let (sim, pins) = setup();
        let model = TapModel::new(pins, DEFAULT_IDCODE);
        let probe = model.probe();
        model.fork();
        let tdo = RstbObj::new(Vec::new());
        let seen = tdo.clone();
        let mut pairs = vec![
            // load BYPASS into the IR
            (0, 0), (1, 0), (1, 0), (0, 0), (0, 0), (0, 1), (1, 1), (1, 0),
            // to shift-dr
            (1, 0), (0, 0), (0, 0),
        ];
        let data = [1, 0, 1, 1, 0];
        pairs.extend(data.iter().map(|b| (0, *b)));
        Task::fork(async move {
            loop {
                pins.clk.falling_edge().await?;
                Trigger::read_only().await?;
                seen.get_mut().push(pins.output.u32()?);
            }
        });
        Task::fork(drive(pins, pairs));
        sim.run_until(|| false, Some(10_000));

        assert_eq!(probe.get().ir, IR_BYPASS);
        assert_eq!(probe.get().state, TapState::ShiftDr);
        // capture-dr loads 0, then each bit comes back one edge later
        let tail: Vec<u32> = tdo.get()[11..].to_vec();
        assert_eq!(tail, vec![1, 0, 1, 1, 0]);
        teardown(&sim);
    }
}
