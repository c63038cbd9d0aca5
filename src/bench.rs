//! The packaged JTAG bench: signal wiring, clock, monitor and sequencer
//! around one device.

use std::fmt;

use crate::config::{SignalNames, TbConfig};
use crate::error::{TbError, TbResult};
use crate::executor::Task;
use crate::kernel::Simulator;
use crate::model::{tie_off, TapModel, TapPins, TapProbe, DEFAULT_IDCODE};
use crate::rstb_obj::RstbObj;
use crate::script::Script;
use crate::sequencer::{DutPort, Journal, Outcome, Sequencer, SequencerSettings, SimTimebase};
use crate::signal::SimObject;
use crate::tap::Vector;
use crate::test::Test;
use crate::testbench::{clock, Scoreboard, VectorMonitor};
use crate::value::Val;

pub const INPUT_WIDTH: u32 = 8;
pub const OUTPUT_WIDTH: u32 = 8;

/// DUT ports, resolved below the toplevel scope.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DutSignals {
    pub clk: SimObject,
    pub rst_n: SimObject,
    pub ena: SimObject,
    pub inputs: SimObject,
    pub aux: SimObject,
    pub output: SimObject,
}

impl DutSignals {
    pub fn resolve(dut: SimObject, names: &SignalNames) -> TbResult<Self> {
        Ok(DutSignals {
            clk: dut.c(&names.clock)?,
            rst_n: dut.c(&names.reset_n)?,
            ena: dut.c(&names.enable)?,
            inputs: dut.c(&names.inputs)?,
            aux: dut.c(&names.aux_inputs)?,
            output: dut.c(&names.output)?,
        })
    }

    pub fn port(&self) -> DutPort {
        DutPort {
            rst_n: self.rst_n,
            ena: self.ena,
            inputs: self.inputs,
            aux: self.aux,
            output: self.output,
        }
    }

    pub fn tap_pins(&self) -> TapPins {
        TapPins {
            clk: self.clk,
            rst_n: self.rst_n,
            ena: self.ena,
            inputs: self.inputs,
            output: self.output,
        }
    }
}

/// Creates a kernel holding the toplevel scope and the DUT ports.
pub fn build_simulator(cfg: &TbConfig) -> TbResult<Simulator> {
    let sim = Simulator::new(cfg.sim.precision);
    let names = &cfg.signals;
    let top = &names.toplevel;
    sim.add_scope(top)?;
    for (name, width) in [
        (&names.clock, 1),
        (&names.reset_n, 1),
        (&names.enable, 1),
        (&names.inputs, INPUT_WIDTH),
        (&names.aux_inputs, INPUT_WIDTH),
        (&names.output, OUTPUT_WIDTH),
    ] {
        sim.add_signal(&format!("{}.{}", top, name), width)?;
    }
    Ok(sim)
}

/// Device driving the output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModelKind {
    /// Standard TAP controller with IDCODE and BYPASS.
    Tap,
    /// Output constantly 1.
    TieHigh,
    /// Output constantly 0.
    TieLow,
}

impl ModelKind {
    /// Forks the device; a TAP model hands back its state probe.
    pub fn start(self, dut: &DutSignals) -> Option<RstbObj<TapProbe>> {
        match self {
            ModelKind::Tap => {
                let model = TapModel::new(dut.tap_pins(), DEFAULT_IDCODE);
                model.fork();
                Some(model.probe())
            }
            ModelKind::TieHigh => {
                Task::spawn_from_future(tie_off(dut.output, 1), "tie-high");
                None
            }
            ModelKind::TieLow => {
                Task::spawn_from_future(tie_off(dut.output, 0), "tie-low");
                None
            }
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelKind::Tap => "tap",
            ModelKind::TieHigh => "tie-high",
            ModelKind::TieLow => "tie-low",
        };
        f.write_str(s)
    }
}

/// Clock, vector monitor, scoreboard and sequencer for one test.
pub struct JtagTb {
    dut: DutSignals,
    expected: u32,
    monitor: VectorMonitor,
    scoreboard: RstbObj<Scoreboard<Vector>>,
    sequencer: Sequencer<DutPort, SimTimebase>,
}

impl JtagTb {
    /// Forks the clock and the monitor.
    pub fn new(dut: DutSignals, cfg: &TbConfig) -> TbResult<Self> {
        let period = cfg.period_steps()?;
        let settings = SequencerSettings {
            reset_hold: cfg.reset_steps()?,
            checkpoints: cfg.check.checkpoints.clone(),
        };
        Task::spawn_from_future(clock(dut.clk, period, cfg.clock.start_high), "clock");

        let scoreboard = RstbObj::new(Scoreboard::new());
        let monitor = VectorMonitor::new();
        monitor.set_scoreboard(scoreboard.clone());
        monitor.fork(dut.clk, dut.rst_n, dut.ena, dut.inputs);

        let timebase = SimTimebase {
            clk: dut.clk,
            period,
        };
        Ok(JtagTb {
            dut,
            expected: cfg.check.expected,
            monitor,
            scoreboard,
            sequencer: Sequencer::new(dut.port(), timebase, settings),
        })
    }

    pub fn dut(&self) -> &DutSignals {
        &self.dut
    }

    pub fn monitor(&self) -> &VectorMonitor {
        &self.monitor
    }

    pub fn journal(&self) -> Journal {
        self.sequencer.journal()
    }

    /// Runs `script` and checks both the output and what the device sampled.
    pub async fn run(&self, script: &Script) -> TbResult<Outcome> {
        for v in script.vectors() {
            self.scoreboard.get_mut().add_exp(v);
        }
        self.sequencer.run_reset_sequence().await?;
        let start = self
            .journal()
            .stimulus_start
            .ok_or_else(|| TbError::Sequencing("no stimulus start recorded".to_string()))?;
        // the edge at `start` still samples the quiescent bus
        self.monitor.arm(start);

        self.sequencer.run_fixed_sequence(script).await?;
        self.sequencer.settle().await?;
        let observed = self.sequencer.check_output(self.expected)?;

        let sb = self.scoreboard.get();
        if !sb.passed() {
            return Err(TbError::Failed(format!(
                "device did not sample the script as applied: {}",
                sb.result_str()
            )));
        }
        Ok(Outcome {
            observed,
            expected: self.expected,
            cycles: script.len(),
        })
    }
}

/// The JTAG bench as a registered test, returning the observed output.
pub fn jtag_test(name: &str, cfg: TbConfig, model: ModelKind) -> Test {
    Test::new(name, move |dut| {
        let cfg = cfg.clone();
        async move {
            let signals = DutSignals::resolve(dut, &cfg.signals)?;
            model.start(&signals);
            let tb = JtagTb::new(signals, &cfg)?;
            let script = cfg.script()?;
            let outcome = tb.run(&script).await?;
            Ok(Val::Int(outcome.observed as i64))
        }
    })
}

/// The stock test: literal bypass table, expected output from `cfg`.
pub fn bypass_test(cfg: TbConfig, model: ModelKind) -> Test {
    jtag_test("tb_jtag_tap", cfg, model)
}
