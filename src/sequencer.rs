//! Stimulus sequencer: drives TAP vectors into a device, one per clock
//! period, and checks its output at the end.
//!
//! The sequencer only knows two capabilities, the device pins ([`TapPort`])
//! and a source of time ([`Timebase`]). [`DutPort`] and [`SimTimebase`] bind
//! them to simulator signals; tests bind them to fast-forward doubles.

use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};

use crate::error::{TbError, TbResult};
use crate::signal::SimObject;
use crate::sim_if::sim_if;
use crate::script::Script;
use crate::tap::{TapState, Vector};
use crate::trigger::Trigger;

/// Pins of the device under test, as seen by the sequencer.
pub trait TapPort {
    fn drive_reset(&self, asserted: bool) -> TbResult<()>;
    fn drive_enable(&self, on: bool) -> TbResult<()>;
    /// Combined input bus, TMS on bit 1, TDI on bit 0.
    fn drive_inputs(&self, word: u32) -> TbResult<()>;
    /// Auxiliary inputs, unused by the TAP and held at zero.
    fn drive_aux(&self, word: u32) -> TbResult<()>;
    fn sample_output(&self) -> TbResult<u32>;
}

/// Source of time the sequencer synchronises to.
pub trait Timebase {
    /// Current time in steps.
    fn now(&self) -> TbResult<u64>;
    fn period_steps(&self) -> u64;
    fn wait(&self, steps: u64) -> LocalBoxFuture<'static, TbResult<()>>;
    /// Resolves on the next rising clock edge.
    fn next_edge(&self) -> LocalBoxFuture<'static, TbResult<()>>;
    /// Resolves once the outputs reacting to the last edge are stable.
    fn settle(&self) -> LocalBoxFuture<'static, TbResult<()>>;

    fn advance_one_period(&self) -> LocalBoxFuture<'static, TbResult<()>> {
        let wait = self.wait(self.period_steps());
        let edge = self.next_edge();
        async move {
            wait.await?;
            edge.await
        }
        .boxed_local()
    }
}

/// [`TapPort`] over simulator signals.
#[derive(Clone, Copy, Debug)]
pub struct DutPort {
    pub rst_n: SimObject,
    pub ena: SimObject,
    pub inputs: SimObject,
    pub aux: SimObject,
    pub output: SimObject,
}

impl TapPort for DutPort {
    fn drive_reset(&self, asserted: bool) -> TbResult<()> {
        // active low
        self.rst_n.set(!asserted as u32)
    }

    fn drive_enable(&self, on: bool) -> TbResult<()> {
        self.ena.set(on as u32)
    }

    fn drive_inputs(&self, word: u32) -> TbResult<()> {
        self.inputs.set(word)
    }

    fn drive_aux(&self, word: u32) -> TbResult<()> {
        self.aux.set(word)
    }

    fn sample_output(&self) -> TbResult<u32> {
        self.output.u32()
    }
}

/// [`Timebase`] over the simulator clock: timers plus rising edges of `clk`.
#[derive(Clone, Copy, Debug)]
pub struct SimTimebase {
    pub clk: SimObject,
    pub period: u64,
}

impl Timebase for SimTimebase {
    fn now(&self) -> TbResult<u64> {
        Ok(sim_if()?.get_sim_time_steps())
    }

    fn period_steps(&self) -> u64 {
        self.period
    }

    fn wait(&self, steps: u64) -> LocalBoxFuture<'static, TbResult<()>> {
        Trigger::timer_steps(steps).boxed_local()
    }

    fn next_edge(&self) -> LocalBoxFuture<'static, TbResult<()>> {
        self.clk.rising_edge().boxed_local()
    }

    fn settle(&self) -> LocalBoxFuture<'static, TbResult<()>> {
        Trigger::read_write().boxed_local()
    }
}

/// Intermediate observation point, evaluated after step `after` (zero based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Checkpoint {
    pub after: usize,
    pub expected: u32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerSettings {
    pub reset_hold: u64,
    pub checkpoints: Vec<Checkpoint>,
}

/// What the sequencer did and when, in timebase steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Journal {
    pub reset_asserted_at: Option<u64>,
    pub reset_released_at: Option<u64>,
    pub stimulus_start: Option<u64>,
    pub applied: Vec<(u64, Vector)>,
    pub checkpoints: Vec<(u64, String, u32)>,
    pub checked_at: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Idle,
    InReset,
    Ready,
    Running,
    Complete,
    Checked,
}

/// Result of a passing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub observed: u32,
    pub expected: u32,
    pub cycles: usize,
}

pub struct Sequencer<P, T> {
    port: P,
    timebase: T,
    settings: SequencerSettings,
    progress: Cell<Progress>,
    journal: RefCell<Journal>,
}

impl<P: TapPort, T: Timebase> Sequencer<P, T> {
    pub fn new(port: P, timebase: T, settings: SequencerSettings) -> Self {
        Sequencer {
            port,
            timebase,
            settings,
            progress: Cell::new(Progress::Idle),
            journal: RefCell::new(Journal::default()),
        }
    }

    pub fn journal(&self) -> Journal {
        self.journal.borrow().clone()
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    fn violation(&self, what: &str) -> TbError {
        TbError::Sequencing(format!("{} (sequencer is {:?})", what, self.progress.get()))
    }

    /// Puts `v` on the input bus for the coming period.
    pub fn apply_vector(&self, v: Vector) -> TbResult<()> {
        match self.progress.get() {
            Progress::Ready | Progress::Running | Progress::Complete => {}
            Progress::InReset => return Err(self.violation("vector applied while reset is asserted")),
            Progress::Idle => return Err(self.violation("vector applied before reset sequence")),
            Progress::Checked => return Err(self.violation("vector applied after the final check")),
        }
        self.port.drive_inputs(v.word())?;
        self.progress.set(Progress::Running);
        let now = self.timebase.now()?;
        self.journal.borrow_mut().applied.push((now, v));
        Ok(())
    }

    /// Waits one full period and then for the next rising edge.
    pub async fn await_period_boundary(&self) -> TbResult<()> {
        self.timebase.advance_one_period().await
    }

    pub async fn run_cycle(&self, v: Vector) -> TbResult<()> {
        self.apply_vector(v)?;
        self.await_period_boundary().await
    }

    /// Holds reset for the configured time with all inputs quiet, releases
    /// it and waits for one rising edge.
    pub async fn run_reset_sequence(&self) -> TbResult<()> {
        if self.progress.get() == Progress::Checked {
            return Err(self.violation("reset requested after the final check"));
        }
        self.port.drive_reset(true)?;
        self.progress.set(Progress::InReset);
        self.port.drive_enable(true)?;
        self.port.drive_inputs(0)?;
        self.port.drive_aux(0)?;
        self.journal.borrow_mut().reset_asserted_at = Some(self.timebase.now()?);

        self.timebase.wait(self.settings.reset_hold).await?;
        self.port.drive_reset(false)?;
        self.journal.borrow_mut().reset_released_at = Some(self.timebase.now()?);
        self.timebase.next_edge().await?;

        self.progress.set(Progress::Ready);
        let now = self.timebase.now()?;
        self.journal.borrow_mut().stimulus_start = Some(now);
        log::info!("reset deasserted, starting test sequence");
        Ok(())
    }

    /// Applies every step of `script` in order, one per period.
    pub async fn run_fixed_sequence(&self, script: &Script) -> TbResult<()> {
        match self.progress.get() {
            Progress::Ready | Progress::Complete => {}
            _ => return Err(self.violation("sequence started without a completed reset")),
        }
        let divergences = script.audit(TapState::TestLogicReset);
        if let Some(first) = divergences.first() {
            log::warn!(
                "script '{}': {} step(s) labelled differently from the standard TAP walk, first at step {} ({} vs {})",
                script.name(),
                divergences.len(),
                first.index,
                first.labelled,
                first.actual
            );
        }
        for (i, step) in script.iter().enumerate() {
            log::debug!("step {:2}: {:<16} {}", i, step.phase, step.vector);
            self.run_cycle(step.vector).await?;
            for cp in self.settings.checkpoints.iter().filter(|cp| cp.after == i) {
                self.check_point(cp).await?;
            }
        }
        self.progress.set(Progress::Complete);
        Ok(())
    }

    async fn check_point(&self, cp: &Checkpoint) -> TbResult<()> {
        self.timebase.settle().await?;
        let observed = self.port.sample_output()?;
        let now = self.timebase.now()?;
        self.journal
            .borrow_mut()
            .checkpoints
            .push((now, cp.label.clone(), observed));
        if observed == cp.expected {
            log::info!("checkpoint '{}' passed: {}", cp.label, observed);
            Ok(())
        } else {
            Err(TbError::mismatch(
                format!("checkpoint '{}'", cp.label),
                cp.expected,
                observed,
            ))
        }
    }

    /// Samples the output once and compares it to `expected`.
    ///
    /// Only valid once, after a completed sequence.
    pub fn check_output(&self, expected: u32) -> TbResult<u32> {
        if self.progress.get() != Progress::Complete {
            return Err(self.violation("output checked outside of a completed sequence"));
        }
        self.progress.set(Progress::Checked);
        let observed = self.port.sample_output()?;
        self.journal.borrow_mut().checked_at = Some(self.timebase.now()?);
        log::info!("output observed: {}", observed);
        if observed == expected {
            Ok(observed)
        } else {
            Err(TbError::mismatch("output", expected, observed))
        }
    }

    /// Waits until the device outputs have reacted to the last edge.
    pub async fn settle(&self) -> TbResult<()> {
        self.timebase.settle().await
    }

    /// Reset, the whole script, then the single terminal check.
    pub async fn run(&self, script: &Script, expected: u32) -> TbResult<Outcome> {
        self.run_reset_sequence().await?;
        self.run_fixed_sequence(script).await?;
        self.settle().await?;
        let observed = self.check_output(expected)?;
        Ok(Outcome {
            observed,
            expected,
            cycles: script.len(),
        })
    }
}
