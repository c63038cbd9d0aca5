//! Testbench configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file describes the stock bypass
//! run: 20 ns clock, 50 ns reset, expected output 1.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::bench::OUTPUT_WIDTH;
use crate::error::{TbError, TbResult};
use crate::kernel::DEFAULT_PRECISION;
use crate::script::Script;
use crate::sequencer::Checkpoint;
use crate::sim_if::to_steps;
use crate::tap::{Step, TapState};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TbConfig {
    pub clock: ClockConfig,
    pub reset: ResetConfig,
    pub signals: SignalNames,
    pub check: CheckConfig,
    pub sim: SimConfig,
    /// Replaces the stock bypass script when present.
    pub script: Option<Vec<StepSpec>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    pub period: u64,
    pub unit: String,
    pub start_high: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        ClockConfig {
            period: 20,
            unit: "ns".to_string(),
            start_high: true,
        }
    }
}

/// Reset hold time, in the clock's unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResetConfig {
    pub hold: u64,
}

impl Default for ResetConfig {
    fn default() -> Self {
        ResetConfig { hold: 50 }
    }
}

/// Names of the DUT ports, relative to the toplevel scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalNames {
    pub toplevel: String,
    pub clock: String,
    pub reset_n: String,
    pub enable: String,
    pub inputs: String,
    pub aux_inputs: String,
    pub output: String,
}

impl Default for SignalNames {
    fn default() -> Self {
        SignalNames {
            toplevel: "tb".to_string(),
            clock: "clk".to_string(),
            reset_n: "rst_n".to_string(),
            enable: "ena".to_string(),
            inputs: "ui_in".to_string(),
            aux_inputs: "uio_in".to_string(),
            output: "uo_out".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckConfig {
    pub expected: u32,
    pub checkpoints: Vec<Checkpoint>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        // placeholder until a device with a known bypass output is attached
        CheckConfig {
            expected: 1,
            checkpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Simulation resolution as a power of ten seconds.
    pub precision: i8,
    /// Give up on a test after this many clock periods.
    pub timeout_periods: u64,
    pub junit: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            precision: DEFAULT_PRECISION,
            timeout_periods: 10_000,
            junit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    pub phase: TapState,
    pub tms: u8,
    pub tdi: u8,
}

impl TbConfig {
    pub fn load(path: &Path) -> TbResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TbError::Config(format!("{}: {}", path.display(), e)))?;
        let cfg = TbConfig::from_toml_str(&text)?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(cfg)
    }

    pub fn from_toml_str(text: &str) -> TbResult<Self> {
        let cfg: TbConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> TbResult<()> {
        if !(-15..=0).contains(&self.sim.precision) {
            return Err(TbError::Config(format!(
                "precision 1e{} s is outside 1 fs to 1 s",
                self.sim.precision
            )));
        }
        let period = self.period_steps()?;
        if period < 2 {
            return Err(TbError::Config(format!(
                "clock period {} {} is below two simulation steps",
                self.clock.period, self.clock.unit
            )));
        }
        if period % 2 != 0 {
            log::warn!(
                "clock period of {} steps is odd, high and low phases will differ",
                period
            );
        }
        let script = self.script()?;
        self.horizon_steps(script.len())?;
        let max_output = (1u64 << OUTPUT_WIDTH) - 1;
        if u64::from(self.check.expected) > max_output {
            return Err(TbError::Config(format!(
                "expected output {} does not fit into {} bits",
                self.check.expected, OUTPUT_WIDTH
            )));
        }
        for cp in &self.check.checkpoints {
            if u64::from(cp.expected) > max_output {
                return Err(TbError::Config(format!(
                    "checkpoint '{}' expects {}, which does not fit into {} bits",
                    cp.label, cp.expected, OUTPUT_WIDTH
                )));
            }
            if cp.after >= script.len() {
                return Err(TbError::Config(format!(
                    "checkpoint '{}' after step {} but the script has {} steps",
                    cp.label,
                    cp.after,
                    script.len()
                )));
            }
        }
        Ok(())
    }

    pub fn period_steps(&self) -> TbResult<u64> {
        to_steps(self.clock.period as f64, &self.clock.unit, self.sim.precision)
    }

    pub fn reset_steps(&self) -> TbResult<u64> {
        to_steps(self.reset.hold as f64, &self.clock.unit, self.sim.precision)
    }

    pub fn timeout_steps(&self) -> TbResult<u64> {
        self.period_steps()?
            .checked_mul(self.sim.timeout_periods)
            .ok_or_else(|| {
                TbError::Config(format!(
                    "timeout of {} periods overflows the simulation clock",
                    self.sim.timeout_periods
                ))
            })
    }

    /// Latest time a run of `steps` script steps can schedule, reset and
    /// timeout included.
    fn horizon_steps(&self, steps: usize) -> TbResult<u64> {
        let period = self.period_steps()?;
        let reset = self.reset_steps()?;
        let timeout = self.timeout_steps()?;
        // reset edge, one period per step, final edge
        (steps as u64)
            .checked_add(2)
            .and_then(|cycles| cycles.checked_mul(period))
            .and_then(|t| t.checked_add(reset))
            .and_then(|t| t.checked_add(timeout))
            .ok_or_else(|| {
                TbError::Config(format!(
                    "a {} step run with a {} {} clock cannot be scheduled",
                    steps, self.clock.period, self.clock.unit
                ))
            })
    }

    pub fn script(&self) -> TbResult<Script> {
        let Some(specs) = &self.script else {
            return Ok(Script::bypass());
        };
        if specs.is_empty() {
            return Err(TbError::Config("script has no steps".to_string()));
        }
        let mut steps = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            if spec.tms > 1 || spec.tdi > 1 {
                return Err(TbError::Config(format!(
                    "script step {}: tms and tdi must be 0 or 1",
                    i
                )));
            }
            steps.push(Step::new(spec.phase, spec.tms, spec.tdi));
        }
        Ok(Script::new("custom", steps))
    }
}
