use thiserror::Error;

use crate::value::Val;

pub type TbResult<T = Val> = Result<T, TbError>;

/// Everything that can go wrong while building or running a testbench.
///
/// `OutputMismatch` is the only verification failure. The rest are setup or
/// usage problems that the harness surfaces before or around a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TbError {
    #[error("{what} mismatch: expected {expected}, observed {observed}")]
    OutputMismatch {
        what: String,
        expected: u32,
        observed: u32,
    },
    #[error("no simulation object named '{0}'")]
    UnknownSignal(String),
    #[error("invalid simulation handle {0}")]
    InvalidHandle(usize),
    #[error("value {value:#x} does not fit into {width} bit signal '{name}'")]
    ValueTooWide { name: String, width: u32, value: u32 },
    #[error("unknown time unit '{0}'")]
    TimeUnit(String),
    #[error("{time} {unit} is not a whole number of simulation steps (precision 1e{precision} s)")]
    TimeResolution { time: f64, unit: String, precision: i8 },
    #[error("timer of {0} steps reaches past the end of simulation time")]
    TimeOverflow(u64),
    #[error("sequencing violation: {0}")]
    Sequencing(String),
    #[error("no simulator interface installed on this thread")]
    NoSimulator,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("task was cancelled")]
    Cancelled,
    #[error("test did not finish within {0} simulation steps")]
    Timeout(u64),
    #[error("{0}")]
    Failed(String),
}

impl From<std::io::Error> for TbError {
    fn from(e: std::io::Error) -> Self {
        TbError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for TbError {
    fn from(e: toml::de::Error) -> Self {
        TbError::Config(e.to_string())
    }
}

impl TbError {
    pub fn mismatch(what: impl Into<String>, expected: u32, observed: u32) -> Self {
        TbError::OutputMismatch {
            what: what.into(),
            expected,
            observed,
        }
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, TbError::OutputMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_message_carries_both_values() {
        let e = TbError::mismatch("bypass output", 1, 0);
        assert!(e.is_mismatch());
        assert_eq!(e.to_string(), "bypass output mismatch: expected 1, observed 0");
    }

    #[test]
    fn toml_errors_become_config_errors() {
        let err = toml::from_str::<toml::Table>("clock = [").unwrap_err();
        assert!(matches!(TbError::from(err), TbError::Config(_)));
    }
}
