use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{TbError, TbResult};

thread_local! {
    static SIM_IF: RefCell<Option<Rc<dyn SimIf>>> = const { RefCell::new(None) };
}

/// Makes `sim` the simulator seen by signals and triggers on this thread.
pub fn install(sim: Rc<dyn SimIf>) {
    SIM_IF.with(|s| s.borrow_mut().replace(sim));
}

pub fn uninstall() {
    SIM_IF.with(|s| s.borrow_mut().take());
}

pub fn sim_if() -> TbResult<Rc<dyn SimIf>> {
    SIM_IF.with(|s| s.borrow().clone().ok_or(TbError::NoSimulator))
}

#[derive(Debug, Hash, Clone, Copy, Eq, PartialEq)]
pub enum SimCallback {
    /// Absolute simulation time in steps.
    Time(u64),
    /// Value change on a signal handle.
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// Two-state integer signal of the given width.
    Int(u32),
    Hier,
}

pub trait SimIf {
    fn set_value(&self, handle: usize, value: u32) -> TbResult<()>;
    fn get_value(&self, handle: usize) -> TbResult<u32>;
    fn get_handle_by_name(&self, name: &str) -> TbResult<usize>;
    fn get_full_name(&self, handle: usize) -> TbResult<String>;
    fn get_kind(&self, handle: usize) -> TbResult<ObjectKind>;
    fn get_root_handle(&self) -> TbResult<usize>;
    fn get_sim_time_steps(&self) -> u64;
    fn get_sim_precision(&self) -> i8;
    fn register_callback(&self, cb: SimCallback) -> TbResult<usize>;
    fn cancel_callback(&self, cb_hdl: usize) -> TbResult<()>;
    fn log(&self, s: &str);

    fn get_sim_time(&self, unit: &str) -> TbResult<f64> {
        // does not preserve precision, only meant for reporting
        let t = self.get_sim_time_steps() as f64;
        let precision = self.get_sim_precision();
        precision
            .checked_sub(time_scale(unit)?)
            .and_then(|exp| ldexp10(t, exp))
            .ok_or_else(|| TbError::TimeResolution {
                time: t,
                unit: unit.to_string(),
                precision,
            })
    }

    fn get_sim_steps(&self, time: f64, unit: &str) -> TbResult<u64> {
        to_steps(time, unit, self.get_sim_precision())
    }
}

/// Converts `time` in `unit` into simulation steps of resolution `1e<precision>` seconds.
///
/// Fails when the result is fractional or does not fit into a `u64`.
pub fn to_steps(time: f64, unit: &str, precision: i8) -> TbResult<u64> {
    let steps = time_scale(unit)?
        .checked_sub(precision)
        .and_then(|exp| ldexp10(time, exp));
    match steps {
        Some(steps) if steps >= 0.0 && steps % 1.0 == 0.0 && steps < u64::MAX as f64 => {
            Ok(steps as u64)
        }
        _ => Err(TbError::TimeResolution {
            time,
            unit: unit.to_string(),
            precision,
        }),
    }
}

pub fn time_scale(unit: &str) -> TbResult<i8> {
    match unit {
        "fs" => Ok(-15),
        "ps" => Ok(-12),
        "ns" => Ok(-9),
        "us" => Ok(-6),
        "ms" => Ok(-3),
        "sec" | "s" => Ok(0),
        _ => Err(TbError::TimeUnit(unit.to_string())),
    }
}

pub fn scale_time(scale: i8) -> TbResult<&'static str> {
    match scale {
        -15 => Ok("fs"),
        -12 => Ok("ps"),
        -9 => Ok("ns"),
        -6 => Ok("us"),
        -3 => Ok("ms"),
        0 => Ok("sec"),
        _ => Err(TbError::TimeUnit(format!("1e{}", scale))),
    }
}

// Like math.ldexp, but base 10; None once 10^|exp| leaves u64
fn ldexp10(frac: f64, exp: i8) -> Option<f64> {
    let scale = 10_u64.checked_pow(exp.unsigned_abs() as u32)? as f64;
    if exp >= 0 {
        Some(frac * scale)
    } else {
        Some(frac / scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_clock_period_to_steps() {
        assert_eq!(to_steps(20.0, "ns", -12).unwrap(), 20_000);
        assert_eq!(to_steps(50.0, "ns", -9).unwrap(), 50);
        assert_eq!(to_steps(1.0, "us", -9).unwrap(), 1_000);
    }

    #[test]
    fn rejects_times_below_precision() {
        assert!(matches!(
            to_steps(1.5, "ns", -9),
            Err(TbError::TimeResolution { .. })
        ));
        assert_eq!(to_steps(1.0, "parsec", -9), Err(TbError::TimeUnit("parsec".into())));
    }

    #[test]
    fn out_of_range_scales_are_errors() {
        assert!(matches!(
            to_steps(1.0, "sec", -20),
            Err(TbError::TimeResolution { .. })
        ));
        assert!(matches!(
            to_steps(1.0, "sec", 127),
            Err(TbError::TimeResolution { .. })
        ));
        assert!(matches!(
            to_steps(9e18, "ns", -12),
            Err(TbError::TimeResolution { .. })
        ));
        assert_eq!(to_steps(1.0, "sec", -15).unwrap(), 1_000_000_000_000_000);
    }

    #[test]
    fn scale_names_round_trip() {
        for unit in ["fs", "ps", "ns", "us", "ms", "sec"] {
            assert_eq!(scale_time(time_scale(unit).unwrap()).unwrap(), unit);
        }
    }
}
