//! JTAG TAP stimulus sequencer, written as an rstb style testbench.
//!
//! Testbench code is plain `async` Rust awaiting simulator [`Trigger`]s. The
//! crate carries its own event driven kernel, so benches run in process:
//!
//! ```no_run
//! use rstb_jtag::prelude::*;
//!
//! let cfg = TbConfig::default();
//! let sim = bench::build_simulator(&cfg).unwrap();
//! let report = TestRunner::new("jtag", sim)
//!     .with_test(bench::jtag_test("tb_jtag_tap", cfg, ModelKind::TieHigh))
//!     .run();
//! assert!(report.passed());
//! ```

pub mod bench;
pub mod config;
pub mod error;
pub mod executor;
pub mod junit;
pub mod kernel;
pub mod model;
pub mod prelude;
pub mod rstb_obj;
pub mod script;
pub mod sequencer;
pub mod signal;
pub mod sim_if;
pub mod tap;
pub mod test;
pub mod testbench;
pub mod trigger;
pub mod value;

use std::cell::RefCell;

use executor::TaskId;

pub use error::{TbError, TbResult};
pub use value::Val;

struct CurrentTest {
    task: TaskId,
    verdict: Option<TbResult>,
}

thread_local! {
    static CURRENT_TEST: RefCell<Option<CurrentTest>> = const { RefCell::new(None) };
}

/// Passes the running test, unless it already passed or failed.
pub fn pass_test(msg: &str) {
    end_test_early(Ok(Val::String(msg.to_string())));
}

/// Fails the running test, unless it already passed or failed.
pub fn fail_test(msg: &str) {
    end_test_early(Err(TbError::Failed(msg.to_string())));
}

fn end_test_early(result: TbResult) {
    let task = CURRENT_TEST.with(|c| match c.borrow_mut().as_mut() {
        Some(cur) if cur.verdict.is_none() => {
            cur.verdict = Some(result);
            Some(cur.task)
        }
        _ => None,
    });
    // dropping the test future happens outside the borrow
    if let Some(task) = task {
        executor::cancel_task(task);
    }
}

pub(crate) fn begin_test(task: TaskId) {
    CURRENT_TEST.with(|c| {
        c.borrow_mut().replace(CurrentTest {
            task,
            verdict: None,
        })
    });
}

pub(crate) fn take_verdict() -> Option<TbResult> {
    CURRENT_TEST.with(|c| c.borrow_mut().as_mut().and_then(|cur| cur.verdict.take()))
}

pub(crate) fn end_test() {
    CURRENT_TEST.with(|c| c.borrow_mut().take());
}
