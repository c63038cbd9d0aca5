pub use crate::bench::{self, DutSignals, JtagTb, ModelKind};
pub use crate::config::TbConfig;
pub use crate::executor::{JoinHandle, Task};
pub use crate::kernel::Simulator;
pub use crate::rstb_obj::RstbObj;
pub use crate::script::Script;
pub use crate::sequencer::{Checkpoint, Sequencer, TapPort, Timebase};
pub use crate::signal::SimObject;
pub use crate::sim_if::sim_if;
pub use crate::tap::{Step, TapState, Vector};
pub use crate::test::{Report, Test, TestRunner};
pub use crate::testbench::{clock, clock_cycles, Scoreboard, VectorMonitor};
pub use crate::trigger::Trigger;
pub use crate::value::Val;
pub use crate::{fail_test, pass_test, TbError, TbResult};
pub use futures::future::FutureExt;
