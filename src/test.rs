use futures::future::{FutureExt, LocalBoxFuture};
use num_format::{Locale, ToFormattedString};
use prettytable::{format, Cell, Row, Table};
use std::future::Future;
use std::rc::Rc;
use std::time;

use crate::error::{TbError, TbResult};
use crate::executor::{self, Task};
use crate::kernel::{format_ns, RunStatus, Simulator};
use crate::signal::SimObject;
use crate::trigger;

pub type TestFn = Rc<dyn Fn(SimObject) -> LocalBoxFuture<'static, TbResult>>;

/// A named test: a generator producing the test future from the DUT root.
#[derive(Clone)]
pub struct Test {
    pub name: String,
    generator: TestFn,
}

impl Test {
    pub fn new<F, Fut>(name: impl Into<String>, generator: F) -> Self
    where
        F: Fn(SimObject) -> Fut + 'static,
        Fut: Future<Output = TbResult> + 'static,
    {
        Test {
            name: name.into(),
            generator: Rc::new(move |dut| generator(dut).boxed_local()),
        }
    }
}

impl std::fmt::Debug for Test {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Test").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestRecord {
    pub name: String,
    pub result: TbResult,
    pub time_secs: f64,
    pub sim_time_ns: f64,
}

impl TestRecord {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }

    fn sim_speed(&self) -> f64 {
        if self.time_secs > 0.0 {
            self.sim_time_ns / self.time_secs
        } else {
            0.0
        }
    }
}

/// Runs registered tests one after another on a single simulator.
///
/// Simulation time keeps running across tests. Between two tests every
/// trigger is cancelled and every task dropped, so each test starts from its
/// own clock and device tasks.
pub struct TestRunner {
    suite: String,
    sim: Simulator,
    tests: Vec<Test>,
    timeout: Option<u64>,
}

impl TestRunner {
    pub fn new(suite: impl Into<String>, sim: Simulator) -> Self {
        TestRunner {
            suite: suite.into(),
            sim,
            tests: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_test(mut self, test: Test) -> Self {
        self.tests.push(test);
        self
    }

    pub fn add_test(&mut self, test: Test) {
        self.tests.push(test);
    }

    /// Fails a test that has not finished after `steps` simulation steps.
    pub fn with_timeout(mut self, steps: u64) -> Self {
        self.timeout = Some(steps);
        self
    }

    pub fn run(self) -> Report {
        self.sim.install();
        let start = time::Instant::now();
        let sim_start = self.sim_time_ns();
        let mut records = Vec::with_capacity(self.tests.len());
        for test in &self.tests {
            let record = self.run_test(test);
            match &record.result {
                Ok(val) => log::info!("test {} passed: {}", record.name, val),
                Err(e) => log::error!("test {} failed: {}", record.name, e),
            }
            records.push(record);
        }
        let report = Report {
            suite: self.suite.clone(),
            records,
            time_secs: start.elapsed().as_secs_f64(),
            sim_time_ns: self.sim_time_ns() - sim_start,
        };
        self.sim.uninstall();
        report
    }

    fn sim_time_ns(&self) -> f64 {
        self.sim.sim_if().get_sim_time("ns").unwrap_or_default()
    }

    fn run_test(&self, test: &Test) -> TestRecord {
        log::info!("starting test {}", test.name);
        let time_start = time::Instant::now();
        let sim_time_start = self.sim_time_ns();

        let result = match SimObject::get_root() {
            Ok(root) => self.execute(test, root),
            Err(e) => Err(e),
        };
        tear_down_test();

        TestRecord {
            name: test.name.clone(),
            result,
            time_secs: time_start.elapsed().as_secs_f64(),
            sim_time_ns: self.sim_time_ns() - sim_time_start,
        }
    }

    fn execute(&self, test: &Test, root: SimObject) -> TbResult {
        let mut handle = Task::spawn_from_future((test.generator)(root), &test.name);
        crate::begin_test(handle.id());
        let deadline = self.timeout.map(|t| self.sim.time().saturating_add(t));

        let mut result = None;
        let status = self.sim.run_until(
            || {
                if result.is_none() {
                    // an early verdict wins over the cancelled task
                    result = crate::take_verdict().or_else(|| handle.try_result());
                }
                result.is_some()
            },
            deadline,
        );
        match (result, status) {
            (Some(result), _) => result,
            (None, RunStatus::Limit) => Err(TbError::Timeout(self.timeout.unwrap_or_default())),
            (None, _) => Err(TbError::Failed(format!(
                "simulation ran out of events at {} before test {} finished",
                format_ns(self.sim_time_ns()),
                test.name
            ))),
        }
    }
}

fn tear_down_test() {
    trigger::cancel_all_triggers();
    executor::clear();
    crate::end_test();
}

/// Results of one [`TestRunner::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub suite: String,
    pub records: Vec<TestRecord>,
    pub time_secs: f64,
    pub sim_time_ns: f64,
}

impl Report {
    pub fn passed(&self) -> bool {
        self.records.iter().all(TestRecord::passed)
    }

    pub fn failures(&self) -> usize {
        self.records.iter().filter(|r| !r.passed()).count()
    }

    pub fn get(&self, name: &str) -> Option<&TestRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn summary_table(&self) -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        table.set_titles(Row::new(
            ["Test", "Result", "Time (s)", "Sim time (ns)", "Speed (ns/s)"]
                .iter()
                .map(|t| Cell::new(t))
                .collect(),
        ));
        for record in &self.records {
            let result = match &record.result {
                Ok(_) => "PASS".to_string(),
                Err(e) => format!("FAIL: {}", e),
            };
            table.add_row(Row::new(vec![
                Cell::new(&record.name),
                Cell::new(&result),
                Cell::new(&format!("{:.3}", record.time_secs)),
                Cell::new(&(record.sim_time_ns as u64).to_formatted_string(&Locale::en)),
                Cell::new(&(record.sim_speed() as u64).to_formatted_string(&Locale::en)),
            ]));
        }
        table
    }

    pub fn log_summary(&self) {
        for line in self.summary_table().to_string().lines() {
            log::info!("{}", line);
        }
        log::info!(
            "{}: {} of {} tests passed, {} simulated in {:.3} s",
            self.suite,
            self.records.len() - self.failures(),
            self.records.len(),
            format_ns(self.sim_time_ns),
            self.time_secs
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::Trigger;
    use crate::value::Val;

    fn sim() -> Simulator {
        let sim = Simulator::new(-9);
        sim.add_scope("tb").unwrap();
        sim.add_signal("tb.clk", 1).unwrap();
        sim
    }

    #[test]
    fn results_are_recorded_per_test() {
        let report = TestRunner::new("unit", sim())
            .with_test(Test::new("waits", |_| async {
                Trigger::timer_steps(40).await?;
                Ok(Val::Int(1))
            }))
            .with_test(Test::new("fails", |_| async {
                Err(TbError::mismatch("output", 1, 0))
            }))
            .run();
        assert!(!report.passed());
        assert_eq!(report.failures(), 1);
        assert_eq!(report.get("waits").unwrap().result, Ok(Val::Int(1)));
        assert_eq!(report.get("waits").unwrap().sim_time_ns, 40.0);
        assert!(report.get("fails").unwrap().result.as_ref().unwrap_err().is_mismatch());
    }

    #[test]
    fn early_verdicts_end_the_test() {
        let report = TestRunner::new("unit", sim())
            .with_test(Test::new("passes early", |_| async {
                Task::fork(async {
                    Trigger::timer_steps(5).await?;
                    crate::pass_test("done");
                    Ok(Val::None)
                });
                futures::future::pending::<()>().await;
                Ok(Val::None)
            }))
            .with_test(Test::new("fails early", |_| async {
                crate::fail_test("boom");
                Ok(Val::None)
            }))
            .run();
        assert_eq!(
            report.get("passes early").unwrap().result,
            Ok(Val::String("done".to_string()))
        );
        assert_eq!(
            report.get("fails early").unwrap().result,
            Err(TbError::Failed("boom".to_string()))
        );
    }

    #[test]
    fn hanging_tests_time_out() {
        let report = TestRunner::new("unit", sim())
            .with_timeout(100)
            .with_test(Test::new("forever", |dut| async move {
                let clk = dut.c("clk")?;
                Task::fork(crate::testbench::clock(clk, 10, false));
                futures::future::pending::<()>().await;
                Ok(Val::None)
            }))
            .with_test(Test::new("starved", |dut| async move {
                crate::testbench::clock_cycles(dut.c("clk")?, 1).await
            }))
            .run();
        assert_eq!(report.get("forever").unwrap().result, Err(TbError::Timeout(100)));
        assert!(matches!(
            report.get("starved").unwrap().result,
            Err(TbError::Failed(_))
        ));
        assert_eq!(report.summary_table().len(), 2);
    }
}
