use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};
use std::path::Path;

use crate::error::{TbError, TbResult};
use crate::test::Report;

/// Writes one JUnit test case per test record.
pub fn write_junit(report: &Report, path: &Path) -> TbResult<()> {
    let mut test_cases = Vec::new();

    for t in &report.records {
        let tc = match &t.result {
            Ok(_) => TestCaseBuilder::success(&t.name, Duration::seconds_f64(t.time_secs)),
            Err(e) => TestCaseBuilder::failure(
                &t.name,
                Duration::seconds_f64(t.time_secs),
                if e.is_mismatch() { "mismatch" } else { "failure" },
                &e.to_string(),
            ),
        }
        .build();
        test_cases.push(tc);
    }

    let test_suite = TestSuiteBuilder::new(&report.suite)
        .add_testcases(test_cases)
        .build();
    let junit = ReportBuilder::new().add_testsuite(test_suite).build();
    let file = std::fs::File::create(path)?;
    junit
        .write_xml(file)
        .map_err(|e| TbError::Io(format!("{}: {}", path.display(), e)))?;
    log::info!("wrote JUnit report to {}", path.display());
    Ok(())
}
