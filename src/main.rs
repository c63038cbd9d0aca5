use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use rstb_jtag::bench::{self, ModelKind};
use rstb_jtag::config::TbConfig;
use rstb_jtag::junit;
use rstb_jtag::test::TestRunner;
use rstb_jtag::{TbError, TbResult};

#[derive(Parser)]
#[command(name = "rstb-jtag", about = "Drives the JTAG bypass sequence into a simulated TAP", version)]
struct Cli {
    /// Testbench configuration (TOML). Defaults apply to everything left out.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Overrides the expected output value.
    #[clap(short, long)]
    expected: Option<u32>,

    /// Device connected to the bench.
    #[clap(short, long, value_enum, default_value_t = ModelKind::Tap)]
    model: ModelKind,

    /// Writes a JUnit XML report to this file.
    #[clap(long)]
    junit: Option<PathBuf>,

    /// Prints the effective configuration and exits.
    #[clap(long)]
    print_config: bool,

    /// Increase verbosity (can be repeated: -vv for trace level).
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (can be repeated: -qq for error level).
    #[clap(short, long, action = clap::ArgAction::Count)]
    quiet: u8,
}

fn init_logging(verbose: u8, quiet: u8) {
    use simplelog::*;
    let level = match (verbose, quiet) {
        (0, 0) => LevelFilter::Info,
        (1, _) => LevelFilter::Debug,
        (v, _) if v >= 2 => LevelFilter::Trace,
        (0, 1) => LevelFilter::Warn,
        _ => LevelFilter::Error,
    };

    if let Err(e) = TermLogger::init(
        level,
        ConfigBuilder::new()
            .set_location_level(LevelFilter::Debug)
            .set_thread_level(LevelFilter::Off)
            .set_time_level(LevelFilter::Off)
            .build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("failed to initialise logging: {}", e);
    }
}

fn run(cli: Cli) -> TbResult<bool> {
    let mut cfg = match &cli.config {
        Some(path) => TbConfig::load(path)?,
        None => TbConfig::default(),
    };
    if let Some(expected) = cli.expected {
        cfg.check.expected = expected;
    }
    if cli.junit.is_some() {
        cfg.sim.junit = cli.junit;
    }
    if cli.print_config {
        let text = toml::to_string_pretty(&cfg).map_err(|e| TbError::Config(e.to_string()))?;
        print!("{}", text);
        return Ok(true);
    }
    cfg.validate()?;

    log::info!("running bypass sequence against {} model", cli.model);
    let sim = bench::build_simulator(&cfg)?;
    let report = TestRunner::new(env!("CARGO_PKG_NAME"), sim)
        .with_timeout(cfg.timeout_steps()?)
        .with_test(bench::bypass_test(cfg.clone(), cli.model))
        .run();
    report.log_summary();

    if let Some(path) = &cfg.sim.junit {
        junit::write_junit(&report, path)?;
    }
    Ok(report.passed())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(2)
        }
    }
}
