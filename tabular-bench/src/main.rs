//! SQLite vs DuckDB head-to-head runner
//!
//! Usage:
//!   tabular-bench                       # 100K rows, seed 42, 5 trials
//!   tabular-bench --rows 10000 --seed 7 # smaller dataset, other seed
//!   tabular-bench --json -v             # append the report as JSON, info logs

use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use tabular_bench::adapters::duckdb_adapter::DuckDbAdapter;
use tabular_bench::adapters::sqlite_adapter::SqliteAdapter;
use tabular_bench::{
    BenchResult, Harness, HarnessConfig, TerminalSink, DEFAULT_ROWS, DEFAULT_SEED, DEFAULT_TRIALS,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "tabular-bench", about = "SQLite vs DuckDB grouped-aggregation benchmark")]
#[command(version)]
struct Cli {
    /// Rows in the generated dataset.
    #[arg(long, default_value_t = DEFAULT_ROWS)]
    rows: usize,

    /// Seed for the data generator.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Timed group-by runs per backend.
    #[arg(long, default_value_t = DEFAULT_TRIALS)]
    trials: u32,

    /// Print the comparison report as JSON after the run.
    #[arg(long)]
    json: bool,

    /// Disable ANSI colors.
    #[arg(long)]
    no_color: bool,

    /// More log output (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// With no flags this is `HarnessConfig::default()`.
    fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            rows: self.rows,
            seed: self.seed,
            trials: self.trials,
        }
    }

    fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            _ => "debug",
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::new(format!("tabular_bench={level},{level}"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: &Cli) -> BenchResult<()> {
    let config = cli.harness_config();
    config.validate()?;

    let mut sqlite = SqliteAdapter::new()?;
    let mut duckdb = DuckDbAdapter::new()?;
    let mut sink = TerminalSink::stdout();

    let mut harness = Harness::new(config);
    let report = harness.run(&mut sqlite, &mut duckdb, &mut sink)?;

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!(error = %e, "could not serialize report"),
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level());
    if cli.no_color {
        colored::control::set_override(false);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_invocation_is_default_run() {
        let cli = Cli::try_parse_from(["tabular-bench"]).unwrap();
        assert_eq!(cli.harness_config(), HarnessConfig::default());
        assert!(!cli.json);
        assert_eq!(cli.log_level(), "warn");
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from(["tabular-bench", "--rows", "1000", "--trials", "3", "-vv"])
            .unwrap();
        let config = cli.harness_config();
        assert_eq!((config.rows, config.seed, config.trials), (1_000, 42, 3));
        assert_eq!(cli.log_level(), "debug");
        assert!(Cli::try_parse_from(["tabular-bench", "-q", "-v"]).is_err());
    }
}
