//! proctor CLI - crash-isolated autograding test runner.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use proctor::IsolateRunner;
use proctor::driver;
use proctor::fatal::emergency_abort;
use proctor::registry;
use proctor::report;

#[derive(Parser)]
#[command(name = "proctor")]
#[command(about = "Crash-isolated autograding test runner", long_about = None)]
#[command(version)]
struct Cli {
    /// Print the total points the registered tests are worth, and exit
    #[arg(long)]
    count_points: bool,

    /// Write the JSON report to this path after running all tests
    #[arg(short)]
    output: Option<PathBuf>,

    /// File listing required files the student did not submit, one per line
    #[arg(short)]
    missing: Option<PathBuf>,
}

fn main() {
    if let Err(error) = try_main() {
        emergency_abort(format!("{error:#}"));
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    // Keep stdout clean: count mode prints a bare integer there, and the
    // grading pipeline captures it.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match (cli.count_points, cli.output) {
        (true, None) => {
            anyhow::ensure!(
                cli.missing.is_none(),
                "--count-points does not take a missing-file list"
            );
            print!("{}", driver::count_points(registry::global()));
            Ok(())
        }
        (false, Some(output)) => run(&output, cli.missing.as_deref()),
        _ => anyhow::bail!(
            "invalid usage: pass either --count-points or -o <report> [-m <missing-list>]"
        ),
    }
}

fn run(output: &std::path::Path, missing_list: Option<&std::path::Path>) -> Result<()> {
    let missing = match missing_list {
        Some(path) => driver::load_missing_files(path)?,
        None => BTreeSet::new(),
    };

    let runner = IsolateRunner::new();
    let (report, results) = driver::run_tests(registry::global(), &runner, &missing)
        .context("test run failed")?;

    report::write_report(&report, output)
        .with_context(|| format!("could not write report to {}", output.display()))?;
    report::print_summary(&results);

    Ok(())
}
