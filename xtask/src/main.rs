//! Development tasks for the broker-pool workspace.
//!
//! Run with `cargo xtask <command>`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

/// Test crate holding the integration, property and benchmark suites.
const TESTING_CRATE: &str = "broker-pool-testing";

#[derive(Parser)]
#[command(name = "xtask", about = "Development tasks for broker-pool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Formatting, lints, docs and the full test suite
    Ci,
    /// Check formatting
    Fmt,
    /// Lint every target with warnings denied
    Clippy,
    /// Run the unit and integration tests
    Test {
        /// Only run tests whose name contains this filter
        filter: Option<String>,
        /// Capture tracing output of the pool at this level
        #[arg(long)]
        log: Option<String>,
    },
    /// Run the pool invariant property tests with many cases
    Soak {
        /// Number of generated operation sequences per property
        #[arg(long, default_value_t = 5000)]
        cases: u32,
    },
    /// Build the API docs with warnings denied
    Doc,
    /// Run the checkout benchmarks
    Bench {
        /// Save results as a named criterion baseline
        #[arg(long, conflicts_with = "compare")]
        save: Option<String>,
        /// Compare against a previously saved baseline
        #[arg(long)]
        compare: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root()?);

    match cli.command {
        Command::Ci => {
            fmt(&sh)?;
            clippy(&sh)?;
            doc(&sh)?;
            test(&sh, None, None)?;
            println!("ci: all checks passed");
        }
        Command::Fmt => fmt(&sh)?,
        Command::Clippy => clippy(&sh)?,
        Command::Test { filter, log } => test(&sh, filter.as_deref(), log.as_deref())?,
        Command::Soak { cases } => soak(&sh, cases)?,
        Command::Doc => doc(&sh)?,
        Command::Bench { save, compare } => bench(&sh, save.as_deref(), compare.as_deref())?,
    }

    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new(env!("CARGO"))
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;
    if !output.status.success() {
        bail!("cargo locate-project exited with {}", output.status);
    }

    let manifest = String::from_utf8(output.stdout).context("manifest path is not UTF-8")?;
    PathBuf::from(manifest.trim())
        .parent()
        .map(PathBuf::from)
        .context("manifest path has no parent directory")
}

fn fmt(sh: &Shell) -> Result<()> {
    println!("fmt: checking");
    cmd!(sh, "cargo fmt --all -- --check").run()?;
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    println!("clippy: linting all targets");
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    Ok(())
}

fn test(sh: &Shell, filter: Option<&str>, log: Option<&str>) -> Result<()> {
    println!("test: running workspace tests");
    let _log = log.map(|level| sh.push_env("RUST_LOG", format!("broker_pool={level}")));
    let filter = filter.into_iter();
    cmd!(sh, "cargo test --workspace {filter...}").run()?;
    Ok(())
}

fn soak(sh: &Shell, cases: u32) -> Result<()> {
    println!("soak: {cases} cases per pool invariant");
    let _cases = sh.push_env("PROPTEST_CASES", cases.to_string());
    cmd!(sh, "cargo test --release -p {TESTING_CRATE} --test invariants").run()?;
    Ok(())
}

fn doc(sh: &Shell) -> Result<()> {
    println!("doc: building API docs");
    let _flags = sh.push_env("RUSTDOCFLAGS", "-D warnings");
    cmd!(sh, "cargo doc --workspace --no-deps").run()?;
    Ok(())
}

fn bench(sh: &Shell, save: Option<&str>, compare: Option<&str>) -> Result<()> {
    let mut args = Vec::new();
    if let Some(name) = save {
        args.extend(["--save-baseline", name]);
    }
    if let Some(name) = compare {
        args.extend(["--baseline", name]);
    }

    println!("bench: checkout benchmarks");
    cmd!(sh, "cargo bench -p {TESTING_CRATE} --bench checkout -- {args...}").run()?;
    Ok(())
}
