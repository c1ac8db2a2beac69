use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use stubsmith::config::CONFIG_FILE;
use stubsmith::pipeline::{build_implementer, build_runner};
use stubsmith::{exit_codes, load_config, logger, report, FallbackPolicy, Roots};

#[derive(Parser)]
#[command(
    name = "stubsmith",
    version,
    about = "Implement stubbed Python functions until their tests pass"
)]
struct Cli {
    /// Library source root to scan for stubs.
    #[arg(long)]
    library: PathBuf,

    /// Test tree root.
    #[arg(long)]
    tests: PathBuf,

    /// pytest rootdir; defaults to the common ancestor of --library and --tests.
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Config file; defaults to stubsmith.toml in the project root.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    max_attempts: Option<u32>,

    /// Tests to run for targets without associated tests.
    #[arg(long, value_enum)]
    fallback: Option<FallbackPolicy>,

    /// Print discovered targets and tests, then exit without editing.
    #[arg(long)]
    list: bool,

    #[arg(long)]
    json_report: Option<PathBuf>,

    #[arg(long)]
    markdown_report: Option<PathBuf>,
}

fn main() {
    logger::init();
    if let Err(err) = run() {
        eprintln!("error: {:#}", err);
        std::process::exit(exit_codes::SETUP_ERROR);
    }
    std::process::exit(exit_codes::OK);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let roots = Roots::resolve(&cli.library, &cli.tests, cli.project_root.as_deref())
        .context("resolve roots")?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| roots.project.join(CONFIG_FILE));
    let mut cfg = load_config(&config_path)?;
    if let Some(n) = cli.max_attempts {
        cfg.max_attempts = n;
    }
    if let Some(f) = cli.fallback {
        cfg.fallback = f;
    }
    cfg.validate().context("command-line overrides")?;

    let ws = stubsmith::scan(roots, &cfg);

    if cli.list {
        report::print_listing(&ws.targets, &ws.catalog, &mut io::stdout().lock())
            .context("write listing")?;
        return Ok(());
    }

    let implementer = build_implementer(&cfg, &ws.roots.project)?;
    let runner = build_runner(&cfg, &ws.roots.project);
    let run = stubsmith::execute(ws, &cfg, implementer.as_ref(), &runner);

    report::print_summary(&run, &mut io::stdout().lock()).context("write summary")?;

    // Report files are best effort; the edits are already on disk.
    if let Some(path) = &cli.json_report {
        if let Err(e) = report::write_json(&run, path) {
            tracing::error!(path = %path.display(), err = %e, "cannot write JSON report");
        }
    }
    if let Some(path) = &cli.markdown_report {
        if let Err(e) = report::write_markdown(&run, path) {
            tracing::error!(path = %path.display(), err = %e, "cannot write Markdown report");
        }
    }

    Ok(())
}
