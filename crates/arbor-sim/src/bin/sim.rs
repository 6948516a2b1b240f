#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use arbor_core::config::load_config;
use arbor_sim::{CampaignConfig, StepOutcome, replay_seed, run_campaign};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "arbor-sim: seeded fault-injection campaigns for the category store",
    long_about = None,
    after_help = "EXAMPLES:\n    # 100 seeds, 10% write faults\n    arbor-sim\n\n    # Tight spacing, heavy faults\n    arbor-sim --seeds 500 --order-step 2 --fault-percent 40\n\n    # Replay one seed with its trace\n    arbor-sim --replay 17 --json"
)]
struct Cli {
    /// First seed of the campaign.
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// Number of seeds to run.
    #[arg(long, default_value_t = 100)]
    seeds: u64,

    /// Operations per seed.
    #[arg(long, default_value_t = 200)]
    steps: usize,

    /// Chance (percent) that an operation has a write rejected.
    #[arg(long, default_value_t = 10)]
    fault_percent: u8,

    /// `display_order` spacing; defaults to `ordering.step` from the config.
    #[arg(long)]
    order_step: Option<i64>,

    /// Project root holding `.arbor/config.toml`.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Replay a single seed and print its trace.
    #[arg(long)]
    replay: Option<u64>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ARBOR_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "arbor_core=debug,arbor_sim=debug,info"
        } else {
            "arbor_sim=info,warn"
        })
    });

    let format = env::var("ARBOR_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr)).init();
        }
        _ => {
            registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let arbor = load_config(&cli.root)?;
    let config = CampaignConfig {
        seed_range: cli.start..cli.start.saturating_add(cli.seeds),
        steps: cli.steps,
        fault_percent: cli.fault_percent,
        order_step: cli.order_step.unwrap_or(arbor.ordering.step),
        ..CampaignConfig::default()
    };

    if let Some(seed) = cli.replay {
        let result = replay_seed(seed, &config)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&result).context("serialize trace")?);
        } else {
            for entry in &result.trace {
                let outcome = match &entry.outcome {
                    StepOutcome::Applied => "applied".to_string(),
                    StepOutcome::RolledBack { error } => format!("rolled back: {error}"),
                    StepOutcome::Rejected { code } => format!("rejected {code}"),
                    StepOutcome::Failed { error } => format!("FAILED: {error}"),
                };
                println!("{:>4}  {:?}  {outcome}", entry.step, entry.op);
            }
            for violation in &result.violations {
                println!("violation: {violation}");
            }
            println!(
                "seed {seed}: faults={} rolled_back={} categories={} contents={} passed={}",
                result.faults_injected,
                result.rolled_back(),
                result.final_categories,
                result.final_contents,
                result.passed()
            );
        }
        if !result.passed() {
            bail!("seed {seed} violated {} invariants", result.violations.len());
        }
        return Ok(());
    }

    let report = run_campaign(&config)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report).context("serialize report")?);
    } else {
        println!(
            "campaign complete: seeds={} passed={} faults={} rollbacks={}",
            report.seeds_run, report.seeds_passed, report.faults_injected, report.rollbacks
        );
        for failure in &report.failures {
            println!("seed {} failed:", failure.seed);
            for violation in &failure.violations {
                println!("  {violation}");
            }
        }
    }

    if let Some(seed) = report.first_failure {
        bail!(
            "{} of {} seeds failed; replay with --replay {seed}",
            report.failures.len(),
            report.seeds_run
        );
    }
    Ok(())
}
