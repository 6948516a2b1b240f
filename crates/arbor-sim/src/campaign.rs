//! Campaign runner: many seeds with shared parameters, collecting pass/fail
//! results and the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use arbor_core::config::ArborConfig;
use serde::{Deserialize, Serialize};

use crate::simulator::{SimulationConfig, SimulationResult, Simulator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    /// Operations per seed.
    pub steps: usize,
    pub initial_categories: usize,
    pub initial_contents: usize,
    /// Chance (percent, 0-100) that an operation has a write rejected.
    pub fault_percent: u8,
    /// `display_order` spacing. Small values force frequent renumbering.
    pub order_step: i64,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed_range: 0..100,
            steps: 200,
            initial_categories: 12,
            initial_contents: 24,
            fault_percent: 10,
            order_step: 1000,
        }
    }
}

impl CampaignConfig {
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        let mut arbor = ArborConfig::default();
        arbor.ordering.step = self.order_step;
        SimulationConfig {
            seed,
            steps: self.steps,
            initial_categories: self.initial_categories,
            initial_contents: self.initial_contents,
            fault_percent: self.fault_percent,
            arbor,
        }
    }

    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed, for prioritized replay.
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    pub faults_injected: usize,
    pub rollbacks: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run every seed in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation hits an
/// internal error. Invariant violations are reported, not returned.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        faults_injected: 0,
        rollbacks: 0,
    };

    for seed in config.seed_range.clone() {
        let result = run_seed(seed, config)?;
        report.seeds_run += 1;
        report.faults_injected += result.faults_injected;
        report.rollbacks += result.rolled_back();
        if result.passed() {
            report.seeds_passed += 1;
        } else {
            tracing::warn!(seed, violations = result.violations.len(), "seed failed");
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: result.violations.iter().map(ToString::to_string).collect(),
            });
        }
    }

    tracing::info!(
        seeds = report.seeds_run,
        passed = report.seeds_passed,
        faults = report.faults_injected,
        rollbacks = report.rollbacks,
        "campaign finished"
    );
    Ok(report)
}

/// Re-run one seed with its full trace, for debugging a failure.
///
/// # Errors
///
/// Returns an error when config validation or the simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    config.validate()?;
    run_seed(seed, config)
}

fn run_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    Simulator::new(config.sim_config_for_seed(seed))?.run()
}
