//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds across both widget types, collecting pass/fail
//! results and identifying the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use widgets_core::{WidgetConfig, WidgetType};

use crate::network::FaultConfig;
use crate::oracle::{OracleResult, WidgetOracle};
use crate::rng::DeterministicRng;
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Salt for the oracle's RNG stream, kept apart from the simulation's.
const ORACLE_SALT: u64 = 0xDEAD;

/// Campaign-level configuration controlling how many seeds to run and
/// what simulation parameters to use for each seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    /// Widget types to cycle through; seed `s` uses `widgets[s % len]`.
    pub widgets: Vec<WidgetType>,
    pub user_count: usize,
    pub client_count: usize,
    pub late_joiners: usize,
    pub rounds: u64,
    /// Chance per round that a client acts (percent, 0–100).
    pub action_percent: u8,
    /// Chance that a non-owner's action is forged (percent, 0–100).
    pub forge_percent: u8,
    /// Maximum delivery delay in rounds.
    pub fault_max_delay: u8,
    /// Message duplication probability (percent, 0–100).
    pub fault_duplicate_percent: u8,
    /// Client stall probability per round (percent, 0–100).
    pub fault_stall_percent: u8,
    /// Stall duration in rounds.
    pub fault_stall_duration: u8,
    /// Late joiner snapshot/live overlap probability (percent, 0–100).
    pub fault_overlap_percent: u8,
    /// Shuffled replays the oracle checks per seed.
    pub permutations: usize,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            widgets: WidgetType::ALL.to_vec(),
            user_count: sim.user_count,
            client_count: sim.client_count,
            late_joiners: sim.late_joiners,
            rounds: sim.rounds,
            action_percent: sim.action_percent,
            forge_percent: sim.forge_percent,
            fault_max_delay: sim.fault.max_delay_rounds,
            fault_duplicate_percent: sim.fault.duplicate_rate_percent,
            fault_stall_percent: sim.fault.stall_rate_percent,
            fault_stall_duration: sim.fault.stall_duration_rounds,
            fault_overlap_percent: sim.fault.overlap_rate_percent,
            permutations: 3,
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        let widget = usize::try_from(seed)
            .ok()
            .and_then(|s| self.widgets.get(s % self.widgets.len().max(1)))
            .copied()
            .unwrap_or(WidgetType::Poll);
        SimulationConfig {
            seed,
            widget,
            user_count: self.user_count,
            client_count: self.client_count,
            late_joiners: self.late_joiners,
            rounds: self.rounds,
            action_percent: self.action_percent,
            forge_percent: self.forge_percent,
            fault: FaultConfig {
                max_delay_rounds: self.fault_max_delay,
                duplicate_rate_percent: self.fault_duplicate_percent,
                stall_rate_percent: self.fault_stall_percent,
                stall_duration_rounds: self.fault_stall_duration,
                overlap_rate_percent: self.fault_overlap_percent,
            },
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.widgets.is_empty() {
            bail!("widgets must not be empty");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub widget: WidgetType,
    /// Invariant violations found.
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that hit a duplicate, stall or overlap.
    pub interesting_states_reached: usize,
    /// Events rejected by receivers across all seeds.
    pub events_rejected: usize,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Everything produced by one seed: the run and the oracle's verdict.
#[derive(Debug, Clone)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
        events_rejected: 0,
    };

    for seed in config.seed_range.clone() {
        let trace = run_single_seed(seed, config)?;
        report.seeds_run += 1;
        report.events_rejected += trace.result.rejected;
        if trace.result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }

        if trace.oracle.passed {
            report.seeds_passed += 1;
        } else {
            let violations = trace.oracle.violations.len();
            tracing::warn!(seed, violations, "seed failed");
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                widget: trace.result.config.widget,
                violations: trace
                    .oracle
                    .violations
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            });
        }
    }

    tracing::info!(
        seeds = report.seeds_run,
        passed = report.seeds_passed,
        interesting = report.interesting_states_reached,
        "campaign complete"
    );
    Ok(report)
}

/// Run one seed and check it.
///
/// # Errors
///
/// Returns an error if the simulation itself fails (invalid config, widget
/// that cannot activate). Invariant violations are reported in the trace.
pub fn run_single_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;

    let widget_config: &WidgetConfig = simulator.widget_config();
    let users = simulator.users();
    let oracle = WidgetOracle::new(result.message, &result.log, widget_config, users);
    let mut oracle_rng = DeterministicRng::new(seed).fork(ORACLE_SALT);
    let verdict = oracle.check_all(&result.states, &mut oracle_rng, config.permutations);

    Ok(DetailedTrace {
        result,
        oracle: verdict,
    })
}

/// Replay a single seed with full trace details for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;
    run_single_seed(seed, config)
}
