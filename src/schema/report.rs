//! Evaluation and run artifact types: fitness reports, telemetry records,
//! persisted best configurations, and the final run result.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A decoded configuration: parameter name to value. Produced once per
/// genome per evaluation and immutable afterwards.
pub type Config = BTreeMap<String, f64>;

/// Outcome of evaluating a single configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessReport {
    /// Raw, unnormalized probe metrics.
    pub metrics: BTreeMap<String, f64>,
    /// Scalar fitness in [0, 1]; higher is better.
    pub fitness: f64,
    /// True iff no safety constraint was violated.
    pub safe: bool,
    /// Human-readable constraint violations.
    pub violations: Vec<String>,
    /// The configuration that was evaluated.
    pub config: Config,
}

impl FitnessReport {
    /// Worst-case report used when a probe fails or panics: zero fitness,
    /// flagged unsafe so the default policy keeps it out of elitism.
    pub fn worst_case(config: Config, reason: impl Into<String>) -> Self {
        Self {
            metrics: BTreeMap::new(),
            fitness: 0.0,
            safe: false,
            violations: vec![reason.into()],
            config,
        }
    }
}

/// One line of the append-only, line-delimited generation telemetry log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    /// UNIX seconds.
    pub timestamp: u64,
    pub best_fitness: f64,
    pub avg_fitness: f64,
    /// Individuals whose configuration satisfied all safety constraints.
    pub valid_individuals: usize,
    pub population_size: usize,
}

/// Best configuration discovered for a domain, persisted per domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestConfigRecord {
    pub domain: String,
    pub fitness: f64,
    pub config: Config,
    /// UNIX seconds.
    pub timestamp: u64,
}

/// Current UNIX timestamp in seconds.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Progress snapshot passed to run callbacks after each generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningProgress {
    pub generation: usize,
    pub max_generations: usize,
    /// Best fitness seen over the whole run.
    pub best_fitness: f64,
    /// Best fitness within the current generation.
    pub generation_best: f64,
    pub avg_fitness: f64,
    pub valid_individuals: usize,
    pub population_size: usize,
}

/// Snapshot of a single individual for results and reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndividualSnapshot {
    pub id: u64,
    pub fitness: f64,
    pub safe: bool,
    pub genome: Vec<f64>,
    pub config: Config,
    pub metrics: BTreeMap<String, f64>,
    pub violations: Vec<String>,
    pub generation: usize,
    pub parents: Vec<u64>,
    pub mutations: Vec<String>,
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Reached the generation ceiling.
    MaxGenerations,
    /// Best fitness crossed the early-stop threshold.
    EarlyStop,
    /// Wall-clock budget exhausted.
    DeadlineExceeded,
}

/// Statistics from a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningStats {
    pub generations: usize,
    pub total_evaluations: u64,
    pub best_fitness: f64,
    pub final_avg_fitness: f64,
    pub elapsed_seconds: f64,
    pub stop_reason: StopReason,
}

/// Per-generation series for post-run analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TuningHistory {
    pub best_fitness: Vec<f64>,
    pub avg_fitness: Vec<f64>,
    pub valid_individuals: Vec<usize>,
}

/// Final result of a tuning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningResult {
    /// Best individual discovered, if any generation completed.
    pub best: Option<IndividualSnapshot>,
    pub stats: TuningStats,
    pub history: TuningHistory,
}
