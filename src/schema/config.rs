//! Tuner configuration types.
//!
//! Everything here is serde-backed so tuning sessions can be driven from
//! human-edited JSON files.

use serde::{Deserialize, Serialize};

/// Top-level configuration for a tuning session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunerConfig {
    /// Domain name, used for best-config persistence and telemetry.
    pub domain: String,
    /// Intent tag selecting the targeted mutation pool.
    #[serde(default)]
    pub intent: MutationIntent,
    /// Genetic algorithm settings.
    #[serde(default)]
    pub ga: GaConfig,
    /// Search-space adaptation settings.
    #[serde(default)]
    pub adaptation: AdaptationConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Wall-clock budget in seconds; checked between generations.
    #[serde(default)]
    pub max_runtime_secs: Option<u64>,
}

impl TunerConfig {
    /// Minimal configuration for a named domain.
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            intent: MutationIntent::default(),
            ga: GaConfig::default(),
            adaptation: AdaptationConfig::default(),
            random_seed: None,
            max_runtime_secs: None,
        }
    }

    /// Validate tuner configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.is_empty() {
            return Err(ConfigError::EmptyDomain);
        }
        // The domain is interpolated into store and telemetry filenames.
        if self.domain.contains(['/', '\\']) || self.domain.contains("..") {
            return Err(ConfigError::InvalidDomain(self.domain.clone()));
        }
        if self.ga.population_size < 2 {
            return Err(ConfigError::PopulationTooSmall);
        }
        if self.ga.elite_count >= self.ga.population_size {
            return Err(ConfigError::TooManyElites {
                elites: self.ga.elite_count,
                population: self.ga.population_size,
            });
        }
        if !(0.0..=1.0).contains(&self.ga.crossover_rate) {
            return Err(ConfigError::InvalidRate("crossover_rate".into()));
        }
        if !(0.0..=1.0).contains(&self.ga.early_stop_threshold) {
            return Err(ConfigError::InvalidRate("early_stop_threshold".into()));
        }
        if let UnsafePolicy::Penalize { factor } = self.ga.unsafe_policy {
            if !(0.0..=1.0).contains(&factor) {
                return Err(ConfigError::InvalidRate("unsafe penalty factor".into()));
            }
        }
        if self.adaptation.max_combinations == 0 {
            return Err(ConfigError::InvalidCombinationCap);
        }
        Ok(())
    }
}

/// Failure/intent tag keying the targeted mutation pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationIntent {
    Performance,
    Correctness,
    Safety,
    #[default]
    General,
}

/// Generational loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaConfig {
    /// Number of individuals per generation.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Hard ceiling on generations.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Stop early once the best fitness exceeds this.
    #[serde(default = "default_early_stop")]
    pub early_stop_threshold: f64,
    /// Number of best individuals carried over unchanged.
    #[serde(default = "default_elite_count")]
    pub elite_count: usize,
    /// Probability a reproduction slot uses crossover instead of mutation.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    /// How unsafe individuals participate in ranking.
    #[serde(default)]
    pub unsafe_policy: UnsafePolicy,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            max_generations: default_max_generations(),
            early_stop_threshold: default_early_stop(),
            elite_count: default_elite_count(),
            crossover_rate: default_crossover_rate(),
            unsafe_policy: UnsafePolicy::default(),
        }
    }
}

fn default_population_size() -> usize {
    12
}
fn default_max_generations() -> usize {
    20
}
fn default_early_stop() -> f64 {
    0.8
}
fn default_elite_count() -> usize {
    2
}
fn default_crossover_rate() -> f64 {
    0.6
}

/// Ranking policy for individuals whose configuration violated a safety
/// constraint. Unsafe reports always keep their fitness value for
/// diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum UnsafePolicy {
    /// Unsafe individuals are never selected as elites but stay in the
    /// population history.
    #[default]
    DiscardFromElitism,
    /// Unsafe individuals rank with their fitness scaled by `factor`.
    Penalize { factor: f64 },
}

/// Search-space adaptation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationConfig {
    /// Whether the engine consults the search-space manager at all.
    #[serde(default = "default_adapt_enabled")]
    pub enabled: bool,
    /// Global cap on the cartesian-product size of the candidate sets.
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            enabled: default_adapt_enabled(),
            max_combinations: default_max_combinations(),
        }
    }
}

fn default_adapt_enabled() -> bool {
    true
}
fn default_max_combinations() -> usize {
    100_000
}

/// A hard limit a configuration value or candidate set must satisfy.
/// No partial credit: a constraint is either satisfied or violated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyConstraint {
    /// Minimum allowed value.
    #[serde(default)]
    pub min: Option<f64>,
    /// Maximum allowed value.
    #[serde(default)]
    pub max: Option<f64>,
    /// Maximum number of candidates in a set.
    #[serde(default)]
    pub max_values: Option<usize>,
}

impl SafetyConstraint {
    /// Check a scalar configuration value, returning a human-readable
    /// violation description if it falls outside the limits.
    pub fn check_value(&self, name: &str, value: f64) -> Option<String> {
        if let Some(min) = self.min {
            if value < min {
                return Some(format!("{name}: value {value} below minimum {min}"));
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return Some(format!("{name}: value {value} above maximum {max}"));
            }
        }
        None
    }
}

/// Range for a single tunable parameter. `step` is advisory (display and
/// rounding hints), not enforced during decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub step: f64,
}

/// Ordered collection of parameter ranges defining the genome layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenomeSpec {
    params: Vec<ParamSpec>,
}

impl GenomeSpec {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for p in &self.params {
            if p.min > p.max || !p.min.is_finite() || !p.max.is_finite() {
                return Err(ConfigError::InvalidBounds {
                    param: p.name.clone(),
                    min: p.min,
                    max: p.max,
                });
            }
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("domain name must not be empty")]
    EmptyDomain,
    #[error("domain name {0:?} must not contain path separators")]
    InvalidDomain(String),
    #[error("population size must be at least 2")]
    PopulationTooSmall,
    #[error("elite count {elites} must be less than population size {population}")]
    TooManyElites { elites: usize, population: usize },
    #[error("{0} must be within [0, 1]")]
    InvalidRate(String),
    #[error("combination cap must be positive")]
    InvalidCombinationCap,
    #[error("parameter {param}: invalid bounds [{min}, {max}]")]
    InvalidBounds { param: String, min: f64, max: f64 },
    #[error("parameter {0}: candidate set must not be empty")]
    EmptyCandidates(String),
}
