//! Search-space types: discrete candidate sets per parameter plus the
//! expansion rules and absolute safety limits that govern adaptation.
//!
//! The on-disk format (`SearchSpaceConfig`) is human-edited JSON; the
//! in-memory `SearchSpace` is a pure value the adaptation manager consumes
//! and returns new copies of.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ConfigError, GenomeSpec, ParamSpec, SafetyConstraint};

/// The active working set for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpace {
    /// Candidate values: non-empty, deduplicated, sorted ascending.
    pub values: Vec<f64>,
    /// Adaptation rules for this parameter.
    #[serde(default)]
    pub expansion: ExpansionRules,
    /// Absolute limits adaptation must never cross.
    #[serde(default)]
    pub safety: SafetyConstraint,
}

impl ParamSpace {
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            values: normalize_candidates(values),
            expansion: ExpansionRules::default(),
            safety: SafetyConstraint::default(),
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.values.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.values.last().copied()
    }
}

/// Per-parameter adaptation rules, one per trigger kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpansionRules {
    #[serde(default)]
    pub plateau: PlateauRule,
    #[serde(default)]
    pub boundary: BoundaryRule,
    #[serde(default)]
    pub coverage: CoverageRule,
}

/// Fires when best fitness has stopped improving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateauRule {
    #[serde(default)]
    pub enabled: bool,
    /// Generations of no improvement to tolerate before firing.
    #[serde(default = "default_patience")]
    pub patience: usize,
    #[serde(default)]
    pub action: AdaptAction,
}

impl Default for PlateauRule {
    fn default() -> Self {
        Self {
            enabled: false,
            patience: default_patience(),
            action: AdaptAction::default(),
        }
    }
}

fn default_patience() -> usize {
    3
}

/// Fires when the best configuration is pinned at a candidate-set edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundaryRule {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub action: AdaptAction,
}

/// Fires when the evaluated fraction of the space crosses a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRule {
    #[serde(default)]
    pub enabled: bool,
    /// Fraction of distinct evaluated tuples over the cartesian product.
    #[serde(default = "default_coverage_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub action: AdaptAction,
}

impl Default for CoverageRule {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_coverage_threshold(),
            action: AdaptAction::default(),
        }
    }
}

fn default_coverage_threshold() -> f64 {
    0.8
}

/// Candidate-set mutation applied when a rule matches the active trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdaptAction {
    /// Extend both ends outward by `span * (factor - 1)`.
    ExpandBounds {
        #[serde(default = "default_expand_factor")]
        factor: f64,
    },
    /// Insert midpoints, or refine around the best-known value.
    SubdivideRange,
    /// Append `extension` points beyond the edge the best value sits on.
    ExtendEdgeTowardBest {
        #[serde(default = "default_extension")]
        extension: usize,
    },
    /// Prune to the interquartile range.
    AbandonRegion,
}

impl Default for AdaptAction {
    fn default() -> Self {
        Self::ExpandBounds {
            factor: default_expand_factor(),
        }
    }
}

fn default_expand_factor() -> f64 {
    1.5
}
fn default_extension() -> usize {
    2
}

/// The complete active search space: one candidate set per parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub params: BTreeMap<String, ParamSpace>,
}

impl SearchSpace {
    /// Total cartesian-product size across all parameters.
    pub fn combination_count(&self) -> u128 {
        self.params
            .values()
            .map(|p| p.values.len() as u128)
            .fold(1u128, |acc, n| acc.saturating_mul(n))
    }

    /// Derive the genome layout from the current candidate sets: range
    /// endpoints come from the first/last candidates, step from the
    /// smallest candidate gap.
    pub fn genome_spec(&self) -> GenomeSpec {
        let params = self
            .params
            .iter()
            .filter_map(|(name, space)| {
                let min = space.min()?;
                let max = space.max()?;
                let step = space
                    .values
                    .windows(2)
                    .map(|w| w[1] - w[0])
                    .fold(f64::INFINITY, f64::min);
                Some(ParamSpec {
                    name: name.clone(),
                    min,
                    max,
                    step: if step.is_finite() { step } else { 0.0 },
                })
            })
            .collect();
        GenomeSpec::new(params)
    }
}

/// File-backed search-space configuration, one entry per parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSpaceConfig {
    pub params: BTreeMap<String, ParamSpaceConfig>,
}

/// One parameter's entry in the search-space file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpaceConfig {
    /// Seed candidate list.
    pub initial: Vec<f64>,
    #[serde(default)]
    pub expansion: ExpansionRules,
    #[serde(default)]
    pub safety: SafetyConstraint,
}

impl SearchSpaceConfig {
    /// Build the active search space, normalizing every candidate set.
    pub fn into_space(self) -> Result<SearchSpace, ConfigError> {
        let mut params = BTreeMap::new();
        for (name, cfg) in self.params {
            let values = normalize_candidates(cfg.initial);
            if values.is_empty() {
                return Err(ConfigError::EmptyCandidates(name));
            }
            params.insert(
                name,
                ParamSpace {
                    values,
                    expansion: cfg.expansion,
                    safety: cfg.safety,
                },
            );
        }
        Ok(SearchSpace { params })
    }
}

/// Sort ascending, drop non-finite values and duplicates.
pub fn normalize_candidates(mut values: Vec<f64>) -> Vec<f64> {
    values.retain(|v| v.is_finite());
    values.sort_by(f64::total_cmp);
    values.dedup();
    values
}
