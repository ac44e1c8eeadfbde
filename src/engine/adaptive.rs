//! Adaptive search-space management.
//!
//! Watches fitness history, best-config position, and population coverage
//! for signals that the current candidate sets are exhausted, then mutates
//! the space with one of four operators. Every proposed space must pass
//! bound validation before it replaces the old one; on any failure the
//! caller gets the original space back untouched.

use std::collections::HashSet;

use log::{debug, warn};

use crate::schema::{AdaptAction, Config, SearchSpace};

/// Signal that the search space should change, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptationTrigger {
    /// Best fitness stopped improving.
    Plateau,
    /// The optimum is pinned at a candidate-set edge.
    Boundary,
    /// Enough of the space has been evaluated.
    Coverage,
}

/// Reasons a proposed space is rejected.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BoundsViolation {
    #[error("parameter {0}: candidate set is empty")]
    EmptyCandidates(String),
    #[error("combination count {total} exceeds cap {cap}")]
    CombinationCap { total: u128, cap: u128 },
    #[error("parameter {param}: candidate {value} below absolute minimum {min}")]
    BelowMin { param: String, value: f64, min: f64 },
    #[error("parameter {param}: candidate {value} above absolute maximum {max}")]
    AboveMax { param: String, value: f64, max: f64 },
    #[error("parameter {param}: {count} candidates exceed limit {limit}")]
    TooManyValues {
        param: String,
        count: usize,
        limit: usize,
    },
}

/// Decides whether and how to mutate the active search space.
///
/// Holds no long-lived state beyond the last detected trigger; the space
/// itself is a pure value consumed by reference and returned as a new
/// copy.
pub struct AdaptiveSearchSpaceManager {
    max_combinations: u128,
    last_trigger: Option<AdaptationTrigger>,
}

impl AdaptiveSearchSpaceManager {
    pub fn new(max_combinations: usize) -> Self {
        Self {
            max_combinations: max_combinations as u128,
            last_trigger: None,
        }
    }

    /// The most recent trigger detected by [`Self::should_adapt`].
    pub fn last_trigger(&self) -> Option<AdaptationTrigger> {
        self.last_trigger
    }

    /// Detect whether the space should adapt. Triggers are checked in
    /// fixed precedence plateau -> boundary -> coverage; the first
    /// positive match wins.
    pub fn should_adapt(
        &mut self,
        generation: usize,
        fitness_history: &[f64],
        best_config: &Config,
        evaluated_configs: &[Config],
        space: &SearchSpace,
    ) -> Option<AdaptationTrigger> {
        let trigger = if plateau_triggered(fitness_history, space) {
            Some(AdaptationTrigger::Plateau)
        } else if boundary_triggered(best_config, space) {
            Some(AdaptationTrigger::Boundary)
        } else if coverage_triggered(evaluated_configs, space) {
            Some(AdaptationTrigger::Coverage)
        } else {
            None
        };

        if let Some(t) = trigger {
            debug!("generation {generation}: adaptation trigger {t:?}");
            self.last_trigger = Some(t);
        }
        trigger
    }

    /// Apply the trigger's action to every parameter whose matching rule
    /// is enabled, then validate. On validation failure the original
    /// space is returned unchanged; adaptation is never partially
    /// applied.
    pub fn adapt_space(
        &mut self,
        trigger: AdaptationTrigger,
        space: &SearchSpace,
        best_config: &Config,
    ) -> SearchSpace {
        let mut adapted = space.clone();

        for (name, param) in &mut adapted.params {
            let action = match trigger {
                AdaptationTrigger::Plateau => param
                    .expansion
                    .plateau
                    .enabled
                    .then(|| param.expansion.plateau.action.clone()),
                AdaptationTrigger::Boundary => param
                    .expansion
                    .boundary
                    .enabled
                    .then(|| param.expansion.boundary.action.clone()),
                AdaptationTrigger::Coverage => param
                    .expansion
                    .coverage
                    .enabled
                    .then(|| param.expansion.coverage.action.clone()),
            };
            let Some(action) = action else { continue };

            let best = best_config
                .get(name)
                .map(|&v| snap_to_candidate(&param.values, v));

            param.values = match action {
                AdaptAction::ExpandBounds { factor } => expand_bounds(&param.values, factor),
                AdaptAction::SubdivideRange => subdivide_range(&param.values, best),
                AdaptAction::ExtendEdgeTowardBest { extension } => {
                    extend_edge_toward_best(&param.values, best, extension)
                }
                AdaptAction::AbandonRegion => abandon_region(&param.values),
            };
        }

        match self.validate_bounds(&adapted) {
            Ok(()) => adapted,
            Err(violation) => {
                warn!("adaptation rejected, keeping original space: {violation}");
                space.clone()
            }
        }
    }

    /// Safety gate for proposed spaces: non-empty candidate sets, bounded
    /// cartesian product, and per-parameter absolute limits.
    pub fn validate_bounds(&self, space: &SearchSpace) -> Result<(), BoundsViolation> {
        for (name, param) in &space.params {
            if param.values.is_empty() {
                return Err(BoundsViolation::EmptyCandidates(name.clone()));
            }
        }

        let total = space.combination_count();
        if total > self.max_combinations {
            return Err(BoundsViolation::CombinationCap {
                total,
                cap: self.max_combinations,
            });
        }

        for (name, param) in &space.params {
            if let Some(limit) = param.safety.max_values {
                if param.values.len() > limit {
                    return Err(BoundsViolation::TooManyValues {
                        param: name.clone(),
                        count: param.values.len(),
                        limit,
                    });
                }
            }
            for &value in &param.values {
                if let Some(min) = param.safety.min {
                    if value < min {
                        return Err(BoundsViolation::BelowMin {
                            param: name.clone(),
                            value,
                            min,
                        });
                    }
                }
                if let Some(max) = param.safety.max {
                    if value > max {
                        return Err(BoundsViolation::AboveMax {
                            param: name.clone(),
                            value,
                            max,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Plateau: among plateau-enabled parameters take the minimum patience P;
/// fires iff the last P+1 best-fitness values never exceed the maximum of
/// the earlier ones. An improving tail never plateaus.
fn plateau_triggered(fitness_history: &[f64], space: &SearchSpace) -> bool {
    let patience = space
        .params
        .values()
        .filter(|p| p.expansion.plateau.enabled)
        .map(|p| p.expansion.plateau.patience)
        .min();
    let Some(patience) = patience else {
        return false;
    };
    if patience == 0 || fitness_history.len() < patience + 1 {
        return false;
    }

    let tail = &fitness_history[fitness_history.len() - (patience + 1)..];
    let prior_max = tail[..patience]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    prior_max >= tail[patience]
}

/// Boundary: the best configuration sits at the first or last candidate
/// of a boundary-enabled parameter. Decoded values are continuous, so
/// they are snapped to the nearest candidate before the edge comparison.
fn boundary_triggered(best_config: &Config, space: &SearchSpace) -> bool {
    space.params.iter().any(|(name, param)| {
        if !param.expansion.boundary.enabled {
            return false;
        }
        let (Some(min), Some(max)) = (param.min(), param.max()) else {
            return false;
        };
        match best_config.get(name) {
            Some(&v) => {
                let snapped = snap_to_candidate(&param.values, v);
                snapped == min || snapped == max
            }
            None => false,
        }
    })
}

/// Coverage: fraction of distinct evaluated tuples (restricted to
/// coverage-enabled parameters) over the theoretical cartesian product.
fn coverage_triggered(evaluated_configs: &[Config], space: &SearchSpace) -> bool {
    let enabled: Vec<(&String, &crate::schema::ParamSpace)> = space
        .params
        .iter()
        .filter(|(_, p)| p.expansion.coverage.enabled)
        .collect();
    if enabled.is_empty() {
        return false;
    }

    let total: u128 = enabled
        .iter()
        .map(|(_, p)| p.values.len() as u128)
        .fold(1u128, |acc, n| acc.saturating_mul(n));
    if total == 0 {
        return false;
    }

    let threshold = enabled
        .iter()
        .map(|(_, p)| p.expansion.coverage.threshold)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut distinct: HashSet<Vec<u64>> = HashSet::new();
    for config in evaluated_configs {
        let tuple: Vec<u64> = enabled
            .iter()
            .map(|(name, param)| {
                config
                    .get(name.as_str())
                    .map(|&v| snap_to_candidate(&param.values, v).to_bits())
                    .unwrap_or(u64::MAX)
            })
            .collect();
        distinct.insert(tuple);
    }

    (distinct.len() as f64 / total as f64) >= threshold
}

/// Nearest candidate to `value`; `value` itself when the set is empty.
fn snap_to_candidate(values: &[f64], value: f64) -> f64 {
    values
        .iter()
        .copied()
        .min_by(|a, b| {
            (a - value)
                .abs()
                .partial_cmp(&(b - value).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(value)
}

/// Extend both ends outward by `span * (factor - 1)`, keeping existing
/// points.
fn expand_bounds(values: &[f64], factor: f64) -> Vec<f64> {
    let (Some(&min), Some(&max)) = (values.first(), values.last()) else {
        return values.to_vec();
    };
    let delta = (max - min) * (factor - 1.0);
    let mut out = values.to_vec();
    out.push(min - delta);
    out.push(max + delta);
    crate::schema::normalize_candidates(out)
}

/// Insert midpoints between neighbours; with a known best value, refine
/// only the segment nearest it (quarter, midpoint, three-quarter points).
fn subdivide_range(values: &[f64], best: Option<f64>) -> Vec<f64> {
    if values.len() < 2 {
        return values.to_vec();
    }
    let mut out = values.to_vec();

    match best {
        Some(best) => {
            // Segment whose midpoint lies closest to the best value.
            let (lo, hi) = values
                .windows(2)
                .map(|w| (w[0], w[1]))
                .min_by(|a, b| {
                    let da = ((a.0 + a.1) / 2.0 - best).abs();
                    let db = ((b.0 + b.1) / 2.0 - best).abs();
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or((values[0], values[values.len() - 1]));
            let span = hi - lo;
            out.push(lo + span * 0.25);
            out.push(lo + span * 0.5);
            out.push(lo + span * 0.75);
        }
        None => {
            for w in values.windows(2) {
                out.push((w[0] + w[1]) / 2.0);
            }
        }
    }
    crate::schema::normalize_candidates(out)
}

/// When the best value sits on the low or high edge, append `extension`
/// points beyond that edge at the existing step size.
fn extend_edge_toward_best(values: &[f64], best: Option<f64>, extension: usize) -> Vec<f64> {
    let Some(best) = best else {
        return values.to_vec();
    };
    let (Some(&min), Some(&max)) = (values.first(), values.last()) else {
        return values.to_vec();
    };

    let mut out = values.to_vec();
    if best == min {
        let step = if values.len() >= 2 {
            values[1] - values[0]
        } else {
            1.0
        };
        for k in 1..=extension {
            out.push(min - step * k as f64);
        }
    } else if best == max {
        let step = if values.len() >= 2 {
            values[values.len() - 1] - values[values.len() - 2]
        } else {
            1.0
        };
        for k in 1..=extension {
            out.push(max + step * k as f64);
        }
    } else {
        return values.to_vec();
    }
    crate::schema::normalize_candidates(out)
}

/// Prune to the interquartile range, shedding unproductive extremes.
fn abandon_region(values: &[f64]) -> Vec<f64> {
    if values.len() < 4 {
        return values.to_vec();
    }
    let lo = values.len() / 4;
    let hi = (values.len() * 3) / 4;
    values[lo..=hi.min(values.len() - 1)].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ParamSpace, SafetyConstraint};
    use std::collections::BTreeMap;

    fn space_with(
        name: &str,
        values: Vec<f64>,
        configure: impl FnOnce(&mut ParamSpace),
    ) -> SearchSpace {
        let mut param = ParamSpace::from_values(values);
        configure(&mut param);
        let mut params = BTreeMap::new();
        params.insert(name.to_string(), param);
        SearchSpace { params }
    }

    fn config_of(name: &str, value: f64) -> Config {
        let mut config = Config::new();
        config.insert(name.to_string(), value);
        config
    }

    #[test]
    fn test_plateau_never_fires_on_improvement() {
        let space = space_with("x", vec![1.0, 2.0, 3.0], |p| {
            p.expansion.plateau.enabled = true;
            p.expansion.plateau.patience = 3;
        });
        let history = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        assert!(!plateau_triggered(&history, &space));
    }

    #[test]
    fn test_plateau_fires_on_constant_history() {
        let space = space_with("x", vec![1.0, 2.0, 3.0], |p| {
            p.expansion.plateau.enabled = true;
            p.expansion.plateau.patience = 3;
        });
        let history = vec![0.5, 0.5, 0.5, 0.5];
        assert!(plateau_triggered(&history, &space));
    }

    #[test]
    fn test_plateau_fires_on_decline() {
        let space = space_with("x", vec![1.0, 2.0], |p| {
            p.expansion.plateau.enabled = true;
            p.expansion.plateau.patience = 2;
        });
        let history = vec![0.9, 0.8, 0.7];
        assert!(plateau_triggered(&history, &space));
    }

    #[test]
    fn test_plateau_needs_enough_history() {
        let space = space_with("x", vec![1.0, 2.0], |p| {
            p.expansion.plateau.enabled = true;
            p.expansion.plateau.patience = 5;
        });
        assert!(!plateau_triggered(&[0.5, 0.5, 0.5], &space));
    }

    #[test]
    fn test_boundary_fires_at_edges() {
        let space = space_with("x", vec![1.0, 2.0, 3.0], |p| {
            p.expansion.boundary.enabled = true;
        });
        assert!(boundary_triggered(&config_of("x", 1.0), &space));
        assert!(boundary_triggered(&config_of("x", 3.0), &space));
        assert!(!boundary_triggered(&config_of("x", 2.0), &space));
        // Continuous decoded values snap to the nearest candidate.
        assert!(boundary_triggered(&config_of("x", 2.9), &space));
    }

    #[test]
    fn test_coverage_respects_threshold() {
        let space = space_with("x", vec![1.0, 2.0], |p| {
            p.expansion.coverage.enabled = true;
            p.expansion.coverage.threshold = 0.9;
        });
        let half = vec![config_of("x", 1.0)];
        assert!(!coverage_triggered(&half, &space));
        let full = vec![config_of("x", 1.0), config_of("x", 2.0)];
        assert!(coverage_triggered(&full, &space));
    }

    #[test]
    fn test_coverage_empty_parameter_set_is_silent() {
        // No coverage-enabled parameter: no trigger regardless of history.
        let space = space_with("x", vec![1.0, 2.0], |_| {});
        let evaluated = vec![config_of("x", 1.0), config_of("x", 2.0)];
        assert!(!coverage_triggered(&evaluated, &space));
    }

    #[test]
    fn test_coverage_zero_combinations_is_silent() {
        // A coverage-enabled parameter with an empty candidate set gives a
        // zero cartesian product; this short-circuits separately from the
        // empty-enabled-set case, even at a threshold of zero.
        let mut space = space_with("x", vec![1.0, 2.0], |p| {
            p.expansion.coverage.enabled = true;
            p.expansion.coverage.threshold = 0.0;
        });
        space.params.get_mut("x").unwrap().values.clear();
        let evaluated = vec![config_of("x", 1.0)];
        assert!(!coverage_triggered(&evaluated, &space));
    }

    #[test]
    fn test_trigger_precedence_plateau_first() {
        let space = space_with("x", vec![1.0, 2.0], |p| {
            p.expansion.plateau.enabled = true;
            p.expansion.plateau.patience = 2;
            p.expansion.boundary.enabled = true;
            p.expansion.coverage.enabled = true;
            p.expansion.coverage.threshold = 0.0;
        });
        let mut manager = AdaptiveSearchSpaceManager::new(100_000);
        // Flat history AND best at edge AND full coverage: plateau wins.
        let trigger = manager.should_adapt(
            5,
            &[0.5, 0.5, 0.5],
            &config_of("x", 1.0),
            &[config_of("x", 1.0), config_of("x", 2.0)],
            &space,
        );
        assert_eq!(trigger, Some(AdaptationTrigger::Plateau));
        assert_eq!(manager.last_trigger(), Some(AdaptationTrigger::Plateau));
    }

    #[test]
    fn test_expand_bounds_extends_both_ends() {
        let out = expand_bounds(&[2.0, 4.0, 6.0], 1.5);
        // span 4, delta 2: new ends at 0 and 8, old points kept.
        assert_eq!(out, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_subdivide_globally_without_best() {
        let out = subdivide_range(&[0.0, 2.0, 4.0], None);
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_subdivide_refines_around_best() {
        let out = subdivide_range(&[0.0, 4.0, 8.0], Some(4.0));
        // Segment [4, 8] midpoint (6.0) is nearest to snapped best 4.0?
        // Both segments touch 4.0; the closer-midpoint rule picks one and
        // adds its quarter points.
        assert_eq!(out.len(), 6);
        assert!(out.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_extend_edge_low_and_high() {
        let low = extend_edge_toward_best(&[10.0, 20.0, 30.0], Some(10.0), 2);
        assert_eq!(low, vec![-10.0, 0.0, 10.0, 20.0, 30.0]);
        let high = extend_edge_toward_best(&[10.0, 20.0, 30.0], Some(30.0), 2);
        assert_eq!(high, vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        let mid = extend_edge_toward_best(&[10.0, 20.0, 30.0], Some(20.0), 2);
        assert_eq!(mid, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_abandon_region_keeps_iqr() {
        let out = abandon_region(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(out, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        // Too few points to prune.
        assert_eq!(abandon_region(&[1.0, 2.0, 3.0]), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_adapt_space_applies_matching_rule_only() {
        let mut space = space_with("x", vec![2.0, 4.0, 6.0], |p| {
            p.expansion.plateau.enabled = true;
            p.expansion.plateau.action = AdaptAction::ExpandBounds { factor: 1.5 };
        });
        space.params.insert(
            "y".to_string(),
            ParamSpace::from_values(vec![1.0, 2.0]), // no rules enabled
        );
        let mut manager = AdaptiveSearchSpaceManager::new(100_000);
        let adapted = manager.adapt_space(AdaptationTrigger::Plateau, &space, &Config::new());
        assert_eq!(adapted.params["x"].values, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert_eq!(adapted.params["y"].values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_rejected_adaptation_returns_original() {
        // Expanding past the absolute maximum must be rejected wholesale.
        let space = space_with("x", vec![2.0, 4.0, 6.0], |p| {
            p.expansion.plateau.enabled = true;
            p.expansion.plateau.action = AdaptAction::ExpandBounds { factor: 2.0 };
            p.safety = SafetyConstraint {
                min: Some(0.0),
                max: Some(7.0),
                max_values: None,
            };
        });
        let mut manager = AdaptiveSearchSpaceManager::new(100_000);
        let adapted = manager.adapt_space(AdaptationTrigger::Plateau, &space, &Config::new());
        assert_eq!(adapted, space);
        // Idempotent: rejecting again yields the same deeply-equal space.
        let again = manager.adapt_space(AdaptationTrigger::Plateau, &space, &Config::new());
        assert_eq!(again, space);
    }

    #[test]
    fn test_combination_cap_enforced() {
        let mut space = space_with("x", (0..300).map(f64::from).collect(), |p| {
            p.expansion.plateau.enabled = true;
            p.expansion.plateau.action = AdaptAction::SubdivideRange;
        });
        space.params.insert("y".to_string(), {
            let mut p = ParamSpace::from_values((0..300).map(f64::from).collect());
            p.expansion.plateau.enabled = true;
            p.expansion.plateau.action = AdaptAction::SubdivideRange;
            p
        });
        // 300 * 300 = 90_000 fits, but subdivision grows both sets to 599
        // candidates and the product blows past the cap.
        let mut manager = AdaptiveSearchSpaceManager::new(100_000);
        let adapted = manager.adapt_space(AdaptationTrigger::Plateau, &space, &Config::new());
        assert_eq!(adapted, space);
    }

    #[test]
    fn test_max_values_limit_enforced() {
        let space = space_with("x", vec![1.0, 2.0, 3.0, 4.0], |p| {
            p.expansion.plateau.enabled = true;
            p.expansion.plateau.action = AdaptAction::SubdivideRange;
            p.safety.max_values = Some(4);
        });
        let mut manager = AdaptiveSearchSpaceManager::new(100_000);
        let adapted = manager.adapt_space(AdaptationTrigger::Plateau, &space, &Config::new());
        assert_eq!(adapted, space);
    }

    #[test]
    fn test_validate_rejects_empty_candidates() {
        let mut space = space_with("x", vec![1.0], |_| {});
        space.params.get_mut("x").unwrap().values.clear();
        let manager = AdaptiveSearchSpaceManager::new(100_000);
        assert!(matches!(
            manager.validate_bounds(&space),
            Err(BoundsViolation::EmptyCandidates(_))
        ));
    }
}
