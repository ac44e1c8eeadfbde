//! The evaluator contract and fitness aggregation.
//!
//! Concrete evaluators are domain plugins (audio pipelines, memory
//! subsystems, synthesized tool code); the engine depends only on the
//! [`Evaluator`] trait. Probes must fail closed: an internal error becomes
//! a metrics set that normalizes to the worst score, never a panic past
//! the boundary. As a second line of defense the aggregator catches
//! panics and converts them to worst-case reports so one bad individual
//! can never stall a generation.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use log::warn;

use crate::schema::{Config, FitnessReport, GenomeSpec, ParamSpec, SafetyConstraint};

use super::codec::GenomeCodec;

/// Capability set every domain evaluator exposes.
pub trait Evaluator: Send + Sync {
    /// Genome layout: parameter names and ranges, in decode order.
    fn genome_spec(&self) -> GenomeSpec;

    /// Hard limits keyed by parameter name.
    fn safety_constraints(&self) -> BTreeMap<String, SafetyConstraint>;

    /// Metric weights; the sign encodes direction (positive = maximize,
    /// negative = minimize).
    fn default_weights(&self) -> BTreeMap<String, f64>;

    /// Map a raw metric value into [0, 1]. Normalization is
    /// direction-agnostic: higher normalized tracks higher raw, and the
    /// weight sign decides whether that is good.
    fn normalize_metric(&self, name: &str, value: f64) -> f64;

    /// Push the configuration into the live subsystem. May be a no-op that
    /// only caches the config. Returns false when the subsystem refused it.
    fn apply_configuration(&self, config: &Config) -> bool;

    /// Measure the subsystem under the applied configuration. Must fail
    /// closed: on internal error return worst-scoring metrics.
    fn run_probes(&self, config: &Config) -> BTreeMap<String, f64>;

    /// Full evaluation of one genome against this evaluator's own spec.
    fn evaluate(&self, genome: &[f64]) -> FitnessReport {
        FitnessAggregator::evaluate(self, &self.genome_spec(), genome)
    }
}

/// Turns raw probe metrics into a bounded scalar fitness plus a safety
/// verdict.
pub struct FitnessAggregator;

impl FitnessAggregator {
    /// Decode, apply, probe, normalize, weigh, and gate one genome.
    ///
    /// `spec` is passed separately so the engine can evaluate against an
    /// adapted search space rather than the evaluator's initial layout.
    pub fn evaluate<E: Evaluator + ?Sized>(
        evaluator: &E,
        spec: &GenomeSpec,
        genome: &[f64],
    ) -> FitnessReport {
        let config = GenomeCodec::decode(genome, spec);

        if !evaluator.apply_configuration(&config) {
            return FitnessReport::worst_case(config, "subsystem rejected configuration");
        }

        let metrics = evaluator.run_probes(&config);
        let weights = evaluator.default_weights();
        let fitness = Self::combine(evaluator, &metrics, &weights);

        let violations = Self::check_constraints(&config, &evaluator.safety_constraints());
        let safe = violations.is_empty();

        FitnessReport {
            metrics,
            fitness,
            safe,
            violations,
            config,
        }
    }

    /// Like [`Self::evaluate`] but converts a panicking evaluator into a
    /// worst-case report instead of unwinding into the engine.
    pub fn evaluate_guarded<E: Evaluator + ?Sized>(
        evaluator: &E,
        spec: &GenomeSpec,
        genome: &[f64],
    ) -> FitnessReport {
        match panic::catch_unwind(AssertUnwindSafe(|| Self::evaluate(evaluator, spec, genome))) {
            Ok(report) => report,
            Err(_) => {
                warn!("evaluator panicked; converting to worst-case report");
                let config = GenomeCodec::decode(genome, spec);
                FitnessReport::worst_case(config, "probe panicked")
            }
        }
    }

    /// Weighted combination of normalized metrics, bounded to [0, 1].
    ///
    /// A positive weight contributes `w * n`, a negative weight
    /// `|w| * (1 - n)`, and the sum is divided by the total absolute
    /// weight. A metric missing from the probe results contributes its
    /// worst score.
    pub fn combine<E: Evaluator + ?Sized>(
        evaluator: &E,
        metrics: &BTreeMap<String, f64>,
        weights: &BTreeMap<String, f64>,
    ) -> f64 {
        let total: f64 = weights.values().map(|w| w.abs()).sum();
        if total <= 0.0 {
            return 0.0;
        }

        let mut acc = 0.0;
        for (name, &w) in weights {
            let n = match metrics.get(name) {
                Some(&raw) => evaluator.normalize_metric(name, raw).clamp(0.0, 1.0),
                None if w >= 0.0 => 0.0,
                None => 1.0,
            };
            acc += if w >= 0.0 { w * n } else { -w * (1.0 - n) };
        }
        (acc / total).clamp(0.0, 1.0)
    }

    /// Collect violations of per-parameter safety constraints. Violations
    /// are strings, never errors; a config is safe iff the list is empty.
    pub fn check_constraints(
        config: &Config,
        constraints: &BTreeMap<String, SafetyConstraint>,
    ) -> Vec<String> {
        let mut violations = Vec::new();
        for (name, constraint) in constraints {
            if let Some(&value) = config.get(name) {
                if let Some(v) = constraint.check_value(name, value) {
                    violations.push(v);
                }
            }
        }
        violations
    }
}

/// Synthetic evaluator over a smooth objective with a known optimum.
/// Used by the CLI binary and tests; stands in for real domain probes.
#[derive(Debug, Clone)]
pub struct BenchmarkEvaluator {
    /// Parameter ranges and the target value per parameter.
    targets: Vec<(ParamSpec, f64)>,
    constraints: BTreeMap<String, SafetyConstraint>,
    /// Simulate a probe-layer failure: return worst-scoring metrics.
    fail_probes: bool,
}

impl BenchmarkEvaluator {
    pub fn new() -> Self {
        let targets = vec![
            (
                ParamSpec {
                    name: "gain".into(),
                    min: 0.0,
                    max: 10.0,
                    step: 0.5,
                },
                6.5,
            ),
            (
                ParamSpec {
                    name: "threshold".into(),
                    min: 0.0,
                    max: 1.0,
                    step: 0.05,
                },
                0.3,
            ),
            (
                ParamSpec {
                    name: "window".into(),
                    min: 1.0,
                    max: 64.0,
                    step: 1.0,
                },
                24.0,
            ),
        ];

        let mut constraints = BTreeMap::new();
        constraints.insert(
            "gain".to_string(),
            SafetyConstraint {
                min: None,
                max: Some(9.5),
                max_values: None,
            },
        );

        Self {
            targets,
            constraints,
            fail_probes: false,
        }
    }

    /// Make every probe call fail closed, for exercising the worst-case
    /// conversion path.
    pub fn with_failing_probes(mut self) -> Self {
        self.fail_probes = true;
        self
    }
}

impl Default for BenchmarkEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for BenchmarkEvaluator {
    fn genome_spec(&self) -> GenomeSpec {
        GenomeSpec::new(self.targets.iter().map(|(p, _)| p.clone()).collect())
    }

    fn safety_constraints(&self) -> BTreeMap<String, SafetyConstraint> {
        self.constraints.clone()
    }

    fn default_weights(&self) -> BTreeMap<String, f64> {
        let mut weights = BTreeMap::new();
        weights.insert("accuracy".to_string(), 1.0);
        weights.insert("latency_ms".to_string(), -0.5);
        weights
    }

    fn normalize_metric(&self, name: &str, value: f64) -> f64 {
        match name {
            // Accuracy is already a fraction.
            "accuracy" => value,
            // 0ms is ideal, 200ms or worse scores 1.0 (the weight sign
            // turns that into the worst contribution).
            "latency_ms" => (value / 200.0).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    fn apply_configuration(&self, _config: &Config) -> bool {
        true
    }

    fn run_probes(&self, config: &Config) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        if self.fail_probes {
            // Fail closed: worst raw value for every metric.
            metrics.insert("accuracy".to_string(), 0.0);
            metrics.insert("latency_ms".to_string(), 200.0);
            return metrics;
        }

        // Accuracy peaks when every parameter hits its target.
        let mut error = 0.0;
        for (p, target) in &self.targets {
            let value = config.get(&p.name).copied().unwrap_or(p.min);
            let span = (p.max - p.min).max(f64::EPSILON);
            let d = (value - target) / span;
            error += d * d;
        }
        let accuracy = (-4.0 * error).exp();
        metrics.insert("accuracy".to_string(), accuracy);

        // Latency grows with the window size.
        let window = config.get("window").copied().unwrap_or(1.0);
        metrics.insert("latency_ms".to_string(), 5.0 + window * 1.5);
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_genome_reports_midpoint_config() {
        let evaluator = BenchmarkEvaluator::new();
        let report = evaluator.evaluate(&[0.0, 0.0, 0.0]);
        assert_eq!(report.config["gain"], 5.0);
        assert_eq!(report.config["threshold"], 0.5);
        assert_eq!(report.config["window"], 32.5);
        assert!(report.safe);
        assert!(report.fitness > 0.0 && report.fitness <= 1.0);
    }

    #[test]
    fn test_unsafe_config_still_scored() {
        let evaluator = BenchmarkEvaluator::new();
        // Saturated gain gene decodes to ~10.0, over the 9.5 limit.
        let report = evaluator.evaluate(&[50.0, 0.0, 0.0]);
        assert!(!report.safe);
        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].contains("gain"));
        assert!(report.fitness >= 0.0);
    }

    #[test]
    fn test_failing_probes_score_worst() {
        let ok = BenchmarkEvaluator::new();
        let failing = BenchmarkEvaluator::new().with_failing_probes();
        let healthy = ok.evaluate(&[0.0, 0.0, 0.0]);
        let failed = failing.evaluate(&[0.0, 0.0, 0.0]);
        assert!(failed.fitness < healthy.fitness);
        assert_eq!(failed.fitness, 0.0);
    }

    #[test]
    fn test_missing_metric_contributes_worst() {
        let evaluator = BenchmarkEvaluator::new();
        let metrics = BTreeMap::new();
        let weights = evaluator.default_weights();
        let fitness = FitnessAggregator::combine(&evaluator, &metrics, &weights);
        assert_eq!(fitness, 0.0);
    }

    #[test]
    fn test_negative_weight_prefers_low_values() {
        let evaluator = BenchmarkEvaluator::new();
        let mut weights = BTreeMap::new();
        weights.insert("latency_ms".to_string(), -1.0);

        let mut fast = BTreeMap::new();
        fast.insert("latency_ms".to_string(), 10.0);
        let mut slow = BTreeMap::new();
        slow.insert("latency_ms".to_string(), 180.0);

        let f_fast = FitnessAggregator::combine(&evaluator, &fast, &weights);
        let f_slow = FitnessAggregator::combine(&evaluator, &slow, &weights);
        assert!(f_fast > f_slow);
    }

    #[test]
    fn test_guarded_evaluation_catches_panic() {
        struct PanickingEvaluator;
        impl Evaluator for PanickingEvaluator {
            fn genome_spec(&self) -> GenomeSpec {
                GenomeSpec::new(vec![ParamSpec {
                    name: "x".into(),
                    min: 0.0,
                    max: 1.0,
                    step: 0.0,
                }])
            }
            fn safety_constraints(&self) -> BTreeMap<String, SafetyConstraint> {
                BTreeMap::new()
            }
            fn default_weights(&self) -> BTreeMap<String, f64> {
                BTreeMap::new()
            }
            fn normalize_metric(&self, _: &str, _: f64) -> f64 {
                0.0
            }
            fn apply_configuration(&self, _: &Config) -> bool {
                true
            }
            fn run_probes(&self, _: &Config) -> BTreeMap<String, f64> {
                panic!("probe subprocess crashed")
            }
        }

        let evaluator = PanickingEvaluator;
        let spec = evaluator.genome_spec();
        let report = FitnessAggregator::evaluate_guarded(&evaluator, &spec, &[0.0]);
        assert!(!report.safe);
        assert_eq!(report.fitness, 0.0);
        assert!(report.violations[0].contains("panicked"));
    }
}
