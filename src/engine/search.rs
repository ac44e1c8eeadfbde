//! The generational tuning loop.
//!
//! `Init -> { Evaluate -> Rank -> (terminate? Stop) -> Adapt -> Reproduce
//! -> Evaluate ... }`. Evaluation is embarrassingly parallel and runs on
//! the rayon pool; ranking and reproduction stay sequential and never
//! start until every individual carries a fitness.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::schema::{
    unix_timestamp, Config, FitnessReport, GenerationRecord, GenomeSpec, IndividualSnapshot,
    SearchSpace, StopReason, TunerConfig, TuningHistory, TuningProgress, TuningResult,
    TuningStats, UnsafePolicy,
};

use super::adaptive::AdaptiveSearchSpaceManager;
use super::evaluator::{Evaluator, FitnessAggregator};
use super::mutation::{targeted_mutation, TunerRng};
use super::store::TelemetryLog;

/// A candidate configuration under evaluation.
#[derive(Debug, Clone)]
pub struct Individual {
    /// Unique identifier within the run.
    pub id: u64,
    /// Genome vector, decoded against the active spec at evaluation time.
    pub genome: Vec<f64>,
    /// Evaluation outcome; set exactly once per generation.
    pub report: Option<FitnessReport>,
    /// Generation this individual was created in.
    pub generation: usize,
    /// Parent ids, empty for the initial population.
    pub parents: Vec<u64>,
    /// Tags of the mutations applied along this lineage step.
    pub mutations: Vec<String>,
}

impl Individual {
    /// Fitness, defaulting to 0.0 before evaluation.
    pub fn fitness(&self) -> f64 {
        self.report.as_ref().map_or(0.0, |r| r.fitness)
    }

    /// Whether the evaluated configuration satisfied every constraint.
    /// Unevaluated individuals are not considered safe.
    pub fn is_safe(&self) -> bool {
        self.report.as_ref().is_some_and(|r| r.safe)
    }

    fn snapshot(&self) -> IndividualSnapshot {
        let (config, metrics, violations, fitness, safe) = match &self.report {
            Some(r) => (
                r.config.clone(),
                r.metrics.clone(),
                r.violations.clone(),
                r.fitness,
                r.safe,
            ),
            None => (Config::new(), Default::default(), Vec::new(), 0.0, false),
        };
        IndividualSnapshot {
            id: self.id,
            fitness,
            safe,
            genome: self.genome.clone(),
            config,
            metrics,
            violations,
            generation: self.generation,
            parents: self.parents.clone(),
            mutations: self.mutations.clone(),
        }
    }
}

/// Progress callback type.
pub type ProgressCallback = Box<dyn Fn(&TuningProgress) + Send + Sync>;

/// Fitness as seen by ranking: the penalize policy scales unsafe
/// individuals down, the discard policy leaves scores untouched and
/// filters at elite selection instead.
fn effective_fitness(individual: &Individual, policy: UnsafePolicy) -> f64 {
    let fitness = individual.fitness();
    match policy {
        UnsafePolicy::DiscardFromElitism => fitness,
        UnsafePolicy::Penalize { factor } => {
            if individual.is_safe() {
                fitness
            } else {
                fitness * factor
            }
        }
    }
}

/// Drives a tuning run for one domain: owns the population, the active
/// search space, and the adaptation manager.
pub struct EvolutionEngine {
    config: TunerConfig,
    evaluator: Arc<dyn Evaluator>,
    rng: TunerRng,
    /// Active genome layout; rewritten when the search space adapts.
    spec: GenomeSpec,
    space: Option<SearchSpace>,
    manager: AdaptiveSearchSpaceManager,
    population: Vec<Individual>,
    /// Best fitness per completed generation, fed to plateau detection.
    fitness_history: Vec<f64>,
    avg_history: Vec<f64>,
    valid_history: Vec<usize>,
    /// Every configuration evaluated so far, fed to coverage detection.
    evaluated_configs: Vec<Config>,
    generation: usize,
    best: Option<Individual>,
    next_id: u64,
    total_evaluations: u64,
    telemetry: Option<TelemetryLog>,
    deadline: Option<Instant>,
}

impl EvolutionEngine {
    /// Create an engine for one domain run. The genome layout comes from
    /// the evaluator; an optional search space overrides its ranges and
    /// enables adaptation.
    pub fn new(config: TunerConfig, evaluator: Arc<dyn Evaluator>) -> Self {
        let rng = match config.random_seed {
            Some(seed) => TunerRng::new(seed),
            None => TunerRng::from_entropy(),
        };
        let spec = evaluator.genome_spec();
        let manager = AdaptiveSearchSpaceManager::new(config.adaptation.max_combinations);
        let deadline = config
            .max_runtime_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        Self {
            config,
            evaluator,
            rng,
            spec,
            space: None,
            manager,
            population: Vec::new(),
            fitness_history: Vec::new(),
            avg_history: Vec::new(),
            valid_history: Vec::new(),
            evaluated_configs: Vec::new(),
            generation: 0,
            best: None,
            next_id: 0,
            total_evaluations: 0,
            telemetry: None,
            deadline,
        }
    }

    /// Use a search space: its candidate sets define the decode ranges
    /// and its rules drive adaptation between generations.
    pub fn with_search_space(mut self, space: SearchSpace) -> Self {
        self.spec = space.genome_spec();
        self.space = Some(space);
        self
    }

    /// Append per-generation telemetry records to this log.
    pub fn with_telemetry(mut self, telemetry: TelemetryLog) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Currently active search space, if one is attached.
    pub fn search_space(&self) -> Option<&SearchSpace> {
        self.space.as_ref()
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Build the initial population: one unmodified baseline plus N-1
    /// targeted-mutation variants. A mutation pool that keeps producing
    /// no-ops falls back to duplicating the baseline.
    pub fn initialize(&mut self, baseline: Vec<f64>) {
        self.population.clear();
        self.generation = 0;
        self.fitness_history.clear();
        self.avg_history.clear();
        self.valid_history.clear();

        let id = self.alloc_id();
        self.population.push(Individual {
            id,
            genome: baseline.clone(),
            report: None,
            generation: 0,
            parents: Vec::new(),
            mutations: Vec::new(),
        });

        while self.population.len() < self.config.ga.population_size {
            let (genome, mutations) =
                match targeted_mutation(&baseline, self.config.intent, &mut self.rng) {
                    Some((genome, tag)) => (genome, vec![tag]),
                    None => (baseline.clone(), Vec::new()),
                };
            let id = self.alloc_id();
            self.population.push(Individual {
                id,
                genome,
                report: None,
                generation: 0,
                parents: Vec::new(),
                mutations,
            });
        }
    }

    /// Evaluate every individual that does not yet carry a report.
    /// Carried-over elites keep their scores. Parallel across the
    /// population; results are funneled back before ranking proceeds.
    fn evaluate_population(&mut self) {
        let evaluator = Arc::clone(&self.evaluator);
        let spec = self.spec.clone();

        let fresh: Vec<Config> = self
            .population
            .par_iter_mut()
            .filter(|individual| individual.report.is_none())
            .map(|individual| {
                let report = FitnessAggregator::evaluate_guarded(
                    evaluator.as_ref(),
                    &spec,
                    &individual.genome,
                );
                let config = report.config.clone();
                individual.report = Some(report);
                config
            })
            .collect();

        self.total_evaluations += fresh.len() as u64;
        self.evaluated_configs.extend(fresh);
    }

    /// Stable descending sort by effective fitness; ties keep their prior
    /// relative order.
    fn rank(&mut self) {
        let policy = self.config.ga.unsafe_policy;
        self.population.sort_by(|a, b| {
            let fa = effective_fitness(a, policy);
            let fb = effective_fitness(b, policy);
            fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Indices of elites: the best `elite_count` individuals, skipping
    /// unsafe ones under the default discard policy.
    fn elite_indices(&self) -> Vec<usize> {
        let discard = matches!(
            self.config.ga.unsafe_policy,
            UnsafePolicy::DiscardFromElitism
        );
        self.population
            .iter()
            .enumerate()
            .filter(|(_, ind)| !discard || ind.is_safe())
            .map(|(i, _)| i)
            .take(self.config.ga.elite_count)
            .collect()
    }

    /// Splice parent A's first half with parent B's second half.
    fn crossover(&mut self, a: &Individual, b: &Individual) -> Individual {
        let split = a.genome.len() / 2;
        let mut genome = a.genome[..split].to_vec();
        genome.extend_from_slice(b.genome.get(split..).unwrap_or(&[]));

        Individual {
            id: self.alloc_id(),
            genome,
            report: None,
            generation: a.generation.max(b.generation) + 1,
            parents: vec![a.id, b.id],
            mutations: Vec::new(),
        }
    }

    /// Re-apply the targeted mutation step to one parent. No-op results
    /// are discarded so the slot is retried with a different draw.
    fn mutate(&mut self, parent: &Individual) -> Option<Individual> {
        let (genome, tag) = targeted_mutation(&parent.genome, self.config.intent, &mut self.rng)?;
        let mut mutations = parent.mutations.clone();
        mutations.push(tag);
        Some(Individual {
            id: self.alloc_id(),
            genome,
            report: None,
            generation: parent.generation + 1,
            parents: vec![parent.id],
            mutations,
        })
    }

    /// Build the next generation: elites unchanged, remaining slots
    /// filled by a weighted coin between crossover and mutation with
    /// parents drawn from the top half.
    fn reproduce(&mut self) {
        let size = self.config.ga.population_size;
        let top_half = (self.population.len() / 2).max(1);

        let mut next: Vec<Individual> = self
            .elite_indices()
            .into_iter()
            .map(|i| self.population[i].clone())
            .collect();

        // A slot can keep drawing no-op mutations; give each a bounded
        // number of retries before duplicating the parent unchanged.
        let mut attempts = 0usize;
        let max_attempts = size * 16;
        while next.len() < size {
            attempts += 1;
            if self.rng.coin(self.config.ga.crossover_rate) {
                let a = self.population[self.rng.index(top_half)].clone();
                let b = self.population[self.rng.index(top_half)].clone();
                next.push(self.crossover(&a, &b));
            } else {
                let i = self.rng.index(top_half);
                let parent = self.population[i].clone();
                match self.mutate(&parent) {
                    Some(child) => next.push(child),
                    None if attempts >= max_attempts => {
                        let id = self.alloc_id();
                        next.push(Individual {
                            id,
                            genome: parent.genome.clone(),
                            report: None,
                            generation: parent.generation + 1,
                            parents: vec![parent.id],
                            mutations: parent.mutations.clone(),
                        });
                    }
                    None => {}
                }
            }
        }
        self.population = next;
    }

    /// Consult the manager; an accepted adaptation rewrites the active
    /// space and the decode ranges for the next generation.
    fn adapt(&mut self) {
        if !self.config.adaptation.enabled {
            return;
        }
        let Some(space) = &self.space else { return };
        let best_config = match &self.best {
            Some(ind) => match &ind.report {
                Some(r) => r.config.clone(),
                None => return,
            },
            None => return,
        };

        let trigger = self.manager.should_adapt(
            self.generation,
            &self.fitness_history,
            &best_config,
            &self.evaluated_configs,
            space,
        );
        let Some(trigger) = trigger else { return };

        let adapted = self.manager.adapt_space(trigger, space, &best_config);
        if adapted != *space {
            info!(
                "domain {}: search space adapted after {:?} trigger",
                self.config.domain, trigger
            );
            self.spec = adapted.genome_spec();
            self.space = Some(adapted);
        }
    }

    fn check_stop(&self) -> Option<StopReason> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Some(StopReason::DeadlineExceeded);
            }
        }
        if let Some(best) = &self.best {
            if best.fitness() > self.config.ga.early_stop_threshold {
                return Some(StopReason::EarlyStop);
            }
        }
        if self.generation >= self.config.ga.max_generations {
            return Some(StopReason::MaxGenerations);
        }
        None
    }

    fn progress(&self) -> TuningProgress {
        let population_size = self.population.len();
        let avg_fitness = if population_size == 0 {
            0.0
        } else {
            self.population.iter().map(Individual::fitness).sum::<f64>() / population_size as f64
        };
        let generation_best = self
            .population
            .iter()
            .map(Individual::fitness)
            .fold(f64::NEG_INFINITY, f64::max);

        TuningProgress {
            generation: self.generation,
            max_generations: self.config.ga.max_generations,
            best_fitness: self.best.as_ref().map_or(0.0, Individual::fitness),
            generation_best,
            avg_fitness,
            valid_individuals: self.population.iter().filter(|i| i.is_safe()).count(),
            population_size,
        }
    }

    fn record_generation(&mut self) -> TuningProgress {
        let progress = self.progress();
        self.fitness_history.push(progress.generation_best);
        self.avg_history.push(progress.avg_fitness);
        self.valid_history.push(progress.valid_individuals);

        if let Some(telemetry) = &mut self.telemetry {
            let record = GenerationRecord {
                generation: progress.generation,
                timestamp: unix_timestamp(),
                best_fitness: progress.generation_best,
                avg_fitness: progress.avg_fitness,
                valid_individuals: progress.valid_individuals,
                population_size: progress.population_size,
            };
            if let Err(e) = telemetry.append(&record) {
                warn!("failed to append telemetry record: {e}");
            }
        }
        progress
    }

    fn update_best(&mut self) {
        let candidate = self
            .population
            .iter()
            .max_by(|a, b| {
                a.fitness()
                    .partial_cmp(&b.fitness())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned();
        if let Some(candidate) = candidate {
            let improved = self
                .best
                .as_ref()
                .map_or(true, |best| candidate.fitness() > best.fitness());
            if improved {
                self.best = Some(candidate);
            }
        }
    }

    /// Run the full loop with a per-generation progress callback.
    pub fn run_with_callback<F>(&mut self, baseline: Vec<f64>, callback: F) -> TuningResult
    where
        F: Fn(&TuningProgress),
    {
        let start = Instant::now();
        self.initialize(baseline);

        let stop_reason = loop {
            self.evaluate_population();
            self.rank();
            self.update_best();
            let progress = self.record_generation();
            callback(&progress);

            self.generation += 1;
            if let Some(reason) = self.check_stop() {
                break reason;
            }

            self.adapt();
            self.reproduce();
        };

        debug!(
            "domain {}: run stopped after {} generations ({:?})",
            self.config.domain, self.generation, stop_reason
        );

        let final_avg_fitness = if self.population.is_empty() {
            0.0
        } else {
            self.population.iter().map(Individual::fitness).sum::<f64>()
                / self.population.len() as f64
        };

        TuningResult {
            best: self.best.as_ref().map(Individual::snapshot),
            stats: TuningStats {
                generations: self.generation,
                total_evaluations: self.total_evaluations,
                best_fitness: self.best.as_ref().map_or(0.0, Individual::fitness),
                final_avg_fitness,
                elapsed_seconds: start.elapsed().as_secs_f64(),
                stop_reason,
            },
            history: TuningHistory {
                best_fitness: self.fitness_history.clone(),
                avg_fitness: self.avg_history.clone(),
                valid_individuals: self.valid_history.clone(),
            },
        }
    }

    /// Run the full loop (blocking).
    pub fn run(&mut self, baseline: Vec<f64>) -> TuningResult {
        self.run_with_callback(baseline, |_| {})
    }
}
