//! Adaptune - autonomous, safety-gated parameter tuning.
//!
//! This crate drives a generational genetic search over the tunable
//! parameters of a live subsystem. Genomes are unbounded real vectors;
//! a squashing codec maps them into parameter ranges, a domain
//! [`Evaluator`](engine::Evaluator) measures each configuration, and the
//! engine keeps the search inside hard safety limits while an adaptive
//! manager reshapes the search space as evidence accumulates.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration, search-space, and result types
//! - `engine`: Codec, evaluator contract, mutation, the generational
//!   loop, adaptation, and persistence
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use adaptune::{
//!     engine::{BenchmarkEvaluator, EvolutionEngine},
//!     schema::TunerConfig,
//! };
//!
//! let mut config = TunerConfig::for_domain("bench");
//! config.random_seed = Some(42);
//!
//! let mut engine = EvolutionEngine::new(config, Arc::new(BenchmarkEvaluator::new()));
//! let result = engine.run(vec![0.0, 0.0, 0.0]);
//!
//! if let Some(best) = result.best {
//!     println!("best fitness {:.3}: {:?}", best.fitness, best.config);
//! }
//! ```

pub mod engine;
pub mod schema;

// Re-export commonly used types
pub use engine::{BestConfigStore, Evaluator, EvolutionEngine, FitnessAggregator, GenomeCodec};
pub use schema::{FitnessReport, SearchSpace, TunerConfig, TuningResult};
