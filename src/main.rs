//! Adaptune CLI - Run a tuning session from JSON configuration.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use adaptune::{
    engine::{BenchmarkEvaluator, EvolutionEngine, TelemetryLog},
    schema::{unix_timestamp, BestConfigRecord, SearchSpaceConfig, TunerConfig},
    BestConfigStore, Evaluator,
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [out_dir]", args[0]);
        eprintln!();
        eprintln!("Run a tuning session against the benchmark evaluator.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to tuner configuration file");
        eprintln!("  out_dir      Directory for best configs and telemetry (default: ./tuning)");
        eprintln!();
        eprintln!("An optional search space is read from <config>.space.json.");
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let out_dir = PathBuf::from(args.get(2).map(String::as_str).unwrap_or("tuning"));

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: TunerConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {}", e);
        std::process::exit(1);
    }

    // Optional search space next to the config file
    let space_path = config_path.with_extension("space.json");
    let space = if space_path.exists() {
        let space_str = fs::read_to_string(&space_path).unwrap_or_else(|e| {
            eprintln!("Error reading search space file: {}", e);
            std::process::exit(1);
        });
        let space_cfg: SearchSpaceConfig = serde_json::from_str(&space_str).unwrap_or_else(|e| {
            eprintln!("Error parsing search space: {}", e);
            std::process::exit(1);
        });
        match space_cfg.into_space() {
            Ok(space) => Some(space),
            Err(e) => {
                eprintln!("Invalid search space: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let store = BestConfigStore::new(&out_dir).unwrap_or_else(|e| {
        eprintln!("Error opening output directory: {}", e);
        std::process::exit(1);
    });
    let telemetry_path = out_dir.join(format!("{}.telemetry.jsonl", config.domain));
    let telemetry = TelemetryLog::open(&telemetry_path).unwrap_or_else(|e| {
        eprintln!("Error opening telemetry log: {}", e);
        std::process::exit(1);
    });

    let domain = config.domain.clone();
    let evaluator = Arc::new(BenchmarkEvaluator::new());
    let baseline = vec![0.0; evaluator.genome_spec().len()];

    println!("Adaptune Tuning Session");
    println!("=======================");
    println!("Domain: {}", domain);
    println!(
        "Population: {}, generations: {}, elites: {}",
        config.ga.population_size, config.ga.max_generations, config.ga.elite_count
    );
    match &space {
        Some(s) => println!(
            "Search space: {} parameters, {} combinations",
            s.params.len(),
            s.combination_count()
        ),
        None => println!("Search space: evaluator defaults"),
    }
    println!();

    let mut engine = EvolutionEngine::new(config, evaluator).with_telemetry(telemetry);
    if let Some(space) = space {
        engine = engine.with_search_space(space);
    }

    let result = engine.run_with_callback(baseline, |progress| {
        println!(
            "  Generation {}/{}: best={:.4} (gen {:.4}), avg={:.4}, safe {}/{}",
            progress.generation + 1,
            progress.max_generations,
            progress.best_fitness,
            progress.generation_best,
            progress.avg_fitness,
            progress.valid_individuals,
            progress.population_size
        );
    });

    println!();
    println!("Stopped: {:?}", result.stats.stop_reason);
    println!(
        "Evaluations: {} across {} generations in {:.2}s",
        result.stats.total_evaluations, result.stats.generations, result.stats.elapsed_seconds
    );

    match result.best {
        Some(best) => {
            println!("Best fitness: {:.4} (safe: {})", best.fitness, best.safe);
            for (name, value) in &best.config {
                println!("  {} = {:.4}", name, value);
            }
            if !best.safe {
                println!("Best individual violated constraints; not persisting.");
                for v in &best.violations {
                    println!("  violation: {}", v);
                }
                return;
            }
            let record = BestConfigRecord {
                domain,
                fitness: best.fitness,
                config: best.config,
                timestamp: unix_timestamp(),
            };
            match store.save(&record) {
                Ok(path) => println!("Saved best config to {}", path.display()),
                Err(e) => {
                    eprintln!("Error saving best config: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => println!("No individual was evaluated."),
    }
}

fn print_example_config() {
    let config = TunerConfig::for_domain("bench");

    println!("Example configuration (config.json):");
    println!("{}", serde_json::to_string_pretty(&config).unwrap());
    println!();
    println!("Example search space (config.space.json):");
    println!(
        "{}",
        r#"{
  "params": {
    "gain": {
      "initial": [2.0, 4.0, 6.0, 8.0],
      "expansion": {
        "plateau": {"enabled": true, "patience": 3,
                    "action": {"action": "subdivide_range"}},
        "boundary": {"enabled": true,
                     "action": {"action": "extend_edge_toward_best", "extension": 2}}
      },
      "safety": {"min": 0.0, "max": 9.5, "max_values": 64}
    }
  }
}"#
    );
}
