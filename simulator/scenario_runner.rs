// Scenario Runner - Load and execute swarm scenario YAML files
//
// Usage:
//   cargo run --bin scenario_runner scenarios/movie_pair.yaml
//   cargo run --bin scenario_runner scenarios/  (runs all .yaml files in directory)
//   cargo run --bin scenario_runner scenarios/random_swarm.yaml --seed 0x1234

mod swarm_sim;

use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::env;
use std::fs;
use std::path::Path;
use swarm_sim::{SwarmScenarioConfig, SwarmScenarioRunner};

/// Scenario file format
#[derive(Debug, serde::Deserialize)]
struct ScenarioFile {
    /// Scenario metadata
    #[serde(default)]
    meta: ScenarioMeta,

    config: SwarmScenarioConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ScenarioMeta {
    name: Option<String>,
    description: Option<String>,
    hypothesis: Option<String>,
}

#[tokio::main]
async fn main() {
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .env()
        .init()
        .unwrap();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <scenario.yaml | directory/> [--seed SEED]", args[0]);
        eprintln!("\nExamples:");
        eprintln!("  {} scenarios/movie_pair.yaml", args[0]);
        eprintln!("  {} scenarios/", args[0]);
        eprintln!("  {} scenarios/random_swarm.yaml --seed 0x1234", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);

    let seed: Option<u64> = if args.len() >= 4 && args[2] == "--seed" {
        Some(parse_seed(&args[3]))
    } else {
        None
    };

    let clean = if path.is_file() {
        run_scenario_file(path, seed).await
    } else if path.is_dir() {
        run_scenario_directory(path, seed).await
    } else {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    };

    if !clean {
        std::process::exit(2);
    }
}

async fn run_scenario_directory(dir: &Path, seed: Option<u64>) -> bool {
    let mut scenarios = Vec::new();

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let ext = path.extension().and_then(|s| s.to_str());
            if ext == Some("yaml") || ext == Some("yml") {
                scenarios.push(path);
            }
        }
    }

    scenarios.sort();

    if scenarios.is_empty() {
        eprintln!("No .yaml files found in {}", dir.display());
        std::process::exit(1);
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  SCENARIO RUNNER - Multiple Scenarios                  ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    println!("Found {} scenario(s) to run\n", scenarios.len());

    let mut clean = true;
    for (i, scenario_path) in scenarios.iter().enumerate() {
        println!("\n{}/{} Running: {}\n", i + 1, scenarios.len(), scenario_path.display());
        clean &= run_scenario_file(scenario_path, seed).await;
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  All scenarios complete!                               ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    clean
}

async fn run_scenario_file(path: &Path, seed: Option<u64>) -> bool {
    println!("Loading scenario from: {}", path.display());

    let yaml_content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let scenario: ScenarioFile = serde_yaml::from_str(&yaml_content).unwrap_or_else(|e| {
        eprintln!("Failed to parse {}: {}", path.display(), e);
        std::process::exit(1);
    });

    println!("\n╔════════════════════════════════════════════════════════╗");
    let title = scenario.meta.name.clone().unwrap_or_else(|| {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unnamed");
        format!("Scenario: {}", stem)
    });
    println!("║  {}{}║", title, " ".repeat(54_usize.saturating_sub(title.chars().count())));
    println!("╚════════════════════════════════════════════════════════╝\n");

    if let Some(ref desc) = scenario.meta.description {
        println!("{}\n", desc);
    }

    if let Some(ref hypothesis) = scenario.meta.hypothesis {
        println!("Hypothesis:");
        println!("  {}\n", hypothesis);
    }

    let mut config = scenario.config;
    if seed.is_some() {
        config.seed = seed;
    }

    if let Err(e) = config.validate() {
        eprintln!("Invalid scenario {}: {}", path.display(), e);
        std::process::exit(1);
    }

    println!("Configuration:");
    println!("  Peers: {}", config.peers);
    println!("  Files: {}", config.files.len());
    println!("  Wants: {:?}", config.wants);
    println!("  Request Timeout: {:?}", config.download.request_timeout());
    println!("  Max Rounds: {:?}", config.download.max_rounds);
    println!("\nStarting simulation...\n");

    let result = match SwarmScenarioRunner::new(config).run().await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Simulation failed: {}", e);
            return false;
        }
    };

    result.print_summary();

    if result.is_clean() {
        println!("\n✓ Scenario complete!\n");
    } else {
        println!("\n✗ Scenario finished with failed or corrupted files\n");
    }
    result.is_clean()
}

fn parse_seed(text: &str) -> u64 {
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.unwrap_or_else(|e| {
        eprintln!("Invalid seed {}: {}", text, e);
        std::process::exit(1);
    })
}
