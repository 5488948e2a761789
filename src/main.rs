// Swarm runner over per-peer input files
//
// Usage:
//   bit-swarm <input_dir> <num_peers> [output_dir] [--config swarm.yaml]
//
// Reads in1.txt ..= in<num_peers>.txt from input_dir and writes
// client<id>_<file> for every completed download to output_dir (defaults to
// input_dir).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;

use sw_rust::sw_swarm::{load_inputs, run_swarm, write_outputs, SwarmConfig};
use sw_rust::SwarmError;

struct Args {
    input_dir: PathBuf,
    num_peers: u32,
    output_dir: PathBuf,
    config: Option<PathBuf>,
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <input_dir> <num_peers> [output_dir] [--config swarm.yaml]", program);
    process::exit(1);
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("bit-swarm");

    let mut positional = Vec::new();
    let mut config = None;
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        if arg == "--config" {
            match rest.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => usage(program),
            }
        } else {
            positional.push(arg.clone());
        }
    }

    if positional.len() < 2 || positional.len() > 3 {
        usage(program);
    }

    let num_peers = positional[1].parse().unwrap_or_else(|_| {
        eprintln!("Invalid peer count: {}", positional[1]);
        process::exit(1);
    });
    let input_dir = PathBuf::from(&positional[0]);
    let output_dir = positional
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| input_dir.clone());

    Args {
        input_dir,
        num_peers,
        output_dir,
        config,
    }
}

fn load_config(path: Option<&Path>) -> SwarmConfig {
    let Some(path) = path else {
        return SwarmConfig::default();
    };

    let text = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path.display(), e);
        process::exit(1);
    });
    SwarmConfig::from_yaml(&text).unwrap_or_else(|e| {
        eprintln!("Failed to parse {}: {}", path.display(), e);
        process::exit(1);
    })
}

async fn run(args: Args, config: SwarmConfig) -> Result<(), SwarmError> {
    // every input is read before any protocol traffic starts
    let inputs = load_inputs(&args.input_dir, args.num_peers)?;
    let report = run_swarm(inputs, &config).await?;

    for peer in &report.peers {
        for failed in &peer.failed {
            error!("peer {} could not complete {}: {}", peer.id, failed.name, failed.reason);
        }
    }

    let written = write_outputs(&args.output_dir, &report)?;
    info!(
        "wrote {} files to {} in {:?}",
        written.len(),
        args.output_dir.display(),
        report.elapsed
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .unwrap();

    let args = parse_args();
    let config = load_config(args.config.as_deref());

    info!("starting swarm of {} peers from {}", args.num_peers, args.input_dir.display());

    if let Err(e) = run(args, config).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
