// Basic swarm: one owner, two downloaders sharing a document.
//
// Peer 1 owns "doc" (4 segments), peers 2 and 3 both want it. Once 2 and 3
// join they serve each other, so the final seeder set is {1, 2, 3}.
//
//   cargo run --example basic_swarm

use log::LevelFilter;
use simple_logger::SimpleLogger;
use sw_rust::{run_swarm, PeerInput, SegmentHash, SwarmConfig};

#[tokio::main]
async fn main() {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .unwrap();

    let doc: Vec<SegmentHash> = (0..4)
        .map(|i| SegmentHash::digest(format!("doc/{}", i).as_bytes()))
        .collect();

    let inputs = vec![
        PeerInput::new().owning("doc", doc.clone()),
        PeerInput::new().wanting("doc"),
        PeerInput::new().wanting("doc"),
    ];

    let report = match run_swarm(inputs, &SwarmConfig::default()).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("swarm failed: {}", e);
            std::process::exit(1);
        }
    };

    for peer in &report.peers {
        for file in &peer.completed {
            let intact = file.segments == doc;
            println!(
                "peer {} completed {} ({} segments, intact: {}), served by {:?}",
                peer.id,
                file.name,
                file.segments.len(),
                intact,
                peer.served_by
            );
        }
    }

    if let Some(seeders) = report.directory.seeders.get("doc") {
        println!("final seeders of doc: {:?}", seeders);
    }
    println!(
        "{} messages in {:?}",
        report.network.total(),
        report.elapsed
    );
}
