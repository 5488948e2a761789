// Wiring of one complete swarm run: a network, the directory task and one
// task per peer.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::Deserialize;
use tokio::task::JoinSet;

use crate::sw_channel::{Network, NetworkStats};
use crate::sw_download::DownloadConfig;
use crate::sw_error::SwarmError;
use crate::sw_interface::{ParticipantId, TRACKER_ID};
use crate::sw_manifest::{self, PeerInput};
use crate::sw_peer::{Peer, PeerReport};
use crate::sw_tracker::{DirectoryReport, Tracker};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub download: DownloadConfig,
}

impl SwarmConfig {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

#[derive(Debug, Clone)]
pub struct SwarmReport {
    pub directory: DirectoryReport,
    /// Ordered by participant id
    pub peers: Vec<PeerReport>,
    pub network: NetworkStats,
    pub elapsed: Duration,
}

impl SwarmReport {
    pub fn peer(&self, id: ParticipantId) -> Option<&PeerReport> {
        self.peers.iter().find(|p| p.id == id)
    }
}

/// Runs a swarm in which peer `i + 1` starts from `inputs[i]`
pub async fn run_swarm(inputs: Vec<PeerInput>, config: &SwarmConfig) -> Result<SwarmReport, SwarmError> {
    let started = Instant::now();
    let ids: Vec<ParticipantId> = (1..=inputs.len() as ParticipantId).collect();
    let network = Network::new(inputs.len() as u32);

    let tracker = Tracker::new(network.endpoint(TRACKER_ID)?, ids.clone());
    let tracker_task = tokio::spawn(tracker.run());

    let mut peer_tasks = JoinSet::new();
    for (id, input) in ids.iter().zip(inputs) {
        let peer = Peer::new(network.endpoint(*id)?, input, config.download.clone());
        peer_tasks.spawn(peer.run());
    }

    let peers = match join_peers(peer_tasks).await {
        Ok(peers) => peers,
        Err(err) => {
            warn!("swarm aborted: {}", err);
            tracker_task.abort();
            return Err(err);
        }
    };

    let directory = tracker_task
        .await
        .map_err(|e| SwarmError::Task(e.to_string()))??;

    let report = SwarmReport {
        directory,
        peers,
        network: network.stats(),
        elapsed: started.elapsed(),
    };
    info!(
        "swarm of {} peers finished in {:?} ({} messages)",
        report.peers.len(),
        report.elapsed,
        report.network.total()
    );
    Ok(report)
}

/// Collects peer reports in completion order, so the first failure is seen
/// even while other peers still wait on the directory. On failure every
/// remaining peer task is aborted. Reports come back sorted by id.
async fn join_peers(
    mut tasks: JoinSet<Result<PeerReport, SwarmError>>,
) -> Result<Vec<PeerReport>, SwarmError> {
    let mut peers = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let result = joined
            .map_err(|e| SwarmError::Task(e.to_string()))
            .and_then(|report| report);
        match result {
            Ok(report) => peers.push(report),
            Err(err) => {
                tasks.abort_all();
                return Err(err);
            }
        }
    }
    peers.sort_by_key(|p| p.id);
    Ok(peers)
}

/// Loads `in1.txt ..= in<num_peers>.txt`; any missing file is fatal
pub fn load_inputs(dir: &Path, num_peers: u32) -> Result<Vec<PeerInput>, SwarmError> {
    (1..=num_peers)
        .map(|id| Ok(sw_manifest::load_peer_input(&sw_manifest::input_path(dir, id))?))
        .collect()
}

/// Writes every completed file of every peer, returning the paths written
pub fn write_outputs(dir: &Path, report: &SwarmReport) -> Result<Vec<PathBuf>, SwarmError> {
    let mut written = Vec::new();
    for peer in &report.peers {
        for file in &peer.completed {
            let path = sw_manifest::output_path(dir, peer.id, &file.name);
            sw_manifest::write_output(&path, &file.segments)?;
            written.push(path);
        }
    }
    Ok(written)
}
