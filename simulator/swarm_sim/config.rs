// Swarm Simulator Configuration

use serde::Deserialize;
use std::collections::BTreeMap;
use sw_rust::sw_download::DownloadConfig;
use sw_rust::ParticipantId;

// ============================================================================
// Main Configuration
// ============================================================================

/// Main configuration for a generated swarm
#[derive(Debug, Clone, Deserialize)]
pub struct SwarmScenarioConfig {
    /// Random seed for reproducibility
    #[serde(default)]
    pub seed: Option<u64>,

    /// Number of peers (ids 1..=peers)
    pub peers: u32,

    /// Files that exist in the swarm and who starts out owning them
    pub files: Vec<FileSpec>,

    /// Which peers want which files
    #[serde(default)]
    pub wants: WantSpec,

    /// Download engine parameters (defaults per field)
    #[serde(default)]
    pub download: DownloadConfig,
}

// ============================================================================
// Files and Wants
// ============================================================================

/// One file of the swarm
#[derive(Debug, Clone, Deserialize)]
pub struct FileSpec {
    pub name: String,

    /// Number of segments
    pub segments: usize,

    /// Peers owning the whole file at start
    pub owners: Vec<ParticipantId>,
}

/// Wanted file assignment strategies
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WantSpec {
    /// Every peer wants every file it doesn't own
    Everything,

    /// Each peer wants up to N random files it doesn't own
    Random { files_per_peer: usize },

    /// Exact wanted lists per peer (peers not listed want nothing)
    Explicit(BTreeMap<ParticipantId, Vec<String>>),
}

impl Default for WantSpec {
    fn default() -> Self {
        Self::Everything
    }
}

impl SwarmScenarioConfig {
    /// Peers outside 1..=peers or files without owners make a swarm that can
    /// never finish
    pub fn validate(&self) -> Result<(), String> {
        if self.peers == 0 {
            return Err("a swarm needs at least one peer".to_string());
        }
        for file in &self.files {
            if file.owners.is_empty() {
                return Err(format!("file {} has no owner", file.name));
            }
            if let Some(bad) = file.owners.iter().find(|o| **o == 0 || **o > self.peers) {
                return Err(format!("file {} owned by unknown peer {}", file.name, bad));
            }
        }
        if let WantSpec::Explicit(wants) = &self.wants {
            if let Some(bad) = wants.keys().find(|p| **p == 0 || **p > self.peers) {
                return Err(format!("wants listed for unknown peer {}", bad));
            }
        }
        Ok(())
    }
}
