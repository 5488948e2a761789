// Swarm Simulator Statistics

use std::collections::BTreeMap;
use std::time::Duration;

use sw_rust::sw_download::DownloadStats;
use sw_rust::sw_upload::UploadStats;
use sw_rust::{NetworkStats, ParticipantId, SwarmReport};

// ============================================================================
// Simulation Result
// ============================================================================

/// Complete simulation result
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Configuration summary
    pub config_summary: String,

    /// Random seed used
    pub seed_used: u64,

    /// Files completed across all peers
    pub completed_files: usize,

    /// Files abandoned across all peers, with the reason
    pub failed_files: Vec<(ParticipantId, String, String)>,

    /// Completed files whose content differs from the generated manifest
    pub corrupted_files: Vec<(ParticipantId, String)>,

    /// Download counters summed over all peers
    pub download: DownloadStats,

    /// Upload counters summed over all peers
    pub upload: UploadStats,

    /// Segments each peer served to others
    pub served_by: BTreeMap<ParticipantId, usize>,

    /// Final seeder count per file
    pub seeders_per_file: BTreeMap<String, usize>,

    /// Manifest conflicts seen by the directory
    pub conflicts: usize,

    pub network: NetworkStats,

    pub elapsed: Duration,
}

impl SimulationResult {
    pub fn from_report(
        config_summary: String,
        seed_used: u64,
        report: &SwarmReport,
        corrupted_files: Vec<(ParticipantId, String)>,
    ) -> Self {
        let mut download = DownloadStats::default();
        let mut upload = UploadStats::default();
        let mut served_by: BTreeMap<ParticipantId, usize> = BTreeMap::new();
        let mut failed_files = Vec::new();
        let mut completed_files = 0;

        for peer in &report.peers {
            completed_files += peer.completed.len();
            for failed in &peer.failed {
                failed_files.push((peer.id, failed.name.clone(), failed.reason.clone()));
            }

            download.requests += peer.download.requests;
            download.verified += peer.download.verified;
            download.nacks += peer.download.nacks;
            download.mismatches += peer.download.mismatches;
            download.timeouts += peer.download.timeouts;
            download.refreshes += peer.download.refreshes;

            upload.served += peer.upload.served;
            upload.nacked += peer.upload.nacked;
            upload.ignored += peer.upload.ignored;

            for (seeder, count) in &peer.served_by {
                *served_by.entry(*seeder).or_default() += count;
            }
        }

        let seeders_per_file = report
            .directory
            .seeders
            .iter()
            .map(|(file, seeders)| (file.clone(), seeders.len()))
            .collect();

        Self {
            config_summary,
            seed_used,
            completed_files,
            failed_files,
            corrupted_files,
            download,
            upload,
            served_by,
            seeders_per_file,
            conflicts: report.directory.conflicts.len(),
            network: report.network,
            elapsed: report.elapsed,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed_files.is_empty() && self.corrupted_files.is_empty()
    }

    /// Print summary to stdout
    pub fn print_summary(&self) {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║    SWARM SIMULATION RESULTS                            ║");
        println!("╚════════════════════════════════════════════════════════╝\n");

        println!("Configuration: {}", self.config_summary);
        println!("Seed: {:#018x}", self.seed_used);
        println!("Elapsed: {:?}", self.elapsed);
        println!();

        println!("═══ Files ═══");
        println!("  Completed: {}", self.completed_files);
        println!("  Failed: {}", self.failed_files.len());
        for (peer, file, reason) in &self.failed_files {
            println!("    peer {} / {}: {}", peer, file, reason);
        }
        if !self.corrupted_files.is_empty() {
            println!("  Corrupted: {}", self.corrupted_files.len());
            for (peer, file) in &self.corrupted_files {
                println!("    peer {} / {}", peer, file);
            }
        }
        println!("  Manifest Conflicts: {}", self.conflicts);
        println!();

        println!("═══ Downloads ═══");
        println!("  Requests: {}", self.download.requests);
        println!("  Verified: {}", self.download.verified);
        println!("  NACKs: {}", self.download.nacks);
        println!("  Mismatches: {}", self.download.mismatches);
        println!("  Timeouts: {}", self.download.timeouts);
        println!("  Seeder Refreshes: {}", self.download.refreshes);
        if self.download.requests > 0 {
            let hit_rate = self.download.verified as f64 / self.download.requests as f64 * 100.0;
            println!("  Hit Rate: {:.1}%", hit_rate);
        }
        println!();

        println!("═══ Uploads ═══");
        println!("  Served: {}", self.upload.served);
        println!("  NACKed: {}", self.upload.nacked);
        println!("  Ignored: {}", self.upload.ignored);
        if !self.served_by.is_empty() {
            let max = self.served_by.values().copied().max().unwrap_or(0);
            for (seeder, count) in &self.served_by {
                let bar_len = if max > 0 { count * 40 / max } else { 0 };
                println!("  peer {:>4}: {:>6} {}", seeder, count, "█".repeat(bar_len));
            }
        }
        println!();

        println!("═══ Seeders ═══");
        for (file, count) in &self.seeders_per_file {
            println!("  {}: {}", file, count);
        }
        println!();

        println!("═══ Message Overhead ═══");
        println!("  Total Messages: {}", self.network.total());
        println!("  Control: {}", self.network.control);
        println!("  Directory Replies: {}", self.network.directory);
        println!("  Segment Requests: {}", self.network.segment_requests);
        println!("  Responses: {}", self.network.responses);
        println!();
    }
}
