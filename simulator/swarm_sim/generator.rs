// Swarm Input Generation

use super::config::{SwarmScenarioConfig, WantSpec};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use sw_rust::{Manifest, PeerInput, SegmentHash};

/// Builds per-peer inputs from a scenario description
pub struct SwarmGenerator {
    rng: StdRng,
    seed: u64,
}

impl SwarmGenerator {
    pub fn new(rng: StdRng, seed: u64) -> Self {
        Self { rng, seed }
    }

    /// Manifest of a generated file; depends only on name, length and seed
    pub fn manifest(&self, name: &str, segments: usize) -> Manifest {
        (0..segments)
            .map(|i| SegmentHash::digest(format!("{}/{}/{}", self.seed, name, i).as_bytes()))
            .collect()
    }

    /// Input for peers 1..=config.peers, in id order
    pub fn generate(&mut self, config: &SwarmScenarioConfig) -> Vec<PeerInput> {
        let mut inputs: Vec<PeerInput> = (0..config.peers).map(|_| PeerInput::new()).collect();

        for file in &config.files {
            let manifest = self.manifest(&file.name, file.segments);
            for owner in &file.owners {
                inputs[*owner as usize - 1]
                    .owned
                    .insert(file.name.clone(), manifest.clone());
            }
        }

        let all_files: Vec<String> = config.files.iter().map(|f| f.name.clone()).collect();

        for (i, input) in inputs.iter_mut().enumerate() {
            let peer = i as u32 + 1;
            let missing: Vec<String> = all_files
                .iter()
                .filter(|f| !input.owned.contains_key(*f))
                .cloned()
                .collect();

            input.wanted = match &config.wants {
                WantSpec::Everything => missing,
                WantSpec::Random { files_per_peer } => missing
                    .choose_multiple(&mut self.rng, *files_per_peer)
                    .cloned()
                    .collect(),
                WantSpec::Explicit(wants) => wants.get(&peer).cloned().unwrap_or_default(),
            };
        }

        inputs
    }
}
