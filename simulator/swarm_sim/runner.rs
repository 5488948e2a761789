// Swarm Simulation Runner

use super::config::SwarmScenarioConfig;
use super::generator::SwarmGenerator;
use super::stats::SimulationResult;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sw_rust::{run_swarm, SwarmConfig, SwarmError};

pub struct SwarmScenarioRunner {
    config: SwarmScenarioConfig,
}

impl SwarmScenarioRunner {
    pub fn new(config: SwarmScenarioConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<SimulationResult, SwarmError> {
        let seed = self
            .config
            .seed
            .unwrap_or_else(|| StdRng::from_entropy().gen());
        let rng = StdRng::seed_from_u64(seed);
        let mut generator = SwarmGenerator::new(rng, seed);

        let inputs = generator.generate(&self.config);
        let wanted: usize = inputs.iter().map(|i| i.wanted.len()).sum();
        info!(
            "generated {} peers, {} files, {} wanted downloads (seed {:#x})",
            inputs.len(),
            self.config.files.len(),
            wanted,
            seed
        );

        let swarm_config = SwarmConfig {
            download: self.config.download.clone(),
        };
        let report = run_swarm(inputs, &swarm_config).await?;

        // every completed file must equal the manifest it was generated from
        let mut corrupted = Vec::new();
        for peer in &report.peers {
            for file in &peer.completed {
                let expected = self
                    .config
                    .files
                    .iter()
                    .find(|f| f.name == file.name)
                    .map(|f| generator.manifest(&f.name, f.segments));
                if expected.as_ref() != Some(&file.segments) {
                    warn!("peer {} completed {} with wrong content", peer.id, file.name);
                    corrupted.push((peer.id, file.name.clone()));
                }
            }
        }

        Ok(SimulationResult::from_report(
            self.summary(),
            seed,
            &report,
            corrupted,
        ))
    }

    fn summary(&self) -> String {
        let segments: usize = self.config.files.iter().map(|f| f.segments).sum();
        format!(
            "{} peers, {} files, {} segments, batch {}",
            self.config.peers,
            self.config.files.len(),
            segments,
            self.config.download.batch_size
        )
    }
}
