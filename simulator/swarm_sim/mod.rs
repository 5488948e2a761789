// Swarm Simulator Module

pub mod config;
pub mod generator;
pub mod runner;
pub mod stats;

// Re-export what the scenario runner drives
pub use config::SwarmScenarioConfig;
pub use runner::SwarmScenarioRunner;
