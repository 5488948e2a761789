//! # swRust - BitTorrent-like Swarm Simulation
//!
//! A fixed set of peers exchanges file segments under the coordination of a
//! single directory node (the tracker). The tracker never stores file data:
//! only the manifest of every file and which peers hold at least part of it.
//! Each peer downloads the files it wants segment by segment, straight from
//! other peers, while serving requests for the segments it already holds.
//!
//! ## Core Components
//!
//! - **Network / Endpoint**: reliable, ordered, tag-selective message channel
//! - **Tracker**: single-threaded dispatcher over the `SwarmDirectory`
//! - **DownloadEngine**: round-robin segment fetching, verification, reseeding
//! - **UploadEngine**: answers segment requests until the directory says stop
//! - **Peer**: registers, then runs both engines over one shared segment store
//!
//! ## Usage
//!
//! ```no_run
//! use sw_rust::{run_swarm, PeerInput, SegmentHash, SwarmConfig};
//!
//! # async fn demo() -> Result<(), sw_rust::SwarmError> {
//! let hashes: Vec<SegmentHash> = ["h0", "h1", "h2"]
//!     .iter()
//!     .map(|h| h.parse().unwrap())
//!     .collect();
//!
//! let inputs = vec![
//!     PeerInput::new().owning("movie", hashes),
//!     PeerInput::new().wanting("movie"),
//! ];
//!
//! let report = run_swarm(inputs, &SwarmConfig::default()).await?;
//! assert_eq!(report.peer(2).unwrap().completed[0].name, "movie");
//! # Ok(())
//! # }
//! ```
//!
//! ## Simulation
//!
//! Generated swarms described in YAML scenario files are run by the
//! `scenario_runner` binary in `simulator/`.

// Protocol
pub mod sw_channel;
pub mod sw_codec;
pub mod sw_error;
pub mod sw_interface;

// Participants
pub mod sw_download;
pub mod sw_peer;
pub mod sw_tracker;
pub mod sw_upload;

// I/O boundary and orchestration
pub mod sw_manifest;
pub mod sw_swarm;

// Re-export commonly used types
pub use sw_channel::{Endpoint, Network, NetworkStats, Source, Tag};
pub use sw_download::{DownloadConfig, DownloadEngine, SeederRotation};
pub use sw_error::SwarmError;
pub use sw_interface::{Manifest, Message, ParticipantId, SegmentHash, TRACKER_ID};
pub use sw_manifest::PeerInput;
pub use sw_peer::{Peer, PeerReport, SegmentStore};
pub use sw_swarm::{run_swarm, SwarmConfig, SwarmReport};
pub use sw_tracker::{SwarmDirectory, Tracker};
pub use sw_upload::UploadEngine;
