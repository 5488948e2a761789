//! Error types of the swarm.
//!
//! Each concern has its own enum. `SwarmError` is what the participants and
//! the orchestration layer return and wraps the others.
use std::path::PathBuf;

use crate::sw_interface::{ParticipantId, SegmentIndex};

/// Failures of the message channel
#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("participant {0} is not part of the swarm")]
    UnknownParticipant(ParticipantId),

    #[error("timed out after {millis} ms waiting on {tag}")]
    Timeout { tag: String, millis: u128 },

    #[error("payload from {source_id} could not be decoded: {error}")]
    Decode {
        source_id: ParticipantId,
        error: CodecError,
    },
}

/// Failures decoding a wire frame
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("frame truncated: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    #[error("field is not valid UTF-8")]
    InvalidUtf8,

    #[error("declared length {0} exceeds the frame")]
    Oversized(usize),

    #[error("{0} trailing bytes after message")]
    Trailing(usize),
}

/// Failures reading or writing per-peer files
#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    #[error("can't access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("input ended while reading {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("expected a count, got {token:?}")]
    InvalidCount { token: String },

    #[error("invalid segment hash {token:?}")]
    InvalidHash { token: String },
}

/// Errors surfaced by the directory, the peers and the swarm runner
#[derive(thiserror::Error, Debug)]
pub enum SwarmError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("segment {index} of {file} unavailable after {attempts} attempts")]
    SegmentUnavailable {
        file: String,
        index: SegmentIndex,
        attempts: usize,
    },

    #[error("the directory has no manifest for {0}")]
    UnknownFile(String),

    #[error("held segments of {file} do not match the directory manifest")]
    ManifestMismatch { file: String },

    #[error("expected {expected}, got {got} from {from}")]
    UnexpectedMessage {
        expected: &'static str,
        got: &'static str,
        from: ParticipantId,
    },

    #[error("task failed: {0}")]
    Task(String),
}
