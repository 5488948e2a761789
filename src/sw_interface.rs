use std::fmt;
use std::str::FromStr;

use crate::sw_error::ManifestError;

// all participants share one numeric id space; the directory sits at 0
pub type ParticipantId = u32;
pub type SegmentIndex = u32;
pub type RequestId = u64;

pub const TRACKER_ID: ParticipantId = 0;

/// Size in bytes of one segment identifier on the wire
pub const HASH_SIZE: usize = 32;

/// Segment fetches attempted between two seeder refreshes
pub const DOWNLOAD_BATCH_SIZE: usize = 10;

// ============================================================================
// Segment Hash
// ============================================================================

/// Fixed-length opaque identifier of one file segment.
///
/// Parsed from a 1..=32 byte ASCII token and zero padded. The all-zero value
/// is reserved for the negative acknowledgement and can never be parsed.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentHash([u8; HASH_SIZE]);

impl SegmentHash {
    pub const NACK: SegmentHash = SegmentHash([0u8; HASH_SIZE]);

    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn is_nack(&self) -> bool {
        *self == Self::NACK
    }

    /// Hash digest of `data` rendered as the 32 leading hex characters
    pub fn digest(data: &[u8]) -> Self {
        let hex = blake3::hash(data).to_hex();
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(&hex.as_bytes()[..HASH_SIZE]);
        Self(bytes)
    }

    fn trimmed(&self) -> &[u8] {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(HASH_SIZE);
        &self.0[..end]
    }
}

impl FromStr for SegmentHash {
    type Err = ManifestError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let raw = token.as_bytes();
        if raw.is_empty() || raw.len() > HASH_SIZE || !token.is_ascii() || raw.contains(&0) {
            return Err(ManifestError::InvalidHash {
                token: token.to_string(),
            });
        }
        let mut bytes = [0u8; HASH_SIZE];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self(bytes))
    }
}

impl fmt::Display for SegmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nack() {
            return f.write_str("NACK");
        }
        // parsing guarantees ASCII
        f.write_str(std::str::from_utf8(self.trimmed()).unwrap_or("<binary>"))
    }
}

impl fmt::Debug for SegmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentHash({})", self)
    }
}

/// Ordered segment hashes of a file; position is the segment index
pub type Manifest = Vec<SegmentHash>;

// ============================================================================
// Messages
// ============================================================================

/// Everything that travels between participants.
///
/// Requests to the directory are read from its control inbox, replies come
/// back on the directory-query tag. Segment traffic uses the segment-transfer
/// tag for requests and a per-request response tag for replies.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Register {
        files: Vec<(String, Manifest)>,
    },
    StartAck,
    LookupAndJoin {
        file: String,
    },
    LookupReply {
        manifest: Manifest,
        seeders: Vec<ParticipantId>,
    },
    RefreshSeeders {
        file: String,
    },
    SeedersReply {
        seeders: Vec<ParticipantId>,
    },
    UnknownFile {
        file: String,
    },
    ReportComplete,
    SegmentRequest {
        file: String,
        index: SegmentIndex,
        request: RequestId,
    },
    SegmentReply {
        index: SegmentIndex,
        hash: SegmentHash,
    },
    Shutdown,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Register { .. } => "Register",
            Message::StartAck => "StartAck",
            Message::LookupAndJoin { .. } => "LookupAndJoin",
            Message::LookupReply { .. } => "LookupReply",
            Message::RefreshSeeders { .. } => "RefreshSeeders",
            Message::SeedersReply { .. } => "SeedersReply",
            Message::UnknownFile { .. } => "UnknownFile",
            Message::ReportComplete => "ReportComplete",
            Message::SegmentRequest { .. } => "SegmentRequest",
            Message::SegmentReply { .. } => "SegmentReply",
            Message::Shutdown => "Shutdown",
        }
    }
}
