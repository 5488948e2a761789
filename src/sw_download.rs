use std::cmp::min;
use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Deserialize;

use crate::sw_channel::{Endpoint, Source, Tag};
use crate::sw_error::{ChannelError, SwarmError};
use crate::sw_interface::{
    Manifest, Message, ParticipantId, RequestId, SegmentHash, SegmentIndex, DOWNLOAD_BATCH_SIZE,
    TRACKER_ID,
};
use crate::sw_peer::SharedStore;

// ============================================================================
// Configuration
// ============================================================================

/// Tuning of a peer's download engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Segments fetched between two seeder refreshes (default: 10)
    pub batch_size: usize,

    /// How long to wait for one segment reply; `None` waits forever (default: 2000)
    pub request_timeout_ms: Option<u64>,

    /// Full passes over the remote seeders for one segment before giving up
    /// on the file; `None` never gives up (default: 8)
    pub max_rounds: Option<usize>,

    /// Pause before asking the directory again when no other seeder is known (default: 20)
    pub stall_backoff_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            batch_size: DOWNLOAD_BATCH_SIZE,
            request_timeout_ms: Some(2000),
            max_rounds: Some(8),
            stall_backoff_ms: 20,
        }
    }
}

impl DownloadConfig {
    /// Unbounded, blocking retries: every request waits forever and a segment
    /// is retried until some seeder delivers it.
    pub fn unbounded() -> Self {
        Self {
            request_timeout_ms: None,
            max_rounds: None,
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    fn batch(&self) -> usize {
        self.batch_size.max(1)
    }
}

// ============================================================================
// Seeder Rotation
// ============================================================================

/// Round-robin cursor over the current seeder candidates. The cursor
/// survives list replacement so load keeps spreading across refreshes.
#[derive(Debug, Clone)]
pub struct SeederRotation {
    candidates: Vec<ParticipantId>,
    cursor: usize,
}

impl SeederRotation {
    pub fn new(candidates: Vec<ParticipantId>) -> Self {
        Self {
            candidates,
            cursor: 0,
        }
    }

    /// Next candidate other than `me`, or `None` if there is none
    pub fn next_excluding(&mut self, me: ParticipantId) -> Option<ParticipantId> {
        if self.remote_count(me) == 0 {
            return None;
        }

        loop {
            let candidate = self.candidates[self.cursor % self.candidates.len()];
            self.cursor = (self.cursor + 1) % self.candidates.len();
            if candidate != me {
                return Some(candidate);
            }
        }
    }

    pub fn replace(&mut self, candidates: Vec<ParticipantId>) {
        self.candidates = candidates;
        if !self.candidates.is_empty() {
            self.cursor %= self.candidates.len();
        }
    }

    pub fn remote_count(&self, me: ParticipantId) -> usize {
        self.candidates.iter().filter(|c| **c != me).count()
    }

    pub fn candidates(&self) -> &[ParticipantId] {
        &self.candidates
    }
}

// ============================================================================
// Reports
// ============================================================================

/// How one segment request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Verified(SegmentHash),
    Nack,
    Mismatch,
    Timeout,
}

/// Classifies a reply to a request for segment `index`
pub fn classify(expected: &SegmentHash, index: SegmentIndex, reply: &Message) -> FetchOutcome {
    match reply {
        Message::SegmentReply { index: got, hash } if *got == index => {
            if hash == expected {
                FetchOutcome::Verified(*hash)
            } else if hash.is_nack() {
                FetchOutcome::Nack
            } else {
                FetchOutcome::Mismatch
            }
        }
        _ => FetchOutcome::Mismatch,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub requests: usize,
    pub verified: usize,
    pub nacks: usize,
    pub mismatches: usize,
    pub timeouts: usize,
    pub refreshes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedFile {
    pub name: String,
    pub segments: Manifest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedFile {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    /// In completion order
    pub completed: Vec<CompletedFile>,
    pub failed: Vec<FailedFile>,
    pub stats: DownloadStats,
    /// Verified segments received from each seeder
    pub served_by: BTreeMap<ParticipantId, usize>,
}

// ============================================================================
// Download Engine
// ============================================================================

/// Fetches the wanted files one after another, appending verified segments
/// to the peer's store as they arrive.
pub struct DownloadEngine {
    endpoint: Endpoint,
    store: SharedStore,
    config: DownloadConfig,
    next_request: RequestId,
    stats: DownloadStats,
    served_by: BTreeMap<ParticipantId, usize>,
}

impl DownloadEngine {
    pub fn new(endpoint: Endpoint, store: SharedStore, config: DownloadConfig) -> Self {
        Self {
            endpoint,
            store,
            config,
            next_request: 0,
            stats: DownloadStats::default(),
            served_by: BTreeMap::new(),
        }
    }

    fn id(&self) -> ParticipantId {
        self.endpoint.id()
    }

    /// Processes every wanted file in order, then reports completion to the
    /// directory exactly once. A file that can't be finished is recorded as
    /// failed and does not stop the others.
    pub async fn run(mut self, wanted: &[String]) -> Result<DownloadReport, SwarmError> {
        let mut completed = Vec::new();
        let mut failed = Vec::new();

        for file in wanted {
            info!("peer {} fetching {}", self.id(), file);
            match self.fetch_file(file).await {
                Ok(segments) => {
                    info!("peer {} finished {} ({} segments)", self.id(), file, segments.len());
                    completed.push(CompletedFile {
                        name: file.clone(),
                        segments,
                    });
                }
                Err(
                    err @ (SwarmError::SegmentUnavailable { .. }
                    | SwarmError::UnknownFile(_)
                    | SwarmError::ManifestMismatch { .. }),
                ) => {
                    warn!("peer {} gave up on {}: {}", self.id(), file, err);
                    failed.push(FailedFile {
                        name: file.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        self.endpoint
            .send(TRACKER_ID, Tag::Control, &Message::ReportComplete)?;

        Ok(DownloadReport {
            completed,
            failed,
            stats: self.stats,
            served_by: self.served_by,
        })
    }

    async fn fetch_file(&mut self, file: &str) -> Result<Manifest, SwarmError> {
        let (manifest, seeders) = self.lookup(file).await?;
        let mut rotation = SeederRotation::new(seeders);

        // anything already held (owned or fetched earlier) is not fetched again
        let mut next = min(self.store.lock().held(file), manifest.len());

        while next < manifest.len() {
            let batch_end = min(next + self.config.batch(), manifest.len());

            while next < batch_end {
                let index = next as SegmentIndex;
                let hash = self
                    .fetch_segment(file, index, &manifest[next], &mut rotation)
                    .await?;
                self.store.lock().append(file, hash);
                next += 1;
            }

            if next < manifest.len() {
                self.reseed(file, &mut rotation).await?;
            }
        }

        let held = self.store.lock().file(file).to_vec();
        if held != manifest {
            return Err(SwarmError::ManifestMismatch {
                file: file.to_string(),
            });
        }
        Ok(held)
    }

    async fn fetch_segment(
        &mut self,
        file: &str,
        index: SegmentIndex,
        expected: &SegmentHash,
        rotation: &mut SeederRotation,
    ) -> Result<SegmentHash, SwarmError> {
        let mut attempts = 0;
        let mut failures = 0;
        // passes over every remote candidate, plus empty-handed reseeds
        let mut rounds = 0;

        loop {
            if let Some(max) = self.config.max_rounds {
                if rounds >= max {
                    return Err(SwarmError::SegmentUnavailable {
                        file: file.to_string(),
                        index,
                        attempts,
                    });
                }
            }

            let Some(seeder) = rotation.next_excluding(self.id()) else {
                debug!("peer {} has no remote seeder for {}", self.id(), file);
                tokio::time::sleep(Duration::from_millis(self.config.stall_backoff_ms)).await;
                self.reseed(file, rotation).await?;
                rounds += 1;
                continue;
            };
            attempts += 1;

            match self.request(seeder, file, index, expected).await? {
                FetchOutcome::Verified(hash) => {
                    self.stats.verified += 1;
                    *self.served_by.entry(seeder).or_default() += 1;
                    return Ok(hash);
                }
                FetchOutcome::Nack => {
                    self.stats.nacks += 1;
                    debug!("peer {}: {} lacks {}#{}", self.id(), seeder, file, index);
                }
                FetchOutcome::Mismatch => {
                    self.stats.mismatches += 1;
                    warn!("peer {}: {} sent a wrong hash for {}#{}", self.id(), seeder, file, index);
                }
                FetchOutcome::Timeout => {
                    self.stats.timeouts += 1;
                    debug!("peer {}: {} did not answer {}#{}", self.id(), seeder, file, index);
                }
            }

            // every remote candidate failed once: the list is stale
            failures += 1;
            if failures >= rotation.remote_count(self.id()) {
                self.reseed(file, rotation).await?;
                failures = 0;
                rounds += 1;
            }
        }
    }

    async fn request(
        &mut self,
        seeder: ParticipantId,
        file: &str,
        index: SegmentIndex,
        expected: &SegmentHash,
    ) -> Result<FetchOutcome, SwarmError> {
        let request = self.next_request;
        self.next_request += 1;
        self.stats.requests += 1;

        self.endpoint.send(
            seeder,
            Tag::SegmentTransfer,
            &Message::SegmentRequest {
                file: file.to_string(),
                index,
                request,
            },
        )?;

        let reply = self
            .endpoint
            .receive_within(
                Source::Only(seeder),
                Tag::Response(request),
                self.config.request_timeout(),
            )
            .await;

        match reply {
            Ok(reply) => Ok(classify(expected, index, &reply.message)),
            Err(ChannelError::Timeout { .. }) => {
                self.endpoint.abandon(Tag::Response(request))?;
                Ok(FetchOutcome::Timeout)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn lookup(&mut self, file: &str) -> Result<(Manifest, Vec<ParticipantId>), SwarmError> {
        let reply = self
            .ask_directory(Message::LookupAndJoin {
                file: file.to_string(),
            })
            .await?;

        match reply {
            Message::LookupReply { manifest, seeders } => Ok((manifest, seeders)),
            Message::UnknownFile { file } => Err(SwarmError::UnknownFile(file)),
            other => Err(SwarmError::UnexpectedMessage {
                expected: "LookupReply",
                got: other.kind(),
                from: TRACKER_ID,
            }),
        }
    }

    async fn reseed(&mut self, file: &str, rotation: &mut SeederRotation) -> Result<(), SwarmError> {
        self.stats.refreshes += 1;
        let reply = self
            .ask_directory(Message::RefreshSeeders {
                file: file.to_string(),
            })
            .await?;

        match reply {
            Message::SeedersReply { seeders } => {
                rotation.replace(seeders);
                Ok(())
            }
            Message::UnknownFile { file } => Err(SwarmError::UnknownFile(file)),
            other => Err(SwarmError::UnexpectedMessage {
                expected: "SeedersReply",
                got: other.kind(),
                from: TRACKER_ID,
            }),
        }
    }

    async fn ask_directory(&self, query: Message) -> Result<Message, SwarmError> {
        self.endpoint.send(TRACKER_ID, Tag::Control, &query)?;
        let reply = self
            .endpoint
            .receive(Source::Only(TRACKER_ID), Tag::DirectoryQuery)
            .await?;
        Ok(reply.message)
    }
}
