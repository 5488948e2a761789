use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashSet;
use log::{debug, info, trace, warn};

use crate::sw_channel::{Endpoint, Received, Source, Tag};
use crate::sw_error::SwarmError;
use crate::sw_interface::{Manifest, Message, ParticipantId};

// ============================================================================
// Directory State
// ============================================================================

/// Lifecycle of the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryPhase {
    /// Waiting for every peer's registration
    Collecting,
    /// Answering lookups until every peer reports completion
    Serving,
    /// Sending shutdown to every upload engine
    Draining,
    Done,
}

/// A registration that carried a different manifest for a known file name.
/// The first manifest stays authoritative and the peer is not advertised as
/// a seeder of that file.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestConflict {
    pub peer: ParticipantId,
    pub file: String,
}

/// Authoritative manifests and seeder sets. Owned by the tracker's dispatch
/// loop and never shared.
#[derive(Debug, Default)]
pub struct SwarmDirectory {
    manifests: BTreeMap<String, Manifest>,
    seeders: BTreeMap<String, BTreeSet<ParticipantId>>,
    registered: HashSet<ParticipantId>,
    completed: HashSet<ParticipantId>,
    conflicts: Vec<ManifestConflict>,
}

impl SwarmDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the files a peer owns. Returns false for a repeated
    /// registration, which changes nothing.
    pub fn register(&mut self, peer: ParticipantId, files: Vec<(String, Manifest)>) -> bool {
        if !self.registered.insert(peer) {
            return false;
        }

        for (file, manifest) in files {
            match self.manifests.get(&file) {
                Some(known) if *known != manifest => {
                    warn!("peer {} registered a conflicting manifest for {}", peer, file);
                    self.conflicts.push(ManifestConflict { peer, file });
                    continue;
                }
                Some(_) => {}
                None => {
                    self.manifests.insert(file.clone(), manifest);
                }
            }
            self.seeders.entry(file).or_default().insert(peer);
        }
        true
    }

    /// Adds `peer` as a seeder of `file` and returns the manifest with the
    /// seeder snapshot. `None` when no peer ever registered the file.
    pub fn lookup_and_join(
        &mut self,
        peer: ParticipantId,
        file: &str,
    ) -> Option<(Manifest, Vec<ParticipantId>)> {
        let manifest = self.manifests.get(file)?.clone();
        let seeders = self.seeders.entry(file.to_string()).or_default();
        seeders.insert(peer);
        Some((manifest, seeders.iter().copied().collect()))
    }

    pub fn refresh_seeders(&self, file: &str) -> Option<Vec<ParticipantId>> {
        self.manifests.get(file)?;
        Some(
            self.seeders
                .get(file)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default(),
        )
    }

    /// Returns false for a repeated report
    pub fn report_complete(&mut self, peer: ParticipantId) -> bool {
        self.completed.insert(peer)
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn manifest(&self, file: &str) -> Option<&Manifest> {
        self.manifests.get(file)
    }

    pub fn seeders(&self, file: &str) -> Option<&BTreeSet<ParticipantId>> {
        self.seeders.get(file)
    }

    pub fn conflicts(&self) -> &[ManifestConflict] {
        &self.conflicts
    }

    fn into_report(self) -> DirectoryReport {
        DirectoryReport {
            manifests: self.manifests,
            seeders: self.seeders,
            conflicts: self.conflicts,
        }
    }
}

/// Final directory state, handed back when the tracker terminates
#[derive(Debug, Clone, Default)]
pub struct DirectoryReport {
    pub manifests: BTreeMap<String, Manifest>,
    pub seeders: BTreeMap<String, BTreeSet<ParticipantId>>,
    pub conflicts: Vec<ManifestConflict>,
}

// ============================================================================
// Tracker
// ============================================================================

/// Single-threaded dispatcher in front of a [`SwarmDirectory`]
pub struct Tracker {
    endpoint: Endpoint,
    peers: Vec<ParticipantId>,
    directory: SwarmDirectory,
    phase: DirectoryPhase,
}

impl Tracker {
    pub fn new(endpoint: Endpoint, peers: Vec<ParticipantId>) -> Self {
        Self {
            endpoint,
            peers,
            directory: SwarmDirectory::new(),
            phase: DirectoryPhase::Collecting,
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.endpoint.id()
    }

    pub fn phase(&self) -> DirectoryPhase {
        self.phase
    }

    /// Runs the dispatch loop to the end: collect registrations, broadcast
    /// the start, serve lookups, then drain every upload engine.
    pub async fn run(mut self) -> Result<DirectoryReport, SwarmError> {
        if self.peers.is_empty() {
            self.phase = DirectoryPhase::Done;
            return Ok(self.directory.into_report());
        }

        while self.phase != DirectoryPhase::Draining {
            let received = self.endpoint.receive(Source::Any, Tag::Control).await?;
            self.dispatch(received)?;
        }

        info!("all {} peers complete, shutting down uploads", self.peers.len());
        for peer in &self.peers {
            self.endpoint.send(*peer, Tag::SegmentTransfer, &Message::Shutdown)?;
        }
        self.phase = DirectoryPhase::Done;

        Ok(self.directory.into_report())
    }

    /// Handles one inbound message to completion
    pub fn dispatch(&mut self, received: Received) -> Result<(), SwarmError> {
        let Received { source, message } = received;
        trace!("tracker <- {} {}", source, message.kind());

        if !self.peers.contains(&source) {
            warn!("tracker ignoring {} from non-member {}", message.kind(), source);
            return Ok(());
        }

        // nothing but registrations is answered before the start broadcast
        if self.phase == DirectoryPhase::Collecting && !matches!(message, Message::Register { .. }) {
            warn!("tracker dropping {} from {} before start", message.kind(), source);
            return Ok(());
        }

        match message {
            Message::Register { files } => {
                if self.phase != DirectoryPhase::Collecting {
                    warn!("late registration from {} ignored", source);
                    return Ok(());
                }
                if !self.directory.register(source, files) {
                    warn!("duplicate registration from {} ignored", source);
                    return Ok(());
                }
                debug!(
                    "registered peer {} ({}/{})",
                    source,
                    self.directory.registered_count(),
                    self.peers.len()
                );
                if self.directory.registered_count() == self.peers.len() {
                    self.broadcast_start()?;
                }
            }
            Message::LookupAndJoin { file } => match self.directory.lookup_and_join(source, &file) {
                Some((manifest, seeders)) => {
                    self.reply(source, &Message::LookupReply { manifest, seeders })?;
                }
                None => {
                    warn!("peer {} looked up unknown file {}", source, file);
                    self.reply(source, &Message::UnknownFile { file })?;
                }
            },
            Message::RefreshSeeders { file } => match self.directory.refresh_seeders(&file) {
                Some(seeders) => self.reply(source, &Message::SeedersReply { seeders })?,
                None => self.reply(source, &Message::UnknownFile { file })?,
            },
            Message::ReportComplete => {
                if !self.directory.report_complete(source) {
                    warn!("duplicate completion from {} ignored", source);
                    return Ok(());
                }
                info!(
                    "peer {} complete ({}/{})",
                    source,
                    self.directory.completed_count(),
                    self.peers.len()
                );
                if self.directory.completed_count() == self.peers.len() {
                    self.phase = DirectoryPhase::Draining;
                }
            }
            other => {
                warn!("tracker ignoring unexpected {} from {}", other.kind(), source);
            }
        }
        Ok(())
    }

    fn broadcast_start(&mut self) -> Result<(), SwarmError> {
        info!("all {} peers registered, starting swarm", self.peers.len());
        for peer in &self.peers {
            self.endpoint.send(*peer, Tag::Control, &Message::StartAck)?;
        }
        self.phase = DirectoryPhase::Serving;
        Ok(())
    }

    fn reply(&self, peer: ParticipantId, message: &Message) -> Result<(), SwarmError> {
        self.endpoint.send(peer, Tag::DirectoryQuery, message)?;
        Ok(())
    }
}
