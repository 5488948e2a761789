use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info};
use parking_lot::Mutex;

use crate::sw_channel::{Endpoint, Source, Tag};
use crate::sw_download::{CompletedFile, DownloadConfig, DownloadEngine, DownloadStats, FailedFile};
use crate::sw_error::SwarmError;
use crate::sw_interface::{Manifest, Message, ParticipantId, SegmentHash, SegmentIndex, TRACKER_ID};
use crate::sw_manifest::PeerInput;
use crate::sw_upload::{UploadEngine, UploadStats};

// ============================================================================
// Segment Store
// ============================================================================

/// Segments a peer currently holds, per file, in index order.
///
/// Appended to by the download engine and read by the upload engine; the
/// two share it through [`SharedStore`].
#[derive(Debug, Clone, Default)]
pub struct SegmentStore {
    files: IndexMap<String, Vec<SegmentHash>>,
}

pub type SharedStore = Arc<Mutex<SegmentStore>>;

impl SegmentStore {
    pub fn from_owned(owned: IndexMap<String, Manifest>) -> Self {
        Self { files: owned }
    }

    pub fn segment(&self, file: &str, index: SegmentIndex) -> Option<SegmentHash> {
        self.files.get(file)?.get(index as usize).copied()
    }

    /// Number of leading segments held for `file`
    pub fn held(&self, file: &str) -> usize {
        self.files.get(file).map_or(0, Vec::len)
    }

    pub fn append(&mut self, file: &str, hash: SegmentHash) {
        match self.files.get_mut(file) {
            Some(segments) => segments.push(hash),
            None => {
                self.files.insert(file.to_string(), vec![hash]);
            }
        }
    }

    pub fn file(&self, file: &str) -> &[SegmentHash] {
        self.files.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The registration payload: every file held at this point
    pub fn registration(&self) -> Vec<(String, Manifest)> {
        self.files
            .iter()
            .map(|(name, segments)| (name.clone(), segments.clone()))
            .collect()
    }
}

// ============================================================================
// Peer
// ============================================================================

/// Outcome of one peer's run
#[derive(Debug, Clone)]
pub struct PeerReport {
    pub id: ParticipantId,
    /// Wanted files that finished, in completion order
    pub completed: Vec<CompletedFile>,
    pub failed: Vec<FailedFile>,
    pub download: DownloadStats,
    pub upload: UploadStats,
    pub served_by: BTreeMap<ParticipantId, usize>,
}

impl PeerReport {
    pub fn completed_file(&self, name: &str) -> Option<&CompletedFile> {
        self.completed.iter().find(|f| f.name == name)
    }
}

/// A swarm participant running a download and an upload engine side by side
pub struct Peer {
    endpoint: Endpoint,
    store: SharedStore,
    wanted: Vec<String>,
    config: DownloadConfig,
}

impl Peer {
    pub fn new(endpoint: Endpoint, input: PeerInput, config: DownloadConfig) -> Self {
        Self {
            endpoint,
            store: Arc::new(Mutex::new(SegmentStore::from_owned(input.owned))),
            wanted: input.wanted,
            config,
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.endpoint.id()
    }

    /// Handle on the peer's store, for inspection while or after it runs
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Registers with the directory, waits for the start signal, then runs
    /// both engines until the download side is done and the directory has
    /// stopped the upload side.
    pub async fn run(self) -> Result<PeerReport, SwarmError> {
        let id = self.id();
        let files = self.store.lock().registration();
        debug!("peer {} registering {} files", id, files.len());
        self.endpoint
            .send(TRACKER_ID, Tag::Control, &Message::Register { files })?;

        let start = self
            .endpoint
            .receive(Source::Only(TRACKER_ID), Tag::Control)
            .await?;
        if start.message != Message::StartAck {
            return Err(SwarmError::UnexpectedMessage {
                expected: "StartAck",
                got: start.message.kind(),
                from: start.source,
            });
        }

        let upload = UploadEngine::new(self.endpoint.clone(), self.store());
        let upload_task = tokio::spawn(upload.run());

        let download = DownloadEngine::new(self.endpoint.clone(), self.store(), self.config.clone());
        let downloads = match download.run(&self.wanted).await {
            Ok(report) => report,
            Err(err) => {
                upload_task.abort();
                return Err(err);
            }
        };

        let upload = upload_task
            .await
            .map_err(|e| SwarmError::Task(e.to_string()))??;

        info!(
            "peer {} done: {} complete, {} failed, served {}",
            id,
            downloads.completed.len(),
            downloads.failed.len(),
            upload.served
        );

        Ok(PeerReport {
            id,
            completed: downloads.completed,
            failed: downloads.failed,
            download: downloads.stats,
            upload,
            served_by: downloads.served_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(token: &str) -> SegmentHash {
        token.parse().unwrap()
    }

    #[test]
    fn test_store_append_and_read() {
        let mut store = SegmentStore::default();
        assert_eq!(store.held("movie"), 0);
        assert_eq!(store.segment("movie", 0), None);

        store.append("movie", hash("h0"));
        store.append("movie", hash("h1"));

        assert_eq!(store.held("movie"), 2);
        assert_eq!(store.segment("movie", 1), Some(hash("h1")));
        assert_eq!(store.segment("movie", 2), None);
        assert_eq!(store.file("movie"), &[hash("h0"), hash("h1")]);
    }

    #[test]
    fn test_registration_keeps_input_order() {
        let input = PeerInput::new()
            .owning("zeta", vec![hash("z0")])
            .owning("alpha", vec![hash("a0"), hash("a1")]);
        let store = SegmentStore::from_owned(input.owned);

        let files = store.registration();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0], ("zeta".to_string(), vec![hash("z0")]));
        assert_eq!(files[1], ("alpha".to_string(), vec![hash("a0"), hash("a1")]));
    }
}
