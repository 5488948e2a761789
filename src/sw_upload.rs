use log::{debug, warn};

use crate::sw_channel::{Endpoint, Received, Source, Tag};
use crate::sw_error::SwarmError;
use crate::sw_interface::{Message, ParticipantId, RequestId, SegmentHash, SegmentIndex, TRACKER_ID};
use crate::sw_peer::SharedStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    /// Requests answered with a stored hash
    pub served: usize,
    /// Requests answered with the negative acknowledgement
    pub nacked: usize,
    /// Messages that were neither a request nor the directory's shutdown
    pub ignored: usize,
}

/// Serves segment requests from the peer's own store until the directory
/// sends shutdown. Only ever reads the store.
pub struct UploadEngine {
    endpoint: Endpoint,
    store: SharedStore,
    stats: UploadStats,
}

impl UploadEngine {
    pub fn new(endpoint: Endpoint, store: SharedStore) -> Self {
        Self {
            endpoint,
            store,
            stats: UploadStats::default(),
        }
    }

    pub async fn run(mut self) -> Result<UploadStats, SwarmError> {
        loop {
            let Received { source, message } = self
                .endpoint
                .receive(Source::Any, Tag::SegmentTransfer)
                .await?;

            match message {
                Message::SegmentRequest {
                    file,
                    index,
                    request,
                } => self.answer(source, &file, index, request)?,
                Message::Shutdown if source == TRACKER_ID => {
                    debug!("peer {} upload stopping", self.endpoint.id());
                    break;
                }
                other => {
                    warn!(
                        "peer {} upload ignoring {} from {}",
                        self.endpoint.id(),
                        other.kind(),
                        source
                    );
                    self.stats.ignored += 1;
                }
            }
        }

        Ok(self.stats)
    }

    fn answer(
        &mut self,
        requester: ParticipantId,
        file: &str,
        index: SegmentIndex,
        request: RequestId,
    ) -> Result<(), SwarmError> {
        let held = self.store.lock().segment(file, index);

        let hash = match held {
            Some(hash) => {
                self.stats.served += 1;
                hash
            }
            None => {
                self.stats.nacked += 1;
                SegmentHash::NACK
            }
        };

        self.endpoint.send(
            requester,
            Tag::Response(request),
            &Message::SegmentReply { index, hash },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sw_channel::Network;
    use crate::sw_peer::SegmentStore;
    use indexmap::IndexMap;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn store_with(file: &str, hashes: &[&str]) -> SharedStore {
        let mut owned = IndexMap::new();
        owned.insert(
            file.to_string(),
            hashes.iter().map(|h| h.parse().unwrap()).collect(),
        );
        Arc::new(Mutex::new(SegmentStore::from_owned(owned)))
    }

    fn request(file: &str, index: SegmentIndex, request: RequestId) -> Message {
        Message::SegmentRequest {
            file: file.to_string(),
            index,
            request,
        }
    }

    #[tokio::test]
    async fn test_serves_owned_and_nacks_missing() {
        let network = Network::new(2);
        let uploader = UploadEngine::new(network.endpoint(1).unwrap(), store_with("doc", &["d0"]));
        let downloader = network.endpoint(2).unwrap();
        let tracker = network.endpoint(TRACKER_ID).unwrap();

        let handle = tokio::spawn(uploader.run());

        downloader.send(1, Tag::SegmentTransfer, &request("doc", 0, 10)).unwrap();
        downloader.send(1, Tag::SegmentTransfer, &request("doc", 1, 11)).unwrap();
        downloader.send(1, Tag::SegmentTransfer, &request("other", 0, 12)).unwrap();

        let first = downloader.receive(Source::Only(1), Tag::Response(10)).await.unwrap();
        assert_eq!(
            first.message,
            Message::SegmentReply {
                index: 0,
                hash: "d0".parse().unwrap()
            }
        );
        for (id, index) in [(11, 1), (12, 0)] {
            let reply = downloader.receive(Source::Only(1), Tag::Response(id)).await.unwrap();
            assert_eq!(
                reply.message,
                Message::SegmentReply {
                    index,
                    hash: SegmentHash::NACK
                }
            );
        }

        tracker.send(1, Tag::SegmentTransfer, &Message::Shutdown).unwrap();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(
            stats,
            UploadStats {
                served: 1,
                nacked: 2,
                ignored: 0
            }
        );
    }

    #[tokio::test]
    async fn test_shutdown_only_from_directory() {
        let network = Network::new(2);
        let uploader = UploadEngine::new(network.endpoint(1).unwrap(), store_with("doc", &["d0"]));
        let other = network.endpoint(2).unwrap();
        let tracker = network.endpoint(TRACKER_ID).unwrap();

        let handle = tokio::spawn(uploader.run());

        other.send(1, Tag::SegmentTransfer, &Message::Shutdown).unwrap();
        other.send(1, Tag::SegmentTransfer, &request("doc", 0, 1)).unwrap();
        let reply = other.receive(Source::Only(1), Tag::Response(1)).await.unwrap();
        assert!(matches!(reply.message, Message::SegmentReply { index: 0, .. }));

        tracker.send(1, Tag::SegmentTransfer, &Message::Shutdown).unwrap();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.served, 1);
    }

    #[tokio::test]
    async fn test_requests_after_shutdown_go_unanswered() {
        let network = Network::new(2);
        let uploader = UploadEngine::new(network.endpoint(1).unwrap(), store_with("doc", &["d0"]));
        let downloader = network.endpoint(2).unwrap();
        let tracker = network.endpoint(TRACKER_ID).unwrap();

        tracker.send(1, Tag::SegmentTransfer, &Message::Shutdown).unwrap();
        downloader.send(1, Tag::SegmentTransfer, &request("doc", 0, 3)).unwrap();

        let stats = uploader.run().await.unwrap();
        assert_eq!(stats, UploadStats::default());
        // the late request is still parked in the uploader's mailbox
        assert_eq!(network.pending(), 1);
    }
}
