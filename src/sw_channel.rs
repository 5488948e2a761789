// Point-to-point message channel between participants
//
// Every participant owns a mailbox holding one FIFO queue per tag. A receive
// names a tag and optionally a source, and takes the oldest matching envelope
// without disturbing anything else, so order is kept per (sender, receiver,
// tag) and unrelated traffic is never misread.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use log::trace;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::sw_codec;
use crate::sw_error::ChannelError;
use crate::sw_interface::{Message, ParticipantId, RequestId};

// ============================================================================
// Tags and Envelopes
// ============================================================================

/// Category of a message, used by receivers to wait selectively
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Registration, start acknowledgement and everything the directory dispatches
    Control,
    /// Directory replies (manifest and seeder lists)
    DirectoryQuery,
    /// Segment requests and the upload shutdown signal
    SegmentTransfer,
    /// Reply to one specific segment request
    Response(RequestId),
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Control => f.write_str("control"),
            Tag::DirectoryQuery => f.write_str("directory-query"),
            Tag::SegmentTransfer => f.write_str("segment-transfer"),
            Tag::Response(request) => write!(f, "response({})", request),
        }
    }
}

/// Which senders a receive accepts
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Any,
    Only(ParticipantId),
}

impl Source {
    fn accepts(&self, sender: ParticipantId) -> bool {
        match self {
            Source::Any => true,
            Source::Only(id) => *id == sender,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Envelope {
    pub source: ParticipantId,
    pub destination: ParticipantId,
    pub tag: Tag,
    pub payload: Bytes,
}

/// A decoded message together with who sent it
#[derive(Clone, Debug, PartialEq)]
pub struct Received {
    pub source: ParticipantId,
    pub message: Message,
}

// ============================================================================
// Mailbox
// ============================================================================

#[derive(Default)]
struct Queues {
    by_tag: HashMap<Tag, VecDeque<Envelope>>,
    /// Tags nobody will receive on again; arrivals on them are dropped
    abandoned: HashSet<Tag>,
}

#[derive(Default)]
struct Mailbox {
    queues: Mutex<Queues>,
    arrived: Notify,
}

impl Mailbox {
    /// Returns false if the envelope was dropped for an abandoned tag
    fn push(&self, envelope: Envelope) -> bool {
        {
            let mut queues = self.queues.lock();
            if queues.abandoned.remove(&envelope.tag) {
                return false;
            }
            queues.by_tag.entry(envelope.tag).or_default().push_back(envelope);
        }
        self.arrived.notify_waiters();
        true
    }

    fn take(&self, source: Source, tag: Tag) -> Option<Envelope> {
        let mut queues = self.queues.lock();
        let queue = queues.by_tag.get_mut(&tag)?;
        let position = queue.iter().position(|e| source.accepts(e.source))?;
        let envelope = queue.remove(position)?;
        if queue.is_empty() {
            queues.by_tag.remove(&tag);
        }
        Some(envelope)
    }

    /// Drops whatever is queued on `tag`; if nothing was, the next arrival
    /// on it is dropped instead
    fn abandon(&self, tag: Tag) {
        let mut queues = self.queues.lock();
        if queues.by_tag.remove(&tag).is_none() {
            queues.abandoned.insert(tag);
        }
    }

    fn pending(&self) -> usize {
        self.queues.lock().by_tag.values().map(VecDeque::len).sum()
    }
}

// ============================================================================
// Network
// ============================================================================

/// Per-tag message counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub control: usize,
    pub directory: usize,
    pub segment_requests: usize,
    pub responses: usize,
}

impl NetworkStats {
    pub fn total(&self) -> usize {
        self.control + self.directory + self.segment_requests + self.responses
    }
}

#[derive(Default)]
struct Counters {
    control: AtomicUsize,
    directory: AtomicUsize,
    segment_requests: AtomicUsize,
    responses: AtomicUsize,
}

/// The set of mailboxes for one swarm run
pub struct Network {
    mailboxes: HashMap<ParticipantId, Mailbox>,
    counters: Counters,
}

impl Network {
    /// Creates mailboxes for the directory and peers `1..=num_peers`
    pub fn new(num_peers: u32) -> Arc<Self> {
        Self::with_participants(0..=num_peers)
    }

    pub fn with_participants(ids: impl IntoIterator<Item = ParticipantId>) -> Arc<Self> {
        let mailboxes = ids.into_iter().map(|id| (id, Mailbox::default())).collect();
        Arc::new(Self {
            mailboxes,
            counters: Counters::default(),
        })
    }

    /// Returns the endpoint a participant uses to send and receive
    pub fn endpoint(self: &Arc<Self>, id: ParticipantId) -> Result<Endpoint, ChannelError> {
        if !self.mailboxes.contains_key(&id) {
            return Err(ChannelError::UnknownParticipant(id));
        }
        Ok(Endpoint {
            id,
            network: Arc::clone(self),
        })
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            control: self.counters.control.load(Ordering::Relaxed),
            directory: self.counters.directory.load(Ordering::Relaxed),
            segment_requests: self.counters.segment_requests.load(Ordering::Relaxed),
            responses: self.counters.responses.load(Ordering::Relaxed),
        }
    }

    /// Messages delivered but not yet received by anyone
    pub fn pending(&self) -> usize {
        self.mailboxes.values().map(Mailbox::pending).sum()
    }

    fn mailbox(&self, id: ParticipantId) -> Result<&Mailbox, ChannelError> {
        self.mailboxes
            .get(&id)
            .ok_or(ChannelError::UnknownParticipant(id))
    }

    fn count(&self, tag: Tag) {
        let counter = match tag {
            Tag::Control => &self.counters.control,
            Tag::DirectoryQuery => &self.counters.directory,
            Tag::SegmentTransfer => &self.counters.segment_requests,
            Tag::Response(_) => &self.counters.responses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// One participant's handle on the network. Cheap to clone; the download and
/// upload engines of a peer each hold one.
#[derive(Clone)]
pub struct Endpoint {
    id: ParticipantId,
    network: Arc<Network>,
}

impl Endpoint {
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Hands `message` to the destination's mailbox. Completes as soon as the
    /// message is queued.
    pub fn send(
        &self,
        destination: ParticipantId,
        tag: Tag,
        message: &Message,
    ) -> Result<(), ChannelError> {
        let mailbox = self.network.mailbox(destination)?;
        trace!("{} -> {} [{}] {}", self.id, destination, tag, message.kind());

        let delivered = mailbox.push(Envelope {
            source: self.id,
            destination,
            tag,
            payload: sw_codec::encode(message),
        });
        if !delivered {
            trace!("{} dropped late {} on [{}]", destination, message.kind(), tag);
        }
        self.network.count(tag);
        Ok(())
    }

    /// Gives up on a one-shot tag such as a timed-out request's response.
    /// A reply already queued is discarded and one still in flight is
    /// dropped on arrival.
    pub fn abandon(&self, tag: Tag) -> Result<(), ChannelError> {
        self.network.mailbox(self.id)?.abandon(tag);
        Ok(())
    }

    /// Blocks until a message with `tag` from an accepted source arrives
    pub async fn receive(&self, source: Source, tag: Tag) -> Result<Received, ChannelError> {
        let mailbox = self.network.mailbox(self.id)?;

        loop {
            let notified = mailbox.arrived.notified();
            tokio::pin!(notified);
            // register before looking so a push in between still wakes us
            notified.as_mut().enable();

            if let Some(envelope) = mailbox.take(source, tag) {
                return self.open(envelope);
            }

            notified.await;
        }
    }

    /// Like [`Endpoint::receive`] but gives up after `limit`
    pub async fn receive_timeout(
        &self,
        source: Source,
        tag: Tag,
        limit: Duration,
    ) -> Result<Received, ChannelError> {
        match tokio::time::timeout(limit, self.receive(source, tag)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout {
                tag: tag.to_string(),
                millis: limit.as_millis(),
            }),
        }
    }

    /// Receives with an optional limit; `None` waits forever
    pub async fn receive_within(
        &self,
        source: Source,
        tag: Tag,
        limit: Option<Duration>,
    ) -> Result<Received, ChannelError> {
        match limit {
            Some(limit) => self.receive_timeout(source, tag, limit).await,
            None => self.receive(source, tag).await,
        }
    }

    fn open(&self, envelope: Envelope) -> Result<Received, ChannelError> {
        let message = sw_codec::decode(envelope.payload).map_err(|error| ChannelError::Decode {
            source_id: envelope.source,
            error,
        })?;
        Ok(Received {
            source: envelope.source,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sw_interface::SegmentHash;

    fn lookup(file: &str) -> Message {
        Message::LookupAndJoin {
            file: file.to_string(),
        }
    }

    #[tokio::test]
    async fn test_order_is_kept_per_sender_and_tag() {
        let network = Network::new(2);
        let a = network.endpoint(1).unwrap();
        let b = network.endpoint(2).unwrap();

        for file in ["one", "two", "three"] {
            a.send(2, Tag::Control, &lookup(file)).unwrap();
        }

        for file in ["one", "two", "three"] {
            let received = b.receive(Source::Only(1), Tag::Control).await.unwrap();
            assert_eq!(received.source, 1);
            assert_eq!(received.message, lookup(file));
        }
    }

    #[tokio::test]
    async fn test_receive_by_tag_leaves_other_traffic() {
        let network = Network::new(2);
        let a = network.endpoint(1).unwrap();
        let b = network.endpoint(2).unwrap();

        a.send(2, Tag::Control, &Message::ReportComplete).unwrap();
        a.send(2, Tag::Response(5), &Message::SegmentReply { index: 5, hash: SegmentHash::NACK })
            .unwrap();

        let reply = b.receive(Source::Any, Tag::Response(5)).await.unwrap();
        assert!(matches!(reply.message, Message::SegmentReply { index: 5, .. }));

        // a different response id must not match the control message or anything else
        let missing = b
            .receive_timeout(Source::Any, Tag::Response(6), Duration::from_millis(20))
            .await;
        assert!(matches!(missing, Err(ChannelError::Timeout { .. })));

        let control = b.receive(Source::Any, Tag::Control).await.unwrap();
        assert_eq!(control.message, Message::ReportComplete);
        assert_eq!(network.pending(), 0);
    }

    #[tokio::test]
    async fn test_source_filter_skips_other_senders() {
        let network = Network::new(3);
        let a = network.endpoint(1).unwrap();
        let b = network.endpoint(2).unwrap();
        let c = network.endpoint(3).unwrap();

        a.send(3, Tag::Control, &lookup("from-a")).unwrap();
        b.send(3, Tag::Control, &lookup("from-b")).unwrap();

        let received = c.receive(Source::Only(2), Tag::Control).await.unwrap();
        assert_eq!(received.message, lookup("from-b"));

        let received = c.receive(Source::Any, Tag::Control).await.unwrap();
        assert_eq!(received.source, 1);
    }

    #[tokio::test]
    async fn test_blocked_receiver_is_woken() {
        let network = Network::new(2);
        let a = network.endpoint(1).unwrap();
        let b = network.endpoint(2).unwrap();

        let waiter = tokio::spawn(async move { b.receive(Source::Any, Tag::SegmentTransfer).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        a.send(2, Tag::SegmentTransfer, &Message::Shutdown).unwrap();

        let received = waiter.await.unwrap().unwrap();
        assert_eq!(received.message, Message::Shutdown);
    }

    #[test]
    fn test_unknown_participant() {
        let network = Network::new(1);
        assert!(matches!(
            network.endpoint(7),
            Err(ChannelError::UnknownParticipant(7))
        ));

        let a = network.endpoint(1).unwrap();
        assert!(a.send(7, Tag::Control, &Message::StartAck).is_err());
    }

    #[test]
    fn test_stats_count_per_tag() {
        let network = Network::new(2);
        let a = network.endpoint(1).unwrap();

        a.send(0, Tag::Control, &Message::ReportComplete).unwrap();
        a.send(2, Tag::SegmentTransfer, &Message::Shutdown).unwrap();
        a.send(2, Tag::Response(1), &Message::StartAck).unwrap();

        let stats = network.stats();
        assert_eq!(stats.control, 1);
        assert_eq!(stats.segment_requests, 1);
        assert_eq!(stats.responses, 1);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_abandoned_response_is_dropped() {
        let network = Network::new(2);
        let a = network.endpoint(1).unwrap();
        let b = network.endpoint(2).unwrap();
        let reply = Message::SegmentReply {
            index: 0,
            hash: SegmentHash::NACK,
        };

        // late reply after the requester gave up
        b.abandon(Tag::Response(7)).unwrap();
        a.send(2, Tag::Response(7), &reply).unwrap();
        assert_eq!(network.pending(), 0);

        // only the first arrival is swallowed
        a.send(2, Tag::Response(7), &reply).unwrap();
        assert_eq!(network.pending(), 1);

        // reply already queued when the requester gave up
        a.send(2, Tag::Response(8), &reply).unwrap();
        b.abandon(Tag::Response(8)).unwrap();
        b.abandon(Tag::Response(7)).unwrap();
        assert_eq!(network.pending(), 0);

        a.send(2, Tag::Response(8), &reply).unwrap();
        assert_eq!(network.pending(), 1);
        assert_eq!(network.stats().responses, 5);
    }
}
