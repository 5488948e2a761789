// End-to-end swarm runs over the in-process network.

use std::collections::BTreeSet;
use std::fs;

use tempfile::TempDir;
use tokio::task::JoinHandle;

use sw_rust::sw_swarm::{load_inputs, write_outputs};
use sw_rust::{
    run_swarm, DownloadConfig, Endpoint, Manifest, Message, Network, Peer, PeerInput,
    ParticipantId, SegmentHash, Source, SwarmConfig, SwarmError, Tag, Tracker, TRACKER_ID,
};

fn hashes(tokens: &[&str]) -> Manifest {
    tokens.iter().map(|t| t.parse().unwrap()).collect()
}

fn quick_config(max_rounds: usize) -> DownloadConfig {
    DownloadConfig {
        request_timeout_ms: Some(200),
        max_rounds: Some(max_rounds),
        stall_backoff_ms: 5,
        ..DownloadConfig::default()
    }
}

/// Registers `files`, reports completion right after the start signal and
/// answers every segment request with NACK until shut down.
fn spawn_nack_peer(endpoint: Endpoint, files: Vec<(String, Manifest)>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        endpoint
            .send(TRACKER_ID, Tag::Control, &Message::Register { files })
            .unwrap();
        let start = endpoint
            .receive(Source::Only(TRACKER_ID), Tag::Control)
            .await
            .unwrap();
        assert_eq!(start.message, Message::StartAck);
        endpoint
            .send(TRACKER_ID, Tag::Control, &Message::ReportComplete)
            .unwrap();

        let mut nacked = 0;
        loop {
            let received = endpoint.receive(Source::Any, Tag::SegmentTransfer).await.unwrap();
            match received.message {
                Message::SegmentRequest { index, request, .. } => {
                    nacked += 1;
                    endpoint
                        .send(
                            received.source,
                            Tag::Response(request),
                            &Message::SegmentReply {
                                index,
                                hash: SegmentHash::NACK,
                            },
                        )
                        .unwrap();
                }
                Message::Shutdown => return nacked,
                other => panic!("unexpected {:?}", other),
            }
        }
    })
}

#[tokio::test]
async fn test_single_owner_single_downloader() {
    let movie = hashes(&["h0", "h1", "h2"]);
    let inputs = vec![
        PeerInput::new().owning("movie", movie.clone()),
        PeerInput::new().wanting("movie"),
    ];

    let report = run_swarm(inputs, &SwarmConfig::default()).await.unwrap();

    let peer2 = report.peer(2).unwrap();
    assert_eq!(peer2.completed_file("movie").unwrap().segments, movie);
    assert!(peer2.failed.is_empty());
    assert_eq!(peer2.served_by.get(&1), Some(&3));
    assert_eq!(peer2.download.nacks, 0);

    let peer1 = report.peer(1).unwrap();
    assert!(peer1.completed.is_empty());
    assert_eq!(peer1.upload.served, 3);

    let seeders: Vec<_> = report.directory.seeders["movie"].iter().copied().collect();
    assert_eq!(seeders, vec![1, 2]);
}

#[tokio::test]
async fn test_two_downloaders_share_a_document() {
    let doc: Manifest = (0..25)
        .map(|i| SegmentHash::digest(format!("doc/{}", i).as_bytes()))
        .collect();
    let inputs = vec![
        PeerInput::new().owning("doc", doc.clone()),
        PeerInput::new().wanting("doc"),
        PeerInput::new().wanting("doc"),
    ];

    let report = run_swarm(inputs, &SwarmConfig::default()).await.unwrap();

    for id in [2, 3] {
        let peer = report.peer(id).unwrap();
        assert_eq!(peer.completed_file("doc").unwrap().segments, doc);
        // nobody asks itself
        assert!(!peer.served_by.contains_key(&id));
        assert_eq!(peer.served_by.values().sum::<usize>(), doc.len());
    }

    let seeders: BTreeSet<ParticipantId> = report.directory.seeders["doc"].clone();
    assert_eq!(seeders, BTreeSet::from([1, 2, 3]));
    assert!(report.directory.conflicts.is_empty());
}

#[tokio::test]
async fn test_nack_retries_same_segment_elsewhere() {
    let file = hashes(&["s0", "s1", "s2", "s3"]);
    let network = Network::new(3);
    let tracker = tokio::spawn(Tracker::new(network.endpoint(TRACKER_ID).unwrap(), vec![1, 2, 3]).run());

    let owner = Peer::new(
        network.endpoint(1).unwrap(),
        PeerInput::new().owning("f", file.clone()),
        quick_config(16),
    );
    let owner = tokio::spawn(owner.run());
    let liar = spawn_nack_peer(network.endpoint(2).unwrap(), vec![("f".to_string(), file.clone())]);
    let downloader = Peer::new(
        network.endpoint(3).unwrap(),
        PeerInput::new().wanting("f"),
        quick_config(16),
    );
    let downloader = tokio::spawn(downloader.run());

    let report = downloader.await.unwrap().unwrap();
    assert_eq!(report.completed_file("f").unwrap().segments, file);
    assert!(report.download.nacks > 0);
    assert!(!report.served_by.contains_key(&2));
    assert_eq!(report.served_by.get(&1), Some(&file.len()));

    owner.await.unwrap().unwrap();
    assert!(liar.await.unwrap() > 0);
    tracker.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_refresh_is_idempotent_over_the_wire() {
    let network = Network::new(2);
    let tracker = tokio::spawn(Tracker::new(network.endpoint(TRACKER_ID).unwrap(), vec![1, 2]).run());
    let owner = network.endpoint(1).unwrap();
    let asker = network.endpoint(2).unwrap();

    owner
        .send(
            TRACKER_ID,
            Tag::Control,
            &Message::Register {
                files: vec![("f".to_string(), hashes(&["a"]))],
            },
        )
        .unwrap();
    asker
        .send(TRACKER_ID, Tag::Control, &Message::Register { files: Vec::new() })
        .unwrap();
    for endpoint in [&owner, &asker] {
        let start = endpoint.receive(Source::Only(TRACKER_ID), Tag::Control).await.unwrap();
        assert_eq!(start.message, Message::StartAck);
    }

    let refresh = Message::RefreshSeeders { file: "f".to_string() };
    let mut replies = Vec::new();
    for _ in 0..2 {
        asker.send(TRACKER_ID, Tag::Control, &refresh).unwrap();
        replies.push(
            asker
                .receive(Source::Only(TRACKER_ID), Tag::DirectoryQuery)
                .await
                .unwrap()
                .message,
        );
    }
    assert_eq!(replies[0], Message::SeedersReply { seeders: vec![1] });
    assert_eq!(replies[0], replies[1]);

    asker
        .send(TRACKER_ID, Tag::Control, &Message::LookupAndJoin { file: "f".to_string() })
        .unwrap();
    let joined = asker
        .receive(Source::Only(TRACKER_ID), Tag::DirectoryQuery)
        .await
        .unwrap();
    assert_eq!(
        joined.message,
        Message::LookupReply {
            manifest: hashes(&["a"]),
            seeders: vec![1, 2],
        }
    );

    for endpoint in [&owner, &asker] {
        endpoint.send(TRACKER_ID, Tag::Control, &Message::ReportComplete).unwrap();
    }
    for endpoint in [&owner, &asker] {
        let stop = endpoint.receive(Source::Only(TRACKER_ID), Tag::SegmentTransfer).await.unwrap();
        assert_eq!(stop.message, Message::Shutdown);
    }

    let directory = tracker.await.unwrap().unwrap();
    assert_eq!(directory.seeders["f"], BTreeSet::from([1, 2]));
}

#[tokio::test]
async fn test_unavailable_segment_fails_file_only() {
    let network = Network::new(2);
    let tracker = tokio::spawn(Tracker::new(network.endpoint(TRACKER_ID).unwrap(), vec![1, 2]).run());
    let ghost = hashes(&["g0", "g1"]);
    let liar = spawn_nack_peer(network.endpoint(1).unwrap(), vec![("ghost".to_string(), ghost)]);

    let downloader = Peer::new(
        network.endpoint(2).unwrap(),
        PeerInput::new().wanting("ghost"),
        quick_config(5),
    );
    let report = downloader.run().await.unwrap();

    assert!(report.completed.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "ghost");
    assert_eq!(report.download.verified, 0);
    assert_eq!(report.download.requests, 5);

    // the swarm still drains
    assert_eq!(liar.await.unwrap(), 5);
    tracker.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unknown_file_is_reported_and_skipped() {
    let inputs = vec![
        PeerInput::new().owning("real", hashes(&["r0"])),
        PeerInput::new().wanting("missing").wanting("real"),
    ];

    let report = run_swarm(inputs, &SwarmConfig::default()).await.unwrap();

    let peer2 = report.peer(2).unwrap();
    assert_eq!(peer2.failed.len(), 1);
    assert_eq!(peer2.failed[0].name, "missing");
    assert_eq!(peer2.completed_file("real").unwrap().segments, hashes(&["r0"]));
    assert!(!report.directory.seeders.contains_key("missing"));
}

#[tokio::test]
async fn test_conflicting_manifest_keeps_first() {
    let inputs = vec![
        PeerInput::new().owning("f", hashes(&["a0", "a1"])),
        PeerInput::new().owning("f", hashes(&["b0"])),
        PeerInput::new().wanting("f"),
    ];

    let report = run_swarm(inputs, &SwarmConfig::default()).await.unwrap();

    // registration order decides which owner wins
    assert_eq!(report.directory.conflicts.len(), 1);
    let conflicted = report.directory.conflicts[0].peer;
    let first = 3 - conflicted;
    assert!(!report.directory.seeders["f"].contains(&conflicted));

    let peer3 = report.peer(3).unwrap();
    assert_eq!(
        &peer3.completed_file("f").unwrap().segments,
        &report.directory.manifests["f"]
    );
    assert_eq!(peer3.served_by.keys().copied().collect::<Vec<_>>(), vec![first]);
}

#[tokio::test]
async fn test_files_in_files_out() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("in1.txt"), "1\nmovie 3\nh0 h1 h2\n0\n").unwrap();
    fs::write(dir.path().join("in2.txt"), "0\n1\nmovie\n").unwrap();

    let inputs = load_inputs(dir.path(), 2).unwrap();
    let report = run_swarm(inputs, &SwarmConfig::default()).await.unwrap();
    let written = write_outputs(dir.path(), &report).unwrap();

    assert_eq!(written, vec![dir.path().join("client2_movie")]);
    let text = fs::read_to_string(dir.path().join("client2_movie")).unwrap();
    assert_eq!(text, "h0\nh1\nh2");
}

#[tokio::test]
async fn test_missing_input_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("in1.txt"), "0\n0\n").unwrap();

    let err = load_inputs(dir.path(), 2).unwrap_err();
    assert!(matches!(err, SwarmError::Manifest(_)));
}

#[tokio::test]
async fn test_every_seeder_is_tried_before_giving_up() {
    // peers 2..=79 claim the file but hold nothing; only peer 80 serves it
    let doc = hashes(&["d0", "d1"]);
    let ids: Vec<ParticipantId> = (1..=80).collect();
    let network = Network::new(80);
    let tracker = tokio::spawn(Tracker::new(network.endpoint(TRACKER_ID).unwrap(), ids).run());

    let liars: Vec<_> = (2..=79)
        .map(|id| spawn_nack_peer(network.endpoint(id).unwrap(), vec![("doc".to_string(), doc.clone())]))
        .collect();
    let owner = Peer::new(
        network.endpoint(80).unwrap(),
        PeerInput::new().owning("doc", doc.clone()),
        DownloadConfig::default(),
    );
    let owner = tokio::spawn(owner.run());
    let downloader = Peer::new(
        network.endpoint(1).unwrap(),
        PeerInput::new().wanting("doc"),
        DownloadConfig::default(),
    );

    let report = downloader.run().await.unwrap();
    assert!(report.failed.is_empty(), "{:?}", report.failed);
    assert_eq!(report.completed_file("doc").unwrap().segments, doc);
    assert_eq!(report.served_by.keys().copied().collect::<Vec<_>>(), vec![80]);
    // each segment walks past all 78 empty seeders once
    assert_eq!(report.download.nacks, 2 * 78);

    let mut nacked = 0;
    for liar in liars {
        nacked += liar.await.unwrap();
    }
    assert_eq!(nacked, 2 * 78);
    owner.await.unwrap().unwrap();
    tracker.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_late_replies_do_not_pile_up() {
    let network = Network::new(2);
    let tracker = tokio::spawn(Tracker::new(network.endpoint(TRACKER_ID).unwrap(), vec![1, 2]).run());

    // answers nothing until the directory shuts it down, then everything at once
    let slow = network.endpoint(1).unwrap();
    let slow = tokio::spawn(async move {
        let files = vec![("late".to_string(), hashes(&["l0"]))];
        slow.send(TRACKER_ID, Tag::Control, &Message::Register { files }).unwrap();
        slow.receive(Source::Only(TRACKER_ID), Tag::Control).await.unwrap();
        slow.send(TRACKER_ID, Tag::Control, &Message::ReportComplete).unwrap();

        let mut held = Vec::new();
        loop {
            let received = slow.receive(Source::Any, Tag::SegmentTransfer).await.unwrap();
            match received.message {
                Message::SegmentRequest { index, request, .. } => held.push((received.source, index, request)),
                Message::Shutdown => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        for (requester, index, request) in &held {
            let reply = Message::SegmentReply {
                index: *index,
                hash: hashes(&["l0"])[0],
            };
            slow.send(*requester, Tag::Response(*request), &reply).unwrap();
        }
        held.len()
    });

    let downloader = Peer::new(
        network.endpoint(2).unwrap(),
        PeerInput::new().wanting("late"),
        quick_config(2),
    );
    let report = downloader.run().await.unwrap();
    assert_eq!(report.download.timeouts, 2);
    assert_eq!(report.failed.len(), 1);

    assert_eq!(slow.await.unwrap(), 2);
    tracker.await.unwrap().unwrap();
    assert_eq!(network.pending(), 0);
}

#[tokio::test]
async fn test_unbounded_mode_completes_shared_document() {
    let doc: Manifest = (0..12)
        .map(|i| SegmentHash::digest(format!("blocking/{}", i).as_bytes()))
        .collect();
    let inputs = vec![
        PeerInput::new().owning("doc", doc.clone()),
        PeerInput::new().wanting("doc"),
        PeerInput::new().wanting("doc"),
    ];
    let config = SwarmConfig {
        download: DownloadConfig::unbounded(),
    };

    let report = run_swarm(inputs, &config).await.unwrap();

    for id in [2, 3] {
        let peer = report.peer(id).unwrap();
        assert_eq!(peer.completed_file("doc").unwrap().segments, doc);
        assert_eq!(peer.download.timeouts, 0);
    }
    assert_eq!(report.directory.seeders["doc"], BTreeSet::from([1, 2, 3]));
}

