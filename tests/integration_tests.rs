//! Integration tests for two-person rooms.
//!
//! Exercises full exchanges between participants on a shared in-memory hub,
//! both room-to-room and against a raw channel that observes the wire.

use std::time::Duration;

use roomdrop_core::channel::{Delivery, TagReceiver};
use roomdrop_core::{
    FailureReason, FileDescriptor, LocalFile, MemoryChannelConfig, Metadata, PeerChannel,
    RoomConfig, RoomError, RoomEvent, Tag, TransferState, TransferStatus,
};
use roomdrop_integration_tests::fixtures::{TwoPeerFixture, next_event, wait_for};

/// Collect deliveries already queued on `rx`
async fn drain(rx: &mut TagReceiver) -> Vec<Delivery> {
    let mut out = Vec::new();
    while let Ok(Some(delivery)) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await
    {
        out.push(delivery);
    }
    out
}

fn doc_and_img() -> (LocalFile, LocalFile) {
    (
        LocalFile::from_bytes("doc.txt", vec![b'd'; 120]),
        LocalFile::from_bytes("img.png", (0..4096u32).map(|i| (i % 251) as u8).collect::<Vec<_>>()),
    )
}

// ============================================================================
// Wire-level scenarios
// ============================================================================

/// A shares two files; a raw peer sees the exact catalog and answer bytes.
#[tokio::test]
async fn test_catalog_and_download_on_the_wire() {
    let hub = roomdrop_core::MemoryHub::new();
    let room = roomdrop_core::RoomId::new("wire").unwrap();
    let mut alice = roomdrop_core::Room::join(&hub, room.clone(), RoomConfig::default())
        .await
        .unwrap()
        .into_room()
        .unwrap();

    let (doc, img) = doc_and_img();
    alice.add_file(doc).await.unwrap();
    alice.add_file(img).await.unwrap();

    let probe = hub.join(&room).unwrap();
    let mut catalog_rx = probe.subscribe(Tag::LocalFiles).unwrap();
    let mut download_rx = probe.subscribe(Tag::Download).unwrap();

    assert!(matches!(
        next_event(&mut alice).await.unwrap(),
        RoomEvent::PeerJoined(_)
    ));

    // Exactly one catalog, in the documented shape
    let catalogs = drain(&mut catalog_rx).await;
    assert_eq!(catalogs.len(), 1);
    match &catalogs[0] {
        Delivery::Message {
            payload, metadata, ..
        } => {
            assert_eq!(
                std::str::from_utf8(payload).unwrap(),
                r#"[{"name":"doc.txt","size":120},{"name":"img.png","size":4096}]"#
            );
            assert!(metadata.is_none());
        }
        other => panic!("unexpected delivery {other:?}"),
    }

    probe
        .send(Tag::RequestDownload, b"1".to_vec(), Some(alice.local_peer()), None)
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut alice).await.unwrap(),
        RoomEvent::FileServed {
            index: 1,
            size: 4096,
            ..
        }
    ));

    let deliveries = drain(&mut download_rx).await;
    let Some(Delivery::Message {
        payload, metadata, ..
    }) = deliveries.last()
    else {
        panic!("no content delivered");
    };
    assert_eq!(payload.len(), 4096);
    assert_eq!(payload[..4], [0, 1, 2, 3]);
    assert_eq!(*metadata, Some(Metadata { index: 1 }));
    assert!(
        deliveries[..deliveries.len() - 1]
            .iter()
            .all(|d| matches!(d, Delivery::Progress { .. }))
    );
}

/// A request for an index A does not have sends nothing back.
#[tokio::test]
async fn test_missing_index_sends_no_download() {
    let hub = roomdrop_core::MemoryHub::new();
    let room = roomdrop_core::RoomId::new("missing").unwrap();
    let mut alice = roomdrop_core::Room::join(&hub, room.clone(), RoomConfig::default())
        .await
        .unwrap()
        .into_room()
        .unwrap();
    alice
        .add_file(LocalFile::from_bytes("only.txt", b"x".to_vec()))
        .await
        .unwrap();

    let probe = hub.join(&room).unwrap();
    let mut download_rx = probe.subscribe(Tag::Download).unwrap();
    next_event(&mut alice).await.unwrap();

    probe
        .send(Tag::RequestDownload, b"7".to_vec(), None, None)
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut alice).await.unwrap(),
        RoomEvent::Error(RoomError::FileNotFound {
            index: 7,
            available: 1
        })
    );
    assert!(drain(&mut download_rx).await.is_empty());

    // The responder keeps serving afterwards
    probe
        .send(Tag::RequestDownload, b"0".to_vec(), None, None)
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut alice).await.unwrap(),
        RoomEvent::FileServed { index: 0, .. }
    ));
}

/// Garbage on a tag is reported, not fatal.
#[tokio::test]
async fn test_malformed_request_reported() {
    let hub = roomdrop_core::MemoryHub::new();
    let room = roomdrop_core::RoomId::new("junk").unwrap();
    let mut alice = roomdrop_core::Room::join(&hub, room.clone(), RoomConfig::default())
        .await
        .unwrap()
        .into_room()
        .unwrap();

    let probe = hub.join(&room).unwrap();
    next_event(&mut alice).await.unwrap();

    probe
        .send(Tag::RequestDownload, b"\"one\"".to_vec(), None, None)
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut alice).await.unwrap(),
        RoomEvent::Error(RoomError::Serialization(_))
    ));
    assert!(alice.is_connected());
}

/// Content whose length disagrees with the requested file is not stored.
#[tokio::test]
async fn test_content_from_shifted_catalog_rejected() {
    let hub = roomdrop_core::MemoryHub::new();
    let room = roomdrop_core::RoomId::new("late-shift").unwrap();
    let mut bob = roomdrop_core::Room::join(&hub, room.clone(), RoomConfig::default())
        .await
        .unwrap()
        .into_room()
        .unwrap();

    let sharer = hub.join(&room).unwrap();
    assert!(matches!(
        next_event(&mut bob).await.unwrap(),
        RoomEvent::PeerJoined(_)
    ));

    sharer
        .send(
            Tag::LocalFiles,
            br#"[{"name":"b.txt","size":4}]"#.to_vec(),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut bob).await.unwrap(),
        RoomEvent::RemoteCatalogUpdated(vec![FileDescriptor::new("b.txt", 4)])
    );
    bob.request_download(0).await.unwrap();

    // The sharer dropped a file and answers with what index 0 names now
    sharer
        .send(
            Tag::Download,
            b"CCCCCC".to_vec(),
            None,
            Some(Metadata { index: 0 }),
        )
        .await
        .unwrap();

    let (_, event) = wait_for(&mut bob, |e| {
        matches!(
            e,
            RoomEvent::TransferFailed { .. } | RoomEvent::DownloadComplete { .. }
        )
    })
    .await
    .unwrap();
    assert_eq!(
        event,
        RoomEvent::TransferFailed {
            index: 0,
            reason: FailureReason::CatalogChanged
        }
    );
    assert_eq!(
        bob.retrieve(0),
        Err(RoomError::BlobNotAvailable {
            index: 0,
            status: TransferStatus::Failed
        })
    );
}

// ============================================================================
// Room-to-room scenarios
// ============================================================================

/// A adds doc.txt and img.png; B downloads index 1 and gets the same bytes.
#[tokio::test]
async fn test_two_file_scenario() {
    let mut fixture = TwoPeerFixture::new("scenario").await.unwrap();
    let (doc, img) = doc_and_img();
    let expected = (0..4096u32).map(|i| (i % 251) as u8).collect::<Vec<_>>();

    fixture.alice.add_file(doc).await.unwrap();
    fixture.alice.add_file(img).await.unwrap();
    fixture.connect().await.unwrap();

    assert_eq!(
        fixture.bob.remote_files(),
        &[
            FileDescriptor::new("doc.txt", 120),
            FileDescriptor::new("img.png", 4096)
        ]
    );

    let blob = fixture.download(1).await.unwrap();
    assert_eq!(blob.as_bytes(), &expected[..]);
    assert_eq!(blob.media_type(), "application/octet-stream");
    assert_eq!(fixture.bob.transfer_state(0), TransferState::NotRequested);
}

/// Progress reaches 100 before completion and never goes down.
#[tokio::test]
async fn test_progress_is_monotonic() {
    let mut fixture = TwoPeerFixture::new_with_config(
        "progress",
        RoomConfig::default(),
        MemoryChannelConfig { chunk_size: 1000 },
    )
    .await
    .unwrap();
    fixture
        .alice
        .add_file(LocalFile::from_bytes("big.bin", vec![7u8; 10_000]))
        .await
        .unwrap();
    fixture.connect().await.unwrap();

    fixture.bob.request_download(0).await.unwrap();
    wait_for(&mut fixture.alice, |e| {
        matches!(e, RoomEvent::FileServed { .. })
    })
    .await
    .unwrap();

    let (skipped, _) = wait_for(&mut fixture.bob, |e| {
        matches!(e, RoomEvent::DownloadComplete { .. })
    })
    .await
    .unwrap();
    let percents: Vec<u8> = skipped
        .iter()
        .filter_map(|e| match e {
            RoomEvent::DownloadProgress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();

    assert_eq!(percents.len(), 10);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last().copied(), Some(100));
}

/// Removing the first file shifts indices; B's outstanding request is flagged.
#[tokio::test]
async fn test_removal_invalidates_shifted_request() {
    let mut fixture = TwoPeerFixture::new("shift").await.unwrap();
    let (doc, img) = doc_and_img();
    fixture.alice.add_file(doc).await.unwrap();
    fixture.alice.add_file(img).await.unwrap();
    fixture.connect().await.unwrap();

    fixture.bob.request_download(1).await.unwrap();
    fixture.alice.remove_file(0).await.unwrap();

    assert_eq!(
        next_event(&mut fixture.bob).await.unwrap(),
        RoomEvent::RemoteCatalogUpdated(vec![FileDescriptor::new("img.png", 4096)])
    );
    assert_eq!(
        next_event(&mut fixture.bob).await.unwrap(),
        RoomEvent::TransferFailed {
            index: 1,
            reason: FailureReason::CatalogChanged
        }
    );

    // A no longer has index 1
    assert!(matches!(
        next_event(&mut fixture.alice).await.unwrap(),
        RoomEvent::Error(RoomError::FileNotFound {
            index: 1,
            available: 1
        })
    ));

    // Requesting the file at its new index works
    let blob = fixture.download(0).await.unwrap();
    assert_eq!(blob.len(), 4096);
}

/// Retrieval before completion names the current status.
#[tokio::test]
async fn test_retrieve_before_complete() {
    let mut fixture = TwoPeerFixture::new("early").await.unwrap();
    fixture
        .alice
        .add_file(LocalFile::from_bytes("a.txt", b"abc".to_vec()))
        .await
        .unwrap();
    fixture.connect().await.unwrap();

    fixture.bob.request_download(0).await.unwrap();
    assert_eq!(
        fixture.bob.retrieve(0),
        Err(RoomError::BlobNotAvailable {
            index: 0,
            status: TransferStatus::Requested
        })
    );
    assert_eq!(
        fixture.bob.request_download(3).await,
        Err(RoomError::RemoteFileNotFound {
            index: 3,
            available: 1
        })
    );
}

/// A third participant is turned away and never becomes the peer.
#[tokio::test]
async fn test_intruder_rejected() {
    let mut fixture = TwoPeerFixture::new("crowded").await.unwrap();
    fixture.connect().await.unwrap();
    let bob_id = fixture.bob.local_peer().clone();

    let outcome = fixture.join_third().await.unwrap();
    assert!(matches!(
        outcome,
        roomdrop_core::JoinOutcome::RoomFull {
            participants: 2,
            ..
        }
    ));
    drop(outcome);

    // Both members saw the attempt as a capacity violation
    let event = next_event(&mut fixture.alice).await.unwrap();
    assert_eq!(event.severity(), roomdrop_core::Severity::Error);
    assert!(matches!(event, RoomEvent::Error(RoomError::RoomFull { .. })));
    assert!(matches!(
        next_event(&mut fixture.bob).await.unwrap(),
        RoomEvent::Error(RoomError::RoomFull { .. })
    ));

    assert_eq!(fixture.alice.peer(), Some(&bob_id));
    assert_eq!(fixture.hub.participants(&fixture.room), 2);
}

/// After the peer leaves, a newcomer takes its place and gets the catalog.
#[tokio::test]
async fn test_peer_replaced_after_leave() {
    let mut fixture = TwoPeerFixture::new("swap").await.unwrap();
    fixture
        .alice
        .add_file(LocalFile::from_bytes("keep.txt", b"keep".to_vec()))
        .await
        .unwrap();
    fixture
        .bob
        .add_file(LocalFile::from_bytes("bob.txt", b"bob".to_vec()))
        .await
        .unwrap();
    fixture.connect().await.unwrap();
    assert_eq!(fixture.alice.remote_files().len(), 1);

    let TwoPeerFixture {
        hub,
        room,
        mut alice,
        bob,
    } = fixture;
    bob.leave();

    assert!(matches!(
        next_event(&mut alice).await.unwrap(),
        RoomEvent::PeerLeft(_)
    ));
    assert!(alice.remote_files().is_empty());

    let mut carol = roomdrop_core::Room::join(&hub, room, RoomConfig::default())
        .await
        .unwrap()
        .into_room()
        .unwrap();
    assert!(matches!(
        next_event(&mut alice).await.unwrap(),
        RoomEvent::PeerJoined(_)
    ));
    assert_eq!(alice.peer(), Some(carol.local_peer()));

    let (_, event) = wait_for(&mut carol, |e| {
        matches!(e, RoomEvent::RemoteCatalogUpdated(_))
    })
    .await
    .unwrap();
    assert_eq!(
        event,
        RoomEvent::RemoteCatalogUpdated(vec![FileDescriptor::new("keep.txt", 4)])
    );
}

/// A finished download does not outlive the peer that served it.
#[tokio::test]
async fn test_completed_download_forgotten_after_peer_change() {
    let mut fixture = TwoPeerFixture::new("handover").await.unwrap();
    fixture
        .alice
        .add_file(LocalFile::from_bytes("alice.txt", b"ALICE".to_vec()))
        .await
        .unwrap();
    fixture.connect().await.unwrap();
    assert_eq!(fixture.download(0).await.unwrap().as_bytes(), b"ALICE");

    let TwoPeerFixture {
        hub,
        room,
        alice,
        mut bob,
    } = fixture;
    alice.leave();

    assert!(matches!(
        next_event(&mut bob).await.unwrap(),
        RoomEvent::PeerLeft(_)
    ));
    assert_eq!(bob.transfer_state(0), TransferState::NotRequested);

    let mut dave = roomdrop_core::Room::join(&hub, room, RoomConfig::default())
        .await
        .unwrap()
        .into_room()
        .unwrap();
    dave.add_file(LocalFile::from_bytes("dave.bin", b"DAVE's content".to_vec()))
        .await
        .unwrap();
    wait_for(&mut dave, |e| matches!(e, RoomEvent::PeerJoined(_)))
        .await
        .unwrap();

    let (_, event) = wait_for(&mut bob, |e| {
        matches!(e, RoomEvent::RemoteCatalogUpdated(_))
    })
    .await
    .unwrap();
    assert_eq!(
        event,
        RoomEvent::RemoteCatalogUpdated(vec![FileDescriptor::new("dave.bin", 14)])
    );
    assert_eq!(bob.transfer_state(0), TransferState::NotRequested);
    assert_eq!(
        bob.retrieve(0),
        Err(RoomError::BlobNotAvailable {
            index: 0,
            status: TransferStatus::NotRequested
        })
    );
}

/// A finished download is forgotten once its index names another file.
#[tokio::test]
async fn test_completed_download_forgotten_after_shift() {
    let mut fixture = TwoPeerFixture::new("shift-done").await.unwrap();
    for (name, data) in [("a.txt", "AA"), ("b.txt", "BBBB"), ("c.txt", "CCCCCC")] {
        fixture
            .alice
            .add_file(LocalFile::from_bytes(name, data.as_bytes().to_vec()))
            .await
            .unwrap();
    }
    fixture.connect().await.unwrap();
    assert_eq!(fixture.download(1).await.unwrap().as_bytes(), b"BBBB");

    fixture.alice.remove_file(0).await.unwrap();
    let (skipped, _) = wait_for(&mut fixture.bob, |e| {
        matches!(e, RoomEvent::RemoteCatalogUpdated(_))
    })
    .await
    .unwrap();
    assert!(
        skipped
            .iter()
            .all(|e| !matches!(e, RoomEvent::TransferFailed { .. }))
    );

    assert_eq!(
        fixture.bob.remote_files()[1],
        FileDescriptor::new("c.txt", 6)
    );
    assert_eq!(
        fixture.bob.retrieve(1),
        Err(RoomError::BlobNotAvailable {
            index: 1,
            status: TransferStatus::NotRequested
        })
    );

    // The new occupant of index 1 downloads normally
    assert_eq!(fixture.download(1).await.unwrap().as_bytes(), b"CCCCCC");
}

/// Files on disk are served from disk.
#[tokio::test]
async fn test_path_backed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.pdf");
    std::fs::write(&path, vec![0x25u8; 2048]).unwrap();

    let mut fixture = TwoPeerFixture::new("disk").await.unwrap();
    fixture
        .alice
        .add_file(LocalFile::from_path(&path).await.unwrap())
        .await
        .unwrap();
    fixture.connect().await.unwrap();
    assert_eq!(
        fixture.bob.remote_files(),
        &[FileDescriptor::new("report.pdf", 2048)]
    );

    let blob = fixture.download(0).await.unwrap();
    assert_eq!(blob.as_bytes(), &vec![0x25u8; 2048][..]);
}

/// Files over the limit never reach the catalog.
#[tokio::test]
async fn test_oversized_file_rejected() {
    let config = RoomConfig {
        max_file_size: 1024,
        ..Default::default()
    };
    let mut fixture =
        TwoPeerFixture::new_with_config("limit", config, MemoryChannelConfig::default())
            .await
            .unwrap();

    let err = fixture
        .alice
        .add_file(LocalFile::from_bytes("huge.iso", vec![0u8; 1025]))
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::FileTooLarge { size: 1025, limit: 1024, .. }));
    assert!(err.is_permanent());
    assert!(fixture.alice.local_files().is_empty());
}
