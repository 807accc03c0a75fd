//! End-to-end tests for murmur engines linked over in-memory streams.

use murmur_core::{Block, DecodePolicy, Encode, EngineConfig, WireHash, originate};
use murmur_integration_tests::{
    QUIET_PERIOD, TestNode, connect, expect_wire, inject, no_frame, raw_peer, raw_peer_with_buffer,
    read_frame, settle, test_key,
};
use std::collections::HashSet;
use std::io::Write;

// ============================================================================
// Delivery scenarios
// ============================================================================

#[tokio::test]
async fn test_direct_link_delivery() {
    let a = TestNode::start(0);
    let mut b = TestNode::start(1);
    connect(&a.engine, &b.engine);

    a.engine
        .send(b.engine.public_key(), Vec::new(), b"hello".to_vec())
        .unwrap();

    let block = b.next_block().await.expect("delivery");
    assert_eq!(block.payload(), b"hello");
    assert!(block.tail.is_from(a.engine.public_key()));
    assert!(block.head.is_to(b.engine.public_key()));
    assert!(block.verify().is_ok());
}

#[tokio::test]
async fn test_relay_through_node_that_cannot_decrypt() {
    let a = TestNode::start(0);
    let mut b = TestNode::start(1);
    let mut c = TestNode::start(2);
    connect(&a.engine, &c.engine);
    connect(&c.engine, &b.engine);

    let hash = a
        .engine
        .send(b.engine.public_key(), Vec::new(), b"route".to_vec())
        .unwrap();

    let block = b.next_block().await.expect("delivery through relay");
    assert_eq!(block.payload(), b"route");

    assert!(c.engine.has_seen(hash).await.unwrap());
    assert!(c.stays_quiet().await);

    let stats = c.engine.stats();
    assert_eq!(stats.forwarded, 1);
    assert_eq!(stats.delivered, 0);
}

#[tokio::test]
async fn test_parallel_links_deliver_once() {
    let a = TestNode::start(0);
    let mut b = TestNode::start(1);
    connect(&a.engine, &b.engine);
    connect(&a.engine, &b.engine);

    a.engine
        .send(b.engine.public_key(), Vec::new(), b"dup".to_vec())
        .unwrap();

    let block = b.next_block().await.expect("delivery");
    assert_eq!(block.payload(), b"dup");
    assert!(b.stays_quiet().await);

    let stats = b.settle(|s| s.duplicates_dropped >= 1).await;
    assert_eq!(stats.delivered, 1);
    assert!(stats.duplicates_dropped >= 1);
}

#[tokio::test]
async fn test_replayed_wire_not_rebroadcast() {
    let mut a = TestNode::start(0);
    let mut peer = raw_peer(&a.engine);

    let hash = a
        .engine
        .send(test_key(1).public_key(), Vec::new(), b"once".to_vec())
        .unwrap();

    let (frame, wire) = expect_wire(&mut peer).await;
    assert_eq!(wire.hash(), hash);

    // Replay only after the originated wire entered the seen set
    settle(&a.engine, |s| s.wires_received >= 1).await;
    assert!(a.engine.has_seen(hash).await.unwrap());
    inject(&mut peer, &frame).await;

    let stats = a.settle(|s| s.duplicates_dropped == 1).await;
    assert_eq!(stats.duplicates_dropped, 1);
    assert_eq!(stats.forwarded, 0);
    assert!(no_frame(&mut peer).await);
    assert!(a.stays_quiet().await);
}

#[tokio::test]
async fn test_tampered_tail_not_delivered() {
    let a = TestNode::start(0);
    let mut b = TestNode::start(1);
    let mut from_a = raw_peer(&a.engine);
    let mut to_b = raw_peer(&b.engine);

    a.engine
        .send(b.engine.public_key(), Vec::new(), b"tamper".to_vec())
        .unwrap();

    let (_, mut wire) = expect_wire(&mut from_a).await;
    let middle = wire.encrypted_tail.len() / 2;
    wire.encrypted_tail[middle] ^= 0x01;
    inject(&mut to_b, &wire.to_canonical_bytes()).await;

    let stats = b.settle(|s| s.bad_signatures + s.malformed == 1).await;
    assert_eq!(stats.bad_signatures + stats.malformed, 1);
    assert_eq!(stats.delivered, 0);
    assert!(b.stays_quiet().await);
}

#[tokio::test]
async fn test_forged_sender_not_delivered() {
    let a_key = test_key(0);
    let b_key = test_key(1);
    let mut c = TestNode::start(2);
    let mut peer = raw_peer(&c.engine);

    let mut block =
        Block::new_signed(a_key, c.engine.public_key(), Vec::new(), b"from b".to_vec()).unwrap();
    block.tail.from = b_key.public_key().clone();
    let wire = block.encode().unwrap();
    inject(&mut peer, &wire.to_canonical_bytes()).await;

    let stats = c.settle(|s| s.bad_signatures == 1).await;
    assert_eq!(stats.bad_signatures, 1);
    assert!(c.stays_quiet().await);
}

// ============================================================================
// Flooding
// ============================================================================

#[tokio::test]
async fn test_flood_reaches_end_of_chain() {
    let nodes: Vec<TestNode> = (0..5).map(TestNode::start).collect();
    for pair in nodes.windows(2) {
        connect(&pair[0].engine, &pair[1].engine);
    }
    let mut nodes = nodes;

    let target = nodes[4].engine.public_key().clone();
    let hash = nodes[0]
        .engine
        .send(&target, Vec::new(), b"end to end".to_vec())
        .unwrap();

    let block = nodes[4].next_block().await.expect("delivery at the far end");
    assert_eq!(block.payload(), b"end to end");

    for node in &nodes[1..4] {
        assert!(node.engine.has_seen(hash).await.unwrap());
        assert_eq!(node.engine.stats().forwarded, 1);
    }
}

#[tokio::test]
async fn test_flood_in_a_cycle_terminates() {
    let nodes: Vec<TestNode> = (0..4).map(TestNode::start).collect();
    for i in 0..nodes.len() {
        let next = (i + 1) % nodes.len();
        connect(&nodes[i].engine, &nodes[next].engine);
    }
    let mut nodes = nodes;

    let target = nodes[2].engine.public_key().clone();
    nodes[0]
        .engine
        .send(&target, Vec::new(), b"around".to_vec())
        .unwrap();

    assert!(nodes[2].next_block().await.is_some());
    assert!(nodes[2].stays_quiet().await);

    // Every relay forwards once; the rest are duplicates
    for node in &nodes[1..] {
        let stats = node.engine.stats();
        assert!(stats.forwarded <= 1);
    }
    for node in &nodes {
        assert_eq!(node.engine.seen_count().await.unwrap(), 1);
    }
}

#[tokio::test]
async fn test_repeated_injection_forwarded_once() {
    let relay = TestNode::start(2);
    let mut first = raw_peer(&relay.engine);
    let mut second = raw_peer(&relay.engine);

    let wire = originate(test_key(0), test_key(1).public_key(), Vec::new(), b"n".to_vec())
        .unwrap();
    let bytes = wire.to_canonical_bytes();

    for _ in 0..3 {
        inject(&mut first, &bytes).await;
    }
    for _ in 0..2 {
        inject(&mut second, &bytes).await;
    }

    let stats = relay.settle(|s| s.wires_received == 5).await;
    assert_eq!(stats.wires_received, 5);
    assert_eq!(stats.forwarded, 1);
    assert_eq!(stats.duplicates_dropped, 4);

    // Broadcast includes the link a wire arrived on
    let (_, back) = expect_wire(&mut first).await;
    let (_, other) = expect_wire(&mut second).await;
    assert_eq!(back, wire);
    assert_eq!(other, wire);
    assert!(no_frame(&mut first).await);
    assert!(no_frame(&mut second).await);
}

// ============================================================================
// Application API
// ============================================================================

#[tokio::test]
async fn test_parents_carried_to_recipient() {
    let a = TestNode::start(0);
    let mut b = TestNode::start(1);
    connect(&a.engine, &b.engine);

    let first = a
        .engine
        .send(b.engine.public_key(), Vec::new(), b"first".to_vec())
        .unwrap();
    let second = a
        .engine
        .send(b.engine.public_key(), vec![first], b"second".to_vec())
        .unwrap();
    assert_ne!(first, second);

    let mut blocks = vec![
        b.next_block().await.expect("first delivery"),
        b.next_block().await.expect("second delivery"),
    ];
    blocks.sort_by_key(|block| block.payload().to_vec());

    assert_eq!(blocks[0].payload(), b"first");
    assert!(blocks[0].parents().is_empty());
    assert_eq!(blocks[1].payload(), b"second");
    assert_eq!(blocks[1].parents(), &[first]);
}

#[tokio::test]
async fn test_streaming_sender_emits_one_block() {
    let a = TestNode::start(0);
    let mut b = TestNode::start(1);
    connect(&a.engine, &b.engine);

    let parent = WireHash::from_bytes([9u8; 64]);
    let mut sender = a
        .engine
        .sender(b.engine.public_key().clone())
        .with_parents(vec![parent]);
    for chunk in ["stream", "ed ", "payload"] {
        sender.write_all(chunk.as_bytes()).unwrap();
    }
    sender.flush().unwrap();
    sender.finish().unwrap();

    let block = b.next_block().await.expect("delivery");
    assert_eq!(block.payload(), b"streamed payload");
    assert_eq!(block.parents(), &[parent]);
    assert!(b.stays_quiet().await);
    assert_eq!(a.engine.stats().originated, 1);
}

#[tokio::test]
async fn test_self_loopback_can_be_disabled() {
    let config = EngineConfig {
        loopback_own: false,
        ..Default::default()
    };
    let mut a = TestNode::with_config(0, config);

    let hash = a
        .engine
        .send(a.engine.public_key(), Vec::new(), b"memo".to_vec())
        .unwrap();

    settle(&a.engine, |s| s.wires_received == 1).await;
    assert!(a.engine.has_seen(hash).await.unwrap());
    assert!(a.stays_quiet().await);
}

// ============================================================================
// Link policy
// ============================================================================

/// Delimited frame whose embedded key is unusable
fn undecodable_frame() -> Vec<u8> {
    use murmur_core::encoding::{put_bytes, put_u64};

    let mut bytes = Vec::new();
    put_bytes(&mut bytes, &[0x7F; 16]);
    put_u64(&mut bytes, 65537);
    put_bytes(&mut bytes, b"wrapped key");
    put_bytes(&mut bytes, b"encrypted tail");
    bytes
}

#[tokio::test]
async fn test_strict_policy_closes_link() {
    let mut b = TestNode::start(1);
    let mut peer = raw_peer(&b.engine);

    let wire = originate(test_key(0), b.engine.public_key(), Vec::new(), b"after".to_vec())
        .unwrap();
    inject(&mut peer, &undecodable_frame()).await;
    // Best effort: the link may already be gone
    let _ = tokio::io::AsyncWriteExt::write_all(&mut peer, &wire.to_canonical_bytes()).await;

    let stats = b.settle(|s| s.links_closed == 1).await;
    assert_eq!(stats.links_closed, 1);
    assert_eq!(stats.malformed, 1);
    assert_eq!(b.engine.link_count(), 0);
    assert!(b.stays_quiet().await);

    // The engine closed its write half too
    assert!(matches!(read_frame(&mut peer).await, Ok(None)));
}

#[tokio::test]
async fn test_permissive_policy_skips_frame() {
    let config = EngineConfig {
        decode_policy: DecodePolicy::Permissive,
        ..Default::default()
    };
    let mut b = TestNode::with_config(1, config);
    let mut peer = raw_peer(&b.engine);

    let wire = originate(test_key(0), b.engine.public_key(), Vec::new(), b"after".to_vec())
        .unwrap();
    inject(&mut peer, &undecodable_frame()).await;
    inject(&mut peer, &wire.to_canonical_bytes()).await;

    let block = b.next_block().await.expect("delivery after skipped frame");
    assert_eq!(block.payload(), b"after");

    let stats = b.engine.stats();
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.links_closed, 0);
}

#[tokio::test]
async fn test_oversized_field_closes_link_under_any_policy() {
    let config = EngineConfig {
        decode_policy: DecodePolicy::Permissive,
        max_field_len: 4096,
        ..Default::default()
    };
    let b = TestNode::with_config(1, config);
    let mut peer = raw_peer(&b.engine);

    inject(&mut peer, &[0x00, 0x10, 0x00, 0x00]).await;

    let stats = b.settle(|s| s.links_closed == 1).await;
    assert_eq!(stats.links_closed, 1);
    assert_eq!(stats.malformed, 1);
}

#[tokio::test]
async fn test_slow_reader_receives_every_wire() {
    let a = TestNode::start(0);
    let mut slow = raw_peer_with_buffer(&a.engine, 4096);

    // More than the link queue and the stream buffer hold together
    let mut sent = HashSet::new();
    for i in 0..400u32 {
        let hash = a
            .engine
            .send(test_key(1).public_key(), Vec::new(), i.to_be_bytes().to_vec())
            .unwrap();
        sent.insert(hash);
    }

    // Let the broadcaster run into the full queue before reading anything
    tokio::time::sleep(QUIET_PERIOD).await;

    let mut received = HashSet::new();
    while received.len() < sent.len() {
        let (_, wire) = expect_wire(&mut slow).await;
        received.insert(wire.hash());
    }
    assert_eq!(received, sent);
    assert!(no_frame(&mut slow).await);

    let stats = a.engine.stats();
    assert_eq!(stats.links_stalled, 0);
    assert_eq!(stats.links_closed, 0);
}

#[tokio::test]
async fn test_stalled_reader_is_disconnected() {
    let config = EngineConfig {
        link_queue_capacity: 1,
        link_write_timeout_ms: 100,
        ..Default::default()
    };
    let a = TestNode::with_config(0, config);
    let mut stalled = raw_peer_with_buffer(&a.engine, 1024);
    let mut healthy = raw_peer(&a.engine);

    for i in 0..8u32 {
        a.engine
            .send(test_key(1).public_key(), Vec::new(), i.to_be_bytes().to_vec())
            .unwrap();
    }

    // The healthy neighbour is not held back by the stalled one
    for _ in 0..8 {
        expect_wire(&mut healthy).await;
    }

    let stats = a.settle(|s| s.links_closed == 1).await;
    assert_eq!(stats.links_stalled, 1);
    assert_eq!(stats.links_closed, 1);
    assert_eq!(a.engine.link_count(), 1);

    // Whatever was buffered can still be read, then the stream ends
    let mut frames = 0;
    loop {
        match read_frame(&mut stalled).await {
            Ok(Some(_)) => frames += 1,
            Ok(None) | Err(_) => break,
        }
    }
    assert!(frames < 8);
}

#[tokio::test]
async fn test_peer_disconnect_closes_link() {
    let a = TestNode::start(0);
    let peer = raw_peer(&a.engine);
    assert_eq!(a.engine.link_count(), 1);

    drop(peer);

    let stats = a.settle(|s| s.links_closed == 1).await;
    assert_eq!(stats.links_closed, 1);
    assert_eq!(a.engine.link_count(), 0);

    // Broadcasting with no links still works
    a.engine
        .send(test_key(1).public_key(), Vec::new(), b"alone".to_vec())
        .unwrap();
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_flushes_and_closes() {
    let mut a = TestNode::start(0);
    let mut peer = raw_peer(&a.engine);

    let hash = a
        .engine
        .send(test_key(1).public_key(), Vec::new(), b"last words".to_vec())
        .unwrap();
    a.engine.shutdown().await;

    // Queued wire is written before the link closes
    let (_, wire) = expect_wire(&mut peer).await;
    assert_eq!(wire.hash(), hash);
    let end = tokio::time::timeout(QUIET_PERIOD * 10, read_frame(&mut peer))
        .await
        .expect("link closed");
    assert!(matches!(end, Ok(None)));

    assert!(a.deliveries.recv().await.is_none());
    assert!(matches!(
        a.engine
            .send(test_key(1).public_key(), Vec::new(), b"too late".to_vec()),
        Err(murmur_core::Error::Shutdown)
    ));

    a.engine.shutdown().await;
}
