//! End-to-end sessions between two nodes over in-memory transports.

use std::time::{Duration, Instant};

use courier::spool::{Direction, PacketState, Spool};
use courier::sync::{memory_pair, FaultClass};
use courier::{Courier, CourierConfig, Niceness, Outcome, PacketHash, SyncConfig};
use courier_testkit::fixtures::payload;
use courier_testkit::{init_tracing, CutAfter, TestNode};

fn courier(node: &TestNode, sync: SyncConfig) -> Courier {
    Courier::new(
        node.identity.clone(),
        node.neighbors.clone(),
        node.spool.clone(),
        CourierConfig::default().with_sync(sync),
    )
}

fn queued(node: &TestNode, to: &TestNode, count: u8, nice: Niceness, len: usize) -> Vec<PacketHash> {
    (0..count)
        .map(|i| node.enqueue(to, nice, &payload(i, len)))
        .collect()
}

#[tokio::test]
async fn test_convergence_respects_niceness_ceiling() -> anyhow::Result<()> {
    init_tracing();
    let (alice_node, bob_node) = TestNode::pair();
    let mut wanted = queued(&alice_node, &bob_node, 3, Niceness::PRIORITY, 5_000);
    wanted.extend(queued(&alice_node, &bob_node, 2, Niceness::NORMAL, 70_000));
    let unwanted = queued(&alice_node, &bob_node, 2, Niceness::BULK, 1_000);

    let alice = courier(&alice_node, SyncConfig::default().with_nice(Niceness::NORMAL));
    let bob = courier(&bob_node, SyncConfig::default());

    let (a, b) = memory_pair(64 * 1024);
    let bob_id = bob.id();
    let (ra, rb) = tokio::join!(alice.call(&bob_id, a), bob.accept(b));
    let (ra, rb) = (ra?, rb?);
    assert_eq!(ra.outcome, Outcome::Completed);
    assert_eq!(rb.outcome, Outcome::Completed);

    let mut received: Vec<PacketHash> = bob.inbound(&alice.id()).await?.iter().map(|j| j.hash).collect();
    received.sort();
    wanted.sort();
    assert_eq!(received, wanted);

    let mut left: Vec<PacketHash> = alice.outbound(&bob.id()).await?.iter().map(|j| j.hash).collect();
    left.sort();
    let mut unwanted = unwanted;
    unwanted.sort();
    assert_eq!(left, unwanted);

    assert_eq!(rb.rx_packets, 5);
    assert_eq!(ra.tx_packets, 5);
    Ok(())
}

#[tokio::test]
async fn test_received_packets_open_to_original_payload() -> anyhow::Result<()> {
    let (alice_node, bob_node) = TestNode::pair();
    let body = payload(9, 100_000);
    alice_node.enqueue(&bob_node, Niceness::NORMAL, &body);

    let alice = courier(&alice_node, SyncConfig::default());
    let bob = courier(&bob_node, SyncConfig::default());
    let (a, b) = memory_pair(64 * 1024);
    let bob_id = bob.id();
    let (ra, rb) = tokio::join!(alice.call(&bob_id, a), bob.accept(b));
    assert!(ra?.is_success() && rb?.is_success());

    let jobs = bob.inbound(&alice.id()).await?;
    assert_eq!(jobs.len(), 1);
    let (pkt, opened) = bob.open_inbound(&jobs[0]).await?;
    assert_eq!(pkt.path, b"payload.bin");
    assert_eq!(pkt.nice, Niceness::NORMAL);
    assert_eq!(opened, body);

    bob.mark_seen(&jobs[0]).await?;
    assert!(bob.inbound(&alice.id()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_interrupted_transfer_resumes() -> anyhow::Result<()> {
    init_tracing();
    let (alice_node, bob_node) = TestNode::pair();
    let hash = alice_node.enqueue(&bob_node, Niceness::NORMAL, &payload(3, 1 << 20));
    let size = alice_node.spool.jobs(&bob_node.id(), Direction::Tx).await?[0].size;

    let alice = courier(&alice_node, SyncConfig::default());
    let bob = courier(&bob_node, SyncConfig::default());

    // First session: the link drops after about 300 KB.
    let (a, b) = memory_pair(64 * 1024);
    let bob_id = bob.id();
    let (ra, rb) = tokio::join!(alice.call(&bob_id, CutAfter::new(a, 300_000)), bob.accept(b));
    let (first_a, first_b) = (ra?, rb?);
    assert!(matches!(
        first_a.outcome,
        Outcome::Failed {
            class: FaultClass::Transport,
            ..
        }
    ));
    assert!(first_b.outcome.is_failure());

    let have = match bob_node.spool.packet_state(&alice.id(), &hash).await? {
        PacketState::Partial(have) => have,
        other => panic!("expected a partial packet, found {other:?}"),
    };
    assert!(have > 0 && have < size);
    assert_eq!(alice.outbound(&bob.id()).await?.len(), 1);

    // Second session picks up where the first stopped.
    let (a, b) = memory_pair(64 * 1024);
    let bob_id = bob.id();
    let (ra, rb) = tokio::join!(alice.call(&bob_id, a), bob.accept(b));
    let (second_a, second_b) = (ra?, rb?);
    assert_eq!(second_b.outcome, Outcome::Completed);
    assert_eq!(second_b.rx_bytes, size - have);
    assert!(second_b.rx_bytes < size);
    assert_eq!(second_a.tx_bytes, size - have);

    assert_eq!(
        bob_node.spool.packet_state(&alice.id(), &hash).await?,
        PacketState::Complete
    );
    assert!(alice.outbound(&bob.id()).await?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_packet_rate_limit_paces_transfer() -> anyhow::Result<()> {
    const RATE: u32 = 4;
    let (alice_node, bob_node) = TestNode::pair();
    queued(&alice_node, &bob_node, (5 * RATE) as u8, Niceness::NORMAL, 200);

    let alice = courier(&alice_node, SyncConfig::default().with_tx_rate(RATE));
    let bob = courier(&bob_node, SyncConfig::default());

    let started = Instant::now();
    let (a, b) = memory_pair(64 * 1024);
    let bob_id = bob.id();
    let (ra, rb) = tokio::join!(alice.call(&bob_id, a), bob.accept(b));
    let elapsed = started.elapsed();
    assert!(ra?.is_success());
    assert_eq!(rb?.rx_packets, u64::from(5 * RATE));

    // Twenty starts at four per second: nineteen waits of 250 ms.
    assert!(elapsed >= Duration::from_millis(4_500), "took {elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn test_accept_rejects_when_pool_is_full() -> anyhow::Result<()> {
    let (_, bob_node) = TestNode::pair();
    let bob = Courier::new(
        bob_node.identity.clone(),
        bob_node.neighbors.clone(),
        bob_node.spool.clone(),
        CourierConfig::default().with_max_sessions(1),
    );
    let _busy = bob.pool().try_admit()?;

    let (_a, b) = memory_pair(1024);
    let err = bob.accept(b).await.unwrap_err();
    assert!(matches!(
        err,
        courier::CourierError::Sync(courier::sync::SyncError::PoolFull)
    ));
    Ok(())
}

#[tokio::test]
async fn test_area_packet_reaches_member() -> anyhow::Result<()> {
    let (alice_node, bob_node, area) = TestNode::pair_in_area([42; 32]);
    let alice = courier(&alice_node, SyncConfig::default());
    let bob = courier(&bob_node, SyncConfig::default());

    let pkt = courier::Pkt::new(courier::PktType::Area, Niceness::NORMAL, "board")?;
    let queued = alice.enqueue_area(&area, "bob", pkt, &b"to everyone"[..]).await?;
    assert_eq!(queued.via, bob.id());

    let (a, b) = memory_pair(64 * 1024);
    let bob_id = bob.id();
    let (ra, rb) = tokio::join!(alice.call(&bob_id, a), bob.accept(b));
    assert!(ra?.is_success() && rb?.is_success());

    let jobs = bob.inbound(&alice.id()).await?;
    assert_eq!(jobs.len(), 1);
    let (pkt, body) = bob.open_inbound(&jobs[0]).await?;
    assert_eq!(pkt.kind, courier::PktType::Area);
    assert_eq!(body, b"to everyone");
    Ok(())
}
