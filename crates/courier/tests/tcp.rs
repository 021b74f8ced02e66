//! Sessions over real TCP sockets, found through the peer address cache.

use std::sync::Arc;

use courier::sync::peers;
use courier::{Courier, CourierConfig, Niceness, Outcome, Pkt, PktType};
use courier_testkit::{init_tracing, TestNode};
use tokio::net::TcpListener;

fn courier(node: &TestNode) -> Arc<Courier> {
    Arc::new(Courier::new(
        node.identity.clone(),
        node.neighbors.clone(),
        node.spool.clone(),
        CourierConfig::default(),
    ))
}

#[tokio::test]
async fn test_dial_cached_address_and_serve() -> anyhow::Result<()> {
    init_tracing();
    let (alice_node, bob_node) = TestNode::pair();
    let alice = courier(&alice_node);
    let bob = courier(&bob_node);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(bob.clone().serve(listener));

    peers::init();
    assert!(matches!(
        alice.dial(&bob.id()).await,
        Err(courier::CourierError::NoAddress(_))
    ));
    peers::insert(bob.id(), addr)?;

    let pkt = Pkt::new(PktType::File, Niceness::FLASH, "hello.txt")?;
    alice.enqueue("bob", pkt, &b"over tcp"[..]).await?;

    let report = alice.dial(&bob.id()).await?;
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.tx_packets, 1);

    let jobs = bob.inbound(&alice.id()).await?;
    assert_eq!(jobs.len(), 1);
    let (_, body) = bob.open_inbound(&jobs[0]).await?;
    assert_eq!(body, b"over tcp");

    server.abort();
    peers::teardown();
    Ok(())
}
