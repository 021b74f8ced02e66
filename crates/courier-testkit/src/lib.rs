//! # Courier Testkit
//!
//! Testing utilities for Courier.
//!
//! ## Overview
//!
//! - **Fixtures**: nodes that know each other, each with a spool in a
//!   temporary directory
//! - **Generators**: proptest strategies for niceness, headers and payloads
//! - **Faults**: a transport wrapper that breaks after a byte budget
//!
//! ## Test Fixtures
//!
//! ```rust
//! use courier_testkit::fixtures::TestNode;
//! use courier_core::Niceness;
//!
//! let (alice, bob) = TestNode::pair();
//! let hash = alice.enqueue(&bob, Niceness::NORMAL, b"hello");
//! ```

pub mod fault;
pub mod fixtures;
pub mod generators;

pub use fault::CutAfter;
pub use fixtures::TestNode;

/// Send `tracing` output to the test harness, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
