//! Proptest generators for property-based testing.

use proptest::prelude::*;

use courier_core::{NodeIdentity, Niceness, PacketHash, Pkt, PktType, MAX_PATH_LEN};

/// Any niceness byte.
pub fn niceness() -> impl Strategy<Value = Niceness> {
    any::<u8>().prop_map(Niceness)
}

/// One of the named niceness levels.
pub fn niceness_level() -> impl Strategy<Value = Niceness> {
    prop_oneof![
        Just(Niceness::FLASH),
        Just(Niceness::PRIORITY),
        Just(Niceness::NORMAL),
        Just(Niceness::BULK),
        Just(Niceness::MAX),
    ]
}

pub fn pkt_type() -> impl Strategy<Value = PktType> {
    prop_oneof![
        Just(PktType::File),
        Just(PktType::FileRequest),
        Just(PktType::Exec),
        Just(PktType::Transitional),
        Just(PktType::ExecUncompressed),
        Just(PktType::Area),
        Just(PktType::Ack),
    ]
}

/// A plaintext header with a path of up to the maximum length.
pub fn pkt() -> impl Strategy<Value = Pkt> {
    (
        pkt_type(),
        niceness(),
        proptest::collection::vec(any::<u8>(), 0..=MAX_PATH_LEN),
    )
        .prop_map(|(kind, nice, path)| Pkt::new(kind, nice, path).expect("path within limit"))
}

pub fn packet_hash() -> impl Strategy<Value = PacketHash> {
    any::<[u8; 32]>().prop_map(PacketHash)
}

/// A payload up to `max_len` bytes.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..=max_len)
}

/// A node identity derived from random secrets, with a transport key.
pub fn node_identity() -> impl Strategy<Value = NodeIdentity> {
    any::<([u8; 32], [u8; 32], [u8; 32])>()
        .prop_map(|(exchange, signing, noise)| NodeIdentity::from_secrets(exchange, signing, Some(noise)))
}
