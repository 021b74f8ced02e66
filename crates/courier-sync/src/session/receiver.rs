//! Remote → local direction: fetch what the peer offers, one packet at a time.

use std::sync::Arc;

use bytes::Bytes;
use courier_core::{Niceness, NodeId, PacketHash};
use courier_spool::{Committed, PacketState, Spool};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{FaultClass, Result, SyncError};
use crate::messages::{OfferedPacket, SpMessage};
use crate::rate::RateLimiter;
use crate::session::report::Counters;

/// Transfer traffic routed to the receiving direction.
#[derive(Debug)]
pub(crate) enum ChunkIn {
    Data {
        hash: PacketHash,
        offset: u64,
        payload: Bytes,
    },
    /// The peer gave up serving `hash`.
    Unavailable { hash: PacketHash },
}

pub(crate) struct Receiver {
    pub spool: Arc<dyn Spool>,
    pub peer: NodeId,
    pub ceiling: Niceness,
    pub config: SyncConfig,
    /// Skip MTH verification; both sides asked for it.
    pub no_checksum: bool,
    /// False when another process holds the receive lock.
    pub locked: bool,
    pub control: mpsc::UnboundedSender<SpMessage>,
    pub offers: mpsc::UnboundedReceiver<(Vec<OfferedPacket>, bool)>,
    pub chunks: mpsc::Receiver<ChunkIn>,
    pub draining: watch::Receiver<bool>,
    pub counters: Arc<Counters>,
}

enum Fetched {
    Done,
    Skipped,
    Interrupted,
}

impl Receiver {
    /// Returns true once every wanted packet was handled and `Finished` sent.
    pub async fn run(mut self) -> Result<bool> {
        let Some(offered) = self.collect_offers().await else {
            return Ok(false);
        };
        if !self.locked {
            warn!(peer = %self.peer, "receive queue locked elsewhere; fetching nothing");
            self.send_control(SpMessage::Finished)?;
            return Ok(true);
        }

        let mut wanted: Vec<OfferedPacket> = offered
            .into_iter()
            .filter(|p| self.config.admits(self.ceiling, &p.hash, p.nice))
            .collect();
        wanted.sort_by_key(|p| (p.nice, p.hash));
        debug!(peer = %self.peer, count = wanted.len(), "fetching offered packets");

        let mut limiter = RateLimiter::new(self.config.rx_rate);
        for packet in wanted {
            if *self.draining.borrow() {
                return Ok(false);
            }
            match self.fetch(&packet, &mut limiter).await {
                Ok(Fetched::Done) | Ok(Fetched::Skipped) => {}
                Ok(Fetched::Interrupted) => return Ok(false),
                Err(err) if err.class() == FaultClass::Resource => {
                    warn!(peer = %self.peer, hash = %packet.hash, error = %err, "receive queue unusable; stopping");
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        self.send_control(SpMessage::Finished)?;
        Ok(true)
    }

    /// Gather offer batches until the peer marks one complete.
    async fn collect_offers(&mut self) -> Option<Vec<OfferedPacket>> {
        let mut offered = Vec::new();
        loop {
            let batch = tokio::select! {
                biased;
                batch = self.offers.recv() => batch,
                _ = self.draining.changed() => None,
            };
            let (packets, complete) = batch?;
            offered.extend(packets);
            if complete {
                return Some(offered);
            }
        }
    }

    async fn fetch(&mut self, packet: &OfferedPacket, limiter: &mut RateLimiter) -> Result<Fetched> {
        let hash = packet.hash;
        match self.spool.packet_state(&self.peer, &hash).await? {
            state if state.is_present() => {
                debug!(peer = %self.peer, %hash, ?state, "already have packet");
                self.send_control(SpMessage::Done { hash })?;
                return Ok(Fetched::Done);
            }
            PacketState::Bad => {
                warn!(peer = %self.peer, %hash, "packet failed verification before; not fetching again");
                return Ok(Fetched::Skipped);
            }
            _ => {}
        }

        limiter.until_ready().await;
        let mut partial = self.spool.create_resumable(&self.peer, &hash, packet.size).await?;
        if !partial.is_complete() {
            if partial.offset() > 0 {
                info!(peer = %self.peer, %hash, offset = partial.offset(), "resuming partial packet");
            }
            self.send_control(SpMessage::Request {
                hash,
                offset: partial.offset(),
            })?;
        }

        while !partial.is_complete() {
            let chunk = tokio::select! {
                biased;
                chunk = self.chunks.recv() => chunk,
                _ = self.draining.changed() => None,
            };
            let (at, payload) = match chunk {
                None => {
                    debug!(peer = %self.peer, %hash, offset = partial.offset(), "transfer interrupted");
                    return Ok(Fetched::Interrupted);
                }
                Some(ChunkIn::Unavailable { hash: withdrawn }) if withdrawn == hash => {
                    warn!(peer = %self.peer, %hash, offset = partial.offset(), "peer cannot serve packet; keeping partial");
                    return Ok(Fetched::Skipped);
                }
                Some(ChunkIn::Unavailable { hash: other }) => {
                    return Err(SyncError::Protocol(format!(
                        "{other} withdrawn while receiving {hash}"
                    )));
                }
                Some(ChunkIn::Data {
                    hash: got,
                    offset,
                    payload,
                }) => {
                    if got != hash || offset != partial.offset() || payload.is_empty() {
                        return Err(SyncError::Protocol(format!(
                            "unexpected chunk {got}@{offset} while receiving {hash}@{}",
                            partial.offset()
                        )));
                    }
                    (offset, payload)
                }
            };
            if at + payload.len() as u64 > packet.size {
                return Err(SyncError::Protocol(format!("chunk overruns {hash}")));
            }
            partial.write_at(at, &payload).await?;
            self.counters.add_rx_bytes(payload.len() as u64);
        }

        let committed = partial.commit(!self.no_checksum).await?;
        self.counters.add_rx_packet();
        debug!(peer = %self.peer, %hash, verified = committed == Committed::Verified, "acknowledging packet");
        self.send_control(SpMessage::Done { hash })?;
        Ok(Fetched::Done)
    }

    fn send_control(&self, msg: SpMessage) -> Result<()> {
        self.control.send(msg).map_err(|_| SyncError::Closed)
    }
}
