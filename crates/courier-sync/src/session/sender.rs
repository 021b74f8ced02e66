//! Local → remote direction: offer the transmit queue and serve requests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use courier_core::{NodeId, Niceness, PacketHash, BLOCK_SIZE};
use courier_spool::{Direction, Job, Spool, SpoolError};
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{FaultClass, Result, SyncError};
use crate::messages::{limits, OfferedPacket, SpMessage};
use crate::rate::RateLimiter;
use crate::session::report::Counters;

/// Peer messages addressed to the sending direction.
#[derive(Debug)]
pub(crate) enum SenderEvent {
    Request { hash: PacketHash, offset: u64 },
    Done { hash: PacketHash },
    PeerFinished,
}

pub(crate) struct Sender {
    pub spool: Arc<dyn Spool>,
    pub peer: NodeId,
    pub ceiling: Niceness,
    pub config: SyncConfig,
    /// False when another process holds the transmit lock.
    pub locked: bool,
    pub control: mpsc::UnboundedSender<SpMessage>,
    pub data: mpsc::Sender<SpMessage>,
    pub events: mpsc::UnboundedReceiver<SenderEvent>,
    pub draining: watch::Receiver<bool>,
    pub counters: Arc<Counters>,
}

impl Sender {
    /// Returns true once the peer said it will request nothing more.
    pub async fn run(mut self) -> Result<bool> {
        let mut offered = self.offer().await?;
        let mut limiter = RateLimiter::new(self.config.tx_rate);
        let mut served = HashSet::new();

        loop {
            let event = tokio::select! {
                biased;
                event = self.events.recv() => event,
                _ = self.draining.changed() => return Ok(false),
            };
            match event {
                None => return Ok(false),
                Some(SenderEvent::PeerFinished) => {
                    debug!(peer = %self.peer, "peer finished requesting");
                    return Ok(true);
                }
                Some(SenderEvent::Done { hash }) => {
                    let Some(job) = offered.remove(&hash) else {
                        debug!(peer = %self.peer, %hash, "done for a packet not on offer");
                        continue;
                    };
                    if let Err(err) = self.spool.remove(&job).await {
                        // Still queued; the peer answers `Done` again next time.
                        warn!(peer = %self.peer, %hash, error = %err, "could not consume delivered packet");
                    }
                    if served.remove(&hash) {
                        self.counters.add_tx_packet();
                        info!(peer = %self.peer, %hash, size = job.size, "packet delivered");
                    } else {
                        info!(peer = %self.peer, %hash, "peer already had packet");
                    }
                }
                Some(SenderEvent::Request { hash, offset }) => {
                    if *self.draining.borrow() {
                        return Ok(false);
                    }
                    let job = offered.get(&hash).cloned().ok_or_else(|| {
                        SyncError::Protocol(format!("request for {hash}, which was not offered"))
                    })?;
                    limiter.until_ready().await;
                    match self.serve(&job, offset).await {
                        Ok(()) => {
                            served.insert(hash);
                        }
                        Err(err) if err.class() == FaultClass::Resource => {
                            warn!(peer = %self.peer, %hash, error = %err, "cannot serve packet; withdrawing it");
                            offered.remove(&hash);
                            self.send_control(SpMessage::Unavailable { hash })?;
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }

    /// Send the filtered queue in batches and keep it for lookups.
    async fn offer(&self) -> Result<HashMap<PacketHash, Job>> {
        let mut jobs = Vec::new();
        if self.locked {
            match self.spool.jobs(&self.peer, Direction::Tx).await {
                Ok(queued) => jobs.extend(
                    queued
                        .into_iter()
                        .filter(|job| self.config.admits(self.ceiling, &job.hash, job.header.nice)),
                ),
                Err(err) => {
                    warn!(peer = %self.peer, error = %err, "transmit queue unreadable; offering nothing")
                }
            }
        } else {
            warn!(peer = %self.peer, "transmit queue locked elsewhere; offering nothing");
        }
        jobs.sort_by_key(|job| (job.header.nice, job.hash));

        let entries: Vec<OfferedPacket> = jobs
            .iter()
            .map(|job| OfferedPacket {
                hash: job.hash,
                size: job.size,
                nice: job.header.nice,
            })
            .collect();
        debug!(peer = %self.peer, count = entries.len(), "offering packets");

        let mut batches = entries.chunks(limits::MAX_OFFER_BATCH).peekable();
        if batches.peek().is_none() {
            self.send_control(SpMessage::Offer {
                packets: Vec::new(),
                complete: true,
            })?;
        }
        while let Some(batch) = batches.next() {
            self.send_control(SpMessage::Offer {
                packets: batch.to_vec(),
                complete: batches.peek().is_none(),
            })?;
        }

        Ok(jobs.into_iter().map(|job| (job.hash, job)).collect())
    }

    /// Stream `job` from `offset` to its end in block-sized chunks.
    async fn serve(&mut self, job: &Job, offset: u64) -> Result<()> {
        if offset > job.size {
            return Err(SyncError::Protocol(format!(
                "request for {} at {offset} beyond its {} bytes",
                job.hash, job.size
            )));
        }
        if offset > 0 {
            info!(peer = %self.peer, hash = %job.hash, offset, "resuming transfer");
        }
        let mut reader = self.spool.open_read(job, offset).await?;
        let mut at = offset;
        let mut buf = vec![0u8; BLOCK_SIZE];
        while at < job.size {
            if *self.draining.borrow() {
                return Ok(());
            }
            let want = (job.size - at).min(BLOCK_SIZE as u64) as usize;
            reader
                .read_exact(&mut buf[..want])
                .await
                .map_err(SpoolError::Io)?;
            let chunk = SpMessage::Chunk {
                hash: job.hash,
                offset: at,
                payload: Bytes::copy_from_slice(&buf[..want]),
            };
            tokio::select! {
                sent = self.data.send(chunk) => sent.map_err(|_| SyncError::Closed)?,
                _ = self.draining.changed() => return Ok(()),
            }
            at += want as u64;
        }
        debug!(peer = %self.peer, hash = %job.hash, "packet sent");
        Ok(())
    }

    fn send_control(&self, msg: SpMessage) -> Result<()> {
        self.control.send(msg).map_err(|_| SyncError::Closed)
    }
}
