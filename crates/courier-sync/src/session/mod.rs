//! The SP session state machine.
//!
//! ```text
//! Handshaking → Negotiating → Exchanging → Draining → Closed
//!       └────────────┴─────────────┴───────────┴────→ Failed
//! ```
//!
//! After the handshake both roles behave identically. A session runs four
//! tasks over one transport:
//!
//! - **reader**: decrypts frames and hands messages to the control loop
//! - **writer**: encrypts outgoing messages, control before bulk chunks
//! - **sender**: offers the local transmit queue and serves requests
//! - **receiver**: fetches the peer's offers one packet at a time
//!
//! The control loop routes inbound messages and watches three deadlines:
//! the idle timeout, the duration ceiling and the peer's `Halt`. Any of them
//! moves the session to `Draining`, where a commit already under way is
//! allowed to finish before the transport closes. The session is idle when
//! nothing arrives from the peer and none of our frames gets written.

mod receiver;
pub mod report;
mod sender;

pub use report::{Outcome, Role, SessionReport, SessionState};

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use courier_core::{CoreError, NodeId, NodeIdentity, NodeRegistry};
use courier_spool::{Direction, Spool, SpoolLock};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::framing::{FrameOpener, FrameSealer};
use crate::handshake::{self, Established};
use crate::messages::{OfferedPacket, SpMessage};
use crate::transport::Transport;
use receiver::{ChunkIn, Receiver};
use report::Counters;
use sender::{Sender, SenderEvent};

/// How long draining waits for each task before aborting it.
const DRAIN_GRACE: Duration = Duration::from_secs(10);

/// What a session needs from the node hosting it.
#[derive(Clone)]
pub struct SessionContext {
    pub identity: Arc<NodeIdentity>,
    pub registry: Arc<dyn NodeRegistry>,
    pub spool: Arc<dyn Spool>,
    pub config: SyncConfig,
}

/// One sync session over one transport.
pub struct Session {
    ctx: SessionContext,
    role: Role,
    target: Option<NodeId>,
    state: watch::Sender<SessionState>,
}

/// Why the exchange loop stopped.
enum Stop {
    Completed,
    PeerHalt,
    Idle,
    MaxDuration,
    Failed(SyncError),
}

impl Session {
    /// A session that dials `peer`, which must be a neighbour.
    pub fn initiator(ctx: SessionContext, peer: NodeId) -> Self {
        Self::new(ctx, Role::Initiator, Some(peer))
    }

    /// A session answering whichever neighbour connected.
    pub fn responder(ctx: SessionContext) -> Self {
        Self::new(ctx, Role::Responder, None)
    }

    fn new(ctx: SessionContext, role: Role, target: Option<NodeId>) -> Self {
        let (state, _) = watch::channel(SessionState::Handshaking);
        Self {
            ctx,
            role,
            target,
            state,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Follow state transitions while the session runs.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run to a terminal state. The report is produced on every outcome.
    pub async fn run<T: Transport>(self, stream: T) -> SessionReport {
        let started_at = SystemTime::now();
        let start = Instant::now();
        let counters = Arc::new(Counters::default());
        let mut peer = self.target;

        let outcome = match self.drive(stream, &counters, &mut peer).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(peer = ?peer, role = ?self.role, error = %err, "session failed");
                Outcome::Failed {
                    class: err.class(),
                    reason: err.to_string(),
                }
            }
        };
        self.set_state(if outcome.is_failure() {
            SessionState::Failed
        } else {
            SessionState::Closed
        });

        let (rx_bytes, tx_bytes, rx_packets, tx_packets) = counters.snapshot();
        let report = SessionReport {
            peer,
            role: self.role,
            started_at,
            duration: start.elapsed(),
            rx_bytes,
            tx_bytes,
            rx_packets,
            tx_packets,
            outcome,
        };
        info!(
            peer = ?report.peer,
            role = ?report.role,
            outcome = %report.outcome,
            rx_packets,
            tx_packets,
            rx_bytes,
            tx_bytes,
            secs = report.duration.as_secs_f64(),
            "session closed"
        );
        report
    }

    async fn drive<T: Transport>(
        &self,
        mut stream: T,
        counters: &Arc<Counters>,
        peer_slot: &mut Option<NodeId>,
    ) -> Result<Outcome> {
        let config = &self.ctx.config;
        let depth = config.channel_depth.max(1);
        let deadline = config.max_duration.map(|limit| Instant::now() + limit);

        self.set_state(SessionState::Handshaking);
        let established = timeout(config.handshake_timeout, self.handshake(&mut stream))
            .await
            .map_err(|_| SyncError::Timeout("waiting for handshake"))??;
        let peer = established.peer.id;
        *peer_slot = Some(peer);
        info!(%peer, role = ?self.role, "session established");

        // ── Negotiating ─────────────────────────────────────────────────────
        self.set_state(SessionState::Negotiating);
        let (read_half, write_half) = tokio::io::split(stream);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::channel(depth);
        let (inbound_tx, mut inbound) = mpsc::channel(depth);
        let progress = Arc::new(Notify::new());
        let mut writer = tokio::spawn(write_loop(
            write_half,
            FrameSealer::new(established.cipher.clone()),
            control_rx,
            data_rx,
            counters.clone(),
            progress.clone(),
        ));
        let _reader = AbortOnDrop(tokio::spawn(read_loop(
            read_half,
            FrameOpener::new(established.cipher),
            inbound_tx,
        )));

        control_tx
            .send(SpMessage::Hello {
                nice: config.nice,
                no_checksum: config.no_checksum,
            })
            .map_err(|_| SyncError::Closed)?;
        let (peer_nice, peer_no_checksum) = match timeout(config.idle_timeout, inbound.recv()).await {
            Err(_) => return Err(SyncError::Timeout("waiting for hello")),
            Ok(None) => return Err(SyncError::Closed),
            Ok(Some(Err(err))) => return Err(err),
            Ok(Some(Ok(SpMessage::Hello { nice, no_checksum }))) => (nice, no_checksum),
            Ok(Some(Ok(other))) => {
                return Err(SyncError::Protocol(format!(
                    "expected hello, got {}",
                    other.kind()
                )))
            }
        };
        let ceiling = config.nice.min(peer_nice);
        let no_checksum = config.no_checksum && peer_no_checksum;
        debug!(%peer, %ceiling, no_checksum, "negotiated");

        let rx_lock = self.lock(&peer, Direction::Rx);
        let tx_lock = self.lock(&peer, Direction::Tx);

        // ── Exchanging ──────────────────────────────────────────────────────
        self.set_state(SessionState::Exchanging);
        let (drain_tx, drain_rx) = watch::channel(false);
        let (offers_tx, offers_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (chunks_tx, chunks_rx) = mpsc::channel(depth);

        let mut receiver = tokio::spawn(
            Receiver {
                spool: self.ctx.spool.clone(),
                peer,
                ceiling,
                config: config.clone(),
                no_checksum,
                locked: rx_lock.is_some(),
                control: control_tx.clone(),
                offers: offers_rx,
                chunks: chunks_rx,
                draining: drain_rx.clone(),
                counters: counters.clone(),
            }
            .run(),
        );
        let mut sender = tokio::spawn(
            Sender {
                spool: self.ctx.spool.clone(),
                peer,
                ceiling,
                config: config.clone(),
                locked: tx_lock.is_some(),
                control: control_tx.clone(),
                data: data_tx,
                events: events_rx,
                draining: drain_rx,
                counters: counters.clone(),
            }
            .run(),
        );

        let inbox = Inbox {
            offers: offers_tx,
            events: events_tx,
            chunks: chunks_tx,
            patience: config.idle_timeout,
        };
        let mut receiver_finished: Option<bool> = None;
        let mut sender_finished: Option<bool> = None;
        let mut writer_done = false;
        let mut idle_at = Instant::now() + config.idle_timeout;

        let stop = loop {
            if receiver_finished == Some(true) && sender_finished == Some(true) {
                break Stop::Completed;
            }
            tokio::select! {
                biased;
                // Ahead of the tasks: a queued Halt outranks the broken
                // pipe that follows it.
                msg = inbound.recv() => {
                    idle_at = Instant::now() + config.idle_timeout;
                    match msg {
                        None => break Stop::Failed(SyncError::Closed),
                        Some(Err(err)) => break Stop::Failed(err),
                        Some(Ok(SpMessage::Halt)) => break Stop::PeerHalt,
                        Some(Ok(msg)) => {
                            if let Err(err) = inbox.deliver(msg).await {
                                break Stop::Failed(err);
                            }
                        }
                    }
                }
                joined = &mut receiver, if receiver_finished.is_none() => {
                    let result = flatten(joined);
                    receiver_finished = Some(matches!(result, Ok(true)));
                    if let Err(err) = result {
                        break Stop::Failed(err);
                    }
                }
                joined = &mut sender, if sender_finished.is_none() => {
                    let result = flatten(joined);
                    sender_finished = Some(matches!(result, Ok(true)));
                    if let Err(err) = result {
                        break Stop::Failed(err);
                    }
                }
                joined = &mut writer, if !writer_done => {
                    writer_done = true;
                    break Stop::Failed(flatten(joined).err().unwrap_or(SyncError::Closed));
                }
                // The peer is still taking our frames.
                _ = progress.notified() => {
                    idle_at = Instant::now() + config.idle_timeout;
                }
                _ = sleep_until(idle_at) => break Stop::Idle,
                _ = sleep_until_opt(deadline) => break Stop::MaxDuration,
            }
        };

        // ── Draining ────────────────────────────────────────────────────────
        self.set_state(SessionState::Draining);
        debug!(%peer, "draining");
        let _ = drain_tx.send(true);
        drop(inbox);

        let receiver_finished = match receiver_finished {
            Some(finished) => finished,
            None => settle("receiver", &mut receiver).await,
        };
        let sender_finished = match sender_finished {
            Some(finished) => finished,
            None => settle("sender", &mut sender).await,
        };

        if !matches!(stop, Stop::PeerHalt) {
            let _ = control_tx.send(SpMessage::Halt);
        }
        drop(control_tx);
        if !writer_done && timeout(DRAIN_GRACE, &mut writer).await.is_err() {
            writer.abort();
        }
        drop((rx_lock, tx_lock));

        match stop {
            Stop::Completed => Ok(Outcome::Completed),
            Stop::PeerHalt if receiver_finished && sender_finished => Ok(Outcome::Completed),
            Stop::PeerHalt => Ok(Outcome::PeerHalt),
            Stop::Idle => Ok(Outcome::IdleTimeout),
            Stop::MaxDuration => Ok(Outcome::MaxDuration),
            Stop::Failed(err) => Err(err),
        }
    }

    async fn handshake<T: Transport>(&self, stream: &mut T) -> Result<Established> {
        let identity = self.ctx.identity.as_ref();
        match (self.role, self.target) {
            (Role::Initiator, Some(id)) => {
                let peer = self
                    .ctx
                    .registry
                    .neighbor(&id)
                    .ok_or_else(|| CoreError::UnknownNode(id.to_base32()))?;
                handshake::initiate(stream, identity, peer).await
            }
            _ => handshake::respond(stream, identity, self.ctx.registry.as_ref()).await,
        }
    }

    /// Lock one queue of `peer`, or skip that direction for this session.
    fn lock(&self, peer: &NodeId, direction: Direction) -> Option<SpoolLock> {
        match self.ctx.spool.lock(peer, direction) {
            Ok(lock) => Some(lock),
            Err(err) => {
                warn!(%peer, %direction, error = %err, "queue busy; skipping direction");
                None
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }
}

/// Routes inbound messages to the task that handles them.
struct Inbox {
    offers: mpsc::UnboundedSender<(Vec<OfferedPacket>, bool)>,
    events: mpsc::UnboundedSender<SenderEvent>,
    chunks: mpsc::Sender<ChunkIn>,
    /// How long a chunk may wait for the receiver.
    patience: Duration,
}

impl Inbox {
    async fn deliver(&self, msg: SpMessage) -> Result<()> {
        debug!(kind = msg.kind(), "received");
        // A closed channel means the task already ended; its result decides.
        match msg {
            SpMessage::Hello { .. } => {
                return Err(SyncError::Protocol("hello sent twice".into()));
            }
            SpMessage::Offer { packets, complete } => {
                let _ = self.offers.send((packets, complete));
            }
            SpMessage::Request { hash, offset } => {
                let _ = self.events.send(SenderEvent::Request { hash, offset });
            }
            SpMessage::Done { hash } => {
                let _ = self.events.send(SenderEvent::Done { hash });
            }
            SpMessage::Finished => {
                let _ = self.events.send(SenderEvent::PeerFinished);
            }
            SpMessage::Chunk {
                hash,
                offset,
                payload,
            } => {
                self.forward(ChunkIn::Data {
                    hash,
                    offset,
                    payload,
                })
                .await?;
            }
            SpMessage::Unavailable { hash } => {
                self.forward(ChunkIn::Unavailable { hash }).await?;
            }
            SpMessage::Halt => {}
        }
        Ok(())
    }

    async fn forward(&self, chunk: ChunkIn) -> Result<()> {
        let _ = timeout(self.patience, self.chunks.send(chunk))
            .await
            .map_err(|_| SyncError::Timeout("delivering a chunk to the receiver"))?;
        Ok(())
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut sealer: FrameSealer,
    mut control: mpsc::UnboundedReceiver<SpMessage>,
    mut data: mpsc::Receiver<SpMessage>,
    counters: Arc<Counters>,
    progress: Arc<Notify>,
) -> Result<()> {
    loop {
        let msg = tokio::select! {
            biased;
            Some(msg) = control.recv() => msg,
            Some(msg) = data.recv() => msg,
            else => break,
        };
        sealer.send(&mut writer, &msg).await?;
        progress.notify_one();
        match &msg {
            SpMessage::Chunk { payload, .. } => counters.add_tx_bytes(payload.len() as u64),
            SpMessage::Halt => break,
            other => debug!(kind = other.kind(), "sent"),
        }
    }
    writer.shutdown().await?;
    Ok(())
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    mut opener: FrameOpener,
    inbound: mpsc::Sender<Result<SpMessage>>,
) {
    loop {
        match opener.recv(&mut reader).await {
            Ok(Some(msg)) => {
                if inbound.send(Ok(msg)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                let _ = inbound.send(Err(err)).await;
                break;
            }
        }
    }
}

/// Wait a bounded time for a task during draining.
async fn settle(name: &'static str, handle: &mut JoinHandle<Result<bool>>) -> bool {
    match timeout(DRAIN_GRACE, &mut *handle).await {
        Ok(joined) => match flatten(joined) {
            Ok(finished) => finished,
            Err(err) => {
                debug!(task = name, error = %err, "task ended while draining");
                false
            }
        },
        Err(_) => {
            warn!(task = name, "task did not drain in time; aborting");
            handle.abort();
            false
        }
    }
}

fn flatten<T>(joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    joined.map_err(|err| SyncError::Task(err.to_string()))?
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
