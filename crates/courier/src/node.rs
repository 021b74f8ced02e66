//! The Courier node: packet creation, sessions and the receive queue.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;

use courier_core::{AreaId, NodeId, NodeIdentity, NodeRegistry, PacketHash, Pkt};
use courier_envelope::{open_to_vec, seal_packet, OpenOptions, Recipient};
use courier_spool::{Direction, Job, Spool};
use courier_sync::{peers, Session, SessionContext, SessionPermit, SessionPool, SessionReport, Transport};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::CourierConfig;
use crate::error::{CourierError, Result};

/// A packet placed in a transmit queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    /// Neighbour whose queue holds the packet.
    pub via: NodeId,
    pub hash: PacketHash,
    /// Sealed size in bytes.
    pub size: u64,
}

/// One node: its identity, neighbours and spool.
///
/// Cheap to share behind an [`Arc`]; every method takes `&self`.
pub struct Courier {
    identity: Arc<NodeIdentity>,
    registry: Arc<dyn NodeRegistry>,
    spool: Arc<dyn Spool>,
    config: CourierConfig,
    pool: SessionPool,
}

impl Courier {
    pub fn new(
        identity: Arc<NodeIdentity>,
        registry: Arc<dyn NodeRegistry>,
        spool: Arc<dyn Spool>,
        config: CourierConfig,
    ) -> Self {
        let pool = SessionPool::new(config.max_sessions);
        Self {
            identity,
            registry,
            spool,
            config,
            pool,
        }
    }

    pub fn id(&self) -> NodeId {
        self.identity.id()
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Creating packets
    // ─────────────────────────────────────────────────────────────────────────

    /// Seal `pkt` and `payload` to a neighbour and queue it for sending.
    ///
    /// `to` is a configured name or a base32 node id.
    pub async fn enqueue<R>(&self, to: &str, pkt: Pkt, payload: R) -> Result<Enqueued>
    where
        R: Read + Send + 'static,
    {
        let peer = self.registry.resolve(to)?;
        let via = peer.id;
        let recipient = Recipient::from(peer);
        self.seal_into_queue(via, recipient, pkt, payload).await
    }

    /// Seal to an area and queue it for the neighbour `via`.
    pub async fn enqueue_area<R>(&self, area: &AreaId, via: &str, pkt: Pkt, payload: R) -> Result<Enqueued>
    where
        R: Read + Send + 'static,
    {
        let recipient = self
            .registry
            .area(area)
            .map(Recipient::from)
            .ok_or_else(|| CourierError::UnknownArea(area.to_base32()))?;
        let via = self.registry.resolve(via)?.id;
        self.seal_into_queue(via, recipient, pkt, payload).await
    }

    async fn seal_into_queue<R>(&self, via: NodeId, recipient: Recipient, pkt: Pkt, payload: R) -> Result<Enqueued>
    where
        R: Read + Send + 'static,
    {
        let identity = self.identity.clone();
        let spool = self.spool.clone();
        let (hash, size) = tokio::task::spawn_blocking(move || -> Result<(PacketHash, u64)> {
            let mut out = spool.create_outbound(&via)?;
            seal_packet(&identity, recipient, &pkt, payload, &mut out)?;
            Ok(out.commit()?)
        })
        .await
        .map_err(|e| CourierError::Task(e.to_string()))??;

        info!(%via, recipient = %recipient.id, %hash, size, "packet queued");
        Ok(Enqueued { via, hash, size })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────────

    fn context(&self) -> SessionContext {
        SessionContext {
            identity: self.identity.clone(),
            registry: self.registry.clone(),
            spool: self.spool.clone(),
            config: self.config.sync.clone(),
        }
    }

    /// Run a session with `peer` over an established stream.
    ///
    /// Waits for a free session slot.
    pub async fn call<T: Transport>(&self, peer: &NodeId, stream: T) -> Result<SessionReport> {
        let _permit = self.pool.admit().await?;
        Ok(Session::initiator(self.context(), *peer).run(stream).await)
    }

    /// Dial `peer` at its cached addresses and run a session.
    pub async fn dial(&self, peer: &NodeId) -> Result<SessionReport> {
        let mut last_err = None;
        for addr in peers::lookup(peer) {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    debug!(%peer, %addr, "connected");
                    return self.call(peer, stream).await;
                }
                Err(err) => {
                    debug!(%peer, %addr, error = %err, "connect failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.map_or(CourierError::NoAddress(*peer), CourierError::Io))
    }

    /// Answer a session on an accepted stream.
    ///
    /// Fails immediately when every session slot is taken.
    pub async fn accept<T: Transport>(&self, stream: T) -> Result<SessionReport> {
        let permit = self.pool.try_admit()?;
        Ok(self.respond(stream, permit).await)
    }

    async fn respond<T: Transport>(&self, stream: T, _permit: SessionPermit) -> SessionReport {
        Session::responder(self.context()).run(stream).await
    }

    /// Accept TCP connections until the listener fails.
    ///
    /// Each connection runs in its own task. When every slot is busy the
    /// loop stops accepting until one frees up. Addresses of peers that
    /// authenticate are recorded in the peer cache when it is active.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(addr = ?listener.local_addr().ok(), "serving");
        loop {
            let permit = self.pool.admit().await?;
            let (stream, addr) = listener.accept().await?;
            debug!(%addr, "accepted connection");
            let node = self.clone();
            tokio::spawn(async move {
                let report = node.respond(stream, permit).await;
                remember(&report, addr);
            });
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queues
    // ─────────────────────────────────────────────────────────────────────────

    /// Packets received from `peer`.
    pub async fn inbound(&self, peer: &NodeId) -> Result<Vec<Job>> {
        Ok(self.spool.jobs(peer, Direction::Rx).await?)
    }

    /// Packets waiting to be sent to `peer`.
    pub async fn outbound(&self, peer: &NodeId) -> Result<Vec<Job>> {
        Ok(self.spool.jobs(peer, Direction::Tx).await?)
    }

    /// Decrypt a received packet into its header and payload.
    ///
    /// All or nothing: a packet that fails authentication yields no bytes.
    pub async fn open_inbound(&self, job: &Job) -> Result<(Pkt, Vec<u8>)> {
        let mut sealed = Vec::with_capacity(job.size as usize);
        self.spool.open_read(job, 0).await?.read_to_end(&mut sealed).await?;

        let identity = self.identity.clone();
        let registry = self.registry.clone();
        let options = OpenOptions {
            require_known_sender: self.config.require_known_sender,
        };
        let (opened, plaintext) = tokio::task::spawn_blocking(move || {
            open_to_vec(&identity, registry.as_ref(), options, sealed.as_slice())
        })
        .await
        .map_err(|e| CourierError::Task(e.to_string()))??;

        let (pkt, payload) = Pkt::split_from(&plaintext)?;
        if !opened.sender_verified {
            warn!(sender = %opened.header.sender, hash = %job.hash, "opened packet from unverified sender");
        }
        Ok((pkt, payload.to_vec()))
    }

    /// Record that a received packet has been handled.
    pub async fn mark_seen(&self, job: &Job) -> Result<()> {
        Ok(self.spool.mark_seen(job).await?)
    }
}

fn remember(report: &SessionReport, addr: SocketAddr) {
    let Some(peer) = report.peer else { return };
    if report.is_success() && peers::is_active() {
        if let Err(err) = peers::insert(peer, addr) {
            debug!(%peer, error = %err, "address not recorded");
        }
    }
}
