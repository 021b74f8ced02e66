//! Filesystem spool.
//!
//! ```text
//! <root>/tmp/                         temporary outbound files
//! <root>/<node>/rx/<hash>[.suffix]    received packets
//! <root>/<node>/tx/<hash>             packets waiting to be sent
//! <root>/<node>/{rx,tx}.lock          queue locks
//! ```
//!
//! Node and hash names are base32.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use courier_core::{NodeId, PacketHash};
use courier_envelope::{PktEncHeader, PKT_ENC_OVERHEAD};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use crate::error::{Result, SpoolError};
use crate::job::{suffix, Direction, Job, PacketState};
use crate::lock::SpoolLock;
use crate::outbound::OutboundPacket;
use crate::partial::PartialPacket;
use crate::traits::{PacketReader, Spool};

/// Spool rooted in a directory.
#[derive(Debug, Clone)]
pub struct FsSpool {
    root: PathBuf,
}

impl FsSpool {
    /// Open a spool, creating the root and its `tmp` directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("tmp"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one queue.
    pub fn queue_dir(&self, node: &NodeId, direction: Direction) -> PathBuf {
        self.root.join(node.to_base32()).join(direction.as_str())
    }

    /// Path of a job's file.
    pub fn job_path(&self, job: &Job) -> PathBuf {
        self.queue_dir(&job.node, job.direction)
            .join(job.file_name())
    }

    async fn read_job(
        &self,
        node: &NodeId,
        direction: Direction,
        path: &Path,
        hash: PacketHash,
        verified: bool,
    ) -> Result<Job> {
        let mut file = File::open(path).await?;
        let size = file.metadata().await?.len();
        let mut head = [0u8; PKT_ENC_OVERHEAD];
        file.read_exact(&mut head).await?;
        let header = PktEncHeader::from_slice(&head)?;
        Ok(Job {
            node: *node,
            direction,
            hash,
            header,
            size,
            verified,
        })
    }
}

/// Split a queue file name into its hash and suffix.
///
/// Only the canonical spelling is accepted, since paths are rebuilt from
/// the hash.
fn parse_name(name: &str) -> Option<(PacketHash, &str)> {
    let (stem, ext) = match name.find('.') {
        Some(at) => name.split_at(at),
        None => (name, ""),
    };
    let hash = PacketHash::from_base32(stem).ok()?;
    (hash.to_base32() == stem).then_some((hash, ext))
}

#[async_trait]
impl Spool for FsSpool {
    async fn jobs(&self, node: &NodeId, direction: Direction) -> Result<Vec<Job>> {
        let dir = self.queue_dir(node, direction);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut jobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some((hash, ext)) = name.to_str().and_then(parse_name) else {
                continue;
            };
            let verified = match (direction, ext) {
                (_, "") => true,
                (Direction::Rx, suffix::NOCK) => false,
                _ => continue,
            };
            match self
                .read_job(node, direction, &entry.path(), hash, verified)
                .await
            {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(%node, %direction, %hash, error = %e, "skipping unreadable packet"),
            }
        }
        debug!(%node, %direction, count = jobs.len(), "listed queue");
        Ok(jobs)
    }

    async fn open_read(&self, job: &Job, offset: u64) -> Result<PacketReader> {
        let mut file = match File::open(self.job_path(job)).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SpoolError::NotFound(job.hash))
            }
            Err(e) => return Err(e.into()),
        };
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(Box::new(file))
    }

    async fn remove(&self, job: &Job) -> Result<()> {
        fs::remove_file(self.job_path(job)).await?;
        debug!(node = %job.node, hash = %job.hash, "packet removed");
        Ok(())
    }

    async fn mark_seen(&self, job: &Job) -> Result<()> {
        let dir = self.queue_dir(&job.node, job.direction);
        fs::write(dir.join(format!("{}{}", job.hash, suffix::SEEN)), b"").await?;
        fs::remove_file(self.job_path(job)).await?;
        Ok(())
    }

    async fn packet_state(&self, node: &NodeId, hash: &PacketHash) -> Result<PacketState> {
        let dir = self.queue_dir(node, Direction::Rx);
        let name = hash.to_base32();
        let checks = [
            ("", PacketState::Complete),
            (suffix::NOCK, PacketState::Unverified),
            (suffix::SEEN, PacketState::Seen),
            (suffix::BAD, PacketState::Bad),
        ];
        for (ext, state) in checks {
            if fs::try_exists(dir.join(format!("{}{}", name, ext))).await? {
                return Ok(state);
            }
        }
        match fs::metadata(dir.join(format!("{}{}", name, suffix::PART))).await {
            Ok(meta) => Ok(PacketState::Partial(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PacketState::Absent),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_resumable(
        &self,
        node: &NodeId,
        hash: &PacketHash,
        size: u64,
    ) -> Result<PartialPacket> {
        PartialPacket::open(self.queue_dir(node, Direction::Rx), *node, *hash, size).await
    }

    fn create_outbound(&self, node: &NodeId) -> Result<OutboundPacket> {
        OutboundPacket::create(
            self.root.join("tmp"),
            self.queue_dir(node, Direction::Tx),
            *node,
        )
    }

    fn lock(&self, node: &NodeId, direction: Direction) -> Result<SpoolLock> {
        let path = self
            .root
            .join(node.to_base32())
            .join(format!("{}.lock", direction));
        SpoolLock::acquire(path, *node, direction)
    }
}
