//! Resumable writer for packets being received.
//!
//! Bytes land in `<hash>.part`. Opening an existing `.part` replays it
//! through sequential MTH so the transfer continues from its end. A commit
//! moves the file to its final name, to `.nock` when verification was
//! skipped, or to `.bad` when the hash does not match. An abandoned
//! transfer leaves only the `.part` file behind.

use std::io::BufReader;
use std::path::{Path, PathBuf};

use courier_core::{MthSeq, NodeId, PacketHash, TreeHash};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Result, SpoolError};
use crate::job::suffix;

/// How a partial packet was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Committed {
    /// Hash matched; stored under its final name.
    Verified,
    /// Stored as `.nock` without checking.
    Unverified,
}

/// A packet being received into `<root>/<node>/rx`.
#[derive(Debug)]
pub struct PartialPacket {
    node: NodeId,
    hash: PacketHash,
    size: u64,
    offset: u64,
    file: File,
    mth: MthSeq,
    queue: PathBuf,
}

fn with_suffix(queue: &Path, hash: &PacketHash, suffix: &str) -> PathBuf {
    queue.join(format!("{}{}", hash.to_base32(), suffix))
}

impl PartialPacket {
    pub(crate) async fn open(
        queue: PathBuf,
        node: NodeId,
        hash: PacketHash,
        size: u64,
    ) -> Result<Self> {
        fs::create_dir_all(&queue).await?;
        let path = with_suffix(&queue, &hash, suffix::PART);

        let mut offset = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if offset > size {
            warn!(%hash, offset, size, "partial file longer than packet, restarting");
            fs::remove_file(&path).await?;
            offset = 0;
        }

        let mth = if offset > 0 {
            Self::replay(path.clone(), size, offset).await?
        } else {
            MthSeq::new(size, 0)
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!(%hash, offset, size, "partial packet opened");

        Ok(Self {
            node,
            hash,
            size,
            offset,
            file,
            mth,
            queue,
        })
    }

    /// Rebuild the tree hash state from the bytes already on disk.
    async fn replay(path: PathBuf, size: u64, offset: u64) -> Result<MthSeq> {
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path)?;
            let mut mth = MthSeq::new(size, offset);
            mth.replay_prefix(BufReader::new(file))?;
            Ok::<_, SpoolError>(mth)
        })
        .await
        .map_err(|e| SpoolError::Task(e.to_string()))?
    }

    pub fn hash(&self) -> &PacketHash {
        &self.hash
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes already held; the next write must start here.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn is_complete(&self) -> bool {
        self.offset == self.size
    }

    /// Append `data`, which must start at `offset`.
    pub async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if offset != self.offset {
            return Err(SpoolError::OutOfOrder {
                expected: self.offset,
                got: offset,
            });
        }
        if self.offset + data.len() as u64 > self.size {
            return Err(SpoolError::Overflow { size: self.size });
        }
        self.file.write_all(data).await?;
        self.file.flush().await?;
        self.mth.update(data);
        self.offset += data.len() as u64;
        Ok(())
    }

    /// Make the packet visible.
    ///
    /// With `verify`, a hash mismatch moves the file to `.bad` and returns
    /// [`SpoolError::Integrity`]. Without it the file becomes `.nock`.
    pub async fn commit(mut self, verify: bool) -> Result<Committed> {
        if !self.is_complete() {
            return Err(SpoolError::Incomplete {
                hash: self.hash,
                have: self.offset,
                size: self.size,
            });
        }
        self.file.flush().await?;
        self.file.sync_all().await?;

        let part = with_suffix(&self.queue, &self.hash, suffix::PART);
        if !verify {
            fs::rename(&part, with_suffix(&self.queue, &self.hash, suffix::NOCK)).await?;
            info!(node = %self.node, hash = %self.hash, "packet received unverified");
            return Ok(Committed::Unverified);
        }

        let computed = self.mth.sum();
        if computed != self.hash {
            fs::rename(&part, with_suffix(&self.queue, &self.hash, suffix::BAD)).await?;
            warn!(node = %self.node, hash = %self.hash, %computed, "packet failed verification");
            return Err(SpoolError::Integrity {
                expected: self.hash,
                computed,
            });
        }

        fs::rename(&part, self.queue.join(self.hash.to_base32())).await?;
        info!(node = %self.node, hash = %self.hash, size = self.size, "packet received");
        Ok(Committed::Verified)
    }
}
