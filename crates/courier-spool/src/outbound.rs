//! Writer for packets entering a transmit queue.
//!
//! The sealed bytes go to a temporary file while fat-mode MTH hashes them,
//! since the final name is the hash and the length is not known up front.
//! [`OutboundPacket::commit`] renames the file into the queue; dropping an
//! uncommitted packet deletes the temporary file.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use courier_core::{MthFat, NodeId, PacketHash, TreeHash};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{Result, SpoolError};

/// A packet being written into `<root>/<node>/tx`.
pub struct OutboundPacket {
    file: BufWriter<NamedTempFile>,
    mth: MthFat,
    node: NodeId,
    queue: PathBuf,
}

impl OutboundPacket {
    pub(crate) fn create(tmp_dir: PathBuf, queue: PathBuf, node: NodeId) -> Result<Self> {
        let file = NamedTempFile::new_in(tmp_dir)?;
        Ok(Self {
            file: BufWriter::new(file),
            mth: MthFat::new(),
            node,
            queue,
        })
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        self.mth.hashed()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush, sync and move the packet into its queue under its hash.
    pub fn commit(self) -> Result<(PacketHash, u64)> {
        let hash = self.mth.sum();
        let size = self.mth.hashed();
        let file = self
            .file
            .into_inner()
            .map_err(|e| SpoolError::Io(e.into_error()))?;
        file.as_file().sync_all()?;

        std::fs::create_dir_all(&self.queue)?;
        let dest = self.queue.join(hash.to_base32());
        file.persist(&dest).map_err(|e| SpoolError::Io(e.error))?;

        info!(node = %self.node, %hash, size, "packet queued");
        Ok((hash, size))
    }
}

impl Write for OutboundPacket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.mth.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
