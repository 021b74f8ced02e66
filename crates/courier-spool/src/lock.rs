//! Advisory per-(node, direction) locks.
//!
//! A lock is a file created with `create_new`; taking it never blocks.
//! The file holds the owner's pid and is removed when the guard drops.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use courier_core::NodeId;
use tracing::{debug, warn};

use crate::error::{Result, SpoolError};
use crate::job::Direction;

/// Held lock on one queue; released on drop.
#[derive(Debug)]
pub struct SpoolLock {
    path: PathBuf,
    node: NodeId,
    direction: Direction,
}

impl SpoolLock {
    pub(crate) fn acquire(path: PathBuf, node: NodeId, direction: Direction) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(%node, %direction, "spool lock busy");
                return Err(SpoolError::Locked { node, direction });
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", std::process::id())?;
        Ok(Self {
            path,
            node,
            direction,
        })
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpoolLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release spool lock");
        }
    }
}
