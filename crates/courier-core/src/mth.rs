//! MTH: an incremental, resumable Merkle tree hash.
//!
//! Input is cut into [`BLOCK_SIZE`] blocks. Each block is hashed with the
//! leaf key; pairs of subtrees are combined with the node key. When a level
//! has an odd number of entries the last one is carried up unchanged.
//!
//! Two modes produce identical roots:
//!
//! - [`MthFat`] keeps every level and is used when the length is unknown
//!   (packets being sealed).
//! - [`MthSeq`] is told the total size and keeps only one pending hash per
//!   level. It can rebuild its state by replaying an already received
//!   prefix, which is what lets a transfer resume.
//!
//! The empty input hashes to the leaf hash of zero bytes; a single block
//! hashes to its leaf hash with no node step.

use std::io::{self, Read, Write};
use std::sync::{mpsc, OnceLock};

use crate::types::PacketHash;

/// Bytes per leaf. Envelope chunks and sync chunks use the same size.
pub const BLOCK_SIZE: usize = 32 * 1024;

fn leaf_key() -> &'static [u8; 32] {
    static KEY: OnceLock<[u8; 32]> = OnceLock::new();
    KEY.get_or_init(|| *blake3::hash(b"courier mth leaf").as_bytes())
}

fn node_key() -> &'static [u8; 32] {
    static KEY: OnceLock<[u8; 32]> = OnceLock::new();
    KEY.get_or_init(|| *blake3::hash(b"courier mth node").as_bytes())
}

/// Hash one block as a leaf.
pub fn leaf_hash(block: &[u8]) -> PacketHash {
    PacketHash(*blake3::keyed_hash(leaf_key(), block).as_bytes())
}

/// Combine two subtree hashes.
pub fn node_hash(left: &PacketHash, right: &PacketHash) -> PacketHash {
    let mut hasher = blake3::Hasher::new_keyed(node_key());
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    PacketHash(*hasher.finalize().as_bytes())
}

/// What produced an [`MthEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MthEventKind {
    Leaf,
    Node,
}

/// One computed hash, in the order it was computed.
///
/// Leaves are level 0. `index` is the position within the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MthEvent {
    pub kind: MthEventKind,
    pub level: u32,
    pub index: u64,
    pub hash: PacketHash,
}

/// Common interface of both modes.
pub trait TreeHash {
    /// Feed the next bytes. Call boundaries do not affect the result.
    fn update(&mut self, data: &[u8]);

    /// Root over everything fed so far.
    fn sum(&self) -> PacketHash;

    /// Number of bytes fed so far.
    fn hashed(&self) -> u64;
}

type Trace = Option<mpsc::Sender<MthEvent>>;

fn emit(trace: &Trace, kind: MthEventKind, level: u32, index: u64, hash: PacketHash) {
    if let Some(tx) = trace {
        // A dropped receiver only means nobody is listening any more.
        let _ = tx.send(MthEvent {
            kind,
            level,
            index,
            hash,
        });
    }
}

/// Split `data` into blocks, topping up the partial block in `buf` first.
fn fill_blocks(buf: &mut Vec<u8>, mut data: &[u8], mut on_block: impl FnMut(&[u8])) {
    if !buf.is_empty() {
        let take = (BLOCK_SIZE - buf.len()).min(data.len());
        buf.extend_from_slice(&data[..take]);
        data = &data[take..];
        if buf.len() < BLOCK_SIZE {
            return;
        }
        on_block(&buf[..]);
        buf.clear();
    }
    let mut blocks = data.chunks_exact(BLOCK_SIZE);
    for block in &mut blocks {
        on_block(block);
    }
    buf.extend_from_slice(blocks.remainder());
}

/// Fold the pending subtree roots, lowest level first, into the root.
///
/// Each higher pending hash is the left sibling of everything below it.
fn fold_frontier(
    mut pending: impl Iterator<Item = (u32, PacketHash)>,
    leaves: u64,
    trace: &Trace,
) -> PacketHash {
    let Some((_, mut carry)) = pending.next() else {
        return leaf_hash(&[]);
    };
    for (level, left) in pending {
        carry = node_hash(&left, &carry);
        let parent = level + 1;
        emit(
            trace,
            MthEventKind::Node,
            parent,
            (leaves - 1) >> parent,
            carry,
        );
    }
    carry
}

/// Leaf that `sum` must add for the trailing partial block, if any.
fn tail_leaf(buf: &[u8], leaves: u64) -> Option<PacketHash> {
    (!buf.is_empty() || leaves == 0).then(|| leaf_hash(buf))
}

// ─────────────────────────────────────────────────────────────────────────────
// Fat mode
// ─────────────────────────────────────────────────────────────────────────────

/// Tree hash that retains every complete subtree.
#[derive(Debug, Default)]
pub struct MthFat {
    levels: Vec<Vec<PacketHash>>,
    buf: Vec<u8>,
    hashed: u64,
    trace: Trace,
}

impl MthFat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every computed hash on `tx`.
    pub fn with_trace(mut self, tx: mpsc::Sender<MthEvent>) -> Self {
        self.trace = Some(tx);
        self
    }

    /// Complete subtrees computed so far, leaves first.
    pub fn levels(&self) -> &[Vec<PacketHash>] {
        &self.levels
    }

    fn leaves(&self) -> u64 {
        self.levels.first().map_or(0, |l| l.len() as u64)
    }

    fn push_leaf(levels: &mut Vec<Vec<PacketHash>>, trace: &Trace, hash: PacketHash) {
        if levels.is_empty() {
            levels.push(Vec::new());
        }
        emit(trace, MthEventKind::Leaf, 0, levels[0].len() as u64, hash);
        levels[0].push(hash);

        let mut level = 0;
        while levels[level].len() % 2 == 0 {
            let row = &levels[level];
            let parent = node_hash(&row[row.len() - 2], &row[row.len() - 1]);
            if levels.len() == level + 1 {
                levels.push(Vec::new());
            }
            let index = levels[level + 1].len() as u64;
            emit(trace, MthEventKind::Node, level as u32 + 1, index, parent);
            levels[level + 1].push(parent);
            level += 1;
        }
    }
}

impl TreeHash for MthFat {
    fn update(&mut self, data: &[u8]) {
        self.hashed += data.len() as u64;
        let Self {
            levels, buf, trace, ..
        } = self;
        fill_blocks(buf, data, |block| {
            Self::push_leaf(levels, trace, leaf_hash(block))
        });
    }

    fn sum(&self) -> PacketHash {
        let mut leaves = self.leaves();
        let tail = tail_leaf(&self.buf, leaves);
        if let Some(hash) = tail {
            emit(&self.trace, MthEventKind::Leaf, 0, leaves, hash);
            leaves += 1;
        }
        let pending = self
            .levels
            .iter()
            .enumerate()
            .filter(|(_, row)| row.len() % 2 == 1)
            .filter_map(|(level, row)| row.last().map(|h| (level as u32, *h)));
        fold_frontier(tail.map(|h| (0, h)).into_iter().chain(pending), leaves, &self.trace)
    }

    fn hashed(&self) -> u64 {
        self.hashed
    }
}

impl Write for MthFat {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sequential mode
// ─────────────────────────────────────────────────────────────────────────────

/// Tree hash over an input of known size, keeping O(log n) state.
#[derive(Debug)]
pub struct MthSeq {
    size: u64,
    offset: u64,
    /// Pending subtree roots, highest level at the bottom.
    stack: Vec<(u32, PacketHash)>,
    leaves: u64,
    buf: Vec<u8>,
    hashed: u64,
    trace: Trace,
}

impl MthSeq {
    /// Hash an input of `size` bytes of which the first `offset` are
    /// already on hand and will be replayed with
    /// [`replay_prefix`](Self::replay_prefix).
    pub fn new(size: u64, offset: u64) -> Self {
        Self {
            size,
            offset,
            stack: Vec::new(),
            leaves: 0,
            buf: Vec::with_capacity(BLOCK_SIZE),
            hashed: 0,
            trace: None,
        }
    }

    /// Report every computed hash on `tx`.
    pub fn with_trace(mut self, tx: mpsc::Sender<MthEvent>) -> Self {
        self.trace = Some(tx);
        self
    }

    /// Total size the hash expects.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Offset the transfer resumes from.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Feed exactly `offset` bytes from `prefix`.
    ///
    /// Must be called before any other input.
    pub fn replay_prefix<R: Read>(&mut self, prefix: R) -> io::Result<()> {
        if self.hashed != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "prefix replay after input",
            ));
        }
        let copied = io::copy(&mut prefix.take(self.offset), self)?;
        if copied != self.offset {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("prefix ended at {} of {} bytes", copied, self.offset),
            ));
        }
        Ok(())
    }

    /// Whether all `size` bytes have been fed.
    pub fn is_complete(&self) -> bool {
        self.hashed >= self.size
    }

    fn push_leaf(
        stack: &mut Vec<(u32, PacketHash)>,
        leaves: &mut u64,
        trace: &Trace,
        hash: PacketHash,
    ) {
        let index = *leaves;
        *leaves += 1;
        emit(trace, MthEventKind::Leaf, 0, index, hash);

        let mut level = 0;
        let mut hash = hash;
        while let Some(&(top_level, left)) = stack.last() {
            if top_level != level {
                break;
            }
            stack.pop();
            hash = node_hash(&left, &hash);
            level += 1;
            emit(trace, MthEventKind::Node, level, index >> level, hash);
        }
        stack.push((level, hash));
    }
}

impl TreeHash for MthSeq {
    fn update(&mut self, data: &[u8]) {
        self.hashed += data.len() as u64;
        let Self {
            stack,
            leaves,
            buf,
            trace,
            ..
        } = self;
        fill_blocks(buf, data, |block| {
            Self::push_leaf(stack, leaves, trace, leaf_hash(block))
        });
    }

    fn sum(&self) -> PacketHash {
        let mut leaves = self.leaves;
        let tail = tail_leaf(&self.buf, leaves);
        if let Some(hash) = tail {
            emit(&self.trace, MthEventKind::Leaf, 0, leaves, hash);
            leaves += 1;
        }
        let pending = self.stack.iter().rev().copied();
        fold_frontier(tail.map(|h| (0, h)).into_iter().chain(pending), leaves, &self.trace)
    }

    fn hashed(&self) -> u64 {
        self.hashed
    }
}

impl Write for MthSeq {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Root of a byte slice, hashed in one go.
pub fn hash_bytes(data: &[u8]) -> PacketHash {
    let mut mth = MthSeq::new(data.len() as u64, 0);
    mth.update(data);
    mth.sum()
}
