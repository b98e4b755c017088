//! Per-sector hash index
//!
//! Maps a 24-bit item fingerprint to the slot the record starts at. Nodes are
//! kept in append order, which is also slot order, so a scan that starts at a
//! given slot sees candidates in the order they sit in the sector.
//!
//! A hit is only a candidate: the fingerprint is truncated and two keys can
//! collide, so callers re-read and compare the full header.

use crate::error::{KvError, Result};

/// Backing storage grows by this many nodes at a time.
const GROW_STEP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HashNode {
    fingerprint: u32,
    slot: u8,
}

#[derive(Debug, Default)]
pub struct HashIndex {
    nodes: Vec<HashNode>,
    limit: usize,
}

impl HashIndex {
    /// Empty index holding at most `limit` nodes.
    pub fn new(limit: usize) -> Self {
        Self {
            nodes: Vec::new(),
            limit,
        }
    }

    pub fn append(&mut self, fingerprint: u32, slot: usize) -> Result<()> {
        if self.nodes.len() >= self.limit {
            return Err(KvError::NoSpace);
        }
        if self.nodes.len() == self.nodes.capacity() {
            let room = GROW_STEP.min(self.limit - self.nodes.len());
            self.nodes.reserve_exact(room);
        }
        self.nodes.push(HashNode {
            fingerprint: fingerprint & 0x00FF_FFFF,
            slot: slot as u8,
        });
        Ok(())
    }

    /// First slot `>= start` whose fingerprint matches.
    pub fn find(&self, start: usize, fingerprint: u32) -> Option<usize> {
        let fingerprint = fingerprint & 0x00FF_FFFF;
        self.nodes
            .iter()
            .find(|n| n.slot as usize >= start && n.fingerprint == fingerprint)
            .map(|n| n.slot as usize)
    }

    /// Remove the node for `slot`, keeping the others in order.
    pub fn erase(&mut self, slot: usize) -> bool {
        match self.nodes.iter().position(|n| n.slot as usize == slot) {
            Some(pos) => {
                self.nodes.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.nodes = Vec::new();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }
}
