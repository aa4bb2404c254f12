//! Batch allocation recycling for the hot path.

use crate::entry::Record;

const DEFAULT_CHUNK: usize = 1024;
const DEFAULT_OVERSIZE: usize = 4096;
const MAX_HELD: usize = 32;

/// Recycles record-batch allocations so steady-state processing stops
/// hitting the allocator.
///
/// `get` hands out a cleared vector with at least `hint` capacity. Requests
/// above the oversize threshold are satisfied by a fresh allocation and are
/// never retained on `put`, which keeps one giant batch from pinning memory.
#[derive(Debug)]
pub struct RecordPool {
    free: Vec<Vec<Record>>,
    chunk: usize,
    oversize: usize,
}

impl Default for RecordPool {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK, DEFAULT_OVERSIZE)
    }
}

impl RecordPool {
    pub fn new(chunk: usize, oversize: usize) -> Self {
        Self {
            free: Vec::new(),
            chunk: chunk.max(1),
            oversize: oversize.max(chunk),
        }
    }

    pub fn get(&mut self, hint: usize) -> Vec<Record> {
        if hint > self.oversize {
            return Vec::with_capacity(hint);
        }
        match self.free.pop() {
            Some(mut v) => {
                if v.capacity() < hint {
                    v.reserve(hint - v.len());
                }
                v
            }
            None => Vec::with_capacity(self.chunk.max(hint)),
        }
    }

    pub fn put(&mut self, mut v: Vec<Record>) {
        if v.capacity() > self.oversize || self.free.len() >= MAX_HELD {
            return;
        }
        v.clear();
        self.free.push(v);
    }

    /// Number of allocations currently held for reuse.
    pub fn held(&self) -> usize {
        self.free.len()
    }
}
