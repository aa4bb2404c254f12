//! The on-disk circular frame file.
//!
//! Layout: a 40-byte header (magic, version, capacity, head, tail, count)
//! followed by a `capacity`-byte data region. Frames are
//! `[u32 LE length][payload]` and wrap byte-wise around the region, so no
//! wasted tail padding and no wrap markers. `count` disambiguates the
//! full/empty cases where head equals tail.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use thiserror::Error;

const MAGIC: u32 = 0x4C50_5242; // "LPRB"
const VERSION: u32 = 1;
const HEADER_LEN: u64 = 40;
const MIN_CAPACITY: u64 = 4096;

#[derive(Debug, Error)]
pub enum RingError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("ring file {0:?} is already open in this process")]
    PathBusy(PathBuf),

    #[error("not a ring file: bad magic")]
    BadMagic,

    #[error("unsupported ring version {0}")]
    BadVersion(u32),

    #[error("corrupt ring header: {0}")]
    Corrupt(String),

    #[error("frame of {frame} bytes exceeds ring capacity {capacity}")]
    FrameTooLarge { frame: u64, capacity: u64 },

    #[error("buffer empty")]
    Empty,
}

/// Process-wide set of open ring paths. Two processors configured onto the
/// same file is a configuration error, not a race to corrupt it.
fn open_paths() -> &'static Mutex<HashSet<PathBuf>> {
    static PATHS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    PATHS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// A fixed-capacity circular frame file.
pub struct Ring {
    file: File,
    path: PathBuf,
    capacity: u64,
    head: u64,
    tail: u64,
    count: u64,
}

impl Ring {
    /// Opens or creates a ring at `path`. An existing file keeps its own
    /// capacity; `capacity` applies only at creation and is a lower bound.
    pub fn open(path: &Path, capacity: u64) -> Result<Self, RingError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let resolved = path.canonicalize()?;
        {
            let mut paths = open_paths().lock().unwrap_or_else(|e| e.into_inner());
            if !paths.insert(resolved.clone()) {
                return Err(RingError::PathBusy(resolved));
            }
        }

        let result = if file.metadata()?.len() == 0 {
            Self::create(file, &resolved, capacity.max(MIN_CAPACITY))
        } else {
            Self::load(&mut file).map(|(capacity, head, tail, count)| Self {
                file,
                path: resolved.clone(),
                capacity,
                head,
                tail,
                count,
            })
        };
        if result.is_err() {
            let mut paths = open_paths().lock().unwrap_or_else(|e| e.into_inner());
            paths.remove(&resolved);
        }
        result
    }

    fn create(mut file: File, path: &Path, capacity: u64) -> Result<Self, RingError> {
        file.set_len(HEADER_LEN + capacity)?;
        let mut ring = Self {
            file,
            path: path.to_path_buf(),
            capacity,
            head: 0,
            tail: 0,
            count: 0,
        };
        ring.write_header()?;
        Ok(ring)
    }

    fn load(file: &mut File) -> Result<(u64, u64, u64, u64), RingError> {
        file.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header)?;

        let magic = u32::from_le_bytes(header[0..4].try_into().expect("fixed slice"));
        if magic != MAGIC {
            return Err(RingError::BadMagic);
        }
        let version = u32::from_le_bytes(header[4..8].try_into().expect("fixed slice"));
        if version != VERSION {
            return Err(RingError::BadVersion(version));
        }
        let capacity = u64::from_le_bytes(header[8..16].try_into().expect("fixed slice"));
        let head = u64::from_le_bytes(header[16..24].try_into().expect("fixed slice"));
        let tail = u64::from_le_bytes(header[24..32].try_into().expect("fixed slice"));
        let count = u64::from_le_bytes(header[32..40].try_into().expect("fixed slice"));

        if capacity == 0 || head >= capacity || tail >= capacity {
            return Err(RingError::Corrupt(format!(
                "capacity={capacity} head={head} tail={tail}"
            )));
        }
        if file.metadata()?.len() < HEADER_LEN + capacity {
            return Err(RingError::Corrupt("file shorter than its capacity".into()));
        }
        Ok((capacity, head, tail, count))
    }

    fn write_header(&mut self) -> Result<(), RingError> {
        let mut header = [0u8; HEADER_LEN as usize];
        header[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&VERSION.to_le_bytes());
        header[8..16].copy_from_slice(&self.capacity.to_le_bytes());
        header[16..24].copy_from_slice(&self.head.to_le_bytes());
        header[24..32].copy_from_slice(&self.tail.to_le_bytes());
        header[32..40].copy_from_slice(&self.count.to_le_bytes());
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn used(&self) -> u64 {
        if self.count == 0 {
            0
        } else if self.head == self.tail {
            self.capacity
        } else {
            (self.head + self.capacity - self.tail) % self.capacity
        }
    }

    /// Appends one frame, reclaiming the oldest frames to make room.
    pub fn append(&mut self, payload: &[u8]) -> Result<(), RingError> {
        let needed = 4 + payload.len() as u64;
        if needed > self.capacity {
            return Err(RingError::FrameTooLarge {
                frame: needed,
                capacity: self.capacity,
            });
        }
        while self.capacity - self.used() < needed {
            self.drop_oldest()?;
        }

        let len = (payload.len() as u32).to_le_bytes();
        let head = self.head;
        self.write_wrapped(head, &len)?;
        self.write_wrapped((head + 4) % self.capacity, payload)?;
        self.head = (head + needed) % self.capacity;
        self.count += 1;
        self.write_header()
    }

    /// Removes and returns the oldest frame.
    pub fn pop(&mut self) -> Result<Vec<u8>, RingError> {
        let payload = self.peek_oldest()?;
        self.tail = (self.tail + 4 + payload.len() as u64) % self.capacity;
        self.count -= 1;
        self.write_header()?;
        Ok(payload)
    }

    fn peek_oldest(&mut self) -> Result<Vec<u8>, RingError> {
        if self.count == 0 {
            return Err(RingError::Empty);
        }
        let mut len = [0u8; 4];
        self.read_wrapped(self.tail, &mut len)?;
        let len = u32::from_le_bytes(len) as u64;
        if len > self.used() {
            return Err(RingError::Corrupt(format!("frame length {len}")));
        }
        let mut payload = vec![0u8; len as usize];
        self.read_wrapped((self.tail + 4) % self.capacity, &mut payload)?;
        Ok(payload)
    }

    fn drop_oldest(&mut self) -> Result<(), RingError> {
        if self.count == 0 {
            return Err(RingError::Corrupt("reclaim on empty ring".into()));
        }
        let mut len = [0u8; 4];
        self.read_wrapped(self.tail, &mut len)?;
        let len = u32::from_le_bytes(len) as u64;
        if 4 + len > self.used() {
            return Err(RingError::Corrupt(format!("frame length {len}")));
        }
        self.tail = (self.tail + 4 + len) % self.capacity;
        self.count -= 1;
        Ok(())
    }

    fn write_wrapped(&mut self, offset: u64, data: &[u8]) -> Result<(), RingError> {
        let first = ((self.capacity - offset) as usize).min(data.len());
        self.file.seek(SeekFrom::Start(HEADER_LEN + offset))?;
        self.file.write_all(&data[..first])?;
        if first < data.len() {
            self.file.seek(SeekFrom::Start(HEADER_LEN))?;
            self.file.write_all(&data[first..])?;
        }
        Ok(())
    }

    fn read_wrapped(&mut self, offset: u64, data: &mut [u8]) -> Result<(), RingError> {
        let first = ((self.capacity - offset) as usize).min(data.len());
        self.file.seek(SeekFrom::Start(HEADER_LEN + offset))?;
        self.file.read_exact(&mut data[..first])?;
        if first < data.len() {
            self.file.seek(SeekFrom::Start(HEADER_LEN))?;
            self.file.read_exact(&mut data[first..])?;
        }
        Ok(())
    }

    /// Forces file contents to stable storage.
    pub fn sync(&mut self) -> Result<(), RingError> {
        self.file.sync_data()?;
        Ok(())
    }
}

impl Drop for Ring {
    fn drop(&mut self) {
        let mut paths = open_paths().lock().unwrap_or_else(|e| e.into_inner());
        paths.remove(&self.path);
    }
}
