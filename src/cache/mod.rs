//! Pinned in-memory file cache.
//!
//! The cache maps file paths to their contents, held in [`Buffer`]s.
//! A successful [`pin`](FileCache::pin) hands out a [`Pinned`] guard;
//! for as long as any guard for an entry is alive, the entry cannot be
//! evicted and its buffer stays put. Dropping the guard unpins.
//!
//! A hit takes only the read lock — the per-entry pin count is an
//! atomic, and eviction needs the write lock, so bumping the count
//! under the read lock cannot race an eviction. A miss loads the file
//! with no lock held at all and only re-takes the write lock to insert
//! the finished node; two threads loading the same path concurrently
//! are resolved at insert time, where one wins and the other discards
//! its work.
//!
//! Eviction is FIFO over unpinned entries: the oldest entries are
//! walked in insertion order and every unpinned one is dropped until
//! the incoming file fits. Pinned entries are skipped, so eviction can
//! fail — and with it the pin.

use crate::buffer::{Buffer, BLOCK_SIZE};

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, Read};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;

/// Why a [`FileCache::pin`] produced no entry.
#[derive(Debug, Error)]
pub enum PinError {
    /// Not enough unpinned space to hold the file (or the file is
    /// larger than the cache). The caller may serve it from disk
    /// directly.
    #[error("not enough unpinned cache space")]
    NoSpace,

    /// A concurrent load of the same path won the insert race; this
    /// load was discarded.
    #[error("lost a concurrent load of the same file")]
    LostRace,

    /// Opening or reading the file failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

struct Node {
    path: String,
    buffer: Buffer,
    size: usize,

    /// Outstanding pins. Non-zero forbids eviction.
    pin_count: AtomicU32,
}

struct CacheState {
    /// Path lookup.
    map: HashMap<String, Arc<Node>>,

    /// Insertion order; eviction walks this front to back.
    fifo: BTreeMap<u64, Arc<Node>>,

    next_seq: u64,
}

/// Map from path to pinned in-memory contents. See the
/// [module docs](self).
pub struct FileCache {
    max_size: usize,
    state: RwLock<CacheState>,

    // Counters, updated with atomic fetch-add.
    bytes_used: AtomicUsize,
    pin_total: AtomicU64,
    hit_total: AtomicU64,
    failed_total: AtomicU64,
}

impl FileCache {
    /// Builds a cache that will hold at most `max_size` content bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            state: RwLock::new(CacheState {
                map: HashMap::new(),
                fifo: BTreeMap::new(),
                next_seq: 0,
            }),
            bytes_used: AtomicUsize::new(0),
            pin_total: AtomicU64::new(0),
            hit_total: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
        }
    }

    /// Pins `path`, loading it on a miss. The returned guard keeps the
    /// entry resident until dropped.
    pub fn pin(&self, path: &str) -> Result<Pinned, PinError> {
        // The short path: the file is loaded already.
        {
            let state = self.state.read().unwrap();
            if let Some(node) = state.map.get(path) {
                // Safe under the read lock: eviction takes the write
                // lock, so this node cannot disappear mid-increment.
                node.pin_count.fetch_add(1, Ordering::AcqRel);
                let node = node.clone();
                drop(state);

                self.pin_total.fetch_add(1, Ordering::Relaxed);
                self.hit_total.fetch_add(1, Ordering::Relaxed);
                return Ok(Pinned { node });
            }
        }

        self.load(path)
    }

    /// Loads `path` from disk and inserts it.
    ///
    /// Runs without any lock: write-locking the map across file I/O
    /// would stall every reader behind the disk. The price is that two
    /// threads may load the same file; the insert below picks the
    /// winner.
    fn load(&self, path: &str) -> Result<Pinned, PinError> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path, error = %e, "could not open file");
                return Err(PinError::Io(e));
            }
        };
        let size = file.metadata().map_err(PinError::Io)?.len() as usize;

        let available = self.max_size.saturating_sub(self.bytes_used.load(Ordering::Acquire));
        if available < size {
            if !self.evict(size as i64) {
                // Not enough available or unpinned space.
                self.pin_total.fetch_add(1, Ordering::Relaxed);
                self.failed_total.fetch_add(1, Ordering::Relaxed);
                return Err(PinError::NoSpace);
            }
        }

        let mut buffer = Buffer::new();
        let mut remaining = size;
        while remaining > 0 {
            buffer.reserve(BLOCK_SIZE);
            let n = match file.read(buffer.write_slice()) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(path, error = %e, "cannot read file");
                    return Err(PinError::Io(e));
                }
            };
            if n == 0 {
                tracing::warn!(path, "file shrank while being read");
                break;
            }
            buffer.advance(n);
            remaining -= n.min(remaining);
        }

        let pinned = {
            let mut state = self.state.write().unwrap();

            if state.map.contains_key(path) {
                // Somebody loaded it first; our copy goes to waste.
                None
            } else {
                let seq = state.next_seq;
                state.next_seq += 1;

                let node = Arc::new(Node {
                    path: path.to_string(),
                    buffer,
                    size,
                    pin_count: AtomicU32::new(1),
                });
                state.map.insert(path.to_string(), node.clone());
                state.fifo.insert(seq, node.clone());
                Some(Pinned { node })
            }
        };

        self.pin_total.fetch_add(1, Ordering::Relaxed);
        match pinned {
            Some(pinned) => {
                self.bytes_used.fetch_add(size, Ordering::AcqRel);
                Ok(pinned)
            }
            None => {
                self.failed_total.fetch_add(1, Ordering::Relaxed);
                Err(PinError::LostRace)
            }
        }
    }

    /// Walks the FIFO, dropping unpinned entries until `needed` bytes
    /// were reclaimed. Returns whether it managed.
    ///
    /// `needed` is signed on purpose: node sizes are subtracted from
    /// it and the walk stops when it goes non-positive.
    fn evict(&self, mut needed: i64) -> bool {
        let mut dropped = Vec::new();

        {
            let mut state = self.state.write().unwrap();
            if state.fifo.is_empty() {
                return false;
            }

            let seqs: Vec<u64> = state.fifo.keys().copied().collect();
            let mut reclaimed = 0usize;

            for seq in seqs {
                if needed <= 0 {
                    break;
                }

                let unpinned = state.fifo[&seq].pin_count.load(Ordering::Acquire) == 0;
                if unpinned {
                    let node = state.fifo.remove(&seq).unwrap();
                    state.map.remove(&node.path);
                    reclaimed += node.size;
                    needed -= node.size as i64;
                    dropped.push(node);
                }
            }

            self.bytes_used.fetch_sub(reclaimed, Ordering::AcqRel);
        }

        // Buffers are freed outside the lock.
        drop(dropped);

        needed <= 0
    }

    //
    // Accessors
    //

    /// Configured capacity in bytes.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Bytes currently resident, pinned or not.
    pub fn bytes_used(&self) -> usize {
        self.bytes_used.load(Ordering::Acquire)
    }

    /// Total pin requests.
    pub fn pins(&self) -> u64 {
        self.pin_total.load(Ordering::Relaxed)
    }

    /// Pin requests served from memory.
    pub fn hits(&self) -> u64 {
        self.hit_total.load(Ordering::Relaxed)
    }

    /// Pin requests that failed for lack of space or to a lost load
    /// race.
    pub fn failed(&self) -> u64 {
        self.failed_total.load(Ordering::Relaxed)
    }
}

/// A live pin on a cache entry.
///
/// The entry's buffer is stable for as long as the guard lives;
/// dropping the guard unpins the entry and makes it evictable again
/// (once every other pin is gone too).
pub struct Pinned {
    node: Arc<Node>,
}

impl Pinned {
    /// The cached file contents.
    pub fn buffer(&self) -> &Buffer {
        &self.node.buffer
    }

    /// File size at load time.
    pub fn size(&self) -> usize {
        self.node.size
    }

    /// The path this entry was loaded from.
    pub fn path(&self) -> &str {
        &self.node.path
    }
}

impl Drop for Pinned {
    fn drop(&mut self) {
        self.node.pin_count.fetch_sub(1, Ordering::AcqRel);
    }
}
