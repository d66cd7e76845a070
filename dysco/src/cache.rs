//! Threaded block cache and worker pool (component E, concurrency half).
//!
//! Holds completed but not-yet-written time-blocks in a map keyed by block
//! index. A fixed pool of native OS threads pulls the oldest block that
//! isn't already being written, encodes and packs it into a thread-local
//! scratch buffer, writes it to its assigned file offset, then drops it
//! from the cache. Backpressure blocks the calling (row-put) thread once
//! the cache holds `maxCacheSize = 1.2 * workerCount + 1` entries, rather
//! than letting unbounded work queue up in memory.
//!
//! This module only owns the synchronisation; what "encode and pack" means
//! for a given block is supplied by the caller as a per-worker processor,
//! so this stays decoupled from [`crate::normalize`] and [`crate::stman`].

use crate::constants::{MAX_CACHE_SIZE_DENOMINATOR, MAX_CACHE_SIZE_NUMERATOR};
use crate::errors::{DyscoError, DyscoResult};
use dysco_io::BlockFile;
use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// `maxCacheSize = 1.2 * workerCount + 1` (§5).
pub fn max_cache_size(worker_count: usize) -> usize {
  (worker_count * MAX_CACHE_SIZE_NUMERATOR) / MAX_CACHE_SIZE_DENOMINATOR + 1
}

struct CacheItem<T> {
  payload: Option<T>,
  being_written: bool,
}

struct CacheState<T> {
  blocks: BTreeMap<u64, CacheItem<T>>,
  shutting_down: bool,
  error: Option<DyscoError>,
}

/// The shared, mutex-protected map of pending blocks. Cheaply cloned via
/// `Arc` and handed to every worker thread.
pub struct BlockCache<T> {
  state: Mutex<CacheState<T>>,
  not_empty: Condvar,
  not_full: Condvar,
  max_size: usize,
}

impl<T> BlockCache<T> {
  pub fn new(worker_count: usize) -> Arc<Self> {
    Arc::new(BlockCache {
      state: Mutex::new(CacheState {
        blocks: BTreeMap::new(),
        shutting_down: false,
        error: None,
      }),
      not_empty: Condvar::new(),
      not_full: Condvar::new(),
      max_size: max_cache_size(worker_count),
    })
  }

  /// Inserts a completed block, blocking the caller while the cache is
  /// full. Re-raises any error a worker previously stashed (§7: "a failure
  /// in a worker is forwarded to the cache ... and re-raised on the next
  /// row put").
  pub fn put(&self, block_index: u64, payload: T) -> DyscoResult<()> {
    let mut state = self.state.lock().unwrap();
    loop {
      if let Some(err) = state.error.clone() {
        return Err(err);
      }
      if state.blocks.len() < self.max_size {
        break;
      }
      state = self.not_full.wait(state).unwrap();
    }
    state.blocks.insert(
      block_index,
      CacheItem {
        payload: Some(payload),
        being_written: false,
      },
    );
    self.not_empty.notify_one();
    Ok(())
  }

  /// Returns a cached block's payload without removing it, for a read that
  /// lands on a block still sitting in the write-behind cache (§4.E: "if
  /// the requested block is cached, decode from buffer").
  pub fn peek(&self, block_index: u64) -> Option<T>
  where
    T: Clone,
  {
    let state = self.state.lock().unwrap();
    state.blocks.get(&block_index).and_then(|item| item.payload.clone())
  }

  fn take_oldest_pending(&self) -> Option<(u64, T)> {
    let mut state = self.state.lock().unwrap();
    loop {
      let oldest = state
        .blocks
        .iter_mut()
        .find(|(_, item)| !item.being_written)
        .map(|(&idx, _)| idx);
      if let Some(idx) = oldest {
        let item = state.blocks.get_mut(&idx).unwrap();
        item.being_written = true;
        let payload = item.payload.take().expect("payload already taken");
        return Some((idx, payload));
      }
      if state.shutting_down {
        return None;
      }
      state = self.not_empty.wait(state).unwrap();
    }
  }

  fn remove(&self, block_index: u64) {
    let mut state = self.state.lock().unwrap();
    state.blocks.remove(&block_index);
    self.not_full.notify_one();
  }

  fn record_error(&self, err: DyscoError) {
    let mut state = self.state.lock().unwrap();
    if state.error.is_none() {
      state.error = Some(err);
    }
    self.not_full.notify_all();
  }

  /// Cooperative shutdown (§5): sets the flag and wakes every worker, which
  /// finish their current block, then exit; never aborts mid-block.
  pub fn shut_down(&self) {
    let mut state = self.state.lock().unwrap();
    state.shutting_down = true;
    self.not_empty.notify_all();
  }

  pub fn is_empty(&self) -> bool {
    self.state.lock().unwrap().blocks.is_empty()
  }

  pub fn take_error(&self) -> Option<DyscoError> {
    self.state.lock().unwrap().error.clone()
  }
}

/// A fixed pool of worker threads draining a [`BlockCache`]. Each worker is
/// built from `make_processor`, so every thread gets its own encoder
/// scratch and PRNG state (§5: "Each worker owns its own encoder scratch,
/// dither/PRNG state, and packing buffers: these are never shared").
pub struct WorkerPool {
  handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
  /// `process(block_index, payload) -> bytes to write` runs once per block
  /// on whichever worker picks it up; the returned bytes are written at
  /// `header_size + block_index * block_size`.
  pub fn spawn<T, P, F>(
    cache: Arc<BlockCache<T>>,
    file: Arc<BlockFile<F>>,
    header_size: u64,
    block_size: u64,
    worker_count: usize,
    make_processor: impl Fn() -> P,
  ) -> Self
  where
    T: Send + 'static,
    P: FnMut(u64, T) -> DyscoResult<Vec<u8>> + Send + 'static,
    F: Read + Write + Seek + Send + 'static,
  {
    let handles = (0..worker_count.max(1))
      .map(|_| {
        let cache = Arc::clone(&cache);
        let file = Arc::clone(&file);
        let mut processor = make_processor();
        std::thread::spawn(move || {
          while let Some((block_index, payload)) = cache.take_oldest_pending() {
            match processor(block_index, payload) {
              Ok(bytes) => {
                let offset = header_size + block_index * block_size;
                if let Err(err) = file.write_at(offset, &bytes) {
                  cache.record_error(err.into());
                }
              }
              Err(err) => cache.record_error(err),
            }
            cache.remove(block_index);
          }
        })
      })
      .collect();
    WorkerPool { handles }
  }

  /// Signals shutdown and joins every worker; blocks until the cache has
  /// fully drained.
  pub fn join(self, cache: &BlockCache<impl Send>) {
    cache.shut_down();
    for handle in self.handles {
      let _ = handle.join();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;
  use std::sync::Mutex as StdMutex;

  #[test]
  fn test_max_cache_size_matches_1point2_formula() {
    assert_eq!(max_cache_size(4), 5); // floor(4*1.2)+1 = floor(4.8)+1 = 5
    assert_eq!(max_cache_size(1), 2);
  }

  #[test]
  fn test_put_and_peek() {
    let cache: Arc<BlockCache<Vec<u8>>> = BlockCache::new(2);
    cache.put(0, vec![1, 2, 3]).unwrap();
    assert_eq!(cache.peek(0), Some(vec![1, 2, 3]));
    assert!(!cache.is_empty());
  }

  #[test]
  fn test_worker_pool_drains_and_writes_blocks() {
    let cache: Arc<BlockCache<Vec<u8>>> = BlockCache::new(1);
    let file = Arc::new(BlockFile::new(Cursor::new(vec![0_u8; 64])));

    let seen = Arc::new(StdMutex::new(Vec::new()));
    let seen_for_worker = Arc::clone(&seen);
    let pool = WorkerPool::spawn(
      Arc::clone(&cache),
      Arc::clone(&file),
      0,
      8,
      1,
      move || {
        let seen = Arc::clone(&seen_for_worker);
        move |block_index: u64, payload: Vec<u8>| {
          seen.lock().unwrap().push(block_index);
          Ok(payload)
        }
      },
    );

    cache.put(0, vec![9_u8; 8]).unwrap();
    cache.put(1, vec![7_u8; 8]).unwrap();

    // wait for the cache to drain instead of sleeping on a fixed timer
    while !cache.is_empty() {
      std::thread::yield_now();
    }
    pool.join(&cache);

    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec![0, 1]);

    let mut buf = vec![0_u8; 8];
    file.read_at(0, &mut buf).unwrap();
    assert_eq!(buf, vec![9_u8; 8]);
    file.read_at(8, &mut buf).unwrap();
    assert_eq!(buf, vec![7_u8; 8]);
  }

  #[test]
  fn test_worker_error_is_recorded_and_surfaces_on_put() {
    let cache: Arc<BlockCache<Vec<u8>>> = BlockCache::new(1);
    let file = Arc::new(BlockFile::new(Cursor::new(vec![0_u8; 8])));
    let pool = WorkerPool::spawn(Arc::clone(&cache), Arc::clone(&file), 0, 8, 1, || {
      |_block_index: u64, _payload: Vec<u8>| Err(DyscoError::format("synthetic failure"))
    });

    cache.put(0, vec![0_u8; 8]).unwrap();
    while cache.take_error().is_none() {
      std::thread::yield_now();
    }
    pool.join(&cache);
    assert!(cache.put(1, vec![0_u8; 8]).is_err());
  }
}
