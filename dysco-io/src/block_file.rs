use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

/// A handle to the single file backing a dysco column.
///
/// The block region of a dysco file is a sequence of fixed-size frames
/// addressed by `headerSize + blockIndex * blockSize`. Every read or write
/// against it is a seek followed by a read/write of an exact number of
/// bytes, serialized under one mutex, matching the "File I/O is synchronous
/// and serialised under the file mutex" rule of the concurrency model: there
/// is no benefit to `pread`/`pwrite`-style unsynchronized access here, since
/// only one thread may touch the file handle at a time regardless.
pub struct BlockFile<F = File> {
  inner: Mutex<F>,
}

impl<F: Read + Write + Seek> BlockFile<F> {
  pub fn new(file: F) -> Self {
    Self {
      inner: Mutex::new(file),
    }
  }

  /// Reads exactly `dst.len()` bytes starting at `offset`.
  pub fn read_at(&self, offset: u64, dst: &mut [u8]) -> std::io::Result<()> {
    let mut guard = self.inner.lock().unwrap();
    guard.seek(SeekFrom::Start(offset))?;
    guard.read_exact(dst)
  }

  /// Writes all of `src` starting at `offset`.
  pub fn write_at(&self, offset: u64, src: &[u8]) -> std::io::Result<()> {
    let mut guard = self.inner.lock().unwrap();
    guard.seek(SeekFrom::Start(offset))?;
    guard.write_all(src)
  }

  /// Current length of the file, as reported by seeking to its end.
  pub fn len(&self) -> std::io::Result<u64> {
    let mut guard = self.inner.lock().unwrap();
    guard.seek(SeekFrom::End(0))
  }

  pub fn is_empty(&self) -> std::io::Result<bool> {
    Ok(self.len()? == 0)
  }

  pub fn flush(&self) -> std::io::Result<()> {
    self.inner.lock().unwrap().flush()
  }

  /// Runs `f` with exclusive, sequential access to the underlying file,
  /// starting from its current position. Used for the header region, which
  /// is read/written once, sequentially, rather than at block granularity.
  pub fn with_sequential<T>(&self, f: impl FnOnce(&mut F) -> std::io::Result<T>) -> std::io::Result<T> {
    let mut guard = self.inner.lock().unwrap();
    f(&mut guard)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[test]
  fn test_block_round_trip() {
    let file = BlockFile::new(Cursor::new(vec![0_u8; 32]));
    file.write_at(8, &[1, 2, 3, 4]).unwrap();
    let mut buf = [0_u8; 4];
    file.read_at(8, &mut buf).unwrap();
    assert_eq!(buf, [1, 2, 3, 4]);
    assert_eq!(file.len().unwrap(), 32);
  }

  #[test]
  fn test_read_past_end_errors() {
    let file = BlockFile::new(Cursor::new(vec![0_u8; 4]));
    let mut buf = [0_u8; 8];
    assert!(file.read_at(0, &mut buf).is_err());
  }
}
