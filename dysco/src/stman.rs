//! Glue to an external columnar table storage runtime (component G).
//!
//! No real host runtime (casacore's measurement-set storage manager
//! framework) is linked into this crate, so this module defines the Rust
//! side of that contract concretely enough to build and test against:
//! [`ColumnStorage`], the per-row operations a host invokes the codec
//! through; [`registry`], a process-wide registration hook mirroring the
//! original's global `DyscoStMan` registration; [`DyscoColumn`], the
//! concrete column implementation; and [`MockColumnStorage`], an
//! in-memory stand-in used by tests in place of a casacore-backed column.

use crate::block_codec;
use crate::cache::max_cache_size;
use crate::errors::{DyscoError, DyscoResult};
use crate::normalize::{Normalization, NormalizationKind, Vis};
use crate::quantizer::Quantizer;
use crate::spec::DyscoSpec;
use crate::time_block::TimeBlockBuffer;
use dysco_io::BlockFile;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{Read, Seek, Write};
use std::sync::OnceLock;

/// Per-row baseline and time-block identity, as a real host runtime would
/// read it from the `ANTENNA1`, `ANTENNA2`, `FIELD_ID`, `DATA_DESC_ID` and
/// `TIME` companion scalar columns (§6).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RowMeta {
  pub antenna1: usize,
  pub antenna2: usize,
  pub field_id: usize,
  pub data_desc_id: usize,
  pub time: f64,
}

/// The operations a host table runtime invokes the codec through (§6).
/// `put_array` is given the row's companion-column metadata directly,
/// since this crate has no live scalar-column reader to pull it from; a
/// real binding would read those columns itself before calling in.
pub trait ColumnStorage {
  type Value;

  fn antenna1(&self, row: usize) -> DyscoResult<usize>;
  fn antenna2(&self, row: usize) -> DyscoResult<usize>;
  fn field_id(&self, row: usize) -> DyscoResult<usize>;
  fn data_desc_id(&self, row: usize) -> DyscoResult<usize>;
  fn time(&self, row: usize) -> DyscoResult<f64>;

  fn get_array(&mut self, row: usize) -> DyscoResult<Vec<Self::Value>>;
  fn put_array(&mut self, row: usize, meta: RowMeta, data: &[Self::Value]) -> DyscoResult<()>;

  fn flush(&mut self) -> DyscoResult<()>;
}

/// A codec that knows how to turn one time-block's raw rows into block
/// metadata and symbols and back, parameterised over the value type it
/// stores (`Vis` for data columns, `f32` for weight columns). Lets
/// [`DyscoColumn`] stay generic over both without a shared base trait
/// across [`crate::normalize::BlockEncoder`] and
/// [`crate::normalize::WeightEncoder`], whose encode contracts differ.
pub trait ColumnCodec<T> {
  fn meta_data_count(&self, n_rows: usize, n_antennae: usize) -> usize;
  fn encode(&mut self, buffer: &TimeBlockBuffer<T>, n_antennae: usize, static_seed: bool) -> (Vec<f32>, Vec<u32>);
  fn initialize_decode(&mut self, metadata: &[f32], n_rows: usize, n_antennae: usize);
  fn decode_row(&mut self, buffer: &mut TimeBlockBuffer<T>, symbols: &[u32], block_row: usize, a1: usize, a2: usize);
  fn bit_width(&self) -> u32;
}

/// [`ColumnCodec`] for complex data columns: a [`Normalization`] strategy
/// plus the immutable [`Quantizer`] dictionary it quantises against.
pub struct DataCodec {
  quantizer: Quantizer,
  normalization: Normalization,
  n_pol: usize,
  n_chan: usize,
  bit_width: u32,
}

impl DataCodec {
  pub fn new(spec: &DyscoSpec, n_pol: usize, n_chan: usize) -> DyscoResult<Self> {
    let quantizer = Quantizer::build(
      spec.distribution,
      1_u64 << spec.data_bit_count,
      1.0,
      spec.distribution_truncation,
      spec.student_t_nu,
    )?;
    let normalization = Normalization::new(spec.normalization, n_pol, n_chan, spec.fit_to_maximum);
    Ok(DataCodec {
      quantizer,
      normalization,
      n_pol,
      n_chan,
      bit_width: spec.data_bit_count,
    })
  }

  pub fn kind(&self) -> NormalizationKind {
    self.normalization.kind()
  }
}

impl ColumnCodec<Vis> for DataCodec {
  fn meta_data_count(&self, n_rows: usize, n_antennae: usize) -> usize {
    Normalization::meta_data_count(self.normalization.kind(), n_rows, self.n_pol, self.n_chan, n_antennae)
  }

  fn encode(&mut self, buffer: &TimeBlockBuffer<Vis>, n_antennae: usize, static_seed: bool) -> (Vec<f32>, Vec<u32>) {
    let mut rng = if static_seed {
      StdRng::seed_from_u64(crate::constants::STATIC_SEED)
    } else {
      StdRng::from_entropy()
    };
    self.normalization.encode(&self.quantizer, buffer, n_antennae, Some(&mut rng))
  }

  fn initialize_decode(&mut self, metadata: &[f32], n_rows: usize, n_antennae: usize) {
    self.normalization.initialize_decode(metadata, n_rows, n_antennae);
  }

  fn decode_row(&mut self, buffer: &mut TimeBlockBuffer<Vis>, symbols: &[u32], block_row: usize, a1: usize, a2: usize) {
    self.normalization.decode(&self.quantizer, buffer, symbols, block_row, a1, a2);
  }

  fn bit_width(&self) -> u32 {
    self.bit_width
  }
}

/// [`ColumnCodec`] for weight columns: a scalar-per-`(row, channel)`
/// quantiser-free encoding (§4.D.4), not a dictionary lookup.
pub struct WeightCodec {
  encoder: crate::normalize::WeightEncoder,
  n_pol: usize,
  n_chan: usize,
  bit_width: u32,
}

impl WeightCodec {
  pub fn new(spec: &DyscoSpec, n_pol: usize, n_chan: usize) -> Self {
    WeightCodec {
      encoder: crate::normalize::WeightEncoder::new(n_pol, n_chan),
      n_pol,
      n_chan,
      bit_width: spec.weight_bit_count,
    }
  }
}

impl ColumnCodec<f32> for WeightCodec {
  fn meta_data_count(&self, n_rows: usize, _n_antennae: usize) -> usize {
    crate::normalize::WeightEncoder::meta_data_count(n_rows, self.n_chan)
  }

  fn encode(&mut self, buffer: &TimeBlockBuffer<f32>, _n_antennae: usize, _static_seed: bool) -> (Vec<f32>, Vec<u32>) {
    let n_rows = buffer.n_rows();
    let mut flat = Vec::with_capacity(n_rows * self.n_pol * self.n_chan);
    for row in buffer.rows() {
      flat.extend_from_slice(&row.visibilities);
    }
    self
      .encoder
      .encode(self.bit_width, &flat, n_rows)
      .expect("weight block always matches the shape it was built for")
  }

  fn initialize_decode(&mut self, metadata: &[f32], n_rows: usize, _n_antennae: usize) {
    self.encoder.initialize_decode(metadata, n_rows);
  }

  fn decode_row(&mut self, buffer: &mut TimeBlockBuffer<f32>, symbols: &[u32], block_row: usize, a1: usize, a2: usize) {
    let weights = self.encoder.decode(symbols, block_row);
    buffer
      .set_row(block_row, a1, a2, &weights)
      .expect("decode target row shape must match encoder shape");
  }

  fn bit_width(&self) -> u32 {
    self.bit_width
  }
}

/// A live, file-backed dysco column: the concrete [`ColumnStorage`]
/// implementation that actually owns a [`BlockFile`], discovers
/// `rowsPerBlock` and the baseline order from the first time-block, and
/// enforces the regular-grid precondition (§6) on every subsequent one.
pub struct DyscoColumn<T, C, F = std::fs::File> {
  codec: C,
  n_pol: usize,
  n_chan: usize,
  n_antennae: usize,
  rows_per_block: Option<usize>,
  baseline_sequence: Vec<(usize, usize)>,
  row_metas: Vec<RowMeta>,
  write_buffer: TimeBlockBuffer<T>,
  write_buffer_start_row: usize,
  header_size: u64,
  block_size: Option<u64>,
  next_block_index: u64,
  file: BlockFile<F>,
  static_seed: bool,
}

impl<T, C, F> DyscoColumn<T, C, F>
where
  T: Clone + Default,
  C: ColumnCodec<T>,
  F: Read + Write + Seek,
{
  pub fn create(codec: C, n_pol: usize, n_chan: usize, n_antennae: usize, header_size: u64, file: F, static_seed: bool) -> Self {
    DyscoColumn {
      codec,
      n_pol,
      n_chan,
      n_antennae,
      rows_per_block: None,
      baseline_sequence: Vec::new(),
      row_metas: Vec::new(),
      write_buffer: TimeBlockBuffer::new(n_pol, n_chan),
      write_buffer_start_row: 0,
      header_size,
      block_size: None,
      next_block_index: 0,
      file: BlockFile::new(file),
      static_seed,
    }
  }

  fn is_new_time_block(&self, meta: &RowMeta) -> bool {
    let last_row = self.row_metas.last();
    match last_row {
      None => false,
      Some(last) => {
        last.time != meta.time || last.field_id != meta.field_id || last.data_desc_id != meta.data_desc_id
      }
    }
  }

  /// Flushes the current write buffer as a completed block: encodes,
  /// frames, and writes it at its assigned file offset.
  fn flush_block(&mut self) -> DyscoResult<()> {
    if self.write_buffer.is_empty() {
      return Ok(());
    }
    let n_rows = self.write_buffer.n_rows();
    if let Some(rows_per_block) = self.rows_per_block {
      if n_rows != rows_per_block {
        return Err(DyscoError::regularity(format!(
          "final time-block has {} rows, expected {} (partial blocks are not supported)",
          n_rows, rows_per_block,
        )));
      }
    } else {
      self.rows_per_block = Some(n_rows);
      self.baseline_sequence = self.write_buffer.rows().iter().map(|r| (r.antenna1, r.antenna2)).collect();
    }

    let (meta, symbols) = self.codec.encode(&self.write_buffer, self.n_antennae, self.static_seed);
    let frame = block_codec::encode_column_frame(&meta, self.codec.bit_width(), &symbols)?;
    if self.block_size.is_none() {
      self.block_size = Some(frame.len() as u64);
    }
    let block_size = self.block_size.unwrap();
    if frame.len() as u64 != block_size {
      return Err(DyscoError::format(format!(
        "encoded block is {} bytes, expected the fixed block size of {}",
        frame.len(),
        block_size,
      )));
    }
    let offset = self.header_size + self.next_block_index * block_size;
    self.file.write_at(offset, &frame)?;
    self.next_block_index += 1;
    self.write_buffer_start_row += n_rows;
    self.write_buffer.reset();
    Ok(())
  }

  fn load_block(&mut self, block_index: u64) -> DyscoResult<(Vec<f32>, Vec<u32>)> {
    let block_size = self
      .block_size
      .ok_or_else(|| DyscoError::format("block size is not yet known; nothing has been written"))?;
    let rows_per_block = self
      .rows_per_block
      .ok_or_else(|| DyscoError::format("rows per block is not yet known; nothing has been written"))?;
    let offset = self.header_size + block_index * block_size;
    let mut frame = vec![0_u8; block_size as usize];
    self.file.read_at(offset, &mut frame)?;
    let meta_count = self.codec.meta_data_count(rows_per_block, self.n_antennae);
    let symbol_count = 2 * rows_per_block * self.n_pol * self.n_chan;
    block_codec::decode_column_frame(&frame, meta_count, self.codec.bit_width(), symbol_count)
  }

  pub fn rows_per_block(&self) -> Option<usize> {
    self.rows_per_block
  }

  pub fn block_size(&self) -> Option<u64> {
    self.block_size
  }
}

impl<T, C, F> ColumnStorage for DyscoColumn<T, C, F>
where
  T: Clone + Default,
  C: ColumnCodec<T>,
  F: Read + Write + Seek,
{
  type Value = T;

  fn antenna1(&self, row: usize) -> DyscoResult<usize> {
    self.row_metas.get(row).map(|m| m.antenna1).ok_or_else(|| row_not_found(row))
  }

  fn antenna2(&self, row: usize) -> DyscoResult<usize> {
    self.row_metas.get(row).map(|m| m.antenna2).ok_or_else(|| row_not_found(row))
  }

  fn field_id(&self, row: usize) -> DyscoResult<usize> {
    self.row_metas.get(row).map(|m| m.field_id).ok_or_else(|| row_not_found(row))
  }

  fn data_desc_id(&self, row: usize) -> DyscoResult<usize> {
    self.row_metas.get(row).map(|m| m.data_desc_id).ok_or_else(|| row_not_found(row))
  }

  fn time(&self, row: usize) -> DyscoResult<f64> {
    self.row_metas.get(row).map(|m| m.time).ok_or_else(|| row_not_found(row))
  }

  fn put_array(&mut self, row: usize, meta: RowMeta, data: &[T]) -> DyscoResult<()> {
    if self.is_new_time_block(&meta) {
      self.flush_block()?;
    }

    let block_row = row - self.write_buffer_start_row;
    if let Some(expected) = self.baseline_sequence.get(block_row) {
      if *expected != (meta.antenna1, meta.antenna2) {
        return Err(DyscoError::regularity(format!(
          "row {} has baseline ({}, {}), expected ({}, {}) from the first time-block",
          row, meta.antenna1, meta.antenna2, expected.0, expected.1,
        )));
      }
    }

    self.write_buffer.set_row(block_row, meta.antenna1, meta.antenna2, data)?;
    self.row_metas.push(meta);
    Ok(())
  }

  fn get_array(&mut self, row: usize) -> DyscoResult<Vec<T>> {
    let rows_per_block = self
      .rows_per_block
      .ok_or_else(|| DyscoError::format("no rows have been written yet"))?;
    let block_index = (row / rows_per_block) as u64;
    let block_row = row % rows_per_block;

    if block_index as usize == self.next_block_index as usize && !self.write_buffer.is_empty() {
      let row_data = self.write_buffer.row(block_row)?;
      return Ok(row_data.visibilities.clone());
    }

    let (meta, symbols) = self.load_block(block_index)?;
    self.codec.initialize_decode(&meta, rows_per_block, self.n_antennae);
    let row_meta = self
      .row_metas
      .get(row)
      .ok_or_else(|| row_not_found(row))?;
    let mut scratch: TimeBlockBuffer<T> = TimeBlockBuffer::new(self.n_pol, self.n_chan);
    self
      .codec
      .decode_row(&mut scratch, &symbols, block_row, row_meta.antenna1, row_meta.antenna2);
    Ok(scratch.row(block_row)?.visibilities.clone())
  }

  fn flush(&mut self) -> DyscoResult<()> {
    self.flush_block()?;
    self.file.flush()?;
    Ok(())
  }
}

fn row_not_found(row: usize) -> DyscoError {
  DyscoError::format(format!("row {} has not been written", row))
}

/// `maxCacheSize` for the worker-pool sizing a real threaded binding would
/// use; exposed here so the storage glue layer and [`crate::cache`] agree
/// on the same formula without duplicating the constant.
pub fn default_worker_count(static_seed: bool) -> usize {
  if static_seed {
    1
  } else {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
  }
}

pub fn suggested_cache_capacity(static_seed: bool) -> usize {
  max_cache_size(default_worker_count(static_seed))
}

/// Process-wide registration hook mirroring the original's global
/// `DyscoStMan` registration (Design Note §9): a host runtime looks the
/// name up once at start-up to learn that `"DyscoStMan"` is a storage
/// manager this crate provides.
pub mod registry {
  use super::OnceLock;

  static REGISTERED_NAME: OnceLock<&'static str> = OnceLock::new();

  pub const STORAGE_MANAGER_NAME: &str = "DyscoStMan";

  /// Idempotent; safe to call from multiple places during start-up.
  pub fn register() -> &'static str {
    *REGISTERED_NAME.get_or_init(|| STORAGE_MANAGER_NAME)
  }

  pub fn is_registered() -> bool {
    REGISTERED_NAME.get().is_some()
  }
}

#[cfg(test)]
pub mod mock {
  //! An in-memory stand-in for a casacore-backed column, for tests that
  //! need [`ColumnStorage`] without any real host runtime.
  use super::{ColumnStorage, DyscoError, DyscoResult, RowMeta};
  use std::collections::HashMap;

  pub struct MockColumnStorage<T> {
    metas: Vec<RowMeta>,
    rows: HashMap<usize, Vec<T>>,
  }

  impl<T> MockColumnStorage<T> {
    pub fn new() -> Self {
      MockColumnStorage {
        metas: Vec::new(),
        rows: HashMap::new(),
      }
    }
  }

  impl<T> Default for MockColumnStorage<T> {
    fn default() -> Self {
      Self::new()
    }
  }

  impl<T: Clone> ColumnStorage for MockColumnStorage<T> {
    type Value = T;

    fn antenna1(&self, row: usize) -> DyscoResult<usize> {
      self.metas.get(row).map(|m| m.antenna1).ok_or_else(|| super::row_not_found(row))
    }

    fn antenna2(&self, row: usize) -> DyscoResult<usize> {
      self.metas.get(row).map(|m| m.antenna2).ok_or_else(|| super::row_not_found(row))
    }

    fn field_id(&self, row: usize) -> DyscoResult<usize> {
      self.metas.get(row).map(|m| m.field_id).ok_or_else(|| super::row_not_found(row))
    }

    fn data_desc_id(&self, row: usize) -> DyscoResult<usize> {
      self.metas.get(row).map(|m| m.data_desc_id).ok_or_else(|| super::row_not_found(row))
    }

    fn time(&self, row: usize) -> DyscoResult<f64> {
      self.metas.get(row).map(|m| m.time).ok_or_else(|| super::row_not_found(row))
    }

    fn get_array(&mut self, row: usize) -> DyscoResult<Vec<T>> {
      self.rows.get(&row).cloned().ok_or_else(|| super::row_not_found(row))
    }

    fn put_array(&mut self, row: usize, meta: RowMeta, data: &[T]) -> DyscoResult<()> {
      if row != self.metas.len() {
        return Err(DyscoError::configuration("MockColumnStorage requires sequential row writes"));
      }
      self.metas.push(meta);
      self.rows.insert(row, data.to_vec());
      Ok(())
    }

    fn flush(&mut self) -> DyscoResult<()> {
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::distribution::DistributionKind;
  use crate::normalize::NormalizationKind;
  use std::io::Cursor;

  fn spec() -> DyscoSpec {
    DyscoSpec::new()
      .with_data_bit_count(10)
      .with_distribution(DistributionKind::Gaussian)
      .with_normalization(NormalizationKind::Row)
      .with_fit_to_maximum(false)
  }

  fn meta(a1: usize, a2: usize, time: f64) -> RowMeta {
    RowMeta {
      antenna1: a1,
      antenna2: a2,
      field_id: 0,
      data_desc_id: 0,
      time,
    }
  }

  #[test]
  fn test_registry_name_is_stable() {
    assert_eq!(registry::register(), "DyscoStMan");
    assert!(registry::is_registered());
  }

  #[test]
  fn test_single_block_round_trip() {
    let n_pol = 1;
    let n_chan = 1;
    let codec = DataCodec::new(&spec(), n_pol, n_chan).unwrap();
    let file = Cursor::new(Vec::new());
    let mut column: DyscoColumn<Vis, DataCodec, Cursor<Vec<u8>>> =
      DyscoColumn::create(codec, n_pol, n_chan, 3, 0, file, true);

    let rows = [
      (0, 1, Vis::new(1.0, 2.0)),
      (0, 2, Vis::new(-1.0, 0.5)),
      (1, 2, Vis::new(0.25, -0.25)),
    ];
    for (row, &(a1, a2, v)) in rows.iter().enumerate() {
      column.put_array(row, meta(a1, a2, 0.0), &[v]).unwrap();
    }
    // next time-block, identical baseline order, forces the first block to flush
    for (i, &(a1, a2, v)) in rows.iter().enumerate() {
      column.put_array(3 + i, meta(a1, a2, 1.0), &[v]).unwrap();
    }
    column.flush().unwrap();

    for (row, &(_, _, v)) in rows.iter().enumerate() {
      let decoded = column.get_array(row).unwrap();
      assert!((decoded[0].re - v.re).abs() < 0.05);
      assert!((decoded[0].im - v.im).abs() < 0.05);
    }
  }

  #[test]
  fn test_mock_column_storage_round_trip_and_sequential_write_guard() {
    let mut storage: mock::MockColumnStorage<f32> = mock::MockColumnStorage::new();
    storage.put_array(0, meta(0, 1, 0.0), &[1.0, 2.0]).unwrap();
    storage.put_array(1, meta(0, 2, 0.0), &[3.0, 4.0]).unwrap();
    assert_eq!(storage.get_array(0).unwrap(), vec![1.0, 2.0]);
    assert_eq!(storage.antenna2(1).unwrap(), 2);
    assert!(storage.put_array(5, meta(1, 2, 0.0), &[0.0, 0.0]).is_err());
  }

  #[test]
  fn test_regularity_violation_is_rejected() {
    let n_pol = 1;
    let n_chan = 1;
    let codec = DataCodec::new(&spec(), n_pol, n_chan).unwrap();
    let file = Cursor::new(Vec::new());
    let mut column: DyscoColumn<Vis, DataCodec, Cursor<Vec<u8>>> =
      DyscoColumn::create(codec, n_pol, n_chan, 3, 0, file, true);

    column.put_array(0, meta(0, 1, 0.0), &[Vis::new(1.0, 1.0)]).unwrap();
    column.put_array(1, meta(0, 2, 0.0), &[Vis::new(1.0, 1.0)]).unwrap();
    column.put_array(2, meta(0, 1, 1.0), &[Vis::new(1.0, 1.0)]).unwrap();
    let err = column.put_array(3, meta(0, 3, 1.0), &[Vis::new(1.0, 1.0)]);
    assert!(err.is_err());
  }
}
