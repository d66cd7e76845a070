//! In-memory representation of one time-block (component C): a resizable
//! sequence of rows, each holding the baseline pair and the flat
//! `nPol * nChan` visibility array for that row.

use crate::errors::{DyscoError, DyscoResult};

/// One row of a time-block: a baseline pair plus its visibilities.
#[derive(Clone, Debug, PartialEq)]
pub struct DataRow<T> {
  pub antenna1: usize,
  pub antenna2: usize,
  pub visibilities: Vec<T>,
}

/// Holds every row of a single time-block. `n_pol` and `n_chan` are fixed for
/// the lifetime of the buffer; every row's `visibilities` has exactly
/// `n_pol * n_chan` elements.
#[derive(Clone, Debug)]
pub struct TimeBlockBuffer<T> {
  n_pol: usize,
  n_chan: usize,
  rows: Vec<DataRow<T>>,
}

impl<T: Clone + Default> TimeBlockBuffer<T> {
  pub fn new(n_pol: usize, n_chan: usize) -> Self {
    TimeBlockBuffer {
      n_pol,
      n_chan,
      rows: Vec::new(),
    }
  }

  pub fn n_pol(&self) -> usize {
    self.n_pol
  }

  pub fn n_chan(&self) -> usize {
    self.n_chan
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn n_rows(&self) -> usize {
    self.rows.len()
  }

  /// Drops every row, keeping the buffer's `(n_pol, n_chan)` shape.
  pub fn reset(&mut self) {
    self.rows.clear();
  }

  /// Grows the row vector with default rows if necessary, then returns the
  /// row index passed in, so callers can `set_row` directly afterwards.
  fn ensure_row(&mut self, row_index: usize) {
    if self.rows.len() <= row_index {
      self.rows.resize(
        row_index + 1,
        DataRow {
          antenna1: 0,
          antenna2: 0,
          visibilities: vec![T::default(); self.n_pol * self.n_chan],
        },
      );
    }
  }

  /// Writes `data` (exactly `n_pol * n_chan` elements) into `row_index`,
  /// growing the buffer if necessary.
  pub fn set_row(&mut self, row_index: usize, antenna1: usize, antenna2: usize, data: &[T]) -> DyscoResult<()> {
    let expected = self.n_pol * self.n_chan;
    if data.len() != expected {
      return Err(DyscoError::configuration(format!(
        "row has {} visibilities, expected {}",
        data.len(),
        expected,
      )));
    }
    self.ensure_row(row_index);
    let row = &mut self.rows[row_index];
    row.antenna1 = antenna1;
    row.antenna2 = antenna2;
    row.visibilities.clone_from_slice(data);
    Ok(())
  }

  /// Appends a new row at the end of the buffer.
  pub fn push_row(&mut self, antenna1: usize, antenna2: usize, data: &[T]) -> DyscoResult<()> {
    let idx = self.rows.len();
    self.set_row(idx, antenna1, antenna2, data)
  }

  /// Copies `row_index`'s visibilities into `destination`, which must be at
  /// least `n_pol * n_chan` elements long.
  pub fn copy_row_into(&self, row_index: usize, destination: &mut [T]) -> DyscoResult<()> {
    let row = self.row(row_index)?;
    if destination.len() < row.visibilities.len() {
      return Err(DyscoError::configuration(
        "destination is shorter than the row's visibility count",
      ));
    }
    destination[..row.visibilities.len()].clone_from_slice(&row.visibilities);
    Ok(())
  }

  pub fn row(&self, row_index: usize) -> DyscoResult<&DataRow<T>> {
    self
      .rows
      .get(row_index)
      .ok_or_else(|| DyscoError::configuration(format!("row index {} out of bounds", row_index)))
  }

  pub fn rows(&self) -> &[DataRow<T>] {
    &self.rows
  }

  /// The largest antenna index present in any row, or 0 for an empty buffer.
  pub fn max_antenna_index(&self) -> usize {
    self
      .rows
      .iter()
      .map(|r| r.antenna1.max(r.antenna2))
      .max()
      .unwrap_or(0)
  }
}

impl<T> std::ops::Index<usize> for TimeBlockBuffer<T> {
  type Output = DataRow<T>;

  fn index(&self, row_index: usize) -> &DataRow<T> {
    &self.rows[row_index]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_buffer_is_empty() {
    let buf: TimeBlockBuffer<f32> = TimeBlockBuffer::new(2, 4);
    assert!(buf.is_empty());
    assert_eq!(buf.n_rows(), 0);
    assert_eq!(buf.max_antenna_index(), 0);
  }

  #[test]
  fn test_push_and_index_row() {
    let mut buf: TimeBlockBuffer<f32> = TimeBlockBuffer::new(2, 2);
    buf.push_row(0, 1, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    buf.push_row(1, 2, &[5.0, 6.0, 7.0, 8.0]).unwrap();
    assert_eq!(buf.n_rows(), 2);
    assert_eq!(buf[0].antenna1, 0);
    assert_eq!(buf[0].antenna2, 1);
    assert_eq!(buf[1].visibilities, vec![5.0, 6.0, 7.0, 8.0]);
  }

  #[test]
  fn test_set_row_rejects_wrong_length() {
    let mut buf: TimeBlockBuffer<f32> = TimeBlockBuffer::new(2, 2);
    assert!(buf.set_row(0, 0, 1, &[1.0, 2.0]).is_err());
  }

  #[test]
  fn test_set_row_can_grow_buffer_out_of_order() {
    let mut buf: TimeBlockBuffer<f32> = TimeBlockBuffer::new(1, 1);
    buf.set_row(3, 0, 1, &[9.0]).unwrap();
    assert_eq!(buf.n_rows(), 4);
    assert_eq!(buf[3].visibilities, vec![9.0]);
    // rows 0..3 were default-filled
    assert_eq!(buf[0].visibilities, vec![0.0]);
  }

  #[test]
  fn test_reset_clears_rows_but_keeps_shape() {
    let mut buf: TimeBlockBuffer<f32> = TimeBlockBuffer::new(2, 3);
    buf.push_row(0, 0, &[0.0; 6]).unwrap();
    buf.reset();
    assert!(buf.is_empty());
    assert_eq!(buf.n_pol(), 2);
    assert_eq!(buf.n_chan(), 3);
  }

  #[test]
  fn test_max_antenna_index() {
    let mut buf: TimeBlockBuffer<f32> = TimeBlockBuffer::new(1, 1);
    buf.push_row(0, 3, &[1.0]).unwrap();
    buf.push_row(5, 2, &[1.0]).unwrap();
    assert_eq!(buf.max_antenna_index(), 5);
  }

  #[test]
  fn test_copy_row_into() {
    let mut buf: TimeBlockBuffer<f32> = TimeBlockBuffer::new(1, 3);
    buf.push_row(0, 1, &[1.0, 2.0, 3.0]).unwrap();
    let mut dest = [0.0_f32; 3];
    buf.copy_row_into(0, &mut dest).unwrap();
    assert_eq!(dest, [1.0, 2.0, 3.0]);
  }

  #[test]
  fn test_row_out_of_bounds_errors() {
    let buf: TimeBlockBuffer<f32> = TimeBlockBuffer::new(1, 1);
    assert!(buf.row(0).is_err());
  }

  #[test]
  fn test_autocorrelation_row_is_preserved() {
    let mut buf: TimeBlockBuffer<f32> = TimeBlockBuffer::new(1, 1);
    buf.push_row(2, 2, &[7.0]).unwrap();
    assert_eq!(buf[0].antenna1, buf[0].antenna2);
    assert_eq!(buf[0].visibilities, vec![7.0]);
  }
}
