//! On-disk file header (component F): magic, format version, per-column
//! layout, and the construction parameters needed to rebuild the quantiser
//! and block encoders on reopen.

use crate::constants::{MAGIC_HEADER, VERSION_MAJOR, VERSION_MINOR};
use crate::distribution::DistributionKind;
use crate::errors::{DyscoError, DyscoResult};
use crate::normalize::NormalizationKind;
use std::io::{Read, Write};

/// Per-column sub-header: for data/weight columns, just the computed block
/// size and antenna count the block layout was sized for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnHeader {
  pub block_size: u32,
  pub antenna_count: u32,
}

impl ColumnHeader {
  const ENCODED_SIZE: u32 = 8;

  fn write<W: Write>(&self, w: &mut W) -> DyscoResult<()> {
    w.write_all(&Self::ENCODED_SIZE.to_le_bytes())?;
    w.write_all(&self.block_size.to_le_bytes())?;
    w.write_all(&self.antenna_count.to_le_bytes())?;
    Ok(())
  }

  fn read<R: Read>(r: &mut R) -> DyscoResult<Self> {
    let column_header_size = read_u32(r)?;
    if column_header_size != Self::ENCODED_SIZE {
      return Err(DyscoError::format(format!(
        "column header size {} does not match the {} this reader expects",
        column_header_size,
        Self::ENCODED_SIZE,
      )));
    }
    Ok(ColumnHeader {
      block_size: read_u32(r)?,
      antenna_count: read_u32(r)?,
    })
  }
}

/// The full file header: format identification plus everything needed to
/// reconstruct the quantiser, the normalisation strategy, and every
/// column's block layout.
#[derive(Clone, Debug, PartialEq)]
pub struct FileHeader {
  pub header_size: u32,
  pub column_header_offset: u32,
  pub rows_per_block: u32,
  pub antenna_count: u32,
  pub block_size: u32,
  pub data_bit_count: u8,
  pub weight_bit_count: u8,
  pub fit_to_maximum: bool,
  pub distribution: DistributionKind,
  pub normalization: NormalizationKind,
  pub student_t_nu: f64,
  pub distribution_truncation: f64,
  pub columns: Vec<ColumnHeader>,
}

impl FileHeader {
  pub fn write<W: Write>(&self, w: &mut W) -> DyscoResult<()> {
    w.write_all(&MAGIC_HEADER)?;
    w.write_all(&self.header_size.to_le_bytes())?;
    w.write_all(&self.column_header_offset.to_le_bytes())?;
    w.write_all(&(self.columns.len() as u32).to_le_bytes())?;
    w.write_all(&self.rows_per_block.to_le_bytes())?;
    w.write_all(&self.antenna_count.to_le_bytes())?;
    w.write_all(&self.block_size.to_le_bytes())?;
    w.write_all(&VERSION_MAJOR.to_le_bytes())?;
    w.write_all(&VERSION_MINOR.to_le_bytes())?;
    w.write_all(&[self.data_bit_count])?;
    w.write_all(&[self.weight_bit_count])?;
    w.write_all(&[self.fit_to_maximum as u8])?;
    w.write_all(&[self.distribution.as_on_disk_byte()])?;
    w.write_all(&[self.normalization.as_on_disk_byte()])?;
    w.write_all(&self.student_t_nu.to_le_bytes())?;
    w.write_all(&self.distribution_truncation.to_le_bytes())?;
    for column in &self.columns {
      column.write(w)?;
    }
    Ok(())
  }

  pub fn read<R: Read>(r: &mut R) -> DyscoResult<Self> {
    let mut magic = [0_u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC_HEADER {
      return Err(DyscoError::format("bad magic header"));
    }
    let header_size = read_u32(r)?;
    let column_header_offset = read_u32(r)?;
    let column_count = read_u32(r)?;
    let rows_per_block = read_u32(r)?;
    let antenna_count = read_u32(r)?;
    let block_size = read_u32(r)?;
    let version_major = read_u16(r)?;
    let _version_minor = read_u16(r)?;
    if version_major > VERSION_MAJOR {
      return Err(DyscoError::format(format!(
        "file format version {} is newer than this reader's {}",
        version_major, VERSION_MAJOR,
      )));
    }
    let mut one_byte = [0_u8; 1];
    r.read_exact(&mut one_byte)?;
    let data_bit_count = one_byte[0];
    r.read_exact(&mut one_byte)?;
    let weight_bit_count = one_byte[0];
    r.read_exact(&mut one_byte)?;
    let fit_to_maximum = one_byte[0] != 0;
    r.read_exact(&mut one_byte)?;
    let distribution = DistributionKind::from_on_disk_byte(one_byte[0])?;
    r.read_exact(&mut one_byte)?;
    let normalization = NormalizationKind::from_on_disk_byte(one_byte[0])?;
    let student_t_nu = read_f64(r)?;
    let distribution_truncation = read_f64(r)?;

    let mut columns = Vec::with_capacity(column_count as usize);
    for _ in 0..column_count {
      columns.push(ColumnHeader::read(r)?);
    }

    Ok(FileHeader {
      header_size,
      column_header_offset,
      rows_per_block,
      antenna_count,
      block_size,
      data_bit_count,
      weight_bit_count,
      fit_to_maximum,
      distribution,
      normalization,
      student_t_nu,
      distribution_truncation,
      columns,
    })
  }
}

fn read_u16<R: Read>(r: &mut R) -> DyscoResult<u16> {
  let mut buf = [0_u8; 2];
  r.read_exact(&mut buf)?;
  Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R) -> DyscoResult<u32> {
  let mut buf = [0_u8; 4];
  r.read_exact(&mut buf)?;
  Ok(u32::from_le_bytes(buf))
}

fn read_f64<R: Read>(r: &mut R) -> DyscoResult<f64> {
  let mut buf = [0_u8; 8];
  r.read_exact(&mut buf)?;
  Ok(f64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  fn sample_header() -> FileHeader {
    FileHeader {
      header_size: 64,
      column_header_offset: 32,
      rows_per_block: 10,
      antenna_count: 4,
      block_size: 1024,
      data_bit_count: 8,
      weight_bit_count: 12,
      fit_to_maximum: true,
      distribution: DistributionKind::TruncatedGaussian,
      normalization: NormalizationKind::Af,
      student_t_nu: 3.0,
      distribution_truncation: 2.5,
      columns: vec![ColumnHeader {
        block_size: 1024,
        antenna_count: 4,
      }],
    }
  }

  #[test]
  fn test_write_read_round_trip() {
    let header = sample_header();
    let mut bytes = Vec::new();
    header.write(&mut bytes).unwrap();
    let read_back = FileHeader::read(&mut Cursor::new(bytes)).unwrap();
    assert_eq!(read_back, header);
  }

  #[test]
  fn test_bad_magic_is_rejected() {
    let mut bytes = Vec::new();
    sample_header().write(&mut bytes).unwrap();
    bytes[0] = b'X';
    assert!(FileHeader::read(&mut Cursor::new(bytes)).is_err());
  }

  #[test]
  fn test_newer_major_version_is_rejected() {
    let mut bytes = Vec::new();
    sample_header().write(&mut bytes).unwrap();
    // version_major sits right after magic(4) + 3 u32s(12) = byte offset 16
    let offset = 4 + 4 * 3;
    bytes[offset..offset + 2].copy_from_slice(&(VERSION_MAJOR + 1).to_le_bytes());
    assert!(FileHeader::read(&mut Cursor::new(bytes)).is_err());
  }

  #[test]
  fn test_short_read_surfaces_io_error() {
    let mut bytes = Vec::new();
    sample_header().write(&mut bytes).unwrap();
    bytes.truncate(bytes.len() - 1);
    assert!(FileHeader::read(&mut Cursor::new(bytes)).is_err());
  }
}
