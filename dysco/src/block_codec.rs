//! Block-frame layout (component E, on-disk half): one column's region
//! within a time-block's fixed-size frame is `metaDataFloatCount * 4` bytes
//! of little-endian `f32` metadata followed by the packed symbol bitstream.
//! Columns are concatenated in registration order to form the full block;
//! that concatenation itself is the job of [`crate::cache`] and
//! [`crate::stman`], not this module.

use crate::errors::{DyscoError, DyscoResult};
use crate::packer;

/// Bytes one column's frame occupies within a block: the metadata region
/// plus the packed symbol region.
pub fn column_frame_size(meta_float_count: usize, bit_width: u32, symbol_count: usize) -> usize {
  meta_float_count * 4 + packer::packed_len(bit_width, symbol_count)
}

/// Serialises one column's metadata and symbols into a single contiguous
/// frame, ready to be concatenated with its sibling columns' frames.
pub fn encode_column_frame(meta: &[f32], bit_width: u32, symbols: &[u32]) -> DyscoResult<Vec<u8>> {
  let mut frame = vec![0_u8; column_frame_size(meta.len(), bit_width, symbols.len())];
  let meta_bytes = meta.len() * 4;
  for (i, &value) in meta.iter().enumerate() {
    frame[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
  }
  packer::pack(bit_width, symbols, &mut frame[meta_bytes..])?;
  Ok(frame)
}

/// Inverse of [`encode_column_frame`]: reads exactly `meta_float_count`
/// metadata floats and `symbol_count` symbols from the front of `frame`.
/// Trailing bytes (belonging to the next column's frame) are ignored.
pub fn decode_column_frame(
  frame: &[u8],
  meta_float_count: usize,
  bit_width: u32,
  symbol_count: usize,
) -> DyscoResult<(Vec<f32>, Vec<u32>)> {
  let meta_bytes = meta_float_count * 4;
  if frame.len() < meta_bytes {
    return Err(DyscoError::format(format!(
      "column frame has {} bytes, needs at least {} for metadata",
      frame.len(),
      meta_bytes,
    )));
  }
  let mut meta = vec![0.0_f32; meta_float_count];
  for (i, slot) in meta.iter_mut().enumerate() {
    let bytes = [
      frame[i * 4],
      frame[i * 4 + 1],
      frame[i * 4 + 2],
      frame[i * 4 + 3],
    ];
    *slot = f32::from_le_bytes(bytes);
  }
  let mut symbols = vec![0_u32; symbol_count];
  packer::unpack(bit_width, &frame[meta_bytes..], &mut symbols, symbol_count)?;
  Ok((meta, symbols))
}

/// Sums per-column frame sizes into the block's total on-disk size, which
/// is fixed and stored in the file header (§4.E: `blockSize =
/// headerless_block_size`, computed once at `create`).
pub fn compute_block_size(column_frame_sizes: &[usize]) -> usize {
  column_frame_sizes.iter().sum()
}
