//! Block encoders (component D): the three normalisation strategies that
//! turn one time-block's raw visibilities into quantiser symbols plus a
//! side-channel of per-block float metadata, and back.
//!
//! Each strategy is a small struct implementing [`BlockEncoder`]; dispatch
//! between them is a tagged enum ([`Normalization`]) rather than a trait
//! object, since the set of strategies is closed and known at compile time.

mod af;
mod rf;
mod row;
mod weight;

pub use af::AfEncoder;
pub use rf::RfEncoder;
pub use row::RowEncoder;
pub use weight::WeightEncoder;

use crate::errors::{DyscoError, DyscoResult};
use crate::quantizer::Quantizer;
use crate::time_block::TimeBlockBuffer;
use num_complex::Complex;
use rand::RngCore;

/// The visibility type stored in a time-block buffer: single-precision
/// complex, matching the on-disk/in-memory representation visibility
/// columns use.
pub type Vis = Complex<f32>;

/// Shared contract every block encoder satisfies (§4.D):
///
/// ```text
/// Encode(quantiser, buffer, out metadata[], out symbols[], nAntennae, rng) ->
/// InitializeDecode(metadata[], nRows, nAntennae) then
/// Decode(quantiser, out buffer_row, symbols[], blockRow, a1, a2)
/// ```
pub trait BlockEncoder {
  /// The exact number of metadata floats [`BlockEncoder::encode`] will emit
  /// for a block of this shape.
  fn meta_data_count(n_rows: usize, n_pol: usize, n_chan: usize, n_antennae: usize) -> usize
  where
    Self: Sized;

  /// Normalises `buffer` and quantises every visibility to two symbols
  /// (real, imaginary). When `dither_rng` is `Some`, dithered quantisation
  /// is used; otherwise each visibility maps to its nearest symbol.
  fn encode(
    &mut self,
    quantizer: &Quantizer,
    buffer: &TimeBlockBuffer<Vis>,
    n_antennae: usize,
    dither_rng: Option<&mut dyn RngCore>,
  ) -> (Vec<f32>, Vec<u32>);

  /// Primes the encoder's decode-side state (factor tables) from a block's
  /// metadata, ahead of any [`BlockEncoder::decode`] calls against it.
  fn initialize_decode(&mut self, metadata: &[f32], n_rows: usize, n_antennae: usize);

  /// Decodes one row's symbols back into `buffer`, applying the factors
  /// [`BlockEncoder::initialize_decode`] was primed with.
  fn decode(
    &self,
    quantizer: &Quantizer,
    buffer: &mut TimeBlockBuffer<Vis>,
    symbols: &[u32],
    block_row: usize,
    antenna1: usize,
    antenna2: usize,
  );
}

/// `2 * nRows * P * C`: every visibility becomes two symbols (real, imag).
pub fn symbol_count(n_rows: usize, n_pol: usize, n_chan: usize) -> usize {
  2 * n_rows * n_pol * n_chan
}

/// Which of the three block-encoder strategies a column uses. Stored in the
/// file header as a single byte (§4.F) and selects the metadata layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NormalizationKind {
  Af,
  Rf,
  Row,
}

impl NormalizationKind {
  pub fn as_on_disk_byte(self) -> u8 {
    match self {
      NormalizationKind::Row => 0,
      NormalizationKind::Af => 1,
      NormalizationKind::Rf => 2,
    }
  }

  pub fn from_on_disk_byte(byte: u8) -> DyscoResult<Self> {
    match byte {
      0 => Ok(NormalizationKind::Row),
      1 => Ok(NormalizationKind::Af),
      2 => Ok(NormalizationKind::Rf),
      other => Err(DyscoError::format(format!(
        "unknown normalization byte {}",
        other
      ))),
    }
  }

  pub fn parse(name: &str) -> DyscoResult<Self> {
    match name.to_ascii_lowercase().as_str() {
      "af" => Ok(NormalizationKind::Af),
      "rf" => Ok(NormalizationKind::Rf),
      "row" => Ok(NormalizationKind::Row),
      other => Err(DyscoError::configuration(format!(
        "unknown normalization '{}', expected af, rf or row",
        other
      ))),
    }
  }
}

/// A live block encoder of whichever kind a column was configured with.
/// Dispatches to the concrete strategy by matching on the variant, not
/// through dynamic dispatch, since the three variants are exhaustive and
/// fixed at compile time.
pub enum Normalization {
  Af(AfEncoder),
  Rf(RfEncoder),
  Row(RowEncoder),
}

impl Normalization {
  pub fn new(kind: NormalizationKind, n_pol: usize, n_chan: usize, fit_to_maximum: bool) -> Self {
    match kind {
      NormalizationKind::Af => Normalization::Af(AfEncoder::new(n_pol, n_chan, fit_to_maximum)),
      NormalizationKind::Rf => Normalization::Rf(RfEncoder::new(n_pol, n_chan)),
      NormalizationKind::Row => Normalization::Row(RowEncoder::new(n_pol, n_chan)),
    }
  }

  pub fn kind(&self) -> NormalizationKind {
    match self {
      Normalization::Af(_) => NormalizationKind::Af,
      Normalization::Rf(_) => NormalizationKind::Rf,
      Normalization::Row(_) => NormalizationKind::Row,
    }
  }

  pub fn meta_data_count(
    kind: NormalizationKind,
    n_rows: usize,
    n_pol: usize,
    n_chan: usize,
    n_antennae: usize,
  ) -> usize {
    match kind {
      NormalizationKind::Af => AfEncoder::meta_data_count(n_rows, n_pol, n_chan, n_antennae),
      NormalizationKind::Rf => RfEncoder::meta_data_count(n_rows, n_pol, n_chan, n_antennae),
      NormalizationKind::Row => RowEncoder::meta_data_count(n_rows, n_pol, n_chan, n_antennae),
    }
  }

  pub fn encode(
    &mut self,
    quantizer: &Quantizer,
    buffer: &TimeBlockBuffer<Vis>,
    n_antennae: usize,
    dither_rng: Option<&mut dyn RngCore>,
  ) -> (Vec<f32>, Vec<u32>) {
    match self {
      Normalization::Af(e) => e.encode(quantizer, buffer, n_antennae, dither_rng),
      Normalization::Rf(e) => e.encode(quantizer, buffer, n_antennae, dither_rng),
      Normalization::Row(e) => e.encode(quantizer, buffer, n_antennae, dither_rng),
    }
  }

  pub fn initialize_decode(&mut self, metadata: &[f32], n_rows: usize, n_antennae: usize) {
    match self {
      Normalization::Af(e) => e.initialize_decode(metadata, n_rows, n_antennae),
      Normalization::Rf(e) => e.initialize_decode(metadata, n_rows, n_antennae),
      Normalization::Row(e) => e.initialize_decode(metadata, n_rows, n_antennae),
    }
  }

  pub fn decode(
    &self,
    quantizer: &Quantizer,
    buffer: &mut TimeBlockBuffer<Vis>,
    symbols: &[u32],
    block_row: usize,
    antenna1: usize,
    antenna2: usize,
  ) {
    match self {
      Normalization::Af(e) => e.decode(quantizer, buffer, symbols, block_row, antenna1, antenna2),
      Normalization::Rf(e) => e.decode(quantizer, buffer, symbols, block_row, antenna1, antenna2),
      Normalization::Row(e) => {
        e.decode(quantizer, buffer, symbols, block_row, antenna1, antenna2)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_on_disk_byte_round_trip() {
    for kind in [
      NormalizationKind::Af,
      NormalizationKind::Rf,
      NormalizationKind::Row,
    ] {
      let byte = kind.as_on_disk_byte();
      assert_eq!(NormalizationKind::from_on_disk_byte(byte).unwrap(), kind);
    }
  }

  #[test]
  fn test_parse_is_case_insensitive() {
    assert_eq!(NormalizationKind::parse("RF").unwrap(), NormalizationKind::Rf);
    assert_eq!(NormalizationKind::parse("row").unwrap(), NormalizationKind::Row);
  }

  #[test]
  fn test_parse_rejects_unknown_name() {
    assert!(NormalizationKind::parse("banana").is_err());
  }

  #[test]
  fn test_unknown_on_disk_byte_rejected() {
    assert!(NormalizationKind::from_on_disk_byte(99).is_err());
  }
}
