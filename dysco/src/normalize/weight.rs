//! Weight encoder (§4.D.4): weight columns hold one non-negative real value
//! per `(row, channel, polarisation)` rather than complex visibilities, and
//! are quantised directly onto a uniform integer range, not through a
//! dictionary [`crate::quantizer::Quantizer`].

use crate::errors::{DyscoError, DyscoResult};

pub struct WeightEncoder {
  n_pol: usize,
  n_chan: usize,
  scales: Vec<f64>,
}

impl WeightEncoder {
  pub fn new(n_pol: usize, n_chan: usize) -> Self {
    WeightEncoder {
      n_pol,
      n_chan,
      scales: Vec::new(),
    }
  }

  pub fn meta_data_count(n_rows: usize, n_chan: usize) -> usize {
    n_rows * n_chan
  }

  pub fn symbol_count(n_rows: usize, n_pol: usize, n_chan: usize) -> usize {
    n_rows * n_pol * n_chan
  }

  fn max_symbol(bit_count: u32) -> u32 {
    ((1_u64 << bit_count) - 1) as u32
  }

  /// `weights` is row-major `(row, channel, polarisation)`, `n_rows * n_chan
  /// * n_pol` elements.
  pub fn encode(&mut self, bit_count: u32, weights: &[f32], n_rows: usize) -> DyscoResult<(Vec<f32>, Vec<u32>)> {
    let expected = n_rows * self.n_chan * self.n_pol;
    if weights.len() != expected {
      return Err(DyscoError::configuration(format!(
        "weight block has {} values, expected {}",
        weights.len(),
        expected,
      )));
    }
    let max_symbol = Self::max_symbol(bit_count) as f64;
    let mut meta = vec![0.0_f32; Self::meta_data_count(n_rows, self.n_chan)];
    let mut symbols = vec![0_u32; Self::symbol_count(n_rows, self.n_pol, self.n_chan)];

    for row in 0..n_rows {
      for chan in 0..self.n_chan {
        let base = (row * self.n_chan + chan) * self.n_pol;
        let slice = &weights[base..base + self.n_pol];
        let m = slice.iter().fold(0.0_f32, |acc, &w| if w.is_finite() { acc.max(w) } else { acc }) as f64;
        let s = if m == 0.0 { 1.0 } else { m / max_symbol };
        meta[row * self.n_chan + chan] = s as f32;
        for (p, &w) in slice.iter().enumerate() {
          let symbol = if w.is_finite() {
            ((w as f64 / s).round().clamp(0.0, max_symbol)) as u32
          } else {
            max_symbol as u32
          };
          symbols[base + p] = symbol;
        }
      }
    }
    Ok((meta, symbols))
  }

  pub fn initialize_decode(&mut self, metadata: &[f32], n_rows: usize) {
    self.scales = metadata[..n_rows * self.n_chan].iter().map(|&f| f as f64).collect();
  }

  /// Decodes one row's `n_chan * n_pol` weights.
  pub fn decode(&self, symbols: &[u32], block_row: usize) -> Vec<f32> {
    let vis_per_row = self.n_chan * self.n_pol;
    let base = block_row * vis_per_row;
    let mut out = vec![0.0_f32; vis_per_row];
    for chan in 0..self.n_chan {
      let s = self.scales[block_row * self.n_chan + chan];
      for p in 0..self.n_pol {
        let i = chan * self.n_pol + p;
        out[i] = (symbols[base + i] as f64 * s) as f32;
      }
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_meta_data_count_and_symbol_count() {
    assert_eq!(WeightEncoder::meta_data_count(10, 4), 40);
    assert_eq!(WeightEncoder::symbol_count(10, 2, 4), 80);
  }

  #[test]
  fn test_round_trip() {
    let n_pol = 2;
    let n_chan = 3;
    let n_rows = 2;
    let weights: Vec<f32> = vec![
      1.0, 2.0, 0.5, 1.5, 3.0, 0.0, // row 0
      0.1, 0.2, 0.3, 0.4, 0.5, 0.6, // row 1
    ];
    let mut encoder = WeightEncoder::new(n_pol, n_chan);
    let (meta, symbols) = encoder.encode(8, &weights, n_rows).unwrap();

    let mut decoder = WeightEncoder::new(n_pol, n_chan);
    decoder.initialize_decode(&meta, n_rows);
    let row0 = decoder.decode(&symbols, 0);
    let row1 = decoder.decode(&symbols, 1);

    for (o, d) in weights[..6].iter().zip(&row0) {
      assert!((o - d).abs() < 0.05, "{} vs {}", o, d);
    }
    for (o, d) in weights[6..].iter().zip(&row1) {
      assert!((o - d).abs() < 0.01, "{} vs {}", o, d);
    }
  }

  #[test]
  fn test_zero_weight_block_does_not_divide_by_zero() {
    let mut encoder = WeightEncoder::new(1, 1);
    let (meta, symbols) = encoder.encode(4, &[0.0], 1).unwrap();
    assert_eq!(meta, vec![1.0]);
    assert_eq!(symbols, vec![0]);
  }

  #[test]
  fn test_wrong_length_rejected() {
    let mut encoder = WeightEncoder::new(2, 2);
    assert!(encoder.encode(8, &[0.0; 3], 1).is_err());
  }
}
