//! Row normaliser (§4.D.3): the simplest strategy — one scale factor per
//! row per polarisation, with no further refinement pass.

use super::{symbol_count, BlockEncoder, Vis};
use crate::quantizer::Quantizer;
use crate::time_block::TimeBlockBuffer;
use num_complex::Complex;
use rand::RngCore;

pub struct RowEncoder {
  n_pol: usize,
  n_chan: usize,
  row_factors: Vec<f64>,
}

impl RowEncoder {
  pub fn new(n_pol: usize, n_chan: usize) -> Self {
    RowEncoder {
      n_pol,
      n_chan,
      row_factors: Vec::new(),
    }
  }

  fn vis_per_row(&self) -> usize {
    self.n_pol * self.n_chan
  }
}

impl BlockEncoder for RowEncoder {
  fn meta_data_count(n_rows: usize, n_pol: usize, _n_chan: usize, _n_antennae: usize) -> usize {
    n_rows * n_pol
  }

  fn encode(
    &mut self,
    quantizer: &Quantizer,
    buffer: &TimeBlockBuffer<Vis>,
    _n_antennae: usize,
    mut dither_rng: Option<&mut dyn RngCore>,
  ) -> (Vec<f32>, Vec<u32>) {
    let n_rows = buffer.n_rows();
    let vis_per_row = self.vis_per_row();
    let max_level = quantizer.max_quantity();
    let mut meta = vec![0.0_f32; Self::meta_data_count(n_rows, self.n_pol, self.n_chan, 0)];
    let mut symbols = vec![0_u32; symbol_count(n_rows, self.n_pol, self.n_chan)];
    let dither = Quantizer::dither_distribution();

    for (row_index, row) in buffer.rows().iter().enumerate() {
      let mut max_val_per_pol = vec![0.0_f64; self.n_pol];
      for (i, v) in row.visibilities.iter().enumerate() {
        let m = (v.re as f64).abs().max((v.im as f64).abs());
        if m.is_finite() {
          let p = i % self.n_pol;
          max_val_per_pol[p] = max_val_per_pol[p].max(m);
        }
      }
      for (p, &max_val) in max_val_per_pol.iter().enumerate() {
        meta[row_index * self.n_pol + p] = if max_level == 0.0 {
          1.0
        } else {
          (max_val / max_level) as f32
        };
      }

      let base = row_index * vis_per_row * 2;
      for (i, v) in row.visibilities.iter().enumerate() {
        let p = i % self.n_pol;
        let factor = if max_val_per_pol[p] == 0.0 {
          1.0
        } else {
          max_level / max_val_per_pol[p]
        };
        let re = v.re as f64 * factor;
        let im = v.im as f64 * factor;
        let slot = base + i * 2;
        match dither_rng.as_deref_mut() {
          Some(rng) => {
            symbols[slot] = quantizer.encode_with_dithering(re, rand::Rng::sample(rng, dither));
            symbols[slot + 1] = quantizer.encode_with_dithering(im, rand::Rng::sample(rng, dither));
          }
          None => {
            symbols[slot] = quantizer.encode(re);
            symbols[slot + 1] = quantizer.encode(im);
          }
        }
      }
    }
    (meta, symbols)
  }

  fn initialize_decode(&mut self, metadata: &[f32], n_rows: usize, _n_antennae: usize) {
    self.row_factors = metadata[..n_rows * self.n_pol].iter().map(|&f| f as f64).collect();
  }

  fn decode(
    &self,
    quantizer: &Quantizer,
    buffer: &mut TimeBlockBuffer<Vis>,
    symbols: &[u32],
    block_row: usize,
    antenna1: usize,
    antenna2: usize,
  ) {
    let vis_per_row = self.vis_per_row();
    let mut visibilities = vec![Vis::new(0.0, 0.0); vis_per_row];
    let src = &symbols[block_row * vis_per_row * 2..];
    for i in 0..vis_per_row {
      let factor = self.row_factors[block_row * self.n_pol + i % self.n_pol];
      let re = quantizer.decode(src[i * 2]) * factor;
      let im = quantizer.decode(src[i * 2 + 1]) * factor;
      visibilities[i] = Complex::new(re as f32, im as f32);
    }
    buffer
      .set_row(block_row, antenna1, antenna2, &visibilities)
      .expect("decode target row shape must match encoder shape");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::distribution::DistributionKind;

  #[test]
  fn test_meta_data_count() {
    assert_eq!(RowEncoder::meta_data_count(5, 2, 99, 0), 10);
  }

  #[test]
  fn test_round_trip() {
    let quantizer = Quantizer::new(DistributionKind::Gaussian, 1 << 12, 1.0).unwrap();
    let n_pol = 2;
    let n_chan = 2;
    let mut buffer: TimeBlockBuffer<Vis> = TimeBlockBuffer::new(n_pol, n_chan);
    buffer
      .push_row(0, 1, &[Vis::new(3.0, -2.0), Vis::new(0.5, 0.5), Vis::new(-1.0, 1.0), Vis::new(0.2, -0.2)])
      .unwrap();
    buffer
      .push_row(0, 2, &[Vis::new(0.1, 0.1), Vis::new(-0.2, 0.3), Vis::new(0.4, -0.1), Vis::new(0.0, 0.0)])
      .unwrap();

    let mut encoder = RowEncoder::new(n_pol, n_chan);
    let (meta, symbols) = encoder.encode(&quantizer, &buffer, 3, None);

    let mut decoder = RowEncoder::new(n_pol, n_chan);
    decoder.initialize_decode(&meta, buffer.n_rows(), 3);
    let mut out: TimeBlockBuffer<Vis> = TimeBlockBuffer::new(n_pol, n_chan);
    decoder.decode(&quantizer, &mut out, &symbols, 0, 0, 1);
    decoder.decode(&quantizer, &mut out, &symbols, 1, 0, 2);

    for (row_index, row) in buffer.rows().iter().enumerate() {
      let decoded = &out[row_index].visibilities;
      for (o, d) in row.visibilities.iter().zip(decoded) {
        assert!((o.re - d.re).abs() < 0.05);
        assert!((o.im - d.im).abs() < 0.05);
      }
    }
  }
}
