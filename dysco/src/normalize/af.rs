//! AF (Antenna/Frequency) normaliser (§4.D.2): a per-antenna-per-channel
//! gain is solved by a fixed-point iteration over the per-baseline RMS
//! matrix, and the per-baseline factor used for normalisation is the
//! product of the two antennas' gains. An optional final pass rescales the
//! whole block so its largest component exactly reaches the quantiser's
//! maximum representable quantity.

use super::{symbol_count, BlockEncoder, Vis};
use crate::quantizer::Quantizer;
use crate::time_block::TimeBlockBuffer;
use num_complex::Complex;
use rand::RngCore;

/// Iterations of the antenna-gain fixed point; the matrix is small (tens of
/// antennas) so this always converges well before the cap.
const GAIN_ITERATIONS: usize = 20;

pub struct AfEncoder {
  n_pol: usize,
  n_chan: usize,
  fit_to_maximum: bool,
  n_antennae: usize,
  antenna_factors: Vec<f64>,
  global_scale: f64,
}

impl AfEncoder {
  pub fn new(n_pol: usize, n_chan: usize, fit_to_maximum: bool) -> Self {
    AfEncoder {
      n_pol,
      n_chan,
      fit_to_maximum,
      n_antennae: 0,
      antenna_factors: Vec::new(),
      global_scale: 1.0,
    }
  }

  fn vis_per_row(&self) -> usize {
    self.n_pol * self.n_chan
  }

  fn factor_index(&self, antenna: usize, channel: usize, pol: usize) -> usize {
    antenna * self.n_chan * self.n_pol + channel * self.n_pol + pol
  }

  /// Fixed-point solve of per-antenna gains `g` from a baseline RMS matrix,
  /// assuming `rms[a, b] ≈ g[a] * g[b]`: `g[a]^2 = Σ_b rms[a,b]² / Σ_b g[b]²`.
  fn solve_antenna_gains(&self, rms: &[f64], n_antennae: usize) -> Vec<f64> {
    if n_antennae == 0 {
      return Vec::new();
    }
    let mut g = vec![1.0_f64; n_antennae];
    for _ in 0..GAIN_ITERATIONS {
      let denom: f64 = g.iter().map(|x| x * x).sum();
      if denom == 0.0 {
        break;
      }
      let mut next = vec![0.0_f64; n_antennae];
      for a in 0..n_antennae {
        let mut numerator = 0.0;
        for b in 0..n_antennae {
          if a == b {
            continue;
          }
          let r = rms[a * n_antennae + b];
          numerator += r * r;
        }
        next[a] = (numerator / denom).sqrt();
      }
      g = next;
    }
    for gain in g.iter_mut() {
      if *gain == 0.0 || !gain.is_finite() {
        *gain = 1.0;
      }
    }
    g
  }

  /// Solves the per-antenna gains for every `(channel, pol)` slot from the
  /// baselines present in `data`, writing them into `self.antenna_factors`.
  fn solve_all_gains(&mut self, data: &[Vec<Complex<f64>>], rows_meta: &[(usize, usize)], n_antennae: usize) {
    self.n_antennae = n_antennae;
    self.antenna_factors = vec![1.0_f64; n_antennae * self.n_chan * self.n_pol];
    if n_antennae == 0 {
      return;
    }

    for channel in 0..self.n_chan {
      for pol in 0..self.n_pol {
        let slot = channel * self.n_pol + pol;
        let mut sum_sq = vec![0.0_f64; n_antennae * n_antennae];
        let mut count = vec![0_u32; n_antennae * n_antennae];
        for (row, &(a1, a2)) in data.iter().zip(rows_meta) {
          if a1 == a2 || a1 >= n_antennae || a2 >= n_antennae {
            continue;
          }
          let v = row[slot];
          if v.re.is_finite() && v.im.is_finite() {
            let sq = v.re * v.re + v.im * v.im;
            sum_sq[a1 * n_antennae + a2] += sq;
            sum_sq[a2 * n_antennae + a1] += sq;
            count[a1 * n_antennae + a2] += 1;
            count[a2 * n_antennae + a1] += 1;
          }
        }
        let rms: Vec<f64> = sum_sq
          .iter()
          .zip(&count)
          .map(|(&s, &c)| if c == 0 { 0.0 } else { (s / c as f64).sqrt() })
          .collect();
        let gains = self.solve_antenna_gains(&rms, n_antennae);
        for (antenna, gain) in gains.into_iter().enumerate() {
          self.antenna_factors[self.factor_index(antenna, channel, pol)] = gain;
        }
      }
    }
  }
}

impl BlockEncoder for AfEncoder {
  fn meta_data_count(_n_rows: usize, n_pol: usize, n_chan: usize, n_antennae: usize) -> usize {
    n_antennae * n_chan * n_pol + 1
  }

  fn encode(
    &mut self,
    quantizer: &Quantizer,
    buffer: &TimeBlockBuffer<Vis>,
    n_antennae: usize,
    mut dither_rng: Option<&mut dyn RngCore>,
  ) -> (Vec<f32>, Vec<u32>) {
    let n_rows = buffer.n_rows();
    let vis_per_row = self.vis_per_row();
    let mut data: Vec<Vec<Complex<f64>>> = Vec::with_capacity(n_rows);
    let mut rows_meta: Vec<(usize, usize)> = Vec::with_capacity(n_rows);
    for row in buffer.rows() {
      data.push(
        row
          .visibilities
          .iter()
          .map(|v| Complex::new(v.re as f64, v.im as f64))
          .collect(),
      );
      rows_meta.push((row.antenna1, row.antenna2));
    }

    self.solve_all_gains(&data, &rows_meta, n_antennae);

    for (row, &(a1, a2)) in data.iter_mut().zip(&rows_meta) {
      for channel in 0..self.n_chan {
        for pol in 0..self.n_pol {
          let slot = channel * self.n_pol + pol;
          let f1 = self.antenna_factors[self.factor_index(a1, channel, pol)];
          let f2 = self.antenna_factors[self.factor_index(a2, channel, pol)];
          let divisor = f1 * f2;
          if divisor != 0.0 {
            row[slot] /= divisor;
          }
        }
      }
    }

    let max_quantity = quantizer.max_quantity();
    let largest_component = data
      .iter()
      .flat_map(|row| row.iter())
      .map(|v| v.re.abs().max(v.im.abs()))
      .filter(|m| m.is_finite())
      .fold(0.0_f64, f64::max);
    self.global_scale = if self.fit_to_maximum && largest_component != 0.0 && max_quantity != 0.0 {
      largest_component / max_quantity
    } else {
      1.0
    };
    if self.global_scale != 1.0 {
      for row in data.iter_mut() {
        for v in row.iter_mut() {
          *v /= self.global_scale;
        }
      }
    }

    let mut meta = vec![0.0_f32; Self::meta_data_count(n_rows, self.n_pol, self.n_chan, n_antennae)];
    for (i, &f) in self.antenna_factors.iter().enumerate() {
      meta[i] = f as f32;
    }
    meta[self.antenna_factors.len()] = self.global_scale as f32;

    let mut symbols = vec![0_u32; symbol_count(n_rows, self.n_pol, self.n_chan)];
    let dither = Quantizer::dither_distribution();
    for (row_index, row) in data.iter().enumerate() {
      for (i, v) in row.iter().enumerate() {
        let base = row_index * vis_per_row * 2 + i * 2;
        match dither_rng.as_deref_mut() {
          Some(rng) => {
            symbols[base] = quantizer.encode_with_dithering(v.re, rand::Rng::sample(rng, dither));
            symbols[base + 1] = quantizer.encode_with_dithering(v.im, rand::Rng::sample(rng, dither));
          }
          None => {
            symbols[base] = quantizer.encode(v.re);
            symbols[base + 1] = quantizer.encode(v.im);
          }
        }
      }
    }
    (meta, symbols)
  }

  fn initialize_decode(&mut self, metadata: &[f32], _n_rows: usize, n_antennae: usize) {
    self.n_antennae = n_antennae;
    let factor_count = n_antennae * self.n_chan * self.n_pol;
    self.antenna_factors = metadata[..factor_count].iter().map(|&f| f as f64).collect();
    self.global_scale = metadata[factor_count] as f64;
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
    for channel in 0..self.n_chan {
      for pol in 0..self.n_pol {
        let i = channel * self.n_pol + pol;
        let f1 = self.antenna_factors[self.factor_index(antenna1, channel, pol)];
        let f2 = self.antenna_factors[self.factor_index(antenna2, channel, pol)];
        let factor = f1 * f2 * self.global_scale;
        let re = quantizer.decode(src[i * 2]) * factor;
        let im = quantizer.decode(src[i * 2 + 1]) * factor;
        visibilities[i] = Complex::new(re as f32, im as f32);
      }
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
    assert_eq!(AfEncoder::meta_data_count(5, 2, 4, 3), 3 * 4 * 2 + 1);
  }

  #[test]
  fn test_round_trip_without_fit_to_maximum() {
    let quantizer = Quantizer::new(DistributionKind::Gaussian, 1 << 12, 1.0).unwrap();
    let n_pol = 1;
    let n_chan = 1;
    let n_antennae = 3;
    let mut buffer: TimeBlockBuffer<Vis> = TimeBlockBuffer::new(n_pol, n_chan);
    buffer.push_row(0, 1, &[Vis::new(2.0, 1.0)]).unwrap();
    buffer.push_row(0, 2, &[Vis::new(1.0, -0.5)]).unwrap();
    buffer.push_row(1, 2, &[Vis::new(0.5, 0.5)]).unwrap();

    let mut encoder = AfEncoder::new(n_pol, n_chan, false);
    let (meta, symbols) = encoder.encode(&quantizer, &buffer, n_antennae, None);

    let mut decoder = AfEncoder::new(n_pol, n_chan, false);
    decoder.initialize_decode(&meta, buffer.n_rows(), n_antennae);
    let mut out: TimeBlockBuffer<Vis> = TimeBlockBuffer::new(n_pol, n_chan);
    let pairs = [(0, 1), (0, 2), (1, 2)];
    for (row_index, &(a1, a2)) in pairs.iter().enumerate() {
      decoder.decode(&quantizer, &mut out, &symbols, row_index, a1, a2);
    }

    for (row_index, row) in buffer.rows().iter().enumerate() {
      let decoded = &out[row_index].visibilities;
      for (o, d) in row.visibilities.iter().zip(decoded) {
        assert!((o.re - d.re).abs() < 0.3, "re {} vs {}", o.re, d.re);
        assert!((o.im - d.im).abs() < 0.3, "im {} vs {}", o.im, d.im);
      }
    }
  }

  #[test]
  fn test_fit_to_maximum_scales_block_to_max_quantity() {
    let quantizer = Quantizer::new(DistributionKind::Uniform, 1 << 14, 5.0).unwrap();
    let n_pol = 1;
    let n_chan = 1;
    let mut buffer: TimeBlockBuffer<Vis> = TimeBlockBuffer::new(n_pol, n_chan);
    buffer.push_row(0, 1, &[Vis::new(100.0, 0.0)]).unwrap();
    buffer.push_row(0, 2, &[Vis::new(10.0, 0.0)]).unwrap();

    let mut encoder = AfEncoder::new(n_pol, n_chan, true);
    let (_, _) = encoder.encode(&quantizer, &buffer, 3, None);
    assert!(encoder.global_scale > 1.0);
  }
}
