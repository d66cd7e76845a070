//! RF (Row/Frequency) normaliser (§4.D.1): a per-channel RMS factor followed
//! by a per-row-per-polarisation max-scaling factor, with an iterative
//! refinement pass that nudges both factor sets towards using the full
//! quantiser range without clipping.

use super::{symbol_count, BlockEncoder, Vis};
use crate::quantizer::Quantizer;
use crate::time_block::TimeBlockBuffer;
use num_complex::Complex;
use rand::RngCore;

/// Terminate [`RfEncoder::fit_to_maximum`]'s refinement loop once neither a
/// channel nor a row factor can be improved by more than this.
const CHANNEL_FACTOR_EPSILON: f64 = 1.001;
const ROW_FACTOR_EPSILON: f64 = 1.01;

pub struct RfEncoder {
  n_pol: usize,
  n_chan: usize,
  channel_factors: Vec<f64>,
  row_factors: Vec<f64>,
}

impl RfEncoder {
  pub fn new(n_pol: usize, n_chan: usize) -> Self {
    RfEncoder {
      n_pol,
      n_chan,
      channel_factors: Vec::new(),
      row_factors: Vec::new(),
    }
  }

  fn vis_per_row(&self) -> usize {
    self.n_pol * self.n_chan
  }

  /// The channel-scaling step: each of the `P*C` visibility slots is
  /// divided by the RMS (over non-autocorrelation, finite rows) at that
  /// slot, and that RMS recorded in `channel_factors`/`meta`.
  fn normalize_channels(&self, data: &mut [Vec<Complex<f64>>], rows_meta: &[(usize, usize)], meta: &mut [f32]) {
    let vis_per_row = self.vis_per_row();
    let mut sum_sq = vec![0.0_f64; vis_per_row];
    let mut count = vec![0_u64; vis_per_row];
    for (row, &(a1, a2)) in data.iter().zip(rows_meta) {
      if a1 == a2 {
        continue;
      }
      for (i, v) in row.iter().enumerate() {
        if v.re.is_finite() && v.im.is_finite() {
          sum_sq[i] += v.re * v.re + v.im * v.im;
          count[i] += 1;
        }
      }
    }
    for i in 0..vis_per_row {
      let rms = if count[i] == 0 {
        0.0
      } else {
        (sum_sq[i] / count[i] as f64).sqrt()
      };
      meta[i] = rms as f32;
      if rms != 0.0 {
        for row in data.iter_mut() {
          row[i] /= rms;
        }
      }
    }
  }

  /// The row-scaling step: every row's per-polarisation maximum component
  /// (over all channels) is scaled to `max_level`.
  fn normalize_rows(&self, data: &mut [Vec<Complex<f64>>], meta: &mut [f32], max_level: f64) {
    let vis_per_row = self.vis_per_row();
    let base = vis_per_row;
    for (row_index, row) in data.iter_mut().enumerate() {
      let mut max_val_per_pol = vec![0.0_f64; self.n_pol];
      for (i, v) in row.iter().enumerate() {
        let m = v.re.abs().max(v.im.abs());
        if m.is_finite() {
          let p = i % self.n_pol;
          max_val_per_pol[p] = max_val_per_pol[p].max(m);
        }
      }
      for (i, v) in row.iter_mut().enumerate() {
        let p = i % self.n_pol;
        let factor = if max_val_per_pol[p] == 0.0 {
          1.0
        } else {
          max_level / max_val_per_pol[p]
        };
        *v *= factor;
      }
      for (p, &max_val) in max_val_per_pol.iter().enumerate() {
        meta[base + row_index * self.n_pol + p] = if max_level == 0.0 {
          1.0
        } else {
          (max_val / max_level) as f32
        };
      }
    }
  }

  fn change_channel_factor(&self, data: &mut [Vec<Complex<f64>>], meta: &mut [f32], vis_index: usize, factor: f64) {
    meta[vis_index] = (meta[vis_index] as f64 / factor) as f32;
    for row in data.iter_mut() {
      row[vis_index] *= factor;
    }
  }

  fn change_row_factor(&self, data: &mut [Vec<Complex<f64>>], meta: &mut [f32], row_index: usize, factor: f64) {
    let base = self.vis_per_row();
    let n_pol = self.n_pol;
    for p in 0..n_pol {
      let slot = base + row_index * n_pol + p;
      meta[slot] = (meta[slot] as f64 / factor) as f32;
    }
    for v in data[row_index].iter_mut() {
      *v *= factor;
    }
  }

  fn best_channel_increase(
    &self,
    data: &[Vec<Complex<f64>>],
    rows_meta: &[(usize, usize)],
    max_quantity: f64,
    pol_index: usize,
  ) -> (f64, f64, usize) {
    let mut best_increase = 0.0;
    let mut channel_factor = 1.0;
    let mut best_channel = 0;
    for channel in 0..self.n_chan {
      let slot = channel * self.n_pol + pol_index;
      let mut largest_component = 0.0_f64;
      for (row, &(a1, a2)) in data.iter().zip(rows_meta) {
        if a1 == a2 {
          continue;
        }
        let v = row[slot];
        let local_max = v.re.max(v.im).max(-v.re.min(v.im));
        if local_max.is_finite() && local_max > largest_component {
          largest_component = local_max;
        }
      }
      let factor = if largest_component == 0.0 {
        0.0
      } else {
        max_quantity / largest_component - 1.0
      };
      let mut this_increase = 0.0;
      for (row, &(a1, a2)) in data.iter().zip(rows_meta) {
        if a1 == a2 {
          continue;
        }
        let v = row[slot] * factor;
        let abs_val = v.re.abs() + v.im.abs();
        if abs_val.is_finite() {
          this_increase += abs_val;
        }
      }
      if this_increase > best_increase {
        best_increase = this_increase;
        best_channel = channel;
        channel_factor = factor + 1.0;
      }
    }
    (best_increase, channel_factor, best_channel)
  }

  fn best_row_increase(
    &self,
    data: &[Vec<Complex<f64>>],
    max_quantity: f64,
    pol_index: usize,
  ) -> (Vec<f64>, Vec<f64>, usize) {
    let mut max_comp_per_row = vec![0.0_f64; data.len()];
    for (row_index, row) in data.iter().enumerate() {
      for channel in 0..self.n_chan {
        let v = row[channel * self.n_pol + pol_index];
        let compl_max = v.re.max(v.im).max(-v.re.min(v.im));
        if compl_max.is_finite() && compl_max > max_comp_per_row[row_index] {
          max_comp_per_row[row_index] = compl_max;
        }
      }
    }
    let mut increase_per_row = vec![0.0_f64; data.len()];
    for (row_index, row) in data.iter().enumerate() {
      let factor = if max_comp_per_row[row_index] == 0.0 {
        0.0
      } else {
        max_quantity / max_comp_per_row[row_index] - 1.0
      };
      for channel in 0..self.n_chan {
        let v = row[channel * self.n_pol + pol_index] * factor;
        let av = v.re.abs() + v.im.abs();
        if av.is_finite() {
          increase_per_row[row_index] += av;
        }
      }
    }
    let mut best_row = 0;
    let mut best_increase = 0.0;
    for (row_index, &increase) in increase_per_row.iter().enumerate() {
      if increase > best_increase {
        best_row = row_index;
        best_increase = increase;
      }
    }
    (max_comp_per_row, increase_per_row, best_row)
  }

  fn fit_to_maximum(&self, data: &mut [Vec<Complex<f64>>], rows_meta: &[(usize, usize)], meta: &mut [f32], max_quantity: f64) {
    let vis_per_row = self.vis_per_row();

    for vis_index in 0..vis_per_row {
      let mut largest_component = 0.0_f64;
      for (row, &(a1, a2)) in data.iter().zip(rows_meta) {
        if a1 == a2 {
          continue;
        }
        let v = row[vis_index];
        let local_max = v.re.max(v.im).max(-v.re.min(v.im));
        if local_max.is_finite() && local_max > largest_component {
          largest_component = local_max;
        }
      }
      let factor = if max_quantity == 0.0 || largest_component == 0.0 {
        1.0
      } else {
        max_quantity / largest_component
      };
      self.change_channel_factor(data, meta, vis_index, factor);
    }

    for pol_index in 0..self.n_pol {
      loop {
        let (best_channel_increase, channel_factor, best_channel) =
          self.best_channel_increase(data, rows_meta, max_quantity, pol_index);
        let (max_comp_per_row, increase_per_row, best_row) = self.best_row_increase(data, max_quantity, pol_index);
        let best_row_increase = increase_per_row[best_row];

        let is_progressing = if best_row_increase > best_channel_increase {
          let factor = if max_comp_per_row[best_row] == 0.0 {
            1.0
          } else {
            max_quantity / max_comp_per_row[best_row]
          };
          if factor < 1.0 {
            false
          } else {
            self.change_row_factor(data, meta, best_row, factor);
            factor > ROW_FACTOR_EPSILON
          }
        } else if channel_factor < 1.0 {
          false
        } else {
          self.change_channel_factor(data, meta, best_channel * self.n_pol + pol_index, channel_factor);
          channel_factor > CHANNEL_FACTOR_EPSILON
        };

        if !is_progressing {
          break;
        }
      }
    }
  }
}

impl BlockEncoder for RfEncoder {
  fn meta_data_count(n_rows: usize, n_pol: usize, n_chan: usize, _n_antennae: usize) -> usize {
    n_pol * n_chan + n_rows * n_pol
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

    let mut meta = vec![0.0_f32; Self::meta_data_count(n_rows, self.n_pol, self.n_chan, 0)];
    self.normalize_channels(&mut data, &rows_meta, &mut meta);
    self.normalize_rows(&mut data, &mut meta, quantizer.max_quantity());
    self.fit_to_maximum(&mut data, &rows_meta, &mut meta, quantizer.max_quantity());

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

  fn initialize_decode(&mut self, metadata: &[f32], n_rows: usize, _n_antennae: usize) {
    let vis_per_row = self.vis_per_row();
    self.channel_factors = metadata[..vis_per_row].iter().map(|&f| f as f64).collect();
    self.row_factors = metadata[vis_per_row..vis_per_row + n_rows * self.n_pol]
      .iter()
      .map(|&f| f as f64)
      .collect();
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
      let factor = self.channel_factors[i] * self.row_factors[block_row * self.n_pol + i % self.n_pol];
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

  fn make_buffer(n_pol: usize, n_chan: usize, rows: &[(usize, usize, Vec<Vis>)]) -> TimeBlockBuffer<Vis> {
    let mut buffer = TimeBlockBuffer::new(n_pol, n_chan);
    for (a1, a2, vis) in rows {
      buffer.push_row(*a1, *a2, vis).unwrap();
    }
    buffer
  }

  #[test]
  fn test_meta_data_count() {
    assert_eq!(RfEncoder::meta_data_count(10, 2, 4, 0), 2 * 4 + 10 * 2);
  }

  #[test]
  fn test_round_trip_without_dithering() {
    let quantizer = Quantizer::new(DistributionKind::Gaussian, 1 << 12, 1.0).unwrap();
    let n_pol = 2;
    let n_chan = 3;
    let rows = vec![
      (0, 1, vec![Vis::new(1.0, -0.5), Vis::new(0.2, 0.1), Vis::new(-0.3, 0.4), Vis::new(0.7, 0.7), Vis::new(-0.1, -0.1), Vis::new(0.05, 0.2)]),
      (0, 2, vec![Vis::new(2.0, 1.0), Vis::new(-1.2, 0.3), Vis::new(0.8, -0.4), Vis::new(0.3, 0.3), Vis::new(-0.2, 0.1), Vis::new(0.4, -0.4)]),
      (1, 2, vec![Vis::new(0.5, 0.5); 6]),
    ];
    let buffer = make_buffer(n_pol, n_chan, &rows);

    let mut encoder = RfEncoder::new(n_pol, n_chan);
    let (meta, symbols) = encoder.encode(&quantizer, &buffer, 3, None);

    let mut decoder = RfEncoder::new(n_pol, n_chan);
    decoder.initialize_decode(&meta, buffer.n_rows(), 3);
    let mut out: TimeBlockBuffer<Vis> = TimeBlockBuffer::new(n_pol, n_chan);
    for (row_index, (a1, a2, _)) in rows.iter().enumerate() {
      decoder.decode(&quantizer, &mut out, &symbols, row_index, *a1, *a2);
    }

    for (row_index, (_, _, original)) in rows.iter().enumerate() {
      let decoded = &out[row_index].visibilities;
      for (o, d) in original.iter().zip(decoded) {
        assert!((o.re - d.re).abs() < 0.2, "re {} vs {}", o.re, d.re);
        assert!((o.im - d.im).abs() < 0.2, "im {} vs {}", o.im, d.im);
      }
    }
  }

  #[test]
  fn test_autocorrelation_row_excluded_from_normalisation_but_still_coded() {
    let quantizer = Quantizer::new(DistributionKind::Gaussian, 1 << 10, 1.0).unwrap();
    let n_pol = 1;
    let n_chan = 1;
    let rows = vec![
      (0, 0, vec![Vis::new(100.0, 100.0)]),
      (0, 1, vec![Vis::new(1.0, 1.0)]),
      (1, 2, vec![Vis::new(1.0, -1.0)]),
    ];
    let buffer = make_buffer(n_pol, n_chan, &rows);
    let mut encoder = RfEncoder::new(n_pol, n_chan);
    let (_, symbols) = encoder.encode(&quantizer, &buffer, 3, None);
    assert_eq!(symbols.len(), symbol_count(3, n_pol, n_chan));
  }
}
