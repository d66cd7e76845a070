//! The stochastic quantiser itself (component B, encode/decode half):
//! binary-searches a precomputed dictionary to map floats to symbols and
//! back, with optional dithering to remove quantisation bias.

use crate::distribution::{build_bins, DistributionKind, DistributionParams};
use crate::errors::DyscoResult;
use rand::distributions::Uniform;

/// An immutable dictionary-backed quantiser. Cheaply `Clone`-able and safe
/// to share across encoder threads by reference, since it never mutates
/// after construction (§5: "The quantiser is immutable after construction
/// and safely shared by const reference").
#[derive(Clone, Debug)]
pub struct Quantizer {
  /// Reconstruction points, ascending, plus a final non-finite sentinel
  /// entry at `reconstructions[real_count()]` that is never produced by a
  /// finite input.
  reconstructions: Vec<f64>,
  /// Right boundary of each *real* symbol's interval; `boundaries[real_count()-1]`
  /// is always `+inf` (or `+tau*sigma`/`+sigma` for bounded distributions).
  /// One entry per real bin, i.e. one fewer than `reconstructions`.
  boundaries: Vec<f64>,
}

impl Quantizer {
  /// Builds a quantiser for any of the four supported distributions.
  /// `truncation` is only meaningful for [`DistributionKind::TruncatedGaussian`]
  /// and `student_t_nu` only for [`DistributionKind::StudentT`]. `quant_count`
  /// is the total symbol space; the top symbol is reserved as the
  /// non-finite sentinel, so only `quant_count - 1` symbols carry real
  /// reconstruction values.
  pub fn build(
    distribution: DistributionKind,
    quant_count: u64,
    sigma: f64,
    truncation: f64,
    student_t_nu: f64,
  ) -> DyscoResult<Self> {
    let params = DistributionParams {
      kind: distribution,
      sigma,
      truncation,
      student_t_nu,
    };
    let bins = build_bins(&params, quant_count.saturating_sub(1))?;
    let mut reconstructions: Vec<f64> = bins.iter().map(|b| b.reconstruction).collect();
    let boundaries: Vec<f64> = bins.iter().map(|b| b.right_boundary).collect();
    reconstructions.push(f64::NAN);
    Ok(Quantizer {
      reconstructions,
      boundaries,
    })
  }

  fn real_count(&self) -> usize {
    self.boundaries.len()
  }

  /// Convenience constructor for [`DistributionKind::Uniform`] and
  /// [`DistributionKind::Gaussian`], which need neither `truncation` nor
  /// `student_t_nu`.
  pub fn new(distribution: DistributionKind, quant_count: u64, sigma: f64) -> DyscoResult<Self> {
    Self::build(distribution, quant_count, sigma, 1.0, 1.0)
  }

  pub fn quant_count(&self) -> usize {
    self.reconstructions.len()
  }

  /// `max_k |d[k]|` over the real (non-sentinel) symbols, the largest
  /// magnitude representable by any finite input.
  pub fn max_quantity(&self) -> f64 {
    self.reconstructions[self.real_count() - 1].abs()
  }

  /// `r[k]`, the right boundary of real symbol `k`'s interval.
  pub fn right_boundary(&self, k: usize) -> f64 {
    self.boundaries[k]
  }

  /// Maps `x` to its symbol. Non-finite `x` always maps to the sentinel
  /// symbol, one past the largest real symbol.
  pub fn encode(&self, x: f64) -> u32 {
    if !x.is_finite() {
      return self.sentinel();
    }
    let idx = self.boundaries.partition_point(|&r| r <= x);
    idx.min(self.real_count() - 1) as u32
  }

  /// As [`Quantizer::encode`], but dithers between the two symbols
  /// straddling `x` using an external 16-bit uniform `dither` (expected to
  /// be drawn from [`Quantizer::dither_distribution`]).
  pub fn encode_with_dithering(&self, x: f64, dither: u32) -> u32 {
    if !x.is_finite() {
      return self.sentinel();
    }
    let n = self.real_count();
    let above = self.reconstructions[..n].partition_point(|&d| d <= x);
    let k = above.saturating_sub(1).min(n - 2);
    let d_k = self.reconstructions[k];
    let d_k1 = self.reconstructions[k + 1];
    let p = if d_k1 > d_k {
      (x - d_k) / (d_k1 - d_k)
    } else {
      0.0
    };
    let threshold = dither as f64 / 65536.0;
    if threshold < p {
      (k + 1) as u32
    } else {
      k as u32
    }
  }

  /// `d[symbol]`. Decoding the sentinel symbol yields `NaN`, which callers
  /// propagate through the per-block factor multiply into a non-finite
  /// visibility component.
  pub fn decode(&self, symbol: u32) -> f64 {
    self.reconstructions[symbol as usize]
  }

  /// The reserved top symbol, used as the sentinel for non-finite input
  /// (§4.B). Decodes to `NaN`.
  fn sentinel(&self) -> u32 {
    (self.quant_count() - 1) as u32
  }

  /// The canonical 16-bit dither distribution: uniform on `[0, 2^16)`.
  pub fn dither_distribution() -> Uniform<u32> {
    Uniform::new(0_u32, 1 << 16)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::distribution::DistributionKind;
  use rand::rngs::StdRng;
  use rand::{Rng, SeedableRng};

  fn quantizer(kind: DistributionKind, bits: u32) -> Quantizer {
    Quantizer::build(kind, 1 << bits, 1.0, 2.0, 5.0).unwrap()
  }

  #[test]
  fn test_construction_rejects_bad_quant_count() {
    assert!(Quantizer::build(DistributionKind::Gaussian, 1, 1.0, 0.0, 0.0).is_err());
  }

  #[test]
  fn test_construction_rejects_bad_sigma() {
    assert!(Quantizer::build(DistributionKind::Gaussian, 16, 0.0, 0.0, 0.0).is_err());
  }

  #[test]
  fn test_non_finite_encodes_to_sentinel() {
    let q = quantizer(DistributionKind::Gaussian, 4);
    let sentinel = q.encode(f64::NAN);
    assert_eq!(sentinel, (q.quant_count() - 1) as u32);
    assert_eq!(q.encode(f64::INFINITY), sentinel);
    assert_eq!(q.encode_with_dithering(f64::NAN, 12345), sentinel);
  }

  #[test]
  fn test_decode_of_sentinel_is_non_finite() {
    let q = quantizer(DistributionKind::Gaussian, 4);
    let sentinel = q.encode(f64::NAN);
    assert!(!q.decode(sentinel).is_finite());
    assert!(!q.decode(q.encode(f64::INFINITY)).is_finite());
  }

  #[test]
  fn test_symmetry_round_trip() {
    for kind in [
      DistributionKind::Uniform,
      DistributionKind::Gaussian,
      DistributionKind::TruncatedGaussian,
      DistributionKind::StudentT,
    ] {
      let q = quantizer(kind, 8);
      for &x in &[0.1, 0.5, 0.9, 1.3] {
        let pos = q.decode(q.encode(x));
        let neg = q.decode(q.encode(-x));
        assert!((pos + neg).abs() < 1e-6, "{:?} failed at x={}", kind, x);
      }
    }
  }

  #[test]
  fn test_max_quantity_is_largest_magnitude() {
    let q = quantizer(DistributionKind::Gaussian, 4);
    let max = q.max_quantity();
    for k in 0..q.real_count() {
      assert!(q.decode(k as u32).abs() <= max + 1e-9);
    }
  }

  #[test]
  fn test_dither_is_unbiased_on_average() {
    let q = quantizer(DistributionKind::TruncatedGaussian, 4);
    let mut rng = StdRng::seed_from_u64(42);
    let dist = Quantizer::dither_distribution();
    let x = 0.37;
    let samples = 100_000;
    let mut sum = 0.0;
    for _ in 0..samples {
      let u = rng.sample(dist);
      sum += q.decode(q.encode_with_dithering(x, u));
    }
    let mean = sum / samples as f64;
    assert!((mean - x).abs() < 0.1, "mean={mean} expected~{x}");
  }

  #[test]
  fn test_encode_at_bit16_uniform_is_near_identity() {
    let q = Quantizer::build(DistributionKind::Uniform, 1 << 16, 10.0, 0.0, 0.0).unwrap();
    for &x in &[-9.5, -1.0, 0.0, 3.3, 9.9] {
      let decoded = q.decode(q.encode(x));
      assert!((decoded - x).abs() < 1e-3, "x={x} decoded={decoded}");
    }
  }
}
