//! Target amplitude distributions and the numerical machinery used to turn
//! one into a quantiser dictionary (component B, dictionary construction
//! half).

use crate::errors::{DyscoError, DyscoResult};
use serde::{Deserialize, Serialize};

/// One of the four amplitude distributions a [`crate::quantizer::Quantizer`]
/// can be tuned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionKind {
  Uniform,
  Gaussian,
  TruncatedGaussian,
  StudentT,
}

impl DistributionKind {
  pub fn as_on_disk_byte(&self) -> u8 {
    match self {
      DistributionKind::Uniform => 0,
      DistributionKind::Gaussian => 1,
      DistributionKind::TruncatedGaussian => 2,
      DistributionKind::StudentT => 3,
    }
  }

  pub fn from_on_disk_byte(byte: u8) -> DyscoResult<Self> {
    match byte {
      0 => Ok(DistributionKind::Uniform),
      1 => Ok(DistributionKind::Gaussian),
      2 => Ok(DistributionKind::TruncatedGaussian),
      3 => Ok(DistributionKind::StudentT),
      other => Err(DyscoError::format(format!(
        "unknown distribution byte {other}"
      ))),
    }
  }

  pub fn parse(name: &str) -> DyscoResult<Self> {
    match name {
      "Uniform" => Ok(DistributionKind::Uniform),
      "Gaussian" => Ok(DistributionKind::Gaussian),
      "TruncatedGaussian" => Ok(DistributionKind::TruncatedGaussian),
      "StudentT" => Ok(DistributionKind::StudentT),
      other => Err(DyscoError::configuration(format!(
        "unknown distribution '{other}', expected one of Uniform, Gaussian, TruncatedGaussian, StudentT"
      ))),
    }
  }
}

/// Parameters needed to fully pin down a distribution: `sigma` is used by
/// all four, `truncation` only by [`DistributionKind::TruncatedGaussian`],
/// `student_t_nu` only by [`DistributionKind::StudentT`].
#[derive(Clone, Copy, Debug)]
pub struct DistributionParams {
  pub kind: DistributionKind,
  pub sigma: f64,
  pub truncation: f64,
  pub student_t_nu: f64,
}

impl DistributionParams {
  pub fn validate(&self) -> DyscoResult<()> {
    if !(self.sigma > 0.0) {
      return Err(DyscoError::configuration("sigma must be > 0"));
    }
    match self.kind {
      DistributionKind::TruncatedGaussian if !(self.truncation > 0.0) => {
        Err(DyscoError::configuration("truncation (tau) must be > 0"))
      }
      DistributionKind::StudentT if !(self.student_t_nu > 0.0) => {
        Err(DyscoError::configuration("student's t nu must be > 0"))
      }
      _ => Ok(()),
    }
  }

  /// The support of the distribution, as `(left, right)`. Infinite bounds
  /// are represented with `f64::{NEG_,}INFINITY`.
  fn support(&self) -> (f64, f64) {
    match self.kind {
      DistributionKind::Uniform => (-self.sigma, self.sigma),
      DistributionKind::TruncatedGaussian => {
        (-self.truncation * self.sigma, self.truncation * self.sigma)
      }
      DistributionKind::Gaussian | DistributionKind::StudentT => {
        (f64::NEG_INFINITY, f64::INFINITY)
      }
    }
  }

  /// The inverse CDF (quantile function) at probability `p ∈ (0, 1)`.
  fn quantile(&self, p: f64) -> f64 {
    match self.kind {
      DistributionKind::Uniform => self.sigma * (2.0 * p - 1.0),
      DistributionKind::Gaussian => self.sigma * std::f64::consts::SQRT_2 * erfinv(2.0 * p - 1.0),
      DistributionKind::TruncatedGaussian => {
        let tau = self.truncation;
        let phi_lo = standard_normal_cdf(-tau);
        let phi_hi = standard_normal_cdf(tau);
        let target = phi_lo + p * (phi_hi - phi_lo);
        self.sigma * std::f64::consts::SQRT_2 * erfinv(2.0 * target - 1.0)
      }
      DistributionKind::StudentT => self.sigma * student_t_quantile(p, self.student_t_nu),
    }
  }

  /// `E[X | a < X < b]`, where `a`/`b` may be infinite.
  fn centroid(&self, a: f64, b: f64) -> f64 {
    match self.kind {
      DistributionKind::Uniform => 0.5 * (a + b),
      DistributionKind::Gaussian | DistributionKind::TruncatedGaussian => {
        gaussian_centroid(self.sigma, a, b)
      }
      DistributionKind::StudentT => student_t_centroid(self.sigma, self.student_t_nu, a, b),
    }
  }
}

/// The reconstruction-point / boundary pair for one quantiser symbol.
#[derive(Clone, Copy, Debug)]
pub struct Bin {
  pub reconstruction: f64,
  pub right_boundary: f64,
}

/// Partitions `params`'s distribution into `quant_count` equal-probability
/// intervals and returns the resulting bins in ascending order of
/// `right_boundary`. This is the dictionary-construction half of the
/// stochastic quantiser (§4.B); encoding/decoding against the result lives
/// in [`crate::quantizer`].
pub fn build_bins(params: &DistributionParams, quant_count: u64) -> DyscoResult<Vec<Bin>> {
  params.validate()?;
  if quant_count < crate::constants::MIN_QUANT_COUNT {
    return Err(DyscoError::configuration(format!(
      "quantCount must be >= {}, was {}",
      crate::constants::MIN_QUANT_COUNT,
      quant_count
    )));
  }

  let (left, right) = params.support();
  let n = quant_count;
  let mut bins = Vec::with_capacity(n as usize);
  for k in 0..n {
    let a = if k == 0 {
      left
    } else {
      params.quantile(k as f64 / n as f64)
    };
    let b = if k == n - 1 {
      right
    } else {
      params.quantile((k + 1) as f64 / n as f64)
    };
    bins.push(Bin {
      reconstruction: params.centroid(a, b),
      right_boundary: b,
    });
  }
  Ok(bins)
}

// --- special functions backing the quantile/centroid computations above ---

/// Error function via the Abramowitz & Stegun 7.1.26 rational
/// approximation (max absolute error ~1.5e-7).
fn erf(x: f64) -> f64 {
  let sign = if x < 0.0 { -1.0 } else { 1.0 };
  let x = x.abs();

  const A1: f64 = 0.254829592;
  const A2: f64 = -0.284496736;
  const A3: f64 = 1.421413741;
  const A4: f64 = -1.453152027;
  const A5: f64 = 1.061405429;
  const P: f64 = 0.3275911;

  let t = 1.0 / (1.0 + P * x);
  let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
  sign * (1.0 - poly * (-x * x).exp())
}

/// Inverse error function, via Winitzki's rational approximation refined
/// with two Newton iterations against [`erf`].
fn erfinv(x: f64) -> f64 {
  if x <= -1.0 {
    return f64::NEG_INFINITY;
  }
  if x >= 1.0 {
    return f64::INFINITY;
  }

  const A: f64 = 0.147;
  let ln_term = (1.0 - x * x).ln();
  let first = 2.0 / (std::f64::consts::PI * A) + ln_term / 2.0;
  let mut y = (x.signum())
    * ((first * first - ln_term / A).sqrt() - first).sqrt();

  // Newton refinement: f(y) = erf(y) - x, f'(y) = 2/sqrt(pi) * exp(-y^2)
  for _ in 0..2 {
    let f = erf(y) - x;
    let fprime = 2.0 / std::f64::consts::PI.sqrt() * (-y * y).exp();
    if fprime.abs() > 1e-300 {
      y -= f / fprime;
    }
  }
  y
}

fn standard_normal_cdf(z: f64) -> f64 {
  0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn standard_normal_pdf(z: f64) -> f64 {
  (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// `E[X | a < X < b]` for `X ~ N(0, sigma^2)`, with `a`/`b` possibly
/// infinite.
fn gaussian_centroid(sigma: f64, a: f64, b: f64) -> f64 {
  let za = a / sigma;
  let zb = b / sigma;
  let phi_a = if a.is_infinite() { 0.0 } else { standard_normal_pdf(za) };
  let phi_b = if b.is_infinite() { 0.0 } else { standard_normal_pdf(zb) };
  let cdf_a = if a == f64::NEG_INFINITY { 0.0 } else { standard_normal_cdf(za) };
  let cdf_b = if b == f64::INFINITY { 1.0 } else { standard_normal_cdf(zb) };
  let mass = cdf_b - cdf_a;
  if mass <= 0.0 {
    return 0.5 * (a.max(-f64::MAX / 2.0) + b.min(f64::MAX / 2.0));
  }
  sigma * (phi_a - phi_b) / mass
}

/// Unnormalized log-pdf helper shared by the Student's t CDF/quantile/
/// centroid routines.
fn student_t_pdf(t: f64, nu: f64) -> f64 {
  let num = ln_gamma((nu + 1.0) / 2.0);
  let den = 0.5 * (nu * std::f64::consts::PI).ln() + ln_gamma(nu / 2.0);
  let log_coeff = num - den;
  (log_coeff - (nu + 1.0) / 2.0 * (1.0 + t * t / nu).ln()).exp()
}

/// `E[X | a < X < b]` for `X = sigma * T`, `T` Student's t with `nu`
/// degrees of freedom, using the closed-form antiderivative of `t f(t)`:
/// `∫ t f(t) dt = -nu/(nu-1) f(t) (1 + t^2/nu)`.
fn student_t_centroid(sigma: f64, nu: f64, a: f64, b: f64) -> f64 {
  let antideriv = |t: f64| -> f64 {
    if t.is_infinite() {
      0.0
    } else {
      -nu / (nu - 1.0) * student_t_pdf(t, nu) * (1.0 + t * t / nu)
    }
  };
  let ta = a / sigma;
  let tb = b / sigma;
  let mass = student_t_cdf(tb, nu) - student_t_cdf(ta, nu);
  if mass <= 0.0 || (nu - 1.0).abs() < 1e-9 {
    return 0.5 * (a.max(-f64::MAX / 2.0) + b.min(f64::MAX / 2.0));
  }
  sigma * (antideriv(tb) - antideriv(ta)) / mass
}

/// CDF of the standard Student's t distribution via the regularized
/// incomplete beta function.
fn student_t_cdf(t: f64, nu: f64) -> f64 {
  if t == f64::NEG_INFINITY {
    return 0.0;
  }
  if t == f64::INFINITY {
    return 1.0;
  }
  let x = nu / (nu + t * t);
  let ibeta = regularized_incomplete_beta(x, nu / 2.0, 0.5);
  if t >= 0.0 {
    1.0 - 0.5 * ibeta
  } else {
    0.5 * ibeta
  }
}

/// Inverse CDF of the standard Student's t distribution by bisection
/// against [`student_t_cdf`] — robust even for the small `nu` values
/// encoded in files, at the cost of a fixed number of iterations.
fn student_t_quantile(p: f64, nu: f64) -> f64 {
  if p <= 0.0 {
    return f64::NEG_INFINITY;
  }
  if p >= 1.0 {
    return f64::INFINITY;
  }
  let mut lo = -1.0e6;
  let mut hi = 1.0e6;
  for _ in 0..200 {
    let mid = 0.5 * (lo + hi);
    if student_t_cdf(mid, nu) < p {
      lo = mid;
    } else {
      hi = mid;
    }
  }
  0.5 * (lo + hi)
}

/// Lanczos approximation of `ln(Gamma(x))`.
fn ln_gamma(x: f64) -> f64 {
  const G: f64 = 7.0;
  const COEFFS: [f64; 9] = [
    0.99999999999980993,
    676.5203681218851,
    -1259.1392167224028,
    771.32342877765313,
    -176.61502916214059,
    12.507343278686905,
    -0.13857109526572012,
    9.9843695780195716e-6,
    1.5056327351493116e-7,
  ];
  if x < 0.5 {
    // reflection formula
    (std::f64::consts::PI / (std::f64::consts::PI * x).sin()).ln() - ln_gamma(1.0 - x)
  } else {
    let x = x - 1.0;
    let mut a = COEFFS[0];
    let t = x + G + 0.5;
    for (i, &c) in COEFFS.iter().enumerate().skip(1) {
      a += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
  }
}

/// Regularized incomplete beta function `I_x(a, b)` via the continued
/// fraction expansion (Numerical Recipes §6.4).
fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
  if x <= 0.0 {
    return 0.0;
  }
  if x >= 1.0 {
    return 1.0;
  }
  let ln_beta = ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b);
  let front = (a * x.ln() + b * (1.0 - x).ln() - ln_beta).exp();

  if x < (a + 1.0) / (a + b + 2.0) {
    front * betacf(x, a, b) / a
  } else {
    1.0 - front * betacf(1.0 - x, b, a) / b
  }
}

fn betacf(x: f64, a: f64, b: f64) -> f64 {
  const MAX_ITER: usize = 200;
  const EPS: f64 = 1e-14;
  const TINY: f64 = 1e-300;

  let qab = a + b;
  let qap = a + 1.0;
  let qam = a - 1.0;
  let mut c = 1.0;
  let mut d = 1.0 - qab * x / qap;
  if d.abs() < TINY {
    d = TINY;
  }
  d = 1.0 / d;
  let mut h = d;

  for m in 1..=MAX_ITER {
    let m_f = m as f64;
    let m2 = 2.0 * m_f;

    let aa = m_f * (b - m_f) * x / ((qam + m2) * (a + m2));
    d = 1.0 + aa * d;
    if d.abs() < TINY {
      d = TINY;
    }
    c = 1.0 + aa / c;
    if c.abs() < TINY {
      c = TINY;
    }
    d = 1.0 / d;
    h *= d * c;

    let aa = -(a + m_f) * (qab + m_f) * x / ((a + m2) * (qap + m2));
    d = 1.0 + aa * d;
    if d.abs() < TINY {
      d = TINY;
    }
    c = 1.0 + aa / c;
    if c.abs() < TINY {
      c = TINY;
    }
    d = 1.0 / d;
    let del = d * c;
    h *= del;

    if (del - 1.0).abs() < EPS {
      break;
    }
  }
  h
}

/// A minimal fixed-bin histogram, used to find an empirical distribution's
/// best-fitting [`DistributionKind`].
pub struct Histogram {
  bins: Vec<usize>,
  min: f64,
  max: f64,
}

impl Histogram {
  pub fn new(min: f64, max: f64, bin_count: usize) -> Self {
    Histogram {
      bins: vec![0; bin_count],
      min,
      max,
    }
  }

  pub fn include(&mut self, value: f64) {
    let idx = self.bin_of(value);
    self.bins[idx] += 1;
  }

  pub fn bin_x(&self, index: usize) -> f64 {
    self.min + index as f64 * (self.max - self.min) / self.bins.len() as f64
  }

  pub fn len(&self) -> usize {
    self.bins.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bins.is_empty()
  }

  fn bin_of(&self, value: f64) -> usize {
    if value < self.min {
      0
    } else if value > self.max {
      self.bins.len() - 1
    } else {
      let frac = (value - self.min) / (self.max - self.min);
      (frac * (self.bins.len() - 1) as f64).round() as usize
    }
  }
}

impl std::ops::Index<usize> for Histogram {
  type Output = usize;
  fn index(&self, index: usize) -> &usize {
    &self.bins[index]
  }
}

/// Estimates `sigma` from a sample (RMS of the absolute values is a
/// reasonable estimator for all four supported distributions) and reports
/// which builtin distribution's CDF the sample's empirical CDF matches most
/// closely, measured by Kolmogorov-Smirnov-style maximum deviation. This is
/// advisory only (`suggest-distribution` CLI subcommand); the quantiser
/// itself never calls it.
pub fn best_fit(samples: &[f64]) -> DyscoResult<DistributionKind> {
  let finite: Vec<f64> = samples.iter().copied().filter(|x| x.is_finite()).collect();
  if finite.len() < 8 {
    return Err(DyscoError::configuration(
      "need at least 8 finite samples to suggest a distribution",
    ));
  }
  let n = finite.len() as f64;
  let variance = finite.iter().map(|x| x * x).sum::<f64>() / n;
  let sigma = variance.sqrt().max(1e-12);

  let mut sorted = finite.clone();
  sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

  let candidates = [
    DistributionKind::Uniform,
    DistributionKind::Gaussian,
    DistributionKind::TruncatedGaussian,
    DistributionKind::StudentT,
  ];

  let mut best = candidates[0];
  let mut best_score = f64::INFINITY;
  for kind in candidates {
    let params = DistributionParams {
      kind,
      sigma,
      truncation: 3.0,
      student_t_nu: 4.0,
    };
    if params.validate().is_err() {
      continue;
    }
    let max_dev = sorted
      .iter()
      .enumerate()
      .map(|(i, &x)| {
        let empirical = (i + 1) as f64 / n;
        let model = model_cdf(&params, x);
        (empirical - model).abs()
      })
      .fold(0.0_f64, f64::max);
    if max_dev < best_score {
      best_score = max_dev;
      best = kind;
    }
  }
  Ok(best)
}

fn model_cdf(params: &DistributionParams, x: f64) -> f64 {
  match params.kind {
    DistributionKind::Uniform => {
      ((x + params.sigma) / (2.0 * params.sigma)).clamp(0.0, 1.0)
    }
    DistributionKind::Gaussian => standard_normal_cdf(x / params.sigma),
    DistributionKind::TruncatedGaussian => {
      let tau = params.truncation;
      let lo = standard_normal_cdf(-tau);
      let hi = standard_normal_cdf(tau);
      let clamped = (x / params.sigma).clamp(-tau, tau);
      (standard_normal_cdf(clamped) - lo) / (hi - lo)
    }
    DistributionKind::StudentT => student_t_cdf(x / params.sigma, params.student_t_nu),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params(kind: DistributionKind) -> DistributionParams {
    DistributionParams {
      kind,
      sigma: 1.0,
      truncation: 2.0,
      student_t_nu: 5.0,
    }
  }

  #[test]
  fn test_rejects_bad_quant_count() {
    assert!(build_bins(&params(DistributionKind::Gaussian), 1).is_err());
  }

  #[test]
  fn test_rejects_bad_sigma() {
    let mut p = params(DistributionKind::Gaussian);
    p.sigma = 0.0;
    assert!(build_bins(&p, 16).is_err());
  }

  #[test]
  fn test_rejects_bad_truncation() {
    let mut p = params(DistributionKind::TruncatedGaussian);
    p.truncation = -1.0;
    assert!(build_bins(&p, 16).is_err());
  }

  #[test]
  fn test_rejects_bad_nu() {
    let mut p = params(DistributionKind::StudentT);
    p.student_t_nu = 0.0;
    assert!(build_bins(&p, 16).is_err());
  }

  #[test]
  fn test_symmetry_all_distributions() {
    for kind in [
      DistributionKind::Uniform,
      DistributionKind::Gaussian,
      DistributionKind::TruncatedGaussian,
      DistributionKind::StudentT,
    ] {
      for &bits in &[2_u64, 3, 4, 8] {
        let bins = build_bins(&params(kind), 1 << bits).unwrap();
        let n = bins.len();
        for k in 0..n {
          let lhs = bins[k].reconstruction;
          let rhs = -bins[n - 1 - k].reconstruction;
          assert!(
            (lhs - rhs).abs() < 1e-6,
            "{:?} asymmetric at k={} ({} vs {})",
            kind,
            k,
            lhs,
            rhs
          );
        }
      }
    }
  }

  #[test]
  fn test_ascending_reconstructions() {
    let bins = build_bins(&params(DistributionKind::Gaussian), 16).unwrap();
    for w in bins.windows(2) {
      assert!(w[0].reconstruction < w[1].reconstruction);
    }
  }

  #[test]
  fn test_erf_matches_known_values() {
    assert!((erf(0.0)).abs() < 1e-9);
    assert!((erf(1.0) - 0.8427007929497149).abs() < 1e-6);
    assert!((erf(-1.0) + 0.8427007929497149).abs() < 1e-6);
  }

  #[test]
  fn test_erfinv_is_erf_inverse() {
    for x in [-0.9, -0.5, 0.0, 0.3, 0.8] {
      let y = erfinv(x);
      assert!((erf(y) - x).abs() < 1e-6, "x={x} y={y} erf(y)={}", erf(y));
    }
  }

  #[test]
  fn test_uniform_last_boundary_is_sigma() {
    let bins = build_bins(&params(DistributionKind::Uniform), 8).unwrap();
    assert!((bins.last().unwrap().right_boundary - 1.0).abs() < 1e-9);
  }

  #[test]
  fn test_gaussian_last_boundary_is_infinite() {
    let bins = build_bins(&params(DistributionKind::Gaussian), 8).unwrap();
    assert_eq!(bins.last().unwrap().right_boundary, f64::INFINITY);
  }

  #[test]
  fn test_truncated_gaussian_last_boundary_is_tau_sigma() {
    let p = params(DistributionKind::TruncatedGaussian);
    let bins = build_bins(&p, 8).unwrap();
    assert!((bins.last().unwrap().right_boundary - p.truncation).abs() < 1e-6);
  }

  #[test]
  fn test_best_fit_recovers_gaussian() {
    // crude deterministic pseudo-gaussian sample via Box-Muller with a
    // fixed low-discrepancy sequence, to keep the test free of `rand`.
    let mut samples = Vec::new();
    for i in 1..2000 {
      let u1 = (i as f64 * 0.61803398875) % 1.0 + 1e-9;
      let u2 = (i as f64 * 0.41421356237) % 1.0;
      let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
      samples.push(z);
    }
    assert_eq!(best_fit(&samples).unwrap(), DistributionKind::Gaussian);
  }
}
