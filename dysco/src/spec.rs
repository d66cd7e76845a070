//! `DyscoSpec`: the construction-parameter record a caller supplies when
//! creating a new column (§6's "Spec record"). Mirrors the builder pattern
//! used elsewhere in this crate's configuration structs: construct with
//! [`DyscoSpec::new`], then chain `with_*` setters for anything that
//! differs from the defaults.

use crate::distribution::DistributionKind;
use crate::errors::{DyscoError, DyscoResult};
use crate::normalize::NormalizationKind;
use serde::{Deserialize, Serialize};

/// All configuration needed to create a new dysco-backed column.
///
/// `distribution_truncation` only applies to [`DistributionKind::TruncatedGaussian`]
/// and `student_t_nu` only to [`DistributionKind::StudentT`]; both are still
/// always present on the record so the on-disk header layout is uniform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct DyscoSpec {
  /// Bits per float in complex (data) columns, in `[1, 16]` (default: 8).
  pub data_bit_count: u32,
  /// Bits per float in weight columns, in `[1, 16]` (default: 12).
  pub weight_bit_count: u32,
  /// Assumed amplitude distribution the quantiser's dictionary is built for
  /// (default: [`DistributionKind::TruncatedGaussian`]).
  pub distribution: DistributionKind,
  /// Which block-normalisation strategy to apply (default: [`NormalizationKind::Af`]).
  pub normalization: NormalizationKind,
  /// `τ`, used only for [`DistributionKind::TruncatedGaussian`] (default: `3.0`).
  pub distribution_truncation: f64,
  /// `ν`, used only for [`DistributionKind::StudentT`] (default: `3.0`).
  pub student_t_nu: f64,
  /// After normalisation, rescale the block so its maximum absolute
  /// component exactly reaches the quantiser's maximum quantity
  /// (default: `true`).
  pub fit_to_maximum: bool,
  /// Forces a single worker thread seeded from a fixed constant, so that
  /// two runs over identical input produce byte-identical files
  /// (default: `false`).
  pub static_seed: bool,
}

impl Default for DyscoSpec {
  fn default() -> Self {
    DyscoSpec {
      data_bit_count: 8,
      weight_bit_count: 12,
      distribution: DistributionKind::TruncatedGaussian,
      normalization: NormalizationKind::Af,
      distribution_truncation: 3.0,
      student_t_nu: 3.0,
      fit_to_maximum: true,
      static_seed: false,
    }
  }
}

impl DyscoSpec {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_data_bit_count(mut self, bits: u32) -> Self {
    self.data_bit_count = bits;
    self
  }

  pub fn with_weight_bit_count(mut self, bits: u32) -> Self {
    self.weight_bit_count = bits;
    self
  }

  pub fn with_distribution(mut self, distribution: DistributionKind) -> Self {
    self.distribution = distribution;
    self
  }

  pub fn with_normalization(mut self, normalization: NormalizationKind) -> Self {
    self.normalization = normalization;
    self
  }

  pub fn with_distribution_truncation(mut self, truncation: f64) -> Self {
    self.distribution_truncation = truncation;
    self
  }

  pub fn with_student_t_nu(mut self, nu: f64) -> Self {
    self.student_t_nu = nu;
    self
  }

  pub fn with_fit_to_maximum(mut self, fit: bool) -> Self {
    self.fit_to_maximum = fit;
    self
  }

  pub fn with_static_seed(mut self, static_seed: bool) -> Self {
    self.static_seed = static_seed;
    self
  }

  /// Validates the bit counts and distribution parameters, matching the
  /// configuration errors [`crate::quantizer::Quantizer::build`] would
  /// otherwise surface lazily on first use.
  pub fn validate(&self) -> DyscoResult<()> {
    for (name, bits) in [
      ("dataBitCount", self.data_bit_count),
      ("weightBitCount", self.weight_bit_count),
    ] {
      if !(crate::constants::MIN_BITS_PER_SYMBOL..=crate::constants::MAX_BITS_PER_SYMBOL).contains(&bits) {
        return Err(DyscoError::configuration(format!(
          "{} must be in [{}, {}], was {}",
          name,
          crate::constants::MIN_BITS_PER_SYMBOL,
          crate::constants::MAX_BITS_PER_SYMBOL,
          bits,
        )));
      }
    }
    if self.distribution == DistributionKind::StudentT && self.student_t_nu <= 0.0 {
      return Err(DyscoError::configuration("studentTNu must be > 0"));
    }
    if self.distribution == DistributionKind::TruncatedGaussian && self.distribution_truncation <= 0.0 {
      return Err(DyscoError::configuration("distributionTruncation must be > 0"));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_valid() {
    assert!(DyscoSpec::new().validate().is_ok());
  }

  #[test]
  fn test_builder_chain() {
    let spec = DyscoSpec::new()
      .with_data_bit_count(10)
      .with_normalization(NormalizationKind::Rf)
      .with_static_seed(true);
    assert_eq!(spec.data_bit_count, 10);
    assert_eq!(spec.normalization, NormalizationKind::Rf);
    assert!(spec.static_seed);
  }

  #[test]
  fn test_rejects_out_of_range_bit_count() {
    let spec = DyscoSpec::new().with_data_bit_count(17);
    assert!(spec.validate().is_err());
  }

  #[test]
  fn test_rejects_non_positive_student_t_nu() {
    let spec = DyscoSpec::new()
      .with_distribution(DistributionKind::StudentT)
      .with_student_t_nu(0.0);
    assert!(spec.validate().is_err());
  }

  #[test]
  fn test_truncated_gaussian_requires_positive_truncation() {
    let spec = DyscoSpec::new()
      .with_distribution(DistributionKind::TruncatedGaussian)
      .with_distribution_truncation(-1.0);
    assert!(spec.validate().is_err());
  }
}
