//! `dysco suggest-distribution`: recommends a quantiser distribution from a
//! sample of real amplitudes.

use anyhow::Result;
use clap::Parser;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use dysco::distribution::{best_fit, Histogram};

#[derive(Clone, Debug, Parser)]
pub struct SuggestDistributionOpt {
  /// Row-oriented visibility dump, same format as `compress`'s input.
  pub input: PathBuf,
  #[arg(long = "n-pol", default_value_t = 1)]
  pub n_pol: usize,
  #[arg(long = "n-chan", default_value_t = 1)]
  pub n_chan: usize,
  /// Name of the column to analyse. This CLI only ever reads a single
  /// synthetic data column, so the value is accepted but unused.
  #[arg(long = "column", value_name = "NAME")]
  pub column: Option<String>,
}

pub fn suggest_distribution(opt: SuggestDistributionOpt) -> Result<()> {
  let reader = BufReader::new(File::open(&opt.input)?);
  let n_values = opt.n_pol * opt.n_chan;
  let mut amplitudes = Vec::new();

  for line in reader.lines() {
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }
    let fields: Vec<&str> = line.split(',').collect();
    for i in 0..n_values {
      let re: f64 = fields[5 + 2 * i].parse()?;
      let im: f64 = fields[5 + 2 * i + 1].parse()?;
      let amplitude = (re * re + im * im).sqrt();
      if amplitude.is_finite() {
        amplitudes.push(amplitude);
      }
    }
  }

  let kind = best_fit(&amplitudes)?;
  let mean_amplitude = amplitudes.iter().sum::<f64>() / amplitudes.len().max(1) as f64;
  println!("suggested distribution: {:?}", kind);
  println!("mean amplitude (use as an initial sigma estimate): {:.6}", mean_amplitude);

  let max_amplitude = amplitudes.iter().cloned().fold(0.0_f64, f64::max);
  if max_amplitude > 0.0 {
    let mut histogram = Histogram::new(0.0, max_amplitude, 32);
    for amplitude in &amplitudes {
      histogram.include(*amplitude);
    }
    for i in 0..histogram.len() {
      println!("bin {:>2} (x ~ {:.4}): {}", i, histogram.bin_x(i), histogram[i]);
    }
  }

  Ok(())
}
