//! `dysco stats`: per-baseline RMS diagnostic dump over a row-oriented
//! visibility dump. Read-only and not part of the codec core.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tabled::{Table, Tabled};

#[derive(Clone, Debug, Parser)]
pub struct StatsOpt {
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

#[derive(Tabled)]
struct BaselineRow {
  antenna1: usize,
  antenna2: usize,
  n_samples: usize,
  rms: f64,
}

pub fn stats(opt: StatsOpt) -> Result<()> {
  let reader = BufReader::new(File::open(&opt.input)?);
  let n_values = opt.n_pol * opt.n_chan;
  let mut sums: BTreeMap<(usize, usize), (f64, usize)> = BTreeMap::new();

  for line in reader.lines() {
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }
    let fields: Vec<&str> = line.split(',').collect();
    let expected = 5 + 2 * n_values;
    if fields.len() != expected {
      return Err(anyhow!("row has {} fields, expected {}", fields.len(), expected));
    }
    let a1: usize = fields[0].parse()?;
    let a2: usize = fields[1].parse()?;
    if a1 == a2 {
      continue;
    }
    let key = (a1.min(a2), a1.max(a2));
    let entry = sums.entry(key).or_insert((0.0, 0));
    for i in 0..n_values {
      let re: f64 = fields[5 + 2 * i].parse()?;
      let im: f64 = fields[5 + 2 * i + 1].parse()?;
      if re.is_finite() && im.is_finite() {
        entry.0 += re * re + im * im;
        entry.1 += 1;
      }
    }
  }

  let rows: Vec<BaselineRow> = sums
    .into_iter()
    .map(|((antenna1, antenna2), (sum_sq, count))| BaselineRow {
      antenna1,
      antenna2,
      n_samples: count,
      rms: if count == 0 { 0.0 } else { (sum_sq / count as f64).sqrt() },
    })
    .collect();

  println!("{}", Table::new(rows));
  Ok(())
}
