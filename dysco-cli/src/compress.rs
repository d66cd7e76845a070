//! `dysco compress`: reads a row-oriented visibility dump and writes it out
//! as a dysco-framed file.
//!
//! Input rows are `a1,a2,time,field_id,data_desc_id,re,im,re,im,...`, one
//! complex pair per polarisation/channel slot, in `(channel, pol)` order.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use dysco::distribution::DistributionKind;
use dysco::file_format::{ColumnHeader, FileHeader};
use dysco::normalize::{NormalizationKind, Vis};
use dysco::spec::DyscoSpec;
use dysco::stman::{ColumnStorage, DataCodec, DyscoColumn, RowMeta};

/// Compress a row-oriented visibility dump into a dysco-framed file.
#[derive(Clone, Debug, Parser)]
pub struct CompressOpt {
  /// Row-oriented visibility dump; one row per line.
  pub input: PathBuf,
  /// Output path; defaults to the input path with a `.dyc` extension.
  #[arg(long)]
  pub output: Option<PathBuf>,
  #[arg(long = "n-pol", default_value_t = 1)]
  pub n_pol: usize,
  #[arg(long = "n-chan", default_value_t = 1)]
  pub n_chan: usize,
  #[arg(long = "n-antennae")]
  pub n_antennae: usize,
  #[arg(long = "data-bit-rate", default_value_t = 8)]
  pub data_bit_rate: u32,
  #[arg(long = "weight-bit-rate", default_value_t = 12)]
  pub weight_bit_rate: u32,

  /// Quantise assuming a uniform amplitude distribution.
  #[arg(long, conflicts_with_all = ["gaussian", "truncgaus", "studentt"])]
  pub uniform: bool,
  /// Quantise assuming a Gaussian amplitude distribution.
  #[arg(long, conflicts_with_all = ["uniform", "truncgaus", "studentt"])]
  pub gaussian: bool,
  /// Quantise assuming a Gaussian truncated at SIGMA standard deviations.
  #[arg(long, value_name = "SIGMA", conflicts_with_all = ["uniform", "gaussian", "studentt"])]
  pub truncgaus: Option<f64>,
  /// Quantise assuming a Student's t distribution with NU degrees of freedom.
  #[arg(long, value_name = "NU", conflicts_with_all = ["uniform", "gaussian", "truncgaus"])]
  pub studentt: Option<f64>,

  /// Normalise each baseline/channel/polarisation's gain independently.
  #[arg(long, conflicts_with_all = ["afnormalization", "rownormalization"])]
  pub rfnormalization: bool,
  /// Normalise per antenna-pair/channel gain (default).
  #[arg(long, conflicts_with_all = ["rfnormalization", "rownormalization"])]
  pub afnormalization: bool,
  /// Normalise per row.
  #[arg(long, conflicts_with_all = ["rfnormalization", "afnormalization"])]
  pub rownormalization: bool,

  /// Name of a column to compress; repeatable. This CLI only ever compresses
  /// a single synthetic data column, so the value is accepted but unused.
  #[arg(long = "column", value_name = "NAME")]
  pub column: Vec<String>,
  /// Reorder rows for better locality before compressing. Not implemented by
  /// this CLI; accepted so the flag surface matches the storage manager's.
  #[arg(long)]
  pub reorder: bool,

  #[arg(long = "static-seed")]
  pub static_seed: bool,
}

impl CompressOpt {
  fn distribution(&self) -> (DistributionKind, f64, f64) {
    let defaults = DyscoSpec::default();
    if self.uniform {
      (DistributionKind::Uniform, defaults.distribution_truncation, defaults.student_t_nu)
    } else if self.gaussian {
      (DistributionKind::Gaussian, defaults.distribution_truncation, defaults.student_t_nu)
    } else if let Some(sigma) = self.truncgaus {
      (DistributionKind::TruncatedGaussian, sigma, defaults.student_t_nu)
    } else if let Some(nu) = self.studentt {
      (DistributionKind::StudentT, defaults.distribution_truncation, nu)
    } else {
      (defaults.distribution, defaults.distribution_truncation, defaults.student_t_nu)
    }
  }

  fn normalization(&self) -> NormalizationKind {
    if self.rfnormalization {
      NormalizationKind::Rf
    } else if self.rownormalization {
      NormalizationKind::Row
    } else if self.afnormalization {
      NormalizationKind::Af
    } else {
      DyscoSpec::default().normalization
    }
  }
}

fn parse_row(line: &str, n_values: usize) -> Result<(RowMeta, Vec<Vis>)> {
  let fields: Vec<&str> = line.split(',').collect();
  let expected = 5 + 2 * n_values;
  if fields.len() != expected {
    return Err(anyhow!(
      "row has {} fields, expected {} (5 metadata + {} for {} complex values)",
      fields.len(),
      expected,
      2 * n_values,
      n_values,
    ));
  }
  let meta = RowMeta {
    antenna1: fields[0].parse()?,
    antenna2: fields[1].parse()?,
    time: fields[2].parse()?,
    field_id: fields[3].parse()?,
    data_desc_id: fields[4].parse()?,
  };
  let mut data = Vec::with_capacity(n_values);
  for i in 0..n_values {
    let re: f32 = fields[5 + 2 * i].parse()?;
    let im: f32 = fields[5 + 2 * i + 1].parse()?;
    data.push(Vis::new(re, im));
  }
  Ok((meta, data))
}

pub fn compress(opt: CompressOpt) -> Result<()> {
  let output = opt.output.clone().unwrap_or_else(|| opt.input.with_extension("dyc"));
  let (distribution, distribution_truncation, student_t_nu) = opt.distribution();
  let normalization = opt.normalization();

  let spec = DyscoSpec::new()
    .with_data_bit_count(opt.data_bit_rate)
    .with_weight_bit_count(opt.weight_bit_rate)
    .with_distribution(distribution)
    .with_distribution_truncation(distribution_truncation)
    .with_student_t_nu(student_t_nu)
    .with_normalization(normalization)
    .with_static_seed(opt.static_seed);
  spec.validate()?;

  let mut header = FileHeader {
    header_size: 0,
    column_header_offset: 0,
    rows_per_block: 0,
    antenna_count: opt.n_antennae as u32,
    block_size: 0,
    data_bit_count: spec.data_bit_count as u8,
    weight_bit_count: spec.weight_bit_count as u8,
    fit_to_maximum: spec.fit_to_maximum,
    distribution: spec.distribution,
    normalization: spec.normalization,
    student_t_nu: spec.student_t_nu,
    distribution_truncation: spec.distribution_truncation,
    columns: vec![ColumnHeader {
      block_size: 0,
      antenna_count: opt.n_antennae as u32,
    }],
  };
  let mut header_bytes = Vec::new();
  header.write(&mut header_bytes)?;
  header.header_size = header_bytes.len() as u32;

  let file = OpenOptions::new().write(true).create(true).truncate(true).open(&output)?;
  {
    let mut f = &file;
    header.write(&mut f)?;
  }

  let n_pol = opt.n_pol;
  let n_chan = opt.n_chan;
  let codec = DataCodec::new(&spec, n_pol, n_chan)?;
  let mut column: DyscoColumn<Vis, DataCodec, File> = DyscoColumn::create(
    codec,
    n_pol,
    n_chan,
    opt.n_antennae,
    header.header_size as u64,
    file,
    spec.static_seed,
  );

  let reader = BufReader::new(File::open(&opt.input)?);
  let mut row_index = 0_usize;
  for line in reader.lines() {
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }
    let (meta, data) = parse_row(&line, n_pol * n_chan)?;
    column.put_array(row_index, meta, &data)?;
    row_index += 1;
  }
  column.flush()?;

  if let (Some(rows_per_block), Some(block_size)) = (column.rows_per_block(), column.block_size()) {
    header.rows_per_block = rows_per_block as u32;
    header.block_size = block_size as u32;
    header.columns = vec![ColumnHeader {
      block_size: block_size as u32,
      antenna_count: opt.n_antennae as u32,
    }];
    let mut f = OpenOptions::new().write(true).open(&output)?;
    header.write(&mut f)?;
  }

  println!("wrote {} rows to {}", row_index, output.display());
  Ok(())
}
