//! `dysco inspect`: prints a dysco file's header and per-column layout.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use tabled::{Table, Tabled};

use dysco::file_format::FileHeader;

#[derive(Clone, Debug, Parser)]
pub struct InspectOpt {
  pub path: PathBuf,
}

#[derive(Tabled)]
struct ColumnRow {
  index: usize,
  block_size: u32,
  antenna_count: u32,
}

#[derive(Serialize)]
struct Summary {
  filename: String,
  header_size: u32,
  rows_per_block: u32,
  antenna_count: u32,
  block_size: u32,
  data_bit_count: u8,
  weight_bit_count: u8,
  fit_to_maximum: bool,
  distribution: String,
  normalization: String,
  student_t_nu: f64,
  distribution_truncation: f64,
  column_count: usize,
}

pub fn inspect(opt: InspectOpt) -> Result<()> {
  let mut file = File::open(&opt.path)?;
  let header = FileHeader::read(&mut file)?;

  let summary = Summary {
    filename: opt.path.to_string_lossy().into_owned(),
    header_size: header.header_size,
    rows_per_block: header.rows_per_block,
    antenna_count: header.antenna_count,
    block_size: header.block_size,
    data_bit_count: header.data_bit_count,
    weight_bit_count: header.weight_bit_count,
    fit_to_maximum: header.fit_to_maximum,
    distribution: format!("{:?}", header.distribution),
    normalization: format!("{:?}", header.normalization),
    student_t_nu: header.student_t_nu,
    distribution_truncation: header.distribution_truncation,
    column_count: header.columns.len(),
  };
  println!("{}", toml::to_string_pretty(&summary)?);

  let rows: Vec<ColumnRow> = header
    .columns
    .iter()
    .enumerate()
    .map(|(index, c)| ColumnRow {
      index,
      block_size: c.block_size,
      antenna_count: c.antenna_count,
    })
    .collect();
  println!("{}", Table::new(rows));

  Ok(())
}
