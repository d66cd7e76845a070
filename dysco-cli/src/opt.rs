use clap::{Parser, Subcommand};

use crate::compress::CompressOpt;
use crate::inspect::InspectOpt;
use crate::stats::StatsOpt;
use crate::suggest_distribution::SuggestDistributionOpt;

#[derive(Clone, Debug, Parser)]
#[command(about = "compress, inspect, and report on dysco-encoded visibility data")]
pub struct OptWrapper {
  #[command(subcommand)]
  pub opt: Opt,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Opt {
  Compress(CompressOpt),
  Inspect(InspectOpt),
  Stats(StatsOpt),
  SuggestDistribution(SuggestDistributionOpt),
}
