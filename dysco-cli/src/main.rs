use anyhow::Result;
use clap::Parser;

use crate::opt::{Opt, OptWrapper};

mod compress;
mod inspect;
mod opt;
mod stats;
mod suggest_distribution;

/// The storage-manager flag surface this CLI reproduces uses single-dash
/// long options (`-uniform`, `-rfnormalization`, `-reorder`, ...). clap
/// itself only recognises `--long` and `-s`; rewrite any single-dash,
/// multi-letter token to double-dash before handing argv to it, so the
/// documented invocation syntax parses as the long option it names.
fn normalize_single_dash_args(args: impl Iterator<Item = String>) -> Vec<String> {
  args
    .map(|arg| {
      let mut chars = arg.chars();
      let starts_long_option = matches!(chars.next(), Some('-'))
        && !matches!(chars.next(), Some('-'))
        && arg.len() > 2;
      if starts_long_option {
        format!("-{arg}")
      } else {
        arg
      }
    })
    .collect()
}

fn main() -> Result<()> {
  let args = normalize_single_dash_args(std::env::args());
  let opt = OptWrapper::parse_from(args).opt;
  match opt {
    Opt::Compress(compress_opt) => compress::compress(compress_opt),
    Opt::Inspect(inspect_opt) => inspect::inspect(inspect_opt),
    Opt::Stats(stats_opt) => stats::stats(stats_opt),
    Opt::SuggestDistribution(opt) => suggest_distribution::suggest_distribution(opt),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_single_dash_long_option_becomes_double_dash() {
    let args = normalize_single_dash_args(["dysco".to_string(), "-uniform".to_string()].into_iter());
    assert_eq!(args, vec!["dysco", "--uniform"]);
  }

  #[test]
  fn test_already_double_dash_is_unchanged() {
    let args = normalize_single_dash_args(["dysco".to_string(), "--output".to_string()].into_iter());
    assert_eq!(args, vec!["dysco", "--output"]);
  }

  #[test]
  fn test_short_flag_and_positional_are_unchanged() {
    let args = normalize_single_dash_args(
      ["dysco".to_string(), "-h".to_string(), "input.csv".to_string()].into_iter(),
    );
    assert_eq!(args, vec!["dysco", "-h", "input.csv"]);
  }
}
