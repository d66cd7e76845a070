//! Lossy stochastic compression for radio-interferometric visibility data.
//!
//! The codec quantises floating-point visibilities onto a small dictionary
//! of symbols tuned to an assumed amplitude distribution, using random
//! dithering to remove the quantisation bias that a naive round-to-nearest
//! scheme would introduce. Visibilities are grouped into time-blocks, each
//! normalised independently by one of three strategies (AF, RF, Row) before
//! quantisation, then packed into a fixed-width bitstream and framed into a
//! single file alongside the tables needed to reverse the process.
//!
//! This crate implements the codec itself; [`stman`] is the seam an outer
//! columnar table storage manager plugs into.

#![deny(clippy::unused_unit)]

pub use errors::{DyscoError, DyscoResult, ErrorKind};

pub mod block_codec;
pub mod cache;
pub mod distribution;
pub mod errors;
pub mod file_format;
pub mod normalize;
pub mod packer;
pub mod quantizer;
pub mod spec;
pub mod stman;
pub mod time_block;

mod constants;
