//! Buffered and random-access IO helpers shared by the dysco codec and CLI.
//!
//! This crate has no dependency on the rest of the workspace and could, in
//! principle, be used by any format with a variable-length header followed
//! by a fixed-size block region.

pub mod block_file;
pub mod buf_read;
pub mod buf_reader;

pub use block_file::BlockFile;
pub use buf_read::BetterBufRead;
pub use buf_reader::BetterBufReader;
