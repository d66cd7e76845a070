use std::error::Error;
use std::fmt::{Display, Formatter};
use std::{fmt, io};

/// The different kinds of errors the library can return.
///
/// These correspond to the five error kinds of the codec's error handling
/// design: configuration errors are raised at construction time, format and
/// regularity errors are fatal and end the current operation, I/O errors are
/// propagated verbatim from the underlying file, and non-finite samples are
/// never an error (they are handled silently by the quantiser's sentinel
/// symbol).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
  /// Unknown distribution/normalization name, a bit count outside
  /// `[1, 16]`, or an invalid `σ`/`τ`/`ν`. Raised at construction.
  Configuration,
  /// Header magic/version mismatch, a short read, or a `blockSize` that
  /// doesn't match the size computed from the column layout.
  Format,
  /// The baseline sequence of a time-block differs from the first
  /// time-block's, or a final partial block was encountered.
  Regularity,
  /// Propagated from the underlying `Read`/`Write`/`Seek` implementation.
  Io(io::ErrorKind),
}

/// The error type used in results for all `dysco` functionality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DyscoError {
  pub kind: ErrorKind,
  pub message: String,
}

impl DyscoError {
  pub(crate) fn new<S: AsRef<str>>(kind: ErrorKind, message: S) -> Self {
    DyscoError {
      kind,
      message: message.as_ref().to_string(),
    }
  }

  pub(crate) fn configuration<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::Configuration, message)
  }

  pub(crate) fn format<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::Format, message)
  }

  pub(crate) fn regularity<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::Regularity, message)
  }
}

impl Display for DyscoError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "dysco {:?} error: {}", self.kind, &self.message)
  }
}

impl From<io::Error> for DyscoError {
  fn from(err: io::Error) -> Self {
    DyscoError {
      kind: ErrorKind::Io(err.kind()),
      message: format!("{}", err),
    }
  }
}

impl Error for DyscoError {}

pub type DyscoResult<T> = Result<T, DyscoError>;
