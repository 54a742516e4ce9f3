//! Error types shared by the decoder and the archive.

use std::path::PathBuf;
use thiserror::Error;

/// Catch-all error for this crate.
///
/// Messages are stable: callers may surface them verbatim. Variants that
/// originate in file I/O carry the component and word offset at which the
/// operation failed.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested file does not exist.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path that was requested.
        path: PathBuf,
    },
    /// A read or seek failed.
    #[error("{context}: {source}")]
    Io {
        /// Component and offset, e.g. `"state decoder: short read at word 12 of file d3plot03"`.
        context: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// The format probe failed or a header value is outside the format's domain.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    /// The version word is in range but selects a known-incompatible code path.
    #[error("unsupported solver version {0}")]
    UnsupportedVersion(f64),
    /// Declared sizes are inconsistent with the file contents.
    #[error("corrupted data: {0}")]
    CorruptedData(String),
    /// A quantizer was asked to encode or decode before `calibrate`.
    #[error("{0} quantizer used before calibration")]
    NotCalibrated(&'static str),
    /// A time-step index beyond the archive's `num_timesteps`.
    #[error("time step {index} is out of range, the archive has {len} time steps")]
    OutOfRange {
        /// Requested time-step index.
        index: usize,
        /// Number of time steps present.
        len: usize,
    },
}

impl Error {
    /// Wraps an I/O error with the component and offset it occurred at.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
