//! The self-describing archive: layout, writer and reader.
//!
//! The archive holds `/mesh` plus one `/states/timestep_<k>` group per time
//! step. Dataset names, shapes, dtypes and attribute names are the format
//! contract; the physical container is a deflate-chunked group tree behind a
//! short magic prefix.

pub mod layout;
pub mod reader;
pub mod writer;

pub use layout::{Attr, Dataset, Dtype, Group};
pub use reader::ArchiveReader;
pub use writer::{Archiver, ArchiveWriter};

/// Magic prefix of an archive file.
pub(crate) const MAGIC: &[u8; 4] = b"KD3A";

/// Value of the root `format` attribute.
pub const FORMAT_TAG: &str = "KooD3plot Archive v1";

/// Compression pipeline configuration.
#[derive(Clone, Copy, Debug)]
pub struct CompressionOptions {
    /// Quantize vector quantities to 16-bit before storage.
    pub use_quantization: bool,
    /// Store frames after the first as deltas on the quantized payloads.
    pub use_delta_compression: bool,
    /// DEFLATE level for dataset chunks, 0 disables.
    pub gzip_level: u32,
    /// Target absolute displacement precision.
    pub displacement_precision: f64,
    /// Accuracy floor for logarithmically quantized stress.
    pub stress_threshold: f64,
    /// Target absolute strain precision.
    pub strain_precision: f64,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self::balanced()
    }
}

impl CompressionOptions {
    /// Raw storage without deflate.
    #[must_use]
    pub const fn none() -> Self {
        let mut options = Self::balanced();
        options.use_quantization = false;
        options.use_delta_compression = false;
        options.gzip_level = 0;
        options
    }

    /// Raw storage with deflate.
    #[must_use]
    pub const fn lossless() -> Self {
        let mut options = Self::balanced();
        options.use_quantization = false;
        options.use_delta_compression = false;
        options
    }

    /// Quantization, temporal deltas and moderate deflate.
    #[must_use]
    pub const fn balanced() -> Self {
        Self {
            use_quantization: true,
            use_delta_compression: true,
            gzip_level: 6,
            displacement_precision: 0.01,
            stress_threshold: 0.1,
            strain_precision: 1e-4,
        }
    }

    /// Quantization, temporal deltas and the strongest deflate.
    #[must_use]
    pub const fn maximum() -> Self {
        let mut options = Self::balanced();
        options.gzip_level = 9;
        options
    }
}
