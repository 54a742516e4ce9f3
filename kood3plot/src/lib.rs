//! `KooD3plot` decodes the binary state-dump families written by a
//! crash/impact finite-element solver and re-encodes their mesh and
//! time-state data into a compressed, self-describing archive.
//!
//! The decoding side is a [`Decoder`]: it probes the base file's precision
//! and endianness, parses the control header and geometry, and streams the
//! time states of the whole file family. The encoding side is an
//! [`Archiver`]: it quantizes vector quantities against first-frame
//! calibration, stores later frames as temporal deltas and deflates every
//! dataset chunk.

pub mod analysis;
pub mod archive;
pub mod control;
pub mod decoder;
pub mod delta;
pub mod error;
pub mod family;
pub mod geometry;
pub mod mesh;
pub mod narbs;
pub mod quant;
pub mod state;
#[cfg(test)]
mod testfile;
pub mod validate;
pub mod words;

pub use archive::{ArchiveReader, ArchiveWriter, Archiver, CompressionOptions};
pub use control::ControlHeader;
pub use decoder::Decoder;
pub use error::{Error, Result};
pub use mesh::{BoundingBox, ElementBlock, Mesh};
pub use state::{State, StateIter};
pub use words::{Endianness, Precision, WordFormat, WordReader};
