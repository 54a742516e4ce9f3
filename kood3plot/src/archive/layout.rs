//! On-disk building blocks of the archive: attributes, typed datasets and
//! nested groups.
//!
//! A dataset's payload is split into chunks along its first axis and each
//! chunk is DEFLATE-compressed independently at the configured level
//! (level 0 stores chunks verbatim). The tree of groups is serialized as one
//! bincode document behind a short magic prefix.

use super::super::error::{Error, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// First-axis chunk size for multi-row datasets.
pub const CHUNK_ROWS: usize = 10_000;

/// A scalar or small-vector annotation on a group or dataset.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Attr {
    /// Integer attribute.
    Int(i64),
    /// Floating attribute.
    Float(f64),
    /// Text attribute.
    Text(String),
}

impl Attr {
    /// Returns the integer value, if this is an integer attribute.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the floating value, if this is a floating attribute.
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the text value, if this is a text attribute.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

/// Element type of a dataset.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Dtype {
    /// 64-bit float.
    F64,
    /// 32-bit signed integer.
    I32,
    /// 16-bit unsigned integer.
    U16,
    /// 16-bit signed integer.
    I16,
}

impl Dtype {
    const fn element_size(self) -> usize {
        match self {
            Self::F64 => 8,
            Self::I32 => 4,
            Self::U16 | Self::I16 => 2,
        }
    }
}

/// Element types a dataset can hold. Sealed to the four wire types.
pub trait Element: Copy {
    /// The dataset dtype tag for this element type.
    const DTYPE: Dtype;

    /// Appends the little-endian encoding of `self`.
    fn write_le(self, out: &mut Vec<u8>);

    /// Decodes one element from its little-endian encoding.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: Dtype = $dtype;

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                Self::from_le_bytes(bytes.try_into().unwrap_or_else(|_| unreachable!()))
            }
        }
    };
}

impl_element!(f64, Dtype::F64);
impl_element!(i32, Dtype::I32);
impl_element!(u16, Dtype::U16);
impl_element!(i16, Dtype::I16);

/// A typed, shaped, chunked and optionally deflated array.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Dataset {
    dtype: Dtype,
    shape: Vec<usize>,
    chunk_rows: usize,
    deflate_level: u32,
    chunks: Vec<Vec<u8>>,
}

impl Dataset {
    /// Builds a dataset from `values` in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not fill `shape` exactly.
    pub fn build<T: Element>(values: &[T], shape: &[usize], deflate_level: u32) -> Result<Self> {
        assert_eq!(
            values.len(),
            shape.iter().product::<usize>(),
            "dataset values must fill the declared shape"
        );
        let row_len: usize = shape.iter().skip(1).product::<usize>().max(1);
        let rows = shape.first().copied().unwrap_or(0);
        let chunk_rows = rows.min(CHUNK_ROWS).max(1);

        let mut chunks = Vec::new();
        for chunk in values.chunks(chunk_rows * row_len) {
            let mut raw = Vec::with_capacity(chunk.len() * T::DTYPE.element_size());
            for &value in chunk {
                value.write_le(&mut raw);
            }
            chunks.push(compress(&raw, deflate_level)?);
        }

        Ok(Self {
            dtype: T::DTYPE,
            shape: shape.to_vec(),
            chunk_rows,
            deflate_level,
            chunks,
        })
    }

    /// Returns the dataset shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the element type.
    #[must_use]
    pub const fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Decodes the full payload in row-major order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptedData`] if `T` does not match the stored
    /// dtype or a chunk fails to inflate to its expected size.
    pub fn values<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(Error::CorruptedData(format!(
                "archive reader: dataset holds {:?} elements, {:?} requested",
                self.dtype,
                T::DTYPE
            )));
        }
        let element_size = self.dtype.element_size();
        let total = self.shape.iter().product::<usize>();

        let mut values = Vec::with_capacity(total);
        for chunk in &self.chunks {
            let raw = decompress(chunk, self.deflate_level)?;
            if raw.len() % element_size != 0 {
                return Err(Error::CorruptedData(
                    "archive reader: chunk length is not a whole number of elements".to_string(),
                ));
            }
            values.extend(raw.chunks_exact(element_size).map(T::read_le));
        }
        if values.len() != total {
            return Err(Error::CorruptedData(format!(
                "archive reader: dataset of shape {:?} inflated to {} elements",
                self.shape,
                values.len()
            )));
        }
        Ok(values)
    }
}

fn compress(raw: &[u8], deflate_level: u32) -> Result<Vec<u8>> {
    if deflate_level == 0 {
        return Ok(raw.to_vec());
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(deflate_level));
    encoder
        .write_all(raw)
        .and_then(|()| encoder.finish())
        .map_err(|err| Error::io("archive writer: deflate".to_string(), err))
}

fn decompress(chunk: &[u8], deflate_level: u32) -> Result<Vec<u8>> {
    if deflate_level == 0 {
        return Ok(chunk.to_vec());
    }
    let mut raw = Vec::new();
    ZlibDecoder::new(chunk)
        .read_to_end(&mut raw)
        .map_err(|_| Error::CorruptedData("archive reader: chunk failed to inflate".to_string()))?;
    Ok(raw)
}

/// A node of the archive tree: attributes, datasets and child groups.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Group {
    attrs: BTreeMap<String, Attr>,
    datasets: BTreeMap<String, Dataset>,
    groups: BTreeMap<String, Group>,
}

impl Group {
    /// Sets or replaces an attribute.
    pub fn set_attr(&mut self, name: &str, attr: Attr) {
        self.attrs.insert(name.to_string(), attr);
    }

    /// Returns an attribute by name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.get(name)
    }

    /// Returns an attribute, or [`Error::CorruptedData`] naming it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptedData`] when the attribute is absent.
    pub fn expect_attr(&self, name: &str) -> Result<&Attr> {
        self.attr(name).ok_or_else(|| {
            Error::CorruptedData(format!("archive reader: missing attribute {name}"))
        })
    }

    /// Inserts or replaces a dataset.
    pub fn set_dataset(&mut self, name: &str, dataset: Dataset) {
        self.datasets.insert(name.to_string(), dataset);
    }

    /// Returns a dataset by name.
    #[must_use]
    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    /// Returns a dataset, or [`Error::CorruptedData`] naming it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptedData`] when the dataset is absent.
    pub fn expect_dataset(&self, name: &str) -> Result<&Dataset> {
        self.dataset(name).ok_or_else(|| {
            Error::CorruptedData(format!("archive reader: missing dataset {name}"))
        })
    }

    /// Returns the child group `name`, creating it if needed.
    pub fn ensure_group(&mut self, name: &str) -> &mut Self {
        self.groups.entry(name.to_string()).or_default()
    }

    /// Returns a child group by name.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Self> {
        self.groups.get(name)
    }

    /// Returns a child group, or [`Error::CorruptedData`] naming it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptedData`] when the group is absent.
    pub fn expect_group(&self, name: &str) -> Result<&Self> {
        self.group(name)
            .ok_or_else(|| Error::CorruptedData(format!("archive reader: missing group {name}")))
    }
}
