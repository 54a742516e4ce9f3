//! Word-addressed access to a state-dump file.
//!
//! Every scalar in the source format is one "word" of 4 or 8 bytes, depending
//! on the precision the file was written with. [`WordReader`] hides the word
//! size and the byte order behind typed reads at absolute word addresses; the
//! caller computes offsets and never relies on an implicit cursor.

use super::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Word address of the solver-version float used by the format probe.
const VERSION_WORD: u64 = 14;

/// Inclusive range of plausible solver versions.
const VERSION_RANGE: (f64, f64) = (900.0, 2000.0);

/// Floating-point width of the file's words.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Precision {
    /// 4-byte words.
    Single,
    /// 8-byte words.
    Double,
}

impl Precision {
    /// Returns the size of one word in bytes.
    #[must_use]
    pub const fn word_size(self) -> u64 {
        match self {
            Self::Single => 4,
            Self::Double => 8,
        }
    }
}

/// Byte order of the file's words.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Endianness {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

/// Precision and endianness of a file, as chosen by the format probe.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WordFormat {
    /// Word width.
    pub precision: Precision,
    /// Byte order.
    pub endianness: Endianness,
}

impl WordFormat {
    /// Returns the size of one word in bytes.
    #[must_use]
    pub const fn word_size(self) -> u64 {
        self.precision.word_size()
    }
}

macro_rules! decode_word {
    ($ty:ty, $bytes:expr, $endianness:expr) => {{
        let bytes = $bytes.try_into().unwrap_or_else(|_| unreachable!());
        match $endianness {
            Endianness::Little => <$ty>::from_le_bytes(bytes),
            Endianness::Big => <$ty>::from_be_bytes(bytes),
        }
    }};
}

/// Random-access reader over one file of a state-dump family.
///
/// All reads seek absolutely from the start of the file. A failed read does
/// not poison the reader; the next read seeks afresh.
#[derive(Debug)]
pub struct WordReader {
    file: File,
    path: PathBuf,
    format: WordFormat,
    len_bytes: u64,
}

impl WordReader {
    /// Opens `path` and detects its format by probing the version word.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if `path` does not exist,
    /// [`Error::InvalidFormat`] if the file is shorter than a control block
    /// or no (precision, endianness) combination yields a plausible version,
    /// and [`Error::Io`] for any other read failure.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (file, len_bytes) = open_file(path.as_ref())?;
        // shortest legal base file: the 64-word control block at single precision
        if len_bytes < 64 * Precision::Single.word_size() {
            return Err(Error::InvalidFormat(format!(
                "file {} is too short to hold a control block",
                path.as_ref().display()
            )));
        }
        let mut reader = Self {
            file,
            path: path.as_ref().to_path_buf(),
            format: WordFormat {
                precision: Precision::Single,
                endianness: Endianness::Little,
            },
            len_bytes,
        };
        reader.format = reader.detect_format()?;
        Ok(reader)
    }

    /// Opens a continuation file whose format is already known from the base
    /// file. No probing is performed; continuation files carry no header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if `path` does not exist and
    /// [`Error::Io`] if its length cannot be determined.
    pub fn open_with_format(path: impl AsRef<Path>, format: WordFormat) -> Result<Self> {
        let (file, len_bytes) = open_file(path.as_ref())?;
        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            format,
            len_bytes,
        })
    }

    /// Returns the detected format.
    #[must_use]
    pub const fn format(&self) -> WordFormat {
        self.format
    }

    /// Returns the file length in whole words.
    #[must_use]
    pub const fn len_words(&self) -> u64 {
        self.len_bytes / self.format.word_size()
    }

    /// Returns the solver version stored in the version word.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the version word cannot be read.
    pub fn version(&mut self) -> Result<f64> {
        self.read_f64(VERSION_WORD)
    }

    /// Reads a signed integer word at `word`.
    ///
    /// In double-precision files integer words occupy 8 bytes; the value is
    /// narrowed after decoding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the word lies past the end of the file.
    pub fn read_i32(&mut self, word: u64) -> Result<i32> {
        match self.format.precision {
            Precision::Single => {
                let mut buf = [0; 4];
                self.read_raw(word, &mut buf)?;
                Ok(decode_word!(i32, buf, self.format.endianness))
            }
            Precision::Double => {
                let mut buf = [0; 8];
                self.read_raw(word, &mut buf)?;
                Ok(decode_word!(i64, buf, self.format.endianness) as i32)
            }
        }
    }

    /// Reads a floating word at `word`, narrowed to `f32` for double files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the word lies past the end of the file.
    pub fn read_f32(&mut self, word: u64) -> Result<f32> {
        match self.format.precision {
            Precision::Single => {
                let mut buf = [0; 4];
                self.read_raw(word, &mut buf)?;
                Ok(decode_word!(f32, buf, self.format.endianness))
            }
            Precision::Double => {
                let mut buf = [0; 8];
                self.read_raw(word, &mut buf)?;
                Ok(decode_word!(f64, buf, self.format.endianness) as f32)
            }
        }
    }

    /// Reads a floating word at `word`, widened to `f64` for single files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the word lies past the end of the file.
    pub fn read_f64(&mut self, word: u64) -> Result<f64> {
        match self.format.precision {
            Precision::Single => {
                let mut buf = [0; 4];
                self.read_raw(word, &mut buf)?;
                Ok(f64::from(decode_word!(f32, buf, self.format.endianness)))
            }
            Precision::Double => {
                let mut buf = [0; 8];
                self.read_raw(word, &mut buf)?;
                Ok(decode_word!(f64, buf, self.format.endianness))
            }
        }
    }

    /// Reads `count` consecutive integer words starting at `word`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the run extends past the end of the file.
    pub fn read_i32_slice(&mut self, word: u64, count: usize) -> Result<Vec<i32>> {
        let buf = self.read_raw_words(word, count)?;
        let word_size = self.format.word_size() as usize;
        Ok(buf
            .chunks_exact(word_size)
            .map(|chunk| match self.format.precision {
                Precision::Single => decode_word!(i32, chunk, self.format.endianness),
                Precision::Double => decode_word!(i64, chunk, self.format.endianness) as i32,
            })
            .collect())
    }

    /// Reads `count` consecutive floating words starting at `word`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the run extends past the end of the file.
    pub fn read_f64_slice(&mut self, word: u64, count: usize) -> Result<Vec<f64>> {
        let buf = self.read_raw_words(word, count)?;
        let word_size = self.format.word_size() as usize;
        Ok(buf
            .chunks_exact(word_size)
            .map(|chunk| match self.format.precision {
                Precision::Single => f64::from(decode_word!(f32, chunk, self.format.endianness)),
                Precision::Double => decode_word!(f64, chunk, self.format.endianness),
            })
            .collect())
    }

    /// Reads `count` words of character data starting at `word` and decodes
    /// them as space-padded ASCII. No byte swap is applied; character words
    /// are stored in write order regardless of the file's endianness.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the run extends past the end of the file.
    pub fn read_text(&mut self, word: u64, count: usize) -> Result<String> {
        let buf = self.read_raw_words(word, count)?;
        Ok(String::from_utf8_lossy(&buf).trim().to_string())
    }

    fn read_raw(&mut self, word: u64, buf: &mut [u8]) -> Result<()> {
        let offset = word * self.format.word_size();
        if offset + buf.len() as u64 > self.len_bytes {
            return Err(Error::io(
                format!(
                    "word reader: short read at word {word} of file {}",
                    file_name(&self.path)
                ),
                std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
            ));
        }
        self.seek_and_fill(word, offset, buf)
    }

    fn read_raw_words(&mut self, word: u64, count: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0; count * self.format.word_size() as usize];
        self.read_raw(word, &mut buf)?;
        Ok(buf)
    }

    fn seek_and_fill(&mut self, word: u64, offset: u64, buf: &mut [u8]) -> Result<()> {
        let context = || {
            format!(
                "word reader: short read at word {word} of file {}",
                file_name(&self.path)
            )
        };
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|err| Error::io(context(), err))?;
        self.file
            .read_exact(buf)
            .map_err(|err| Error::io(context(), err))
    }

    /// Probes the version word under all four (precision, endianness)
    /// combinations and returns the first that yields a plausible version.
    fn detect_format(&mut self) -> Result<WordFormat> {
        const CANDIDATES: [WordFormat; 4] = [
            WordFormat {
                precision: Precision::Single,
                endianness: Endianness::Little,
            },
            WordFormat {
                precision: Precision::Single,
                endianness: Endianness::Big,
            },
            WordFormat {
                precision: Precision::Double,
                endianness: Endianness::Little,
            },
            WordFormat {
                precision: Precision::Double,
                endianness: Endianness::Big,
            },
        ];

        for candidate in CANDIDATES {
            self.format = candidate;
            if let Ok(version) = self.read_f64(VERSION_WORD) {
                if (VERSION_RANGE.0..=VERSION_RANGE.1).contains(&version) {
                    return Ok(candidate);
                }
            }
        }

        Err(Error::InvalidFormat(format!(
            "no precision/endianness combination yields a plausible version word in file {}",
            file_name(&self.path)
        )))
    }
}

fn open_file(path: &Path) -> Result<(File, u64)> {
    let file = File::open(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            Error::io(format!("word reader: open {}", path.display()), err)
        }
    })?;
    let metadata = file
        .metadata()
        .map_err(|err| Error::io(format!("word reader: stat {}", path.display()), err))?;
    if !metadata.is_file() {
        return Err(Error::io(
            format!("word reader: open {}", path.display()),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    Ok((file, metadata.len()))
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use std::io::Write;

    fn write_words_f64_le(words: &[f64]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for value in words {
            file.write_all(&value.to_le_bytes()).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn write_words_f32_be(words: &[f32]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for value in words {
            file.write_all(&value.to_be_bytes()).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn detects_double_little_endian() {
        let mut words = vec![0.0; 120];
        words[14] = 971.0;
        let file = write_words_f64_le(&words);

        let reader = WordReader::open(file.path()).unwrap();
        assert_eq!(reader.format().precision, Precision::Double);
        assert_eq!(reader.format().endianness, Endianness::Little);
    }

    #[test]
    fn detects_double_big_endian() {
        let mut words = vec![0.0_f64; 120];
        words[14] = 971.0;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for value in &words {
            file.write_all(&value.to_be_bytes()).unwrap();
        }
        file.flush().unwrap();

        let reader = WordReader::open(file.path()).unwrap();
        assert_eq!(reader.format().precision, Precision::Double);
        assert_eq!(reader.format().endianness, Endianness::Big);
    }

    #[test]
    fn detects_single_big_endian() {
        let mut words = vec![0.0_f32; 200];
        words[14] = 960.0;
        let file = write_words_f32_be(&words);

        let reader = WordReader::open(file.path()).unwrap();
        assert_eq!(reader.format().precision, Precision::Single);
        assert_eq!(reader.format().endianness, Endianness::Big);
    }

    #[test]
    fn rejects_zeroed_version_word() {
        let words = vec![0.0; 120];
        let file = write_words_f64_le(&words);

        match WordReader::open(file.path()) {
            Err(Error::InvalidFormat(_)) => {}
            other => panic!("expected InvalidFormat, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_file_not_found() {
        match WordReader::open("/nonexistent/d3plot") {
            Err(Error::FileNotFound { .. }) => {}
            other => panic!("expected FileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn widens_and_narrows_across_precisions() {
        let mut words = vec![0.0; 120];
        words[14] = 971.0;
        words[20] = 3.0;
        words[21] = -1.5;
        let file = write_words_f64_le(&words);

        let mut reader = WordReader::open(file.path()).unwrap();
        assert_eq!(reader.read_i32(20).unwrap(), 0); // integer bits of 3.0 are not 3
        assert_approx_eq!(f32, reader.read_f32(21).unwrap(), -1.5);
        assert_approx_eq!(f64, reader.read_f64(21).unwrap(), -1.5);
    }

    #[test]
    fn integer_words_in_double_files_are_eight_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for word in 0..120_i64 {
            let bytes = if word == 14 {
                971.0_f64.to_le_bytes()
            } else {
                (word * 10).to_le_bytes()
            };
            file.write_all(&bytes).unwrap();
        }
        file.flush().unwrap();

        let mut reader = WordReader::open(file.path()).unwrap();
        assert_eq!(reader.read_i32(16).unwrap(), 160);
        assert_eq!(reader.read_i32_slice(17, 3).unwrap(), vec![170, 180, 190]);
    }

    #[test]
    fn read_past_end_is_io_error() {
        let mut words = vec![0.0; 120];
        words[14] = 971.0;
        let file = write_words_f64_le(&words);

        let mut reader = WordReader::open(file.path()).unwrap();
        match reader.read_f64(120) {
            Err(Error::Io { context, .. }) => assert!(context.contains("word 120")),
            other => panic!("expected Io, got {other:?}"),
        }
        // a failed read must not poison the reader
        assert_approx_eq!(f64, reader.read_f64(14).unwrap(), 971.0);
    }

    #[test]
    fn slice_reads_apply_byte_swap() {
        let mut words = vec![0.0_f32; 120];
        words[14] = 971.0;
        words[30] = 1.0;
        words[31] = 2.0;
        let file = write_words_f32_be(&words);

        let mut reader = WordReader::open(file.path()).unwrap();
        let values = reader.read_f64_slice(30, 2).unwrap();
        assert_approx_eq!(f64, values[0], 1.0);
        assert_approx_eq!(f64, values[1], 2.0);
    }
}
