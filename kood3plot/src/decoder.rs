//! Decoder facade: one open call, then header, mesh and states.

use super::control::ControlHeader;
use super::error::{Error, Result};
use super::family::FileFamily;
use super::geometry;
use super::mesh::Mesh;
use super::state::{read_family_states_parallel, State, StateIter};
use super::words::{WordFormat, WordReader};
use std::path::Path;
use std::sync::atomic::AtomicBool;

/// Dimension codes the state layout is defined for.
const SUPPORTED_NDIM: [i32; 4] = [3, 4, 5, 7];

/// Decoder over one state-dump family.
///
/// Opening probes the base file's format and parses the control header; the
/// mesh and the state stream are decoded on demand.
#[derive(Debug)]
pub struct Decoder {
    family: FileFamily,
    reader: WordReader,
    header: ControlHeader,
    version: f64,
}

impl Decoder {
    /// Opens the family rooted at `base_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] or [`Error::Io`] if the base file is
    /// unreadable, [`Error::InvalidFormat`] if the format probe fails,
    /// [`Error::UnsupportedVersion`] if the file's dimension code selects a
    /// layout this decoder does not define, and [`Error::CorruptedData`] for
    /// inconsistent header counts.
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self> {
        let family = FileFamily::discover(base_path.as_ref());
        let mut reader = WordReader::open(base_path.as_ref())?;
        let version = reader.version()?;
        let header = ControlHeader::parse(&mut reader)?;

        if !SUPPORTED_NDIM.contains(&header.ndim) {
            return Err(Error::UnsupportedVersion(version));
        }

        Ok(Self {
            family,
            reader,
            header,
            version,
        })
    }

    /// Returns the decoded control header.
    #[must_use]
    pub const fn header(&self) -> &ControlHeader {
        &self.header
    }

    /// Returns the detected word format of the family.
    #[must_use]
    pub const fn format(&self) -> WordFormat {
        self.reader.format()
    }

    /// Returns the solver version from the base file's probe word.
    #[must_use]
    pub const fn version(&self) -> f64 {
        self.version
    }

    /// Returns the file family backing this decoder.
    #[must_use]
    pub const fn family(&self) -> &FileFamily {
        &self.family
    }

    /// Decodes the geometry section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on short reads and [`Error::CorruptedData`] if
    /// the arbitrary-ID region overruns its declared size.
    pub fn read_mesh(&mut self) -> Result<Mesh> {
        geometry::parse_mesh(&mut self.reader, &self.header)
    }

    /// Returns a lazy iterator over every state of the family, in wall-clock
    /// order. Each call opens fresh reader handles, so iterators are
    /// independent of the decoder and of each other.
    #[must_use]
    pub fn states(&self) -> StateIter {
        StateIter::new(
            self.header.clone(),
            self.reader.format(),
            self.family.files().to_vec(),
        )
    }

    /// Reads every state of the family sequentially.
    ///
    /// # Errors
    ///
    /// Returns the first decode error encountered.
    pub fn read_all_states(&self) -> Result<Vec<State>> {
        self.states().collect()
    }

    /// Reads every state of the family, continuation files in parallel.
    /// `workers` bounds the pool; `None` uses the host's concurrency hint.
    ///
    /// # Errors
    ///
    /// Returns an error only for base-file failures; a continuation-file
    /// failure truncates the result at that file.
    pub fn read_all_states_parallel(&self, workers: Option<usize>) -> Result<Vec<State>> {
        read_family_states_parallel(
            &self.family,
            &self.header,
            self.reader.format(),
            workers,
            None,
        )
    }

    /// As [`read_all_states_parallel`](Self::read_all_states_parallel), with
    /// a cancellation token observed at file granularity.
    ///
    /// # Errors
    ///
    /// Returns an error only for base-file failures.
    pub fn read_all_states_cancellable(
        &self,
        workers: Option<usize>,
        cancel: &AtomicBool,
    ) -> Result<Vec<State>> {
        read_family_states_parallel(
            &self.family,
            &self.header,
            self.reader.format(),
            workers,
            Some(cancel),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testfile::DumpBuilder;
    use float_cmp::assert_approx_eq;

    #[test]
    fn open_reads_header_and_mesh_and_states() {
        let mut builder = DumpBuilder::new();
        builder.control.numnp = 2;
        builder.control.iu = 1;
        builder.nodes(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
        builder.add_state(0.25, |index| index as f64);
        builder.end_marker();
        let file = builder.write();

        let mut decoder = Decoder::open(file.path()).unwrap();
        assert_approx_eq!(f64, decoder.version(), 971.0);
        assert_eq!(decoder.header().numnp, 2);

        let mesh = decoder.read_mesh().unwrap();
        assert_eq!(mesh.num_nodes(), 2);

        let states = decoder.read_all_states().unwrap();
        assert_eq!(states.len(), 1);
        assert_approx_eq!(f64, states[0].time, 0.25);
    }

    #[test]
    fn unsupported_dimension_code_is_rejected() {
        let mut builder = DumpBuilder::new();
        builder.control.ndim = 6;
        builder.control.numnp = 1;
        builder.nodes(&[[0.0, 0.0, 0.0]]);
        let file = builder.write();

        match Decoder::open(file.path()) {
            Err(Error::UnsupportedVersion(_)) => {}
            other => panic!("expected UnsupportedVersion, got {other:?}"),
        }
    }

    #[test]
    fn time_is_monotone_across_the_family() {
        let mut builder = DumpBuilder::new();
        builder.control.numnp = 1;
        builder.control.iu = 1;
        builder.nodes(&[[0.0, 0.0, 0.0]]);
        for step in 0..4 {
            builder.add_state(f64::from(step) * 0.5, |_| 0.0);
        }
        let file = builder.write();

        let decoder = Decoder::open(file.path()).unwrap();
        let times: Vec<f64> = decoder
            .read_all_states()
            .unwrap()
            .iter()
            .map(|state| state.time)
            .collect();
        assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
