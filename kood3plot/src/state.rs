//! Time-state decoding across a file family.
//!
//! A state slot is `1 + nglbv + nodal + element + deletion` words; the size
//! is computed once from the control header and reused for every slot. The
//! base file's states follow its geometry section; continuation files hold
//! nothing but states from word 0.

use super::control::ControlHeader;
use super::error::{Error, Result};
use super::family::FileFamily;
use super::words::{file_name, WordFormat, WordReader};
use ndarray::Array2;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Sentinel time value terminating the state stream within a file.
pub const END_OF_STATES: f64 = -999_999.0;

/// Tolerance for matching the sentinel once it has passed through the file's
/// floating width.
const END_TOLERANCE: f64 = 1e-6;

/// One decoded time step.
#[derive(Clone, Debug, Default)]
pub struct State {
    /// Simulation time of this step.
    pub time: f64,
    /// Global state variables, `nglbv` of them.
    pub global_vars: Vec<f64>,
    /// Per-node temperature block, flattened; empty when absent.
    pub temperatures: Vec<f64>,
    /// Node displacements, shape `[num_nodes, 3]`; `None` when absent.
    pub displacements: Option<Array2<f64>>,
    /// Node velocities, shape `[num_nodes, 3]`; `None` when absent.
    pub velocities: Option<Array2<f64>>,
    /// Node accelerations, shape `[num_nodes, 3]`; `None` when absent.
    pub accelerations: Option<Array2<f64>>,
    /// Solid state variables, `nv3d` per element.
    pub solid_data: Vec<f64>,
    /// Thick-shell state variables, `nv3dt` per element.
    pub thick_shell_data: Vec<f64>,
    /// Beam state variables, `nv1d` per element.
    pub beam_data: Vec<f64>,
    /// Shell state variables, `nv2d` per element.
    pub shell_data: Vec<f64>,
}

/// Decodes the state slot at `offset`. The caller has already verified that
/// the slot fits in the file and that its time word is not the sentinel.
fn read_state(reader: &mut WordReader, header: &ControlHeader, mut offset: u64) -> Result<State> {
    let mut state = State {
        time: reader.read_f64(offset)?,
        ..State::default()
    };
    offset += 1;

    let mut read_block = |offset: &mut u64, count: u64| -> Result<Vec<f64>> {
        let values = reader.read_f64_slice(*offset, count as usize)?;
        *offset += count;
        Ok(values)
    };

    state.global_vars = read_block(&mut offset, i64::from(header.nglbv).unsigned_abs())?;

    let num_nodes = header.numnp.max(0) as u64;
    let ndim = header.effective_ndim().max(0) as u64;
    if header.it > 0 {
        let per_node = i64::from(header.it + header.temperature_extra()).unsigned_abs();
        state.temperatures = read_block(&mut offset, per_node * num_nodes)?;
    }

    let mut read_vectors = |offset: &mut u64, present: i32| -> Result<Option<Array2<f64>>> {
        if present <= 0 {
            return Ok(None);
        }
        let values = reader.read_f64_slice(*offset, (ndim * num_nodes) as usize)?;
        *offset += ndim * num_nodes;
        let table = Array2::from_shape_vec((num_nodes as usize, ndim as usize), values)
            .unwrap_or_else(|_| unreachable!());
        Ok(Some(table))
    };
    state.displacements = read_vectors(&mut offset, header.iu)?;
    state.velocities = read_vectors(&mut offset, header.iv)?;
    state.accelerations = read_vectors(&mut offset, header.ia)?;

    let mut read_element_block = |offset: &mut u64, count: i32, vars: i32| -> Result<Vec<f64>> {
        let words = (i64::from(count.abs()) * i64::from(vars)).unsigned_abs();
        let values = reader.read_f64_slice(*offset, words as usize)?;
        *offset += words;
        Ok(values)
    };
    state.solid_data = read_element_block(&mut offset, header.nel8, header.nv3d)?;
    state.thick_shell_data = read_element_block(&mut offset, header.nelt, header.nv3dt)?;
    state.beam_data = read_element_block(&mut offset, header.nel2, header.nv1d)?;
    state.shell_data = read_element_block(&mut offset, header.nel4, header.nv2d)?;

    // deletion words are carried in the slot but not modeled
    Ok(state)
}

/// Returns `true` if the slot at `offset` ends the stream of `reader`'s file:
/// the slot would overrun the file, its time word is the sentinel, or the
/// time word does not decode to a finite value.
fn stream_ends(reader: &mut WordReader, header: &ControlHeader, offset: u64) -> Result<bool> {
    if offset >= reader.len_words() || offset + header.state_word_count() > reader.len_words() {
        return Ok(true);
    }
    let time = reader.read_f64(offset)?;
    Ok(!time.is_finite() || (time - END_OF_STATES).abs() < END_TOLERANCE)
}

/// Reads every state in one file starting at `start`.
pub(crate) fn read_file_states(
    reader: &mut WordReader,
    header: &ControlHeader,
    start: u64,
) -> Result<Vec<State>> {
    let slot = header.state_word_count();
    let mut states = Vec::new();
    let mut offset = start;
    while !stream_ends(reader, header, offset)? {
        states.push(read_state(reader, header, offset)?);
        offset += slot;
    }
    Ok(states)
}

fn read_continuation_states(
    path: &Path,
    header: &ControlHeader,
    format: WordFormat,
) -> Result<Vec<State>> {
    let mut reader = WordReader::open_with_format(path, format)?;
    read_file_states(&mut reader, header, 0).map_err(|err| match err {
        Error::Io { context, source } => Error::Io {
            context: format!("state decoder: {context} ({})", file_name(path)),
            source,
        },
        other => other,
    })
}

/// Lazy iterator over the states of a file family, in wall-clock order.
///
/// Files are opened on demand and one state is decoded per step, so the
/// stream is never materialized. The first error ends the iteration.
pub struct StateIter {
    header: ControlHeader,
    format: WordFormat,
    files: Vec<PathBuf>,
    next_file: usize,
    cursor: Option<(WordReader, u64)>,
    done: bool,
}

impl StateIter {
    pub(crate) fn new(header: ControlHeader, format: WordFormat, files: Vec<PathBuf>) -> Self {
        Self {
            header,
            format,
            files,
            next_file: 0,
            cursor: None,
            done: false,
        }
    }

    fn advance(&mut self) -> Result<Option<State>> {
        loop {
            if self.cursor.is_none() {
                let Some(path) = self.files.get(self.next_file) else {
                    return Ok(None);
                };
                let start = if self.next_file == 0 {
                    self.header.state_start()
                } else {
                    0
                };
                self.next_file += 1;
                self.cursor = Some((WordReader::open_with_format(path, self.format)?, start));
            }

            let (reader, offset) = self.cursor.as_mut().unwrap_or_else(|| unreachable!());
            if stream_ends(reader, &self.header, *offset)? {
                self.cursor = None;
                continue;
            }
            let state = read_state(reader, &self.header, *offset)?;
            *offset += self.header.state_word_count();
            return Ok(Some(state));
        }
    }
}

impl Iterator for StateIter {
    type Item = Result<State>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(state)) => Some(Ok(state)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Reads every state of a family, fanning the continuation files out over a
/// worker pool. One reader handle per worker; results are joined in
/// file-index order regardless of completion order, and a failing file
/// truncates the aggregate at its index while earlier states are kept.
///
/// Workers observe `cancel` cooperatively at file granularity: a file whose
/// worker sees the token raised contributes nothing and ends the aggregate.
///
/// # Errors
///
/// Returns an error only for failures in the base file; continuation-file
/// failures truncate instead.
pub fn read_family_states_parallel(
    family: &FileFamily,
    header: &ControlHeader,
    format: WordFormat,
    workers: Option<usize>,
    cancel: Option<&AtomicBool>,
) -> Result<Vec<State>> {
    let files = family.files();
    let Some(base) = files.first() else {
        return Ok(Vec::new());
    };

    let mut reader = WordReader::open_with_format(base, format)?;
    let mut states = read_file_states(&mut reader, header, header.state_start())?;
    drop(reader);

    if files.len() > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.unwrap_or(0))
            .build()
            .map_err(|err| {
                Error::io(
                    "state decoder: worker pool".to_string(),
                    std::io::Error::other(err),
                )
            })?;

        let results: Vec<Option<Result<Vec<State>>>> = pool.install(|| {
            files[1..]
                .par_iter()
                .map(|path| {
                    if cancel.is_some_and(|token| token.load(Ordering::Relaxed)) {
                        return None;
                    }
                    Some(read_continuation_states(path, header, format))
                })
                .collect()
        });

        for result in results {
            match result {
                Some(Ok(file_states)) => states.extend(file_states),
                // cancelled or failed: keep the prefix, drop the tail
                Some(Err(_)) | None => break,
            }
        }
    }

    Ok(states)
}
