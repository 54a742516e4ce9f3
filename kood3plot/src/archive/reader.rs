//! Archive reader.
//!
//! Inverts the writer: `_metadata` is read once to recover the compression
//! mode and calibration bounds, then each time-step group is decoded down
//! the path implied by its `is_delta_compressed` attribute and the dataset
//! names present. Sequential iteration reuses the previously reconstructed
//! quantized frame, so stepping forward is constant work per frame; random
//! access in delta mode replays from frame 0.

use super::super::error::{Error, Result};
use super::super::mesh::{ElementBlock, Mesh};
use super::super::state::State;
use super::super::{delta, quant::LinearVec3Quantizer};
use super::layout::Group;
use super::{FORMAT_TAG, MAGIC};
use ndarray::Array2;
use std::io::Read;
use std::path::Path;

/// The two vector quantities a time-step group may carry.
const CHANNELS: [&str; 2] = ["displacement", "velocity"];

#[derive(Default)]
struct FrameCache {
    index: Option<usize>,
    payloads: [Vec<u16>; 2],
}

/// Reader over one archive file.
pub struct ArchiveReader {
    root: Group,
    use_quantization: bool,
    num_timesteps: usize,
    quantizers: [Option<LinearVec3Quantizer>; 2],
    cache: FrameCache,
}

impl ArchiveReader {
    /// Opens and validates `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] or [`Error::Io`] if the file is
    /// unreadable, [`Error::InvalidFormat`] if the magic or format tag do
    /// not match, and [`Error::CorruptedData`] if the tree or its metadata
    /// cannot be decoded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = std::fs::File::open(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                Error::io(format!("archive reader: open {}", path.display()), err)
            }
        })?;

        let mut magic = [0_u8; 4];
        file.read_exact(&mut magic)
            .map_err(|err| Error::io(format!("archive reader: read {}", path.display()), err))?;
        if &magic != MAGIC {
            return Err(Error::InvalidFormat(format!(
                "{} is not an archive file",
                path.display()
            )));
        }

        let root: Group = bincode::deserialize_from(&mut file).map_err(|err| {
            Error::CorruptedData(format!("archive reader: undecodable tree ({err})"))
        })?;

        let format = root
            .expect_attr("format")?
            .as_text()
            .unwrap_or_default()
            .to_string();
        if format != FORMAT_TAG {
            return Err(Error::InvalidFormat(format!(
                "unknown archive format tag {format:?}"
            )));
        }

        let states = root.expect_group("states")?;
        let num_timesteps = states
            .attr("num_timesteps")
            .and_then(super::layout::Attr::as_int)
            .unwrap_or(0)
            .max(0) as usize;

        let mut use_quantization = false;
        let mut quantizers = [None, None];
        if let Some(metadata) = states.group("_metadata") {
            use_quantization = metadata
                .expect_attr("use_quantization")?
                .as_int()
                .unwrap_or(0)
                != 0;
            if use_quantization {
                for (slot, prefix) in quantizers.iter_mut().zip(["disp", "vel"]) {
                    *slot = read_bounds(metadata, prefix)?;
                }
            }
        }

        Ok(Self {
            root,
            use_quantization,
            num_timesteps,
            quantizers,
            cache: FrameCache::default(),
        })
    }

    /// Returns the number of archived time steps.
    #[must_use]
    pub const fn num_timesteps(&self) -> usize {
        self.num_timesteps
    }

    /// Reconstructs the mesh. Node and element ids are not part of the
    /// archive contract, so they come back sequential.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptedData`] if an expected dataset is missing or
    /// malformed.
    pub fn read_mesh(&self) -> Result<Mesh> {
        let group = self.root.expect_group("mesh")?;
        let num_nodes = group.expect_attr("num_nodes")?.as_int().unwrap_or(0).max(0) as usize;

        let coords = group.expect_dataset("nodes")?.values::<f64>()?;
        let coords = Array2::from_shape_vec((num_nodes, 3), coords).map_err(|_| {
            Error::CorruptedData("archive reader: node table does not match num_nodes".to_string())
        })?;

        Ok(Mesh {
            node_ids: (1..=num_nodes as i32).collect(),
            coords,
            solids: read_element_tables(group, "solid")?,
            shells: read_element_tables(group, "shell")?,
            beams: read_element_tables(group, "beam")?,
            ..Mesh::default()
        })
    }

    /// Returns the time attribute of frame `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] past the last frame and
    /// [`Error::CorruptedData`] if the group or attribute is missing.
    pub fn time(&self, index: usize) -> Result<f64> {
        self.step_group(index)?
            .expect_attr("time")?
            .as_float()
            .ok_or_else(|| Error::CorruptedData("archive reader: non-float time".to_string()))
    }

    /// Returns the time of every frame in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptedData`] if any frame group is missing its
    /// time attribute.
    pub fn times(&self) -> Result<Vec<f64>> {
        (0..self.num_timesteps).map(|index| self.time(index)).collect()
    }

    /// Reconstructs frame `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] past the last frame and
    /// [`Error::CorruptedData`] if an expected dataset is absent.
    pub fn read_state(&mut self, index: usize) -> Result<State> {
        let time = self.time(index)?;
        let mut state = State {
            time,
            ..State::default()
        };

        if self.use_quantization {
            self.reconstruct_quantized(index)?;
            for (channel, payload) in self.cache.payloads.iter().enumerate() {
                if payload.is_empty() {
                    continue;
                }
                let quantizer = self.quantizers[channel].as_ref().ok_or_else(|| {
                    Error::CorruptedData(
                        "archive reader: quantized data without calibration bounds".to_string(),
                    )
                })?;
                let mut values = Vec::with_capacity(payload.len());
                for quanta in payload.chunks_exact(3) {
                    values.extend(quantizer.dequantize([
                        u32::from(quanta[0]),
                        u32::from(quanta[1]),
                        u32::from(quanta[2]),
                    ])?);
                }
                let table = Array2::from_shape_vec((payload.len() / 3, 3), values)
                    .unwrap_or_else(|_| unreachable!());
                match channel {
                    0 => state.displacements = Some(table),
                    _ => state.velocities = Some(table),
                }
            }
        } else {
            let group = self.step_group(index)?;
            state.displacements = read_raw_table(group, "displacement")?;
            state.velocities = read_raw_table(group, "velocity")?;
        }

        Ok(state)
    }

    /// Brings the cache to frame `index`, replaying deltas as needed.
    fn reconstruct_quantized(&mut self, index: usize) -> Result<()> {
        if self.cache.index == Some(index) {
            return Ok(());
        }
        let start = match self.cache.index {
            // sequential step: integrate one frame onto the cache
            Some(cached) if cached + 1 == index => index,
            // otherwise replay from the stored full frame
            _ => 0,
        };

        for frame in start..=index {
            if frame >= self.num_timesteps {
                return Err(Error::OutOfRange {
                    index: frame,
                    len: self.num_timesteps,
                });
            }
            let group = self
                .root
                .expect_group("states")?
                .expect_group(&format!("timestep_{frame}"))?;
            let is_delta = group
                .expect_attr("is_delta_compressed")?
                .as_int()
                .unwrap_or(0)
                != 0;

            for (channel, name) in CHANNELS.iter().enumerate() {
                let delta_name = format!("{name}_delta");
                let full_name = format!("{name}_quantized");
                if is_delta && group.dataset(&delta_name).is_some() {
                    let deltas = group.expect_dataset(&delta_name)?.values::<i16>()?;
                    if self.cache.payloads[channel].len() != deltas.len() {
                        return Err(Error::CorruptedData(format!(
                            "archive reader: delta frame {frame} does not match its predecessor"
                        )));
                    }
                    let integrated = delta::apply(&self.cache.payloads[channel], &deltas);
                    self.cache.payloads[channel] = integrated;
                } else if let Some(dataset) = group.dataset(&full_name) {
                    self.cache.payloads[channel] = dataset.values::<u16>()?;
                } else if is_delta {
                    return Err(Error::CorruptedData(format!(
                        "archive reader: frame {frame} is marked delta-compressed but carries \
                         no {delta_name} dataset"
                    )));
                } else {
                    self.cache.payloads[channel].clear();
                }
            }
        }
        self.cache.index = Some(index);
        Ok(())
    }

    fn step_group(&self, index: usize) -> Result<&Group> {
        if index >= self.num_timesteps {
            return Err(Error::OutOfRange {
                index,
                len: self.num_timesteps,
            });
        }
        self.root
            .expect_group("states")?
            .expect_group(&format!("timestep_{index}"))
    }
}

fn read_bounds(metadata: &Group, prefix: &str) -> Result<Option<LinearVec3Quantizer>> {
    let (Some(min), Some(max)) = (
        metadata.dataset(&format!("{prefix}_min")),
        metadata.dataset(&format!("{prefix}_max")),
    ) else {
        return Ok(None);
    };
    let min = min.values::<f64>()?;
    let max = max.values::<f64>()?;
    if min.len() != 3 || max.len() != 3 {
        return Err(Error::CorruptedData(format!(
            "archive reader: {prefix} calibration tables must have three axes"
        )));
    }
    let mut quantizer = LinearVec3Quantizer::new(16);
    quantizer.restore(
        [min[0], min[1], min[2]],
        [max[0], max[1], max[2]],
    );
    Ok(Some(quantizer))
}

fn read_element_tables<const A: usize>(group: &Group, kind: &str) -> Result<ElementBlock<A>> {
    let Some(connectivity) = group.dataset(&format!("{kind}_connectivity")) else {
        return Ok(ElementBlock::default());
    };
    let part_ids = group
        .expect_dataset(&format!("{kind}_part_ids"))?
        .values::<i32>()?;
    let flat = connectivity.values::<i32>()?;
    if flat.len() != part_ids.len() * A {
        return Err(Error::CorruptedData(format!(
            "archive reader: {kind} connectivity does not match its part-id table"
        )));
    }

    Ok(ElementBlock {
        ids: (1..=part_ids.len() as i32).collect(),
        part_ids,
        connectivity: flat
            .chunks_exact(A)
            .map(|row| row.try_into().unwrap_or_else(|_| unreachable!()))
            .collect(),
    })
}

fn read_raw_table(group: &Group, name: &str) -> Result<Option<Array2<f64>>> {
    let Some(dataset) = group.dataset(name) else {
        return Ok(None);
    };
    let values = dataset.values::<f64>()?;
    let rows = dataset.shape().first().copied().unwrap_or(0);
    Array2::from_shape_vec((rows, 3), values)
        .map(Some)
        .map_err(|_| {
            Error::CorruptedData(format!("archive reader: {name} table has a broken shape"))
        })
}
