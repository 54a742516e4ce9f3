//! Archive writer.
//!
//! Builds the group tree incrementally (mesh first, then one time-step
//! group per state) and serializes it on `finish`. Vector quantities are
//! quantized against bounds calibrated from the first frame; later frames
//! optionally store temporal deltas. A failed write removes the partial
//! output file.

use super::super::delta;
use super::super::error::{Error, Result};
use super::super::mesh::{ElementBlock, Mesh};
use super::super::quant::LinearVec3Quantizer;
use super::super::state::State;
use super::layout::{Attr, Dataset, Group};
use super::{CompressionOptions, FORMAT_TAG, MAGIC};
use ndarray::Array2;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Bit depth of the quantized storage path; fixed by the archive contract's
/// `uint16`/`int16` dataset types.
const STORAGE_BITS: u32 = 16;

/// One vector quantity's compression state inside the writer.
struct VectorChannel {
    name: &'static str,
    quantizer: LinearVec3Quantizer,
    previous: Vec<u16>,
}

impl VectorChannel {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            quantizer: LinearVec3Quantizer::new(STORAGE_BITS),
            previous: Vec::new(),
        }
    }

    fn calibrate(&mut self, table: &Array2<f64>) {
        if !self.quantizer.is_calibrated() {
            self.quantizer.calibrate(table.view());
        }
    }

    fn quantize(&self, table: &Array2<f64>) -> Result<Vec<u16>> {
        let mut quantized = Vec::with_capacity(table.len());
        for row in table.rows() {
            let quanta = self.quantizer.quantize([row[0], row[1], row[2]])?;
            quantized.extend(quanta.map(|quantum| quantum as u16));
        }
        Ok(quantized)
    }
}

/// Incremental writer for one archive file.
///
/// The writer owns the output path exclusively; nothing is on disk until
/// [`finish`](Self::finish) succeeds.
pub struct ArchiveWriter {
    path: PathBuf,
    options: CompressionOptions,
    root: Group,
    displacement: VectorChannel,
    velocity: VectorChannel,
    num_timesteps: usize,
}

impl ArchiveWriter {
    /// Creates a writer targeting `path`.
    #[must_use]
    pub fn create(path: impl AsRef<Path>, options: CompressionOptions) -> Self {
        let mut root = Group::default();
        root.set_attr("format", Attr::Text(FORMAT_TAG.to_string()));
        root.ensure_group("mesh");
        root.ensure_group("states");

        Self {
            path: path.as_ref().to_path_buf(),
            options,
            root,
            displacement: VectorChannel::new("displacement"),
            velocity: VectorChannel::new("velocity"),
            num_timesteps: 0,
        }
    }

    /// Writes the `/mesh` group: node coordinates plus connectivity and part
    /// ids for solids, shells and beams.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if chunk compression fails.
    pub fn write_mesh(&mut self, mesh: &Mesh) -> Result<()> {
        let level = self.options.gzip_level;
        let num_nodes = mesh.num_nodes();
        let coords = mesh.coords.as_slice().map_or_else(
            || mesh.coords.iter().copied().collect(),
            <[f64]>::to_vec,
        );

        let group = self.root.ensure_group("mesh");
        group.set_attr("num_nodes", Attr::Int(num_nodes as i64));
        group.set_attr("num_solids", Attr::Int(mesh.solids.len() as i64));
        group.set_attr("num_shells", Attr::Int(mesh.shells.len() as i64));
        group.set_attr("num_beams", Attr::Int(mesh.beams.len() as i64));
        group.set_dataset("nodes", Dataset::build(&coords, &[num_nodes, 3], level)?);

        write_element_tables(group, "solid", &mesh.solids, level)?;
        write_element_tables(group, "shell", &mesh.shells, level)?;
        write_element_tables(group, "beam", &mesh.beams, level)?;
        Ok(())
    }

    /// Writes one `/states/timestep_<index>` group.
    ///
    /// The first state calibrates the quantizers and emits the `_metadata`
    /// group; subsequent states reuse the calibration. In delta mode every
    /// state after the first stores differences against the previous frame's
    /// quantized payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if chunk compression fails and
    /// [`Error::NotCalibrated`] if quantization is enabled but the first
    /// state carried no data to calibrate on.
    pub fn write_state(&mut self, index: usize, state: &State) -> Result<()> {
        if self.options.use_quantization {
            if let Some(table) = &state.displacements {
                self.displacement.calibrate(table);
            }
            if let Some(table) = &state.velocities {
                self.velocity.calibrate(table);
            }
        }
        if index == 0 {
            self.write_compression_metadata()?;
        }

        let options = self.options;
        let is_delta = index > 0
            && options.use_quantization
            && options.use_delta_compression
            && (state.displacements.is_none() || !self.displacement.previous.is_empty())
            && (state.velocities.is_none() || !self.velocity.previous.is_empty());

        let mut group = Group::default();
        group.set_attr("time", Attr::Float(state.time));
        group.set_attr("timestep_index", Attr::Int(index as i64));
        group.set_attr("is_delta_compressed", Attr::Int(i64::from(is_delta)));

        if let Some(table) = &state.displacements {
            write_vector_quantity(&mut group, &mut self.displacement, table, is_delta, &options)?;
        }
        if let Some(table) = &state.velocities {
            write_vector_quantity(&mut group, &mut self.velocity, table, is_delta, &options)?;
        }

        let states = self.root.ensure_group("states");
        *states.ensure_group(&format!("timestep_{index}")) = group;
        self.num_timesteps = self.num_timesteps.max(index + 1);
        states.set_attr("num_timesteps", Attr::Int(self.num_timesteps as i64));
        Ok(())
    }

    fn write_compression_metadata(&mut self) -> Result<()> {
        let options = self.options;
        let (disp_bounds, vel_bounds) = (
            self.displacement.quantizer.bounds().ok(),
            self.velocity.quantizer.bounds().ok(),
        );

        let metadata = self.root.ensure_group("states").ensure_group("_metadata");
        metadata.set_attr("use_quantization", Attr::Int(i64::from(options.use_quantization)));
        metadata.set_attr(
            "use_delta_compression",
            Attr::Int(i64::from(options.use_delta_compression)),
        );
        metadata.set_attr("gzip_level", Attr::Int(i64::from(options.gzip_level)));

        for (bounds, min_name, max_name) in [
            (disp_bounds, "disp_min", "disp_max"),
            (vel_bounds, "vel_min", "vel_max"),
        ] {
            if let Some((min, max)) = bounds {
                metadata.set_dataset(min_name, Dataset::build(&min, &[3], 0)?);
                metadata.set_dataset(max_name, Dataset::build(&max, &[3], 0)?);
            }
        }
        Ok(())
    }

    /// Serializes the tree to disk. Any failure removes the partial file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be created or written.
    pub fn finish(self) -> Result<()> {
        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&self.path)?;
            file.write_all(MAGIC)?;
            bincode::serialize_into(&mut file, &self.root).map_err(std::io::Error::other)?;
            file.sync_all()
        };
        write().map_err(|err| {
            let _ = std::fs::remove_file(&self.path);
            Error::io(
                format!("archive writer: write {}", self.path.display()),
                err,
            )
        })
    }
}

fn write_element_tables<const A: usize>(
    group: &mut Group,
    kind: &str,
    block: &ElementBlock<A>,
    level: u32,
) -> Result<()> {
    if block.is_empty() {
        return Ok(());
    }
    let connectivity: Vec<i32> = block.connectivity.iter().flatten().copied().collect();
    group.set_dataset(
        &format!("{kind}_connectivity"),
        Dataset::build(&connectivity, &[block.len(), A], level)?,
    );
    group.set_dataset(
        &format!("{kind}_part_ids"),
        Dataset::build(&block.part_ids, &[block.len()], level)?,
    );
    Ok(())
}

fn write_vector_quantity(
    group: &mut Group,
    channel: &mut VectorChannel,
    table: &Array2<f64>,
    is_delta: bool,
    options: &CompressionOptions,
) -> Result<()> {
    let shape = [table.nrows(), 3];
    let level = options.gzip_level;

    if options.use_quantization {
        let quantized = channel.quantize(table)?;
        if is_delta {
            let deltas = delta::encode(&channel.previous, &quantized);
            group.set_dataset(
                &format!("{}_delta", channel.name),
                Dataset::build(&deltas, &shape, level)?,
            );
        } else {
            group.set_dataset(
                &format!("{}_quantized", channel.name),
                Dataset::build(&quantized, &shape, level)?,
            );
        }
        channel.previous = quantized;
    } else {
        let values = table.as_slice().map_or_else(
            || table.iter().copied().collect(),
            <[f64]>::to_vec,
        );
        group.set_dataset(channel.name, Dataset::build(&values, &shape, level)?);
    }
    Ok(())
}

/// Facade that drains a state stream into an archive.
pub struct Archiver {
    options: CompressionOptions,
}

impl Archiver {
    /// Creates an archiver with the given options.
    #[must_use]
    pub const fn new(options: CompressionOptions) -> Self {
        Self { options }
    }

    /// Writes `mesh` and every state of `states` to `path`, consuming the
    /// stream one frame at a time. Returns the number of time steps written.
    ///
    /// # Errors
    ///
    /// Propagates decode errors from the stream and write failures from the
    /// archive; in both cases no file is left behind.
    pub fn archive<I>(&self, path: impl AsRef<Path>, mesh: &Mesh, states: I) -> Result<usize>
    where
        I: IntoIterator<Item = Result<State>>,
    {
        let mut writer = ArchiveWriter::create(path, self.options);
        writer.write_mesh(mesh)?;
        let mut count = 0;
        for state in states {
            writer.write_state(count, &state?)?;
            count += 1;
        }
        writer.finish()?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample_mesh() -> Mesh {
        Mesh {
            node_ids: vec![1, 2, 3, 4],
            coords: array![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0]
            ],
            shells: ElementBlock {
                ids: vec![1],
                part_ids: vec![11],
                connectivity: vec![[1, 2, 3, 4]],
            },
            ..Mesh::default()
        }
    }

    fn sample_state(time: f64, shift: f64) -> State {
        State {
            time,
            displacements: Some(array![
                [shift, 0.0, 0.0],
                [shift, 0.1, 0.0],
                [shift, 0.2, 0.0],
                [shift, 0.3, 0.0]
            ]),
            velocities: Some(array![
                [1.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 0.0, 0.0]
            ]),
            ..State::default()
        }
    }

    #[test]
    fn first_frame_is_quantized_later_frames_are_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.kd3a");

        let mut writer = ArchiveWriter::create(&path, CompressionOptions::balanced());
        writer.write_mesh(&sample_mesh()).unwrap();
        writer.write_state(0, &sample_state(0.0, 0.0)).unwrap();
        writer.write_state(1, &sample_state(0.1, 0.05)).unwrap();

        let states = writer.root.expect_group("states").unwrap();
        let first = states.expect_group("timestep_0").unwrap();
        assert!(first.dataset("displacement_quantized").is_some());
        assert!(first.dataset("displacement_delta").is_none());
        assert_eq!(first.expect_attr("is_delta_compressed").unwrap().as_int(), Some(0));

        let second = states.expect_group("timestep_1").unwrap();
        assert!(second.dataset("displacement_delta").is_some());
        assert_eq!(second.expect_attr("is_delta_compressed").unwrap().as_int(), Some(1));

        let metadata = states.expect_group("_metadata").unwrap();
        assert!(metadata.dataset("disp_min").is_some());
        assert!(metadata.dataset("vel_max").is_some());
        writer.finish().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn lossless_mode_stores_raw_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.kd3a");

        let mut writer = ArchiveWriter::create(&path, CompressionOptions::lossless());
        writer.write_mesh(&sample_mesh()).unwrap();
        writer.write_state(0, &sample_state(0.0, 0.0)).unwrap();
        writer.write_state(1, &sample_state(0.5, 0.1)).unwrap();

        let states = writer.root.expect_group("states").unwrap();
        for name in ["timestep_0", "timestep_1"] {
            let step = states.expect_group(name).unwrap();
            assert!(step.dataset("displacement").is_some());
            assert_eq!(step.expect_attr("is_delta_compressed").unwrap().as_int(), Some(0));
        }
        assert_eq!(states.expect_attr("num_timesteps").unwrap().as_int(), Some(2));
    }

    #[test]
    fn archiver_counts_states_and_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.kd3a");

        let states = (0..3).map(|step| Ok(sample_state(f64::from(step), 0.0)));
        let count = Archiver::new(CompressionOptions::maximum())
            .archive(&path, &sample_mesh(), states)
            .unwrap();
        assert_eq!(count, 3);
        assert!(path.exists());
    }

    #[test]
    fn failed_finish_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("run.kd3a");

        let writer = ArchiveWriter::create(&path, CompressionOptions::none());
        assert!(writer.finish().is_err());
        assert!(!path.exists());
    }
}
