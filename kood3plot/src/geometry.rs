//! Geometry-section decoding.
//!
//! The geometry section of a base file holds, in strict order: the node
//! coordinate table, the four element connectivity tables and the optional
//! arbitrary-ID remap region. All sizes come from the control header.

use super::control::ControlHeader;
use super::error::Result;
use super::mesh::{ElementBlock, Mesh};
use super::narbs::NarbsTable;
use super::words::WordReader;
use ndarray::Array2;

/// Decodes the geometry section of an open base file.
///
/// # Errors
///
/// Returns [`Error::Io`](crate::error::Error::Io) on short reads and
/// [`Error::CorruptedData`](crate::error::Error::CorruptedData) if the remap
/// region overruns its declared size.
pub fn parse_mesh(reader: &mut WordReader, header: &ControlHeader) -> Result<Mesh> {
    let mut offset = header.geometry_start();
    let mut mesh = Mesh {
        node_ids: (1..=header.numnp).collect(),
        coords: parse_nodes(reader, header, &mut offset)?,
        ..Mesh::default()
    };

    mesh.solids = parse_block::<9, 8>(reader, header.nel8.abs(), &mut offset, solid_row)?;
    if header.nel8 < 0 {
        // ten-node solid extras are carried in the file but not modeled
        offset += 2 * header.nel8.unsigned_abs() as u64;
    }
    mesh.thick_shells = parse_block::<9, 8>(reader, header.nelt, &mut offset, solid_row)?;
    mesh.beams = parse_block::<6, 2>(reader, header.nel2, &mut offset, beam_row)?;
    mesh.shells = parse_block::<5, 4>(reader, header.nel4, &mut offset, shell_row)?;

    if let Some(narbs) = NarbsTable::parse(reader, header, &mut offset)? {
        apply_narbs(&mut mesh, &narbs);
    }

    Ok(mesh)
}

fn parse_nodes(
    reader: &mut WordReader,
    header: &ControlHeader,
    offset: &mut u64,
) -> Result<Array2<f64>> {
    let num_nodes = header.numnp.max(0) as usize;
    let ndim = header.effective_ndim().max(0) as usize;
    let raw = reader.read_f64_slice(*offset, ndim * num_nodes)?;
    *offset += (ndim * num_nodes) as u64;

    let mut coords = Array2::zeros((num_nodes, 3));
    for (node, row) in raw.chunks_exact(ndim).enumerate() {
        for (axis, &value) in row.iter().take(3).enumerate() {
            coords[[node, axis]] = value;
        }
    }
    Ok(coords)
}

/// Reads a connectivity table of `count` rows, `W` words each, extracting
/// `A` node indices and the material index per row via `split_row`.
fn parse_block<const W: usize, const A: usize>(
    reader: &mut WordReader,
    count: i32,
    offset: &mut u64,
    split_row: fn(&[i32; W]) -> ([i32; A], i32),
) -> Result<ElementBlock<A>> {
    let count = count.max(0) as usize;
    let raw = reader.read_i32_slice(*offset, W * count)?;
    *offset += (W * count) as u64;

    let mut block = ElementBlock {
        ids: (1..=count as i32).collect(),
        part_ids: Vec::with_capacity(count),
        connectivity: Vec::with_capacity(count),
    };
    for row in raw.chunks_exact(W) {
        let row: &[i32; W] = row.try_into().unwrap_or_else(|_| unreachable!());
        let (nodes, material) = split_row(row);
        block.connectivity.push(nodes);
        block.part_ids.push(material);
    }
    Ok(block)
}

fn solid_row(row: &[i32; 9]) -> ([i32; 8], i32) {
    (row[..8].try_into().unwrap_or_else(|_| unreachable!()), row[8])
}

fn beam_row(row: &[i32; 6]) -> ([i32; 2], i32) {
    // words 2..5 are the orientation node and two null entries
    ([row[0], row[1]], row[5])
}

fn shell_row(row: &[i32; 5]) -> ([i32; 4], i32) {
    (row[..4].try_into().unwrap_or_else(|_| unreachable!()), row[4])
}

/// Overwrites sequential ids with the remap table's user ids and resolves
/// raw material indices into part ids.
fn apply_narbs(mesh: &mut Mesh, narbs: &NarbsTable) {
    fn overwrite(ids: &mut [i32], user_ids: &[i32]) {
        for (id, user_id) in ids.iter_mut().zip(user_ids) {
            *id = *user_id;
        }
    }
    fn resolve_parts(part_ids: &mut [i32], narbs: &NarbsTable) {
        for part_id in part_ids {
            *part_id = narbs.part_id(*part_id);
        }
    }

    overwrite(&mut mesh.node_ids, &narbs.node_ids);
    overwrite(&mut mesh.solids.ids, &narbs.solid_ids);
    overwrite(&mut mesh.thick_shells.ids, &narbs.thick_shell_ids);
    overwrite(&mut mesh.beams.ids, &narbs.beam_ids);
    overwrite(&mut mesh.shells.ids, &narbs.shell_ids);

    resolve_parts(&mut mesh.solids.part_ids, narbs);
    resolve_parts(&mut mesh.thick_shells.part_ids, narbs);
    resolve_parts(&mut mesh.beams.part_ids, narbs);
    resolve_parts(&mut mesh.shells.part_ids, narbs);

    mesh.material_types.clone_from(&narbs.material_types);
}
