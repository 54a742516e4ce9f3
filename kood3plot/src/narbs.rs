//! Arbitrary-ID remap table.
//!
//! When the run was set up with user numbering, the geometry section ends
//! with a remap region: user-visible ids for every node and element, plus
//! the part-id ordering that turns a raw material index into a part id.

use super::control::ControlHeader;
use super::error::{Error, Result};
use super::words::WordReader;

/// Decoded remap region.
#[derive(Clone, Debug, Default)]
pub struct NarbsTable {
    /// User node ids, one per node.
    pub node_ids: Vec<i32>,
    /// User solid ids.
    pub solid_ids: Vec<i32>,
    /// User thick-shell ids.
    pub thick_shell_ids: Vec<i32>,
    /// User beam ids.
    pub beam_ids: Vec<i32>,
    /// User shell ids.
    pub shell_ids: Vec<i32>,
    /// Ordered part ids; index by material index − 1.
    pub norder: Vec<i32>,
    /// Material-type trailer filling the rest of the declared region.
    pub material_types: Vec<i32>,
}

impl NarbsTable {
    /// Parses the remap region at `offset`, advancing it past the region.
    ///
    /// Returns `None` when the header declares no region. The header block is
    /// 10 words, or 16 when the leading sort count is negative; the six
    /// additional words carry no interpretation here and are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptedData`] if the id and part arrays overrun the
    /// declared region size, and [`Error::Io`] on short reads.
    pub fn parse(
        reader: &mut WordReader,
        header: &ControlHeader,
        offset: &mut u64,
    ) -> Result<Option<Self>> {
        if header.narbs <= 0 {
            return Ok(None);
        }
        let narbs_words = header.narbs as u64;
        let region_start = *offset;

        let nsort = reader.read_i32(*offset)?;
        let header_words: u64 = if nsort < 0 { 16 } else { 10 };
        *offset += header_words;

        let mut table = Self::default();
        let mut read_ids = |offset: &mut u64, count: i32| -> Result<Vec<i32>> {
            let count = count.max(0) as usize;
            let ids = reader.read_i32_slice(*offset, count)?;
            *offset += count as u64;
            Ok(ids)
        };

        table.node_ids = read_ids(offset, header.numnp)?;
        table.solid_ids = read_ids(offset, header.nel8.abs())?;
        table.thick_shell_ids = read_ids(offset, header.nelt)?;
        table.beam_ids = read_ids(offset, header.nel2)?;
        table.shell_ids = read_ids(offset, header.nel4)?;

        table.norder = read_ids(offset, header.nmmat)?;
        // NSRMU and NSRMP cross-reference arrays are consumed unused
        *offset += 2 * header.nmmat.max(0) as u64;

        let consumed = *offset - region_start;
        if consumed > narbs_words {
            return Err(Error::CorruptedData(format!(
                "geometry decoder: arbitrary-ID region declares {narbs_words} words \
                 but its arrays span {consumed}"
            )));
        }

        let trailer = (narbs_words - consumed) as usize;
        table.material_types = reader.read_i32_slice(*offset, trailer)?;
        *offset += trailer as u64;

        Ok(Some(table))
    }

    /// Resolves a raw 1-based material index to a part id. Indices outside
    /// the part ordering fall back to the raw index.
    #[must_use]
    pub fn part_id(&self, material_index: i32) -> i32 {
        usize::try_from(material_index - 1)
            .ok()
            .and_then(|index| self.norder.get(index))
            .copied()
            .unwrap_or(material_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_id_resolves_through_norder() {
        let table = NarbsTable {
            norder: vec![42, 77],
            ..NarbsTable::default()
        };
        assert_eq!(table.part_id(1), 42);
        assert_eq!(table.part_id(2), 77);
        // out-of-range indices fall back to the raw value
        assert_eq!(table.part_id(3), 3);
        assert_eq!(table.part_id(0), 0);
        assert_eq!(table.part_id(-4), -4);
    }
}
