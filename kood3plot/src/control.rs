//! Control-header decoding.
//!
//! The first 64 words of a base file declare the shape of everything that
//! follows: geometry counts, per-node presence flags, per-element variable
//! counts and the arbitrary-ID region size. Field names follow the solver's
//! database mnemonics since they are the vocabulary of the on-disk contract.

use super::error::{Error, Result};
use super::words::WordReader;

/// Number of title words at the head of the control block.
const TITLE_WORDS: usize = 10;

/// Decoded control header plus the derived per-state sizes.
///
/// The derived sizes are computed once by [`ControlHeader::compute_derived`]
/// and shared by every consumer; read sites never re-derive them.
#[derive(Clone, Debug, Default)]
pub struct ControlHeader {
    /// Run title, trimmed of padding.
    pub title: String,
    /// Dimension code. 4, 5 and 7 mark packed variants of a 3-d model.
    pub ndim: i32,
    /// Number of nodal points.
    pub numnp: i32,
    /// Producing-code marker.
    pub icode: i32,
    /// Number of global state variables.
    pub nglbv: i32,
    /// Temperature flag; 2, 3 and the tens digit select extra per-node slots.
    pub it: i32,
    /// Displacement presence flag.
    pub iu: i32,
    /// Velocity presence flag.
    pub iv: i32,
    /// Acceleration presence flag.
    pub ia: i32,
    /// Number of 8-node solids; negative marks ten-node extras in geometry.
    pub nel8: i32,
    /// Number of solid materials.
    pub nummat8: i32,
    /// State variables per solid.
    pub nv3d: i32,
    /// Number of 2-node beams.
    pub nel2: i32,
    /// Number of beam materials.
    pub nummat2: i32,
    /// State variables per beam.
    pub nv1d: i32,
    /// Number of 4-node shells.
    pub nel4: i32,
    /// Number of shell materials.
    pub nummat4: i32,
    /// State variables per shell.
    pub nv2d: i32,
    /// Extra history variables per solid.
    pub neiph: i32,
    /// Extra history variables per shell integration point.
    pub neips: i32,
    /// Shell integration points; decoded from the raw word together with
    /// [`mdlopt`](Self::mdlopt).
    pub maxint: i32,
    /// Number of smoothed-particle nodes.
    pub nmsph: i32,
    /// Word count of the arbitrary-ID remap section, 0 if absent.
    pub narbs: i32,
    /// Number of 8-node thick shells.
    pub nelt: i32,
    /// Number of thick-shell materials.
    pub nummatt: i32,
    /// State variables per thick shell.
    pub nv3dt: i32,
    /// Shell output flags, decoded from raw sentinels.
    pub ioshl: [i32; 4],
    /// Solid output flags, decoded from raw sentinels.
    pub iosol: [i32; 2],
    /// Arbitrary-Lagrangian-Eulerian material flag.
    pub ialemat: i32,
    /// Total material (part) count; sizes the remap section's part arrays.
    pub nmmat: i32,
    /// Nominal output interval.
    pub dt: f64,
    /// Packed time-step/strain flag word.
    pub idtdt: i32,
    /// Number of extended control words following the base 64.
    pub extra: i32,

    /// Material-deletion mode: 0 none, 1 nodal, 2 elemental.
    pub mdlopt: i32,
    /// Strain-tensor output flag.
    pub istrn: i32,
    /// Words of nodal data per state.
    pub nodal_words: u64,
    /// Words of element data per state.
    pub element_words: u64,
    /// Words of deletion data per state.
    pub deletion_words: u64,
}

impl ControlHeader {
    /// Decodes the control block of an open base file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a control word cannot be read and
    /// [`Error::CorruptedData`] if the declared counts are negative where
    /// the format forbids it.
    pub fn parse(reader: &mut WordReader) -> Result<Self> {
        let mut header = Self {
            title: reader.read_text(0, TITLE_WORDS)?,
            ndim: reader.read_i32(15)?,
            numnp: reader.read_i32(16)?,
            icode: reader.read_i32(17)?,
            nglbv: reader.read_i32(18)?,
            it: reader.read_i32(19)?,
            iu: reader.read_i32(20)?,
            iv: reader.read_i32(21)?,
            ia: reader.read_i32(22)?,
            nel8: reader.read_i32(23)?,
            nummat8: reader.read_i32(24)?,
            nv3d: reader.read_i32(27)?,
            nel2: reader.read_i32(28)?,
            nummat2: reader.read_i32(29)?,
            nv1d: reader.read_i32(30)?,
            nel4: reader.read_i32(31)?,
            nummat4: reader.read_i32(32)?,
            nv2d: reader.read_i32(33)?,
            neiph: reader.read_i32(34)?,
            neips: reader.read_i32(35)?,
            maxint: reader.read_i32(36)?,
            nmsph: reader.read_i32(37)?,
            narbs: reader.read_i32(39)?,
            nelt: reader.read_i32(40)?,
            nummatt: reader.read_i32(41)?,
            nv3dt: reader.read_i32(42)?,
            ioshl: [0; 4],
            iosol: [0; 2],
            ialemat: reader.read_i32(47)?,
            nmmat: reader.read_i32(51)?,
            dt: reader.read_f64(55)?,
            idtdt: reader.read_i32(56)?,
            extra: reader.read_i32(57)?,
            ..Self::default()
        };

        let mut ioshl_raw = [0; 4];
        for (slot, raw) in ioshl_raw.iter_mut().zip(43..) {
            *slot = reader.read_i32(raw)?;
        }
        header.decode_output_flags(&ioshl_raw);

        for (name, value) in [
            ("node count", header.numnp),
            ("beam count", header.nel2),
            ("shell count", header.nel4),
            ("thick-shell count", header.nelt),
        ] {
            if value < 0 {
                return Err(Error::CorruptedData(format!(
                    "control decoder: negative {name} {value}"
                )));
            }
        }

        header.compute_derived();
        Ok(header)
    }

    /// Maps the four raw sentinels onto the shell and solid output flags.
    /// A raw value of 1000 enables the shell flag; 999 and 1000 both enable
    /// the solid flag.
    fn decode_output_flags(&mut self, ioshl_raw: &[i32; 4]) {
        for (flag, raw) in self.ioshl.iter_mut().zip(ioshl_raw) {
            *flag = i32::from(*raw == 1000);
        }
        for (flag, raw) in self.iosol.iter_mut().zip(ioshl_raw) {
            *flag = i32::from(*raw == 1000 || *raw == 999);
        }
    }

    /// Computes `mdlopt`, `istrn` and the three per-state word counts from
    /// the raw fields. Must be called after any manual field change; `parse`
    /// calls it itself.
    pub fn compute_derived(&mut self) {
        // mdlopt is folded into the sign and magnitude of the raw maxint
        if self.maxint >= 0 {
            self.mdlopt = 0;
        } else if self.maxint < -10000 {
            self.mdlopt = 2;
            self.maxint = self.maxint.abs() - 10000;
        } else {
            self.mdlopt = 1;
            self.maxint = self.maxint.abs();
        }

        self.istrn = self.derive_istrn();

        let vector_fields = i64::from(self.iu) + i64::from(self.iv) + i64::from(self.ia);
        let per_node = i64::from(self.it + self.temperature_extra())
            + i64::from(self.effective_ndim()) * vector_fields;
        self.nodal_words = (per_node * i64::from(self.numnp)).unsigned_abs();

        self.element_words = (i64::from(self.nel8.abs()) * i64::from(self.nv3d)
            + i64::from(self.nelt) * i64::from(self.nv3dt)
            + i64::from(self.nel2) * i64::from(self.nv1d)
            + i64::from(self.nel4) * i64::from(self.nv2d))
        .unsigned_abs();

        self.deletion_words = match self.mdlopt {
            1 => i64::from(self.numnp).unsigned_abs(),
            2 => (i64::from(self.nel8.abs())
                + i64::from(self.nelt)
                + i64::from(self.nel4)
                + i64::from(self.nel2))
            .unsigned_abs(),
            _ => 0,
        };
    }

    fn derive_istrn(&self) -> i32 {
        if self.idtdt >= 100 {
            // the strain flag rides in the ten-thousands digit
            return (self.idtdt / 10000) % 10;
        }
        if self.nv2d > 0 {
            let residue = self.nv2d
                - self.maxint * (6 * self.ioshl[0] + self.ioshl[1] + self.neips)
                - 8 * self.ioshl[2]
                - 4 * self.ioshl[3];
            return i32::from(residue / 12 == 1);
        }
        i32::from(self.nv3d > 0 && self.neiph >= 6)
    }

    /// Returns the spatial dimension of the node and vector tables. The
    /// packed dimension codes 4, 5 and 7 all describe 3-d models.
    #[must_use]
    pub const fn effective_ndim(&self) -> i32 {
        match self.ndim {
            4 | 5 | 7 => 3,
            ndim => ndim,
        }
    }

    /// Returns the extra per-node temperature slots implied by `it`.
    #[must_use]
    pub const fn temperature_extra(&self) -> i32 {
        match self.it {
            2 => 2,
            3 => 3,
            it if it / 10 == 1 => 1,
            _ => 0,
        }
    }

    /// Returns the word count of one complete state slot, including the
    /// leading time word.
    #[must_use]
    pub fn state_word_count(&self) -> u64 {
        1 + i64::from(self.nglbv).unsigned_abs()
            + self.nodal_words
            + self.element_words
            + self.deletion_words
    }

    /// Returns the word offset of the geometry section in the base file.
    #[must_use]
    pub fn geometry_start(&self) -> u64 {
        64 + i64::from(self.extra).unsigned_abs()
    }

    /// Returns the word count of the geometry section, including the
    /// ten-node solid extras and the arbitrary-ID remap section.
    #[must_use]
    pub fn geometry_words(&self) -> u64 {
        let nel8 = i64::from(self.nel8.abs());
        let mut words = i64::from(self.effective_ndim()) * i64::from(self.numnp) + 9 * nel8;
        if self.nel8 < 0 {
            words += 2 * nel8;
        }
        words += 9 * i64::from(self.nelt) + 6 * i64::from(self.nel2) + 5 * i64::from(self.nel4);
        words += i64::from(self.narbs.max(0));
        words.unsigned_abs()
    }

    /// Returns the word offset of the first state slot in the base file.
    #[must_use]
    pub fn state_start(&self) -> u64 {
        self.geometry_start() + self.geometry_words()
    }
}
