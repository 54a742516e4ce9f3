//! Test support: synthesizes state-dump files in memory.
//!
//! Builds a single-precision little-endian base-file image word by word, with
//! the control block derived from a [`ControlHeader`] whose raw fields the
//! test sets directly. Only the sections a test appends are present.

use super::control::ControlHeader;
use std::io::Write;

/// Version stamp written into the probe word.
pub const TEST_VERSION: f32 = 971.0;

#[derive(Clone, Copy)]
enum Word {
    Int(i32),
    Float(f64),
}

/// Incremental builder for a base or continuation file.
pub struct DumpBuilder {
    /// Raw control fields; written verbatim into the control block.
    pub control: ControlHeader,
    body: Vec<Word>,
    narbs_words: i32,
}

impl DumpBuilder {
    /// Starts a base-file image with an all-zero control block.
    pub fn new() -> Self {
        Self {
            control: ControlHeader {
                ndim: 3,
                ..ControlHeader::default()
            },
            body: Vec::new(),
            narbs_words: 0,
        }
    }

    /// Appends the node-coordinate table.
    pub fn nodes(&mut self, coords: &[[f64; 3]]) {
        for row in coords {
            for &value in row {
                self.body.push(Word::Float(value));
            }
        }
    }

    /// Appends one 8-node solid (or thick shell) connectivity row.
    pub fn solid(&mut self, nodes: &[i32; 8], material: i32) {
        for &node in nodes {
            self.body.push(Word::Int(node));
        }
        self.body.push(Word::Int(material));
    }

    /// Appends the ten-node extras that follow a negative solid count.
    pub fn ten_node_extras(&mut self, extras: &[i32]) {
        for &extra in extras {
            self.body.push(Word::Int(extra));
        }
    }

    /// Appends one beam row: two nodes, orientation and null words, material.
    pub fn beam(&mut self, nodes: &[i32; 2], material: i32) {
        self.body.push(Word::Int(nodes[0]));
        self.body.push(Word::Int(nodes[1]));
        for _ in 0..3 {
            self.body.push(Word::Int(0));
        }
        self.body.push(Word::Int(material));
    }

    /// Appends one shell row.
    pub fn shell(&mut self, nodes: &[i32; 4], material: i32) {
        for &node in nodes {
            self.body.push(Word::Int(node));
        }
        self.body.push(Word::Int(material));
    }

    /// Appends a remap region with a 10-word header. Element ids other than
    /// the solids' are sequential; `norder` sizes the three part arrays and
    /// sets `control.nmmat`.
    pub fn narbs(&mut self, node_ids: &[i32], solid_ids: &[i32], norder: &[i32]) {
        let start = self.body.len();

        self.body.push(Word::Int(node_ids.len() as i32));
        for _ in 0..9 {
            self.body.push(Word::Int(0));
        }

        for &id in node_ids {
            self.body.push(Word::Int(id));
        }
        for &id in solid_ids {
            self.body.push(Word::Int(id));
        }
        for kind_count in [self.control.nelt, self.control.nel2, self.control.nel4] {
            for id in 1..=kind_count {
                self.body.push(Word::Int(id));
            }
        }
        for &part in norder {
            self.body.push(Word::Int(part));
        }
        for _ in 0..2 * norder.len() {
            self.body.push(Word::Int(0));
        }

        self.control.nmmat = norder.len() as i32;
        self.narbs_words = (self.body.len() - start) as i32;
    }

    /// Appends one full state slot: the time word followed by
    /// `state_word_count() - 1` payload words generated by `value`.
    pub fn add_state(&mut self, time: f64, value: impl Fn(u64) -> f64) {
        let mut sized = self.control.clone();
        sized.compute_derived();
        self.body.push(Word::Float(time));
        for index in 0..sized.state_word_count() - 1 {
            self.body.push(Word::Float(value(index)));
        }
    }

    /// Appends the end-of-states sentinel.
    pub fn end_marker(&mut self) {
        self.body.push(Word::Float(-999_999.0));
    }

    /// Writes the base-file image to a fresh temporary file.
    pub fn write(&self) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        self.write_to(file)
    }

    /// Writes only the body (no control block): a continuation-file image.
    pub fn write_continuation(&self) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write_words(file.as_file_mut(), &self.body);
        file.flush().unwrap();
        file
    }

    fn write_to(&self, mut file: tempfile::NamedTempFile) -> tempfile::NamedTempFile {
        let control = self.control_words();
        write_words(file.as_file_mut(), &control);
        write_words(file.as_file_mut(), &self.body);
        file.flush().unwrap();
        file
    }

    fn control_words(&self) -> Vec<Word> {
        let c = &self.control;
        let mut words = vec![Word::Int(0); 64 + c.extra.max(0) as usize];
        words[14] = Word::Float(f64::from(TEST_VERSION));
        for (address, value) in [
            (15, c.ndim),
            (16, c.numnp),
            (17, c.icode),
            (18, c.nglbv),
            (19, c.it),
            (20, c.iu),
            (21, c.iv),
            (22, c.ia),
            (23, c.nel8),
            (24, c.nummat8),
            (27, c.nv3d),
            (28, c.nel2),
            (29, c.nummat2),
            (30, c.nv1d),
            (31, c.nel4),
            (32, c.nummat4),
            (33, c.nv2d),
            (34, c.neiph),
            (35, c.neips),
            (36, c.maxint),
            (37, c.nmsph),
            (39, if self.narbs_words > 0 { self.narbs_words } else { c.narbs }),
            (40, c.nelt),
            (41, c.nummatt),
            (42, c.nv3dt),
            (47, c.ialemat),
            (51, c.nmmat),
            (56, c.idtdt),
            (57, c.extra),
        ] {
            words[address] = Word::Int(value);
        }
        words[55] = Word::Float(c.dt);
        words
    }
}

fn write_words(file: &mut std::fs::File, words: &[Word]) {
    for word in words {
        let bytes = match word {
            Word::Int(value) => value.to_le_bytes(),
            Word::Float(value) => (*value as f32).to_le_bytes(),
        };
        file.write_all(&bytes).unwrap();
    }
}
