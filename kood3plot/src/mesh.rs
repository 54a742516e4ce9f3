//! Mesh model: flat node and element tables.
//!
//! Elements reference nodes by 1-based index into the node table; there are
//! no back-pointers. The four element kinds have fixed arities, so each kind
//! is a contiguous block with its arity as a const parameter.

use ndarray::Array2;

/// One kind's worth of elements: ids, part ids and fixed-arity connectivity.
#[derive(Clone, Debug, Default)]
pub struct ElementBlock<const A: usize> {
    /// User-visible element ids; sequential when no remap table is present.
    pub ids: Vec<i32>,
    /// Part id of each element, resolved through the remap table's part
    /// ordering when present, the raw material index otherwise.
    pub part_ids: Vec<i32>,
    /// 1-based node indices, `A` per element.
    pub connectivity: Vec<[i32; A]>,
}

impl<const A: usize> ElementBlock<A> {
    /// Returns the number of elements in the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connectivity.len()
    }

    /// Returns `true` if the block holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connectivity.is_empty()
    }
}

/// Axis-aligned bounds of a point set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Per-axis minimum.
    pub min: [f64; 3],
    /// Per-axis maximum.
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Returns the per-axis extents.
    #[must_use]
    pub fn extents(&self) -> [f64; 3] {
        std::array::from_fn(|axis| self.max[axis] - self.min[axis])
    }

    /// Returns the box center.
    #[must_use]
    pub fn center(&self) -> [f64; 3] {
        std::array::from_fn(|axis| 0.5 * (self.min[axis] + self.max[axis]))
    }

    fn from_rows<'a>(rows: impl Iterator<Item = ndarray::ArrayView1<'a, f64>>) -> Option<Self> {
        let mut bounds: Option<Self> = None;
        for row in rows {
            let point = [row[0], row[1], row[2]];
            match &mut bounds {
                None => {
                    bounds = Some(Self {
                        min: point,
                        max: point,
                    });
                }
                Some(bounds) => {
                    for axis in 0..3 {
                        bounds.min[axis] = bounds.min[axis].min(point[axis]);
                        bounds.max[axis] = bounds.max[axis].max(point[axis]);
                    }
                }
            }
        }
        bounds
    }
}

/// The decoded geometry of one run.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    /// User-visible node ids, parallel to the rows of `coords`.
    pub node_ids: Vec<i32>,
    /// Node coordinates, shape `[num_nodes, 3]`.
    pub coords: Array2<f64>,
    /// 8-node solids.
    pub solids: ElementBlock<8>,
    /// 8-node thick shells.
    pub thick_shells: ElementBlock<8>,
    /// 2-node beams.
    pub beams: ElementBlock<2>,
    /// 4-node shells.
    pub shells: ElementBlock<4>,
    /// Material-type trailer from the remap section; empty when absent.
    pub material_types: Vec<i32>,
}

impl Mesh {
    /// Returns the number of nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.coords.nrows()
    }

    /// Returns the bounds of the undeformed geometry, or `None` for an
    /// empty mesh.
    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_rows(self.coords.rows().into_iter())
    }

    /// Returns the bounds of the geometry displaced by one state's
    /// displacement table, or `None` for an empty mesh.
    #[must_use]
    pub fn displaced_bounding_box(&self, displacements: &Array2<f64>) -> Option<BoundingBox> {
        let displaced = &self.coords + displacements;
        BoundingBox::from_rows(displaced.rows().into_iter())
    }
}
