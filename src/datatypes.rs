use std::{collections::HashMap, str::FromStr};

use nalgebra::{DMatrix, Vector2};

use crate::error::LodestoneError;

/// Identity of a tessellation vertex: the body it belongs to and its
/// body-global id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vertex {
    pub body: usize,
    pub global_id: usize,
}

/// One corner of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexRef {
    /// Discretization-local index
    pub local: usize,
    /// Index of the vertex within its face tessellation
    pub face_vertex: usize,
}

/// A linear triangle of a discretization
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub body: usize,
    pub face: usize,
    pub vertices: [VertexRef; 3],
    /// Index into the discretization's element type table
    pub type_index: usize,
    /// Parametric coordinates of the three corners on the owning face
    pub uv: [Vector2<f64>; 3],
    /// Index into the discretization's group names, if the face had a group
    pub group: Option<usize>,
}

impl Element {
    /// The discretization-local indices of the three corners
    pub fn locals(&self) -> [usize; 3] {
        self.vertices.map(|v| v.local)
    }
}

/// Element type record handed back to the host framework so it can re-derive
/// basis functions.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementType {
    pub name: &'static str,
    /// Reference coordinates of the element's nodes
    pub reference: Vec<[f64; 2]>,
}

impl ElementType {
    pub fn linear_triangle() -> ElementType {
        ElementType {
            name: "Tri3",
            reference: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
        }
    }
}

/// Contiguous block of local indices owned by one body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyRange {
    pub body: usize,
    pub start: usize,
    pub count: usize,
}

impl BodyRange {
    pub fn contains(&self, local: usize) -> bool {
        local >= self.start && local < self.start + self.count
    }
}

/// Nodal field values, one row per vertex and one column per rank channel.
///
/// A single row is a broadcast value that applies to every vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldData {
    values: DMatrix<f64>,
}

impl FieldData {
    pub fn new(values: DMatrix<f64>) -> FieldData {
        FieldData { values }
    }

    /// Builds a field from row-major values
    ///
    /// # Arguments
    /// * `rank` - Number of channels per vertex
    /// * `values` - Flat row-major values, a multiple of `rank` long
    pub fn from_rows(rank: usize, values: &[f64]) -> Result<FieldData, LodestoneError> {
        if rank == 0 || values.len() % rank != 0 || values.is_empty() {
            return Err(LodestoneError::Mismatch(format!(
                "{} values cannot be split into rows of rank {}",
                values.len(),
                rank
            )));
        }

        Ok(FieldData {
            values: DMatrix::from_row_slice(values.len() / rank, rank, values),
        })
    }

    /// A single broadcast row
    pub fn broadcast(row: &[f64]) -> FieldData {
        FieldData {
            values: DMatrix::from_row_slice(1, row.len(), row),
        }
    }

    pub fn zeros(num_rows: usize, rank: usize) -> FieldData {
        FieldData {
            values: DMatrix::zeros(num_rows, rank),
        }
    }

    pub fn rank(&self) -> usize {
        self.values.ncols()
    }

    pub fn num_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_broadcast(&self) -> bool {
        self.values.nrows() == 1
    }

    /// Value of `channel` at vertex `index`, honoring broadcast rows
    ///
    /// # Panics
    /// If `channel` is not below the rank, or `index` is past the last row of
    /// a non-broadcast field. Use [`FieldData::check_rows`] first.
    pub fn value(&self, index: usize, channel: usize) -> f64 {
        let row = if self.is_broadcast() { 0 } else { index };
        self.values[(row, channel)]
    }

    /// Overwrites one value
    ///
    /// # Panics
    /// If `index` or `channel` is outside the stored matrix
    pub fn set(&mut self, index: usize, channel: usize, value: f64) {
        self.values[(index, channel)] = value;
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Checks the row count against a vertex count
    ///
    /// # Arguments
    /// * `num_points` - Vertex count the field must cover
    pub fn check_rows(&self, num_points: usize) -> Result<(), LodestoneError> {
        if self.num_rows() != 1 && self.num_rows() != num_points {
            return Err(LodestoneError::Mismatch(format!(
                "field has {} rows, expected 1 or {}",
                self.num_rows(),
                num_points
            )));
        }
        Ok(())
    }
}

/// Physical role of a surface group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    Viscous,
    Inviscid,
    Farfield,
    Symmetry,
    Wall,
}

impl BoundaryKind {
    /// Whether the group is part of the coupled flow solution
    pub fn is_wetted(&self) -> bool {
        matches!(self, BoundaryKind::Viscous | BoundaryKind::Inviscid)
    }
}

impl FromStr for BoundaryKind {
    type Err = LodestoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "viscous" => Ok(BoundaryKind::Viscous),
            "inviscid" => Ok(BoundaryKind::Inviscid),
            "farfield" => Ok(BoundaryKind::Farfield),
            "symmetry" => Ok(BoundaryKind::Symmetry),
            "wall" => Ok(BoundaryKind::Wall),
            other => Err(LodestoneError::Input(format!(
                "Unknown boundary kind '{other}'. \
                 Expected viscous, inviscid, farfield, symmetry or wall"
            ))),
        }
    }
}

/// Group name to boundary kind lookup, filled once from the input deck
#[derive(Debug, Clone, Default)]
pub struct BoundaryTable {
    kinds: HashMap<String, BoundaryKind>,
}

impl BoundaryTable {
    pub fn new() -> BoundaryTable {
        BoundaryTable::default()
    }

    pub fn insert(&mut self, group: &str, kind: BoundaryKind) {
        self.kinds.insert(group.to_owned(), kind);
    }

    pub fn kind(&self, group: &str) -> Option<BoundaryKind> {
        self.kinds.get(group).copied()
    }

    /// Unknown groups are not wetted
    pub fn is_wetted(&self, group: &str) -> bool {
        self.kind(group).map(|k| k.is_wetted()).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_rows() {
        let field = FieldData::from_rows(3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(field.rank(), 3);
        assert_eq!(field.num_rows(), 2);
        assert_eq!(field.value(1, 2), 6.0);
        assert!(field.check_rows(2).is_ok());
        assert!(matches!(
            field.check_rows(3),
            Err(LodestoneError::Mismatch(_))
        ));
    }

    #[test]
    fn test_broadcast_row_applies_everywhere() {
        let field = FieldData::broadcast(&[101325.0]);
        assert!(field.check_rows(57).is_ok());
        assert_eq!(field.value(42, 0), 101325.0);
    }

    #[test]
    #[should_panic]
    fn test_value_past_last_row() {
        let field = FieldData::from_rows(1, &[1.0, 2.0]).unwrap();
        assert!(field.check_rows(3).is_err());
        field.value(2, 0);
    }

    #[test]
    fn test_bad_rank() {
        assert!(FieldData::from_rows(3, &[1.0, 2.0]).is_err());
        assert!(FieldData::from_rows(0, &[1.0]).is_err());
    }

    #[test]
    fn test_boundary_kind_lookup() {
        assert_eq!("Viscous".parse::<BoundaryKind>().unwrap(), BoundaryKind::Viscous);
        assert!("inviscid".parse::<BoundaryKind>().unwrap().is_wetted());
        assert!(!"farfield".parse::<BoundaryKind>().unwrap().is_wetted());
        assert!("slipwall".parse::<BoundaryKind>().is_err());
    }

    #[test]
    fn test_boundary_table() {
        let mut table = BoundaryTable::new();
        table.insert("wing", BoundaryKind::Viscous);
        table.insert("farfield", BoundaryKind::Farfield);

        assert!(table.is_wetted("wing"));
        assert!(!table.is_wetted("farfield"));
        assert!(!table.is_wetted("Wing"));
        assert_eq!(table.kind("farfield"), Some(BoundaryKind::Farfield));
        assert_eq!(table.len(), 2);
    }
}
