//! Tessellation sources consumed by the discretization builder.
//!
//! A body exposes its faces, each face a small triangulation with its own
//! vertex numbering. Every face vertex maps onto a body-global vertex id, so
//! vertices on shared edges can be stitched.

use nalgebra::{Vector2, Vector3};

use crate::error::LodestoneError;

/// Read-only view of one tessellated body
pub trait Tessellation {
    fn num_faces(&self) -> usize;

    /// Coupling-boundary tag attached to a face
    fn face_tag(&self, face: usize) -> Option<&str>;

    /// Surface group attached to a face
    fn face_group(&self, face: usize) -> Option<&str>;

    /// Triangles of a face as face-local vertex indices
    fn face_triangles(&self, face: usize) -> Result<&[[usize; 3]], LodestoneError>;

    fn face_uv(&self, face: usize, vertex: usize) -> Result<Vector2<f64>, LodestoneError>;

    fn face_xyz(&self, face: usize, vertex: usize) -> Result<Vector3<f64>, LodestoneError>;

    /// Maps a face-local vertex to its body-global id
    fn global_vertex(&self, face: usize, vertex: usize) -> Result<usize, LodestoneError>;

    /// Maps a body-global id back to a face-local vertex, if the face uses it
    fn face_vertex(&self, face: usize, global_id: usize) -> Option<usize>;

    /// Faces whose tag matches `tag` exactly
    fn faces_with_tag(&self, tag: &str) -> Vec<usize> {
        (0..self.num_faces())
            .filter(|face| self.face_tag(*face) == Some(tag))
            .collect()
    }
}

/// A triangulated face
#[derive(Debug, Clone, Default)]
pub struct TessellatedFace {
    pub tag: Option<String>,
    pub group: Option<String>,
    pub xyz: Vec<Vector3<f64>>,
    pub uv: Vec<Vector2<f64>>,
    pub global_ids: Vec<usize>,
    pub triangles: Vec<[usize; 3]>,
}

impl TessellatedFace {
    /// Creates a face and checks that the per-vertex arrays agree
    ///
    /// # Arguments
    /// * `xyz` - World coordinates of the face vertices
    /// * `uv` - Parametric coordinates of the face vertices
    /// * `global_ids` - Body-global id of each face vertex
    /// * `triangles` - Face-local vertex indices of each triangle
    pub fn new(
        xyz: Vec<Vector3<f64>>,
        uv: Vec<Vector2<f64>>,
        global_ids: Vec<usize>,
        triangles: Vec<[usize; 3]>,
    ) -> Result<TessellatedFace, LodestoneError> {
        if xyz.len() != uv.len() || xyz.len() != global_ids.len() {
            return Err(LodestoneError::Source(format!(
                "face has {} coordinates, {} parameters and {} global ids",
                xyz.len(),
                uv.len(),
                global_ids.len()
            )));
        }

        Ok(TessellatedFace {
            tag: None,
            group: None,
            xyz,
            uv,
            global_ids,
            triangles,
        })
    }

    pub fn with_tag(mut self, tag: &str) -> TessellatedFace {
        self.tag = Some(tag.to_owned());
        self
    }

    pub fn with_group(mut self, group: &str) -> TessellatedFace {
        self.group = Some(group.to_owned());
        self
    }
}

/// In-memory tessellation of a body
#[derive(Debug, Clone, Default)]
pub struct TessellatedBody {
    pub faces: Vec<TessellatedFace>,
}

impl TessellatedBody {
    pub fn new(faces: Vec<TessellatedFace>) -> TessellatedBody {
        TessellatedBody { faces }
    }

    fn face(&self, face: usize) -> Result<&TessellatedFace, LodestoneError> {
        self.faces.get(face).ok_or_else(|| {
            LodestoneError::OutOfRange(format!(
                "face {} of a body with {} faces",
                face,
                self.faces.len()
            ))
        })
    }

    fn check_vertex(
        face: &TessellatedFace,
        index: usize,
        vertex: usize,
    ) -> Result<(), LodestoneError> {
        if vertex >= face.global_ids.len() {
            return Err(LodestoneError::Source(format!(
                "face {} references vertex {} but only has {}",
                index,
                vertex,
                face.global_ids.len()
            )));
        }
        Ok(())
    }
}

impl Tessellation for TessellatedBody {
    fn num_faces(&self) -> usize {
        self.faces.len()
    }

    fn face_tag(&self, face: usize) -> Option<&str> {
        self.faces.get(face).and_then(|f| f.tag.as_deref())
    }

    fn face_group(&self, face: usize) -> Option<&str> {
        self.faces.get(face).and_then(|f| f.group.as_deref())
    }

    fn face_triangles(&self, face: usize) -> Result<&[[usize; 3]], LodestoneError> {
        Ok(&self.face(face)?.triangles)
    }

    fn face_uv(&self, face: usize, vertex: usize) -> Result<Vector2<f64>, LodestoneError> {
        let f = self.face(face)?;
        Self::check_vertex(f, face, vertex)?;
        Ok(f.uv[vertex])
    }

    fn face_xyz(&self, face: usize, vertex: usize) -> Result<Vector3<f64>, LodestoneError> {
        let f = self.face(face)?;
        Self::check_vertex(f, face, vertex)?;
        Ok(f.xyz[vertex])
    }

    fn global_vertex(&self, face: usize, vertex: usize) -> Result<usize, LodestoneError> {
        let f = self.face(face)?;
        Self::check_vertex(f, face, vertex)?;
        Ok(f.global_ids[vertex])
    }

    fn face_vertex(&self, face: usize, global_id: usize) -> Option<usize> {
        self.faces
            .get(face)?
            .global_ids
            .iter()
            .position(|g| *g == global_id)
    }
}
