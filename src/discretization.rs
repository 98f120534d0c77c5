//! Stitched discretization of a coupling boundary.
//!
//! Faces of one or more bodies carrying the requested boundary tag are merged
//! into one triangle list with a dense local vertex numbering. A vertex seen
//! from several faces or triangles keeps a single local index.

use std::collections::HashMap;

use nalgebra::{Vector2, Vector3};
use tracing::{debug, info};

use crate::{
    datatypes::{BodyRange, Element, ElementType, FieldData, Vertex, VertexRef},
    error::LodestoneError,
    tessellation::Tessellation,
};

/// Triangle discretization of one coupling boundary. Immutable once built.
#[derive(Debug, Clone)]
pub struct Discretization {
    tag: String,
    elements: Vec<Element>,
    vertices: Vec<Vertex>,
    coordinates: Vec<Vector3<f64>>,
    lookup: HashMap<Vertex, usize>,
    types: Vec<ElementType>,
    groups: Vec<String>,
    body_ranges: Vec<BodyRange>,
}

impl Discretization {
    /// Boundary tag the discretization was built for
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Whether the discretization serves the boundary `tag` (case-sensitive)
    pub fn supports(&self, tag: &str) -> bool {
        self.tag == tag
    }

    pub fn num_points(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Local to (body, global id) table
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn coordinates(&self) -> &[Vector3<f64>] {
        &self.coordinates
    }

    pub fn body_ranges(&self) -> &[BodyRange] {
        &self.body_ranges
    }

    pub fn body_range(&self, body: usize) -> Option<&BodyRange> {
        self.body_ranges.iter().find(|r| r.body == body)
    }

    pub fn element_types(&self) -> &[ElementType] {
        &self.types
    }

    pub fn group_name(&self, group: usize) -> Option<&str> {
        self.groups.get(group).map(|g| g.as_str())
    }

    /// Fetches an element, failing on a bad index
    pub fn element(&self, index: usize) -> Result<&Element, LodestoneError> {
        self.elements.get(index).ok_or_else(|| {
            LodestoneError::OutOfRange(format!(
                "element {} of {} on boundary '{}'",
                index,
                self.elements.len(),
                self.tag
            ))
        })
    }

    pub fn coordinate(&self, local: usize) -> Result<&Vector3<f64>, LodestoneError> {
        self.coordinates.get(local).ok_or_else(|| {
            LodestoneError::OutOfRange(format!(
                "vertex {} of {} on boundary '{}'",
                local,
                self.coordinates.len(),
                self.tag
            ))
        })
    }

    /// Local index of a tessellation vertex, if it is part of the boundary
    pub fn local_index(&self, vertex: &Vertex) -> Option<usize> {
        self.lookup.get(vertex).copied()
    }

    /// Assembles a field on local indices from per-body fields
    ///
    /// # Arguments
    /// * `per_body` - One field per body, indexed by body-global vertex id.
    ///     Broadcast rows are allowed.
    ///
    /// # Returns
    /// A field with one row per discretization vertex
    pub fn gather(&self, per_body: &[FieldData]) -> Result<FieldData, LodestoneError> {
        let rank = match per_body.first() {
            Some(f) => f.rank(),
            None => {
                return Err(LodestoneError::Mismatch(
                    "no per-body fields to gather".to_owned(),
                ))
            }
        };
        if per_body.iter().any(|f| f.rank() != rank) {
            return Err(LodestoneError::Mismatch(format!(
                "per-body fields disagree on rank (expected {rank})"
            )));
        }

        let mut gathered = FieldData::zeros(self.num_points(), rank);
        for (local, vertex) in self.vertices.iter().enumerate() {
            let source = match per_body.get(vertex.body) {
                Some(f) => f,
                None => {
                    return Err(LodestoneError::Mismatch(format!(
                        "no field supplied for body {}",
                        vertex.body
                    )))
                }
            };
            if !source.is_broadcast() && vertex.global_id >= source.num_rows() {
                return Err(LodestoneError::OutOfRange(format!(
                    "global vertex {} of body {} but field has {} rows",
                    vertex.global_id,
                    vertex.body,
                    source.num_rows()
                )));
            }
            for channel in 0..rank {
                gathered.set(local, channel, source.value(vertex.global_id, channel));
            }
        }

        Ok(gathered)
    }
}

/// Builds the discretization of boundary `tag` over `bodies`
///
/// # Arguments
/// * `bodies` - Tessellated bodies, in body-index order
/// * `tag` - Coupling-boundary tag to collect
///
/// # Returns
/// The stitched discretization, or `NotFound` when no face carries the tag
pub fn build<T: Tessellation>(bodies: &[T], tag: &str) -> Result<Discretization, LodestoneError> {
    let mut elements: Vec<Element> = Vec::new();
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut coordinates: Vec<Vector3<f64>> = Vec::new();
    let mut lookup: HashMap<Vertex, usize> = HashMap::new();
    let mut groups: Vec<String> = Vec::new();
    let mut body_ranges: Vec<BodyRange> = Vec::new();
    let mut matched_faces: usize = 0;

    for (body_index, body) in bodies.iter().enumerate() {
        let faces = body.faces_with_tag(tag);
        if faces.is_empty() {
            continue;
        }

        let start = vertices.len();

        for face in faces {
            matched_faces += 1;

            let triangles = body.face_triangles(face)?;
            if triangles.is_empty() {
                return Err(LodestoneError::Source(format!(
                    "face {} of body {} is tagged '{}' but has no triangles",
                    face, body_index, tag
                )));
            }

            let group = match body.face_group(face) {
                Some(name) => Some(match groups.iter().position(|g| g == name) {
                    Some(i) => i,
                    None => {
                        groups.push(name.to_owned());
                        groups.len() - 1
                    }
                }),
                None => None,
            };

            for (t, triangle) in triangles.iter().enumerate() {
                let mut refs = [VertexRef {
                    local: 0,
                    face_vertex: 0,
                }; 3];
                let mut uv = [Vector2::zeros(); 3];

                for (k, face_vertex) in triangle.iter().enumerate() {
                    let key = Vertex {
                        body: body_index,
                        global_id: body.global_vertex(face, *face_vertex)?,
                    };

                    let local = match lookup.get(&key) {
                        Some(local) => *local,
                        None => {
                            let local = vertices.len();
                            lookup.insert(key, local);
                            vertices.push(key);
                            coordinates.push(body.face_xyz(face, *face_vertex)?);
                            local
                        }
                    };

                    refs[k] = VertexRef {
                        local,
                        face_vertex: *face_vertex,
                    };
                    uv[k] = body.face_uv(face, *face_vertex)?;
                }

                if refs[0].local == refs[1].local
                    || refs[1].local == refs[2].local
                    || refs[0].local == refs[2].local
                {
                    return Err(LodestoneError::Source(format!(
                        "triangle {} of face {} on body {} is degenerate {:?}",
                        t, face, body_index, triangle
                    )));
                }

                elements.push(Element {
                    body: body_index,
                    face,
                    vertices: refs,
                    type_index: 0,
                    uv,
                    group,
                });
            }
        }

        debug!(
            "body {} contributes {} vertices to boundary '{}'",
            body_index,
            vertices.len() - start,
            tag
        );
        body_ranges.push(BodyRange {
            body: body_index,
            start,
            count: vertices.len() - start,
        });
    }

    if matched_faces == 0 {
        return Err(LodestoneError::NotFound(format!(
            "no faces tagged '{}' on {} bodies",
            tag,
            bodies.len()
        )));
    }

    info!(
        "stitched {} vertices and {} elements for boundary '{}'",
        vertices.len(),
        elements.len(),
        tag
    );

    Ok(Discretization {
        tag: tag.to_owned(),
        elements,
        vertices,
        coordinates,
        lookup,
        types: vec![ElementType::linear_triangle()],
        groups,
        body_ranges,
    })
}

/// Builds the discretization of boundary `tag`, requiring that exactly one
/// body carries it
///
/// # Arguments
/// * `bodies` - Tessellated bodies, in body-index order
/// * `tag` - Coupling-boundary tag to collect
pub fn build_single_body<T: Tessellation>(
    bodies: &[T],
    tag: &str,
) -> Result<Discretization, LodestoneError> {
    let tagged: Vec<usize> = bodies
        .iter()
        .enumerate()
        .filter(|(_, body)| !body.faces_with_tag(tag).is_empty())
        .map(|(i, _)| i)
        .collect();

    if tagged.len() > 1 {
        return Err(LodestoneError::Mismatch(format!(
            "boundary '{}' is restricted to one body but bodies {:?} carry it",
            tag, tagged
        )));
    }

    build(bodies, tag)
}
