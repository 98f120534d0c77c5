//! Point location in the parametric space of a discretization.

use nalgebra::Vector2;

use crate::{datatypes::Element, discretization::Discretization, error::LodestoneError};

/// Result of a point search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub element: usize,
    /// Barycentric weights of the element's three corners, summing to one
    pub weights: [f64; 3],
    /// Set when no element contained the point and the closest one was taken
    pub extrapolated: bool,
}

impl Location {
    /// Weight of the second corner
    pub fn bary_u(&self) -> f64 {
        self.weights[1]
    }

    /// Weight of the third corner
    pub fn bary_v(&self) -> f64 {
        self.weights[2]
    }
}

/// Signed barycentric weights of `q` in the triangle `(p0, p1, p2)`
///
/// # Returns
/// `None` when the triangle has zero area
pub fn barycentric(
    p0: &Vector2<f64>,
    p1: &Vector2<f64>,
    p2: &Vector2<f64>,
    q: &Vector2<f64>,
) -> Option<[f64; 3]> {
    let e1 = p1 - p0;
    let e2 = p2 - p0;
    let r = q - p0;

    let det = e1.perp(&e2);
    if det == 0.0 {
        return None;
    }

    let w1 = r.perp(&e2) / det;
    let w2 = e1.perp(&r) / det;

    Some([1.0 - w1 - w2, w1, w2])
}

/// Finds the element containing a parametric point
///
/// The first element whose weights are all non-negative wins. When none
/// contains the point, the element with the largest minimum weight is
/// returned as an extrapolation.
///
/// # Arguments
/// * `discretization` - The discretization to search
/// * `uv` - Parametric query point
pub fn locate(
    discretization: &Discretization,
    uv: &Vector2<f64>,
) -> Result<Location, LodestoneError> {
    search(discretization, uv, |_| true)
}

/// Same as [`locate`], restricted to the elements of one face
///
/// # Arguments
/// * `discretization` - The discretization to search
/// * `body` - Body index of the face
/// * `face` - Face index within the body
/// * `uv` - Parametric query point on that face
pub fn locate_on_face(
    discretization: &Discretization,
    body: usize,
    face: usize,
    uv: &Vector2<f64>,
) -> Result<Location, LodestoneError> {
    search(discretization, uv, |e| e.body == body && e.face == face)
}

fn search<F>(
    discretization: &Discretization,
    uv: &Vector2<f64>,
    filter: F,
) -> Result<Location, LodestoneError>
where
    F: Fn(&Element) -> bool,
{
    if discretization.num_elements() == 0 {
        return Err(LodestoneError::NotFound(format!(
            "boundary '{}' has no elements",
            discretization.tag()
        )));
    }

    let mut considered: usize = 0;
    let mut best: Option<(f64, Location)> = None;

    for (index, element) in discretization.elements().iter().enumerate() {
        if !filter(element) {
            continue;
        }
        considered += 1;

        let weights = match barycentric(&element.uv[0], &element.uv[1], &element.uv[2], uv) {
            Some(w) => w,
            None => continue,
        };

        let min_weight = weights[0].min(weights[1]).min(weights[2]);
        if min_weight >= 0.0 {
            return Ok(Location {
                element: index,
                weights,
                extrapolated: false,
            });
        }

        let improves = match &best {
            Some((best_min, _)) => min_weight > *best_min,
            None => true,
        };
        if improves {
            best = Some((
                min_weight,
                Location {
                    element: index,
                    weights,
                    extrapolated: true,
                },
            ));
        }
    }

    match best {
        Some((_, location)) => Ok(location),
        None if considered == 0 => Err(LodestoneError::NotFound(format!(
            "no elements of boundary '{}' match the search",
            discretization.tag()
        ))),
        None => Err(LodestoneError::Source(format!(
            "all {} candidate elements of boundary '{}' are degenerate in parameter space",
            considered,
            discretization.tag()
        ))),
    }
}
