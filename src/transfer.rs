//! Field transfer operators on a discretization and their reverse-mode
//! counterparts.
//!
//! Forward and bar variants share one local Jacobian per element: the three
//! barycentric weights for interpolation and the element area for
//! integration. Bar variants only ever accumulate into the caller's buffer.

use crate::{datatypes::FieldData, discretization::Discretization, error::LodestoneError};

/// Area of an element in world coordinates
///
/// # Arguments
/// * `discretization` - The owning discretization
/// * `element` - Element index
pub fn element_area(
    discretization: &Discretization,
    element: usize,
) -> Result<f64, LodestoneError> {
    let locals = discretization.element(element)?.locals();
    let x0 = discretization.coordinate(locals[0])?;
    let x1 = discretization.coordinate(locals[1])?;
    let x2 = discretization.coordinate(locals[2])?;

    Ok(0.5 * (x1 - x0).cross(&(x2 - x0)).norm())
}

fn check_field(
    discretization: &Discretization,
    field: &FieldData,
    rank: usize,
) -> Result<(), LodestoneError> {
    if field.rank() != rank {
        return Err(LodestoneError::Mismatch(format!(
            "field has rank {} but rank {} was requested",
            field.rank(),
            rank
        )));
    }
    field.check_rows(discretization.num_points())
}

fn check_bar_buffer(
    discretization: &Discretization,
    rank: usize,
    data_bar: &[f64],
) -> Result<(), LodestoneError> {
    if rank == 0 || data_bar.len() != discretization.num_points() * rank {
        return Err(LodestoneError::Mismatch(format!(
            "bar buffer holds {} values, expected {} points of rank {}",
            data_bar.len(),
            discretization.num_points(),
            rank
        )));
    }
    Ok(())
}

/// Interpolates a field at barycentric weights within an element
///
/// # Arguments
/// * `discretization` - The owning discretization
/// * `element` - Element index, usually from the locator
/// * `weights` - Barycentric weights of the element's corners
/// * `field` - Nodal field on the discretization
///
/// # Returns
/// One value per rank channel
pub fn interpolate(
    discretization: &Discretization,
    element: usize,
    weights: &[f64; 3],
    field: &FieldData,
) -> Result<Vec<f64>, LodestoneError> {
    let locals = discretization.element(element)?.locals();
    check_field(discretization, field, field.rank())?;

    Ok((0..field.rank())
        .map(|c| {
            weights[0] * field.value(locals[0], c)
                + weights[1] * field.value(locals[1], c)
                + weights[2] * field.value(locals[2], c)
        })
        .collect())
}

/// Reverse of [`interpolate`]. Adds `weights[k] * result_bar[c]` onto
/// `data_bar[local_k * rank + c]`.
///
/// # Arguments
/// * `discretization` - The owning discretization
/// * `element` - Element index
/// * `weights` - Barycentric weights used in the forward pass
/// * `result_bar` - Sensitivity of the interpolated value, one per channel
/// * `data_bar` - Accumulator laid out as `num_points * rank`
pub fn interpolate_bar(
    discretization: &Discretization,
    element: usize,
    weights: &[f64; 3],
    result_bar: &[f64],
    data_bar: &mut [f64],
) -> Result<(), LodestoneError> {
    let locals = discretization.element(element)?.locals();
    let rank = result_bar.len();
    check_bar_buffer(discretization, rank, data_bar)?;

    for (local, weight) in locals.iter().zip(weights) {
        for (c, bar) in result_bar.iter().enumerate() {
            data_bar[local * rank + c] += weight * bar;
        }
    }

    Ok(())
}

/// Integrates a field over an element with one point per vertex.
///
/// Without a field the result is `[3 * area]`, so that summing over elements
/// and dividing by three gives the surface area. With a field each channel is
/// `area * (f0 + f1 + f2)`, not divided by three.
///
/// # Arguments
/// * `discretization` - The owning discretization
/// * `element` - Element index
/// * `rank` - Expected field rank
/// * `field` - Nodal field, or `None` for the area convention
pub fn integrate(
    discretization: &Discretization,
    element: usize,
    rank: usize,
    field: Option<&FieldData>,
) -> Result<Vec<f64>, LodestoneError> {
    let area = element_area(discretization, element)?;

    let field = match field {
        Some(f) => f,
        None => return Ok(vec![3.0 * area]),
    };
    check_field(discretization, field, rank)?;

    let locals = discretization.element(element)?.locals();
    Ok((0..rank)
        .map(|c| {
            area * (field.value(locals[0], c)
                + field.value(locals[1], c)
                + field.value(locals[2], c))
        })
        .collect())
}

/// Reverse of [`integrate`] with a field. Adds `area * result_bar[c]` onto
/// `data_bar[local_k * rank + c]` for the element's three corners.
///
/// # Arguments
/// * `discretization` - The owning discretization
/// * `element` - Element index
/// * `result_bar` - Sensitivity of the integral, one per channel
/// * `data_bar` - Accumulator laid out as `num_points * rank`
pub fn integrate_bar(
    discretization: &Discretization,
    element: usize,
    result_bar: &[f64],
    data_bar: &mut [f64],
) -> Result<(), LodestoneError> {
    let area = element_area(discretization, element)?;
    let locals = discretization.element(element)?.locals();
    let rank = result_bar.len();
    check_bar_buffer(discretization, rank, data_bar)?;

    for local in locals {
        for (c, bar) in result_bar.iter().enumerate() {
            data_bar[local * rank + c] += area * bar;
        }
    }

    Ok(())
}

/// Sums [`integrate`] over every element of the discretization
///
/// # Arguments
/// * `discretization` - The discretization to integrate over
/// * `rank` - Expected field rank
/// * `field` - Nodal field, or `None` for the area convention
pub fn integrate_all(
    discretization: &Discretization,
    rank: usize,
    field: Option<&FieldData>,
) -> Result<Vec<f64>, LodestoneError> {
    let width = if field.is_some() { rank } else { 1 };
    let mut total = vec![0.0; width];

    for element in 0..discretization.num_elements() {
        let partial = integrate(discretization, element, rank, field)?;
        for (t, p) in total.iter_mut().zip(partial) {
            *t += p;
        }
    }

    Ok(total)
}

/// Surface area of the discretization
pub fn total_area(discretization: &Discretization) -> Result<f64, LodestoneError> {
    Ok(integrate_all(discretization, 1, None)?[0] / 3.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::build;
    use crate::tessellation::{TessellatedBody, TessellatedFace};
    use approx::assert_relative_eq;
    use nalgebra::{Vector2, Vector3};

    /// Unit right triangle plus a tilted triangle sharing its hypotenuse
    fn two_triangles() -> Discretization {
        let face = TessellatedFace::new(
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
                Vector3::new(1.0, 1.0, 0.5),
            ],
            vec![
                Vector2::new(0.0, 0.0),
                Vector2::new(1.0, 0.0),
                Vector2::new(0.0, 1.0),
                Vector2::new(1.0, 1.0),
            ],
            vec![0, 1, 2, 3],
            vec![[0, 1, 2], [1, 3, 2]],
        )
        .unwrap()
        .with_tag("wing");
        build(&[TessellatedBody::new(vec![face])], "wing").unwrap()
    }

    fn displacement() -> FieldData {
        FieldData::from_rows(
            3,
            &[
                0.1, -0.2, 0.3, //
                1.5, 2.5, -3.5, //
                -0.7, 0.0, 9.25, //
                4.0, 4.5, 5.0,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_interpolate_reproduces_corners() {
        let disc = two_triangles();
        let field = displacement();

        for (index, element) in disc.elements().iter().enumerate() {
            for k in 0..3 {
                let mut weights = [0.0; 3];
                weights[k] = 1.0;
                let value = interpolate(&disc, index, &weights, &field).unwrap();
                let local = element.vertices[k].local;
                for c in 0..3 {
                    assert_eq!(value[c], field.value(local, c));
                }
            }
        }
    }

    #[test]
    fn test_interpolate_broadcast() {
        let disc = two_triangles();
        let field = FieldData::broadcast(&[2.0]);
        let value = interpolate(&disc, 1, &[0.2, 0.3, 0.5], &field).unwrap();
        assert_relative_eq!(value[0], 2.0, epsilon = 1e-15);
    }

    #[test]
    fn test_interpolate_out_of_range() {
        let disc = two_triangles();
        assert!(matches!(
            interpolate(&disc, 2, &[1.0, 0.0, 0.0], &displacement()),
            Err(LodestoneError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_interpolate_wrong_rows() {
        let disc = two_triangles();
        let field = FieldData::from_rows(1, &[1.0, 2.0]).unwrap();
        assert!(matches!(
            interpolate(&disc, 0, &[1.0, 0.0, 0.0], &field),
            Err(LodestoneError::Mismatch(_))
        ));
    }

    #[test]
    fn test_integrate_area_convention() {
        let disc = two_triangles();
        assert_eq!(integrate(&disc, 0, 1, None).unwrap(), vec![1.5]);
    }

    #[test]
    fn test_integrate_field_is_not_divided_by_three() {
        let disc = two_triangles();
        let field = FieldData::broadcast(&[1.0]);

        // area 0.5, three corners of value one
        assert_eq!(integrate(&disc, 0, 1, Some(&field)).unwrap(), vec![1.5]);

        let field = displacement();
        let result = integrate(&disc, 0, 3, Some(&field)).unwrap();
        assert_relative_eq!(result[0], 0.5 * (0.1 + 1.5 - 0.7), epsilon = 1e-15);
        assert_relative_eq!(result[2], 0.5 * (0.3 - 3.5 + 9.25), epsilon = 1e-15);
    }

    #[test]
    fn test_integrate_rank_mismatch() {
        let disc = two_triangles();
        assert!(matches!(
            integrate(&disc, 0, 1, Some(&displacement())),
            Err(LodestoneError::Mismatch(_))
        ));
    }

    #[test]
    fn test_tilted_area() {
        let disc = two_triangles();
        // (1,0,0) (1,1,0.5) (0,1,0): cross of (0,1,0.5) and (-1,1,0)
        let expected = 0.5 * f64::sqrt(0.25 + 0.25 + 1.0);
        assert_relative_eq!(element_area(&disc, 1).unwrap(), expected, epsilon = 1e-15);
        assert_relative_eq!(total_area(&disc).unwrap(), 0.5 + expected, epsilon = 1e-14);
    }

    #[test]
    fn test_interpolate_bar_matches_finite_differences() {
        let disc = two_triangles();
        let field = displacement();
        let weights = [0.25, 0.6, 0.15];
        let result_bar = [0.3, -1.2, 2.0];

        let mut data_bar = vec![0.0; disc.num_points() * 3];
        interpolate_bar(&disc, 1, &weights, &result_bar, &mut data_bar).unwrap();

        let h = 1e-6;
        let base = interpolate(&disc, 1, &weights, &field).unwrap();
        for local in 0..disc.num_points() {
            for c in 0..3 {
                let mut perturbed = field.clone();
                perturbed.set(local, c, field.value(local, c) + h);
                let bumped = interpolate(&disc, 1, &weights, &perturbed).unwrap();
                let derivative: f64 =
                    (0..3).map(|r| (bumped[r] - base[r]) / h * result_bar[r]).sum();
                assert_relative_eq!(data_bar[local * 3 + c], derivative, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_integrate_bar_matches_finite_differences() {
        let disc = two_triangles();
        let field = displacement();
        let result_bar = [1.0, 0.5, -0.25];

        let mut data_bar = vec![0.0; disc.num_points() * 3];
        integrate_bar(&disc, 1, &result_bar, &mut data_bar).unwrap();

        let h = 1e-6;
        let base = integrate(&disc, 1, 3, Some(&field)).unwrap();
        for local in 0..disc.num_points() {
            for c in 0..3 {
                let mut perturbed = field.clone();
                perturbed.set(local, c, field.value(local, c) + h);
                let bumped = integrate(&disc, 1, 3, Some(&perturbed)).unwrap();
                let derivative: f64 =
                    (0..3).map(|r| (bumped[r] - base[r]) / h * result_bar[r]).sum();
                assert_relative_eq!(data_bar[local * 3 + c], derivative, epsilon = 1e-6);
            }
        }
        // vertex 0 is not on element 1
        assert_eq!(&data_bar[0..3], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_bar_accumulates() {
        let disc = two_triangles();
        let mut data_bar = vec![1.0; disc.num_points()];

        integrate_bar(&disc, 0, &[1.0], &mut data_bar).unwrap();
        integrate_bar(&disc, 1, &[1.0], &mut data_bar).unwrap();
        interpolate_bar(&disc, 0, &[1.0, 0.0, 0.0], &[2.0], &mut data_bar).unwrap();

        let a1 = element_area(&disc, 1).unwrap();
        // vertex 0 only on element 0, vertices 1 and 2 on both
        assert_relative_eq!(data_bar[0], 1.0 + 0.5 + 2.0, epsilon = 1e-15);
        assert_relative_eq!(data_bar[1], 1.0 + 0.5 + a1, epsilon = 1e-15);
        assert_relative_eq!(data_bar[3], 1.0 + a1, epsilon = 1e-15);
    }

    #[test]
    fn test_bar_buffer_size_checked() {
        let disc = two_triangles();
        let mut data_bar = vec![0.0; 5];
        assert!(matches!(
            integrate_bar(&disc, 0, &[1.0, 1.0], &mut data_bar),
            Err(LodestoneError::Mismatch(_))
        ));
    }
}
