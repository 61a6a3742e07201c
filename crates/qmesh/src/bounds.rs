//! Bounding geometry: Ritter bounding sphere and Cesium's horizon occlusion
//! point.
//!
//! HYPC never computes a bounding volume — it stores raw per-point offsets
//! and nothing else — so this module's overall shape (scan a point slice,
//! track running extrema, derive a single summary value) is grounded on the
//! general point-cloud bounding-sphere pattern in the pack
//! (`HelixOS-Org-helix`'s mesh bounding sphere: an extent scan folded into a
//! center + radius), generalized into Ritter's two-candidate algorithm and
//! the exact horizon-point formula `spec.md` specifies.

use crate::error::{Error, Result};
use crate::geodesy::Vec3;

/// A bounding sphere: `center` plus `radius`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f64,
}

/// Ritter's bounding-sphere algorithm, compared against the naive
/// AABB-midpoint sphere and the smaller of the two is kept.
///
/// Fails with [`Error::EmptyBoundingInput`] if `points.len() < 2`.
pub fn bounding_sphere(points: &[Vec3]) -> Result<BoundingSphere> {
    if points.len() < 2 {
        return Err(Error::EmptyBoundingInput(points.len()));
    }

    let mut min_x = points[0];
    let mut max_x = points[0];
    let mut min_y = points[0];
    let mut max_y = points[0];
    let mut min_z = points[0];
    let mut max_z = points[0];

    for &p in points {
        if p.x < min_x.x {
            min_x = p;
        }
        if p.x > max_x.x {
            max_x = p;
        }
        if p.y < min_y.y {
            min_y = p;
        }
        if p.y > max_y.y {
            max_y = p;
        }
        if p.z < min_z.z {
            min_z = p;
        }
        if p.z > max_z.z {
            max_z = p;
        }
    }

    let x_span = max_x.distance_squared(min_x);
    let y_span = max_y.distance_squared(min_y);
    let z_span = max_z.distance_squared(min_z);

    let (mut diameter1, mut diameter2, mut max_span) = (min_x, max_x, x_span);
    if y_span > max_span {
        max_span = y_span;
        diameter1 = min_y;
        diameter2 = max_y;
    }
    if z_span > max_span {
        diameter1 = min_z;
        diameter2 = max_z;
    }

    let mut ritter_center = lerp_midpoint(diameter1, diameter2);
    let mut radius_squared = diameter2.distance_squared(ritter_center);
    let mut ritter_radius = radius_squared.sqrt();

    for &p in points {
        let old_center_to_point_sq = p.distance_squared(ritter_center);
        if old_center_to_point_sq > radius_squared {
            let old_center_to_point = old_center_to_point_sq.sqrt();
            ritter_radius = (ritter_radius + old_center_to_point) * 0.5;
            let old_to_new = old_center_to_point - ritter_radius;
            ritter_center = Vec3::new(
                (ritter_radius * ritter_center.x + old_to_new * p.x) / old_center_to_point,
                (ritter_radius * ritter_center.y + old_to_new * p.y) / old_center_to_point,
                (ritter_radius * ritter_center.z + old_to_new * p.z) / old_center_to_point,
            );
            radius_squared = ritter_radius * ritter_radius;
        }
    }

    let naive_center = Vec3::new(
        (min_x.x + max_x.x) * 0.5,
        (min_y.y + max_y.y) * 0.5,
        (min_z.z + max_z.z) * 0.5,
    );
    let mut naive_radius: f64 = 0.0;
    for &p in points {
        let r = p.sub(naive_center).norm();
        if r > naive_radius {
            naive_radius = r;
        }
    }

    if naive_radius < ritter_radius {
        Ok(BoundingSphere {
            center: naive_center,
            radius: naive_radius,
        })
    } else {
        Ok(BoundingSphere {
            center: ritter_center,
            radius: ritter_radius,
        })
    }
}

#[inline]
fn lerp_midpoint(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5, (a.z + b.z) * 0.5)
}

/// Horizon occlusion point, after
/// <https://cesiumjs.org/2013/05/09/Computing-the-horizon-occlusion-point/>.
///
/// `points` and `sphere` must be in ECEF meters. Returns a point in ECEF
/// meters whose visibility gates whether the whole tile can be culled due to
/// earth curvature.
pub fn horizon_occlusion_point(points: &[Vec3], sphere: &BoundingSphere) -> Result<Vec3> {
    if points.is_empty() {
        return Err(Error::EmptyBoundingInput(0));
    }

    let inv_axes = Vec3::new(
        1.0 / crate::geodesy::WGS84_A,
        1.0 / crate::geodesy::WGS84_A,
        1.0 / crate::geodesy::WGS84_B,
    );

    let scaled_center = sphere.center.mul_components(inv_axes);

    let mut max_magnitude = f64::NEG_INFINITY;
    for &p in points {
        let scaled = p.mul_components(inv_axes);
        let m = compute_magnitude(scaled, scaled_center);
        if m > max_magnitude {
            max_magnitude = m;
        }
    }

    let scaled_result = scaled_center.scale(max_magnitude);
    // Undo the ellipsoid scale-down so the result is genuine ECEF, matching
    // the rest of the header's geocentric fields.
    Ok(Vec3::new(
        scaled_result.x / inv_axes.x,
        scaled_result.y / inv_axes.y,
        scaled_result.z / inv_axes.z,
    ))
}

fn compute_magnitude(point: Vec3, sphere_center: Vec3) -> f64 {
    let magnitude_squared = point.norm_squared();
    let magnitude = magnitude_squared.sqrt();
    let direction = point.scale(1.0 / magnitude);

    let magnitude_squared = magnitude_squared.max(1.0);
    let magnitude = magnitude.max(1.0);

    let cos_alpha = direction.dot(sphere_center);
    let sin_alpha = direction.cross(sphere_center).norm();
    let cos_beta = 1.0 / magnitude;
    let sin_beta = (magnitude_squared - 1.0).sqrt() * cos_beta;

    1.0 / (cos_alpha * cos_beta - sin_alpha * sin_beta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_sphere_rejects_fewer_than_two_points() {
        let err = bounding_sphere(&[Vec3::ZERO]).unwrap_err();
        assert!(matches!(err, Error::EmptyBoundingInput(1)));
    }

    #[test]
    fn bounding_sphere_contains_all_cube_corners() {
        let mut pts = Vec::new();
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    pts.push(Vec3::new(x, y, z));
                }
            }
        }
        let sphere = bounding_sphere(&pts).unwrap();
        for &p in &pts {
            assert!(
                p.distance_squared(sphere.center) <= sphere.radius * sphere.radius + 1e-9,
                "point {p:?} outside sphere {sphere:?}"
            );
        }
    }

    #[test]
    fn bounding_sphere_two_points_is_their_midpoint() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(2.0, 0.0, 0.0);
        let sphere = bounding_sphere(&[a, b]).unwrap();
        assert!((sphere.center.x - 1.0).abs() < 1e-9);
        assert!((sphere.radius - 1.0).abs() < 1e-9);
    }

    #[test]
    fn horizon_point_is_finite_and_beyond_sphere() {
        let points = [
            crate::geodesy::llh_to_ecef(-122.0, 37.0, 0.0),
            crate::geodesy::llh_to_ecef(-121.9, 37.1, 100.0),
            crate::geodesy::llh_to_ecef(-121.8, 37.0, 50.0),
        ];
        let sphere = bounding_sphere(&points).unwrap();
        let hp = horizon_occlusion_point(&points, &sphere).unwrap();
        assert!(hp.x.is_finite() && hp.y.is_finite() && hp.z.is_finite());
    }
}
