//! Per-face tangent space derived from triangle edges and UV deltas.
//!
//! For a triangle `(a, b, c)` the edges `E1 = b - a`, `E2 = c - a` are
//! expressed in terms of the UV deltas `ΔUV1`, `ΔUV2`:
//!
//! ```text
//! | E1 |   | ΔU1  ΔV1 | | T |
//! | E2 | = | ΔU2  ΔV2 | | B |
//! ```
//!
//! Inverting the 2×2 UV matrix yields the tangent `T` and bitangent `B`.
//! The vectors are left unnormalised: their length carries the ratio of
//! object-space size to texture-space size.

use glam::{Vec2, Vec3};

use crate::error::BasisError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TangentBasis {
    pub tangent: Vec3,
    pub bitangent: Vec3,
}

impl TangentBasis {
    /// Computes the basis, rejecting UV triples whose determinant is zero.
    pub fn from_triangle(positions: [Vec3; 3], uvs: [Vec2; 3]) -> Result<Self, BasisError> {
        let (delta_uv1, delta_uv2) = uv_deltas(uvs);
        let determinant = uv_determinant(delta_uv1, delta_uv2);
        if determinant == 0.0 || !(1.0 / determinant).is_finite() {
            return Err(BasisError::Degenerate { determinant });
        }
        Ok(Self::from_triangle_unchecked(positions, uvs))
    }

    /// Raw closed-form evaluation.
    ///
    /// A zero UV determinant makes the scale factor infinite and the result
    /// non-finite; use [`TangentBasis::from_triangle`] to get an error instead.
    pub fn from_triangle_unchecked(positions: [Vec3; 3], uvs: [Vec2; 3]) -> Self {
        let edge1 = positions[1] - positions[0];
        let edge2 = positions[2] - positions[0];
        let (delta_uv1, delta_uv2) = uv_deltas(uvs);

        let f = 1.0 / uv_determinant(delta_uv1, delta_uv2);

        Self {
            tangent: f * (delta_uv2.y * edge1 - delta_uv1.y * edge2),
            bitangent: f * (-delta_uv2.x * edge1 + delta_uv1.x * edge2),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.tangent.is_finite() && self.bitangent.is_finite()
    }
}

fn uv_deltas(uvs: [Vec2; 3]) -> (Vec2, Vec2) {
    (uvs[1] - uvs[0], uvs[2] - uvs[0])
}

fn uv_determinant(delta_uv1: Vec2, delta_uv2: Vec2) -> f32 {
    delta_uv1.x * delta_uv2.y - delta_uv2.x * delta_uv1.y
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    fn canonical_first_triangle() -> ([Vec3; 3], [Vec2; 3]) {
        (
            [
                Vec3::new(-1.0, 1.0, 0.0),
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
            ],
            [Vec2::new(0.0, 1.0), Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)],
        )
    }

    #[test]
    fn canonical_triangle_basis_follows_uv_axes() {
        let (positions, uvs) = canonical_first_triangle();
        let basis = TangentBasis::from_triangle(positions, uvs).unwrap();

        // The quad spans two units per unit of UV, and the length is kept.
        assert!(basis.tangent.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), EPSILON));
        assert!(basis.bitangent.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), EPSILON));
        assert!(basis
            .tangent
            .normalize()
            .abs_diff_eq(Vec3::X, EPSILON));
        assert!(basis
            .bitangent
            .normalize()
            .abs_diff_eq(Vec3::Y, EPSILON));
    }

    #[test]
    fn tangent_is_orthogonal_to_face_normal() {
        let normal = Vec3::Z;
        let cases = [
            canonical_first_triangle(),
            (
                [
                    Vec3::new(0.0, 0.0, 0.0),
                    Vec3::new(3.0, 0.0, 0.0),
                    Vec3::new(0.0, 2.0, 0.0),
                ],
                [Vec2::new(0.0, 0.0), Vec2::new(0.5, 0.25), Vec2::new(0.1, 0.9)],
            ),
        ];

        for (positions, uvs) in cases {
            let basis = TangentBasis::from_triangle(positions, uvs).unwrap();
            assert!(basis.tangent.dot(normal).abs() < EPSILON);
            assert!(basis.bitangent.dot(normal).abs() < EPSILON);
        }
    }

    #[test]
    fn scaled_uvs_shrink_the_basis() {
        let (positions, uvs) = canonical_first_triangle();
        let doubled = uvs.map(|uv| uv * 2.0);
        let basis = TangentBasis::from_triangle(positions, doubled).unwrap();
        assert!(basis.tangent.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), EPSILON));
    }

    #[test]
    fn collinear_uvs_are_reported_as_degenerate() {
        let (positions, _) = canonical_first_triangle();
        let uvs = [Vec2::new(0.0, 0.0), Vec2::new(0.5, 0.5), Vec2::new(1.0, 1.0)];

        let err = TangentBasis::from_triangle(positions, uvs).unwrap_err();
        assert_eq!(err, BasisError::Degenerate { determinant: 0.0 });

        let raw = TangentBasis::from_triangle_unchecked(positions, uvs);
        assert!(!raw.is_finite());
    }
}
