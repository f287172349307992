//! Rotation matrix → quaternion conversion and the consumer quaternion remap.
//!
//! The tracking server reports orientation as a row-major 3x3 matrix
//! `[R11 R12 R13 R21 R22 R23 R31 R32 R33]`. Conversion produces a scalar-last
//! quaternion `(x, y, z, w)`; the consumer expects scalar-first `(w, x, y, z)`.

use nalgebra::Matrix3;
use thiserror::Error;

/// Allowed deviation of `RᵀR` from identity (max abs element).
pub const ORTHONORMAL_TOLERANCE: f32 = 1e-3;
/// Allowed deviation of `det(R)` from +1.
pub const DETERMINANT_TOLERANCE: f32 = 1e-3;

/// Why a rotation matrix was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InvalidRotation {
    /// Non-finite elements: the body was not visible this frame.
    #[error("body occluded (non-finite rotation matrix)")]
    Occluded,
    /// `RᵀR` is not identity within tolerance.
    #[error("matrix is not orthonormal (error {0:.4})")]
    NotOrthonormal(f32),
    /// Determinant is not +1 (reflection or degenerate).
    #[error("matrix is not a proper rotation (det {0:.4})")]
    Improper(f32),
}

/// Scalar-last quaternion `[x, y, z, w]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuatXyzw(pub [f32; 4]);

/// Scalar-first quaternion `[w, x, y, z]`, the consumer convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuatWxyz(pub [f32; 4]);

impl QuatWxyz {
    pub const IDENTITY: Self = Self([1.0, 0.0, 0.0, 0.0]);

    pub fn w(&self) -> f32 {
        self.0[0]
    }

    pub fn norm(&self) -> f32 {
        self.0.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

/// Output slot `i` of the consumer quaternion takes input slot
/// `XYZW_TO_WXYZ[i]` of the scalar-last quaternion.
///
/// | out | w | x | y | z |
/// |-----|---|---|---|---|
/// | in  | 3 | 0 | 1 | 2 |
pub const XYZW_TO_WXYZ: [usize; 4] = [3, 0, 1, 2];

/// Reorders a scalar-last quaternion into scalar-first order. No arithmetic.
pub fn remap_xyzw_to_wxyz(q: QuatXyzw) -> QuatWxyz {
    QuatWxyz(XYZW_TO_WXYZ.map(|src| q.0[src]))
}

/// Checks that a row-major matrix is a proper rotation.
pub fn validate(m: &[f32; 9]) -> Result<(), InvalidRotation> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(InvalidRotation::Occluded);
    }

    let r = Matrix3::from_row_slice(m);
    let residual = r.transpose() * r - Matrix3::identity();
    let ortho_error = residual.amax();
    if ortho_error > ORTHONORMAL_TOLERANCE {
        return Err(InvalidRotation::NotOrthonormal(ortho_error));
    }

    let det = r.determinant();
    if (det - 1.0).abs() > DETERMINANT_TOLERANCE {
        return Err(InvalidRotation::Improper(det));
    }
    Ok(())
}

/// Converts a row-major rotation matrix into a unit quaternion `(x, y, z, w)`.
///
/// Shepperd's method: the largest of `trace, r00, r11, r22` picks the
/// component that is extracted from a square root, the other three follow
/// from off-diagonal sums/differences. The sign is not canonicalized.
pub fn to_quaternion(m: &[f32; 9]) -> Result<QuatXyzw, InvalidRotation> {
    validate(m)?;

    let [r00, r01, r02, r10, r11, r12, r20, r21, r22] = *m;
    let trace = r00 + r11 + r22;

    let (x, y, z, w) = if trace >= r00 && trace >= r11 && trace >= r22 {
        let w = 0.5 * (1.0 + trace).sqrt();
        let s = 0.25 / w;
        ((r21 - r12) * s, (r02 - r20) * s, (r10 - r01) * s, w)
    } else if r00 >= r11 && r00 >= r22 {
        let x = 0.5 * (1.0 + r00 - r11 - r22).sqrt();
        let s = 0.25 / x;
        (x, (r01 + r10) * s, (r02 + r20) * s, (r21 - r12) * s)
    } else if r11 >= r22 {
        let y = 0.5 * (1.0 - r00 + r11 - r22).sqrt();
        let s = 0.25 / y;
        ((r01 + r10) * s, y, (r12 + r21) * s, (r02 - r20) * s)
    } else {
        let z = 0.5 * (1.0 - r00 - r11 + r22).sqrt();
        let s = 0.25 / z;
        ((r02 + r20) * s, (r12 + r21) * s, z, (r10 - r01) * s)
    };

    // normalize away the tolerance admitted by validate()
    let len = (x * x + y * y + z * z + w * w).sqrt();
    Ok(QuatXyzw([x / len, y / len, z / len, w / len]))
}

/// Matrix → quaternion in the consumer's scalar-first convention.
pub fn to_consumer_quaternion(m: &[f32; 9]) -> Result<QuatWxyz, InvalidRotation> {
    to_quaternion(m).map(remap_xyzw_to_wxyz)
}
