//! Tracking-server → consumer position frame transform.
//!
//! Identity by default: positions are passed through unchanged until the
//! consumer frame (e.g. NED, metres) is pinned down in configuration.

use nalgebra::{Matrix3, Vector3};

use crate::config::TransformConfig;

/// `p' = scale * M * p`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionTransform {
    matrix: Matrix3<f32>,
    scale: f32,
}

impl PositionTransform {
    /// `rows` is row-major, matching how it is written in the config file.
    pub fn new(rows: [[f32; 3]; 3], scale: f32) -> Self {
        let matrix = Matrix3::from_row_slice(&rows.concat());
        Self { matrix, scale }
    }

    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
            scale: 1.0,
        }
    }

    pub fn from_config(config: &TransformConfig) -> Self {
        Self::new(config.matrix, config.scale)
    }

    pub fn is_identity(&self) -> bool {
        self.scale == 1.0 && self.matrix == Matrix3::identity()
    }

    pub fn apply(&self, position: [f32; 3]) -> [f32; 3] {
        let p = self.matrix * Vector3::from(position) * self.scale;
        [p.x, p.y, p.z]
    }
}

impl Default for PositionTransform {
    fn default() -> Self {
        Self::identity()
    }
}
