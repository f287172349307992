//! Per-frame data: what the tracking server sends and what the consumer gets.

use crate::rotation::QuatWxyz;

/// One body's 6DoF observation as reported by the tracking server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPose {
    /// Position (x, y, z) in server units, normally millimetres
    pub position: [f32; 3],
    /// Rotation matrix, row-major `[R11 R12 R13 R21 .. R33]`
    pub rotation: [f32; 9],
}

impl RawPose {
    pub fn new(position: [f32; 3], rotation: [f32; 9]) -> Self {
        Self { position, rotation }
    }

    /// The server's marker for a body that was not visible: all NaN.
    pub fn occluded() -> Self {
        Self {
            position: [f32::NAN; 3],
            rotation: [f32::NAN; 9],
        }
    }

    pub fn is_occluded(&self) -> bool {
        self.rotation.iter().any(|v| v.is_nan())
    }
}

/// Timecode component attached to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timecode {
    Smpte {
        hours: u8,
        minutes: u8,
        seconds: u8,
        frame: u8,
    },
    Irig {
        year: u16,
        day: u16,
        hours: u8,
        minutes: u8,
        seconds: u8,
        tenths: u8,
    },
    /// Free-running camera clock ticks.
    CameraTime(u64),
}

/// A 6D data packet from the tracking server.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub frame_number: u32,
    /// Server capture timestamp in microseconds
    pub timestamp_us: u64,
    pub timecode: Option<Timecode>,
    /// Indexed by `BodyIndex`
    pub bodies: Vec<RawPose>,
}

impl RawFrame {
    pub fn new(frame_number: u32, bodies: Vec<RawPose>) -> Self {
        Self {
            frame_number,
            timestamp_us: 0,
            timecode: None,
            bodies,
        }
    }
}

/// Pose observation handed to the consumer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedPose {
    /// Attitude, scalar-first (w, x, y, z)
    pub rotation: QuatWxyz,
    /// Position in the consumer frame
    pub position: [f32; 3],
    pub frame_number: u32,
    pub timestamp_us: u64,
    pub timecode: Option<Timecode>,
    /// false when the body was occluded or its rotation degenerate
    pub valid: bool,
}

impl NormalizedPose {
    /// Tracking lost on this frame. Rotation/position are placeholders.
    pub fn invalid(frame: &RawFrame) -> Self {
        Self {
            rotation: QuatWxyz::IDENTITY,
            position: [0.0; 3],
            frame_number: frame.frame_number,
            timestamp_us: frame.timestamp_us,
            timecode: frame.timecode,
            valid: false,
        }
    }
}
