//! Raw frame → normalized pose(s).

use crate::error::Result;
use crate::frame::{NormalizedPose, RawFrame, RawPose};
use crate::position::PositionTransform;
use crate::registry::BodyRegistry;
use crate::rotation;

/// Which bodies are forwarded. Fixed by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Only this body (vehicle control)
    Body(String),
    /// Every body, tagged by name (diagnostics)
    All,
}

impl Target {
    pub const ALL_KEYWORD: &'static str = "all";

    pub fn parse(selector: &str) -> Self {
        if selector == Self::ALL_KEYWORD {
            Target::All
        } else {
            Target::Body(selector.to_string())
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Body(name) => f.write_str(name),
            Target::All => f.write_str(Self::ALL_KEYWORD),
        }
    }
}

/// Output of one `adapt` call. Body names borrow from the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Adapted<'r> {
    Single {
        body: &'r str,
        pose: NormalizedPose,
    },
    Broadcast(Vec<(&'r str, NormalizedPose)>),
}

impl<'r> Adapted<'r> {
    /// (body, pose) pairs in registry order.
    pub fn poses(&self) -> Vec<(&'r str, &NormalizedPose)> {
        match self {
            Adapted::Single { body, pose } => vec![(*body, pose)],
            Adapted::Broadcast(all) => all.iter().map(|(name, pose)| (*name, pose)).collect(),
        }
    }

    pub fn invalid_count(&self) -> usize {
        self.poses().iter().filter(|(_, p)| !p.valid).count()
    }
}

pub struct FrameAdapter {
    target: Target,
    transform: PositionTransform,
}

impl FrameAdapter {
    pub fn new(target: Target, transform: PositionTransform) -> Self {
        Self { target, transform }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Adapts one frame.
    ///
    /// Errors: `ConfigurationMismatch` when the frame's body count differs
    /// from the registry (session-fatal), `BodyNotFound` when the target is
    /// not registered (frame dropped). Occluded or degenerate rotations are
    /// not errors; they yield `valid == false`.
    pub fn adapt<'r>(&self, frame: &RawFrame, registry: &'r BodyRegistry) -> Result<Adapted<'r>> {
        registry.ensure_body_count(frame.bodies.len())?;

        match &self.target {
            Target::Body(name) => {
                let index = registry.lookup(name)?;
                let body = registry.name_of(index).unwrap_or_default();
                let pose = self.normalize(frame, &frame.bodies[index]);
                Ok(Adapted::Single { body, pose })
            }
            Target::All => {
                let poses = registry
                    .names()
                    .zip(&frame.bodies)
                    .map(|(name, raw)| (name, self.normalize(frame, raw)))
                    .collect();
                Ok(Adapted::Broadcast(poses))
            }
        }
    }

    fn normalize(&self, frame: &RawFrame, raw: &RawPose) -> NormalizedPose {
        if raw.is_occluded() {
            tracing::trace!(frame = frame.frame_number, "occluded");
            return NormalizedPose::invalid(frame);
        }
        let rotation = match rotation::to_consumer_quaternion(&raw.rotation) {
            Ok(q) => q,
            Err(reason) => {
                tracing::trace!(frame = frame.frame_number, %reason, "pose invalid");
                return NormalizedPose::invalid(frame);
            }
        };
        if raw.position.iter().any(|v| !v.is_finite()) {
            tracing::trace!(frame = frame.frame_number, "position not finite");
            return NormalizedPose::invalid(frame);
        }

        NormalizedPose {
            rotation,
            position: self.transform.apply(raw.position),
            frame_number: frame.frame_number,
            timestamp_us: frame.timestamp_us,
            timecode: frame.timecode,
            valid: true,
        }
    }
}
