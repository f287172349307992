//! Consumer boundary: where normalized poses leave the relay.

use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::net::UdpSocket;

use crate::error::{BridgeError, Result};
use crate::frame::NormalizedPose;

/// OSC address of pose messages
pub const POSE_ADDRESS: &str = "/mocap/pose";

/// Receives poses in frame order, one call per body per frame.
pub trait PoseSink {
    fn publish(&mut self, body: &str, pose: &NormalizedPose) -> Result<()>;
}

impl<S: PoseSink + ?Sized> PoseSink for Box<S> {
    fn publish(&mut self, body: &str, pose: &NormalizedPose) -> Result<()> {
        (**self).publish(body, pose)
    }
}

/// Builds the OSC pose message.
/// Args: body, frame, valid, w, x, y, z, px, py, pz
pub fn build_osc_message(body: &str, pose: &NormalizedPose) -> OscMessage {
    let [w, x, y, z] = pose.rotation.0;
    OscMessage {
        addr: POSE_ADDRESS.to_string(),
        args: vec![
            OscType::String(body.to_string()),
            // u32 does not fit an OSC int32
            OscType::Long(i64::from(pose.frame_number)),
            OscType::Bool(pose.valid),
            OscType::Float(w),
            OscType::Float(x),
            OscType::Float(y),
            OscType::Float(z),
            OscType::Float(pose.position[0]),
            OscType::Float(pose.position[1]),
            OscType::Float(pose.position[2]),
        ],
    }
}

pub fn encode_osc_message(msg: &OscMessage) -> Result<Vec<u8>> {
    let packet = OscPacket::Message(msg.clone());
    encoder::encode(&packet).map_err(|e| BridgeError::Sink(e.to_string()))
}

/// Pushes poses as OSC over UDP.
pub struct OscSink {
    socket: UdpSocket,
    target_addr: String,
}

impl OscSink {
    pub fn new(target_addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| BridgeError::Sink(e.to_string()))?;
        Ok(Self {
            socket,
            target_addr: target_addr.to_string(),
        })
    }
}

impl PoseSink for OscSink {
    fn publish(&mut self, body: &str, pose: &NormalizedPose) -> Result<()> {
        let msg = build_osc_message(body, pose);
        let data = encode_osc_message(&msg)?;
        self.socket
            .send_to(&data, &self.target_addr)
            .map_err(|e| BridgeError::Sink(format!("{}: {}", self.target_addr, e)))?;
        Ok(())
    }
}

/// Writes poses to the log only. Used when no consumer is configured.
#[derive(Debug, Default)]
pub struct LogSink;

impl PoseSink for LogSink {
    fn publish(&mut self, body: &str, pose: &NormalizedPose) -> Result<()> {
        if pose.valid {
            let [w, x, y, z] = pose.rotation.0;
            tracing::info!(
                "{} #{} pos [{:.1}, {:.1}, {:.1}] quat [{:.4}, {:.4}, {:.4}, {:.4}]",
                body,
                pose.frame_number,
                pose.position[0],
                pose.position[1],
                pose.position[2],
                w,
                x,
                y,
                z
            );
        } else {
            tracing::info!("{} #{} not tracked", body, pose.frame_number);
        }
        Ok(())
    }
}
