//! QTM real-time protocol packets (little-endian port).
//!
//! Every packet is `u32 size` (whole packet, header included) + `u32 type`
//! + payload. Framing is done by `LengthDelimitedCodec`; this module only
//! deals with what is left after the size field has been stripped.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::LengthDelimitedCodec;

use crate::error::{BridgeError, Result};
use crate::frame::{RawFrame, RawPose, Timecode};

/// Largest packet accepted from the server.
pub const MAX_PACKET_LEN: usize = 16 * 1024 * 1024; // 16MB

pub const TYPE_ERROR: u32 = 0;
pub const TYPE_COMMAND: u32 = 1;
pub const TYPE_XML: u32 = 2;
pub const TYPE_DATA: u32 = 3;
pub const TYPE_NO_MORE_DATA: u32 = 4;
pub const TYPE_EVENT: u32 = 6;

pub const COMPONENT_6D: u32 = 5;
pub const COMPONENT_TIMECODE: u32 = 20;

const COMPONENT_HEADER_LEN: usize = 8;
/// 3 position + 9 rotation floats
const BODY_LEN: usize = 12 * 4;

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Error(String),
    Command(String),
    Xml(String),
    Data(RawFrame),
    NoMoreData,
    Event(u8),
    /// Packet types the relay does not use (C3D, discover, QTM file)
    Other(u32),
}

impl Packet {
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Error(_) => "error",
            Packet::Command(_) => "command",
            Packet::Xml(_) => "xml",
            Packet::Data(_) => "data",
            Packet::NoMoreData => "no-more-data",
            Packet::Event(_) => "event",
            Packet::Other(_) => "other",
        }
    }
}

/// Length-prefixed framing matching the RT packet header.
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .little_endian()
        .length_field_offset(0)
        .length_field_length(4)
        // size counts itself
        .length_adjustment(-4)
        .num_skip(4)
        .max_frame_length(MAX_PACKET_LEN)
        .new_codec()
}

/// Body of an outgoing command packet (type + NUL-terminated text).
pub fn encode_command(command: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + command.len() + 1);
    buf.put_u32_le(TYPE_COMMAND);
    buf.put_slice(command.as_bytes());
    buf.put_u8(0);
    buf.freeze()
}

/// Decodes one framed packet (size field already removed).
pub fn decode(mut buf: &[u8]) -> Result<Packet> {
    let kind = read_u32(&mut buf, "packet type")?;
    match kind {
        TYPE_ERROR => Ok(Packet::Error(text(buf))),
        TYPE_COMMAND => Ok(Packet::Command(text(buf))),
        TYPE_XML => Ok(Packet::Xml(text(buf))),
        TYPE_DATA => parse_data(buf).map(Packet::Data),
        TYPE_NO_MORE_DATA => Ok(Packet::NoMoreData),
        TYPE_EVENT => {
            let event = buf
                .first()
                .copied()
                .ok_or_else(|| BridgeError::protocol("empty event packet"))?;
            Ok(Packet::Event(event))
        }
        other => Ok(Packet::Other(other)),
    }
}

/// Text payloads are NUL-terminated ASCII/UTF-8.
fn text(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn read_u32(buf: &mut &[u8], what: &str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(BridgeError::protocol(format!("truncated {}", what)));
    }
    Ok(buf.get_u32_le())
}

/// Data packet payload: header, then components.
///
/// A data packet without a 6D component yields an empty body list.
pub fn parse_data(mut buf: &[u8]) -> Result<RawFrame> {
    if buf.remaining() < 16 {
        return Err(BridgeError::protocol("truncated data header"));
    }
    let timestamp_us = buf.get_u64_le();
    let frame_number = buf.get_u32_le();
    let component_count = buf.get_u32_le();

    let mut frame = RawFrame {
        frame_number,
        timestamp_us,
        timecode: None,
        bodies: Vec::new(),
    };

    for _ in 0..component_count {
        let size = read_u32(&mut buf, "component size")? as usize;
        let kind = read_u32(&mut buf, "component type")?;
        let len = size
            .checked_sub(COMPONENT_HEADER_LEN)
            .ok_or_else(|| BridgeError::protocol(format!("component size {} too small", size)))?;
        if buf.remaining() < len {
            return Err(BridgeError::protocol(format!(
                "component {} claims {} bytes, {} left",
                kind,
                len,
                buf.remaining()
            )));
        }
        let (body, rest) = buf.split_at(len);
        match kind {
            COMPONENT_6D => frame.bodies = parse_6d(body)?,
            COMPONENT_TIMECODE => frame.timecode = parse_timecode(body)?,
            _ => tracing::trace!(component = kind, "skipping component"),
        }
        buf = rest;
    }

    Ok(frame)
}

fn parse_6d(mut buf: &[u8]) -> Result<Vec<RawPose>> {
    if buf.remaining() < 8 {
        return Err(BridgeError::protocol("truncated 6D component"));
    }
    let body_count = buf.get_u32_le() as usize;
    let _drop_rate = buf.get_u16_le();
    let _out_of_sync = buf.get_u16_le();

    if buf.remaining() < body_count * BODY_LEN {
        return Err(BridgeError::protocol(format!(
            "6D component declares {} bodies, only {} bytes",
            body_count,
            buf.remaining()
        )));
    }

    let bodies = (0..body_count)
        .map(|_| {
            let position = std::array::from_fn(|_| buf.get_f32_le());
            let rotation = std::array::from_fn(|_| buf.get_f32_le());
            RawPose::new(position, rotation)
        })
        .collect();
    Ok(bodies)
}

/// First timecode entry wins; the server sends one per configured source.
fn parse_timecode(mut buf: &[u8]) -> Result<Option<Timecode>> {
    let count = read_u32(&mut buf, "timecode count")?;
    if count == 0 {
        return Ok(None);
    }
    if buf.remaining() < 12 {
        return Err(BridgeError::protocol("truncated timecode"));
    }
    let kind = buf.get_u32_le();
    let hi = buf.get_u32_le();
    let lo = buf.get_u32_le();

    let timecode = match kind {
        0 => Timecode::Smpte {
            hours: (hi & 0x1f) as u8,
            minutes: ((hi >> 5) & 0x3f) as u8,
            seconds: ((hi >> 11) & 0x3f) as u8,
            frame: ((hi >> 17) & 0x1f) as u8,
        },
        1 => Timecode::Irig {
            year: (hi & 0x7f) as u16,
            day: ((hi >> 7) & 0x1ff) as u16,
            hours: (lo & 0x1f) as u8,
            minutes: ((lo >> 5) & 0x3f) as u8,
            seconds: ((lo >> 11) & 0x3f) as u8,
            tenths: ((lo >> 17) & 0xf) as u8,
        },
        2 => Timecode::CameraTime(((hi as u64) << 32) | lo as u64),
        other => {
            tracing::debug!(kind = other, "unknown timecode type");
            return Ok(None);
        }
    };
    Ok(Some(timecode))
}

/// Builds a data packet body the way the server does. Used by the fake
/// server in tests and by the probe's self-check.
pub fn encode_data(frame: &RawFrame) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u32_le(TYPE_DATA);
    buf.put_u64_le(frame.timestamp_us);
    buf.put_u32_le(frame.frame_number);
    buf.put_u32_le(if frame.timecode.is_some() { 2 } else { 1 });

    buf.put_u32_le((COMPONENT_HEADER_LEN + 8 + frame.bodies.len() * BODY_LEN) as u32);
    buf.put_u32_le(COMPONENT_6D);
    buf.put_u32_le(frame.bodies.len() as u32);
    buf.put_u16_le(0);
    buf.put_u16_le(0);
    for body in &frame.bodies {
        for v in body.position.iter().chain(body.rotation.iter()) {
            buf.put_f32_le(*v);
        }
    }

    if let Some(tc) = frame.timecode {
        let (kind, hi, lo) = match tc {
            Timecode::Smpte { hours, minutes, seconds, frame } => (
                0u32,
                hours as u32 | (minutes as u32) << 5 | (seconds as u32) << 11 | (frame as u32) << 17,
                0u32,
            ),
            Timecode::Irig { year, day, hours, minutes, seconds, tenths } => (
                1,
                year as u32 | (day as u32) << 7,
                hours as u32 | (minutes as u32) << 5 | (seconds as u32) << 11 | (tenths as u32) << 17,
            ),
            Timecode::CameraTime(ticks) => (2, (ticks >> 32) as u32, ticks as u32),
        };
        buf.put_u32_le((COMPONENT_HEADER_LEN + 4 + 12) as u32);
        buf.put_u32_le(COMPONENT_TIMECODE);
        buf.put_u32_le(1);
        buf.put_u32_le(kind);
        buf.put_u32_le(hi);
        buf.put_u32_le(lo);
    }

    buf.freeze()
}

/// Body of a text packet of the given type.
pub fn encode_text(kind: u32, text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + text.len() + 1);
    buf.put_u32_le(kind);
    buf.put_slice(text.as_bytes());
    buf.put_u8(0);
    buf.freeze()
}
