//! QTM real-time protocol client (tracking-source side).

pub mod client;
pub mod packet;

pub use client::{QtmClient, QtmConnector, PROTOCOL_VERSION};
pub use packet::Packet;
