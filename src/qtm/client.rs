//! TCP client for the QTM real-time server.

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use super::packet::{self, Packet};
use crate::error::{BridgeError, Result};
use crate::frame::RawFrame;
use crate::source::{component_list, Component, Connector, StreamRate, TrackingSource};

/// Protocol version requested after the greeting.
pub const PROTOCOL_VERSION: &str = "1.25";

const GREETING: &str = "QTM RT Interface connected";

pub type PacketStream = Framed<TcpStream, LengthDelimitedCodec>;

pub struct QtmClient {
    stream: PacketStream,
    timeout: Duration,
}

impl QtmClient {
    /// Connects, reads the greeting and negotiates the protocol version.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let tcp = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| BridgeError::connect_failed(addr, "timed out"))?
            .map_err(|e| BridgeError::connect_failed(addr, e))?;
        tcp.set_nodelay(true)
            .map_err(|e| BridgeError::connect_failed(addr, e))?;

        let mut client = Self {
            stream: Framed::new(tcp, packet::codec()),
            timeout,
        };

        match client.recv_timed().await {
            Ok(Packet::Command(text)) if text.starts_with(GREETING) => {}
            Ok(Packet::Error(text)) => return Err(BridgeError::connect_failed(addr, text)),
            Ok(other) => {
                return Err(BridgeError::connect_failed(
                    addr,
                    format!("unexpected greeting ({})", other.kind()),
                ))
            }
            Err(e) => return Err(BridgeError::connect_failed(addr, e)),
        }

        let reply = client.command(&format!("Version {}", PROTOCOL_VERSION)).await?;
        if !reply.starts_with("Version set to") {
            return Err(BridgeError::protocol(format!("version rejected: {}", reply)));
        }
        tracing::debug!(addr, version = PROTOCOL_VERSION, "RT session open");
        Ok(client)
    }

    async fn send(&mut self, command: &str) -> Result<()> {
        tracing::trace!(command, "->");
        self.stream
            .send(packet::encode_command(command))
            .await
            .map_err(BridgeError::transport)
    }

    async fn recv(&mut self) -> Result<Packet> {
        match self.stream.next().await {
            Some(Ok(bytes)) => packet::decode(&bytes),
            Some(Err(e)) => Err(BridgeError::transport(e)),
            None => Err(BridgeError::transport("connection closed")),
        }
    }

    async fn recv_timed(&mut self) -> Result<Packet> {
        tokio::time::timeout(self.timeout, self.recv())
            .await
            .map_err(|_| BridgeError::transport("timed out waiting for reply"))?
    }

    /// Sends a command and waits for the first command or error reply.
    /// Data and event packets arriving meanwhile are discarded.
    async fn command(&mut self, command: &str) -> Result<String> {
        self.send(command).await?;
        loop {
            match self.recv_timed().await? {
                Packet::Command(reply) => {
                    tracing::trace!(reply = reply.as_str(), "<-");
                    return Ok(reply);
                }
                Packet::Error(reason) => {
                    return Err(BridgeError::protocol(format!("{}: {}", command, reason)))
                }
                other => self.discard(&other),
            }
        }
    }

    /// Sends a command whose reply must start with `expected`.
    async fn command_expect(&mut self, command: &str, expected: &[&str]) -> Result<()> {
        let reply = self.command(command).await?;
        if expected.iter().any(|e| reply.starts_with(e)) {
            Ok(())
        } else {
            Err(BridgeError::protocol(format!("{}: unexpected reply '{}'", command, reply)))
        }
    }

    fn discard(&self, packet: &Packet) {
        match packet {
            Packet::Data(frame) => {
                tracing::debug!(frame = frame.frame_number, "discarding frame outside streaming")
            }
            other => tracing::debug!(kind = other.kind(), "discarding packet"),
        }
    }
}

impl TrackingSource for QtmClient {
    async fn take_control(&mut self, password: &str) -> Result<()> {
        self.send(&format!("TakeControl {}", password)).await?;
        loop {
            match self.recv_timed().await? {
                Packet::Command(reply)
                    if reply.starts_with("You are now master")
                        || reply.starts_with("You are already master") =>
                {
                    return Ok(())
                }
                Packet::Command(reply) => return Err(BridgeError::ControlDenied(reply)),
                Packet::Error(reason) => return Err(BridgeError::ControlDenied(reason)),
                other => self.discard(&other),
            }
        }
    }

    async fn release_control(&mut self) -> Result<()> {
        self.command_expect("ReleaseControl", &["You are now a regular client"])
            .await
    }

    async fn new_measurement(&mut self) -> Result<()> {
        self.command_expect("New", &["Creating new connection", "Already connected"])
            .await
    }

    async fn load(&mut self, file: &str) -> Result<()> {
        self.command_expect(&format!("Load \"{}\"", file), &["Measurement loaded"])
            .await
    }

    async fn start_rt_from_file(&mut self) -> Result<()> {
        self.command_expect("Start rtfromfile", &["Starting RT from file"])
            .await
    }

    async fn get_parameters(&mut self, components: &[Component]) -> Result<String> {
        let command = format!("GetParameters {}", component_list(components));
        self.send(&command).await?;
        loop {
            match self.recv_timed().await? {
                Packet::Xml(xml) => return Ok(xml),
                Packet::Error(reason) => {
                    return Err(BridgeError::protocol(format!("{}: {}", command, reason)))
                }
                other => self.discard(&other),
            }
        }
    }

    async fn stream_frames(&mut self, rate: StreamRate, components: &[Component]) -> Result<()> {
        self.send(&format!("StreamFrames {} {}", rate, component_list(components)))
            .await
    }

    async fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        loop {
            match self.recv().await? {
                Packet::Data(frame) => return Ok(Some(frame)),
                Packet::NoMoreData => return Ok(None),
                Packet::Error(reason) => return Err(BridgeError::transport(reason)),
                Packet::Event(event) => tracing::debug!(event, "server event"),
                other => self.discard(&other),
            }
        }
    }

    async fn stream_frames_stop(&mut self) -> Result<()> {
        self.send("StreamFrames Stop").await
    }

    async fn get_current_frame(&mut self, components: &[Component]) -> Result<RawFrame> {
        let command = format!("GetCurrentFrame {}", component_list(components));
        self.send(&command).await?;
        loop {
            match self.recv_timed().await? {
                Packet::Data(frame) => return Ok(frame),
                Packet::NoMoreData => {
                    return Err(BridgeError::protocol(format!("{}: no data available", command)))
                }
                Packet::Error(reason) => {
                    return Err(BridgeError::protocol(format!("{}: {}", command, reason)))
                }
                other => self.discard(&other),
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        SinkExt::<Bytes>::close(&mut self.stream)
            .await
            .map_err(BridgeError::transport)
    }
}

/// Dials a QTM server.
#[derive(Debug, Clone)]
pub struct QtmConnector {
    pub addr: String,
    pub timeout: Duration,
}

impl QtmConnector {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

impl Connector for QtmConnector {
    type Source = QtmClient;

    async fn connect(&self) -> Result<QtmClient> {
        QtmClient::connect(&self.addr, self.timeout).await
    }

    fn describe(&self) -> String {
        self.addr.clone()
    }
}
