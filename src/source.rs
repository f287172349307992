//! Tracking-source boundary used by the session controller.

use std::fmt;

use crate::error::Result;
use crate::frame::RawFrame;

/// Data kinds requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    SixD,
    Timecode,
}

impl Component {
    pub fn wire_name(&self) -> &'static str {
        match self {
            Component::SixD => "6D",
            Component::Timecode => "Timecode",
        }
    }
}

/// Space-separated wire names, as used in RT commands.
pub fn component_list(components: &[Component]) -> String {
    components
        .iter()
        .map(Component::wire_name)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Streaming cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRate {
    AllFrames,
    /// Server-side cap in frames per second
    Frequency(u32),
}

impl StreamRate {
    /// `0` means every frame.
    pub fn from_max_frequency(hz: u32) -> Self {
        if hz == 0 {
            StreamRate::AllFrames
        } else {
            StreamRate::Frequency(hz)
        }
    }
}

impl fmt::Display for StreamRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRate::AllFrames => f.write_str("AllFrames"),
            StreamRate::Frequency(hz) => write!(f, "Frequency:{}", hz),
        }
    }
}

/// An open session with a tracking server.
///
/// Calls are strictly sequential; the controller never issues a second
/// request before the previous one returned.
#[allow(async_fn_in_trait)]
pub trait TrackingSource {
    /// Credential-gated exclusive control.
    async fn take_control(&mut self, password: &str) -> Result<()>;
    async fn release_control(&mut self) -> Result<()>;
    /// Start a new live measurement.
    async fn new_measurement(&mut self) -> Result<()>;
    /// Load a recorded measurement file.
    async fn load(&mut self, file: &str) -> Result<()>;
    /// Begin timed playback of the loaded file.
    async fn start_rt_from_file(&mut self) -> Result<()>;
    /// Parameter XML for the requested components.
    async fn get_parameters(&mut self, components: &[Component]) -> Result<String>;
    async fn stream_frames(&mut self, rate: StreamRate, components: &[Component]) -> Result<()>;
    /// Next streamed frame; `None` once the server reports no more data.
    async fn next_frame(&mut self) -> Result<Option<RawFrame>>;
    async fn stream_frames_stop(&mut self) -> Result<()>;
    /// Single frame outside of streaming.
    async fn get_current_frame(&mut self, components: &[Component]) -> Result<RawFrame>;
    async fn disconnect(&mut self) -> Result<()>;
}

/// Opens `TrackingSource` sessions. `ConnectFailed` when unreachable.
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Source: TrackingSource;

    async fn connect(&self) -> Result<Self::Source>;

    /// For logs.
    fn describe(&self) -> String;
}
