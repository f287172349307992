//! Streaming session controller.
//!
//! ```text
//! Disconnected -> Connected -> ControlAcquired -> SessionConfigured -> Streaming -> Stopped
//!                     |                                                  |
//!                     +-> Disconnected        any state on I/O error -> Failed
//! ```

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::adapter::{FrameAdapter, Target};
use crate::config::{CaptureMode, Config};
use crate::error::{BridgeError, Result};
use crate::frame::RawFrame;
use crate::position::PositionTransform;
use crate::registry::BodyRegistry;
use crate::sink::PoseSink;
use crate::source::{Component, Connector, StreamRate, TrackingSource};

/// Components requested for the parameter description.
pub const PARAMETER_COMPONENTS: [Component; 1] = [Component::SixD];
/// Components requested while streaming.
pub const STREAM_COMPONENTS: [Component; 2] = [Component::SixD, Component::Timecode];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    ControlAcquired,
    SessionConfigured,
    Streaming,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Duration budget used up
    Elapsed,
    /// Operator asked to stop
    Requested,
    /// Replay reached the end of the file
    EndOfData,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Elapsed => "duration elapsed",
            StopReason::Requested => "stop requested",
            StopReason::EndOfData => "no more data",
        };
        f.write_str(s)
    }
}

/// What happened during a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub frames_received: u64,
    /// Frames whose pose(s) were handed to the sink
    pub frames_delivered: u64,
    /// Frames dropped because the target body is unknown
    pub frames_dropped: u64,
    /// Poses delivered with `valid == false`
    pub invalid_poses: u64,
    pub last_frame_number: Option<u32>,
    pub stop_reason: StopReason,
}

/// Everything the controller needs, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub password: String,
    pub mode: CaptureMode,
    pub target: Target,
    pub rate: StreamRate,
    pub duration: Option<Duration>,
    pub abort_on_missing_body: bool,
    pub transform: PositionTransform,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            password: config.source.password.clone(),
            mode: config.source.mode.clone(),
            target: Target::parse(&config.stream.target),
            rate: StreamRate::from_max_frequency(config.stream.max_frequency),
            duration: config.stream.duration()?,
            abort_on_missing_body: config.stream.abort_on_missing_body,
            transform: PositionTransform::from_config(&config.transform),
        })
    }
}

#[derive(Debug, Default)]
struct Counters {
    received: u64,
    delivered: u64,
    dropped: u64,
    invalid: u64,
    last_frame: Option<u32>,
    missing_reported: bool,
}

pub struct Session<C: Connector, K: PoseSink> {
    connector: C,
    sink: K,
    settings: SessionSettings,
    adapter: FrameAdapter,
    state: SessionState,
}

impl<C: Connector, K: PoseSink> Session<C, K> {
    pub fn new(connector: C, sink: K, settings: SessionSettings) -> Self {
        let adapter = FrameAdapter::new(settings.target.clone(), settings.transform);
        Self {
            connector,
            sink,
            settings,
            adapter,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    fn transition(&mut self, to: SessionState) {
        tracing::info!("session: {:?} -> {:?}", self.state, to);
        self.state = to;
    }

    /// Runs one session to completion.
    ///
    /// `stop` is observed between frames only; a frame that has been
    /// received is always converted and delivered before stopping.
    pub async fn run(&mut self, stop: CancellationToken) -> Result<StreamSummary> {
        let mut source = match self.connector.connect().await {
            Ok(source) => source,
            Err(e) => {
                tracing::error!("connect to {} failed: {}", self.connector.describe(), e);
                self.transition(SessionState::Failed);
                return Err(e);
            }
        };
        self.transition(SessionState::Connected);

        let registry = match self.configure(&mut source).await {
            Ok(registry) => registry,
            Err(e) => {
                self.abort(&mut source, false, &e).await;
                return Err(e);
            }
        };

        if let Err(e) = source.stream_frames(self.settings.rate, &STREAM_COMPONENTS).await {
            self.abort(&mut source, false, &e).await;
            return Err(e);
        }
        self.transition(SessionState::Streaming);

        match self.stream(&mut source, &registry, &stop).await {
            Ok(summary) => {
                tracing::info!(
                    "stopping ({}): {} received, {} delivered, {} dropped, {} invalid",
                    summary.stop_reason,
                    summary.frames_received,
                    summary.frames_delivered,
                    summary.frames_dropped,
                    summary.invalid_poses
                );
                if let Err(e) = source.stream_frames_stop().await {
                    tracing::error!("StreamFrames Stop failed: {}", e);
                    self.transition(SessionState::Failed);
                    let _ = source.disconnect().await;
                    return Err(e);
                }
                if let Err(e) = source.disconnect().await {
                    tracing::warn!("disconnect: {}", e);
                }
                self.transition(SessionState::Stopped);
                Ok(summary)
            }
            Err(e) => {
                tracing::error!("streaming failed: {}", e);
                self.abort(&mut source, true, &e).await;
                Err(e)
            }
        }
    }

    /// Control phase, capture start and registry construction.
    async fn configure(&mut self, source: &mut C::Source) -> Result<BodyRegistry> {
        if let Err(e) = source.take_control(&self.settings.password).await {
            tracing::error!("take control: {}", e);
            return Err(e);
        }
        self.transition(SessionState::ControlAcquired);

        // control is released whether or not the capture started
        let started = self.start_capture(source).await;
        let released = source.release_control().await;
        started?;
        released?;

        let xml = source.get_parameters(&PARAMETER_COMPONENTS).await?;
        let registry = BodyRegistry::from_parameters(&xml)?;
        tracing::info!(
            "{} bodies: [{}]",
            registry.len(),
            registry.names().collect::<Vec<_>>().join(", ")
        );

        if let Some(name) = self.missing_target(&registry) {
            warn_missing_target(name);
            if self.settings.abort_on_missing_body {
                return Err(BridgeError::body_not_found(name));
            }
        }

        self.transition(SessionState::SessionConfigured);
        Ok(registry)
    }

    async fn start_capture(&self, source: &mut C::Source) -> Result<()> {
        match &self.settings.mode {
            CaptureMode::Live => {
                tracing::info!("starting live measurement");
                source.new_measurement().await
            }
            CaptureMode::Replay { file } => {
                tracing::info!("replaying {}", file);
                source.load(file).await?;
                source.start_rt_from_file().await
            }
        }
    }

    async fn stream(
        &mut self,
        source: &mut C::Source,
        registry: &BodyRegistry,
        stop: &CancellationToken,
    ) -> Result<StreamSummary> {
        let deadline = self.settings.duration.map(|d| Instant::now() + d);
        // already reported while configuring
        let mut counters = Counters {
            missing_reported: self.missing_target(registry).is_some(),
            ..Counters::default()
        };

        let stop_reason = loop {
            if stop.is_cancelled() {
                break StopReason::Requested;
            }

            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => break StopReason::Requested,
                _ = sleep_until(deadline) => break StopReason::Elapsed,
                next = source.next_frame() => next?,
            };

            match next {
                Some(frame) => self.handle_frame(&frame, registry, &mut counters)?,
                None => break StopReason::EndOfData,
            }
        };

        Ok(StreamSummary {
            frames_received: counters.received,
            frames_delivered: counters.delivered,
            frames_dropped: counters.dropped,
            invalid_poses: counters.invalid,
            last_frame_number: counters.last_frame,
            stop_reason,
        })
    }

    fn handle_frame(
        &mut self,
        frame: &RawFrame,
        registry: &BodyRegistry,
        counters: &mut Counters,
    ) -> Result<()> {
        counters.received += 1;
        if let Some(last) = counters.last_frame {
            if frame.frame_number <= last {
                tracing::debug!("frame {} arrived after {}", frame.frame_number, last);
            }
        }
        counters.last_frame = Some(frame.frame_number);

        match self.adapter.adapt(frame, registry) {
            Ok(adapted) => {
                for (body, pose) in adapted.poses() {
                    self.sink.publish(body, pose)?;
                    if !pose.valid {
                        tracing::debug!("frame {}: {} not tracked", frame.frame_number, body);
                    }
                }
                counters.invalid += adapted.invalid_count() as u64;
                counters.delivered += 1;
                Ok(())
            }
            Err(e) if e.is_session_fatal() => Err(e),
            Err(e) => {
                counters.dropped += 1;
                if self.settings.abort_on_missing_body && matches!(e, BridgeError::BodyNotFound(_)) {
                    return Err(e);
                }
                match &e {
                    BridgeError::BodyNotFound(name) if !counters.missing_reported => {
                        counters.missing_reported = true;
                        warn_missing_target(name);
                    }
                    BridgeError::BodyNotFound(_) => {}
                    _ => tracing::debug!("frame {} dropped: {}", frame.frame_number, e),
                }
                Ok(())
            }
        }
    }

    /// The configured target body, if the registry does not know it.
    fn missing_target<'a>(&'a self, registry: &BodyRegistry) -> Option<&'a str> {
        match self.adapter.target() {
            Target::Body(name) if registry.lookup(name).is_err() => Some(name.as_str()),
            _ => None,
        }
    }

    /// Best-effort cleanup after a fatal error.
    ///
    /// Only a refused `TakeControl` returns to `Disconnected`; everything
    /// else ends in `Failed`.
    async fn abort(&mut self, source: &mut C::Source, streaming: bool, cause: &BridgeError) {
        if streaming {
            if let Err(e) = source.stream_frames_stop().await {
                tracing::warn!("StreamFrames Stop during cleanup: {}", e);
            }
        }
        if let Err(e) = source.disconnect().await {
            tracing::debug!("disconnect during cleanup: {}", e);
        }
        let denied = matches!(cause, BridgeError::ControlDenied(_));
        let to = if denied && self.state == SessionState::Connected {
            SessionState::Disconnected
        } else {
            SessionState::Failed
        };
        self.transition(to);
    }
}

fn warn_missing_target(name: &str) {
    tracing::warn!("target body '{}' is not defined on the server, dropping frames", name);
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{NormalizedPose, RawPose};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const IDENTITY: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
    const XML: &str = "<P><The_6D><Bodies>2</Bodies><Body><Name>L-frame</Name></Body><Body><Name>Drone</Name></Body></The_6D></P>";

    enum Step {
        Frame(RawFrame),
        End,
        Fail,
        /// never resolves
        Hang,
    }

    #[derive(Default)]
    struct Script {
        deny_control: bool,
        reset_on_control: bool,
        fail_load: bool,
        steps: VecDeque<Step>,
    }

    type Calls = Arc<Mutex<Vec<String>>>;

    struct FakeSource {
        script: Script,
        calls: Calls,
    }

    impl FakeSource {
        fn log(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    impl TrackingSource for FakeSource {
        async fn take_control(&mut self, _password: &str) -> Result<()> {
            self.log("take_control");
            if self.script.deny_control {
                return Err(BridgeError::ControlDenied("wrong password".into()));
            }
            if self.script.reset_on_control {
                return Err(BridgeError::transport("connection reset"));
            }
            Ok(())
        }
        async fn release_control(&mut self) -> Result<()> {
            self.log("release_control");
            Ok(())
        }
        async fn new_measurement(&mut self) -> Result<()> {
            self.log("new");
            Ok(())
        }
        async fn load(&mut self, file: &str) -> Result<()> {
            self.log(&format!("load {}", file));
            if self.script.fail_load {
                return Err(BridgeError::protocol("file not found"));
            }
            Ok(())
        }
        async fn start_rt_from_file(&mut self) -> Result<()> {
            self.log("start_rtfromfile");
            Ok(())
        }
        async fn get_parameters(&mut self, _components: &[Component]) -> Result<String> {
            self.log("get_parameters");
            Ok(XML.to_string())
        }
        async fn stream_frames(&mut self, rate: StreamRate, _components: &[Component]) -> Result<()> {
            self.log(&format!("stream_frames {}", rate));
            Ok(())
        }
        async fn next_frame(&mut self) -> Result<Option<RawFrame>> {
            match self.script.steps.pop_front() {
                Some(Step::Frame(frame)) => Ok(Some(frame)),
                Some(Step::Fail) => Err(BridgeError::transport("connection reset")),
                Some(Step::Hang) => std::future::pending().await,
                Some(Step::End) | None => Ok(None),
            }
        }
        async fn stream_frames_stop(&mut self) -> Result<()> {
            self.log("stream_frames_stop");
            Ok(())
        }
        async fn get_current_frame(&mut self, _components: &[Component]) -> Result<RawFrame> {
            Err(BridgeError::protocol("not scripted"))
        }
        async fn disconnect(&mut self) -> Result<()> {
            self.log("disconnect");
            Ok(())
        }
    }

    struct FakeConnector {
        source: Mutex<Option<FakeSource>>,
        refuse: bool,
    }

    impl FakeConnector {
        fn new(script: Script) -> (Self, Calls) {
            let calls = Calls::default();
            let source = FakeSource {
                script,
                calls: Arc::clone(&calls),
            };
            let connector = Self {
                source: Mutex::new(Some(source)),
                refuse: false,
            };
            (connector, calls)
        }
    }

    impl Connector for FakeConnector {
        type Source = FakeSource;

        async fn connect(&self) -> Result<FakeSource> {
            if self.refuse {
                return Err(BridgeError::connect_failed("fake", "refused"));
            }
            self.source
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| BridgeError::connect_failed("fake", "already used"))
        }

        fn describe(&self) -> String {
            "fake".to_string()
        }
    }

    /// Records poses; optionally cancels `stop` after `stop_after` frames.
    #[derive(Default)]
    struct RecordingSink {
        poses: Vec<(String, NormalizedPose)>,
        stop_after: Option<(usize, CancellationToken)>,
    }

    impl PoseSink for RecordingSink {
        fn publish(&mut self, body: &str, pose: &NormalizedPose) -> Result<()> {
            self.poses.push((body.to_string(), *pose));
            if let Some((n, token)) = &self.stop_after {
                if self.poses.len() == *n {
                    token.cancel();
                }
            }
            Ok(())
        }
    }

    fn settings(target: &str, mode: CaptureMode) -> SessionSettings {
        SessionSettings {
            password: "password".to_string(),
            mode,
            target: Target::parse(target),
            rate: StreamRate::Frequency(100),
            duration: None,
            abort_on_missing_body: false,
            transform: PositionTransform::identity(),
        }
    }

    fn frame(n: u32) -> Step {
        Step::Frame(RawFrame::new(
            n,
            vec![RawPose::new([n as f32, 0.0, 0.0], IDENTITY), RawPose::occluded()],
        ))
    }

    fn calls(c: &Calls) -> Vec<String> {
        c.lock().unwrap().clone()
    }

    /// Collects formatted log output for the current thread.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl LogCapture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_live_session_happy_path() {
        let script = Script {
            steps: VecDeque::from([frame(1), frame(2), Step::End]),
            ..Default::default()
        };
        let (connector, log) = FakeConnector::new(script);
        let mut session = Session::new(connector, RecordingSink::default(), settings("L-frame", CaptureMode::Live));

        let summary = session.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.stop_reason, StopReason::EndOfData);
        assert_eq!(summary.frames_delivered, 2);
        assert_eq!(summary.last_frame_number, Some(2));
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(
            calls(&log),
            vec![
                "take_control",
                "new",
                "release_control",
                "get_parameters",
                "stream_frames Frequency:100",
                "stream_frames_stop",
                "disconnect",
            ]
        );
        let frames: Vec<u32> = session.sink().poses.iter().map(|(_, p)| p.frame_number).collect();
        assert_eq!(frames, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_replay_loads_then_starts() {
        let (connector, log) = FakeConnector::new(Script::default());
        let mode = CaptureMode::Replay { file: "Demo.qtm".to_string() };
        let mut session = Session::new(connector, RecordingSink::default(), settings("L-frame", mode));

        session.run(CancellationToken::new()).await.unwrap();
        let log = calls(&log);
        assert_eq!(&log[1..4], &["load Demo.qtm", "start_rtfromfile", "release_control"]);
        assert!(!log.contains(&"new".to_string()));
    }

    #[tokio::test]
    async fn test_control_released_when_capture_fails() {
        let script = Script {
            fail_load: true,
            ..Default::default()
        };
        let (connector, log) = FakeConnector::new(script);
        let mode = CaptureMode::Replay { file: "missing.qtm".to_string() };
        let mut session = Session::new(connector, RecordingSink::default(), settings("L-frame", mode));

        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
        assert_eq!(session.state(), SessionState::Failed);
        let log = calls(&log);
        assert!(log.contains(&"release_control".to_string()));
        assert!(!log.contains(&"get_parameters".to_string()));
    }

    #[tokio::test]
    async fn test_control_denied_disconnects() {
        let script = Script {
            deny_control: true,
            ..Default::default()
        };
        let (connector, log) = FakeConnector::new(script);
        let mut session = Session::new(connector, RecordingSink::default(), settings("L-frame", CaptureMode::Live));

        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::ControlDenied(_)));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(calls(&log), vec!["take_control", "disconnect"]);
    }

    #[tokio::test]
    async fn test_transport_error_during_take_control_fails() {
        let script = Script {
            reset_on_control: true,
            ..Default::default()
        };
        let (connector, log) = FakeConnector::new(script);
        let mut session = Session::new(connector, RecordingSink::default(), settings("L-frame", CaptureMode::Live));

        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::StreamTransport(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(calls(&log), vec!["take_control", "disconnect"]);
    }

    #[tokio::test]
    async fn test_connect_failed_is_terminal() {
        let (mut connector, log) = FakeConnector::new(Script::default());
        connector.refuse = true;
        let mut session = Session::new(connector, RecordingSink::default(), settings("L-frame", CaptureMode::Live));

        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::ConnectFailed { .. }));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(calls(&log).is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_still_stops_stream() {
        let script = Script {
            steps: VecDeque::from([frame(1), Step::Fail, frame(3)]),
            ..Default::default()
        };
        let (connector, log) = FakeConnector::new(script);
        let mut session = Session::new(connector, RecordingSink::default(), settings("L-frame", CaptureMode::Live));

        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::StreamTransport(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.sink().poses.len(), 1);
        let log = calls(&log);
        assert_eq!(&log[log.len() - 2..], &["stream_frames_stop", "disconnect"]);
    }

    #[tokio::test]
    async fn test_missing_body_drops_frames_and_continues() {
        let script = Script {
            steps: VecDeque::from([frame(1), frame(2), Step::End]),
            ..Default::default()
        };
        let (connector, _log) = FakeConnector::new(script);
        let mut session = Session::new(connector, RecordingSink::default(), settings("Ghost", CaptureMode::Live));

        let summary = session.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.frames_received, 2);
        assert_eq!(summary.frames_dropped, 2);
        assert_eq!(summary.frames_delivered, 0);
        assert!(session.sink().poses.is_empty());
    }

    #[tokio::test]
    async fn test_missing_body_reported_once() {
        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let script = Script {
            steps: VecDeque::from([frame(1), frame(2), frame(3), Step::End]),
            ..Default::default()
        };
        let (connector, _log) = FakeConnector::new(script);
        let mut session = Session::new(connector, RecordingSink::default(), settings("Ghost", CaptureMode::Live));

        let summary = session.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.frames_dropped, 3);
        assert_eq!(capture.text().matches("'Ghost' is not defined").count(), 1);
    }

    #[tokio::test]
    async fn test_missing_body_abort_policy() {
        let (connector, _log) = FakeConnector::new(Script::default());
        let mut s = settings("Ghost", CaptureMode::Live);
        s.abort_on_missing_body = true;
        let mut session = Session::new(connector, RecordingSink::default(), s);

        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::BodyNotFound(ref n) if n == "Ghost"));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_body_count_mismatch_is_fatal() {
        let bad = RawFrame::new(1, vec![RawPose::new([0.0; 3], IDENTITY)]);
        let script = Script {
            steps: VecDeque::from([Step::Frame(bad), frame(2)]),
            ..Default::default()
        };
        let (connector, _log) = FakeConnector::new(script);
        let mut session = Session::new(connector, RecordingSink::default(), settings("L-frame", CaptureMode::Live));

        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ConfigurationMismatch { declared: 2, reported: 1 }
        ));
        assert!(session.sink().poses.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_publishes_every_body() {
        let script = Script {
            steps: VecDeque::from([frame(1), Step::End]),
            ..Default::default()
        };
        let (connector, _log) = FakeConnector::new(script);
        let mut session = Session::new(connector, RecordingSink::default(), settings("all", CaptureMode::Live));

        let summary = session.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.invalid_poses, 1);
        let names: Vec<&str> = session.sink().poses.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["L-frame", "Drone"]);
    }

    #[tokio::test]
    async fn test_stop_between_frames_delivers_exactly_n() {
        let script = Script {
            steps: VecDeque::from([frame(1), frame(2), frame(3), frame(4), Step::End]),
            ..Default::default()
        };
        let (connector, log) = FakeConnector::new(script);
        let stop = CancellationToken::new();
        let sink = RecordingSink {
            stop_after: Some((2, stop.clone())),
            ..Default::default()
        };
        let mut session = Session::new(connector, sink, settings("L-frame", CaptureMode::Live));

        let summary = session.run(stop).await.unwrap();
        assert_eq!(summary.stop_reason, StopReason::Requested);
        assert_eq!(summary.frames_delivered, 2);
        assert_eq!(session.sink().poses.len(), 2);
        assert!(calls(&log).contains(&"stream_frames_stop".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_budget_stops_stream() {
        let script = Script {
            steps: VecDeque::from([frame(1), Step::Hang]),
            ..Default::default()
        };
        let (connector, log) = FakeConnector::new(script);
        let mut s = settings("L-frame", CaptureMode::Live);
        s.duration = Some(Duration::from_secs(5));
        let mut session = Session::new(connector, RecordingSink::default(), s);

        let summary = session.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.stop_reason, StopReason::Elapsed);
        assert_eq!(summary.frames_delivered, 1);
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(calls(&log).contains(&"stream_frames_stop".to_string()));
    }
}
