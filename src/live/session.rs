//! Connection lifecycle for one live voice conversation.
//!
//! `LiveSession` owns the microphone, the playback scheduler, and the transport.
//! It never blocks: everything asynchronous comes back as an [`Envelope`] on
//! the receiver returned by [`LiveSession::new`], and the driver feeds those to
//! [`LiveSession::handle`]. Envelopes from an earlier connection attempt are
//! dropped, which is what keeps late completions from touching a torn-down
//! session.

use tokio::sync::mpsc;

use crate::audio::capture::CapturePipeline;
use crate::audio::codec::{decode_frame, encode_frame, to_audio_buffer};
use crate::audio::scheduler::Scheduler;
use crate::audio::{AudioFrame, OUTPUT_SAMPLE_RATE};
use crate::error::{Result, TutorError};
use crate::live::protocol::ServerMessage;
use crate::live::{
    Envelope, EventReceiver, EventSender, SessionBackend, SessionEvent, Transport, TransportEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Disconnecting,
    Error,
}

/// Subscribers for connection indicators. Unset callbacks are skipped.
#[derive(Default)]
pub struct SessionCallbacks {
    on_connect: Option<Box<dyn FnMut()>>,
    on_disconnect: Option<Box<dyn FnMut()>>,
    on_error: Option<Box<dyn FnMut(&TutorError)>>,
    on_volume_change: Option<Box<dyn FnMut(f32)>>,
}

impl SessionCallbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_connect(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_connect = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_disconnect(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_disconnect = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl FnMut(&TutorError) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_volume_change(mut self, f: impl FnMut(f32) + 'static) -> Self {
        self.on_volume_change = Some(Box::new(f));
        self
    }

    fn connected(&mut self) {
        if let Some(f) = self.on_connect.as_mut() {
            f();
        }
    }

    fn disconnected(&mut self) {
        if let Some(f) = self.on_disconnect.as_mut() {
            f();
        }
    }

    fn errored(&mut self, error: &TutorError) {
        if let Some(f) = self.on_error.as_mut() {
            f(error);
        }
    }

    fn volume(&mut self, level: f32) {
        if let Some(f) = self.on_volume_change.as_mut() {
            f(level);
        }
    }
}

pub struct LiveSession<B: SessionBackend> {
    backend: B,
    callbacks: SessionCallbacks,
    state: SessionState,
    epoch: u64,
    events: mpsc::UnboundedSender<Envelope>,
    capture: CapturePipeline,
    scheduler: Option<Scheduler>,
    transport: Option<Box<dyn Transport>>,
}

impl<B: SessionBackend> LiveSession<B> {
    /// Build an idle session. `gain` scales the reported input volume.
    pub fn new(backend: B, callbacks: SessionCallbacks, gain: f32) -> (Self, EventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            backend,
            callbacks,
            state: SessionState::Idle,
            epoch: 0,
            events,
            capture: CapturePipeline::new(gain),
            scheduler: None,
            transport: None,
        };
        (session, receiver)
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Identifies the current connection attempt.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of playback units currently scheduled or sounding.
    #[must_use]
    pub fn active_units(&self) -> usize {
        self.scheduler.as_ref().map_or(0, |s| s.active().len())
    }

    /// Acquire devices and start connecting. Ignored unless idle.
    pub fn connect(&mut self) {
        if self.state != SessionState::Idle {
            tracing::debug!(state = ?self.state, "connect ignored");
            return;
        }

        self.epoch += 1;
        self.state = SessionState::Connecting;
        tracing::info!(epoch = self.epoch, "connecting live session");

        if let Err(e) = self.open_resources() {
            self.fail(e);
        }
    }

    fn open_resources(&mut self) -> Result<()> {
        let mic = self.backend.acquire_microphone()?;
        self.capture.acquire(mic);

        let output = self.backend.open_output()?;
        self.scheduler = Some(Scheduler::new(output));

        let sender = EventSender::new(self.epoch, self.events.clone());
        self.transport = Some(self.backend.open_transport(sender)?);
        Ok(())
    }

    /// Release everything and return to idle. Ignored when idle or already
    /// disconnecting.
    pub fn disconnect(&mut self) {
        if matches!(
            self.state,
            SessionState::Idle | SessionState::Disconnecting
        ) {
            return;
        }
        self.teardown();
        self.callbacks.disconnected();
    }

    /// Apply one event from the loop.
    pub fn handle(&mut self, envelope: Envelope) {
        if envelope.epoch != self.epoch {
            tracing::trace!(
                stale = envelope.epoch,
                current = self.epoch,
                "dropping stale event"
            );
            return;
        }

        match envelope.event {
            SessionEvent::Transport(TransportEvent::Open) => self.on_open(),
            SessionEvent::Transport(TransportEvent::Message(message)) => self.on_message(&message),
            SessionEvent::Transport(TransportEvent::Error(reason)) => {
                self.fail(TutorError::Transport(reason));
            }
            SessionEvent::Transport(TransportEvent::Closed) => {
                tracing::info!("server closed the live session");
                self.disconnect();
            }
            SessionEvent::Frame(frame) => self.on_frame(frame),
        }
    }

    /// Drop playback units that have finished sounding.
    pub fn poll_playback(&mut self) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.reap();
        }
    }

    fn on_open(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }
        self.state = SessionState::Active;
        tracing::info!("live session active");
        self.callbacks.connected();

        let sender = EventSender::new(self.epoch, self.events.clone());
        let sink = Box::new(move |frame: AudioFrame| {
            sender.send(SessionEvent::Frame(frame));
        });
        if let Err(e) = self.capture.start(sink) {
            self.fail(e);
        }
    }

    fn on_message(&mut self, message: &ServerMessage) {
        if self.state != SessionState::Active {
            return;
        }
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };

        // Anything else in an interrupting message is stale speech.
        if message.is_interrupted() {
            tracing::debug!("model interrupted");
            scheduler.flush();
            return;
        }

        for text in message.texts() {
            tracing::debug!("model: {text}");
        }

        let mut fatal = None;
        for payload in message.audio_payloads() {
            let played = decode_frame(payload)
                .and_then(|ints| to_audio_buffer(&ints, OUTPUT_SAMPLE_RATE, 1))
                .and_then(|buffer| scheduler.enqueue(&buffer));
            match played {
                Ok(_) => {}
                Err(e) if e.is_session_fatal() => {
                    fatal = Some(e);
                    break;
                }
                Err(e) => tracing::warn!("dropping audio chunk: {e}"),
            }
        }

        if message.is_turn_complete() {
            tracing::debug!("model turn complete");
        }

        if let Some(e) = fatal {
            self.fail(e);
        }
    }

    fn on_frame(&mut self, frame: AudioFrame) {
        if self.state != SessionState::Active {
            return;
        }

        let mut sent = Ok(());
        let Self {
            capture,
            callbacks,
            transport,
            ..
        } = self;
        capture.deliver(
            frame,
            |level| callbacks.volume(level),
            |frame| {
                if let Some(transport) = transport.as_mut() {
                    sent = transport.send_audio(encode_frame(&frame.samples));
                }
            },
        );

        if let Err(e) = sent {
            self.fail(e);
        }
    }

    fn fail(&mut self, error: TutorError) {
        tracing::error!("live session failed: {error}");
        self.state = SessionState::Error;
        self.callbacks.errored(&error);
        self.disconnect();
    }

    /// Best-effort release of every resource. Never fails.
    fn teardown(&mut self) {
        self.state = SessionState::Disconnecting;
        self.epoch += 1;

        self.capture.stop();
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.shutdown();
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }

        self.state = SessionState::Idle;
        tracing::info!("live session closed");
    }
}

impl<B: SessionBackend> Drop for LiveSession<B> {
    fn drop(&mut self) {
        if self.state != SessionState::Idle {
            self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::audio::capture::{FrameSink, Microphone};
    use crate::audio::codec::EncodedFrame;
    use crate::audio::scheduler::AudioOutput;
    use crate::audio::scheduler::tests::{FakeOutput, OutputLog};
    use crate::audio::INPUT_SAMPLE_RATE;

    #[derive(Default)]
    struct BackendLog {
        mics_acquired: usize,
        mic_stops: usize,
        sink: Option<FrameSink>,
        outputs_opened: usize,
        transports_opened: usize,
        transports_closed: usize,
        sent: Vec<EncodedFrame>,
        events: Option<EventSender>,
        mic_missing: bool,
        transport_refuses: bool,
        send_fails: bool,
    }

    struct FakeMic(Rc<RefCell<BackendLog>>);

    impl Microphone for FakeMic {
        fn start(&mut self, sink: FrameSink) -> Result<()> {
            self.0.borrow_mut().sink = Some(sink);
            Ok(())
        }

        fn stop(&mut self) {
            let mut log = self.0.borrow_mut();
            log.mic_stops += 1;
            log.sink = None;
        }
    }

    struct FakeTransport(Rc<RefCell<BackendLog>>);

    impl Transport for FakeTransport {
        fn send_audio(&mut self, frame: EncodedFrame) -> Result<()> {
            let mut log = self.0.borrow_mut();
            if log.send_fails {
                return Err(TutorError::Transport("socket gone".to_string()));
            }
            log.sent.push(frame);
            Ok(())
        }

        fn close(&mut self) {
            self.0.borrow_mut().transports_closed += 1;
        }
    }

    struct FakeBackend {
        log: Rc<RefCell<BackendLog>>,
        output: Rc<RefCell<OutputLog>>,
    }

    impl SessionBackend for FakeBackend {
        fn acquire_microphone(&mut self) -> Result<Box<dyn Microphone>> {
            let mut log = self.log.borrow_mut();
            if log.mic_missing {
                return Err(TutorError::DeviceUnavailable("no input device".to_string()));
            }
            log.mics_acquired += 1;
            Ok(Box::new(FakeMic(self.log.clone())))
        }

        fn open_output(&mut self) -> Result<Box<dyn AudioOutput>> {
            self.log.borrow_mut().outputs_opened += 1;
            Ok(Box::new(FakeOutput {
                log: self.output.clone(),
            }))
        }

        fn open_transport(&mut self, events: EventSender) -> Result<Box<dyn Transport>> {
            let mut log = self.log.borrow_mut();
            if log.transport_refuses {
                return Err(TutorError::Transport("connection refused".to_string()));
            }
            log.transports_opened += 1;
            log.events = Some(events);
            Ok(Box::new(FakeTransport(self.log.clone())))
        }
    }

    struct Harness {
        session: LiveSession<FakeBackend>,
        rx: EventReceiver,
        log: Rc<RefCell<BackendLog>>,
        output: Rc<RefCell<OutputLog>>,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with(|_| {})
        }

        fn with(setup: impl FnOnce(&mut BackendLog)) -> Self {
            let log = Rc::new(RefCell::new(BackendLog::default()));
            setup(&mut log.borrow_mut());
            let output = Rc::new(RefCell::new(OutputLog::default()));
            let calls = Rc::new(RefCell::new(Vec::new()));

            let (c1, c2, c3, c4) = (calls.clone(), calls.clone(), calls.clone(), calls.clone());
            let callbacks = SessionCallbacks::new()
                .on_connect(move || c1.borrow_mut().push("connect".to_string()))
                .on_disconnect(move || c2.borrow_mut().push("disconnect".to_string()))
                .on_error(move |e| c3.borrow_mut().push(format!("error: {e}")))
                .on_volume_change(move |v| c4.borrow_mut().push(format!("volume {v:.2}")));

            let backend = FakeBackend {
                log: log.clone(),
                output: output.clone(),
            };
            let (session, rx) = LiveSession::new(backend, callbacks, 5.0);
            Self {
                session,
                rx,
                log,
                output,
                calls,
            }
        }

        /// Post a transport event the way the real connection task would.
        fn server(&mut self, event: TransportEvent) {
            let sender = self
                .log
                .borrow()
                .events
                .clone()
                .unwrap_or_else(|| panic!("no transport opened"));
            sender.transport(event);
            self.pump();
        }

        fn server_json(&mut self, json: &str) {
            let message =
                ServerMessage::parse(json.as_bytes()).unwrap_or_else(|e| panic!("{e}"));
            self.server(TransportEvent::Message(Box::new(message)));
        }

        fn speak(&mut self, samples: Vec<f32>) {
            {
                let mut log = self.log.borrow_mut();
                let sink = log.sink.as_mut().unwrap_or_else(|| panic!("mic not started"));
                sink(AudioFrame::new(samples, INPUT_SAMPLE_RATE));
            }
            self.pump();
        }

        fn pump(&mut self) {
            while let Ok(envelope) = self.rx.try_recv() {
                self.session.handle(envelope);
            }
        }

        fn open(&mut self) {
            self.session.connect();
            self.server(TransportEvent::Open);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn count(&self, name: &str) -> usize {
            self.calls.borrow().iter().filter(|c| *c == name).count()
        }
    }

    fn audio_json(chunks: &[usize]) -> String {
        let parts: Vec<String> = chunks
            .iter()
            .map(|&n| {
                format!(
                    r#"{{"inlineData":{{"mimeType":"audio/pcm;rate=24000","data":"{}"}}}}"#,
                    encode_frame(&vec![0.1; n]).data
                )
            })
            .collect();
        format!(
            r#"{{"serverContent":{{"modelTurn":{{"parts":[{}]}}}}}}"#,
            parts.join(",")
        )
    }

    #[test]
    fn open_activates_and_starts_capture() {
        let mut h = Harness::new();
        h.session.connect();
        assert_eq!(h.session.state(), SessionState::Connecting);
        assert!(h.log.borrow().sink.is_none());

        h.server(TransportEvent::Open);
        assert_eq!(h.session.state(), SessionState::Active);
        assert_eq!(h.calls(), vec!["connect"]);
        assert!(h.log.borrow().sink.is_some());
    }

    #[test]
    fn connect_while_active_acquires_nothing_new() {
        let mut h = Harness::new();
        h.open();
        h.session.connect();
        h.session.connect();
        assert_eq!(h.log.borrow().mics_acquired, 1);
        assert_eq!(h.log.borrow().transports_opened, 1);
        assert_eq!(h.count("connect"), 1);
        assert_eq!(h.session.state(), SessionState::Active);
    }

    #[test]
    fn connect_while_connecting_is_ignored() {
        let mut h = Harness::new();
        h.session.connect();
        h.session.connect();
        assert_eq!(h.log.borrow().mics_acquired, 1);
        assert_eq!(h.log.borrow().outputs_opened, 1);
    }

    #[test]
    fn double_disconnect_notifies_once() {
        let mut h = Harness::new();
        h.open();
        h.session.disconnect();
        h.session.disconnect();
        assert_eq!(h.count("disconnect"), 1);
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.log.borrow().mic_stops, 1);
        assert_eq!(h.log.borrow().transports_closed, 1);
        assert_eq!(h.output.borrow().closed, 1);
    }

    #[test]
    fn disconnect_when_idle_does_nothing() {
        let mut h = Harness::new();
        h.session.disconnect();
        assert!(h.calls().is_empty());
    }

    #[test]
    fn disconnect_before_open_tolerates_partial_setup() {
        let mut h = Harness::new();
        h.session.connect();
        h.session.disconnect();
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.calls(), vec!["disconnect"]);
        assert_eq!(h.log.borrow().transports_closed, 1);

        // The connection finishing afterwards must not revive the session.
        h.server(TransportEvent::Open);
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.count("connect"), 0);
    }

    #[test]
    fn audio_is_scheduled_in_arrival_order() {
        let mut h = Harness::new();
        h.output.borrow_mut().clock = 1.0;
        h.open();
        h.server_json(&audio_json(&[2400, 4800]));
        h.server_json(&audio_json(&[2400]));

        let started = h.output.borrow().started.clone();
        let starts: Vec<f64> = started.iter().map(|&(_, at)| at).collect();
        assert_eq!(starts.len(), 3);
        assert!((starts[0] - 1.0).abs() < 1e-9);
        assert!((starts[1] - 1.1).abs() < 1e-9);
        assert!((starts[2] - 1.3).abs() < 1e-9);
        assert_eq!(h.session.active_units(), 3);
    }

    #[test]
    fn interruption_discards_trailing_audio() {
        let mut h = Harness::new();
        h.open();
        h.server_json(&audio_json(&[2400, 2400]));
        assert_eq!(h.session.active_units(), 2);

        let interrupted = audio_json(&[2400]).replacen(
            r#"{"serverContent":{"#,
            r#"{"serverContent":{"interrupted":true,"#,
            1,
        );
        h.server_json(&interrupted);

        assert_eq!(h.session.active_units(), 0);
        assert_eq!(h.output.borrow().started.len(), 2);
        assert_eq!(h.output.borrow().stopped.len(), 2);
        assert_eq!(h.session.state(), SessionState::Active);
    }

    #[test]
    fn corrupt_chunk_is_dropped_and_session_continues() {
        let mut h = Harness::new();
        h.open();
        h.server_json(
            r#"{"serverContent":{"modelTurn":{"parts":[
                {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAEC"}},
                {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"@@@"}}
            ]}}}"#,
        );
        assert_eq!(h.session.state(), SessionState::Active);
        assert_eq!(h.session.active_units(), 0);
        assert!(h.calls().iter().all(|c| !c.starts_with("error")));

        h.server_json(&audio_json(&[240]));
        assert_eq!(h.session.active_units(), 1);
    }

    #[test]
    fn failed_playback_start_is_fatal() {
        let mut h = Harness::new();
        h.open();
        h.output.borrow_mut().refuses_start = true;
        h.server_json(&audio_json(&[240, 240]));

        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.count("disconnect"), 1);
        assert_eq!(
            h.calls().iter().filter(|c| c.starts_with("error")).count(),
            1
        );
        assert_eq!(h.output.borrow().closed, 1);
    }

    #[test]
    fn unknown_messages_are_ignored() {
        let mut h = Harness::new();
        h.open();
        h.server_json("{}");
        h.server_json(r#"{"serverContent":{"turnComplete":true}}"#);
        assert_eq!(h.session.state(), SessionState::Active);
        assert_eq!(h.session.active_units(), 0);
    }

    #[test]
    fn audio_before_open_is_ignored() {
        let mut h = Harness::new();
        h.session.connect();
        h.server_json(&audio_json(&[2400]));
        assert!(h.output.borrow().started.is_empty());
    }

    #[test]
    fn transport_error_reports_then_tears_down() {
        let mut h = Harness::new();
        h.open();
        h.server(TransportEvent::Error("reset by peer".to_string()));

        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(
            h.calls(),
            vec![
                "connect",
                "error: transport error: reset by peer",
                "disconnect"
            ]
        );
        assert_eq!(h.log.borrow().mic_stops, 1);
        assert_eq!(h.log.borrow().transports_closed, 1);
        assert_eq!(h.output.borrow().closed, 1);
    }

    #[test]
    fn error_while_connecting_tears_down() {
        let mut h = Harness::new();
        h.session.connect();
        h.server(TransportEvent::Error("handshake timed out".to_string()));
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.count("connect"), 0);
        assert_eq!(h.count("disconnect"), 1);
    }

    #[test]
    fn missing_microphone_aborts_the_session() {
        let mut h = Harness::with(|log| log.mic_missing = true);
        h.session.connect();

        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(
            h.calls(),
            vec!["error: device unavailable: no input device", "disconnect"]
        );
        assert_eq!(h.log.borrow().outputs_opened, 0);
        assert_eq!(h.log.borrow().transports_opened, 0);
    }

    #[test]
    fn refused_transport_releases_devices() {
        let mut h = Harness::with(|log| log.transport_refuses = true);
        h.session.connect();
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.log.borrow().mic_stops, 1);
        assert_eq!(h.output.borrow().closed, 1);
    }

    #[test]
    fn server_close_ends_in_idle() {
        let mut h = Harness::new();
        h.open();
        h.server(TransportEvent::Closed);
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.count("disconnect"), 1);

        h.session.disconnect();
        assert_eq!(h.count("disconnect"), 1);
    }

    #[test]
    fn frames_report_volume_then_go_out() {
        let mut h = Harness::new();
        h.open();
        h.speak(vec![0.0; 4096]);
        h.speak(vec![1.0; 4096]);

        assert_eq!(h.calls(), vec!["connect", "volume 0.00", "volume 1.00"]);
        let log = h.log.borrow();
        assert_eq!(log.sent.len(), 2);
        assert_eq!(log.sent[0].mime_type, "audio/pcm;rate=16000");
        assert_eq!(log.sent[1].data, encode_frame(&[1.0; 4096]).data);
    }

    #[test]
    fn frames_queued_before_teardown_are_dropped() {
        let mut h = Harness::new();
        h.open();
        {
            let mut log = h.log.borrow_mut();
            let sink = log.sink.as_mut().unwrap_or_else(|| panic!("mic not started"));
            sink(AudioFrame::new(vec![0.5; 16], INPUT_SAMPLE_RATE));
        }
        h.session.disconnect();
        h.pump();

        assert!(h.log.borrow().sent.is_empty());
        assert!(h.calls().iter().all(|c| !c.starts_with("volume")));
    }

    #[test]
    fn failed_send_is_fatal() {
        let mut h = Harness::new();
        h.open();
        h.log.borrow_mut().send_fails = true;
        h.speak(vec![0.2; 64]);

        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(h.calls().contains(&"error: transport error: socket gone".to_string()));
    }

    #[test]
    fn reconnect_ignores_the_previous_connection() {
        let mut h = Harness::new();
        h.open();
        let old = h.log.borrow().events.clone().unwrap_or_else(|| panic!("no events"));
        h.session.disconnect();
        h.session.connect();
        assert_ne!(old.epoch(), h.session.epoch());

        old.transport(TransportEvent::Closed);
        old.transport(TransportEvent::Open);
        h.pump();
        assert_eq!(h.session.state(), SessionState::Connecting);

        h.server(TransportEvent::Open);
        assert_eq!(h.session.state(), SessionState::Active);
        assert_eq!(h.count("connect"), 2);
        assert_eq!(h.log.borrow().mics_acquired, 2);
    }

    #[test]
    fn dropping_an_active_session_releases_devices() {
        let h = Harness::new();
        let Harness {
            mut session,
            log,
            output,
            calls,
            ..
        } = h;
        session.connect();
        drop(session);
        assert_eq!(log.borrow().mic_stops, 1);
        assert_eq!(log.borrow().transports_closed, 1);
        assert_eq!(output.borrow().closed, 1);
        assert!(calls.borrow().is_empty());
    }
}
