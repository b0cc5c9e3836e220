//! Real-time voice conversation with the Gemini Live API.

pub mod protocol;
pub mod session;
pub mod transport;

use tokio::sync::mpsc;

use crate::audio::AudioFrame;
use crate::audio::capture::Microphone;
use crate::audio::codec::EncodedFrame;
use crate::audio::scheduler::AudioOutput;
use crate::error::Result;
use protocol::ServerMessage;

/// What the transport reports about the connection.
#[derive(Debug)]
pub enum TransportEvent {
    /// Handshake finished; audio may flow.
    Open,
    Message(Box<ServerMessage>),
    Error(String),
    Closed,
}

#[derive(Debug)]
pub enum SessionEvent {
    Transport(TransportEvent),
    /// A captured microphone frame.
    Frame(AudioFrame),
}

/// An event stamped with the connection attempt that produced it.
#[derive(Debug)]
pub struct Envelope {
    pub epoch: u64,
    pub event: SessionEvent,
}

pub type EventReceiver = mpsc::UnboundedReceiver<Envelope>;

/// Posts events into the session loop on behalf of one connection attempt.
#[derive(Debug, Clone)]
pub struct EventSender {
    epoch: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSender {
    pub(crate) const fn new(epoch: u64, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { epoch, tx }
    }

    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns `false` once the session loop is gone.
    pub fn send(&self, event: SessionEvent) -> bool {
        self.tx
            .send(Envelope {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }

    pub fn transport(&self, event: TransportEvent) -> bool {
        self.send(SessionEvent::Transport(event))
    }
}

/// Bidirectional link to the model. Inbound traffic arrives as events.
pub trait Transport {
    fn send_audio(&mut self, frame: EncodedFrame) -> Result<()>;

    /// Ask the connection to shut down. Safe to call more than once.
    fn close(&mut self);
}

/// Everything a live session needs from the outside world.
pub trait SessionBackend {
    fn acquire_microphone(&mut self) -> Result<Box<dyn Microphone>>;

    fn open_output(&mut self) -> Result<Box<dyn AudioOutput>>;

    /// Start connecting. `events` feeds `Open`, messages, errors, and `Closed`
    /// back to the session.
    fn open_transport(&mut self, events: EventSender) -> Result<Box<dyn Transport>>;
}
