//! WebSocket transport for the Gemini Live API.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::audio::codec::EncodedFrame;
use crate::config::LiveConfig;
use crate::error::{Result, TutorError};
use crate::live::protocol::{RealtimeInputMessage, ServerMessage, SetupMessage};
use crate::live::{EventSender, Transport, TransportEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owns the background connection task. Dropping it cancels the connection.
pub struct GeminiTransport {
    outbound: Option<mpsc::UnboundedSender<String>>,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl GeminiTransport {
    /// Spawn the connection task. Must be called from within a tokio runtime.
    ///
    /// The handshake runs in the background: `Open` is posted once the server
    /// acknowledges setup, `Error` if it fails or times out.
    pub fn open(
        config: &LiveConfig,
        api_key: &str,
        system_instruction: &str,
        events: EventSender,
    ) -> Result<Self> {
        let setup = serde_json::to_string(&SetupMessage::new(config, system_instruction))?;
        let url = format!("{}?key={api_key}", config.endpoint);
        let timeout = Duration::from_secs(config.connect_timeout_secs);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        tracing::debug!(
            endpoint = %config.endpoint,
            model = %config.model,
            epoch = events.epoch(),
            "opening live connection"
        );

        let task = tokio::spawn(run_connection(
            url,
            setup,
            timeout,
            events,
            outbound_rx,
            cancel_rx,
        ));

        Ok(Self {
            outbound: Some(outbound_tx),
            cancel: cancel_tx,
            task: Some(task),
        })
    }
}

impl Transport for GeminiTransport {
    fn send_audio(&mut self, frame: EncodedFrame) -> Result<()> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| TutorError::Transport("connection is closed".to_string()))?;
        let json = serde_json::to_string(&RealtimeInputMessage::audio(frame))?;
        outbound
            .send(json)
            .map_err(|_| TutorError::Transport("connection task has exited".to_string()))
    }

    fn close(&mut self) {
        if self.outbound.take().is_none() {
            return;
        }
        let _ = self.cancel.send(true);
        // The task exits on its own after sending a close frame.
        self.task.take();
        tracing::debug!("live connection closing");
    }
}

impl Drop for GeminiTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolves once cancellation is requested or the owner is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    while !*cancel.borrow_and_update() {
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Connect, send setup, and wait for the server to acknowledge it.
async fn handshake(url: &str, setup: String, timeout: Duration) -> Result<Socket> {
    let attempt = async {
        let (mut socket, response) = connect_async(url)
            .await
            .map_err(|e| TutorError::Transport(format!("websocket connect failed: {e}")))?;
        tracing::debug!("websocket connected (status: {})", response.status());

        socket
            .send(Message::Text(setup.into()))
            .await
            .map_err(|e| TutorError::Transport(format!("failed to send setup: {e}")))?;

        while let Some(frame) = socket.next().await {
            let frame =
                frame.map_err(|e| TutorError::Transport(format!("websocket error: {e}")))?;
            let raw = match &frame {
                Message::Text(text) => text.as_str().as_bytes(),
                Message::Binary(data) => &data[..],
                Message::Close(reason) => {
                    return Err(TutorError::Transport(format!(
                        "server closed the connection during setup: {reason:?}"
                    )));
                }
                _ => continue,
            };
            if ServerMessage::parse(raw)?.is_setup_complete() {
                return Ok(socket);
            }
        }
        Err(TutorError::Transport(
            "connection ended before setup completed".to_string(),
        ))
    };

    tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| TutorError::Transport(format!("no setup reply within {timeout:?}")))?
}

async fn run_connection(
    url: String,
    setup: String,
    timeout: Duration,
    events: EventSender,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut cancel: watch::Receiver<bool>,
) {
    let connected = tokio::select! {
        result = handshake(&url, setup, timeout) => result,
        () = cancelled(&mut cancel) => {
            tracing::debug!("live connection cancelled before it opened");
            return;
        }
    };

    let socket = match connected {
        Ok(socket) => socket,
        Err(e) => {
            tracing::warn!("live connection failed: {e}");
            events.transport(TransportEvent::Error(e.to_string()));
            return;
        }
    };

    tracing::info!("live session established");
    if !events.transport(TransportEvent::Open) {
        return;
    }

    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            () = cancelled(&mut cancel) => {
                let _ = write.send(Message::Close(None)).await;
                tracing::debug!("live connection closed locally");
                return;
            }

            Some(json) = outbound.recv() => {
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    events.transport(TransportEvent::Error(format!("send failed: {e}")));
                    return;
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => dispatch(&events, text.as_str().as_bytes()),
                    Some(Ok(Message::Binary(data))) => dispatch(&events, &data),
                    Some(Ok(Message::Close(reason))) => {
                        tracing::info!("server closed live connection: {reason:?}");
                        events.transport(TransportEvent::Closed);
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        events.transport(TransportEvent::Error(format!("websocket error: {e}")));
                        return;
                    }
                    None => {
                        events.transport(TransportEvent::Closed);
                        return;
                    }
                }
            }
        }
    }
}

fn dispatch(events: &EventSender, raw: &[u8]) {
    match ServerMessage::parse(raw) {
        Ok(message) => {
            if let Some(go_away) = &message.go_away {
                tracing::warn!("server will end the session soon: {:?}", go_away.time_left);
            }
            events.transport(TransportEvent::Message(Box::new(message)));
        }
        Err(e) => tracing::warn!("ignoring server message: {e}"),
    }
}
