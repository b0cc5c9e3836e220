use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::time::Duration;

use crate::audio::capture::{CpalMicrophone, Microphone};
use crate::audio::playback::CpalOutput;
use crate::audio::scheduler::AudioOutput;
use crate::chat::voice_instruction;
use crate::config::{AudioConfig, Config, LiveConfig};
use crate::error::{Result, TutorError};
use crate::live::session::{LiveSession, SessionCallbacks, SessionState};
use crate::live::transport::GeminiTransport;
use crate::live::{EventSender, SessionBackend, Transport};

const METER_WIDTH: usize = 30;

/// Real devices and the Gemini Live endpoint.
pub struct CpalBackend {
    audio: AudioConfig,
    live: LiveConfig,
    api_key: String,
    instruction: String,
}

impl CpalBackend {
    #[must_use]
    pub fn new(config: &Config, api_key: String) -> Self {
        Self {
            audio: config.audio.clone(),
            live: config.live.clone(),
            api_key,
            instruction: voice_instruction(),
        }
    }
}

impl SessionBackend for CpalBackend {
    fn acquire_microphone(&mut self) -> Result<Box<dyn Microphone>> {
        Ok(Box::new(CpalMicrophone::open(&self.audio)?))
    }

    fn open_output(&mut self) -> Result<Box<dyn AudioOutput>> {
        Ok(Box::new(CpalOutput::open(&self.audio)?))
    }

    fn open_transport(&mut self, events: EventSender) -> Result<Box<dyn Transport>> {
        Ok(Box::new(GeminiTransport::open(
            &self.live,
            &self.api_key,
            &self.instruction,
            events,
        )?))
    }
}

fn meter(level: f32) -> String {
    let filled = ((level.clamp(0.0, 1.0) * METER_WIDTH as f32).round() as usize).min(METER_WIDTH);
    format!(
        "[{}{}]",
        "#".repeat(filled),
        " ".repeat(METER_WIDTH - filled)
    )
}

/// Talk with the tutor until Ctrl+C or the server ends the session.
pub async fn run_voice_session(config: &Config) -> Result<()> {
    let backend = CpalBackend::new(config, config.api_key()?);
    let failure: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));

    let failed = failure.clone();
    let callbacks = SessionCallbacks::new()
        .on_connect(|| eprintln!("Connected. Speak now (Ctrl+C to end)."))
        .on_disconnect(|| eprintln!("\nDisconnected."))
        .on_error(move |e| {
            eprintln!("\nVoice session error: {e}");
            *failed.borrow_mut() = Some(e.to_string());
        })
        .on_volume_change(|level| {
            eprint!("\r  mic {}", meter(level));
            let _ = std::io::stderr().flush();
        });

    let (mut session, mut events) =
        LiveSession::new(backend, callbacks, config.audio.volume_gain);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received Ctrl+C, ending voice session");
        let _ = shutdown_tx.send(());
    });

    eprintln!("Connecting to {}...", config.live.model);
    session.connect();

    let mut reap = tokio::time::interval(Duration::from_millis(50));
    while session.state() != SessionState::Idle {
        tokio::select! {
            Some(envelope) = events.recv() => session.handle(envelope),
            _ = reap.tick() => session.poll_playback(),
            _ = &mut shutdown_rx => session.disconnect(),
        }
    }

    let failure = failure.borrow_mut().take();
    if let Some(reason) = failure {
        // Leave the error readable before the command exits.
        tokio::time::sleep(Duration::from_secs(config.live.error_dismiss_secs)).await;
        return Err(TutorError::Other(reason));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_scales_and_clamps() {
        assert_eq!(meter(0.0), format!("[{}]", " ".repeat(METER_WIDTH)));
        assert_eq!(meter(1.0), format!("[{}]", "#".repeat(METER_WIDTH)));
        assert_eq!(meter(7.5), meter(1.0));
        assert_eq!(meter(0.5).matches('#').count(), METER_WIDTH / 2);
    }
}
