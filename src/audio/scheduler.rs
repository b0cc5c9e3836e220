//! Gapless, non-overlapping playback ordering for streamed model audio.

use crate::audio::AudioBuffer;
use crate::error::{Result, TutorError};

pub type UnitId = u64;

/// An output device with its own sample clock.
pub trait AudioOutput {
    /// Seconds elapsed on the output clock.
    fn current_time(&self) -> f64;

    /// Schedule `buffer` to begin at clock time `at`, or at the clock if it has
    /// already moved past `at`. Returns the start time actually used.
    fn start(&mut self, id: UnitId, buffer: &AudioBuffer, at: f64) -> Result<f64>;

    /// Silence a unit immediately, wherever it is in its playback.
    fn stop(&mut self, id: UnitId);

    /// Units that finished playing on their own since the last call.
    fn take_finished(&mut self) -> Vec<UnitId>;

    /// Release the device.
    fn close(&mut self) -> Result<()>;
}

/// A buffer handed to the output, with its scheduled window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackUnit {
    pub id: UnitId,
    pub start: f64,
    pub duration: f64,
}

impl PlaybackUnit {
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Places each arriving buffer directly after the previous one, never earlier
/// than the output clock, in arrival order.
pub struct Scheduler {
    output: Option<Box<dyn AudioOutput>>,
    cursor: f64,
    active: Vec<PlaybackUnit>,
    next_id: UnitId,
}

impl Scheduler {
    #[must_use]
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output: Some(output),
            cursor: 0.0,
            active: Vec::new(),
            next_id: 0,
        }
    }

    /// Schedule `buffer` at `max(now, cursor)` and advance the cursor past it.
    pub fn enqueue(&mut self, buffer: &AudioBuffer) -> Result<PlaybackUnit> {
        self.reap();

        let output = self
            .output
            .as_mut()
            .ok_or_else(|| TutorError::Audio("playback scheduler is shut down".to_string()))?;

        let requested = output.current_time().max(self.cursor);
        let id = self.next_id;
        // The clock keeps running between reading it and starting the unit.
        let start = output.start(id, buffer, requested)?;

        self.next_id += 1;
        let unit = PlaybackUnit {
            id,
            start,
            duration: buffer.duration(),
        };
        self.cursor = unit.end();
        self.active.push(unit);

        tracing::trace!(id, start, duration = unit.duration, "scheduled playback unit");
        Ok(unit)
    }

    /// Forget units that completed naturally. Returns how many were removed.
    pub fn reap(&mut self) -> usize {
        let Some(output) = self.output.as_mut() else {
            return 0;
        };
        let finished = output.take_finished();
        if finished.is_empty() {
            return 0;
        }
        let before = self.active.len();
        self.active.retain(|u| !finished.contains(&u.id));
        before - self.active.len()
    }

    /// Halt every active unit and move the cursor back to the current clock time.
    pub fn flush(&mut self) {
        let now = match self.output.as_mut() {
            Some(output) => {
                for unit in &self.active {
                    output.stop(unit.id);
                }
                // Stopped units must not resurface as finished later.
                let _ = output.take_finished();
                output.current_time()
            }
            None => 0.0,
        };

        if !self.active.is_empty() {
            tracing::debug!("flushed {} playback units", self.active.len());
        }
        self.active.clear();
        self.cursor = now;
    }

    /// Flush, then release the output device. Later calls do nothing.
    pub fn shutdown(&mut self) {
        if self.output.is_none() {
            return;
        }
        self.flush();
        if let Some(mut output) = self.output.take()
            && let Err(e) = output.close()
        {
            tracing::debug!("closing audio output: {e}");
        }
    }

    #[must_use]
    pub fn active(&self) -> &[PlaybackUnit] {
        &self.active
    }

    /// Earliest start time for the next buffer, before the clock is considered.
    #[must_use]
    pub const fn cursor(&self) -> f64 {
        self.cursor
    }

    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        self.output.is_none()
    }
}
