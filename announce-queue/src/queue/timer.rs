//! Next-trigger timer
//!
//! Each queue owns at most one armed `PlaybackTimer`. The timer task waits for
//! the delay and then calls the queue's `TriggerHandler` exactly once, unless
//! its cancellation token fires first. Cancelling is idempotent, so re-arming
//! can always cancel the previous timer without checking whether it already
//! finished.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::event::Event;

/// Callback invoked when a queue's timer elapses
///
/// Called from the timer task, never while the queue's mutex is held by the
/// scheduler, so implementations may lock the queue again.
pub trait TriggerHandler: Send + Sync {
    fn on_trigger(&self, zone_id: &str, event: &Event);
}

/// Handle to one armed timer
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct PlaybackTimer {
    generation: u64,
    token: CancellationToken,
}

impl PlaybackTimer {
    /// Spawn a timer task on the current tokio runtime
    ///
    /// `generation` identifies this arming in logs; queues increment it on
    /// every arm.
    pub fn arm(
        zone_id: String,
        event: Event,
        delay: Duration,
        generation: u64,
        handler: Arc<dyn TriggerHandler>,
    ) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        debug!(
            zone = %zone_id,
            event = %event.id,
            generation,
            delay_ms = delay.as_millis() as u64,
            "Arming playback timer"
        );

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {
                    debug!(zone = %zone_id, event = %event.id, generation, "Playback timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    debug!(zone = %zone_id, event = %event.id, generation, "Playback timer elapsed");
                    handler.on_trigger(&zone_id, &event);
                }
            }
        });

        Self { generation, token }
    }

    /// Stop the timer if it has not fired yet. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for PlaybackTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
