//! Runtime pause requests.
//!
//! [`PauseToken`] is the only state shared between the signal-handling path and
//! the scheduling path. It is a single atomic deadline: "paused" means the
//! deadline lies in the future. A new signal overwrites the deadline (the timer
//! restarts, pauses never stack) and expiry needs no explicit reset.
//!
//! A pause never interrupts a render in flight; the scheduler only consults the
//! token at its checkpoints between units and batches.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared pause state: Running or Paused-until-deadline
#[derive(Debug)]
pub struct PauseToken {
    origin: Instant,
    /// Deadline in microseconds after `origin`; 0 means Running
    deadline_us: AtomicU64,
    duration: Duration,
}

impl PauseToken {
    pub fn new(duration: Duration) -> Self {
        Self {
            origin: Instant::now(),
            deadline_us: AtomicU64::new(0),
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Enter (or extend) the Paused state for the configured duration.
    ///
    /// # Returns
    /// The instant at which scheduling resumes
    pub fn trigger(&self) -> Instant {
        let deadline = self.origin.elapsed() + self.duration;
        // Round up so the resume instant is never earlier than now + duration
        let micros = deadline.as_micros() as u64 + 1;
        self.deadline_us.store(micros, Ordering::SeqCst);
        self.origin + Duration::from_micros(micros)
    }

    /// Force the Running state
    pub fn reset(&self) {
        self.deadline_us.store(0, Ordering::SeqCst);
    }

    /// When the current pause ends, or `None` while Running.
    ///
    /// An expired deadline is cleared on observation.
    pub fn resume_at(&self) -> Option<Instant> {
        let micros = self.deadline_us.load(Ordering::SeqCst);
        if micros == 0 {
            return None;
        }

        let deadline = self.origin + Duration::from_micros(micros);
        if Instant::now() >= deadline {
            // Only clear the deadline we looked at; a concurrent trigger wins
            let _ = self.deadline_us.compare_exchange(
                micros,
                0,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            return None;
        }
        Some(deadline)
    }

    pub fn is_paused(&self) -> bool {
        self.resume_at().is_some()
    }

    /// Block until the token is Running again, or until `stop` is cancelled.
    ///
    /// Sleeps until the current deadline and re-checks, so a signal that
    /// arrives mid-wait extends the pause.
    ///
    /// # Returns
    /// `true` if the caller actually had to wait
    pub async fn wait_while_paused(&self, stop: &CancellationToken) -> bool {
        let mut waited = false;

        while let Some(deadline) = self.resume_at() {
            if !waited {
                tracing::info!(
                    "Paused - resuming in {:.0}s",
                    deadline.saturating_duration_since(Instant::now()).as_secs_f64()
                );
            }
            waited = true;

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = stop.cancelled() => {
                    tracing::info!("Stop requested while paused");
                    return waited;
                }
            }
        }

        if waited {
            tracing::info!("Pause elapsed - resuming");
        }
        waited
    }
}

/// Listens for the external pause signal (`SIGUSR1` on Unix) and triggers a [`PauseToken`]
pub struct PauseSignalHandler;

impl PauseSignalHandler {
    /// Install the signal listener on the current tokio runtime.
    ///
    /// The task runs until `stop` is cancelled.
    #[cfg(unix)]
    pub fn spawn(
        token: Arc<PauseToken>,
        stop: CancellationToken,
    ) -> std::io::Result<JoinHandle<()>> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut stream = signal(SignalKind::user_defined1())?;
        tracing::info!(
            "Send SIGUSR1 to process {} to pause scheduling for {:?}",
            std::process::id(),
            token.duration()
        );

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = stream.recv() => {
                        if received.is_none() {
                            break;
                        }
                        let already_paused = token.is_paused();
                        token.trigger();
                        if already_paused {
                            tracing::info!("Pause signal received again - timer restarted");
                        } else {
                            tracing::info!(
                                "Pause signal received - no new work for {:?}",
                                token.duration()
                            );
                        }
                    }
                    _ = stop.cancelled() => break,
                }
            }
        }))
    }

    #[cfg(not(unix))]
    pub fn spawn(
        token: Arc<PauseToken>,
        _stop: CancellationToken,
    ) -> std::io::Result<JoinHandle<()>> {
        tracing::warn!("Pause signal is not supported on this platform");
        drop(token);
        Ok(tokio::spawn(async {}))
    }
}
