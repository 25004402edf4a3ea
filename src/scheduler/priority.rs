// Process scheduling priority ("niceness")
//
// Applied once to the coordinating process at startup, again by every tokio
// worker thread when it starts, and inside every spawned render process.
// Linux tracks niceness per thread, so inheritance alone is not enough.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PriorityError {
    #[error("Nice level {0} is outside the range -20..=19")]
    OutOfRange(i32),

    #[error("Changing priority to {nice} was refused: {source}")]
    Refused {
        nice: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("Process priority cannot be changed on this platform")]
    Unsupported,
}

/// Lowers (or attempts to set) the scheduling priority of the calling thread/process.
///
/// A failure is never fatal: callers log it and render at default priority.
#[derive(Debug, Clone, Copy)]
pub struct PriorityController {
    nice: i32,
}

impl PriorityController {
    pub fn new(nice: i32) -> Self {
        Self { nice }
    }

    pub fn nice(&self) -> i32 {
        self.nice
    }

    /// Apply the configured niceness to the calling thread
    pub fn apply(&self) -> Result<(), PriorityError> {
        if !(-20..=19).contains(&self.nice) {
            return Err(PriorityError::OutOfRange(self.nice));
        }
        platform::set_niceness(self.nice).map_err(|source| {
            if source.kind() == std::io::ErrorKind::Unsupported {
                PriorityError::Unsupported
            } else {
                PriorityError::Refused {
                    nice: self.nice,
                    source,
                }
            }
        })
    }

    /// Apply the niceness, downgrading any failure to a warning
    pub fn apply_or_warn(&self) {
        match self.apply() {
            Ok(()) => tracing::info!("Scheduling priority set (nice {})", self.nice),
            Err(e) => tracing::warn!("{} - continuing at default priority", e),
        }
    }

    /// Apply the niceness on a freshly started worker thread.
    ///
    /// Runs inside runtime thread-start hooks, so it only logs at debug level.
    pub fn apply_on_worker_start(&self) {
        if let Err(e) = self.apply() {
            tracing::debug!("Worker thread priority not changed: {}", e);
        }
    }
}

#[cfg(unix)]
pub(crate) mod platform {
    use std::io;

    /// Raw `setpriority` for the calling thread.
    ///
    /// Only performs a syscall, so it is safe to call between `fork` and `exec`.
    pub(crate) fn set_niceness(nice: i32) -> io::Result<()> {
        // SAFETY: setpriority has no memory-safety preconditions
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS as _, 0, nice) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(not(unix))]
pub(crate) mod platform {
    use std::io;

    pub(crate) fn set_niceness(_nice: i32) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}
