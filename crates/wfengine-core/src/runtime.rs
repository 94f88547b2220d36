//! Per-run cancellation and deadline plumbing (§4.8). Checked before each
//! step dispatch and before each LLM call so a run stops promptly rather
//! than only between top-level steps.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// Engine-wide tunables. Grounded on the teacher's `Config` struct
/// (`config.rs`), which reads analogous values from the environment at
/// startup and threads them through as plain fields rather than a global.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Wall-clock budget for a single sandboxed expression or code body.
    pub sandbox_timeout: Duration,
    /// Wall-clock budget for a single LLM completion call.
    pub llm_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            sandbox_timeout: Duration::from_secs(2),
            llm_timeout: Duration::from_secs(30),
        }
    }
}

/// Cancellation and optional deadline for one in-flight `WorkflowExecution`.
/// Cloning shares the same underlying token — every clone observes
/// cancellation fired from any other.
#[derive(Clone)]
pub struct RunHandle {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunHandle {
    pub fn new(deadline: Option<Duration>) -> Self {
        RunHandle {
            token: CancellationToken::new(),
            deadline: deadline.map(|d| Instant::now() + d),
        }
    }

    /// Request cancellation of the run. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check whether the run should stop before dispatching the next step
    /// or making the next LLM call. Cancellation takes priority over a
    /// blown deadline when both apply.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(EngineError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_handle_passes_check() {
        let handle = RunHandle::new(None);
        assert!(handle.check().is_ok());
    }

    #[test]
    fn cancelled_handle_fails_check() {
        let handle = RunHandle::new(None);
        handle.cancel();
        assert_eq!(handle.check().unwrap_err().kind(), "CANCELLED");
    }

    #[test]
    fn blown_deadline_fails_check() {
        let handle = RunHandle::new(Some(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(handle.check().unwrap_err().kind(), "DEADLINE_EXCEEDED");
    }
}
