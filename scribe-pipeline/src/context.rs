use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-request state carried by reference through every pipeline stage.
///
/// The correlation id is generated once when the request is admitted and is
/// immutable for the request's lifetime; every stage event is stamped with it
/// so a failure can be traced in logs without re-running the request.
#[derive(Debug)]
pub struct RequestContext {
    correlation_id: String,
    client_identity: String,
    started_at: Instant,
    total_budget: Duration,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(client_identity: impl Into<String>, total_budget: Duration) -> Self {
        Self::with_cancellation(client_identity, total_budget, CancellationToken::new())
    }

    /// Build a context sharing the caller's cancellation token, so an upstream
    /// abort (e.g. client disconnect) propagates into in-flight stages.
    pub fn with_cancellation(
        client_identity: impl Into<String>,
        total_budget: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            client_identity: client_identity.into(),
            started_at: Instant::now(),
            total_budget,
            cancel,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn client_identity(&self) -> &str {
        &self.client_identity
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Absolute deadline for the whole request.
    pub fn deadline(&self) -> Instant {
        self.started_at + self.total_budget
    }

    /// Time left before the request deadline, `None` once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline().checked_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }

    /// Deadline for a stage granted `fraction` of the total budget, measured
    /// from admission. Never extends past the request deadline.
    pub fn stage_deadline(&self, fraction: f64) -> Instant {
        let share = self.total_budget.mul_f64(fraction.clamp(0.0, 1.0));
        (self.started_at + share).min(self.deadline())
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
