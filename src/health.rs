// src/health.rs
//! Cross-task health signal for the poll loop, consumed by `/status`.
//!
//! A failed credential refresh or an aborted cycle means the whole pipeline
//! is stalled; this is the one piece of state shared between the loop task
//! and the HTTP surface.

use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub cycles_total: u64,
    pub consecutive_failures: u32,
    pub last_ok_unix: Option<i64>,
    pub last_error: Option<String>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        // Nothing has failed before the first cycle runs.
        Self {
            healthy: true,
            cycles_total: 0,
            consecutive_failures: 0,
            last_ok_unix: None,
            last_error: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct Health {
    inner: Arc<RwLock<HealthSnapshot>>,
}

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        let mut s = self.inner.write().expect("health lock poisoned");
        s.healthy = true;
        s.cycles_total += 1;
        s.consecutive_failures = 0;
        s.last_ok_unix = Some(chrono::Utc::now().timestamp());
        s.last_error = None;
    }

    pub fn record_failure(&self, error: impl Into<String>) {
        let mut s = self.inner.write().expect("health lock poisoned");
        s.healthy = false;
        s.cycles_total += 1;
        s.consecutive_failures += 1;
        s.last_error = Some(error.into());
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.inner.read().expect("health lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy_then_tracks_failures_and_recovery() {
        let h = Health::new();
        assert!(h.snapshot().healthy);

        h.record_failure("boom");
        let s = h.snapshot();
        assert!(!s.healthy);
        assert_eq!(s.consecutive_failures, 1);
        assert_eq!(s.last_error.as_deref(), Some("boom"));

        h.record_success();
        let s = h.snapshot();
        assert!(s.healthy);
        assert_eq!(s.consecutive_failures, 0);
        assert!(s.last_error.is_none());
        assert_eq!(s.cycles_total, 2);
    }
}
