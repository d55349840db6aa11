//! Human-readable hop progress. Presentation only: nothing here feeds back
//! into control flow.

use std::sync::Mutex;

use serde::Serialize;

/// Per-domain probe status as shown to an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    Testing,
    Available,
    Unavailable,
}

/// One progress update emitted during a hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HopEvent {
    Step {
        current: usize,
        total: usize,
        message: String,
    },
    DomainStatus {
        pool: String,
        domain: String,
        status: DomainStatus,
    },
    Resolved {
        pool: String,
        domain: String,
    },
    Failed {
        message: String,
    },
}

impl HopEvent {
    /// Step update, with `current` capped at `total`.
    pub fn step(current: usize, total: usize, message: impl Into<String>) -> Self {
        HopEvent::Step {
            current: current.min(total),
            total,
            message: message.into(),
        }
    }
}

/// Receiver of hop progress.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: HopEvent);
}

/// Writes every event as a structured log line.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: HopEvent) {
        match &event {
            HopEvent::Step {
                current,
                total,
                message,
            } => {
                let percent = (*current * 100) / (*total).max(1);
                tracing::info!(step = *current, total = *total, percent, "{message}");
            }
            HopEvent::DomainStatus {
                pool,
                domain,
                status,
            } => {
                tracing::debug!(pool = %pool, domain = %domain, status = ?status, "Domain status");
            }
            HopEvent::Resolved { pool, domain } => {
                tracing::info!(pool = %pool, domain = %domain, "Available domain found");
            }
            HopEvent::Failed { message } => {
                tracing::warn!(error = %message, "Hop failed");
            }
        }
    }
}

/// Keeps every event in order and forwards it to the log.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<HopEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_events(self) -> Vec<HopEvent> {
        self.events
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: HopEvent) {
        TracingSink.emit(event.clone());
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_capped_at_total() {
        assert_eq!(
            HopEvent::step(7, 4, "final"),
            HopEvent::Step {
                current: 4,
                total: 4,
                message: "final".to_string()
            }
        );
    }

    #[test]
    fn test_recording_keeps_order() {
        let sink = RecordingSink::new();
        sink.emit(HopEvent::step(1, 3, "probing"));
        sink.emit(HopEvent::Failed {
            message: "nope".to_string(),
        });

        let events = sink.into_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], HopEvent::Step { current: 1, .. }));
        assert!(matches!(events[1], HopEvent::Failed { .. }));
    }

    #[test]
    fn test_event_json_shape() {
        let event = HopEvent::DomainStatus {
            pool: "entry".to_string(),
            domain: "https://a.example.com".to_string(),
            status: DomainStatus::Testing,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "domain_status");
        assert_eq!(json["status"], "testing");
    }
}
