use crate::models::ConnectionState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum HealthStatus {
    Up,
    #[default]
    Degraded,
    Down,
}

impl HealthStatus {
    /// Statut absent ou inconnu → DEGRADED, comme le fait le serveur.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "UP" => HealthStatus::Up,
            "DOWN" => HealthStatus::Down,
            _ => HealthStatus::Degraded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Up => "UP",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Down => "DOWN",
        }
    }
}

/// Santé rapportée par `/health`. Purement informatif.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub feed_age_ms: Option<i64>,
    pub last_feed_at: Option<String>,
    pub message: Option<String>,
    pub recent_events: Option<u32>,
}

impl HealthSnapshot {
    /// Âge du feed en secondes arrondies (`"42s"`), `"-"` si inconnu.
    pub fn feed_age_label(&self) -> String {
        match self.feed_age_ms {
            Some(ms) => format!("{}s", (ms as f64 / 1000.0).round() as i64),
            None => "-".to_string(),
        }
    }

    pub fn last_feed_label(&self) -> String {
        self.last_feed_at.clone().unwrap_or_else(|| "-".to_string())
    }

    pub fn message_label(&self) -> &str {
        self.message.as_deref().unwrap_or("-")
    }

    pub fn recent_events_label(&self) -> String {
        self.recent_events.map_or_else(|| "-".to_string(), |n| n.to_string())
    }
}

/// Statistiques du lien push, lisibles hors de la boucle de session.
#[derive(Debug, Clone, Serialize)]
pub struct LinkStats {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub messages_received: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct LinkTracker {
    reconnects: Arc<AtomicU32>,
    messages: Arc<AtomicU64>,
    state: Arc<parking_lot::Mutex<ConnectionState>>,
    last_message_at: Arc<parking_lot::Mutex<Option<DateTime<Utc>>>>,
}

impl LinkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retourne true si l'état a changé.
    pub fn set_state(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if *state == next {
            return false;
        }
        *state = next;
        true
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn increment_reconnects(&self) -> u32 {
        self.reconnects.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn mark_message(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        *self.last_message_at.lock() = Some(Utc::now());
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            state: self.state(),
            reconnect_attempts: self.reconnects.load(Ordering::Relaxed),
            messages_received: self.messages.load(Ordering::Relaxed),
            last_message_at: *self.last_message_at.lock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_labels() {
        let mut health = HealthSnapshot::default();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.feed_age_label(), "-");
        assert_eq!(health.last_feed_label(), "-");

        health.feed_age_ms = Some(41_600);
        health.last_feed_at = Some("2024-05-01T10:00:00Z".into());
        assert_eq!(health.feed_age_label(), "42s");
        assert_eq!(health.last_feed_label(), "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_message_and_recent_events_labels() {
        let mut health = HealthSnapshot::default();
        assert_eq!(health.message_label(), "-");
        assert_eq!(health.recent_events_label(), "-");

        health.message = Some("feed lagging".into());
        health.recent_events = Some(12);
        assert_eq!(health.message_label(), "feed lagging");
        assert_eq!(health.recent_events_label(), "12");
    }

    #[test]
    fn test_health_status_parse() {
        assert_eq!(HealthStatus::parse("up"), HealthStatus::Up);
        assert_eq!(HealthStatus::parse("DOWN"), HealthStatus::Down);
        assert_eq!(HealthStatus::parse("weird"), HealthStatus::Degraded);
    }

    #[test]
    fn test_link_tracker_counts() {
        let tracker = LinkTracker::new();
        assert!(!tracker.set_state(ConnectionState::Disconnected));
        assert!(tracker.set_state(ConnectionState::Connecting));
        assert_eq!(tracker.increment_reconnects(), 1);
        tracker.mark_message();

        let stats = tracker.stats();
        assert_eq!(stats.state, ConnectionState::Connecting);
        assert_eq!(stats.reconnect_attempts, 1);
        assert_eq!(stats.messages_received, 1);
        assert!(stats.last_message_at.is_some());
    }
}
