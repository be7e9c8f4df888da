use crate::event_log::LogEntry;
use crate::health::HealthSnapshot;
use crate::history::ProjectedHistory;
use crate::models::{AggregateCounters, ConnectionState, ResourceUnit};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionPhase {
    #[default]
    Init,
    Live,
    DegradedLive,
}

/// Ce que la session expose sur elle-même à l'UI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub facility: Option<String>,
}

impl SessionStatus {
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }
}

/// Couche de présentation externe. La session appelle la méthode
/// correspondante chaque fois qu'un élément change.
pub trait DashboardView: Send {
    fn render_counters(&mut self, counters: &AggregateCounters);
    fn render_units(&mut self, units: &[ResourceUnit]);
    fn render_log(&mut self, entries: &[LogEntry]);
    fn render_connection(&mut self, state: ConnectionState);
    fn render_health(&mut self, health: &HealthSnapshot);
    fn render_history(&mut self, history: &ProjectedHistory);
    fn render_status(&mut self, status: &SessionStatus);
    fn show_error(&mut self, message: &str);
}

/// Vue headless : rend le tableau de bord dans les logs.
#[derive(Debug, Default)]
pub struct LogView;

impl DashboardView for LogView {
    fn render_counters(&mut self, c: &AggregateCounters) {
        info!(total = c.total, free = c.free, occupied = c.occupied, out_of_service = c.out_of_service, "counters");
    }

    fn render_units(&mut self, units: &[ResourceUnit]) {
        info!(units = units.len(), "unit grid refreshed");
    }

    fn render_log(&mut self, entries: &[LogEntry]) {
        if let Some(newest) = entries.first() {
            info!(entries = entries.len(), newest = %newest.message, "activity log");
        }
    }

    fn render_connection(&mut self, state: ConnectionState) {
        info!(%state, "push connection");
    }

    fn render_health(&mut self, health: &HealthSnapshot) {
        info!(
            status = health.status.as_str(),
            feed = %health.feed_age_label(),
            last_feed = %health.last_feed_label(),
            recent_events = %health.recent_events_label(),
            message = health.message_label(),
            "health"
        );
    }

    fn render_history(&mut self, history: &ProjectedHistory) {
        if let Some(last) = history.points.last() {
            info!(points = history.len(), occupied = last.occupied, free = last.free, "history");
        }
    }

    fn render_status(&mut self, status: &SessionStatus) {
        info!(phase = ?status.phase, facility = ?status.facility, "session");
    }

    fn show_error(&mut self, message: &str) {
        warn!(%message, "user-visible error");
    }
}
