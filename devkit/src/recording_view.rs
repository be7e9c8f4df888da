/*!
Vue d'enregistrement : garde la dernière valeur rendue de chaque élément
du tableau de bord, plus l'historique des états de connexion et des phases.
*/

use parking_live::event_log::{LogEntry, LogKind};
use parking_live::health::HealthSnapshot;
use parking_live::history::ProjectedHistory;
use parking_live::{AggregateCounters, ConnectionState, DashboardView, ResourceUnit, SessionPhase, SessionStatus};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Recorded {
    counters: Option<AggregateCounters>,
    units: Vec<ResourceUnit>,
    log: Vec<LogEntry>,
    connections: Vec<ConnectionState>,
    health: Option<HealthSnapshot>,
    history: Option<ProjectedHistory>,
    status: SessionStatus,
    phases: Vec<SessionPhase>,
    errors: Vec<String>,
}

/// Clonable : un clone va dans la session, l'autre reste au test.
#[derive(Clone, Default)]
pub struct RecordingView {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> Option<AggregateCounters> {
        self.inner.lock().counters
    }

    pub fn units(&self) -> Vec<ResourceUnit> {
        self.inner.lock().units.clone()
    }

    pub fn log(&self) -> Vec<LogEntry> {
        self.inner.lock().log.clone()
    }

    /// Entrées de transition seulement, la plus récente en tête.
    pub fn transitions(&self) -> Vec<LogEntry> {
        self.log().into_iter().filter(|e| matches!(e.kind, LogKind::Transition(_))).collect()
    }

    pub fn connection(&self) -> ConnectionState {
        self.inner.lock().connections.last().copied().unwrap_or_default()
    }

    pub fn connections(&self) -> Vec<ConnectionState> {
        self.inner.lock().connections.clone()
    }

    pub fn health(&self) -> Option<HealthSnapshot> {
        self.inner.lock().health.clone()
    }

    pub fn history(&self) -> Option<ProjectedHistory> {
        self.inner.lock().history.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().status.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().status.phase()
    }

    pub fn phases(&self) -> Vec<SessionPhase> {
        self.inner.lock().phases.clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.inner.lock().errors.clone()
    }
}

impl DashboardView for RecordingView {
    fn render_counters(&mut self, counters: &AggregateCounters) {
        self.inner.lock().counters = Some(*counters);
    }

    fn render_units(&mut self, units: &[ResourceUnit]) {
        self.inner.lock().units = units.to_vec();
    }

    fn render_log(&mut self, entries: &[LogEntry]) {
        self.inner.lock().log = entries.to_vec();
    }

    fn render_connection(&mut self, state: ConnectionState) {
        self.inner.lock().connections.push(state);
    }

    fn render_health(&mut self, health: &HealthSnapshot) {
        self.inner.lock().health = Some(health.clone());
    }

    fn render_history(&mut self, history: &ProjectedHistory) {
        self.inner.lock().history = Some(history.clone());
    }

    fn render_status(&mut self, status: &SessionStatus) {
        let mut r = self.inner.lock();
        if r.phases.last() != Some(&status.phase) {
            r.phases.push(status.phase);
        }
        r.status = status.clone();
    }

    fn show_error(&mut self, message: &str) {
        log::warn!("[VIEW] {message}");
        self.inner.lock().errors.push(message.to_string());
    }
}
