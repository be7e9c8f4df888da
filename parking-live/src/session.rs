/**
 * SESSION - Orchestrateur de réconciliation d'un tableau de bord
 *
 * RÔLE :
 * Possède le State Store, l'Event Log, l'historique brut et la santé ; fusionne
 * les notifications push et les réponses pull en une seule vue, puis notifie
 * la `DashboardView` de chaque élément qui change.
 *
 * FONCTIONNEMENT :
 * - Une seule tâche : `run()` boucle sur `tokio::select!` (commandes, événements
 *   push, pulls terminés, timers). Aucune mutation hors de cette boucle
 * - Les pulls sont des tâches d'un `JoinSet`, annulées ensemble à l'arrêt
 * - Phases : Init → (snapshot chargé) → Live ⇄ DegradedLive selon le lien push
 * - Contrôle de cohérence : un total pull différent du nombre de plazas
 *   déclenche un rechargement complet, une seule fois par total rapporté
 * - Chaque reconnexion après la première rejoue la fenêtre d'événements et
 *   recharge les plazas
 */

use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};
use crate::event_log::{EventLog, LogEntry};
use crate::health::{HealthSnapshot, LinkStats, LinkTracker};
use crate::history;
use crate::loader::PullSource;
use crate::models::{AggregateCounters, ConnectionState, HistoryPoint, ReportedCounters, ResourceUnit, UnitId, UnitStatus, Update};
use crate::push::{PushChannelManager, PushEvent, PushTransport};
use crate::store::{ApplyOutcome, StateStore};
use crate::view::{DashboardView, SessionPhase, SessionStatus};
use crate::wire::{self, ServerZone};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug)]
enum Command {
    ChangeStatus { unit: String, status: String },
    Shutdown,
}

/// Poignée clonable vers une session en cours.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    link: LinkTracker,
}

impl SessionHandle {
    /// Demande un changement de statut. La validation a lieu dans la session ;
    /// un refus arrive à la vue via `show_error`. Renvoie false si la session
    /// est déjà terminée.
    pub fn request_status_change(&self, unit_id: impl Into<String>, status: impl Into<String>) -> bool {
        self.commands
            .send(Command::ChangeStatus { unit: unit_id.into(), status: status.into() })
            .is_ok()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Compteurs du lien push, lisibles pendant que la session tourne.
    pub fn link_stats(&self) -> LinkStats {
        self.link.stats()
    }
}

/// Résultat d'un pull, rapporté à la boucle par le `JoinSet`.
enum Pulled {
    Resources(Result<Vec<ResourceUnit>>),
    Counters(Result<ReportedCounters>),
    Events(Result<Vec<Update>>),
    Health(Result<HealthSnapshot>),
    History(Result<Vec<HistoryPoint>>),
    StatusChange { unit: UnitId, status: UnitStatus, result: Result<()> },
}

pub struct Session {
    config: DashboardConfig,
    pull: Arc<dyn PullSource>,
    push: PushChannelManager,
    push_events: mpsc::UnboundedReceiver<PushEvent>,
    zone: ServerZone,
    view: Box<dyn DashboardView>,
    commands_tx: Option<mpsc::UnboundedSender<Command>>,
    commands: mpsc::UnboundedReceiver<Command>,
    pulls: JoinSet<Pulled>,

    store: StateStore,
    log: EventLog,
    raw_history: Vec<HistoryPoint>,
    status: SessionStatus,
    connection: ConnectionState,
    ever_connected: bool,

    reload_in_flight: bool,
    deferred_check: Option<AggregateCounters>,
    drift_total: Option<u32>,
}

impl Session {
    pub fn new(
        config: DashboardConfig,
        pull: Arc<dyn PullSource>,
        push: Box<dyn PushTransport>,
        view: Box<dyn DashboardView>,
    ) -> Self {
        let (push_tx, push_events) = mpsc::unbounded_channel();
        let push = PushChannelManager::new(push, config.push.topic.clone(), config.push.reconnect.clone(), push_tx);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let log = EventLog::with_capacity(config.log_capacity);
        let zone = config.api.server_zone();

        Self {
            config,
            pull,
            push,
            push_events,
            zone,
            view,
            commands_tx: Some(commands_tx),
            commands,
            pulls: JoinSet::new(),
            store: StateStore::new(),
            log,
            raw_history: Vec::new(),
            status: SessionStatus::default(),
            connection: ConnectionState::Disconnected,
            ever_connected: false,
            reload_in_flight: false,
            deferred_check: None,
            drift_total: None,
        }
    }

    /// Poignée de contrôle. La session s'arrête sur `shutdown()` ou quand
    /// toutes les poignées ont été détruites ; il faut donc en prendre une
    /// avant `run()`.
    pub fn handle(&self) -> SessionHandle {
        let commands = match &self.commands_tx {
            Some(tx) => tx.clone(),
            // run() a déjà commencé : poignée morte
            None => mpsc::unbounded_channel().0,
        };
        SessionHandle { commands, link: self.push.tracker() }
    }

    pub async fn run(mut self) {
        self.commands_tx = None;
        info!(api = %self.config.api.base_url, topic = %self.config.push.topic, "session starting");

        self.view.render_status(&self.status);
        self.view.render_connection(self.connection);

        // pull complet et connexion push, indépendants l'un de l'autre
        self.request_resources();
        self.request_counters();
        self.request_events();
        self.request_health();
        self.request_history();
        self.push.connect();

        let polling = self.config.polling.clone();
        let mut health_tick = ticker(polling.health_every());
        let mut events_tick = ticker(polling.events_every());
        let mut history_tick = ticker(polling.history_every());

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::ChangeStatus { unit, status }) => self.on_status_change(&unit, &status),
                    Some(Command::Shutdown) | None => break,
                },
                Some(event) = self.push_events.recv() => self.on_push_event(event),
                Some(joined) = self.pulls.join_next(), if !self.pulls.is_empty() => match joined {
                    Ok(pulled) => self.on_pulled(pulled),
                    Err(e) if e.is_cancelled() => debug!("pull cancelled"),
                    Err(e) => warn!(error = %e, "pull task failed"),
                },
                _ = health_tick.tick() => {
                    self.request_health();
                    self.request_counters();
                }
                _ = events_tick.tick() => {
                    self.request_events();
                    if self.status.phase == SessionPhase::Init && !self.reload_in_flight {
                        info!("initial snapshot still missing, retrying");
                        self.request_resources();
                        self.request_counters();
                    }
                }
                _ = history_tick.tick() => self.request_history(),
            }
        }

        self.pulls.abort_all();
        while self.pulls.join_next().await.is_some() {}
        self.push.disconnect().await;
        info!("session stopped");
    }

    // ----- pulls -----

    fn request_resources(&mut self) {
        if self.reload_in_flight {
            return;
        }
        self.reload_in_flight = true;
        let pull = self.pull.clone();
        self.pulls.spawn(async move { Pulled::Resources(pull.load_resources().await) });
    }

    fn request_counters(&mut self) {
        let pull = self.pull.clone();
        self.pulls.spawn(async move { Pulled::Counters(pull.load_counters().await) });
    }

    fn request_events(&mut self) {
        let pull = self.pull.clone();
        let limit = self.config.polling.event_window_limit;
        self.pulls.spawn(async move { Pulled::Events(pull.load_event_window(limit).await) });
    }

    fn request_health(&mut self) {
        let pull = self.pull.clone();
        self.pulls.spawn(async move { Pulled::Health(pull.load_health().await) });
    }

    fn request_history(&mut self) {
        let pull = self.pull.clone();
        self.pulls.spawn(async move { Pulled::History(pull.load_history().await) });
    }

    fn on_pulled(&mut self, pulled: Pulled) {
        match pulled {
            Pulled::Resources(res) => self.on_resources(res),
            Pulled::Counters(Ok(reported)) => self.on_counters(reported),
            Pulled::Counters(Err(e)) => warn!(kind = e.kind(), error = %e, "counters pull failed, keeping last state"),
            Pulled::Events(Ok(updates)) => {
                let added = self.log.record_batch(updates.iter().map(LogEntry::transition));
                debug!(received = updates.len(), added, "event window merged");
                if added > 0 {
                    self.render_log();
                }
            }
            Pulled::Events(Err(e)) => warn!(kind = e.kind(), error = %e, "event window pull failed"),
            Pulled::Health(Ok(health)) => self.view.render_health(&health),
            Pulled::Health(Err(e)) => warn!(kind = e.kind(), error = %e, "health pull failed"),
            Pulled::History(Ok(points)) => {
                self.raw_history = points;
                let projected = history::project(&self.raw_history, Utc::now());
                self.view.render_history(&projected);
            }
            Pulled::History(Err(e)) => warn!(kind = e.kind(), error = %e, "history pull failed"),
            Pulled::StatusChange { unit, status, result } => self.on_status_changed(unit, status, result),
        }
    }

    fn on_resources(&mut self, res: Result<Vec<ResourceUnit>>) {
        self.reload_in_flight = false;
        match res {
            Ok(units) => {
                info!(units = units.len(), "resource snapshot loaded");
                self.store.replace_snapshot(units);
                self.render_store();
                if self.status.phase == SessionPhase::Init {
                    let next = if self.connection == ConnectionState::Connected {
                        SessionPhase::Live
                    } else {
                        SessionPhase::DegradedLive
                    };
                    self.set_phase(next);
                }
                if let Some(counters) = self.deferred_check.take() {
                    self.check_consistency(counters);
                }
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "resource load failed, keeping last snapshot");
                // le total en cause pourra redéclencher un rechargement
                self.drift_total = None;
                self.deferred_check = None;
                self.record(LogEntry::error(format!("Failed to load units: {e}"), Utc::now()));
            }
        }
    }

    fn on_counters(&mut self, reported: ReportedCounters) {
        if reported.facility.is_some() && reported.facility != self.status.facility {
            self.status.facility = reported.facility.clone();
            self.view.render_status(&self.status);
        }
        self.check_consistency(reported.counters);
    }

    /// Compare un total pull au nombre de plazas connues. Les compteurs
    /// rendus viennent toujours du store ; seul le total est arbitré ici.
    fn check_consistency(&mut self, reported: AggregateCounters) {
        if self.reload_in_flight {
            self.deferred_check = Some(reported);
            return;
        }
        if !self.store.is_loaded() {
            return;
        }
        let known = self.store.len();
        if reported.total as usize == known {
            self.drift_total = None;
            return;
        }
        if self.drift_total == Some(reported.total) {
            debug!(reported = reported.total, known, "drift already handled for this total");
            return;
        }
        warn!(reported = reported.total, known, "unit set is stale, reloading snapshot");
        self.drift_total = Some(reported.total);
        self.request_resources();
    }

    // ----- push -----

    fn on_push_event(&mut self, event: PushEvent) {
        match event {
            PushEvent::State(state) => self.on_connection(state),
            PushEvent::Message(payload) => match wire::decode_push_update(&payload, self.zone) {
                Ok(update) => self.on_update(update),
                Err(e) => warn!(error = %e, bytes = payload.len(), "discarding malformed push message"),
            },
            PushEvent::ReconnectScheduled { attempt, delay } => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "push reconnect scheduled");
            }
        }
    }

    fn on_connection(&mut self, state: ConnectionState) {
        let previous = std::mem::replace(&mut self.connection, state);
        self.view.render_connection(state);

        match state {
            ConnectionState::Connected => {
                self.record(LogEntry::connection("Push channel connected", Utc::now()));
                if self.status.phase == SessionPhase::DegradedLive {
                    self.set_phase(SessionPhase::Live);
                }
                if self.ever_connected {
                    info!("push channel back, replaying event window");
                    self.request_events();
                    self.request_resources();
                }
                self.ever_connected = true;
            }
            ConnectionState::Disconnected => {
                if previous == ConnectionState::Connected {
                    self.record(LogEntry::connection("Push channel lost", Utc::now()));
                }
                if self.status.phase == SessionPhase::Live {
                    self.set_phase(SessionPhase::DegradedLive);
                }
            }
            ConnectionState::Connecting => {}
        }
    }

    fn on_update(&mut self, update: Update) {
        match self.store.apply_update(&update) {
            ApplyOutcome::Changed { previous } => {
                debug!(unit = %update.unit_id, from = %previous, to = %update.new_status, "unit updated");
                self.render_store();
            }
            ApplyOutcome::Unchanged => {}
            ApplyOutcome::UnknownUnit => {
                warn!(unit = %update.unit_id, "push update for unknown unit");
            }
        }
        self.record(LogEntry::transition(&update));
        self.request_counters();
    }

    // ----- commandes -----

    fn on_status_change(&mut self, unit: &str, status: &str) {
        match validate_status_change(&self.store, unit, status) {
            Ok((unit, status)) => {
                info!(unit = %unit, %status, "sending status change");
                let pull = self.pull.clone();
                self.pulls.spawn(async move {
                    let result = pull.set_unit_status(&unit, status).await;
                    Pulled::StatusChange { unit, status, result }
                });
            }
            Err(e) => {
                warn!(error = %e, "status change rejected");
                self.view.show_error(&e.to_string());
            }
        }
    }

    fn on_status_changed(&mut self, unit: UnitId, status: UnitStatus, result: Result<()>) {
        match result {
            Ok(()) => {
                info!(unit = %unit, %status, "status change accepted");
                self.request_counters();
                self.request_events();
            }
            Err(e @ DashboardError::Validation(_)) => {
                warn!(unit = %unit, error = %e, "status change refused by server");
                self.view.show_error(&e.to_string());
            }
            Err(e) => {
                warn!(unit = %unit, kind = e.kind(), error = %e, "status change failed");
                self.view.show_error(&e.to_string());
                self.record(LogEntry::error(format!("Status change for {unit} failed: {e}"), Utc::now()));
            }
        }
    }

    // ----- rendu -----

    fn record(&mut self, entry: LogEntry) {
        if self.log.record(entry) {
            self.render_log();
        }
    }

    fn render_log(&mut self) {
        let entries = self.log.to_vec();
        self.view.render_log(&entries);
    }

    fn render_store(&mut self) {
        self.view.render_units(self.store.units());
        self.view.render_counters(&self.store.counters());
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.status.phase != phase {
            info!(from = ?self.status.phase, to = ?phase, "session phase");
            self.status.phase = phase;
            self.view.render_status(&self.status);
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Valide une demande de changement avant tout envoi.
pub fn validate_status_change(store: &StateStore, unit: &str, status: &str) -> Result<(UnitId, UnitStatus)> {
    let unit = unit.trim();
    if unit.is_empty() {
        return Err(DashboardError::Validation("unit id must not be empty".into()));
    }
    let id = UnitId::new(unit);
    if !store.contains(&id) {
        return Err(DashboardError::Validation(format!("unknown unit {id}")));
    }
    let parsed = UnitStatus::parse(status).ok_or_else(|| {
        DashboardError::Validation(format!(
            "invalid status '{}', expected one of FREE, OCCUPIED, OUT_OF_SERVICE",
            status.trim()
        ))
    })?;
    Ok((id, parsed))
}
