/**
 * EVENT LOG - Journal d'activité borné, ordonné et dédupliqué
 *
 * FONCTIONNEMENT :
 * - Entrées triées par `occurred_at` décroissant (la plus récente en tête)
 * - Capacité fixe (50 par défaut) : la plus ancienne est évincée
 * - Push et fenêtre d'événements pull décrivent souvent la même transition :
 *   (plaza, statut, seconde) identiques → une seule entrée visible
 */

use crate::models::{UnitId, UnitStatus, Update};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogKind {
    Transition(UnitStatus),
    Connection,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub message: String,
    pub kind: LogKind,
    pub unit_id: Option<UnitId>,
    pub occurred_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn transition(update: &Update) -> Self {
        Self {
            message: update.describe(),
            kind: LogKind::Transition(update.new_status),
            unit_id: Some(update.unit_id.clone()),
            occurred_at: update.occurred_at,
        }
    }

    pub fn connection(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { message: message.into(), kind: LogKind::Connection, unit_id: None, occurred_at: at }
    }

    pub fn error(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { message: message.into(), kind: LogKind::Error, unit_id: None, occurred_at: at }
    }

    pub fn status(&self) -> Option<UnitStatus> {
        match self.kind {
            LogKind::Transition(status) => Some(status),
            _ => None,
        }
    }

    fn dedup_key(&self) -> Option<(&UnitId, UnitStatus, i64)> {
        match (&self.unit_id, self.kind) {
            (Some(id), LogKind::Transition(status)) => Some((id, status, self.occurred_at.timestamp())),
            _ => None,
        }
    }

    fn same_transition(&self, other: &LogEntry) -> bool {
        match (self.dedup_key(), other.dedup_key()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity), capacity }
    }

    /// Insère une entrée à sa place chronologique. Retourne false si c'est un
    /// doublon, ou si elle est plus ancienne que tout un journal déjà plein.
    pub fn record(&mut self, entry: LogEntry) -> bool {
        if self.entries.iter().any(|e| e.same_transition(&entry)) {
            return false;
        }
        // à horodatage égal, la dernière arrivée passe devant
        let pos = self
            .entries
            .iter()
            .position(|e| e.occurred_at <= entry.occurred_at)
            .unwrap_or(self.entries.len());
        if pos >= self.capacity {
            return false;
        }
        self.entries.insert(pos, entry);
        self.entries.truncate(self.capacity);
        true
    }

    /// Hydrate depuis une fenêtre pull, quel que soit l'ordre de la réponse.
    /// Retourne le nombre d'entrées réellement ajoutées.
    pub fn record_batch(&mut self, entries: impl IntoIterator<Item = LogEntry>) -> usize {
        let mut batch: Vec<LogEntry> = entries.into_iter().collect();
        batch.sort_by_key(|e| e.occurred_at);
        let mut added = 0;
        for entry in batch {
            if self.record(entry) {
                added += 1;
            }
        }
        added
    }

    pub fn newest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn transition(id: &str, status: UnitStatus, when: DateTime<Utc>) -> LogEntry {
        LogEntry::transition(&Update {
            unit_id: id.into(),
            new_status: status,
            occurred_at: when,
            message: None,
            source: None,
        })
    }

    #[test]
    fn test_record_keeps_newest_first() {
        let mut log = EventLog::default();
        log.record(transition("1", UnitStatus::Free, at(10)));
        log.record(transition("2", UnitStatus::Occupied, at(30)));
        log.record(transition("3", UnitStatus::Free, at(20)));

        let ids: Vec<_> = log.iter().map(|e| e.unit_id.clone().unwrap().to_string()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn test_batch_then_duplicate_push_is_ignored() {
        let mut log = EventLog::default();
        let added = log.record_batch(vec![
            transition("A3", UnitStatus::OutOfService, at(5)),
            transition("A1", UnitStatus::Occupied, at(1)),
        ]);
        assert_eq!(added, 2);

        // même transition vue par push, fraction de seconde différente
        let push = transition(
            "A3",
            UnitStatus::OutOfService,
            at(5) + Duration::milliseconds(400),
        );
        assert!(!log.record(push));
        assert_eq!(log.len(), 2);

        // une fenêtre pull qui se recoupe n'ajoute rien non plus
        assert_eq!(log.record_batch(vec![transition("A1", UnitStatus::Occupied, at(1))]), 0);
    }

    #[test]
    fn test_batch_order_independent_of_arrival() {
        let mut a = EventLog::default();
        let mut b = EventLog::default();
        let entries: Vec<_> = (0..10).map(|i| transition(&i.to_string(), UnitStatus::Free, at(i))).collect();
        a.record_batch(entries.clone());
        b.record_batch(entries.into_iter().rev());
        assert_eq!(a.to_vec(), b.to_vec());
        assert_eq!(a.newest().and_then(|e| e.unit_id.clone()), Some("9".into()));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = EventLog::default();
        for i in 0..200 {
            log.record(transition(&format!("U{i}"), UnitStatus::Occupied, at(i)));
            assert!(log.len() <= DEFAULT_CAPACITY);
        }
        assert_eq!(log.len(), DEFAULT_CAPACITY);
        assert_eq!(log.newest().map(|e| e.occurred_at), Some(at(199)));
        assert_eq!(log.iter().last().map(|e| e.occurred_at), Some(at(150)));

        // plus vieux que tout un journal plein : rejeté
        assert!(!log.record(transition("old", UnitStatus::Free, at(0))));
    }

    #[test]
    fn test_non_transition_entries_are_not_deduplicated() {
        let mut log = EventLog::with_capacity(5);
        assert!(log.record(LogEntry::connection("connected", at(1))));
        assert!(log.record(LogEntry::connection("connected", at(1))));
        assert_eq!(log.len(), 2);
        assert_eq!(log.newest().and_then(|e| e.status()), None);
    }

    #[test]
    fn test_capacity_is_at_least_one() {
        assert_eq!(EventLog::default().capacity(), DEFAULT_CAPACITY);
        let mut log = EventLog::with_capacity(0);
        assert_eq!(log.capacity(), 1);
        log.record(transition("A1", UnitStatus::Free, at(1)));
        log.record(transition("A2", UnitStatus::Free, at(2)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_zone_less_push_matches_utc_event_of_server_two_hours_ahead() {
        use crate::wire::{decode_events, decode_push_update, ServerZone};

        let zone = ServerZone::from_offset_minutes(Some(120));
        let events = decode_events(
            br#"[{"spotId": 7, "status": "OCCUPIED", "occurredAt": "2024-05-01T10:00:05.100Z"}]"#,
            zone,
        )
        .unwrap();
        let push = decode_push_update(
            br#"{"spotId": 7, "status": "OCCUPIED", "timestamp": "2024-05-01T12:00:05.300"}"#,
            zone,
        )
        .unwrap();

        let mut log = EventLog::default();
        assert_eq!(log.record_batch(events.iter().map(LogEntry::transition)), 1);
        assert!(!log.record(LogEntry::transition(&push)));
        assert_eq!(log.len(), 1);
    }
}
