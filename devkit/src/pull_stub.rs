/*!
Source pull scriptée

Remplace l'API REST : les réponses sont modifiables pendant le test et
chaque appel est compté par endpoint pour les assertions.
*/

use async_trait::async_trait;
use parking_live::health::HealthSnapshot;
use parking_live::models::{HistoryPoint, ReportedCounters};
use parking_live::{AggregateCounters, DashboardError, PullSource, ResourceUnit, Result, UnitId, UnitStatus, Update};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Resources,
    Counters,
    Events,
    Health,
    History,
    StatusChange,
}

#[derive(Debug, Clone, Default)]
pub enum PutReply {
    #[default]
    Accept,
    /// 400/404 côté serveur
    Reject(String),
}

#[derive(Default)]
struct Script {
    units: Vec<ResourceUnit>,
    counters: Option<AggregateCounters>,
    facility: Option<String>,
    events: Vec<Update>,
    health: HealthSnapshot,
    history: Vec<HistoryPoint>,
    put_reply: PutReply,
    resources_delay: Option<Duration>,
    offline: HashSet<Endpoint>,
    calls: HashMap<Endpoint, usize>,
    puts: Vec<(UnitId, UnitStatus)>,
}

#[derive(Clone, Default)]
pub struct StubPullSource {
    script: Arc<Mutex<Script>>,
}

impl StubPullSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_units(units: &[(&str, UnitStatus)]) -> Self {
        let stub = Self::new();
        stub.set_units(units);
        stub
    }

    pub fn set_units(&self, units: &[(&str, UnitStatus)]) {
        self.script.lock().units = units
            .iter()
            .map(|(id, status)| ResourceUnit { id: UnitId::new(*id), status: *status })
            .collect();
    }

    /// Compteurs imposés ; `None` = calculés depuis les plazas du stub.
    pub fn set_counters(&self, counters: Option<AggregateCounters>) {
        self.script.lock().counters = counters;
    }

    pub fn set_facility(&self, name: &str) {
        self.script.lock().facility = Some(name.to_string());
    }

    pub fn set_events(&self, events: Vec<Update>) {
        self.script.lock().events = events;
    }

    pub fn set_health(&self, health: HealthSnapshot) {
        self.script.lock().health = health;
    }

    pub fn set_history(&self, history: Vec<HistoryPoint>) {
        self.script.lock().history = history;
    }

    pub fn set_put_reply(&self, reply: PutReply) {
        self.script.lock().put_reply = reply;
    }

    pub fn set_resources_delay(&self, delay: Option<Duration>) {
        self.script.lock().resources_delay = delay;
    }

    pub fn set_offline(&self, endpoint: Endpoint, offline: bool) {
        let mut script = self.script.lock();
        if offline {
            script.offline.insert(endpoint);
        } else {
            script.offline.remove(&endpoint);
        }
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.script.lock().calls.get(&endpoint).copied().unwrap_or(0)
    }

    pub fn puts(&self) -> Vec<(UnitId, UnitStatus)> {
        self.script.lock().puts.clone()
    }

    /// Compte l'appel et échoue si l'endpoint est hors ligne.
    fn hit(&self, endpoint: Endpoint) -> Result<()> {
        let mut script = self.script.lock();
        *script.calls.entry(endpoint).or_default() += 1;
        if script.offline.contains(&endpoint) {
            return Err(DashboardError::Transport(format!("stub: {endpoint:?} offline")));
        }
        Ok(())
    }
}

#[async_trait]
impl PullSource for StubPullSource {
    async fn load_resources(&self) -> Result<Vec<ResourceUnit>> {
        self.hit(Endpoint::Resources)?;
        let delay = self.script.lock().resources_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.script.lock().units.clone())
    }

    async fn load_counters(&self) -> Result<ReportedCounters> {
        self.hit(Endpoint::Counters)?;
        let script = self.script.lock();
        let counters = script.counters.unwrap_or_else(|| AggregateCounters::from_units(&script.units));
        Ok(ReportedCounters { facility: script.facility.clone(), counters })
    }

    async fn load_event_window(&self, limit: usize) -> Result<Vec<Update>> {
        self.hit(Endpoint::Events)?;
        Ok(self.script.lock().events.iter().take(limit).cloned().collect())
    }

    async fn load_health(&self) -> Result<HealthSnapshot> {
        self.hit(Endpoint::Health)?;
        Ok(self.script.lock().health.clone())
    }

    async fn load_history(&self) -> Result<Vec<HistoryPoint>> {
        self.hit(Endpoint::History)?;
        Ok(self.script.lock().history.clone())
    }

    async fn set_unit_status(&self, unit: &UnitId, status: UnitStatus) -> Result<()> {
        self.hit(Endpoint::StatusChange)?;
        let mut script = self.script.lock();
        script.puts.push((unit.clone(), status));
        match script.put_reply.clone() {
            PutReply::Accept => {
                if let Some(u) = script.units.iter_mut().find(|u| &u.id == unit) {
                    u.status = status;
                }
                Ok(())
            }
            PutReply::Reject(reason) => Err(DashboardError::Validation(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counters_follow_units_unless_forced() {
        let stub = StubPullSource::with_units(&[("A1", UnitStatus::Free), ("A2", UnitStatus::Occupied)]);
        let reported = stub.load_counters().await.unwrap();
        assert_eq!(reported.counters.total, 2);

        stub.set_counters(Some(AggregateCounters { total: 12, free: 12, occupied: 0, out_of_service: 0 }));
        assert_eq!(stub.load_counters().await.unwrap().counters.total, 12);
        assert_eq!(stub.calls(Endpoint::Counters), 2);
    }

    #[tokio::test]
    async fn test_offline_endpoint_is_transport_error() {
        let stub = StubPullSource::new();
        stub.set_offline(Endpoint::Resources, true);
        assert!(matches!(stub.load_resources().await, Err(DashboardError::Transport(_))));
        assert_eq!(stub.calls(Endpoint::Resources), 1);
    }

    #[tokio::test]
    async fn test_accepted_put_changes_server_side_state() {
        let stub = StubPullSource::with_units(&[("A1", UnitStatus::Free)]);
        stub.set_unit_status(&UnitId::new("A1"), UnitStatus::Occupied).await.unwrap();
        assert_eq!(stub.load_resources().await.unwrap()[0].status, UnitStatus::Occupied);

        stub.set_put_reply(PutReply::Reject("bad status".into()));
        let err = stub.set_unit_status(&UnitId::new("A1"), UnitStatus::Free).await.unwrap_err();
        assert!(matches!(err, DashboardError::Validation(_)));
        assert_eq!(stub.puts().len(), 2);
    }
}
