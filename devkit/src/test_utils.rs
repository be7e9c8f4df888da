/*!
Test Harness pour sessions de tableau de bord

Câble une `Session` complète sur le broker simulé, la source pull scriptée
et la vue d'enregistrement, sans aucun accès réseau. Prévu pour
`#[tokio::test(start_paused = true)]` : les attentes avancent le temps
virtuel par petits pas.
*/

use crate::pull_stub::StubPullSource;
use crate::push_stub::{MockBroker, ParkingMessageBuilder};
use crate::recording_view::RecordingView;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_live::backoff::BackoffConfig;
use parking_live::{DashboardConfig, Session, SessionHandle, SessionPhase, UnitId, UnitStatus, Update};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const STEP: Duration = Duration::from_millis(10);
const WAIT_LIMIT: Duration = Duration::from_secs(3);

pub struct TestHarness {
    pub broker: MockBroker,
    pub pull: StubPullSource,
    pub view: RecordingView,
    pub handle: SessionHandle,
    topic: String,
    task: Option<JoinHandle<()>>,
}

impl TestHarness {
    /// Config par défaut, reconnexion fixe à 5 s, serveur à l'heure UTC.
    pub fn config() -> DashboardConfig {
        let mut cfg = DashboardConfig::default();
        cfg.push.reconnect = BackoffConfig::fixed(Duration::from_secs(5));
        cfg.api.server_utc_offset_minutes = Some(0);
        cfg
    }

    pub fn start(pull: StubPullSource) -> Self {
        Self::start_with(Self::config(), pull)
    }

    pub fn start_with(config: DashboardConfig, pull: StubPullSource) -> Self {
        env_logger::try_init().ok();

        let broker = MockBroker::new();
        let view = RecordingView::new();
        let topic = config.push.topic.clone();
        let session = Session::new(
            config,
            Arc::new(pull.clone()),
            Box::new(broker.transport()),
            Box::new(view.clone()),
        );
        let handle = session.handle();
        let task = tokio::spawn(session.run());
        log::info!("[HARNESS] session started");

        Self { broker, pull, view, handle, topic, task: Some(task) }
    }

    /// Attend qu'une condition devienne vraie, en temps virtuel.
    pub async fn wait_until(&self, what: &str, cond: impl Fn(&Self) -> bool) -> Result<()> {
        let mut waited = Duration::ZERO;
        while !cond(self) {
            if waited >= WAIT_LIMIT {
                anyhow::bail!("timed out waiting for {what}");
            }
            tokio::time::sleep(STEP).await;
            waited += STEP;
        }
        Ok(())
    }

    /// Session chargée et abonnée.
    pub async fn wait_live(&self) -> Result<()> {
        self.wait_until("live phase", |h| {
            h.view.phase() == SessionPhase::Live && h.broker.is_connected()
        })
        .await
    }

    /// Laisse la boucle traiter ce qui est en attente.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// Avance le temps virtuel puis laisse la boucle réagir.
    pub async fn advance(&self, by: Duration) {
        tokio::time::sleep(by).await;
        self.settle().await;
    }

    pub fn push_update(&self, spot_id: &str, status: UnitStatus, at: DateTime<Utc>) -> bool {
        let msg = ParkingMessageBuilder::push_update(spot_id, status, at);
        self.broker.publish_json(&self.topic, &msg)
    }

    /// Arrête la session et attend la fin de sa tâche.
    pub async fn stop(mut self) -> Result<()> {
        self.handle.shutdown();
        if let Some(task) = self.task.take() {
            task.await.context("session task panicked")?;
        }
        log::info!("[HARNESS] session stopped");
        Ok(())
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Update tel que le rend la fenêtre d'événements.
pub fn event(unit: &str, status: UnitStatus, at: DateTime<Utc>) -> Update {
    Update {
        unit_id: UnitId::new(unit),
        new_status: status,
        occurred_at: at,
        message: None,
        source: Some("sensor".into()),
    }
}
