/**
 * SNAPSHOT LOADER - Requêtes pull ponctuelles vers l'API REST
 *
 * RÔLE :
 * Chaque opération est indépendante et rend soit des objets du modèle
 * normalisés, soit `Transport` (réseau, statut HTTP) soit `Schema` (corps
 * illisible). Le timeout du client HTTP borne chaque appel.
 */

use crate::config::ApiConf;
use crate::error::{DashboardError, Result};
use crate::health::HealthSnapshot;
use crate::models::{HistoryPoint, ReportedCounters, ResourceUnit, UnitId, UnitStatus, Update};
use crate::wire::{self, ServerZone};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait PullSource: Send + Sync {
    async fn load_resources(&self) -> Result<Vec<ResourceUnit>>;
    async fn load_counters(&self) -> Result<ReportedCounters>;
    async fn load_event_window(&self, limit: usize) -> Result<Vec<Update>>;
    async fn load_health(&self) -> Result<HealthSnapshot>;
    async fn load_history(&self) -> Result<Vec<HistoryPoint>>;
    async fn set_unit_status(&self, unit: &UnitId, status: UnitStatus) -> Result<()>;
}

pub struct HttpSnapshotLoader {
    client: reqwest::Client,
    base_url: String,
    zone: ServerZone,
}

impl HttpSnapshotLoader {
    pub fn new(conf: &ApiConf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(conf.timeout_ms.max(1)))
            .user_agent(concat!("parking-live/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DashboardError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: conf.base_url.trim_end_matches('/').to_string(),
            zone: conf.server_zone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url(path);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DashboardError::Transport(format!("GET {url} returned {status}")));
        }
        let body = response.bytes().await?;
        debug!(%url, bytes = body.len(), "pull ok");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl PullSource for HttpSnapshotLoader {
    async fn load_resources(&self) -> Result<Vec<ResourceUnit>> {
        wire::decode_resources(&self.get_bytes("/spots").await?)
    }

    async fn load_counters(&self) -> Result<ReportedCounters> {
        wire::decode_counters(&self.get_bytes("/statistics").await?)
    }

    async fn load_event_window(&self, limit: usize) -> Result<Vec<Update>> {
        wire::decode_events(&self.get_bytes(&format!("/events?limit={limit}")).await?, self.zone)
    }

    async fn load_health(&self) -> Result<HealthSnapshot> {
        wire::decode_health(&self.get_bytes("/health").await?)
    }

    async fn load_history(&self) -> Result<Vec<HistoryPoint>> {
        wire::decode_history(&self.get_bytes("/history").await?, self.zone)
    }

    async fn set_unit_status(&self, unit: &UnitId, status: UnitStatus) -> Result<()> {
        let url = self.url(&format!("/spots/{unit}/status"));
        let response = self
            .client
            .put(&url)
            .json(&wire::StatusChangeOut { status })
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::BAD_REQUEST => Err(DashboardError::Validation(format!("server rejected status {status} for unit {unit}"))),
            StatusCode::NOT_FOUND => Err(DashboardError::Validation(format!("unit {unit} does not exist"))),
            s => Err(DashboardError::Transport(format!("PUT {url} returned {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building_trims_slash() {
        let conf = ApiConf { base_url: "http://localhost:8080/api/parking/".into(), timeout_ms: 100, ..ApiConf::default() };
        let loader = HttpSnapshotLoader::new(&conf).unwrap();
        assert_eq!(loader.url("/events?limit=30"), "http://localhost:8080/api/parking/events?limit=30");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let conf = ApiConf { base_url: "http://127.0.0.1:1/api/parking".into(), timeout_ms: 500, ..ApiConf::default() };
        let loader = HttpSnapshotLoader::new(&conf).unwrap();
        let err = loader.load_counters().await.unwrap_err();
        assert!(matches!(err, DashboardError::Transport(_)), "{err}");
    }
}
