use crate::backoff::BackoffConfig;
use crate::event_log::DEFAULT_CAPACITY;
use crate::wire::ServerZone;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tokio::fs;
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "PARKING_LIVE_CONFIG";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub api: ApiConf,
    pub push: PushConf,
    pub polling: PollingConf,
    pub log_capacity: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api: ApiConf::default(),
            push: PushConf::default(),
            polling: PollingConf::default(),
            log_capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConf {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Décalage UTC du serveur en minutes pour les horodatages sans zone ; absent = fuseau local.
    pub server_utc_offset_minutes: Option<i32>,
}

impl Default for ApiConf {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/parking".into(),
            timeout_ms: 10_000,
            server_utc_offset_minutes: None,
        }
    }
}

impl ApiConf {
    pub fn server_zone(&self) -> ServerZone {
        ServerZone::from_offset_minutes(self.server_utc_offset_minutes)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PushConf {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub reconnect: BackoffConfig,
}

impl Default for PushConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            topic: "/topic/parking-updates".into(),
            client_id: None,
            keep_alive_secs: 15,
            reconnect: BackoffConfig::default(),
        }
    }
}

impl PushConf {
    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("parking-live-{}", uuid::Uuid::new_v4()))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConf {
    pub health_secs: u64,
    pub events_secs: u64,
    pub history_secs: u64,
    pub event_window_limit: usize,
}

impl Default for PollingConf {
    fn default() -> Self {
        Self { health_secs: 30, events_secs: 20, history_secs: 60, event_window_limit: 30 }
    }
}

impl PollingConf {
    pub fn health_every(&self) -> Duration {
        Duration::from_secs(self.health_secs.max(1))
    }

    pub fn events_every(&self) -> Duration {
        Duration::from_secs(self.events_secs.max(1))
    }

    pub fn history_every(&self) -> Duration {
        Duration::from_secs(self.history_secs.max(1))
    }
}

pub async fn load_config() -> DashboardConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "dashboard.yaml".into());
    let mut cfg = load_config_from(&path).await;
    apply_env_overrides(&mut cfg);
    cfg
}

pub async fn load_config_from(path: impl AsRef<Path>) -> DashboardConfig {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "no dashboard config, using defaults");
        return DashboardConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return DashboardConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "invalid dashboard config, using defaults");
        DashboardConfig::default()
    })
}

fn apply_env_overrides(cfg: &mut DashboardConfig) {
    if let Ok(url) = std::env::var("PARKING_LIVE_API_URL") {
        cfg.api.base_url = url;
    }
    if let Ok(host) = std::env::var("PARKING_LIVE_MQTT_HOST") {
        cfg.push.host = host;
    }
    if let Ok(port) = std::env::var("PARKING_LIVE_MQTT_PORT") {
        match port.parse() {
            Ok(port) => cfg.push.port = port,
            Err(_) => warn!(%port, "ignoring invalid PARKING_LIVE_MQTT_PORT"),
        }
    }
}
