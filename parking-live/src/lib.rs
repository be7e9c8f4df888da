/**
 * PARKING LIVE - Moteur de réconciliation d'un tableau de bord d'occupation
 *
 * RÔLE : Garde une vue locale (plazas, compteurs, journal, historique)
 * cohérente avec un serveur qui publie par push (MQTT) et répond en pull (REST).
 *
 * ARCHITECTURE : une `Session` par tableau de bord, pilotée par une seule
 * tâche tokio ; transports derrière les traits `PullSource` et `PushTransport`,
 * présentation derrière `DashboardView`.
 */

pub mod backoff;
pub mod config;
pub mod error;
pub mod event_log;
pub mod health;
pub mod history;
pub mod loader;
pub mod models;
pub mod mqtt;
pub mod push;
pub mod session;
pub mod store;
pub mod view;
pub mod wire;

pub use config::{load_config, load_config_from, DashboardConfig};
pub use error::{DashboardError, Result};
pub use loader::{HttpSnapshotLoader, PullSource};
pub use models::{AggregateCounters, ConnectionState, ResourceUnit, UnitId, UnitStatus, Update};
pub use mqtt::MqttTransport;
pub use push::{PushChannelManager, PushEvent, PushTransport};
pub use session::{Session, SessionHandle};
pub use view::{DashboardView, LogView, SessionPhase, SessionStatus};
