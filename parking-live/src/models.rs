/**
 * DOMAIN MODEL - Types partagés par tout le moteur de réconciliation
 *
 * RÔLE :
 * Plazas (ResourceUnit), compteurs agrégés, mises à jour push, points
 * d'historique, état de connexion et snapshot de santé.
 *
 * INVARIANTS :
 * - UnitStatus est un variant fermé : un statut inconnu ne peut pas exister
 *   dans le modèle, il est rejeté au décodage (SchemaError).
 * - AggregateCounters : total = free + occupied + out_of_service.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifiant stable d'une plaza. Le serveur l'envoie en nombre, mais on le
/// traite comme une clé opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for UnitId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Ok(UnitId(n.to_string())),
            RawId::Text(s) if s.trim().is_empty() => {
                Err(serde::de::Error::custom("empty unit id"))
            }
            RawId::Text(s) => Ok(UnitId(s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Free,
    Occupied,
    OutOfService,
}

impl UnitStatus {
    pub const ALL: [UnitStatus; 3] = [UnitStatus::Free, UnitStatus::Occupied, UnitStatus::OutOfService];

    /// Nom sur le fil (`FREE`, `OCCUPIED`, `OUT_OF_SERVICE`).
    pub fn as_wire(&self) -> &'static str {
        match self {
            UnitStatus::Free => "FREE",
            UnitStatus::Occupied => "OCCUPIED",
            UnitStatus::OutOfService => "OUT_OF_SERVICE",
        }
    }

    /// Parse tolérant à la casse et aux espaces, utilisé pour les requêtes
    /// venant de l'UI.
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|s| s.as_wire() == wanted)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUnit {
    pub id: UnitId,
    pub status: UnitStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateCounters {
    pub total: u32,
    pub free: u32,
    pub occupied: u32,
    pub out_of_service: u32,
}

impl AggregateCounters {
    pub fn from_units<'a>(units: impl IntoIterator<Item = &'a ResourceUnit>) -> Self {
        let mut counters = Self::default();
        for unit in units {
            counters.total += 1;
            match unit.status {
                UnitStatus::Free => counters.free += 1,
                UnitStatus::Occupied => counters.occupied += 1,
                UnitStatus::OutOfService => counters.out_of_service += 1,
            }
        }
        counters
    }

    pub fn is_consistent(&self) -> bool {
        self.free as u64 + self.occupied as u64 + self.out_of_service as u64 == self.total as u64
    }
}

/// Compteurs tels que rapportés par `/statistics`, avec le nom du parking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedCounters {
    pub facility: Option<String>,
    pub counters: AggregateCounters,
}

/// Transition d'une plaza, reçue par push ou par la fenêtre d'événements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub unit_id: UnitId,
    pub new_status: UnitStatus,
    pub occurred_at: DateTime<Utc>,
    pub message: Option<String>,
    pub source: Option<String>,
}

impl Update {
    pub fn describe(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("Unit {} -> {}", self.unit_id, self.new_status))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub occupied: u32,
    pub free: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Connected => write!(f, "CONNECTED"),
        }
    }
}
