/**
 * WIRE FORMATS - Formes JSON du serveur et normalisation vers le modèle
 *
 * RÔLE :
 * Toutes les réponses pull et les messages push passent par ici avant
 * d'entrer dans le moteur. Un document qui ne décode pas devient une
 * `DashboardError::Schema` ; rien de partiel n'est retourné.
 *
 * HORODATAGES :
 * Le serveur mélange RFC 3339 (`...Z`) et des date-heures locales sans zone
 * (`2024-05-01T10:00:00.123`). Une date-heure sans zone est l'heure locale du
 * serveur : elle est résolue avec `ServerZone` (fuseau local par défaut, ou
 * décalage fixe configuré).
 */

use crate::error::{DashboardError, Result};
use crate::health::{HealthSnapshot, HealthStatus};
use crate::models::{AggregateCounters, HistoryPoint, ReportedCounters, ResourceUnit, UnitId, UnitStatus, Update};
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Fuseau dans lequel le serveur écrit ses horodatages sans zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerZone {
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl ServerZone {
    /// `None` ou décalage hors bornes → fuseau local.
    pub fn from_offset_minutes(minutes: Option<i32>) -> Self {
        let Some(minutes) = minutes else {
            return ServerZone::Local;
        };
        match minutes.checked_mul(60).and_then(FixedOffset::east_opt) {
            Some(offset) => ServerZone::Fixed(offset),
            None => {
                warn!(minutes, "invalid server UTC offset, using local zone");
                ServerZone::Local
            }
        }
    }

    fn resolve(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        let resolved = match self {
            ServerZone::Fixed(offset) => offset.from_local_datetime(&naive).earliest().map(|t| t.with_timezone(&Utc)),
            ServerZone::Local => Local.from_local_datetime(&naive).earliest().map(|t| t.with_timezone(&Utc)),
        };
        // heure inexistante (passage à l'heure d'été) : lue comme UTC
        resolved.unwrap_or_else(|| naive.and_utc())
    }
}

pub fn parse_timestamp(raw: &str, zone: ServerZone) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| zone.resolve(naive))
}

fn timestamp(raw: &str, zone: ServerZone) -> Result<DateTime<Utc>> {
    parse_timestamp(raw, zone).ok_or_else(|| DashboardError::Schema(format!("invalid timestamp: {raw}")))
}

#[derive(Debug, Deserialize)]
struct SpotIn {
    id: UnitId,
    status: UnitStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatisticsIn {
    name: Option<String>,
    total: u32,
    free: u32,
    occupied: u32,
    out_of_service: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventIn {
    spot_id: UnitId,
    status: UnitStatus,
    occurred_at: String,
    message: Option<String>,
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthIn {
    status: Option<String>,
    feed_age_ms: Option<i64>,
    last_feed_at: Option<String>,
    message: Option<String>,
    recent_events: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct HistoryIn {
    timestamp: String,
    occupied: u32,
    free: u32,
}

/// Message du topic push : `{spotId, status, timestamp}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushUpdateIn {
    spot_id: UnitId,
    status: UnitStatus,
    timestamp: String,
}

/// Corps du PUT `/spots/{id}/status`.
#[derive(Debug, Serialize)]
pub struct StatusChangeOut {
    pub status: UnitStatus,
}

pub fn decode_resources(body: &[u8]) -> Result<Vec<ResourceUnit>> {
    let spots: Vec<SpotIn> = serde_json::from_slice(body)?;
    Ok(spots
        .into_iter()
        .map(|s| ResourceUnit { id: s.id, status: s.status })
        .collect())
}

pub fn decode_counters(body: &[u8]) -> Result<ReportedCounters> {
    let stats: StatisticsIn = serde_json::from_slice(body)?;
    let counters = AggregateCounters {
        total: stats.total,
        free: stats.free,
        occupied: stats.occupied,
        out_of_service: stats.out_of_service,
    };
    if !counters.is_consistent() {
        return Err(DashboardError::Schema(format!(
            "statistics do not add up: total={} free={} occupied={} outOfService={}",
            counters.total, counters.free, counters.occupied, counters.out_of_service
        )));
    }
    Ok(ReportedCounters { facility: stats.name, counters })
}

pub fn decode_events(body: &[u8], zone: ServerZone) -> Result<Vec<Update>> {
    let events: Vec<EventIn> = serde_json::from_slice(body)?;
    events
        .into_iter()
        .map(|e| {
            Ok(Update {
                unit_id: e.spot_id,
                new_status: e.status,
                occurred_at: timestamp(&e.occurred_at, zone)?,
                message: e.message.filter(|m| !m.trim().is_empty()),
                source: e.source,
            })
        })
        .collect()
}

pub fn decode_health(body: &[u8]) -> Result<HealthSnapshot> {
    let health: HealthIn = serde_json::from_slice(body)?;
    Ok(HealthSnapshot {
        status: health
            .status
            .as_deref()
            .map(HealthStatus::parse)
            .unwrap_or_default(),
        feed_age_ms: health.feed_age_ms,
        last_feed_at: health.last_feed_at,
        message: health.message,
        recent_events: health.recent_events,
    })
}

pub fn decode_history(body: &[u8], zone: ServerZone) -> Result<Vec<HistoryPoint>> {
    let points: Vec<HistoryIn> = serde_json::from_slice(body)?;
    points
        .into_iter()
        .map(|p| {
            Ok(HistoryPoint { timestamp: timestamp(&p.timestamp, zone)?, occupied: p.occupied, free: p.free })
        })
        .collect()
}

pub fn decode_push_update(payload: &[u8], zone: ServerZone) -> Result<Update> {
    let update: PushUpdateIn = serde_json::from_slice(payload)?;
    Ok(Update {
        unit_id: update.spot_id,
        new_status: update.status,
        occurred_at: timestamp(&update.timestamp, zone)?,
        message: None,
        source: Some("push".to_string()),
    })
}
