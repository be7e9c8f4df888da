//! Projection de l'historique pour les graphiques.
//!
//! L'entrée (points rares, irréguliers) n'est jamais modifiée ; on en dérive
//! une série d'affichage :
//! - un seul point → un point synthétique 10 minutes avant, mêmes valeurs
//! - dernier point plus vieux que 60 s → un point synthétique à "maintenant"
//! - entrée vide → sortie vide

use crate::models::HistoryPoint;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub const SINGLE_POINT_LEAD: Duration = Duration::minutes(10);
pub const STALE_AFTER: Duration = Duration::seconds(60);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectedHistory {
    pub points: Vec<HistoryPoint>,
}

impl ProjectedHistory {
    pub fn occupied_series(&self) -> Vec<(DateTime<Utc>, u32)> {
        self.points.iter().map(|p| (p.timestamp, p.occupied)).collect()
    }

    pub fn free_series(&self) -> Vec<(DateTime<Utc>, u32)> {
        self.points.iter().map(|p| (p.timestamp, p.free)).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub fn project(points: &[HistoryPoint], now: DateTime<Utc>) -> ProjectedHistory {
    let mut series = points.to_vec();
    series.sort_by_key(|p| p.timestamp);

    if let [only] = series.as_slice() {
        let lead = HistoryPoint { timestamp: only.timestamp - SINGLE_POINT_LEAD, ..*only };
        series.insert(0, lead);
    }

    if let Some(last) = series.last().copied() {
        if now - last.timestamp > STALE_AFTER {
            series.push(HistoryPoint { timestamp: now, ..last });
        }
    }

    ProjectedHistory { points: series }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn point(ts: DateTime<Utc>, occupied: u32, free: u32) -> HistoryPoint {
        HistoryPoint { timestamp: ts, occupied, free }
    }

    #[test]
    fn test_empty_stays_empty() {
        assert!(project(&[], now()).is_empty());
    }

    #[test]
    fn test_single_recent_point_gets_lead() {
        let t0 = now() - Duration::seconds(10);
        let projected = project(&[point(t0, 4, 6)], now());
        assert_eq!(projected.points, vec![point(t0 - Duration::milliseconds(600_000), 4, 6), point(t0, 4, 6)]);
    }

    #[test]
    fn test_stale_series_extends_to_now() {
        let input = vec![
            point(now() - Duration::minutes(5), 1, 9),
            point(now() - Duration::milliseconds(120_000), 3, 7),
        ];
        let projected = project(&input, now());
        assert_eq!(projected.len(), 3);
        assert_eq!(projected.points[2], point(now(), 3, 7));
        assert_eq!(projected.occupied_series().last(), Some(&(now(), 3)));
        assert_eq!(projected.free_series().last(), Some(&(now(), 7)));
        // l'entrée n'a pas bougé
        assert_eq!(input.len(), 2);
    }

    #[test]
    fn test_fresh_series_is_not_extended() {
        let input = vec![
            point(now() - Duration::seconds(90), 1, 9),
            point(now() - Duration::seconds(60), 2, 8),
        ];
        assert_eq!(project(&input, now()).points, input);
    }

    #[test]
    fn test_single_stale_point_gets_both() {
        let t0 = now() - Duration::hours(1);
        let projected = project(&[point(t0, 2, 3)], now());
        let stamps: Vec<_> = projected.points.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![t0 - SINGLE_POINT_LEAD, t0, now()]);
    }

    #[test]
    fn test_server_local_history_is_projected_against_utc_now() {
        use crate::wire::{decode_history, ServerZone};

        let body = br#"[
            {"timestamp": "2024-05-01T11:55:00", "occupied": 2, "free": 8},
            {"timestamp": "2024-05-01T12:00:00", "occupied": 3, "free": 7}
        ]"#;
        let points = decode_history(body, ServerZone::from_offset_minutes(Some(120))).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap();

        let projected = project(&points, now);
        assert_eq!(projected.len(), 3);
        assert_eq!(projected.points[1].timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        assert_eq!(projected.points[2], point(now, 3, 7));
    }
}
