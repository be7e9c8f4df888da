use crate::models::{AggregateCounters, ResourceUnit, UnitId, UnitStatus, Update};
use std::collections::HashMap;

/// Résultat d'un `apply_update`. Une plaza inconnue n'est jamais une erreur :
/// un push peut précéder le rechargement qui la fait apparaître.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Changed { previous: UnitStatus },
    Unchanged,
    UnknownUnit,
}

/// Vue en mémoire des plazas, dans l'ordre du dernier snapshot.
///
/// Aucun compteur n'est mis en cache : `counters()` rescane les plazas à
/// chaque appel.
#[derive(Debug, Default)]
pub struct StateStore {
    units: Vec<ResourceUnit>,
    index: HashMap<UnitId, usize>,
    loaded: bool,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remplace l'ensemble complet. En cas d'identifiant dupliqué, la
    /// dernière occurrence gagne et garde la position de la première.
    pub fn replace_snapshot(&mut self, units: Vec<ResourceUnit>) {
        self.units.clear();
        self.index.clear();
        for unit in units {
            match self.index.get(&unit.id) {
                Some(&pos) => self.units[pos] = unit,
                None => {
                    self.index.insert(unit.id.clone(), self.units.len());
                    self.units.push(unit);
                }
            }
        }
        self.loaded = true;
    }

    pub fn apply_update(&mut self, update: &Update) -> ApplyOutcome {
        let Some(&pos) = self.index.get(&update.unit_id) else {
            return ApplyOutcome::UnknownUnit;
        };
        let unit = &mut self.units[pos];
        if unit.status == update.new_status {
            return ApplyOutcome::Unchanged;
        }
        let previous = unit.status;
        unit.status = update.new_status;
        ApplyOutcome::Changed { previous }
    }

    pub fn counters(&self) -> AggregateCounters {
        AggregateCounters::from_units(&self.units)
    }

    pub fn units(&self) -> &[ResourceUnit] {
        &self.units
    }

    pub fn get(&self, id: &UnitId) -> Option<&ResourceUnit> {
        self.index.get(id).map(|&pos| &self.units[pos])
    }

    pub fn contains(&self, id: &UnitId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Vrai dès qu'un snapshot complet a été appliqué, même vide.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn unit(id: &str, status: UnitStatus) -> ResourceUnit {
        ResourceUnit { id: id.into(), status }
    }

    fn update(id: &str, status: UnitStatus) -> Update {
        Update {
            unit_id: id.into(),
            new_status: status,
            occurred_at: Utc::now(),
            message: None,
            source: None,
        }
    }

    #[test]
    fn test_apply_update_outcomes() {
        let mut store = StateStore::new();
        assert!(!store.is_loaded());
        store.replace_snapshot(vec![unit("A1", UnitStatus::Free), unit("A2", UnitStatus::Occupied)]);

        assert_eq!(
            store.apply_update(&update("A1", UnitStatus::Occupied)),
            ApplyOutcome::Changed { previous: UnitStatus::Free }
        );
        assert_eq!(store.apply_update(&update("A1", UnitStatus::Occupied)), ApplyOutcome::Unchanged);
        assert_eq!(store.apply_update(&update("Z9", UnitStatus::Free)), ApplyOutcome::UnknownUnit);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&"A1".into()).map(|u| u.status), Some(UnitStatus::Occupied));
    }

    #[test]
    fn test_counters_never_drift() {
        let mut store = StateStore::new();
        store.replace_snapshot((0..20).map(|i| unit(&format!("U{i}"), UnitStatus::Free)).collect());

        let statuses = UnitStatus::ALL;
        for step in 0..500usize {
            let id = format!("U{}", (step * 7) % 23);
            store.apply_update(&update(&id, statuses[(step * 5) % 3]));
            assert_eq!(store.counters(), AggregateCounters::from_units(store.units()));
            assert!(store.counters().is_consistent());
            assert_eq!(store.counters().total, 20);
        }
    }

    #[test]
    fn test_replace_snapshot_changes_unit_set() {
        let mut store = StateStore::new();
        store.replace_snapshot(vec![unit("1", UnitStatus::Free), unit("2", UnitStatus::Free)]);
        store.replace_snapshot(vec![
            unit("2", UnitStatus::Occupied),
            unit("3", UnitStatus::OutOfService),
            unit("2", UnitStatus::Free),
        ]);

        assert!(!store.contains(&"1".into()));
        assert_eq!(store.len(), 2);
        assert_eq!(store.units()[0], unit("2", UnitStatus::Free));
        assert_eq!(
            store.counters(),
            AggregateCounters { total: 2, free: 1, occupied: 0, out_of_service: 1 }
        );
    }
}
