//! Data source abstraction shared by the database and local-file stores

use chrono::Utc;
use tracing::info;

use crate::error::Result;
use crate::history::HistoryEntry;
use crate::models::FleetSnapshot;

pub type Listener = Box<dyn Fn(&FleetSnapshot)>;

/// Where a user's fleet lives. The calculator and renderer never see which
/// implementation is active.
pub trait DataSource {
    /// `None` until something has been saved
    fn load(&self) -> Result<Option<FleetSnapshot>>;

    fn save(&mut self, snapshot: &FleetSnapshot) -> Result<()>;

    /// Called with the new state after every successful save
    fn subscribe(&mut self, listener: Listener);

    fn load_or_default(&self) -> Result<FleetSnapshot> {
        Ok(self.load()?.unwrap_or_else(FleetSnapshot::first_use))
    }
}

/// Saved calculation snapshots
pub trait HistoryLog {
    /// Stores the entry under a fresh id and returns it
    fn append(&mut self, entry: &HistoryEntry) -> Result<i64>;
    fn list(&self) -> Result<Vec<HistoryEntry>>;
    fn get(&self, id: i64) -> Result<HistoryEntry>;
    fn remove(&mut self, id: i64) -> Result<()>;
}

pub trait Store: DataSource + HistoryLog {}

impl<T: DataSource + HistoryLog> Store for T {}

/// Listener list kept by each store
#[derive(Default)]
pub struct Subscribers {
    listeners: Vec<Listener>,
}

impl Subscribers {
    pub fn push(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub fn notify(&self, snapshot: &FleetSnapshot) {
        for listener in &self.listeners {
            listener(snapshot);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    AlreadyMigrated,
    NothingToMigrate,
    Copied { generators: usize },
    Merged { generators: usize },
}

/// One-time move of a local fleet into the database store
pub fn migrate<L, R>(local: &L, remote: &mut R) -> Result<MigrationOutcome>
where
    L: DataSource + ?Sized,
    R: DataSource + ?Sized,
{
    let existing = remote.load()?;
    if existing.as_ref().is_some_and(|s| s.migrated_at.is_some()) {
        return Ok(MigrationOutcome::AlreadyMigrated);
    }
    let Some(local_fleet) = local.load()? else {
        return Ok(MigrationOutcome::NothingToMigrate);
    };

    let (mut merged, outcome) = match existing {
        None => {
            let generators = local_fleet.generators.len();
            (local_fleet, MigrationOutcome::Copied { generators })
        }
        Some(mut remote_fleet) => {
            let generators = local_fleet.generators.len();
            for mut generator in local_fleet.generators {
                generator.id = remote_fleet.allocate_id();
                remote_fleet.generators.push(generator);
            }
            if remote_fleet.template.is_none() {
                remote_fleet.template = local_fleet.template;
            }
            (remote_fleet, MigrationOutcome::Merged { generators })
        }
    };

    merged.migrated_at = Some(Utc::now());
    remote.save(&merged)?;
    info!(?outcome, "migrated local data");
    Ok(outcome)
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;

    /// In-memory data source for tests
    #[derive(Default)]
    pub struct MemoryStore {
        pub snapshot: Option<FleetSnapshot>,
        pub subscribers: Subscribers,
    }

    impl DataSource for MemoryStore {
        fn load(&self) -> Result<Option<FleetSnapshot>> {
            Ok(self.snapshot.clone())
        }

        fn save(&mut self, snapshot: &FleetSnapshot) -> Result<()> {
            self.snapshot = Some(snapshot.clone());
            self.subscribers.notify(snapshot);
            Ok(())
        }

        fn subscribe(&mut self, listener: Listener) {
            self.subscribers.push(listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::memory::MemoryStore;
    use super::*;
    use crate::models::GeneratorRecord;

    fn local_fleet() -> FleetSnapshot {
        let mut fleet = FleetSnapshot::first_use();
        fleet.generators = vec![GeneratorRecord::new(1, "Local 1"), GeneratorRecord::new(2, "Local 2")];
        fleet.template = Some("{{gen.name}}".to_string());
        fleet
    }

    #[test]
    fn load_or_default_gives_first_use_fleet() {
        let store = MemoryStore::default();
        assert_eq!(store.load_or_default().unwrap(), FleetSnapshot::first_use());
    }

    #[test]
    fn subscribers_see_saves() {
        let seen = Rc::new(Cell::new(0usize));
        let mut store = MemoryStore::default();
        let counter = Rc::clone(&seen);
        store.subscribe(Box::new(move |s: &FleetSnapshot| counter.set(s.generators.len())));
        store.save(&local_fleet()).unwrap();
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn migration_copies_into_empty_remote_once() {
        let local = MemoryStore {
            snapshot: Some(local_fleet()),
            ..Default::default()
        };
        let mut remote = MemoryStore::default();

        let outcome = migrate(&local, &mut remote).unwrap();
        assert_eq!(outcome, MigrationOutcome::Copied { generators: 2 });
        let saved = remote.snapshot.clone().unwrap();
        assert_eq!(saved.generators[0].name, "Local 1");
        assert!(saved.migrated_at.is_some());

        assert_eq!(migrate(&local, &mut remote).unwrap(), MigrationOutcome::AlreadyMigrated);
        assert_eq!(remote.snapshot.unwrap().generators.len(), 2);
    }

    #[test]
    fn migration_merges_with_fresh_ids() {
        let local = MemoryStore {
            snapshot: Some(local_fleet()),
            ..Default::default()
        };
        let mut remote = MemoryStore {
            snapshot: Some(FleetSnapshot::first_use()),
            ..Default::default()
        };

        let outcome = migrate(&local, &mut remote).unwrap();
        assert_eq!(outcome, MigrationOutcome::Merged { generators: 2 });
        let saved = remote.snapshot.unwrap();
        let ids: Vec<i64> = saved.generators.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(saved.template.as_deref(), Some("{{gen.name}}"));
    }

    #[test]
    fn nothing_to_migrate() {
        let local = MemoryStore::default();
        let mut remote = MemoryStore::default();
        assert_eq!(migrate(&local, &mut remote).unwrap(), MigrationOutcome::NothingToMigrate);
        assert!(remote.snapshot.is_none());
    }
}
