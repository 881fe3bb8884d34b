//! Local single-file store used when no database account is involved

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::history::HistoryEntry;
use crate::models::FleetSnapshot;
use crate::store::{DataSource, HistoryLog, Listener, Subscribers};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalFile {
    #[serde(default)]
    fleet: Option<FleetSnapshot>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

/// Keeps the fleet and its history in one JSON document
pub struct JsonFileStore {
    path: PathBuf,
    subscribers: Subscribers,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            subscribers: Subscribers::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<LocalFile> {
        if !self.path.exists() {
            return Ok(LocalFile::default());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(LocalFile::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Write through a temporary file so a crash never leaves half a document
    fn write(&self, file: &LocalFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(file)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "wrote local store");
        Ok(())
    }
}

impl DataSource for JsonFileStore {
    fn load(&self) -> Result<Option<FleetSnapshot>> {
        Ok(self.read()?.fleet)
    }

    fn save(&mut self, snapshot: &FleetSnapshot) -> Result<()> {
        let mut file = self.read()?;
        file.fleet = Some(snapshot.clone());
        self.write(&file)?;
        self.subscribers.notify(snapshot);
        Ok(())
    }

    fn subscribe(&mut self, listener: Listener) {
        self.subscribers.push(listener);
    }
}

impl HistoryLog for JsonFileStore {
    fn append(&mut self, entry: &HistoryEntry) -> Result<i64> {
        let mut file = self.read()?;
        let id = file.history.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        file.history.push(HistoryEntry { id, ..entry.clone() });
        self.write(&file)?;
        Ok(id)
    }

    /// Newest first, like the database store
    fn list(&self) -> Result<Vec<HistoryEntry>> {
        let mut history = self.read()?.history;
        history.reverse();
        Ok(history)
    }

    fn get(&self, id: i64) -> Result<HistoryEntry> {
        self.read()?
            .history
            .into_iter()
            .find(|e| e.id == id)
            .ok_or(LedgerError::HistoryNotFound(id))
    }

    fn remove(&mut self, id: i64) -> Result<()> {
        let mut file = self.read()?;
        let before = file.history.len();
        file.history.retain(|e| e.id != id);
        if file.history.len() == before {
            return Err(LedgerError::HistoryNotFound(id));
        }
        self.write(&file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeneratorAction;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("fleet.json"));
        assert_eq!(store.load().unwrap(), None);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn saves_and_reloads_fleet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/fleet.json");
        let mut store = JsonFileStore::open(&path);

        let mut fleet = FleetSnapshot::first_use();
        fleet.apply(1, GeneratorAction::Rename("Unit A".into())).unwrap();
        store.save(&fleet).unwrap();

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.load().unwrap(), Some(fleet));
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"fuelRate\""));
        assert!(!dir.path().join("nested/fleet.json.tmp").exists());
    }

    #[test]
    fn reads_browser_shaped_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.json");
        fs::write(
            &path,
            r#"{"fleet": {"generators": [{"id": 5, "name": "A", "fuelRate": 3, "additionalExpenses": [{"id": 1, "name": "Oil", "value": null}]}]}}"#,
        )
        .unwrap();
        let fleet = JsonFileStore::open(&path).load().unwrap().unwrap();
        assert_eq!(fleet.generators[0].fuel_rate, 3.0);
        assert_eq!(fleet.coefficient, crate::models::DEFAULT_COEFFICIENT);
        assert_eq!(fleet.template, None);
    }

    #[test]
    fn history_is_kept_beside_the_fleet() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::open(dir.path().join("fleet.json"));
        let fleet = FleetSnapshot::first_use();
        store.save(&fleet).unwrap();

        let a = store.append(&HistoryEntry::capture(&fleet, "a")).unwrap();
        let b = store.append(&HistoryEntry::capture(&fleet, "b")).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(store.list().unwrap()[0].note, "b");

        store.remove(a).unwrap();
        assert!(matches!(store.get(a), Err(LedgerError::HistoryNotFound(1))));
        assert_eq!(store.load().unwrap(), Some(fleet));
    }
}
