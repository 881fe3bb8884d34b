//! Saved calculation snapshots and bulk import of exported ones

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::calculator::{FleetSummary, format_amount, format_breakdown};
use crate::error::Result;
use crate::models::{DEFAULT_COEFFICIENT, FleetSnapshot, GeneratorRecord};
use crate::store::HistoryLog;

fn default_coefficient() -> f64 {
    DEFAULT_COEFFICIENT
}

/// The fleet frozen at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(default)]
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub generators: Vec<GeneratorRecord>,
    #[serde(default = "default_coefficient")]
    pub kg_coefficient: f64,
}

impl HistoryEntry {
    pub fn capture(fleet: &FleetSnapshot, note: impl Into<String>) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            note: note.into(),
            generators: fleet.generators.clone(),
            kg_coefficient: fleet.coefficient,
        }
    }

    /// One line for listings
    pub fn summary_line(&self) -> String {
        let summary = FleetSummary::new(&self.generators, self.kg_coefficient);
        format!(
            "#{:<4} {}  {:>3} generators  remaining {:>10} L  {}",
            self.id,
            self.timestamp.format("%Y-%m-%d %H:%M"),
            summary.aggregate.generators,
            format_amount(summary.aggregate.totals.remaining),
            self.note
        )
    }

    /// Detailed report using the coefficient that was current at save time
    pub fn report(&self) -> String {
        let mut output = format!(
            "Saved {} {}\n\n",
            self.timestamp.format("%Y-%m-%d %H:%M UTC"),
            self.note
        );
        for generator in &self.generators {
            output.push_str(&format_breakdown(generator, self.kg_coefficient, 0));
            output.push('\n');
        }
        output.push_str(&FleetSummary::new(&self.generators, self.kg_coefficient).to_string());
        output
    }
}

/// Export files hold either one entry or a list of them
#[derive(Deserialize)]
#[serde(untagged)]
enum ExportFile {
    One(HistoryEntry),
    Many(Vec<HistoryEntry>),
}

/// Find all `*.json` files below a directory
pub fn find_export_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

fn parse_export_file(path: &Path) -> Result<Vec<HistoryEntry>> {
    let content = fs::read_to_string(path)?;
    Ok(match serde_json::from_str(&content)? {
        ExportFile::One(entry) => vec![entry],
        ExportFile::Many(entries) => entries,
    })
}

/// Append every entry found under `dir` to the log
pub fn import_dir<L: HistoryLog + ?Sized>(log: &mut L, dir: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    for path in find_export_files(dir) {
        match parse_export_file(&path) {
            Ok(entries) => {
                for entry in &entries {
                    log.append(entry)?;
                }
                debug!(path = %path.display(), count = entries.len(), "imported history file");
                stats.files += 1;
                stats.entries += entries.len();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable history file");
                stats.skipped += 1;
            }
        }
    }

    Ok(stats)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub files: usize,
    pub entries: usize,
    pub skipped: usize,
}

impl fmt::Display for ImportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Imported {} entries from {} files. Skipped: {}",
            self.entries, self.files, self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;

    #[derive(Default)]
    struct VecLog(Vec<HistoryEntry>);

    impl HistoryLog for VecLog {
        fn append(&mut self, entry: &HistoryEntry) -> Result<i64> {
            let id = self.0.len() as i64 + 1;
            self.0.push(HistoryEntry { id, ..entry.clone() });
            Ok(id)
        }

        fn list(&self) -> Result<Vec<HistoryEntry>> {
            Ok(self.0.clone())
        }

        fn get(&self, id: i64) -> Result<HistoryEntry> {
            self.0
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or(LedgerError::HistoryNotFound(id))
        }

        fn remove(&mut self, id: i64) -> Result<()> {
            self.0.retain(|e| e.id != id);
            Ok(())
        }
    }

    fn sample_fleet() -> FleetSnapshot {
        let mut fleet = FleetSnapshot::first_use();
        fleet.generators[0].initial_fuel = 40.0;
        fleet.generators[0].fuel_rate = 10.0;
        fleet.generators[0].scheduled_hours = 5.0;
        fleet
    }

    #[test]
    fn capture_freezes_fleet_and_coefficient() {
        let entry = HistoryEntry::capture(&sample_fleet(), "end of shift");
        assert_eq!(entry.generators.len(), 3);
        assert_eq!(entry.kg_coefficient, DEFAULT_COEFFICIENT);
        assert!(entry.summary_line().contains("remaining     -10.00 L  end of shift"));
        assert!(entry.report().contains("short by 10.00 L"));
    }

    #[test]
    fn parses_browser_style_export() {
        let json = r#"{"id": 1712000000000, "timestamp": "2024-04-01T10:00:00Z", "note": "April",
            "generators": [{"id": 1, "name": "A", "fuelRate": 2, "initialFuel": 10}], "kgCoefficient": 0.84}"#;
        let entry: HistoryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.generators[0].fuel_rate, 2.0);
        assert_eq!(entry.kg_coefficient, 0.84);
    }

    #[test]
    fn imports_directory_and_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let entry = HistoryEntry::capture(&sample_fleet(), "one");
        let many = vec![
            HistoryEntry::capture(&sample_fleet(), "two"),
            HistoryEntry::capture(&sample_fleet(), "three"),
        ];
        fs::write(dir.path().join("a.json"), serde_json::to_string(&entry).unwrap()).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/b.json"), serde_json::to_string(&many).unwrap()).unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut log = VecLog::default();
        let stats = import_dir(&mut log, dir.path()).unwrap();
        assert_eq!(stats, ImportStats { files: 2, entries: 3, skipped: 1 });
        let notes: Vec<String> = log.list().unwrap().into_iter().map(|e| e.note).collect();
        assert_eq!(notes, vec!["one", "two", "three"]);
    }
}
