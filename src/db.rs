//! Database schema and operations

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::history::HistoryEntry;
use crate::models::{AdditionalExpense, DEFAULT_COEFFICIENT, FleetSnapshot, GeneratorRecord};
use crate::store::{DataSource, HistoryLog, Listener, Subscribers};

const KEY_COEFFICIENT: &str = "kg_coefficient";
const KEY_TEMPLATE: &str = "report_template";
const KEY_NEXT_GENERATOR_ID: &str = "next_generator_id";
const KEY_MIGRATED_AT: &str = "migrated_at";

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per tracked generator; position keeps the user's ordering
        CREATE TABLE IF NOT EXISTS generators (
            id INTEGER PRIMARY KEY,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            fuel_rate REAL,
            initial_fuel REAL,
            scheduled_hours REAL,
            readiness_hours REAL,
            relocation REAL,
            maintenance REAL,
            component_replacement REAL
        );

        -- Named extra costs in liters
        CREATE TABLE IF NOT EXISTS additional_expenses (
            generator_id INTEGER NOT NULL,
            id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            value REAL,
            PRIMARY KEY (generator_id, id)
        );

        -- Coefficient, template and bookkeeping values
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            note TEXT NOT NULL,
            kg_coefficient REAL NOT NULL,
            generators_json TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_expenses_generator ON additional_expenses(generator_id);
        "#,
    )?;
    Ok(())
}

fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
        .optional()?)
}

fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        (key, value),
    )?;
    Ok(())
}

fn delete_setting(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
    Ok(())
}

/// Insert a generator with its expenses
pub fn insert_generator(conn: &Connection, generator: &GeneratorRecord, position: usize) -> Result<()> {
    conn.execute(
        "INSERT INTO generators (id, position, name, fuel_rate, initial_fuel, scheduled_hours,
            readiness_hours, relocation, maintenance, component_replacement)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            generator.id,
            position as i64,
            generator.name,
            generator.fuel_rate,
            generator.initial_fuel,
            generator.scheduled_hours,
            generator.readiness_hours,
            generator.relocation,
            generator.maintenance,
            generator.component_replacement,
        ],
    )?;
    for (position, expense) in generator.additional_expenses.iter().enumerate() {
        conn.execute(
            "INSERT INTO additional_expenses (generator_id, id, position, name, value)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![generator.id, expense.id, position as i64, expense.name, expense.value],
        )?;
    }
    Ok(())
}

/// Get the expenses of one generator in display order
pub fn get_expenses(conn: &Connection, generator_id: i64) -> Result<Vec<AdditionalExpense>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, value FROM additional_expenses
         WHERE generator_id = ?1
         ORDER BY position",
    )?;

    let rows = stmt.query_map([generator_id], |row| {
        Ok(AdditionalExpense {
            id: row.get(0)?,
            name: row.get(1)?,
            value: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// List all generators in display order
pub fn list_generators(conn: &Connection) -> Result<Vec<GeneratorRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, fuel_rate, initial_fuel, scheduled_hours, readiness_hours,
                relocation, maintenance, component_replacement
         FROM generators ORDER BY position",
    )?;

    // Older rows may hold NULL for figures that were never entered
    let rows = stmt.query_map([], |row| {
        let number = |i: usize| -> rusqlite::Result<f64> { Ok(row.get::<_, Option<f64>>(i)?.unwrap_or(0.0)) };
        Ok(GeneratorRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            fuel_rate: number(2)?,
            initial_fuel: number(3)?,
            scheduled_hours: number(4)?,
            readiness_hours: number(5)?,
            relocation: number(6)?,
            maintenance: number(7)?,
            component_replacement: number(8)?,
            additional_expenses: Vec::new(),
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        let mut generator = row?;
        generator.additional_expenses = get_expenses(conn, generator.id)?;
        results.push(generator);
    }
    Ok(results)
}

/// Read the whole fleet; `None` if nothing has ever been saved
pub fn load_fleet(conn: &Connection) -> Result<Option<FleetSnapshot>> {
    let coefficient = get_setting(conn, KEY_COEFFICIENT)?;
    let generators = list_generators(conn)?;
    if coefficient.is_none() && generators.is_empty() {
        return Ok(None);
    }

    let coefficient = coefficient
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(DEFAULT_COEFFICIENT);
    let next_generator_id = get_setting(conn, KEY_NEXT_GENERATOR_ID)?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let migrated_at = get_setting(conn, KEY_MIGRATED_AT)?
        .map(|v| DateTime::parse_from_rfc3339(&v))
        .transpose()?
        .map(|t| t.with_timezone(&Utc));

    Ok(Some(FleetSnapshot {
        generators,
        coefficient,
        template: get_setting(conn, KEY_TEMPLATE)?,
        next_generator_id,
        migrated_at,
    }))
}

/// Replace the stored fleet with `snapshot` in one transaction
pub fn save_fleet(conn: &mut Connection, snapshot: &FleetSnapshot) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch("DELETE FROM additional_expenses; DELETE FROM generators;")?;
    for (position, generator) in snapshot.generators.iter().enumerate() {
        insert_generator(&tx, generator, position)?;
    }

    set_setting(&tx, KEY_COEFFICIENT, &snapshot.coefficient.to_string())?;
    set_setting(&tx, KEY_NEXT_GENERATOR_ID, &snapshot.next_generator_id.to_string())?;
    match &snapshot.template {
        Some(template) => set_setting(&tx, KEY_TEMPLATE, template)?,
        None => delete_setting(&tx, KEY_TEMPLATE)?,
    }
    match &snapshot.migrated_at {
        Some(at) => set_setting(&tx, KEY_MIGRATED_AT, &at.to_rfc3339())?,
        None => delete_setting(&tx, KEY_MIGRATED_AT)?,
    }
    tx.commit()?;
    Ok(())
}

pub fn insert_history(conn: &Connection, entry: &HistoryEntry) -> Result<i64> {
    conn.execute(
        "INSERT INTO history (created_at, note, kg_coefficient, generators_json)
         VALUES (?1, ?2, ?3, ?4)",
        (
            entry.timestamp.to_rfc3339(),
            &entry.note,
            entry.kg_coefficient,
            serde_json::to_string(&entry.generators)?,
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

type HistoryRow = (i64, String, String, f64, String);

fn history_from_row((id, created_at, note, kg_coefficient, generators_json): HistoryRow) -> Result<HistoryEntry> {
    let timestamp = DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc);
    Ok(HistoryEntry {
        id,
        timestamp,
        note,
        generators: serde_json::from_str(&generators_json)?,
        kg_coefficient,
    })
}

/// List history entries, newest first
pub fn list_history(conn: &Connection) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, created_at, note, kg_coefficient, generators_json FROM history ORDER BY id DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(history_from_row(row?)?);
    }
    Ok(results)
}

pub fn get_history(conn: &Connection, id: i64) -> Result<HistoryEntry> {
    let row: Option<HistoryRow> = conn
        .query_row(
            "SELECT id, created_at, note, kg_coefficient, generators_json FROM history WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()?;
    history_from_row(row.ok_or(LedgerError::HistoryNotFound(id))?)
}

pub fn delete_history(conn: &Connection, id: i64) -> Result<()> {
    if conn.execute("DELETE FROM history WHERE id = ?1", [id])? == 0 {
        return Err(LedgerError::HistoryNotFound(id));
    }
    Ok(())
}

/// The database-backed data source
pub struct SqliteStore {
    conn: Connection,
    subscribers: Subscribers,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "opening database");
        Self::from_connection(Connection::open(path)?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn,
            subscribers: Subscribers::default(),
        })
    }
}

impl DataSource for SqliteStore {
    fn load(&self) -> Result<Option<FleetSnapshot>> {
        load_fleet(&self.conn)
    }

    fn save(&mut self, snapshot: &FleetSnapshot) -> Result<()> {
        save_fleet(&mut self.conn, snapshot)?;
        debug!(generators = snapshot.generators.len(), "saved fleet to database");
        self.subscribers.notify(snapshot);
        Ok(())
    }

    fn subscribe(&mut self, listener: Listener) {
        self.subscribers.push(listener);
    }
}

impl HistoryLog for SqliteStore {
    fn append(&mut self, entry: &HistoryEntry) -> Result<i64> {
        insert_history(&self.conn, entry)
    }

    fn list(&self) -> Result<Vec<HistoryEntry>> {
        list_history(&self.conn)
    }

    fn get(&self, id: i64) -> Result<HistoryEntry> {
        get_history(&self.conn, id)
    }

    fn remove(&mut self, id: i64) -> Result<()> {
        delete_history(&self.conn, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeneratorAction, NumericField};

    fn memory_store() -> SqliteStore {
        SqliteStore::from_connection(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn empty_database_loads_nothing() {
        let store = memory_store();
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(store.load_or_default().unwrap(), FleetSnapshot::first_use());
    }

    #[test]
    fn fleet_roundtrip_keeps_order_and_expenses() {
        let mut store = memory_store();
        let mut fleet = FleetSnapshot::first_use();
        fleet.generators.swap(0, 2);
        fleet
            .apply(3, GeneratorAction::SetField(NumericField::FuelRate, 4.5))
            .unwrap();
        fleet
            .apply(3, GeneratorAction::AddExpense { name: Some("Oil".into()), value: 2.0 })
            .unwrap();
        fleet
            .apply(3, GeneratorAction::AddExpense { name: Some(String::new()), value: 1.0 })
            .unwrap();
        fleet.template = Some("{{date}}".to_string());
        fleet.coefficient = 0.84;

        store.save(&fleet).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, fleet);
        assert_eq!(loaded.generators[0].id, 3);
        assert_eq!(loaded.generators[0].additional_expenses.len(), 2);
    }

    #[test]
    fn save_replaces_removed_generators_and_template() {
        let mut store = memory_store();
        let mut fleet = FleetSnapshot::first_use();
        fleet.template = Some("x".into());
        store.save(&fleet).unwrap();

        fleet.remove_generator(2).unwrap();
        fleet.template = None;
        store.save(&fleet).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.generators.len(), 2);
        assert_eq!(loaded.template, None);
        assert_eq!(loaded.next_generator_id, 4);
    }

    #[test]
    fn null_figures_load_as_zero() {
        let store = memory_store();
        store
            .conn
            .execute("INSERT INTO generators (id, position, name) VALUES (9, 0, 'Legacy')", [])
            .unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.generators[0].fuel_rate, 0.0);
        assert_eq!(loaded.coefficient, DEFAULT_COEFFICIENT);
    }

    #[test]
    fn history_crud() {
        let mut store = memory_store();
        let fleet = FleetSnapshot::first_use();
        let first = store.append(&HistoryEntry::capture(&fleet, "first")).unwrap();
        let second = store.append(&HistoryEntry::capture(&fleet, "second")).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second);
        assert_eq!(store.get(first).unwrap().note, "first");
        assert_eq!(store.get(first).unwrap().generators, fleet.generators);

        store.remove(first).unwrap();
        assert!(matches!(store.get(first), Err(LedgerError::HistoryNotFound(_))));
        assert!(matches!(store.remove(first), Err(LedgerError::HistoryNotFound(_))));
    }

    #[test]
    fn corrupt_history_timestamp_is_an_error() {
        let mut store = memory_store();
        let id = store
            .append(&HistoryEntry::capture(&FleetSnapshot::first_use(), "x"))
            .unwrap();
        store
            .conn
            .execute("UPDATE history SET created_at = 'yesterday' WHERE id = ?1", [id])
            .unwrap();
        assert!(matches!(store.get(id), Err(LedgerError::Timestamp(_))));
        assert!(store.list().is_err());
    }
}
