//! Data models for generator fleets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{LedgerError, Result};

pub type GeneratorId = i64;
pub type ExpenseId = i64;

pub const DEFAULT_COEFFICIENT: f64 = 0.85;
pub const NEW_EXPENSE_NAME: &str = "New expense";

/// Template used until the user saves one of their own
pub const DEFAULT_TEMPLATE: &str = "Report for {{gen.name}} ({{date}}):\n\
- Remaining fuel: {{gen.remainingFuel.liters}} L ({{gen.remainingFuel.kg}} kg)";

/// Accepts a number, `null` or nothing at all; the latter two become 0.
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

fn default_coefficient() -> f64 {
    DEFAULT_COEFFICIENT
}

/// NaN input is treated as "nothing entered".
pub(crate) fn or_zero(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value }
}

/// A user-named cost in liters attached to one generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalExpense {
    pub id: ExpenseId,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: f64,
}

impl AdditionalExpense {
    /// Blank-named expenses are kept in storage but left out of reports
    pub fn is_reportable(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorRecord {
    pub id: GeneratorId,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fuel_rate: f64, // L/h
    #[serde(default, deserialize_with = "lenient_f64")]
    pub initial_fuel: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub scheduled_hours: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub readiness_hours: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub relocation: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub maintenance: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub component_replacement: f64,
    #[serde(default)]
    pub additional_expenses: Vec<AdditionalExpense>,
}

/// Numeric generator fields that can be edited one at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum NumericField {
    FuelRate,
    InitialFuel,
    ScheduledHours,
    ReadinessHours,
    Relocation,
    Maintenance,
    ComponentReplacement,
}

impl NumericField {
    /// Hour fields also accept `H:MM` input on the command line
    pub fn is_hours(self) -> bool {
        matches!(self, NumericField::ScheduledHours | NumericField::ReadinessHours)
    }
}

/// A single edit to a generator record
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorAction {
    Rename(String),
    SetField(NumericField, f64),
    AddExpense { name: Option<String>, value: f64 },
    RemoveExpense(ExpenseId),
    RenameExpense(ExpenseId, String),
    SetExpenseValue(ExpenseId, f64),
}

impl GeneratorRecord {
    pub fn new(id: GeneratorId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            fuel_rate: 0.0,
            initial_fuel: 0.0,
            scheduled_hours: 0.0,
            readiness_hours: 0.0,
            relocation: 0.0,
            maintenance: 0.0,
            component_replacement: 0.0,
            additional_expenses: Vec::new(),
        }
    }

    pub fn field(&self, field: NumericField) -> f64 {
        match field {
            NumericField::FuelRate => self.fuel_rate,
            NumericField::InitialFuel => self.initial_fuel,
            NumericField::ScheduledHours => self.scheduled_hours,
            NumericField::ReadinessHours => self.readiness_hours,
            NumericField::Relocation => self.relocation,
            NumericField::Maintenance => self.maintenance,
            NumericField::ComponentReplacement => self.component_replacement,
        }
    }

    fn field_mut(&mut self, field: NumericField) -> &mut f64 {
        match field {
            NumericField::FuelRate => &mut self.fuel_rate,
            NumericField::InitialFuel => &mut self.initial_fuel,
            NumericField::ScheduledHours => &mut self.scheduled_hours,
            NumericField::ReadinessHours => &mut self.readiness_hours,
            NumericField::Relocation => &mut self.relocation,
            NumericField::Maintenance => &mut self.maintenance,
            NumericField::ComponentReplacement => &mut self.component_replacement,
        }
    }

    fn next_expense_id(&self) -> ExpenseId {
        self.additional_expenses
            .iter()
            .map(|e| e.id)
            .max()
            .map_or(1, |max| max + 1)
    }

    fn expense_mut(&mut self, expense: ExpenseId) -> Result<&mut AdditionalExpense> {
        let generator = self.id;
        self.additional_expenses
            .iter_mut()
            .find(|e| e.id == expense)
            .ok_or(LedgerError::ExpenseNotFound { generator, expense })
    }

    /// Apply an edit. Returns the id of the affected expense, if any.
    pub fn apply(&mut self, action: GeneratorAction) -> Result<Option<ExpenseId>> {
        match action {
            GeneratorAction::Rename(name) => {
                self.name = name;
                Ok(None)
            }
            GeneratorAction::SetField(field, value) => {
                *self.field_mut(field) = or_zero(value);
                Ok(None)
            }
            GeneratorAction::AddExpense { name, value } => {
                let id = self.next_expense_id();
                self.additional_expenses.push(AdditionalExpense {
                    id,
                    name: name.unwrap_or_else(|| NEW_EXPENSE_NAME.to_string()),
                    value: or_zero(value),
                });
                Ok(Some(id))
            }
            GeneratorAction::RemoveExpense(expense) => {
                let before = self.additional_expenses.len();
                self.additional_expenses.retain(|e| e.id != expense);
                if self.additional_expenses.len() == before {
                    return Err(LedgerError::ExpenseNotFound {
                        generator: self.id,
                        expense,
                    });
                }
                Ok(Some(expense))
            }
            GeneratorAction::RenameExpense(expense, name) => {
                self.expense_mut(expense)?.name = name;
                Ok(Some(expense))
            }
            GeneratorAction::SetExpenseValue(expense, value) => {
                self.expense_mut(expense)?.value = or_zero(value);
                Ok(Some(expense))
            }
        }
    }
}

/// Everything one user has persisted: the unit a data source loads and saves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSnapshot {
    #[serde(default)]
    pub generators: Vec<GeneratorRecord>,
    #[serde(default = "default_coefficient")]
    pub coefficient: f64,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub next_generator_id: GeneratorId,
    #[serde(default)]
    pub migrated_at: Option<DateTime<Utc>>,
}

impl FleetSnapshot {
    /// What a user sees before anything has been saved
    pub fn first_use() -> Self {
        let generators = (1..=3)
            .map(|n| GeneratorRecord::new(n, format!("Diesel generator {}", n)))
            .collect();
        Self {
            generators,
            coefficient: DEFAULT_COEFFICIENT,
            template: None,
            next_generator_id: 4,
            migrated_at: None,
        }
    }

    pub fn template_or_default(&self) -> &str {
        self.template.as_deref().unwrap_or(DEFAULT_TEMPLATE)
    }

    /// Hand out a generator id that has never been used in this fleet
    pub fn allocate_id(&mut self) -> GeneratorId {
        let after_existing = self.generators.iter().map(|g| g.id + 1).max().unwrap_or(1);
        let id = self.next_generator_id.max(after_existing).max(1);
        self.next_generator_id = id + 1;
        id
    }

    pub fn add_generator(&mut self, name: Option<String>) -> GeneratorId {
        let id = self.allocate_id();
        let name = name.unwrap_or_else(|| format!("New generator {}", self.generators.len() + 1));
        self.generators.push(GeneratorRecord::new(id, name));
        id
    }

    pub fn remove_generator(&mut self, id: GeneratorId) -> Result<GeneratorRecord> {
        let index = self
            .generators
            .iter()
            .position(|g| g.id == id)
            .ok_or(LedgerError::GeneratorNotFound(id))?;
        Ok(self.generators.remove(index))
    }

    pub fn generator(&self, id: GeneratorId) -> Result<&GeneratorRecord> {
        self.generators
            .iter()
            .find(|g| g.id == id)
            .ok_or(LedgerError::GeneratorNotFound(id))
    }

    pub fn apply(&mut self, id: GeneratorId, action: GeneratorAction) -> Result<Option<ExpenseId>> {
        self.generators
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or(LedgerError::GeneratorNotFound(id))?
            .apply(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_null_numbers_deserialize_as_zero() {
        let json = r#"{"id": 7, "name": "Unit", "fuelRate": null, "additionalExpenses": [{"id": 1, "name": "Oil"}]}"#;
        let generator: GeneratorRecord = serde_json::from_str(json).unwrap();
        assert_eq!(generator.fuel_rate, 0.0);
        assert_eq!(generator.initial_fuel, 0.0);
        assert_eq!(generator.additional_expenses[0].value, 0.0);
    }

    #[test]
    fn set_field_coerces_nan_to_zero() {
        let mut generator = GeneratorRecord::new(1, "A");
        generator.apply(GeneratorAction::SetField(NumericField::FuelRate, 4.5)).unwrap();
        assert_eq!(generator.fuel_rate, 4.5);
        generator.apply(GeneratorAction::SetField(NumericField::FuelRate, f64::NAN)).unwrap();
        assert_eq!(generator.fuel_rate, 0.0);
    }

    #[test]
    fn expense_lifecycle() {
        let mut generator = GeneratorRecord::new(1, "A");
        let first = generator
            .apply(GeneratorAction::AddExpense { name: None, value: 0.0 })
            .unwrap()
            .unwrap();
        let second = generator
            .apply(GeneratorAction::AddExpense { name: Some("Oil".into()), value: 2.0 })
            .unwrap()
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(generator.additional_expenses[0].name, NEW_EXPENSE_NAME);

        generator.apply(GeneratorAction::RenameExpense(first, "Filters".into())).unwrap();
        generator.apply(GeneratorAction::SetExpenseValue(first, 1.5)).unwrap();
        assert_eq!(generator.additional_expenses[0].name, "Filters");
        assert_eq!(generator.additional_expenses[0].value, 1.5);

        generator.apply(GeneratorAction::RemoveExpense(second)).unwrap();
        assert_eq!(generator.additional_expenses.len(), 1);
    }

    #[test]
    fn unknown_expense_is_an_error() {
        let mut generator = GeneratorRecord::new(3, "A");
        let err = generator.apply(GeneratorAction::RemoveExpense(99)).unwrap_err();
        assert!(matches!(err, LedgerError::ExpenseNotFound { generator: 3, expense: 99 }));
    }

    #[test]
    fn generator_ids_are_not_reused_after_removal() {
        let mut fleet = FleetSnapshot::first_use();
        let id = fleet.add_generator(None);
        assert_eq!(id, 4);
        assert_eq!(fleet.generators[3].name, "New generator 4");
        fleet.remove_generator(id).unwrap();
        assert_eq!(fleet.add_generator(Some("B".into())), 5);
    }

    #[test]
    fn first_use_has_default_template() {
        let fleet = FleetSnapshot::first_use();
        assert_eq!(fleet.generators.len(), 3);
        assert_eq!(fleet.template_or_default(), DEFAULT_TEMPLATE);
        assert_eq!(fleet.coefficient, DEFAULT_COEFFICIENT);
    }
}
