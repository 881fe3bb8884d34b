//! Text report templates
//!
//! A template is free text with `{{path}}` placeholders. Paths look like
//! `gen.Unit_A.remainingFuel.kg`, `gen.Unit_A.exp.Oil.liters`,
//! `total.totalConsumption.liters` or `date`. Generator and expense names are
//! addressed by their sanitized form (see [`sanitize_key`]). When a template
//! is rendered once per generator, `gen.<metric>.<unit>`, `gen.name` and
//! `exp.<key>.<unit>` refer to the generator being rendered.
//!
//! Rendering never fails: any placeholder that does not resolve is replaced
//! with a fallback literal.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::LazyLock;

use chrono::{Local, NaiveDate};
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::calculator::{
    ConsumptionBreakdown, compute_aggregate, compute_breakdown, format_amount, has_weight, to_weight,
};
use crate::models::{GeneratorRecord, or_zero};

pub const FALLBACK: &str = "[no data]";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder pattern is valid"));

/// Replace every character outside `[A-Za-z0-9]` with `_`
pub fn sanitize_key(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    InitialFuel,
    TotalConsumption,
    RemainingFuel,
    ScheduledConsumption,
    ReadinessConsumption,
    Relocation,
    Maintenance,
    ComponentReplacement,
    AdditionalConsumption,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::InitialFuel,
        Metric::TotalConsumption,
        Metric::RemainingFuel,
        Metric::ScheduledConsumption,
        Metric::ReadinessConsumption,
        Metric::Relocation,
        Metric::Maintenance,
        Metric::ComponentReplacement,
        Metric::AdditionalConsumption,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Metric::InitialFuel => "initialFuel",
            Metric::TotalConsumption => "totalConsumption",
            Metric::RemainingFuel => "remainingFuel",
            Metric::ScheduledConsumption => "scheduledConsumption",
            Metric::ReadinessConsumption => "readinessConsumption",
            Metric::Relocation => "relocation",
            Metric::Maintenance => "maintenance",
            Metric::ComponentReplacement => "componentReplacement",
            Metric::AdditionalConsumption => "additionalConsumption",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::InitialFuel => "Initial fuel",
            Metric::TotalConsumption => "Total consumed",
            Metric::RemainingFuel => "Remaining fuel",
            Metric::ScheduledConsumption => "Consumed by schedule",
            Metric::ReadinessConsumption => "Consumed on readiness",
            Metric::Relocation => "Relocation",
            Metric::Maintenance => "Maintenance",
            Metric::ComponentReplacement => "Component replacement",
            Metric::AdditionalConsumption => "Additional expenses",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.key() == key)
    }

    pub fn value(self, b: &ConsumptionBreakdown) -> f64 {
        match self {
            Metric::InitialFuel => b.initial_fuel,
            Metric::TotalConsumption => b.total,
            Metric::RemainingFuel => b.remaining,
            Metric::ScheduledConsumption => b.scheduled,
            Metric::ReadinessConsumption => b.readiness,
            Metric::Relocation => b.relocation,
            Metric::Maintenance => b.maintenance,
            Metric::ComponentReplacement => b.component_replacement,
            Metric::AdditionalConsumption => b.additional,
        }
    }
}

/// `name` or `<metric>.<unit>`: always the generator being rendered, even
/// when some generator's key happens to be `name` or a metric key
fn is_current_path(rest: &[&str]) -> bool {
    match rest {
        ["name"] => true,
        [metric, unit] => Metric::from_key(metric).is_some() && Unit::from_key(unit).is_some(),
        _ => false,
    }
}

/// Break up brace pairs so a substituted name never reads as a placeholder
fn inert(mut value: String) -> String {
    while value.contains("{{") || value.contains("}}") {
        value = value.replace("{{", "{ {").replace("}}", "} }");
    }
    value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Liters,
    Kg,
}

impl Unit {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "liters" => Some(Unit::Liters),
            "kg" => Some(Unit::Kg),
            _ => None,
        }
    }
}

/// Two names that sanitize to the same placeholder key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCollision {
    /// Owning generator for expense collisions; `None` for generator names
    pub generator: Option<String>,
    pub key: String,
}

impl fmt::Display for KeyCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.generator {
            Some(name) => write!(f, "several expenses of '{}' share the key '{}'", name, self.key),
            None => write!(f, "several generators share the key '{}'", self.key),
        }
    }
}

#[derive(Debug)]
struct ExpenseEntry {
    name: String,
    liters: f64,
}

/// Lookup data for one generator
#[derive(Debug)]
struct Scope {
    key: String,
    name: String,
    breakdown: ConsumptionBreakdown,
    expenses: HashMap<String, ExpenseEntry>,
    expense_keys: Vec<String>,
    ambiguous_expenses: BTreeSet<String>,
}

impl Scope {
    fn new(generator: &GeneratorRecord) -> Self {
        let mut expenses = HashMap::new();
        let mut expense_keys = Vec::new();
        let mut ambiguous_expenses = BTreeSet::new();

        for expense in generator.additional_expenses.iter().filter(|e| e.is_reportable()) {
            let key = sanitize_key(&expense.name);
            if ambiguous_expenses.contains(&key) {
                continue;
            }
            if expenses.remove(&key).is_some() {
                warn!(generator = %generator.name, key = %key, "expense names collide, placeholders disabled");
                expense_keys.retain(|k| k != &key);
                ambiguous_expenses.insert(key);
                continue;
            }
            expense_keys.push(key.clone());
            expenses.insert(
                key,
                ExpenseEntry {
                    name: expense.name.clone(),
                    liters: or_zero(expense.value),
                },
            );
        }

        Self {
            key: sanitize_key(&generator.name),
            name: generator.name.clone(),
            breakdown: compute_breakdown(generator),
            expenses,
            expense_keys,
            ambiguous_expenses,
        }
    }
}

/// Resolves templates against one snapshot of a fleet
#[derive(Debug)]
pub struct ReportRenderer {
    scopes: Vec<Scope>,
    by_key: HashMap<String, usize>,
    ambiguous: BTreeSet<String>,
    collisions: Vec<KeyCollision>,
    totals: ConsumptionBreakdown,
    coefficient: f64,
    date: NaiveDate,
    fallback: String,
}

impl ReportRenderer {
    pub fn new(generators: &[GeneratorRecord], coefficient: f64) -> Self {
        let scopes: Vec<Scope> = generators.iter().map(Scope::new).collect();
        let mut by_key = HashMap::new();
        let mut ambiguous = BTreeSet::new();
        let mut collisions = Vec::new();

        for (index, scope) in scopes.iter().enumerate() {
            if ambiguous.contains(&scope.key) {
                continue;
            }
            if by_key.insert(scope.key.clone(), index).is_some() {
                warn!(key = %scope.key, "generator names collide, placeholders disabled");
                by_key.remove(&scope.key);
                ambiguous.insert(scope.key.clone());
                collisions.push(KeyCollision {
                    generator: None,
                    key: scope.key.clone(),
                });
            }
        }
        for scope in &scopes {
            collisions.extend(scope.ambiguous_expenses.iter().map(|key| KeyCollision {
                generator: Some(scope.name.clone()),
                key: key.clone(),
            }));
        }

        Self {
            scopes,
            by_key,
            ambiguous,
            collisions,
            totals: compute_aggregate(generators).totals,
            coefficient,
            date: Local::now().date_naive(),
            fallback: FALLBACK.to_string(),
        }
    }

    /// Date used for `{{date}}`; defaults to today
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn collisions(&self) -> &[KeyCollision] {
        &self.collisions
    }

    /// Render with fleet scope only: every generator is addressed by key
    pub fn render(&self, template: &str) -> String {
        self.render_in(template, None)
    }

    /// Render the template once per generator, in fleet order
    pub fn render_each(&self, template: &str) -> Vec<String> {
        self.scopes
            .iter()
            .map(|scope| self.render_in(template, Some(scope)))
            .collect()
    }

    pub fn render_per_generator(&self, template: &str) -> String {
        self.render_each(template).join("\n\n")
    }

    fn render_in(&self, template: &str, current: Option<&Scope>) -> String {
        let mut resolved = 0usize;
        let mut unresolved = 0usize;
        let output = PLACEHOLDER.replace_all(template, |caps: &Captures| {
            match self.resolve(&caps[1], current) {
                Some(value) => {
                    resolved += 1;
                    inert(value)
                }
                None => {
                    unresolved += 1;
                    self.fallback.clone()
                }
            }
        });
        debug!(resolved, unresolved, "rendered template");
        output.into_owned()
    }

    fn resolve(&self, path: &str, current: Option<&Scope>) -> Option<String> {
        let parts: Vec<&str> = path.split('.').collect();
        match parts.as_slice() {
            ["date"] => Some(self.date.format("%d.%m.%Y").to_string()),
            ["total", metric, unit] => self.quantity(Metric::from_key(metric)?.value(&self.totals), unit),
            ["gen", rest @ ..] => self.resolve_generator(rest, current),
            ["exp", rest @ ..] => self.resolve_expense(current?, rest),
            _ => None,
        }
    }

    fn resolve_generator(&self, rest: &[&str], current: Option<&Scope>) -> Option<String> {
        if let Some(scope) = current.filter(|_| is_current_path(rest)) {
            return self.resolve_in_scope(scope, rest);
        }
        let (key, tail) = rest.split_first()?;
        if let Some(&index) = self.by_key.get(*key) {
            return self.resolve_in_scope(&self.scopes[index], tail);
        }
        if self.ambiguous.contains(*key) {
            return None;
        }
        self.resolve_in_scope(current?, rest)
    }

    fn resolve_in_scope(&self, scope: &Scope, tail: &[&str]) -> Option<String> {
        match tail {
            [] | ["name"] => Some(scope.name.clone()),
            ["exp", rest @ ..] => self.resolve_expense(scope, rest),
            [metric, unit] => self.quantity(Metric::from_key(metric)?.value(&scope.breakdown), unit),
            _ => None,
        }
    }

    fn resolve_expense(&self, scope: &Scope, rest: &[&str]) -> Option<String> {
        match rest {
            [key, "name"] => scope.expenses.get(*key).map(|e| e.name.clone()),
            [key, unit] => self.quantity(scope.expenses.get(*key)?.liters, unit),
            _ => None,
        }
    }

    fn quantity(&self, liters: f64, unit: &str) -> Option<String> {
        match Unit::from_key(unit)? {
            Unit::Liters => Some(format_amount(liters)),
            Unit::Kg if has_weight(self.coefficient) => {
                Some(format_amount(to_weight(liters, self.coefficient)))
            }
            Unit::Kg => None,
        }
    }

    fn units(&self) -> &'static [&'static str] {
        if has_weight(self.coefficient) {
            &["liters", "kg"]
        } else {
            &["liters"]
        }
    }

    /// Every placeholder that resolves for this fleet, with a description
    pub fn placeholders(&self) -> Vec<(String, String)> {
        let mut list = vec![("{{date}}".to_string(), "Today's date".to_string())];

        let metric_tokens = |prefix: &str, owner: &str| -> Vec<(String, String)> {
            Metric::ALL
                .iter()
                .flat_map(|metric| {
                    self.units().iter().map(move |unit| {
                        (
                            format!("{{{{{}.{}.{}}}}}", prefix, metric.key(), unit),
                            format!("{}: {} ({})", owner, metric.label(), unit),
                        )
                    })
                })
                .collect()
        };

        list.extend(metric_tokens("total", "Fleet"));
        list.push(("{{gen.name}}".to_string(), "Current generator: name".to_string()));
        list.extend(metric_tokens("gen", "Current generator"));

        for scope in &self.scopes {
            if !self.by_key.contains_key(&scope.key) {
                continue;
            }
            let prefix = format!("gen.{}", scope.key);
            list.push((format!("{{{{{}.name}}}}", prefix), format!("{}: name", scope.name)));
            list.extend(metric_tokens(prefix.as_str(), scope.name.as_str()));
            for key in &scope.expense_keys {
                let expense = &scope.expenses[key];
                for unit in self.units() {
                    list.push((
                        format!("{{{{{}.exp.{}.{}}}}}", prefix, key, unit),
                        format!("{}: {} ({})", scope.name, expense.name, unit),
                    ));
                }
            }
        }
        list
    }
}
