//! Fuel consumption calculator logic

use std::fmt;
use std::ops::AddAssign;

use crate::models::{GeneratorRecord, or_zero};

/// Consumption of one generator, split by category. All figures in liters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConsumptionBreakdown {
    pub initial_fuel: f64,
    pub scheduled: f64,
    pub readiness: f64,
    pub relocation: f64,
    pub maintenance: f64,
    pub component_replacement: f64,
    pub additional: f64,
    pub total: f64,
    pub remaining: f64, // Negative = shortfall
}

impl AddAssign<&ConsumptionBreakdown> for ConsumptionBreakdown {
    fn add_assign(&mut self, other: &ConsumptionBreakdown) {
        self.initial_fuel += other.initial_fuel;
        self.scheduled += other.scheduled;
        self.readiness += other.readiness;
        self.relocation += other.relocation;
        self.maintenance += other.maintenance;
        self.component_replacement += other.component_replacement;
        self.additional += other.additional;
        self.total += other.total;
        self.remaining += other.remaining;
    }
}

/// Fleet-wide sum of every generator's breakdown
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateBreakdown {
    pub generators: usize,
    pub totals: ConsumptionBreakdown,
}

/// Break one generator's consumption down by category
///
/// Absent figures count as zero. Nothing is rounded here.
pub fn compute_breakdown(generator: &GeneratorRecord) -> ConsumptionBreakdown {
    let fuel_rate = or_zero(generator.fuel_rate);
    let scheduled = or_zero(generator.scheduled_hours) * fuel_rate;
    let readiness = or_zero(generator.readiness_hours) * fuel_rate;
    let relocation = or_zero(generator.relocation);
    let maintenance = or_zero(generator.maintenance);
    let component_replacement = or_zero(generator.component_replacement);
    // Blank names only hide an expense from reports, it still counts
    let additional = generator
        .additional_expenses
        .iter()
        .fold(0.0, |sum, expense| sum + or_zero(expense.value));

    let total = scheduled + readiness + relocation + maintenance + component_replacement + additional;
    let initial_fuel = or_zero(generator.initial_fuel);

    ConsumptionBreakdown {
        initial_fuel,
        scheduled,
        readiness,
        relocation,
        maintenance,
        component_replacement,
        additional,
        total,
        remaining: initial_fuel - total,
    }
}

/// Sum the breakdowns of a whole fleet
pub fn compute_aggregate(generators: &[GeneratorRecord]) -> AggregateBreakdown {
    let mut totals = ConsumptionBreakdown::default();
    for generator in generators {
        totals += &compute_breakdown(generator);
    }
    AggregateBreakdown {
        generators: generators.len(),
        totals,
    }
}

pub fn to_weight(liters: f64, coefficient: f64) -> f64 {
    liters * coefficient
}

pub fn has_weight(coefficient: f64) -> bool {
    coefficient.is_finite() && coefficient > 0.0
}

/// Weight for display, or `None` when there is nothing meaningful to show
pub fn weight_display(liters: f64, coefficient: f64) -> Option<String> {
    if !has_weight(coefficient) || !liters.is_finite() || liters == 0.0 {
        return None;
    }
    Some(format_amount(to_weight(liters, coefficient)))
}

/// Two decimals, without a stray minus sign on zero
pub fn format_amount(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{:.2}", value)
}

fn format_line(label: &str, liters: f64, coefficient: f64) -> String {
    match weight_display(liters, coefficient) {
        Some(kg) => format!("{:<24} {:>10} L ({} kg)", label, format_amount(liters), kg),
        None => format!("{:<24} {:>10} L", label, format_amount(liters)),
    }
}

/// Format one generator's breakdown as a readable block
pub fn format_breakdown(generator: &GeneratorRecord, coefficient: f64, indent: usize) -> String {
    let b = compute_breakdown(generator);
    let prefix = "  ".repeat(indent);
    let mut output = String::new();

    output.push_str(&format!("{}{} (#{})\n", prefix, generator.name, generator.id));
    for (label, liters) in [
        ("Initial fuel:", b.initial_fuel),
        ("Total consumed:", b.total),
        ("Remaining fuel:", b.remaining),
    ] {
        output.push_str(&format!("{}  {}\n", prefix, format_line(label, liters, coefficient)));
    }
    if b.remaining < 0.0 {
        output.push_str(&format!(
            "{}  !! short by {} L\n",
            prefix,
            format_amount(-b.remaining)
        ));
    }

    for (label, liters) in [
        ("By schedule:", b.scheduled),
        ("On readiness:", b.readiness),
        ("Relocation:", b.relocation),
        ("Maintenance:", b.maintenance),
        ("Component replacement:", b.component_replacement),
    ] {
        output.push_str(&format!("{}    {}\n", prefix, format_line(label, liters, coefficient)));
    }
    for expense in generator.additional_expenses.iter().filter(|e| e.is_reportable()) {
        let label = format!("{}:", expense.name);
        output.push_str(&format!(
            "{}    {}\n",
            prefix,
            format_line(&label, or_zero(expense.value), coefficient)
        ));
    }

    output
}

/// Fleet summary together with the coefficient used for weights
#[derive(Debug)]
pub struct FleetSummary {
    pub aggregate: AggregateBreakdown,
    pub coefficient: f64,
}

impl FleetSummary {
    pub fn new(generators: &[GeneratorRecord], coefficient: f64) -> Self {
        Self {
            aggregate: compute_aggregate(generators),
            coefficient,
        }
    }
}

impl fmt::Display for FleetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.aggregate.totals;
        let c = self.coefficient;

        writeln!(f, "=== Fleet Summary ===")?;
        writeln!(f, "Generators: {}", self.aggregate.generators)?;
        if has_weight(c) {
            writeln!(f, "Coefficient: {} kg/L", c)?;
        }
        writeln!(f)?;

        writeln!(f, "{}", format_line("Initial fuel (all):", t.initial_fuel, c))?;
        writeln!(f)?;
        writeln!(f, "Consumption:")?;
        writeln!(f, "  {}", format_line("By schedule:", t.scheduled, c))?;
        writeln!(f, "  {}", format_line("On readiness:", t.readiness, c))?;
        writeln!(f, "  {}", format_line("Relocation:", t.relocation, c))?;
        writeln!(f, "  {}", format_line("Maintenance:", t.maintenance, c))?;
        writeln!(f, "  {}", format_line("Component replacement:", t.component_replacement, c))?;
        writeln!(f, "  {}", format_line("Additional:", t.additional, c))?;
        writeln!(f)?;
        writeln!(f, "{}", format_line("Total consumed:", t.total, c))?;
        writeln!(f, "{}", format_line("Remaining fuel:", t.remaining, c))?;

        Ok(())
    }
}
