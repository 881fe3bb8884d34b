//! Fuel Ledger
//!
//! Fuel consumption calculator and report generator for diesel generator fleets.

mod calculator;
mod config;
mod db;
mod error;
mod history;
mod local;
mod models;
mod store;
mod template;
mod timecalc;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::calculator::{FleetSummary, compute_breakdown, format_amount, format_breakdown, weight_display};
use crate::config::Settings;
use crate::db::SqliteStore;
use crate::error::LedgerError;
use crate::history::HistoryEntry;
use crate::local::JsonFileStore;
use crate::models::{ExpenseId, FleetSnapshot, GeneratorAction, GeneratorId, NumericField};
use crate::store::{MigrationOutcome, Store};
use crate::template::ReportRenderer;
use crate::timecalc::{TimeEntry, parse_hours, split_hours, sum_entries};

#[derive(Parser)]
#[command(name = "fuel-ledger")]
#[command(about = "Fuel consumption calculator and report generator for diesel generators")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store and seed it with the default fleet
    Init,

    /// List generators with their inputs
    List,

    /// Add a generator
    Add {
        /// Name of the new generator
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Remove a generator
    Remove { id: GeneratorId },

    /// Rename a generator
    Rename { id: GeneratorId, name: String },

    /// Set a numeric field on a generator
    Set {
        id: GeneratorId,

        #[arg(value_enum)]
        field: NumericField,

        /// Liters, L/h, or hours (`H:MM` is accepted for hour fields)
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Manage additional expenses of a generator
    #[command(subcommand)]
    Expense(ExpenseCommand),

    /// Show or set the liters-to-kilograms coefficient
    Coefficient {
        #[arg(allow_negative_numbers = true)]
        value: Option<f64>,
    },

    /// Print the consumption report
    Report {
        /// Show the full breakdown of every generator
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show or change the report template
    #[command(subcommand)]
    Template(TemplateCommand),

    /// Render the report template
    Render {
        /// Render this file instead of the saved template
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// Render once for the whole fleet instead of once per generator
        #[arg(long)]
        fleet: bool,
    },

    /// List the placeholders available for the current fleet
    Placeholders,

    /// Saved calculation snapshots
    #[command(subcommand)]
    History(HistoryCommand),

    /// Add up durations given as H or H:MM
    TimeSum {
        #[arg(required = true)]
        entries: Vec<String>,
    },

    /// Move data from a local JSON file into the database
    Migrate {
        /// Local JSON file to read
        from: PathBuf,
    },
}

#[derive(Subcommand)]
enum ExpenseCommand {
    /// Add an expense line
    Add {
        generator: GeneratorId,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
        value: f64,
    },

    /// Remove an expense line
    Remove { generator: GeneratorId, expense: ExpenseId },

    /// Rename an expense line
    Rename {
        generator: GeneratorId,
        expense: ExpenseId,
        name: String,
    },

    /// Set the liters of an expense line
    Set {
        generator: GeneratorId,
        expense: ExpenseId,

        #[arg(allow_negative_numbers = true)]
        value: f64,
    },
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// Print the current template
    Show,

    /// Replace the template
    Set {
        /// Template text
        text: Option<String>,

        /// Read the template from a file
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },

    /// Go back to the built-in template
    Reset,
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// Save the current fleet
    Save {
        #[arg(short, long, default_value = "")]
        note: String,
    },

    /// List saved entries, newest first
    List,

    /// Show the report of a saved entry
    Show { id: i64 },

    /// Delete a saved entry
    Delete { id: i64 },

    /// Import exported entries from every JSON file below a directory
    Import { dir: PathBuf },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    cli.settings.init_logging();

    if let Commands::Migrate { from } = &cli.command {
        return run_migrate(&cli.settings, from);
    }
    if let Commands::TimeSum { entries } = &cli.command {
        return time_sum(entries);
    }

    let mut store = cli.settings.open_store().context("Failed to open store")?;
    store.subscribe(Box::new(|fleet: &FleetSnapshot| {
        info!(generators = fleet.generators.len(), "fleet saved");
    }));

    match cli.command {
        Commands::Init => {
            let fleet = match store.load()? {
                Some(fleet) => fleet,
                None => {
                    let fleet = FleetSnapshot::first_use();
                    store.save(&fleet)?;
                    fleet
                }
            };
            match &cli.settings.local {
                Some(path) => println!("Local store initialized at: {}", path.display()),
                None => println!("Database initialized at: {}", cli.settings.database.display()),
            }
            println!("{} generators", fleet.generators.len());
        }

        Commands::List => {
            let fleet = store.load_or_default()?;
            if fleet.generators.is_empty() {
                println!("No generators. Run 'add' first.");
            } else {
                println!(
                    "{:>4} {:<28} {:>8} {:>10} {:>8} {:>8} {:>8}",
                    "ID", "Generator", "L/h", "Initial L", "Sched", "Ready", "Extras"
                );
                println!("{}", "-".repeat(80));
                for g in &fleet.generators {
                    println!(
                        "{:>4} {:<28} {:>8} {:>10} {:>8} {:>8} {:>8}",
                        g.id,
                        g.name,
                        format_amount(g.fuel_rate),
                        format_amount(g.initial_fuel),
                        split_hours(g.scheduled_hours).to_string(),
                        split_hours(g.readiness_hours).to_string(),
                        g.additional_expenses.len()
                    );
                }
            }
        }

        Commands::Add { name } => {
            let id = edit(store.as_mut(), |fleet| Ok(fleet.add_generator(name)))?;
            println!("Added generator #{}", id);
        }

        Commands::Remove { id } => {
            let removed = edit(store.as_mut(), |fleet| fleet.remove_generator(id))?;
            println!("Removed '{}' (#{})", removed.name, removed.id);
        }

        Commands::Rename { id, name } => {
            edit(store.as_mut(), |fleet| fleet.apply(id, GeneratorAction::Rename(name)))?;
            println!("Renamed generator #{}", id);
        }

        Commands::Set { id, field, value } => {
            let parsed = if field.is_hours() {
                parse_hours(&value)?
            } else {
                value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| LedgerError::InvalidNumber(value.clone()))?
            };
            let (old, new) = edit(store.as_mut(), |fleet| {
                let old = fleet.generator(id)?.field(field);
                fleet.apply(id, GeneratorAction::SetField(field, parsed))?;
                Ok((old, fleet.generator(id)?.field(field)))
            })?;
            if field.is_hours() {
                println!("#{} {:?}: {} -> {}", id, field, split_hours(old), split_hours(new));
            } else {
                println!("#{} {:?}: {} -> {}", id, field, format_amount(old), format_amount(new));
            }
        }

        Commands::Expense(command) => run_expense(store.as_mut(), command)?,

        Commands::Coefficient { value } => match value {
            None => {
                let fleet = store.load_or_default()?;
                println!("{} kg/L", fleet.coefficient);
            }
            Some(coefficient) => {
                if !(coefficient.is_finite() && coefficient > 0.0) {
                    warn!(coefficient, "coefficient is not positive, weights will be hidden");
                }
                edit(store.as_mut(), |fleet| {
                    fleet.coefficient = coefficient;
                    Ok(())
                })?;
                println!("Coefficient set to {} kg/L", coefficient);
            }
        },

        Commands::Report { verbose } => {
            let fleet = store.load_or_default()?;
            if verbose {
                for generator in &fleet.generators {
                    println!("{}", format_breakdown(generator, fleet.coefficient, 0));
                }
            } else if !fleet.generators.is_empty() {
                println!("{:<28} {:>12} {:>12} {:>12}", "Generator", "Consumed L", "Remaining L", "Remaining kg");
                println!("{}", "-".repeat(67));
                for g in &fleet.generators {
                    let b = compute_breakdown(g);
                    println!(
                        "{:<28} {:>12} {:>12} {:>12}",
                        g.name,
                        format_amount(b.total),
                        format_amount(b.remaining),
                        weight_display(b.remaining, fleet.coefficient).unwrap_or_else(|| "-".to_string())
                    );
                }
                println!();
            }
            print!("{}", FleetSummary::new(&fleet.generators, fleet.coefficient));
        }

        Commands::Template(command) => match command {
            TemplateCommand::Show => {
                let fleet = store.load_or_default()?;
                if fleet.template.is_none() {
                    println!("(built-in template)");
                }
                println!("{}", fleet.template_or_default());
            }
            TemplateCommand::Set { text, file } => {
                let template = match (text, file) {
                    (Some(text), _) => text,
                    (None, Some(path)) => fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read template {}", path.display()))?,
                    (None, None) => anyhow::bail!("Give the template text or --file"),
                };
                edit(store.as_mut(), |fleet| {
                    fleet.template = Some(template);
                    Ok(())
                })?;
                println!("Template saved");
            }
            TemplateCommand::Reset => {
                edit(store.as_mut(), |fleet| {
                    fleet.template = None;
                    Ok(())
                })?;
                println!("Template reset to the built-in one");
            }
        },

        Commands::Render { template, fleet: whole_fleet } => {
            let fleet = store.load_or_default()?;
            let text = match template {
                Some(path) => fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read template {}", path.display()))?,
                None => fleet.template_or_default().to_string(),
            };
            let renderer = ReportRenderer::new(&fleet.generators, fleet.coefficient)
                .with_fallback(cli.settings.fallback.as_str());
            if whole_fleet {
                println!("{}", renderer.render(&text));
            } else {
                println!("{}", renderer.render_per_generator(&text));
            }
        }

        Commands::Placeholders => {
            let fleet = store.load_or_default()?;
            let renderer = ReportRenderer::new(&fleet.generators, fleet.coefficient);
            let placeholders = renderer.placeholders();
            let width = placeholders.iter().map(|(token, _)| token.len()).max().unwrap_or(0);
            for (token, description) in &placeholders {
                println!("{:<width$}  {}", token, description, width = width);
            }
            if !renderer.collisions().is_empty() {
                println!("\nUnavailable (names collide):");
                for collision in renderer.collisions() {
                    println!("  {}", collision);
                }
            }
        }

        Commands::History(command) => run_history(store.as_mut(), command)?,

        Commands::TimeSum { .. } | Commands::Migrate { .. } => unreachable!("handled before the store is opened"),
    }

    Ok(())
}

/// Load, change and save the fleet
fn edit<T>(
    store: &mut dyn Store,
    change: impl FnOnce(&mut FleetSnapshot) -> error::Result<T>,
) -> Result<T> {
    let mut fleet = store.load_or_default()?;
    let out = change(&mut fleet)?;
    store.save(&fleet).context("Failed to save fleet")?;
    Ok(out)
}

fn run_expense(store: &mut dyn Store, command: ExpenseCommand) -> Result<()> {
    match command {
        ExpenseCommand::Add { generator, name, value } => {
            let id = edit(store, |fleet| {
                fleet.apply(generator, GeneratorAction::AddExpense { name, value })
            })?;
            if let Some(id) = id {
                println!("Added expense #{} to generator #{}", id, generator);
            }
        }
        ExpenseCommand::Remove { generator, expense } => {
            edit(store, |fleet| fleet.apply(generator, GeneratorAction::RemoveExpense(expense)))?;
            println!("Removed expense #{} from generator #{}", expense, generator);
        }
        ExpenseCommand::Rename { generator, expense, name } => {
            edit(store, |fleet| {
                fleet.apply(generator, GeneratorAction::RenameExpense(expense, name))
            })?;
            println!("Renamed expense #{} on generator #{}", expense, generator);
        }
        ExpenseCommand::Set { generator, expense, value } => {
            edit(store, |fleet| {
                fleet.apply(generator, GeneratorAction::SetExpenseValue(expense, value))
            })?;
            println!("Expense #{} on generator #{}: {} L", expense, generator, format_amount(value));
        }
    }
    Ok(())
}

fn run_history(store: &mut dyn Store, command: HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::Save { note } => {
            let fleet = store.load_or_default()?;
            let id = store.append(&HistoryEntry::capture(&fleet, note))?;
            println!("Saved history entry #{}", id);
        }
        HistoryCommand::List => {
            let entries = store.list()?;
            if entries.is_empty() {
                println!("No history entries. Run 'history save' first.");
            }
            for entry in entries {
                println!("{}", entry.summary_line());
            }
        }
        HistoryCommand::Show { id } => {
            print!("{}", store.get(id)?.report());
        }
        HistoryCommand::Delete { id } => {
            store.remove(id)?;
            println!("Deleted history entry #{}", id);
        }
        HistoryCommand::Import { dir } => {
            let stats = history::import_dir(store, &dir)
                .with_context(|| format!("Failed to import from {}", dir.display()))?;
            println!("{}", stats);
        }
    }
    Ok(())
}

fn time_sum(raw: &[String]) -> Result<()> {
    let entries = raw
        .iter()
        .map(|s| s.parse::<TimeEntry>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let total = sum_entries(&entries)?;
    println!("Total: {} ({} h)", total, format_amount(total.as_hours()));
    Ok(())
}

fn run_migrate(settings: &Settings, from: &Path) -> Result<()> {
    let local = JsonFileStore::open(from);
    let mut remote = SqliteStore::open(&settings.database)
        .with_context(|| format!("Failed to open database {}", settings.database.display()))?;

    match store::migrate(&local, &mut remote)? {
        MigrationOutcome::AlreadyMigrated => println!("Database already holds migrated data, nothing done"),
        MigrationOutcome::NothingToMigrate => println!("No fleet found in {}", local.path().display()),
        MigrationOutcome::Copied { generators } => println!("Copied {} generators into the database", generators),
        MigrationOutcome::Merged { generators } => {
            println!("Merged {} generators into the existing database fleet", generators)
        }
    }
    Ok(())
}
