mod config;
mod db;
mod display;
mod error;
mod models;
mod store;
mod tui;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use config::Config;
use db::{Database, MemoryStorage, SlotStorage};
use display::{days_ago, format_date, truncate};
use models::{ApplicationRecord, NewApplication, Stage, StageFilter, DEFAULT_RESULT};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use store::ApplicationStore;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "placement-tracker")]
#[command(about = "Track job applications - record, search, summarize, and export")]
struct Cli {
    /// Path to the tracker database
    #[arg(long, global = true, env = "PLACEMENT_TRACKER_DB")]
    db: Option<PathBuf>,

    /// Use throwaway in-memory storage instead of the database (ignores --db)
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an application
    Add {
        #[arg(short, long)]
        company: String,

        #[arg(short, long)]
        role: String,

        /// Pipeline stage (Applied, Interview, Offer, Rejected, or your own)
        #[arg(short, long, default_value = "Applied")]
        stage: String,

        #[arg(long, default_value = DEFAULT_RESULT)]
        result: String,

        /// Application date, YYYY-MM-DD (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[arg(short, long, default_value = "")]
        notes: String,
    },

    /// List applications
    List {
        /// Filter by stage, or "all"
        #[arg(short, long, default_value = "all")]
        stage: String,

        /// Match company or role (case-insensitive)
        #[arg(short = 'q', long, default_value = "")]
        search: String,
    },

    /// Show application details
    Show {
        /// Application ID
        id: i64,
    },

    /// Edit an application (it is re-added with a new ID)
    Edit {
        /// Application ID
        id: i64,

        #[arg(short, long)]
        company: Option<String>,

        #[arg(short, long)]
        role: Option<String>,

        #[arg(short, long)]
        stage: Option<String>,

        #[arg(long)]
        result: Option<String>,

        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Delete an application
    Delete {
        /// Application ID
        id: i64,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show summary counts
    Summary,

    /// Export all applications as JSON
    Export {
        /// Directory to write the export file into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Print to stdout instead of writing a file
        #[arg(long)]
        stdout: bool,
    },

    /// Browse applications interactively
    Browse {
        /// Directory for exports made from the browser
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

fn init_logging() {
    // Logs go to stderr so table output stays clean
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let today = chrono::Local::now().date_naive();

    if cli.memory {
        tracing::warn!("using in-memory storage, nothing will be saved");
        let mut store = ApplicationStore::load(MemoryStorage::new());
        return run(&mut store, cli.command, today);
    }

    let config = Config::resolve(cli.db);
    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    let mut store = ApplicationStore::load_slot(db, &config.slot);
    run(&mut store, cli.command, today)
}

fn run<S: SlotStorage>(store: &mut ApplicationStore<S>, command: Commands, today: NaiveDate) -> Result<()> {
    match command {
        Commands::Add {
            company,
            role,
            stage,
            result,
            date,
            notes,
        } => {
            let draft = NewApplication::new(&company, &role, Stage::from(stage), date.unwrap_or(today))
                .with_result(&result)
                .with_notes(&notes);
            let app = store.add(draft).context("Application was not saved")?;
            println!("Application added successfully! (#{})", app.id);
        }

        Commands::List { stage, search } => {
            let filter = StageFilter::from(stage.as_str());
            let apps: Vec<&ApplicationRecord> = store.query(&filter, &search).collect();
            if apps.is_empty() {
                if store.is_empty() {
                    println!("No applications yet. Add your first one with 'placement-tracker add'.");
                } else {
                    println!("No matching applications found.");
                }
            } else {
                println!(
                    "{:<14} {:<20} {:<20} {:<12} {:<10} {:<13} {:<12}",
                    "ID", "COMPANY", "ROLE", "STAGE", "RESULT", "DATE", "AGE"
                );
                println!("{}", "-".repeat(105));
                let shown = apps.len();
                for app in apps {
                    println!(
                        "{:<14} {:<20} {:<20} {:<12} {:<10} {:<13} {:<12}",
                        app.id,
                        truncate(&app.company, 18),
                        truncate(&app.role, 18),
                        truncate(app.stage.as_str(), 12),
                        truncate(&app.result, 10),
                        format_date(app.date),
                        days_ago(app.date, today)
                    );
                }
                println!("\nShowing {} of {} application(s)", shown, store.len());
            }
        }

        Commands::Show { id } => match store.find_by_id(id) {
            Some(app) => print_application(app, today),
            None => println!("Application #{} not found.", id),
        },

        Commands::Edit {
            id,
            company,
            role,
            stage,
            result,
            date,
            notes,
        } => {
            let Some(existing) = store.find_by_id(id) else {
                println!("Application #{} not found.", id);
                return Ok(());
            };

            let mut draft = NewApplication::from(existing.clone());
            if let Some(company) = company {
                draft.company = company;
            }
            if let Some(role) = role {
                draft.role = role;
            }
            if let Some(stage) = stage {
                draft.stage = Stage::from(stage);
            }
            if let Some(result) = result {
                draft.result = result;
            }
            if let Some(date) = date {
                draft.date = date;
            }
            if let Some(notes) = notes {
                draft.notes = notes;
            }
            // Checked before the original is taken out, so a bad edit keeps it
            draft.validate()?;

            store.take_for_edit(id).context("Application was not removed")?;
            let app = store.add(draft).context("Edited application was not saved")?;
            println!("Application #{} updated (now #{}).", id, app.id);
        }

        Commands::Delete { id, yes } => {
            if store.find_by_id(id).is_none() {
                println!("Application #{} not found.", id);
                return Ok(());
            }
            if !yes && !confirm("Are you sure you want to delete this application?")? {
                println!("Delete cancelled.");
                return Ok(());
            }
            store.remove(id).context("Application was not deleted")?;
            println!("Application deleted successfully!");
        }

        Commands::Summary => {
            let summary = store.summary();
            println!("Total applications: {}", summary.total);
            println!("Interviews:         {}", summary.interviews);
            println!("Offers:             {}", summary.offers);
            println!("Rejected:           {}", summary.rejected);
            println!("Success rate:       {}%", summary.success_rate);
        }

        Commands::Export { output, stdout } => {
            if stdout {
                println!("{}", store.export_snapshot()?);
            } else {
                let path = store
                    .export_to_dir(&output, today)
                    .with_context(|| format!("Export to {} failed", output.display()))?;
                println!("Data exported successfully to {}", path.display());
            }
        }

        Commands::Browse { output } => {
            tui::run_browse(store, &output)?;
        }
    }

    Ok(())
}

fn print_application(app: &ApplicationRecord, today: NaiveDate) {
    println!("Application #{}", app.id);
    println!("Company: {}", app.company);
    println!("Role: {}", app.role);
    println!("Stage: {}", app.stage);
    println!("Result: {}", app.result);
    println!("Date: {} ({})", format_date(app.date), days_ago(app.date, today));
    println!("Notes: {}", app.notes);
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
