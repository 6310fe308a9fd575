use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use simplr_core::{
    load_sort_option, parse_local_due_to_utc, resolve_zone, save_sort_option, Category,
    MemoryPressure, QueryFacade, SortOption, Task, TaskFilter, TaskSource,
};
use std::path::PathBuf;

mod companion;
mod config;
mod prefs;
mod render;
mod state;

use prefs::FilePreferences;
use state::JsonStore;

#[derive(Parser, Debug)]
#[command(
    name = "simplr",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SIMPLR_BUILD_SHA"), ")"),
    about = "Simplr task list: ordered views, companion head, shared sort preference"
)]
struct Cli {
    /// Data directory (default: $SIMPLR_HOME or ~/.simplr)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config.toml into the data directory
    Init,

    /// Print tasks grouped by category in hierarchy order
    List {
        /// Sort policy (default: shared preference)
        #[arg(long)]
        sort: Option<SortOption>,

        /// all | active | completed | overdue | pending | urgent | uncategorized | category:<id>
        #[arg(long, default_value = "all")]
        filter: TaskFilter,

        #[arg(long)]
        json: bool,
    },

    /// Print the companion head (first N tasks of the full ordering)
    Top {
        /// Rows to show (default: companion.limit from config)
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        sort: Option<SortOption>,

        #[arg(long)]
        json: bool,
    },

    /// Count tasks matching a filter
    Count { filter: TaskFilter },

    /// Read or change the shared sort preference
    Sort {
        #[command(subcommand)]
        command: SortCommand,
    },

    /// Task store mutations
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// Category store mutations
    Category {
        #[command(subcommand)]
        command: CategoryCommand,
    },

    /// Companion surface
    Companion {
        #[command(subcommand)]
        command: CompanionCommand,
    },

    /// Cache diagnostics
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SortCommand {
    /// Print the current token
    Get,
    /// Store a new token (priority | dueDate | creationNewest | creationOldest | alphabetical)
    Set { option: SortOption },
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// Add a task
    Add {
        #[arg(long)]
        title: String,

        /// Local due time "YYYY-MM-DD HH:MM", or "YYYY-MM-DD" for end of day
        #[arg(long)]
        due: Option<String>,

        /// Local reminder time "YYYY-MM-DD HH:MM", or "YYYY-MM-DD" for end of day
        #[arg(long)]
        reminder: Option<String>,

        /// IANA timezone for --due/--reminder (default: display.timezone)
        #[arg(long)]
        tz: Option<String>,

        #[arg(long)]
        category: Option<String>,

        /// Explicit id (default: generated)
        #[arg(long)]
        id: Option<String>,
    },

    /// Toggle completion
    Done { id: String },

    /// Delete a task
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    /// Add or rename a category
    Add {
        #[arg(long)]
        id: String,

        #[arg(long)]
        name: String,

        /// urgent | important | work | personal | health | shopping | uncategorized
        #[arg(long, default_value = "uncategorized")]
        hierarchy: String,
    },
}

#[derive(Subcommand, Debug)]
enum CompanionCommand {
    /// Refresh the companion head on an interval
    Watch {
        /// Seconds between refreshes (default: companion.refresh_secs)
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Stop after this many refreshes
        #[arg(long)]
        ticks: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Warm the cache against the current store and print its stats
    Stats {
        /// Report a memory-pressure tier after warming
        #[arg(long, value_parser = parse_pressure)]
        pressure: Option<MemoryPressure>,
    },
}

fn parse_pressure(s: &str) -> std::result::Result<MemoryPressure, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "normal" => Ok(MemoryPressure::Normal),
        "warning" => Ok(MemoryPressure::Warning),
        "critical" => Ok(MemoryPressure::Critical),
        other => Err(format!("unknown pressure tier: {other}")),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("SIMPLR_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let home = state::ensure_simplr_home(cli.home.as_deref())?;
    let cfg = config::load_config(&home)?;
    let store = JsonStore::in_home(&home);
    let prefs = FilePreferences::in_home(&home);
    let facade = QueryFacade::new(cfg.cache);
    let tz = resolve_zone(&cfg.display.timezone).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "display.timezone unusable, showing UTC");
        chrono_tz::Tz::UTC
    });

    match cli.command {
        Command::Init => {
            config::init_config(&home)?;
        }

        Command::List { sort, filter, json } => {
            let snapshot = store.snapshot()?;
            let option = sort.unwrap_or_else(|| load_sort_option(&prefs));
            let groups = facade.ordered_groups_where(&snapshot, &filter, option);
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                println!("# {filter} by {option} (store v{})\n", snapshot.version);
                render::print_groups(&groups, tz);
            }
        }

        Command::Top { limit, sort, json } => {
            let snapshot = store.snapshot()?;
            let option = sort.unwrap_or_else(|| load_sort_option(&prefs));
            let rows = facade.flattened_top(&snapshot, option, limit.unwrap_or(cfg.companion.limit));
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                render::print_tasks(&rows, tz);
            }
        }

        Command::Count { filter } => {
            let snapshot = store.snapshot()?;
            println!("{filter}: {}", facade.aggregate_count(&snapshot, &filter));
        }

        Command::Sort { command } => match command {
            SortCommand::Get => println!("{}", load_sort_option(&prefs)),
            SortCommand::Set { option } => {
                save_sort_option(&prefs, option)?;
                println!("Sort preference: {option}");
            }
        },

        Command::Task { command } => match command {
            TaskCommand::Add {
                title,
                due,
                reminder,
                tz: task_tz,
                category,
                id,
            } => {
                let zone = match task_tz.as_deref() {
                    Some(name) => resolve_zone(name).with_context(|| format!("--tz {name}"))?,
                    None => tz,
                };
                let now = Utc::now();
                let id = id.unwrap_or_else(|| format!("t-{}", now.timestamp_millis()));
                let mut task = Task::new(id.clone(), title, now);
                if let Some(due) = due {
                    let at = parse_local_due_to_utc(&due, zone)
                        .with_context(|| format!("--due {due}"))?;
                    task = task.with_due(at);
                }
                if let Some(reminder) = reminder {
                    let at = parse_local_due_to_utc(&reminder, zone)
                        .with_context(|| format!("--reminder {reminder}"))?;
                    task = task.with_reminder(at);
                }
                if let Some(category) = category {
                    let known = store.load()?.categories.iter().any(|c| c.id == category);
                    if !known {
                        tracing::warn!(%category, "category not in store, task will list as uncategorized");
                    }
                    task = task.with_category(category);
                }
                let m = store.add_task(task)?;
                println!("Added {id} (store v{})", m.version);
            }
            TaskCommand::Done { id } => {
                let m = store.toggle_completion(&id, Utc::now())?;
                println!("Toggled {id} (store v{})", m.version);
            }
            TaskCommand::Remove { id } => {
                let m = store.remove_task(&id)?;
                println!("Removed {id} (store v{})", m.version);
            }
        },

        Command::Category { command } => match command {
            CategoryCommand::Add {
                id,
                name,
                hierarchy,
            } => {
                if simplr_core::HierarchyLevel::from_name(&hierarchy).is_none() {
                    tracing::warn!(%hierarchy, "unknown hierarchy name, category ranks last");
                }
                let m = store.upsert_category(Category::new(id.clone(), name, hierarchy))?;
                println!("Saved category {id} (store v{})", m.version);
            }
        },

        Command::Companion { command } => match command {
            CompanionCommand::Watch {
                interval_secs,
                ticks,
            } => {
                let mut section = cfg.companion.clone();
                if let Some(secs) = interval_secs {
                    section.refresh_secs = secs;
                }
                companion::watch(&facade, &store, &prefs, &section, tz, ticks).await?;
            }
        },

        Command::Cache { command } => match command {
            CacheCommand::Stats { pressure } => {
                let snapshot = store.snapshot()?;
                for option in SortOption::ALL {
                    facade.ordered_groups(&snapshot, option);
                    facade.ordered_groups(&snapshot, option);
                }
                for filter in [TaskFilter::Overdue, TaskFilter::Pending, TaskFilter::Active] {
                    facade.aggregate_count(&snapshot, &filter);
                }
                for c in &snapshot.categories {
                    facade.category_tasks(&snapshot, Some(&c.id), load_sort_option(&prefs));
                }
                if let Some(tier) = pressure {
                    let dropped = facade.report_memory_pressure(tier);
                    println!("Reported {tier:?} pressure: dropped {dropped} entries");
                }
                println!("{}", serde_json::to_string_pretty(&facade.stats())?);
            }
        },
    }

    Ok(())
}
