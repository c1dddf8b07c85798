use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::*;
use jiff::civil::{Date, Time};
use jiff::tz::TimeZone;
use log::{info, warn};
use thiserror::Error;
use uuid::Uuid;

use tdo_timer::{
    clock::Clock,
    config::{Config, DEFAULT_BACKUPS, DEFAULT_LOCK_TIMEOUT_MS, LOCK_TIMEOUT_ENV, STORE_PATH_ENV},
    format::{format_budget, format_elapsed},
    models::{category::Category, task::Deadline, task::Task},
    services::{
        categories::{CategoryError, CreateCategoryParameters, UpdateCategoryParameters},
        settings::SettingsError,
        tasks::{CreateTaskParameters, TaskError, UpdateTaskParameters},
        timer::TimerError,
    },
    storage::{StorageError, json::JsonFileStore},
    validation::FieldErrors,
    views,
    workspace::{Workspace, WorkspaceError},
};

mod ui;

#[derive(Parser)]
#[command(
    name = "tdo-timer",
    about = "Tasks with time budgets and a stopwatch, in your terminal"
)]
struct Cli {
    /// Path of the store file
    #[arg(long, global = true, env = STORE_PATH_ENV)]
    store: Option<PathBuf>,

    /// How long to wait for the store lock, in milliseconds
    #[arg(long, global = true, env = LOCK_TIMEOUT_ENV, default_value_t = DEFAULT_LOCK_TIMEOUT_MS)]
    lock_timeout_ms: u64,

    /// How many backups of the store file to keep
    #[arg(long, global = true, default_value_t = DEFAULT_BACKUPS)]
    backups: usize,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show active tasks grouped by category
    List {
        /// Only this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Show tasks due today (including overdue) and the daily goal
    Today,

    /// Show completed tasks
    Finished,

    /// Add a new task
    Add {
        /// Task title
        title: String,

        /// Free-form notes
        #[arg(short, long)]
        description: Option<String>,

        /// Category name
        #[arg(short, long)]
        category: Option<String>,

        /// Time budget (e.g. "45", "1h30m", "1:30")
        #[arg(short, long)]
        target: Option<String>,

        /// Deadline (e.g. "2025-03-01" or "2025-03-01 17:00")
        #[arg(long)]
        deadline: Option<String>,
    },

    /// Change a task
    Edit {
        /// Task id prefix or title
        task: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long, conflicts_with = "no_description")]
        description: Option<String>,

        #[arg(long)]
        no_description: bool,

        #[arg(short, long, conflicts_with = "no_category")]
        category: Option<String>,

        #[arg(long)]
        no_category: bool,

        #[arg(short, long, conflicts_with = "no_target")]
        target: Option<String>,

        #[arg(long)]
        no_target: bool,

        #[arg(long, conflicts_with = "no_deadline")]
        deadline: Option<String>,

        #[arg(long)]
        no_deadline: bool,

        /// Overwrite the accumulated time
        #[arg(long)]
        elapsed: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        order: Option<i64>,
    },

    /// Complete a task
    Done { task: String },

    /// Delete a task
    Rm { task: String },

    /// Put tasks in the given order
    Reorder {
        #[arg(required = true)]
        tasks: Vec<String>,
    },

    /// Start a task's timer
    Start { task: String },

    /// Stop a task's timer
    Stop { task: String },

    /// Set a task's timer back to zero
    Reset { task: String },

    /// Show one task in detail
    Show { task: String },

    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommands),

    /// Show or set the daily work-time goal (e.g. "4h", "3:30", "240")
    Goal { minutes: Option<String> },
}

#[derive(Debug, Subcommand)]
enum CategoryCommands {
    /// Create a new category
    New {
        name: String,
        #[arg(long)]
        color: Option<String>,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        order: i64,
    },
    /// List all categories
    List,
    /// Rename, recolor or move a category
    Edit {
        category: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        order: Option<i64>,
    },
    /// Delete a category; its tasks become uncategorized
    Rm { category: String },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Category(#[from] CategoryError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Task reference '{0}' is ambiguous")]
    AmbiguousTask(String, Vec<String>),

    #[error("Category '{0}' not found")]
    CategoryNotFound(String),

    #[error("Category name '{0}' is ambiguous")]
    AmbiguousCategory(String, Vec<String>),

    #[error("Invalid deadline '{0}'")]
    InvalidDeadline(String),

    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),
}

impl CliError {
    fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            CliError::Task(TaskError::Validation(errors))
            | CliError::Category(CategoryError::Validation(errors))
            | CliError::Settings(SettingsError::Validation(errors))
            | CliError::Workspace(WorkspaceError::Task(TaskError::Validation(errors)))
            | CliError::Workspace(WorkspaceError::Category(CategoryError::Validation(errors))) => {
                Some(errors)
            }
            _ => None,
        }
    }

    fn storage(&self) -> Option<&StorageError> {
        match self {
            CliError::Task(TaskError::Storage(e))
            | CliError::Category(CategoryError::Storage(e))
            | CliError::Timer(TimerError::Storage(e))
            | CliError::Settings(SettingsError::Storage(e))
            | CliError::Workspace(WorkspaceError::Task(TaskError::Storage(e)))
            | CliError::Workspace(WorkspaceError::Category(CategoryError::Storage(e))) => Some(e),
            _ => None,
        }
    }
}

type App = Workspace<JsonFileStore>;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = Config::new(cli.store, cli.lock_timeout_ms, cli.backups);
    if let Err(e) = config.ensure_data_dir() {
        eprintln!("Error: Failed to create data directory: {}", e);
        std::process::exit(1);
    }

    let store = JsonFileStore::from_config(&config);
    info!("opened store at {}", store.path().display());
    let app = Workspace::open(store);

    let command = cli.command.unwrap_or(Commands::List { category: None });
    if let Err(e) = run(&app, command) {
        report(&e);
        std::process::exit(1);
    }
}

fn report(error: &CliError) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    if let Some(errors) = error.field_errors() {
        ui::render_field_errors(errors);
    } else if let Some(storage) = error.storage()
        && storage.is_retryable()
    {
        eprintln!("\nThe store is busy or changed underneath us. Please retry.");
    }

    match error {
        CliError::AmbiguousTask(_, titles) => {
            eprintln!("\nMultiple tasks match:");
            for title in titles {
                eprintln!("  - {}", title);
            }
            eprintln!("\nPlease be more specific or use the task id.");
        }
        CliError::AmbiguousCategory(_, names) => {
            eprintln!("\nMultiple categories match:");
            for name in names {
                eprintln!("  - {}", name);
            }
        }
        CliError::InvalidDeadline(_) => {
            eprintln!("\nExpected format: YYYY-MM-DD, optionally followed by HH:MM");
        }
        CliError::InvalidDuration(_) => {
            eprintln!("\nExpected minutes (e.g. 45), 1h30m, or HH:MM");
        }
        _ => {}
    }
}

fn run(app: &App, command: Commands) -> Result<(), CliError> {
    let now = app.clock().now();
    let tz = TimeZone::system();

    match command {
        Commands::List { category } => {
            let tasks = app.list_tasks()?;
            let categories = app.list_categories()?;

            let only = category
                .map(|reference| resolve_category(&categories, &reference).map(|c| c.id))
                .transpose()?;

            let mut active: Vec<&Task> = views::active(&tasks)
                .into_iter()
                .filter(|t| only.is_none() || t.category_id == only)
                .collect();
            views::sort_for_display(&mut active, &tz);

            if active.is_empty() {
                println!("No active tasks");
                return Ok(());
            }

            ui::render_view_header("Tasks", active.len());
            for group in views::group_by_category(&active, &categories) {
                if group.tasks.is_empty() {
                    continue;
                }
                let title = group.category.map_or("Uncategorized", |c| c.name.as_str());
                ui::render_section_header(title);
                for task in &group.tasks {
                    ui::render_task_line(task, group.category, now, &tz);
                }
            }
            ui::render_totals(&views::totals(&active, now));
        }
        Commands::Today => {
            let today = now.to_zoned(tz.clone()).date();
            let tasks = app.list_tasks()?;
            let categories = app.list_categories()?;

            let mut due = views::due_today(&tasks, today);
            views::sort_for_display(&mut due, &tz);

            if due.is_empty() {
                println!("No tasks for today");
            } else {
                ui::render_view_header(&format!("Today ({})", today.strftime("%b %d")), due.len());
                for task in &due {
                    ui::render_task_line(task, category_of(task, &categories), now, &tz);
                }
            }

            let totals = views::totals(&due, now);
            if !due.is_empty() {
                ui::render_totals(&totals);
            }
            ui::render_goal_progress(app.work_time_goal()?, totals.elapsed);
        }
        Commands::Finished => {
            let tasks = app.list_tasks()?;
            let categories = app.list_categories()?;
            let done = views::completed(&tasks);

            if done.is_empty() {
                println!("No completed tasks");
            } else {
                ui::render_view_header("Finished", done.len());
                for task in &done {
                    ui::render_completed_line(task, category_of(task, &categories), now, &tz);
                }
                ui::render_totals(&views::totals(&done, now));
            }
        }
        Commands::Add {
            title,
            description,
            category,
            target,
            deadline,
        } => {
            let tasks = app.list_tasks()?;
            let categories = app.list_categories()?;

            let category_id = category
                .map(|reference| resolve_category(&categories, &reference).map(|c| c.id))
                .transpose()?;

            let params = CreateTaskParameters {
                title,
                description,
                category_id,
                target_time: target.as_deref().map(parse_minutes).transpose()?,
                deadline: deadline.as_deref().map(parse_deadline).transpose()?,
                order: views::next_order(&tasks, category_id),
            };

            let task = app.create_task(params)?;
            println!("✓ Task added: {}", task.title);
            println!("  {}", task.id.to_string().dimmed());
            if let Some(target) = task.target_time {
                println!("  Budget: {}", format_budget(target));
            }
        }
        Commands::Edit {
            task,
            title,
            description,
            no_description,
            category,
            no_category,
            target,
            no_target,
            deadline,
            no_deadline,
            elapsed,
            order,
        } => {
            let tasks = app.list_tasks()?;
            let id = resolve_task(&tasks, &task)?.id;

            let category_id = match (category, no_category) {
                (_, true) => Some(None),
                (Some(reference), false) => {
                    let categories = app.list_categories()?;
                    Some(Some(resolve_category(&categories, &reference)?.id))
                }
                (None, false) => None,
            };

            let params = UpdateTaskParameters {
                title,
                description: clearable(description, no_description),
                category_id,
                target_time: clearable(target.as_deref().map(parse_minutes).transpose()?, no_target),
                deadline: clearable(
                    deadline.as_deref().map(parse_deadline).transpose()?,
                    no_deadline,
                ),
                elapsed_time: elapsed.as_deref().map(parse_minutes).transpose()?,
                order,
            };

            let task = app.update_task(id, params)?;
            println!("✓ Task updated: {}", task.title);
        }
        Commands::Done { task } => {
            let tasks = app.list_tasks()?;
            let id = resolve_task(&tasks, &task)?.id;

            let task = app.complete_task(id)?;
            println!("✓ Task completed: {}", task.title);
            println!("  {}", format_elapsed(task.elapsed_time).dimmed());
        }
        Commands::Rm { task } => {
            let tasks = app.list_tasks()?;
            let found = resolve_task(&tasks, &task)?;

            app.delete_task(found.id)?;
            println!("✓ Task deleted: {}", found.title);
        }
        Commands::Reorder { tasks: references } => {
            let tasks = app.list_tasks()?;

            // Unknown full ids are passed through so the store can report them.
            let mut ids = Vec::with_capacity(references.len());
            for reference in &references {
                let id = match resolve_task(&tasks, reference) {
                    Ok(task) => task.id,
                    Err(CliError::TaskNotFound(_)) => reference
                        .trim()
                        .parse::<Uuid>()
                        .map_err(|_| CliError::TaskNotFound(reference.clone()))?,
                    Err(e) => return Err(e),
                };
                ids.push(id);
            }

            let outcome = app.reorder_tasks(&ids)?;
            println!("✓ Reordered {} task(s)", outcome.updated.len());
            for id in outcome.skipped {
                warn!("task {id} no longer exists");
                println!("  {} skipped {}", "!".yellow(), id);
            }
        }
        Commands::Start { task } => {
            let tasks = app.list_tasks()?;
            let found = resolve_task(&tasks, &task)?;

            let timer = app.start_timer(found.id)?;
            println!("▶ Timer started");
            ui::render_timer(&found.title, &timer, now);
        }
        Commands::Stop { task } => {
            let tasks = app.list_tasks()?;
            let found = resolve_task(&tasks, &task)?;

            let timer = app.stop_timer(found.id)?;
            println!("■ Timer stopped");
            ui::render_timer(&found.title, &timer, now);
        }
        Commands::Reset { task } => {
            let tasks = app.list_tasks()?;
            let found = resolve_task(&tasks, &task)?;

            let timer = app.reset_timer(found.id)?;
            println!("↺ Timer reset");
            ui::render_timer(&found.title, &timer, now);
        }
        Commands::Show { task } => {
            let tasks = app.list_tasks()?;
            let categories = app.list_categories()?;
            let found = resolve_task(&tasks, &task)?;

            let fresh = app.get_task(found.id)?;
            ui::render_task_details(&fresh, category_of(&fresh, &categories), now, &tz);
            println!();
            ui::render_timer("Timer", &app.get_timer(fresh.id)?, now);
        }
        Commands::Category(CategoryCommands::New { name, color, order }) => {
            let mut params = CreateCategoryParameters {
                name,
                order,
                ..CreateCategoryParameters::default()
            };
            if let Some(color) = color {
                params.color = color;
            }

            let category = app.create_category(params)?;
            println!("✓ Category {} created", category.name);
        }
        Commands::Category(CategoryCommands::List) => {
            let mut categories = app.list_categories()?;
            categories.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));

            if categories.is_empty() {
                println!("No categories");
            } else {
                let tasks = app.list_tasks()?;
                println!("\n  {}\n", "Categories".cyan().bold());
                for category in &categories {
                    let count = views::active(&tasks)
                        .iter()
                        .filter(|t| t.category_id == Some(category.id))
                        .count();
                    println!(
                        "  {}  {}  {}",
                        format!("{:>3}", category.order).dimmed(),
                        category.name.bold(),
                        format!("({} · {})", category.color, count).dimmed()
                    );
                }
            }
        }
        Commands::Category(CategoryCommands::Edit {
            category,
            name,
            color,
            order,
        }) => {
            let categories = app.list_categories()?;
            let id = resolve_category(&categories, &category)?.id;

            let category = app.update_category(id, UpdateCategoryParameters { name, color, order })?;
            println!("✓ Category updated: {}", category.name);
        }
        Commands::Category(CategoryCommands::Rm { category }) => {
            let categories = app.list_categories()?;
            let found = resolve_category(&categories, &category)?;

            let detached = app.delete_category(found.id)?;
            println!("✓ Category deleted: {}", found.name);
            if !detached.is_empty() {
                println!("  └─ {} task(s) moved to Uncategorized", detached.len());
            }
        }
        Commands::Goal { minutes: None } => {
            let goal = app.work_time_goal()?;
            if goal > 0.0 {
                println!("Daily goal: {}", format_budget(goal));
            } else {
                println!("No daily goal set");
            }
        }
        Commands::Goal {
            minutes: Some(value),
        } => {
            let goal = app.set_work_time_goal(parse_minutes(&value)?)?;
            println!("✓ Daily goal set to {}", format_budget(goal));
        }
    }

    Ok(())
}

fn clearable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear { Some(None) } else { value.map(Some) }
}

fn category_of<'a>(task: &Task, categories: &'a [Category]) -> Option<&'a Category> {
    task.category_id
        .and_then(|id| categories.iter().find(|c| c.id == id))
}

/// Full id, id prefix, or a case-insensitive piece of the title.
fn resolve_task<'a>(tasks: &'a [Task], reference: &str) -> Result<&'a Task, CliError> {
    let needle = reference.trim().to_lowercase();
    if needle.is_empty() {
        return Err(CliError::TaskNotFound(reference.to_string()));
    }

    if let Ok(id) = needle.parse::<Uuid>() {
        return tasks
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| CliError::TaskNotFound(reference.to_string()));
    }

    let by_id: Vec<&Task> = tasks
        .iter()
        .filter(|t| {
            t.id.simple().to_string().starts_with(&needle)
                || t.id.to_string().starts_with(&needle)
        })
        .collect();
    let matches = if by_id.is_empty() {
        let exact: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.title.to_lowercase() == needle)
            .collect();
        if exact.is_empty() {
            tasks
                .iter()
                .filter(|t| t.title.to_lowercase().contains(&needle))
                .collect()
        } else {
            exact
        }
    } else {
        by_id
    };

    match matches.as_slice() {
        [] => Err(CliError::TaskNotFound(reference.to_string())),
        [task] => Ok(*task),
        many => Err(CliError::AmbiguousTask(
            reference.to_string(),
            many.iter().map(|t| t.title.clone()).collect(),
        )),
    }
}

fn resolve_category<'a>(
    categories: &'a [Category],
    reference: &str,
) -> Result<&'a Category, CliError> {
    if let Ok(id) = reference.trim().parse::<Uuid>()
        && let Some(category) = categories.iter().find(|c| c.id == id)
    {
        return Ok(category);
    }

    let needle = reference.trim().to_lowercase();
    let matches: Vec<&Category> = categories
        .iter()
        .filter(|c| c.name.to_lowercase() == needle)
        .collect();

    match matches.as_slice() {
        [] => Err(CliError::CategoryNotFound(reference.to_string())),
        [category] => Ok(*category),
        many => Err(CliError::AmbiguousCategory(
            reference.to_string(),
            many.iter().map(|c| c.name.clone()).collect(),
        )),
    }
}

/// "45", "1.5", "1h30m", "2h", "90m" or "1:30".
fn parse_minutes(input: &str) -> Result<f64, CliError> {
    let invalid = || CliError::InvalidDuration(input.to_string());
    let value = input.trim().to_lowercase();

    if let Some((hours, minutes)) = value.split_once(':') {
        let hours: u32 = hours.parse().map_err(|_| invalid())?;
        let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
        if minutes >= 60 {
            return Err(invalid());
        }
        let total = hours
            .checked_mul(60)
            .and_then(|m| m.checked_add(minutes))
            .ok_or_else(invalid)?;
        return Ok(f64::from(total));
    }

    if value.ends_with('h') || value.ends_with('m') {
        let (hours, rest) = match value.split_once('h') {
            Some((hours, rest)) => (hours.parse::<f64>().map_err(|_| invalid())?, rest),
            None => (0.0, value.as_str()),
        };
        let minutes = match rest.strip_suffix('m') {
            Some(minutes) => minutes.parse::<f64>().map_err(|_| invalid())?,
            None if rest.is_empty() => 0.0,
            None => return Err(invalid()),
        };
        return Ok(hours * 60.0 + minutes);
    }

    // Negative or non-finite plain numbers are left to validation.
    value.parse::<f64>().map_err(|_| invalid())
}

/// "2025-03-01", "2025-03-01 17:00" or "2025-03-01T17:00".
fn parse_deadline(input: &str) -> Result<Deadline, CliError> {
    let invalid = || CliError::InvalidDeadline(input.to_string());
    let value = input.trim();

    let (date, time) = match value.split_once(['T', ' ']) {
        Some((date, time)) => (date, Some(time.trim())),
        None => (value, None),
    };

    let date: Date = date.parse().map_err(|_| invalid())?;
    let time = time
        .map(|t| t.parse::<Time>().map_err(|_| invalid()))
        .transpose()?;

    Ok(Deadline::new(date, time))
}

#[cfg(test)]
mod tests {
    use jiff::civil::{date, time};

    use super::*;

    #[test]
    fn test_parse_minutes_formats() {
        assert_eq!(parse_minutes("45").unwrap(), 45.0);
        assert_eq!(parse_minutes("1.5").unwrap(), 1.5);
        assert_eq!(parse_minutes("1h30m").unwrap(), 90.0);
        assert_eq!(parse_minutes("2h").unwrap(), 120.0);
        assert_eq!(parse_minutes("90m").unwrap(), 90.0);
        assert_eq!(parse_minutes("1:30").unwrap(), 90.0);
        assert!(parse_minutes("1:75").is_err());
        assert!(matches!(
            parse_minutes("4294967295:00"),
            Err(CliError::InvalidDuration(_))
        ));
        assert!(parse_minutes("soon").is_err());
    }

    #[test]
    fn test_parse_deadline_formats() {
        assert_eq!(
            parse_deadline("2025-03-01").unwrap(),
            Deadline::new(date(2025, 3, 1), None)
        );
        assert_eq!(
            parse_deadline("2025-03-01 17:00").unwrap(),
            Deadline::new(date(2025, 3, 1), Some(time(17, 0, 0, 0)))
        );
        assert_eq!(
            parse_deadline("2025-03-01T09:15").unwrap(),
            Deadline::new(date(2025, 3, 1), Some(time(9, 15, 0, 0)))
        );
        assert!(parse_deadline("tomorrow").is_err());
    }

    fn task(title: &str) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            ..Task::default()
        }
    }

    #[test]
    fn test_resolve_task_by_prefix_and_title() {
        let tasks = vec![task("Write report"), task("Review report"), task("Write")];

        let prefix = tasks[0].id.simple().to_string()[..8].to_string();
        assert_eq!(resolve_task(&tasks, &prefix).unwrap().id, tasks[0].id);
        assert_eq!(resolve_task(&tasks, "review").unwrap().id, tasks[1].id);
        // An exact title beats substring matches.
        assert_eq!(resolve_task(&tasks, "write").unwrap().id, tasks[2].id);
        assert!(matches!(
            resolve_task(&tasks, "report"),
            Err(CliError::AmbiguousTask(_, titles)) if titles.len() == 2
        ));
        assert!(matches!(
            resolve_task(&tasks, &Uuid::new_v4().to_string()),
            Err(CliError::TaskNotFound(_))
        ));
    }

    #[test]
    fn test_clearable() {
        assert_eq!(clearable(Some(1), false), Some(Some(1)));
        assert_eq!(clearable(Some(1), true), Some(None));
        assert_eq!(clearable::<i32>(None, false), None);
    }
}
