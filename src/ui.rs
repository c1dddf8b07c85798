use colored::*;
use jiff::civil::Date;
use jiff::tz::TimeZone;
use jiff::{Timestamp, Zoned};

use tdo_timer::{
    format::{format_budget, format_elapsed},
    models::{
        category::Category,
        task::{Deadline, DeadlineStatus, Task},
        timer::Timer,
    },
    validation::FieldErrors,
    views::Totals,
};

/// Get the terminal width, defaulting to 80 if unavailable
fn terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}

fn short_id(task: &Task) -> String {
    task.id.simple().to_string()[..8].to_string()
}

/// Status glyph: done, running, over budget, overdue, or idle
pub fn status_glyph(task: &Task, now: Timestamp, tz: &TimeZone) -> ColoredString {
    if task.is_completed() {
        "✓".dimmed()
    } else if task.is_running && task.is_over_target(now) {
        "▶".red().bold()
    } else if task.is_running {
        "▶".green().bold()
    } else if task
        .deadline
        .is_some_and(|d| d.status(now, tz) == DeadlineStatus::Expired)
    {
        "●".red()
    } else {
        "○".normal()
    }
}

/// "12m / 30m", or just the elapsed part when there's no budget.
fn time_summary(task: &Task, now: Timestamp) -> String {
    let elapsed = format_elapsed(task.live_elapsed(now));
    match task.target_time {
        Some(target) => format!("{elapsed} / {}", format_budget(target)),
        None => elapsed,
    }
}

/// Deadline text coloured by how close it is.
pub fn deadline_label(deadline: &Deadline, now: Timestamp, tz: &TimeZone) -> ColoredString {
    match deadline.status(now, tz) {
        DeadlineStatus::Expired => "expired".red().bold(),
        DeadlineStatus::DueToday => "due today".truecolor(255, 140, 0),
        DeadlineStatus::DueTomorrow => "due tomorrow".yellow(),
        DeadlineStatus::Later => {
            let mut text = format!("due {}", deadline.date.strftime("%b %d"));
            if let Some(time) = deadline.time {
                text.push_str(&format!(" {}", time.strftime("%H:%M")));
            }
            text.normal()
        }
    }
}

/// "Today", "Yesterday", or "Feb 15"
pub fn format_completion_date(completed_at: Timestamp, today: Date, tz: &TimeZone) -> String {
    let date = completed_at.to_zoned(tz.clone()).date();

    if date == today {
        "Today".to_string()
    } else if today.yesterday().is_ok_and(|yesterday| date == yesterday) {
        "Yesterday".to_string()
    } else {
        date.strftime("%b %d").to_string()
    }
}

fn print_aligned(left: &str, left_visible_len: usize, right: &str) {
    if right.is_empty() {
        println!("{left}");
        return;
    }

    let total_content = left_visible_len + right.chars().count();
    let width = terminal_width();
    if total_content + 4 < width {
        let padding = width - total_content - 2;
        println!("{}{}{}", left, " ".repeat(padding), right.dimmed());
    } else {
        println!("{left}");
    }
}

/// One task per line: id, glyph, title and time on the left, category on
/// the right. The deadline, if any, goes on a second line.
pub fn render_task_line(task: &Task, category: Option<&Category>, now: Timestamp, tz: &TimeZone) {
    let id = short_id(task);
    let glyph = status_glyph(task, now, tz);
    let time = time_summary(task, now);

    let left_plain = format!("  {id}  ○  {}  {time}", task.title);
    let time_colored = if task.is_over_target(now) {
        time.red()
    } else {
        time.dimmed()
    };
    let left = format!(
        "  {}  {}  {}  {}",
        id.dimmed(),
        glyph,
        task.title.bold(),
        time_colored
    );

    let right = category.map(|c| c.name.clone()).unwrap_or_default();
    print_aligned(&left, left_plain.chars().count(), &right);

    if let Some(deadline) = task.deadline {
        println!("{}{}", " ".repeat(15), deadline_label(&deadline, now, tz));
    }
}

/// Completed-task line with the completion date in front of the category.
pub fn render_completed_line(task: &Task, category: Option<&Category>, now: Timestamp, tz: &TimeZone) {
    let id = short_id(task);
    let time = time_summary(task, now);
    let left = format!("  {id}  ✓  {}  {time}", task.title);
    let visible = left.chars().count();

    let today = now.to_zoned(tz.clone()).date();
    let mut right = task
        .completed_at
        .map(|at| format_completion_date(at, today, tz))
        .unwrap_or_default();
    if let Some(category) = category {
        right = format!("{right}  ·  {}", category.name);
    }

    print_aligned(&left.dimmed().to_string(), visible, &right);
}

/// Render a view header with title and count
pub fn render_view_header(title: &str, count: usize) {
    let task_word = if count == 1 { "task" } else { "tasks" };
    println!("\n  {} ({} {})\n", title.cyan().bold(), count, task_word);
}

/// Render a section header (e.g., a category name)
pub fn render_section_header(title: &str) {
    println!("\n  ─── {} ───\n", title.bold());
}

pub fn render_totals(totals: &Totals) {
    let difference = totals.difference();
    let sign = if difference > 0.0 { "+" } else { "-" };
    let line = format!(
        "  target {}  ·  worked {}  ·  {}{}",
        format_budget(totals.target),
        format_elapsed(totals.elapsed),
        sign,
        format_elapsed(difference.abs())
    );
    if difference > 0.0 {
        println!("\n{}", line.red());
    } else {
        println!("\n{}", line.dimmed());
    }
}

/// Worked time against the daily goal, as a bar.
pub fn render_goal_progress(goal: f64, worked: f64) {
    if goal <= 0.0 {
        println!(
            "\n  worked {}  {}",
            format_elapsed(worked),
            "(no daily goal set)".dimmed()
        );
        return;
    }

    const BAR: usize = 20;
    let ratio = (worked / goal).clamp(0.0, 1.0);
    let filled = (ratio * BAR as f64).round() as usize;
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(BAR - filled));
    let bar = if worked >= goal { bar.green() } else { bar.cyan() };

    println!(
        "\n  {}  {} / {}  ({:.0}%)",
        bar,
        format_elapsed(worked),
        format_budget(goal),
        worked / goal * 100.0
    );
}

pub fn render_timer(title: &str, timer: &Timer, now: Timestamp) {
    let state = if timer.is_running {
        "running".green().bold()
    } else {
        "stopped".dimmed()
    };
    let elapsed = format_elapsed(timer.live_elapsed(now));
    let elapsed = if timer.is_over_target(now) {
        elapsed.red()
    } else {
        elapsed.normal()
    };

    match timer.target_time {
        Some(target) => println!("  {title}: {elapsed} / {} ({state})", format_budget(target)),
        None => println!("  {title}: {elapsed} ({state})"),
    }
}

pub fn render_task_details(task: &Task, category: Option<&Category>, now: Timestamp, tz: &TimeZone) {
    println!("\n  {} {}", status_glyph(task, now, tz), task.title.bold());
    println!("  {}", task.id.to_string().dimmed());

    if let Some(description) = &task.description {
        println!("\n  {description}");
    }
    println!();
    if let Some(category) = category {
        println!("  Category:  {}", category.name);
    }
    println!("  Time:      {}", time_summary(task, now));
    if let Some(remaining) = task.remaining(now) {
        if remaining >= 0.0 {
            println!("  Left:      {}", format_elapsed(remaining));
        } else {
            println!("  Over by:   {}", format_elapsed(-remaining).red());
        }
    }
    if let Some(deadline) = task.deadline {
        println!("  Deadline:  {}", deadline_label(&deadline, now, tz));
    }
    if let Some(completed_at) = task.completed_at {
        let today = now.to_zoned(tz.clone()).date();
        println!(
            "  Completed: {}",
            format_completion_date(completed_at, today, tz)
        );
    }
    println!(
        "  Created:   {}",
        Zoned::new(task.created_at, tz.clone()).strftime("%Y-%m-%d %H:%M")
    );
}

/// Field-by-field validation messages on stderr
pub fn render_field_errors(errors: &FieldErrors) {
    for (field, message) in errors.iter() {
        eprintln!("  {} {}", format!("{field}:").yellow(), message);
    }
}
