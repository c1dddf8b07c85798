//! Read-side helpers over already-fetched tasks. Nothing here touches the
//! store.

use std::cmp::Ordering;

use jiff::Timestamp;
use jiff::civil::Date;
use jiff::tz::TimeZone;
use uuid::Uuid;

use crate::models::{category::Category, task::Task};

pub fn active(tasks: &[Task]) -> Vec<&Task> {
    tasks.iter().filter(|t| !t.is_completed()).collect()
}

/// Completed tasks, most recently completed first.
pub fn completed(tasks: &[Task]) -> Vec<&Task> {
    let mut done: Vec<&Task> = tasks.iter().filter(|t| t.is_completed()).collect();
    done.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    done
}

/// Active tasks whose deadline falls on or before `today`.
pub fn due_today(tasks: &[Task], today: Date) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|t| !t.is_completed())
        .filter(|t| t.deadline.is_some_and(|d| d.date <= today))
        .collect()
}

/// Earliest deadline first, tasks without a deadline last, then `order`.
pub fn sort_for_display(tasks: &mut [&Task], tz: &TimeZone) {
    tasks.sort_by(|a, b| {
        let deadline_a = a.deadline.and_then(|d| d.expires_at(tz));
        let deadline_b = b.deadline.and_then(|d| d.expires_at(tz));
        let by_deadline = match (deadline_a, deadline_b) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_deadline.then(a.order.cmp(&b.order))
    });
}

#[derive(Debug)]
pub struct CategoryGroup<'a> {
    /// `None` for the uncategorized group
    pub category: Option<&'a Category>,
    pub tasks: Vec<&'a Task>,
}

/// Uncategorized tasks first, then one group per category by `order`. A task
/// pointing at a category that no longer exists counts as uncategorized.
/// Task order inside each group is kept.
pub fn group_by_category<'a>(
    tasks: &[&'a Task],
    categories: &'a [Category],
) -> Vec<CategoryGroup<'a>> {
    let mut sorted: Vec<&Category> = categories.iter().collect();
    sorted.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));

    let known = |id: Uuid| categories.iter().any(|c| c.id == id);

    let mut groups = vec![CategoryGroup {
        category: None,
        tasks: tasks
            .iter()
            .copied()
            .filter(|t| !t.category_id.is_some_and(known))
            .collect(),
    }];
    for category in sorted {
        groups.push(CategoryGroup {
            category: Some(category),
            tasks: tasks
                .iter()
                .copied()
                .filter(|t| t.category_id == Some(category.id))
                .collect(),
        });
    }
    groups
}

/// `order` for a task appended to the end of a category's group.
pub fn next_order(tasks: &[Task], category_id: Option<Uuid>) -> i64 {
    tasks
        .iter()
        .filter(|t| !t.is_completed() && t.category_id == category_id)
        .map(|t| t.order.saturating_add(1))
        .max()
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub target: f64,
    pub elapsed: f64,
}

impl Totals {
    /// Positive when more time went in than was budgeted.
    pub fn difference(&self) -> f64 {
        self.elapsed - self.target
    }
}

/// Sum of budgets and of live elapsed minutes.
pub fn totals(tasks: &[&Task], now: Timestamp) -> Totals {
    tasks.iter().fold(Totals::default(), |acc, t| Totals {
        target: acc.target + t.target_time.unwrap_or(0.0),
        elapsed: acc.elapsed + t.live_elapsed(now),
    })
}
