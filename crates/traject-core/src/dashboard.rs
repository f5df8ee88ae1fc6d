//! Dashboard aggregation: summary counts, status distribution, and the
//! prioritized alert feed, computed synchronously over a full roster
//! snapshot. Everything here is pure given the snapshot and `now`.
//!
//! Individual malformed records never fail a pass — a student without
//! contact events is simply treated as infinitely stale. The only failure
//! mode is a student whose category has no workflow definition, which would
//! corrupt the stage-ordering invariant and therefore surfaces as
//! `UnknownCategory`.

use crate::error::Result;
use crate::student::Student;
use crate::types::{Severity, Tone};
use crate::workflow::WorkflowConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Days without contact after which a student needs supervisor action.
pub const STALE_CONTACT_DAYS: i64 = 14;

/// Deadlines due within this many days (or overdue) are urgent.
pub const URGENT_DEADLINE_DAYS: i64 = 7;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One bar of the status-distribution chart. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartBucket {
    pub label: String,
    pub count: usize,
    /// Share of the active+archived union, in `0.0..=1.0`.
    pub fraction: f64,
    pub tone: Tone,
}

/// One operational alert. Regenerated on every pass, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub message: String,
    pub description: String,
    pub severity: Severity,
    pub student_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub active_count: usize,
    pub needs_action_count: usize,
    pub in_review_count: usize,
    pub completed_this_month: usize,
    pub status_distribution: Vec<ChartBucket>,
    pub alerts: Vec<Alert>,
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Compute the full dashboard from disjoint active/archived snapshots.
pub fn aggregate(
    active: &[Student],
    archived: &[Student],
    config: &WorkflowConfig,
    now: DateTime<Utc>,
) -> Result<Dashboard> {
    let needs_action_count = active.iter().filter(|s| is_stale(s, now)).count();

    let mut in_review_count = 0;
    for student in active {
        let def = config.definition_for(&student.category)?;
        if def.is_review(&student.status) {
            in_review_count += 1;
        }
    }

    let completed_this_month = archived
        .iter()
        .filter(|s| s.archived_in_month_of(now))
        .count();

    let dashboard = Dashboard {
        active_count: active.len(),
        needs_action_count,
        in_review_count,
        completed_this_month,
        status_distribution: status_distribution(active, archived, config)?,
        alerts: alerts(active, config, now)?,
    };
    tracing::debug!(
        active = dashboard.active_count,
        needs_action = dashboard.needs_action_count,
        alerts = dashboard.alerts.len(),
        "dashboard aggregated"
    );
    Ok(dashboard)
}

/// No contact on record, or the latest contact older than 14 days.
pub fn is_stale(student: &Student, now: DateTime<Utc>) -> bool {
    match student.last_contact() {
        Some(contact) => (now - contact.at).num_days() > STALE_CONTACT_DAYS,
        None => true,
    }
}

/// Group the active+archived union by status. Buckets are ordered by
/// descending count, equal counts by label so output is deterministic. An
/// empty union yields an empty list rather than a division by zero.
pub fn status_distribution(
    active: &[Student],
    archived: &[Student],
    config: &WorkflowConfig,
) -> Result<Vec<ChartBucket>> {
    let union: Vec<&Student> = active.iter().chain(archived.iter()).collect();
    if union.is_empty() {
        return Ok(Vec::new());
    }
    let total = union.len() as f64;

    // status key → (count, label, tone)
    let mut groups: BTreeMap<&str, (usize, String, Tone)> = BTreeMap::new();
    for student in &union {
        let def = config.definition_for(&student.category)?;
        let entry = groups.entry(student.status.as_str()).or_insert_with(|| {
            let label = def
                .stage(&student.status)
                .map(|s| s.label.clone())
                .unwrap_or_else(|| student.status.clone());
            (0, label, def.tone_for(&student.status))
        });
        entry.0 += 1;
    }

    let mut buckets: Vec<ChartBucket> = groups
        .into_values()
        .map(|(count, label, tone)| ChartBucket {
            label,
            count,
            fraction: count as f64 / total,
            tone,
        })
        .collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    Ok(buckets)
}

/// Generate the alert feed for the active roster.
///
/// Per student, in roster order, every matching rule fires: urgent deadline
/// (danger), stalled intake (warning), awaiting review (info). The final
/// list is stably sorted by tier, so insertion order survives within each
/// tier.
pub fn alerts(
    active: &[Student],
    config: &WorkflowConfig,
    now: DateTime<Utc>,
) -> Result<Vec<Alert>> {
    let today = now.date_naive();
    let mut alerts = Vec::new();

    for student in active {
        let def = config.definition_for(&student.category)?;

        // 1. Urgent deadline: the earliest-due incomplete deadline within
        //    the urgency window, overdue included.
        let urgent = student
            .deadlines
            .iter()
            .filter(|d| !d.completed && d.days_until(today) <= URGENT_DEADLINE_DAYS)
            .min_by_key(|d| d.due);
        if let Some(deadline) = urgent {
            let days = deadline.days_until(today);
            let when = if days < 0 {
                format!("{} days overdue", -days)
            } else {
                format!("{days} days left")
            };
            alerts.push(Alert {
                message: format!("Urgent deadline: {}", student.name()),
                description: format!("{} ({when})", deadline.title),
                severity: Severity::Danger,
                student_id: student.id,
            });
        }

        // 2. Stalled intake: still at the first stage with no contact for
        //    over two weeks. Creation date stands in when no contact exists.
        let first_stage = def.first();
        if first_stage.map(|s| s.key == student.status).unwrap_or(false) {
            let since = student
                .last_contact()
                .map(|c| c.at)
                .unwrap_or(student.created_at);
            let days_quiet = (now - since).num_days();
            if days_quiet > STALE_CONTACT_DAYS {
                let label = first_stage.map(|s| s.label.as_str()).unwrap_or_default();
                alerts.push(Alert {
                    message: format!("Action required: {}", student.name()),
                    description: format!(
                        "At '{label}' for {days_quiet} days without contact."
                    ),
                    severity: Severity::Warning,
                    student_id: student.id,
                });
            }
        }

        // 3. Awaiting review.
        if def.is_review(&student.status) {
            let label = def
                .stage(&student.status)
                .map(|s| s.label.clone())
                .unwrap_or_else(|| student.status.clone());
            alerts.push(Alert {
                message: format!("In review: {}", student.name()),
                description: format!("Awaiting assessment of '{label}'"),
                severity: Severity::Info,
                student_id: student.id,
            });
        }
    }

    // Stable: equal-tier alerts keep roster insertion order.
    alerts.sort_by_key(|a| a.severity);
    Ok(alerts)
}

// ---------------------------------------------------------------------------
// Roster filters
// ---------------------------------------------------------------------------

/// Dashboard stat tiles double as roster filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatFilter {
    NeedsAction,
    InReview,
    CompletedThisMonth,
}

/// Select the students a stat tile refers to.
pub fn filter_roster<'a>(
    roster: &'a [Student],
    filter: StatFilter,
    config: &WorkflowConfig,
    now: DateTime<Utc>,
) -> Result<Vec<&'a Student>> {
    let mut out = Vec::new();
    for student in roster {
        let keep = match filter {
            StatFilter::NeedsAction => is_stale(student, now),
            StatFilter::InReview => config
                .definition_for(&student.category)?
                .is_review(&student.status),
            StatFilter::CompletedThisMonth => student.archived_in_month_of(now),
        };
        if keep {
            out.push(student);
        }
    }
    Ok(out)
}

/// Case-insensitive substring search over name and organization.
pub fn search_roster<'a>(roster: &'a [Student], query: &str) -> Vec<&'a Student> {
    let needle = query.to_lowercase();
    roster
        .iter()
        .filter(|s| {
            s.name().to_lowercase().contains(&needle)
                || s.organization.to_lowercase().contains(&needle)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
