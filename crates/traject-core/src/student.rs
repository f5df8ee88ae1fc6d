use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// StepRecord
// ---------------------------------------------------------------------------

/// Persisted completion state for one (student, stage) pair. At most one
/// record exists per stage key; `Student::upsert_step` enforces this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub stage_key: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// ContactEvent
// ---------------------------------------------------------------------------

/// One logged contact moment (email, call, visit). Read-only input to the
/// dashboard's staleness checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactEvent {
    pub at: DateTime<Utc>,
    pub kind: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deadline {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    pub due: NaiveDate,
    pub completed: bool,
}

impl Deadline {
    /// Signed day count until the due date; negative when overdue.
    pub fn days_until(&self, today: NaiveDate) -> i64 {
        (self.due - today).num_days()
    }

    pub fn is_urgent(&self, today: NaiveDate) -> bool {
        !self.completed && self.days_until(today) <= 7
    }
}

// ---------------------------------------------------------------------------
// Student
// ---------------------------------------------------------------------------

/// One person moving through a supervision pipeline. Never deleted, only
/// archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    #[serde(default)]
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_number: Option<String>,
    /// Workflow category key, e.g. "placement" or "thesis".
    pub category: String,
    /// Supervisor's role toward this student.
    #[serde(default)]
    pub role: String,
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Current stage key. Always derivable from `steps`; kept in sync by
    /// the progress synchronizer.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub contacts: Vec<ContactEvent>,
    #[serde(default)]
    pub deadlines: Vec<Deadline>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl Student {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        category: impl Into<String>,
        organization: impl Into<String>,
        initial_status: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: None,
            phone: None,
            student_number: None,
            category: category.into(),
            role: String::new(),
            organization: organization.into(),
            location: None,
            start_date,
            end_date,
            status: initial_status.into(),
            notes: None,
            archived: false,
            archived_at: None,
            created_at: now,
            contacts: Vec::new(),
            deadlines: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// "Last, First" display name.
    pub fn name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }

    /// Placeholder rows with no name at all are excluded from rosters.
    pub fn is_blank(&self) -> bool {
        self.first_name.trim().is_empty() && self.last_name.trim().is_empty()
    }

    // -----------------------------------------------------------------------
    // Step records
    // -----------------------------------------------------------------------

    pub fn step(&self, stage_key: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.stage_key == stage_key)
    }

    /// Insert or update the record for `stage_key`, keeping at most one
    /// record per stage.
    pub fn upsert_step(
        &mut self,
        stage_key: &str,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) {
        match self.steps.iter_mut().find(|s| s.stage_key == stage_key) {
            Some(step) => {
                step.completed = completed;
                step.completed_at = completed_at;
            }
            None => self.steps.push(StepRecord {
                stage_key: stage_key.to_string(),
                completed,
                completed_at,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Contacts and deadlines
    // -----------------------------------------------------------------------

    /// Most recent contact event by timestamp, if any.
    pub fn last_contact(&self) -> Option<&ContactEvent> {
        self.contacts.iter().max_by_key(|c| c.at)
    }

    pub fn add_contact(&mut self, at: DateTime<Utc>, kind: impl Into<String>, content: impl Into<String>) {
        self.contacts.push(ContactEvent {
            at,
            kind: kind.into(),
            content: content.into(),
        });
    }

    pub fn add_deadline(&mut self, title: impl Into<String>, due: NaiveDate) {
        self.deadlines.push(Deadline {
            id: 0,
            title: title.into(),
            due,
            completed: false,
        });
    }

    pub fn has_urgent_deadline(&self, today: NaiveDate) -> bool {
        self.deadlines.iter().any(|d| d.is_urgent(today))
    }

    // -----------------------------------------------------------------------
    // Archival
    // -----------------------------------------------------------------------

    /// Archive or restore. Archiving stamps `archived_at` and forces the
    /// status to `terminal_status` (the pipeline's completion stage);
    /// restoring clears the timestamp and leaves the status as-is.
    pub fn set_archived(&mut self, archived: bool, now: DateTime<Utc>, terminal_status: &str) {
        self.archived = archived;
        if archived {
            self.archived_at = Some(now);
            self.status = terminal_status.to_string();
        } else {
            self.archived_at = None;
        }
    }

    /// True when this student was archived in the calendar month of `now`.
    pub fn archived_in_month_of(&self, now: DateTime<Utc>) -> bool {
        self.archived_at
            .map(|at| at.year() == now.year() && at.month() == now.month())
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
