//! Progress synchronizer: keeps a student's single `status` field and its
//! per-stage step records consistent under edits from either direction.
//!
//! Both operations are explicit transitions from (status, step records) to a
//! new pair, with a no-op guard on equal input instead of event-suppression
//! flags. Both are safely re-runnable; recovery from a failed persist is an
//! idempotent resync on the next call.

use crate::error::{Result, TrajectError};
use crate::store::RosterStore;
use crate::student::{StepRecord, Student};
use crate::workflow::WorkflowDefinition;
use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Status → steps
// ---------------------------------------------------------------------------

/// Declare the student to be at stage `new_status` and resync every step
/// record to the monotonic prefix up to that stage.
///
/// Completion timestamps are only touched on an actual transition: a stage
/// that was already completed keeps its original timestamp, a stage that
/// becomes incomplete loses it.
pub fn apply_status(
    store: &dyn RosterStore,
    student: &mut Student,
    def: &WorkflowDefinition,
    new_status: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    if student.status == new_status {
        return Ok(());
    }
    let target = def
        .position(new_status)
        .ok_or_else(|| TrajectError::InvalidStage(new_status.to_string()))?;

    tracing::debug!(
        student = student.id,
        from = %student.status,
        to = new_status,
        "status change, resyncing steps"
    );
    student.status = new_status.to_string();

    for (pos, stage) in def.stages().iter().enumerate() {
        let completed = pos <= target;
        let completed_at = if completed {
            match student.step(&stage.key) {
                Some(existing) if existing.completed => existing.completed_at,
                _ => Some(now),
            }
        } else {
            None
        };
        student.upsert_step(&stage.key, completed, completed_at);
        store.upsert_step(student.id, &stage.key, completed, completed_at)?;
    }

    store.persist_student(student)
}

// ---------------------------------------------------------------------------
// Steps → status
// ---------------------------------------------------------------------------

/// Tick or untick one stage's checkbox, then re-derive the status.
///
/// Any completion vector is permitted here, including non-monotonic ones;
/// the status becomes the highest-ordered completed stage regardless. The
/// student row is only persisted when the derived status actually differs.
pub fn apply_step_toggle(
    store: &dyn RosterStore,
    student: &mut Student,
    def: &WorkflowDefinition,
    stage_key: &str,
    completed: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    if !def.contains(stage_key) {
        return Err(TrajectError::InvalidStage(stage_key.to_string()));
    }

    let completed_at = completed.then_some(now);
    student.upsert_step(stage_key, completed, completed_at);
    store.upsert_step(student.id, stage_key, completed, completed_at)?;

    let derived = derive_status(def, &student.steps);
    if student.status != derived {
        tracing::debug!(
            student = student.id,
            from = %student.status,
            to = %derived,
            "status re-derived from steps"
        );
        student.status = derived.to_string();
        store.persist_student(student)?;
    }
    Ok(())
}

/// Status derived from a completion vector: the key of the highest-ordered
/// completed stage, or the first stage when nothing is completed.
///
/// Deliberately not "first incomplete" — it reflects actual completed work,
/// so ticking stage 4 without 1–3 still advances the status to stage 4.
pub fn derive_status<'a>(def: &'a WorkflowDefinition, steps: &[StepRecord]) -> &'a str {
    let mut highest = def.first().map(|s| s.key.as_str()).unwrap_or_default();
    for stage in def.stages() {
        let done = steps
            .iter()
            .any(|r| r.stage_key == stage.key && r.completed);
        if done {
            highest = &stage.key;
        }
    }
    highest
}

// ---------------------------------------------------------------------------
// Display view
// ---------------------------------------------------------------------------

/// One row of the workflow checklist as shown to the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub struct StepItem {
    pub key: String,
    pub label: String,
    pub completed: bool,
    /// First incomplete stage in order. Never persisted; recomputed every
    /// time the list is rebuilt.
    pub current: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Build the checklist view for a student's steps. The first incomplete
/// stage is marked current; a fully completed pipeline has no current stage.
pub fn step_items(def: &WorkflowDefinition, steps: &[StepRecord]) -> Vec<StepItem> {
    let mut found_current = false;
    def.stages()
        .iter()
        .map(|stage| {
            let record = steps.iter().find(|r| r.stage_key == stage.key);
            let completed = record.map(|r| r.completed).unwrap_or(false);
            let current = !completed && !found_current;
            if current {
                found_current = true;
            }
            StepItem {
                key: stage.key.clone(),
                label: stage.label.clone(),
                completed,
                current,
                completed_at: record.and_then(|r| r.completed_at),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{default_definition, Stage, WorkflowDefinition};
    use chrono::{NaiveDate, TimeZone};
    use std::cell::RefCell;

    /// In-memory store double that records every persistence call, so the
    /// no-op and only-when-changed properties are assertable.
    #[derive(Default)]
    struct RecordingStore {
        step_writes: RefCell<Vec<(String, bool)>>,
        student_writes: RefCell<u32>,
    }

    impl RosterStore for RecordingStore {
        fn load_active(&self) -> Result<Vec<Student>> {
            Ok(Vec::new())
        }
        fn load_archived(&self) -> Result<Vec<Student>> {
            Ok(Vec::new())
        }
        fn persist_student(&self, _student: &Student) -> Result<()> {
            *self.student_writes.borrow_mut() += 1;
            Ok(())
        }
        fn upsert_step(
            &self,
            _student_id: i64,
            stage_key: &str,
            completed: bool,
            _completed_at: Option<DateTime<Utc>>,
        ) -> Result<()> {
            self.step_writes
                .borrow_mut()
                .push((stage_key.to_string(), completed));
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    fn student() -> Student {
        Student::new(
            "Fatima",
            "Janssen",
            "placement",
            "Acme BV",
            "intake",
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            now(),
        )
    }

    fn abcd() -> WorkflowDefinition {
        WorkflowDefinition::new(vec![
            Stage::new("a", "A"),
            Stage::new("b", "B"),
            Stage::new("c", "C"),
            Stage::new("d", "D"),
        ])
    }

    fn completion_vector(def: &WorkflowDefinition, s: &Student) -> Vec<bool> {
        def.stages()
            .iter()
            .map(|stage| s.step(&stage.key).map(|r| r.completed).unwrap_or(false))
            .collect()
    }

    #[test]
    fn apply_status_yields_monotonic_prefix() {
        let def = default_definition();
        let store = RecordingStore::default();
        let mut s = student();

        apply_status(&store, &mut s, &def, "second_draft", now()).unwrap();

        assert_eq!(s.status, "second_draft");
        assert_eq!(
            completion_vector(&def, &s),
            vec![true, true, true, true, false, false, false]
        );
        // One step write per stage plus one student write.
        assert_eq!(store.step_writes.borrow().len(), def.len());
        assert_eq!(*store.student_writes.borrow(), 1);
    }

    #[test]
    fn apply_status_equal_value_is_noop() {
        let def = default_definition();
        let store = RecordingStore::default();
        let mut s = student();

        apply_status(&store, &mut s, &def, "intake", now()).unwrap();

        assert!(s.steps.is_empty());
        assert!(store.step_writes.borrow().is_empty());
        assert_eq!(*store.student_writes.borrow(), 0);
    }

    #[test]
    fn apply_status_unknown_stage_fails() {
        let def = default_definition();
        let store = RecordingStore::default();
        let mut s = student();

        let err = apply_status(&store, &mut s, &def, "graduation", now()).unwrap_err();
        assert!(matches!(err, TrajectError::InvalidStage(k) if k == "graduation"));
        assert_eq!(s.status, "intake");
        assert!(store.step_writes.borrow().is_empty());
    }

    #[test]
    fn apply_status_backward_clears_timestamps() {
        let def = default_definition();
        let store = RecordingStore::default();
        let mut s = student();

        apply_status(&store, &mut s, &def, "final_version", now()).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap();
        apply_status(&store, &mut s, &def, "plan", later).unwrap();

        assert_eq!(
            completion_vector(&def, &s),
            vec![true, true, false, false, false, false, false]
        );
        assert!(s.step("first_draft").unwrap().completed_at.is_none());
        // Still-completed stages keep the timestamp of the original resync.
        assert_eq!(s.step("intake").unwrap().completed_at, Some(now()));
    }

    #[test]
    fn toggle_out_of_order_advances_status() {
        let def = abcd();
        let store = RecordingStore::default();
        let mut s = student();
        s.status = "a".to_string();

        // Tick C without A or B: status reflects completed work.
        apply_step_toggle(&store, &mut s, &def, "c", true, now()).unwrap();
        assert_eq!(s.status, "c");
        assert_eq!(completion_vector(&def, &s), vec![false, false, true, false]);
    }

    #[test]
    fn untick_current_stage_recomputes_backward() {
        let def = abcd();
        let store = RecordingStore::default();
        let mut s = student();
        s.status = "a".to_string();

        apply_status(&store, &mut s, &def, "c", now()).unwrap();
        apply_step_toggle(&store, &mut s, &def, "c", false, now()).unwrap();

        assert_eq!(s.status, "b");
        assert_eq!(completion_vector(&def, &s), vec![true, true, false, false]);
    }

    #[test]
    fn untick_everything_falls_back_to_first_stage() {
        let def = abcd();
        let store = RecordingStore::default();
        let mut s = student();
        s.status = "a".to_string();

        apply_step_toggle(&store, &mut s, &def, "a", true, now()).unwrap();
        apply_step_toggle(&store, &mut s, &def, "a", false, now()).unwrap();

        assert_eq!(s.status, "a");
        assert_eq!(completion_vector(&def, &s), vec![false, false, false, false]);
    }

    #[test]
    fn toggle_persists_student_only_on_status_change() {
        let def = abcd();
        let store = RecordingStore::default();
        let mut s = student();
        s.status = "a".to_string();

        // Ticking A leaves the derived status at "a": no student write.
        apply_step_toggle(&store, &mut s, &def, "a", true, now()).unwrap();
        assert_eq!(*store.student_writes.borrow(), 0);

        apply_step_toggle(&store, &mut s, &def, "b", true, now()).unwrap();
        assert_eq!(*store.student_writes.borrow(), 1);
    }

    #[test]
    fn toggle_unknown_stage_fails() {
        let def = abcd();
        let store = RecordingStore::default();
        let mut s = student();
        s.status = "a".to_string();

        let err = apply_step_toggle(&store, &mut s, &def, "z", true, now()).unwrap_err();
        assert!(matches!(err, TrajectError::InvalidStage(k) if k == "z"));
        assert!(s.steps.is_empty());
    }

    #[test]
    fn toggle_roundtrip_restores_flag() {
        let def = abcd();
        let store = RecordingStore::default();
        let mut s = student();
        s.status = "a".to_string();

        apply_step_toggle(&store, &mut s, &def, "b", true, now()).unwrap();
        let before = s.step("b").unwrap().completed;
        apply_step_toggle(&store, &mut s, &def, "b", false, now()).unwrap();
        apply_step_toggle(&store, &mut s, &def, "b", true, now()).unwrap();
        assert_eq!(s.step("b").unwrap().completed, before);
    }

    #[test]
    fn untick_mid_stage_keeps_highest_status() {
        let def = abcd();
        let store = RecordingStore::default();
        let mut s = student();
        s.status = "b".to_string();

        apply_status(&store, &mut s, &def, "d", now()).unwrap();
        assert_eq!(completion_vector(&def, &s), vec![true, true, true, true]);

        apply_step_toggle(&store, &mut s, &def, "b", false, now()).unwrap();
        assert_eq!(completion_vector(&def, &s), vec![true, false, true, true]);
        // Highest still-completed stage wins: status stays at "d".
        assert_eq!(s.status, "d");
    }

    #[test]
    fn derive_status_on_non_monotonic_vectors() {
        let def = abcd();
        let steps = vec![
            StepRecord {
                stage_key: "b".to_string(),
                completed: true,
                completed_at: None,
            },
            StepRecord {
                stage_key: "d".to_string(),
                completed: true,
                completed_at: None,
            },
        ];
        assert_eq!(derive_status(&def, &steps), "d");
        assert_eq!(derive_status(&def, &[]), "a");
    }

    #[test]
    fn step_items_marks_first_incomplete_as_current() {
        let def = abcd();
        let store = RecordingStore::default();
        let mut s = student();
        s.status = "a".to_string();
        apply_status(&store, &mut s, &def, "b", now()).unwrap();

        let items = step_items(&def, &s.steps);
        let current: Vec<_> = items.iter().filter(|i| i.current).map(|i| i.key.as_str()).collect();
        assert_eq!(current, vec!["c"]);
        assert!(items[0].completed && items[1].completed);
    }

    #[test]
    fn step_items_all_completed_has_no_current() {
        let def = abcd();
        let store = RecordingStore::default();
        let mut s = student();
        s.status = "a".to_string();
        apply_status(&store, &mut s, &def, "d", now()).unwrap();

        let items = step_items(&def, &s.steps);
        assert!(items.iter().all(|i| !i.current));
    }
}
