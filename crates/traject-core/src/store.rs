//! Roster persistence.
//!
//! The engine only ever talks to the [`RosterStore`] trait; [`SqliteStore`]
//! is the shipped implementation. Contact events, deadlines, and step
//! records are loaded eagerly with each student so synchronization and
//! aggregation run over a complete in-memory snapshot.

use crate::error::{Result, TrajectError};
use crate::student::{ContactEvent, Deadline, StepRecord, Student};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

// ---------------------------------------------------------------------------
// RosterStore
// ---------------------------------------------------------------------------

/// Persistence boundary for the roster. Implementations must keep at most
/// one step record per (student, stage key) pair.
pub trait RosterStore {
    /// All non-archived students, excluding blank-name placeholder rows,
    /// newest first.
    fn load_active(&self) -> Result<Vec<Student>>;

    /// All archived students, excluding blank-name placeholder rows, most
    /// recently archived first.
    fn load_archived(&self) -> Result<Vec<Student>>;

    /// Write back a student's own fields (not its child collections).
    fn persist_student(&self, student: &Student) -> Result<()>;

    /// Insert or update the step record for (student, stage key).
    fn upsert_step(
        &self,
        student_id: i64,
        stage_key: &str,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Connection,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    id              INTEGER PRIMARY KEY,
    first_name      TEXT NOT NULL,
    last_name       TEXT NOT NULL,
    email           TEXT,
    phone           TEXT,
    student_number  TEXT,
    category        TEXT NOT NULL,
    role            TEXT NOT NULL DEFAULT '',
    organization    TEXT NOT NULL,
    location        TEXT,
    start_date      TEXT NOT NULL,
    end_date        TEXT NOT NULL,
    status          TEXT NOT NULL,
    notes           TEXT,
    archived        INTEGER NOT NULL DEFAULT 0,
    archived_at     TEXT,
    created_at      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS contacts (
    id          INTEGER PRIMARY KEY,
    student_id  INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    at          TEXT NOT NULL,
    kind        TEXT NOT NULL,
    content     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS deadlines (
    id          INTEGER PRIMARY KEY,
    student_id  INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    due         TEXT NOT NULL,
    completed   INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS workflow_steps (
    id           INTEGER PRIMARY KEY,
    student_id   INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    stage_key    TEXT NOT NULL,
    completed    INTEGER NOT NULL DEFAULT 0,
    completed_at TEXT,
    UNIQUE(student_id, stage_key)
);
";

impl SqliteStore {
    /// Open or create the database at `path` and bootstrap the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // -----------------------------------------------------------------------
    // Intake and child-row inserts
    // -----------------------------------------------------------------------

    /// Insert a new student and set its assigned row id.
    pub fn add_student(&self, student: &mut Student) -> Result<()> {
        self.conn.execute(
            "INSERT INTO students (first_name, last_name, email, phone, student_number,
                                   category, role, organization, location, start_date,
                                   end_date, status, notes, archived, archived_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                student.first_name,
                student.last_name,
                student.email,
                student.phone,
                student.student_number,
                student.category,
                student.role,
                student.organization,
                student.location,
                student.start_date.to_string(),
                student.end_date.to_string(),
                student.status,
                student.notes,
                student.archived,
                student.archived_at.map(|t| t.to_rfc3339()),
                student.created_at.to_rfc3339(),
            ],
        )?;
        student.id = self.conn.last_insert_rowid();
        tracing::debug!(id = student.id, name = %student.name(), "student added");
        Ok(())
    }

    pub fn add_contact(&self, student_id: i64, event: &ContactEvent) -> Result<()> {
        self.require_student(student_id)?;
        self.conn.execute(
            "INSERT INTO contacts (student_id, at, kind, content) VALUES (?1, ?2, ?3, ?4)",
            params![student_id, event.at.to_rfc3339(), event.kind, event.content],
        )?;
        Ok(())
    }

    /// Insert a deadline and return its row id.
    pub fn add_deadline(&self, student_id: i64, deadline: &Deadline) -> Result<i64> {
        self.require_student(student_id)?;
        self.conn.execute(
            "INSERT INTO deadlines (student_id, title, due, completed) VALUES (?1, ?2, ?3, ?4)",
            params![student_id, deadline.title, deadline.due.to_string(), deadline.completed],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_deadline_completed(&self, deadline_id: i64, completed: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE deadlines SET completed = ?1 WHERE id = ?2",
            params![completed, deadline_id],
        )?;
        Ok(())
    }

    pub fn delete_deadline(&self, deadline_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM deadlines WHERE id = ?1", params![deadline_id])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Loads
    // -----------------------------------------------------------------------

    pub fn load_student(&self, id: i64) -> Result<Student> {
        let student = self
            .conn
            .query_row(
                &format!("{SELECT_STUDENT} WHERE id = ?1"),
                params![id],
                row_to_student,
            )
            .optional()?
            .ok_or(TrajectError::StudentNotFound(id))?;
        let mut loaded = [student];
        self.attach_children(&mut loaded)?;
        let [student] = loaded;
        Ok(student)
    }

    fn load_where(&self, clause: &str) -> Result<Vec<Student>> {
        let sql = format!("{SELECT_STUDENT} {clause}");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut students = stmt
            .query_map([], row_to_student)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        self.attach_children(&mut students)?;
        Ok(students)
    }

    fn attach_children(&self, students: &mut [Student]) -> Result<()> {
        for student in students.iter_mut() {
            let mut stmt = self.conn.prepare(
                "SELECT at, kind, content FROM contacts WHERE student_id = ?1 ORDER BY at",
            )?;
            student.contacts = stmt
                .query_map([student.id], |row| {
                    Ok(ContactEvent {
                        at: parse_ts(&row.get::<_, String>(0)?)?,
                        kind: row.get(1)?,
                        content: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stmt = self.conn.prepare(
                "SELECT id, title, due, completed FROM deadlines WHERE student_id = ?1 ORDER BY due",
            )?;
            student.deadlines = stmt
                .query_map([student.id], |row| {
                    Ok(Deadline {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        due: parse_date(&row.get::<_, String>(2)?)?,
                        completed: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stmt = self.conn.prepare(
                "SELECT stage_key, completed, completed_at FROM workflow_steps
                 WHERE student_id = ?1",
            )?;
            student.steps = stmt
                .query_map([student.id], |row| {
                    Ok(StepRecord {
                        stage_key: row.get(0)?,
                        completed: row.get(1)?,
                        completed_at: row
                            .get::<_, Option<String>>(2)?
                            .map(|s| parse_ts(&s))
                            .transpose()?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
        }
        Ok(())
    }

    fn require_student(&self, id: i64) -> Result<()> {
        let exists: Option<i64> = self
            .conn
            .query_row("SELECT id FROM students WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(TrajectError::StudentNotFound(id));
        }
        Ok(())
    }
}

const SELECT_STUDENT: &str = "SELECT id, first_name, last_name, email, phone, student_number,
        category, role, organization, location, start_date, end_date,
        status, notes, archived, archived_at, created_at
 FROM students";

fn row_to_student(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        student_number: row.get(5)?,
        category: row.get(6)?,
        role: row.get(7)?,
        organization: row.get(8)?,
        location: row.get(9)?,
        start_date: parse_date(&row.get::<_, String>(10)?)?,
        end_date: parse_date(&row.get::<_, String>(11)?)?,
        status: row.get(12)?,
        notes: row.get(13)?,
        archived: row.get(14)?,
        archived_at: row
            .get::<_, Option<String>>(15)?
            .map(|s| parse_ts(&s))
            .transpose()?,
        created_at: parse_ts(&row.get::<_, String>(16)?)?,
        contacts: Vec::new(),
        deadlines: Vec::new(),
        steps: Vec::new(),
    })
}

fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_date(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl RosterStore for SqliteStore {
    fn load_active(&self) -> Result<Vec<Student>> {
        self.load_where(
            "WHERE archived = 0 AND (TRIM(first_name) != '' OR TRIM(last_name) != '')
             ORDER BY created_at DESC",
        )
    }

    fn load_archived(&self) -> Result<Vec<Student>> {
        self.load_where(
            "WHERE archived = 1 AND (TRIM(first_name) != '' OR TRIM(last_name) != '')
             ORDER BY archived_at DESC",
        )
    }

    fn persist_student(&self, student: &Student) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE students SET first_name = ?1, last_name = ?2, email = ?3, phone = ?4,
                    student_number = ?5, category = ?6, role = ?7, organization = ?8,
                    location = ?9, start_date = ?10, end_date = ?11, status = ?12,
                    notes = ?13, archived = ?14, archived_at = ?15, created_at = ?16
             WHERE id = ?17",
            params![
                student.first_name,
                student.last_name,
                student.email,
                student.phone,
                student.student_number,
                student.category,
                student.role,
                student.organization,
                student.location,
                student.start_date.to_string(),
                student.end_date.to_string(),
                student.status,
                student.notes,
                student.archived,
                student.archived_at.map(|t| t.to_rfc3339()),
                student.created_at.to_rfc3339(),
                student.id,
            ],
        )?;
        if changed == 0 {
            return Err(TrajectError::StudentNotFound(student.id));
        }
        Ok(())
    }

    fn upsert_step(
        &self,
        student_id: i64,
        stage_key: &str,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.require_student(student_id)?;
        self.conn.execute(
            "INSERT INTO workflow_steps (student_id, stage_key, completed, completed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(student_id, stage_key)
             DO UPDATE SET completed = excluded.completed,
                           completed_at = excluded.completed_at",
            params![
                student_id,
                stage_key,
                completed,
                completed_at.map(|t| t.to_rfc3339())
            ],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn student(first: &str, last: &str) -> Student {
        Student::new(
            first,
            last,
            "placement",
            "Acme BV",
            "intake",
            date(2026, 2, 1),
            date(2026, 7, 1),
            now(),
        )
    }

    #[test]
    fn open_creates_schema_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("traject.db");
        let store = SqliteStore::open(&path).unwrap();
        assert!(path.exists());
        assert!(store.load_active().unwrap().is_empty());

        // Reopening is idempotent.
        drop(store);
        SqliteStore::open(&path).unwrap();
    }

    #[test]
    fn add_and_load_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut s = student("Fatima", "Janssen");
        s.email = Some("fatima@example.org".to_string());
        store.add_student(&mut s).unwrap();
        assert!(s.id > 0);

        store
            .add_contact(s.id, &ContactEvent {
                at: now(),
                kind: "email".to_string(),
                content: "kickoff".to_string(),
            })
            .unwrap();
        store
            .add_deadline(s.id, &Deadline {
                id: 0,
                title: "Plan".to_string(),
                due: date(2026, 3, 20),
                completed: false,
            })
            .unwrap();
        store.upsert_step(s.id, "intake", true, Some(now())).unwrap();

        let loaded = store.load_student(s.id).unwrap();
        assert_eq!(loaded.email.as_deref(), Some("fatima@example.org"));
        assert_eq!(loaded.contacts.len(), 1);
        assert_eq!(loaded.deadlines.len(), 1);
        assert_eq!(loaded.steps.len(), 1);
        assert_eq!(loaded.created_at, now());
    }

    #[test]
    fn active_excludes_archived_and_blank_rows() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut active = student("Fatima", "Janssen");
        store.add_student(&mut active).unwrap();

        let mut archived = student("Jan", "de Vries");
        store.add_student(&mut archived).unwrap();
        archived.set_archived(true, now(), "completed");
        store.persist_student(&archived).unwrap();

        let mut blank = student("", " ");
        store.add_student(&mut blank).unwrap();

        let loaded_active = store.load_active().unwrap();
        assert_eq!(loaded_active.len(), 1);
        assert_eq!(loaded_active[0].first_name, "Fatima");

        let loaded_archived = store.load_archived().unwrap();
        assert_eq!(loaded_archived.len(), 1);
        assert_eq!(loaded_archived[0].status, "completed");
    }

    #[test]
    fn active_ordered_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut older = student("Older", "One");
        older.created_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        store.add_student(&mut older).unwrap();
        let mut newer = student("Newer", "Two");
        newer.created_at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        store.add_student(&mut newer).unwrap();

        let active = store.load_active().unwrap();
        assert_eq!(active[0].first_name, "Newer");
        assert_eq!(active[1].first_name, "Older");
    }

    #[test]
    fn upsert_step_is_unique_per_stage() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut s = student("Fatima", "Janssen");
        store.add_student(&mut s).unwrap();

        store.upsert_step(s.id, "plan", true, Some(now())).unwrap();
        store.upsert_step(s.id, "plan", false, None).unwrap();

        let loaded = store.load_student(s.id).unwrap();
        assert_eq!(loaded.steps.len(), 1);
        assert!(!loaded.steps[0].completed);
        assert!(loaded.steps[0].completed_at.is_none());
    }

    #[test]
    fn persist_unknown_student_errors() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut ghost = student("Ghost", "Row");
        ghost.id = 999;
        assert!(matches!(
            store.persist_student(&ghost),
            Err(TrajectError::StudentNotFound(999))
        ));
        assert!(matches!(
            store.upsert_step(999, "intake", true, None),
            Err(TrajectError::StudentNotFound(999))
        ));
    }

    #[test]
    fn deadline_complete_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut s = student("Fatima", "Janssen");
        store.add_student(&mut s).unwrap();
        let id = store
            .add_deadline(s.id, &Deadline {
                id: 0,
                title: "Plan".to_string(),
                due: date(2026, 3, 20),
                completed: false,
            })
            .unwrap();

        store.set_deadline_completed(id, true).unwrap();
        let loaded = store.load_student(s.id).unwrap();
        assert!(loaded.deadlines[0].completed);

        store.delete_deadline(id).unwrap();
        let loaded = store.load_student(s.id).unwrap();
        assert!(loaded.deadlines.is_empty());
    }
}
