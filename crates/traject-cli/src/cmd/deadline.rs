use crate::output::print_json;
use anyhow::Context;
use chrono::NaiveDate;
use clap::Subcommand;
use traject_core::store::SqliteStore;
use traject_core::student::Deadline;

#[derive(Subcommand)]
pub enum DeadlineSubcommand {
    /// Add a deadline for a student
    Add {
        student_id: i64,
        title: String,
        /// Due date (YYYY-MM-DD)
        due: NaiveDate,
    },
    /// Mark a deadline as completed
    Done { deadline_id: i64 },
    /// Reopen a completed deadline
    Reopen { deadline_id: i64 },
    /// Remove a deadline
    Remove { deadline_id: i64 },
    /// List a student's deadlines
    List { student_id: i64 },
}

pub fn run(store: &SqliteStore, subcmd: DeadlineSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        DeadlineSubcommand::Add {
            student_id,
            title,
            due,
        } => {
            let deadline = Deadline {
                id: 0,
                title,
                due,
                completed: false,
            };
            let id = store
                .add_deadline(student_id, &deadline)
                .context("failed to add deadline")?;
            println!("Added deadline #{id}: {} ({due})", deadline.title);
            Ok(())
        }
        DeadlineSubcommand::Done { deadline_id } => {
            store
                .set_deadline_completed(deadline_id, true)
                .context("failed to complete deadline")?;
            println!("Completed deadline #{deadline_id}");
            Ok(())
        }
        DeadlineSubcommand::Reopen { deadline_id } => {
            store
                .set_deadline_completed(deadline_id, false)
                .context("failed to reopen deadline")?;
            println!("Reopened deadline #{deadline_id}");
            Ok(())
        }
        DeadlineSubcommand::Remove { deadline_id } => {
            store
                .delete_deadline(deadline_id)
                .context("failed to remove deadline")?;
            println!("Removed deadline #{deadline_id}");
            Ok(())
        }
        DeadlineSubcommand::List { student_id } => {
            let student = store
                .load_student(student_id)
                .context("failed to load student")?;
            if json {
                print_json(&student.deadlines)?;
            } else {
                for d in &student.deadlines {
                    let mark = if d.completed { "x" } else { " " };
                    println!("#{} [{mark}] {} ({})", d.id, d.title, d.due);
                }
            }
            Ok(())
        }
    }
}
