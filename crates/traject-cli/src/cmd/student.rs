use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use traject_core::dashboard::{filter_roster, search_roster, StatFilter};
use traject_core::store::{RosterStore, SqliteStore};
use traject_core::student::Student;
use traject_core::workflow::WorkflowConfig;

#[derive(Subcommand)]
pub enum StudentSubcommand {
    /// Add a student to the roster
    Add {
        first_name: String,
        last_name: String,
        /// Workflow category (e.g. placement, thesis)
        #[arg(long, default_value = "placement")]
        category: String,
        #[arg(long)]
        organization: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        student_number: Option<String>,
        /// Start date (YYYY-MM-DD, default today)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// End date (YYYY-MM-DD, default five months after start)
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// List the roster
    List {
        /// Show archived students instead of active ones
        #[arg(long)]
        archived: bool,
        /// Filter by dashboard tile: needs-action | in-review | completed
        #[arg(long)]
        filter: Option<String>,
        /// Substring search over name and organization
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one student in full
    Show { id: i64 },
    /// Archive a student (sets the terminal status)
    Archive { id: i64 },
    /// Restore an archived student
    Restore { id: i64 },
}

pub fn run(
    store: &SqliteStore,
    config: &WorkflowConfig,
    subcmd: StudentSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    match subcmd {
        StudentSubcommand::Add {
            first_name,
            last_name,
            category,
            organization,
            email,
            student_number,
            start,
            end,
        } => add(
            store, config, first_name, last_name, category, organization, email, student_number,
            start, end, json,
        ),
        StudentSubcommand::List {
            archived,
            filter,
            search,
        } => list(store, config, archived, filter.as_deref(), search.as_deref(), json),
        StudentSubcommand::Show { id } => show(store, id, json),
        StudentSubcommand::Archive { id } => set_archived(store, config, id, true),
        StudentSubcommand::Restore { id } => set_archived(store, config, id, false),
    }
}

#[allow(clippy::too_many_arguments)]
fn add(
    store: &SqliteStore,
    config: &WorkflowConfig,
    first_name: String,
    last_name: String,
    category: String,
    organization: String,
    email: Option<String>,
    student_number: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    json: bool,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let start = start.unwrap_or_else(|| now.date_naive());
    let end = end.unwrap_or(start + chrono::Months::new(5));
    let initial = config
        .stages_for(&category)
        .first()
        .map(|s| s.key.clone())
        .context("workflow definition has no stages")?;

    let mut student = Student::new(
        first_name, last_name, category, organization, initial, start, end, now,
    );
    student.email = email;
    student.student_number = student_number;
    store.add_student(&mut student).context("failed to add student")?;

    if json {
        print_json(&student)?;
    } else {
        println!("Added student #{}: {}", student.id, student.name());
    }
    Ok(())
}

fn list(
    store: &SqliteStore,
    config: &WorkflowConfig,
    archived: bool,
    filter: Option<&str>,
    search: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let roster = if archived || filter == Some("completed") {
        store.load_archived().context("failed to load archived roster")?
    } else {
        store.load_active().context("failed to load roster")?
    };

    let mut selected: Vec<&Student> = match filter {
        Some(name) => {
            let stat = match name {
                "needs-action" => StatFilter::NeedsAction,
                "in-review" => StatFilter::InReview,
                "completed" => StatFilter::CompletedThisMonth,
                other => anyhow::bail!("unknown filter '{other}'"),
            };
            filter_roster(&roster, stat, config, now)?
        }
        None => roster.iter().collect(),
    };
    if let Some(query) = search {
        let matches = search_roster(&roster, query);
        selected.retain(|s| matches.iter().any(|m| m.id == s.id));
    }

    if json {
        print_json(&selected)?;
    } else {
        let rows: Vec<Vec<String>> = selected
            .iter()
            .map(|s| {
                vec![
                    s.id.to_string(),
                    s.name(),
                    s.category.clone(),
                    s.organization.clone(),
                    s.status.clone(),
                ]
            })
            .collect();
        print_table(&["ID", "Name", "Category", "Organization", "Status"], &rows);
    }
    Ok(())
}

fn show(store: &SqliteStore, id: i64, json: bool) -> anyhow::Result<()> {
    let student = store.load_student(id).context("failed to load student")?;
    if json {
        print_json(&student)?;
        return Ok(());
    }
    println!("#{} {} ({})", student.id, student.name(), student.category);
    println!("  organization: {}", student.organization);
    println!("  status:       {}", student.status);
    println!("  period:       {} → {}", student.start_date, student.end_date);
    if let Some(email) = &student.email {
        println!("  email:        {email}");
    }
    if student.archived {
        println!("  archived:     {}", student.archived_at.map(|t| t.to_rfc3339()).unwrap_or_default());
    }
    println!("  contacts:     {}", student.contacts.len());
    for d in &student.deadlines {
        let mark = if d.completed { "x" } else { " " };
        println!("  deadline [{mark}] {} ({})", d.title, d.due);
    }
    Ok(())
}

fn set_archived(
    store: &SqliteStore,
    config: &WorkflowConfig,
    id: i64,
    archived: bool,
) -> anyhow::Result<()> {
    let mut student = store.load_student(id).context("failed to load student")?;
    let terminal = config
        .stages_for(&student.category)
        .last()
        .map(|s| s.key.clone())
        .context("workflow definition has no stages")?;
    student.set_archived(archived, Utc::now(), &terminal);
    store.persist_student(&student).context("failed to persist student")?;
    println!(
        "{} {}",
        if archived { "Archived" } else { "Restored" },
        student.name()
    );
    Ok(())
}
