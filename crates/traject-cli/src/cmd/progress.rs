use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use traject_core::store::SqliteStore;
use traject_core::sync;
use traject_core::workflow::WorkflowConfig;

pub fn set_status(
    store: &SqliteStore,
    config: &WorkflowConfig,
    id: i64,
    stage: &str,
) -> anyhow::Result<()> {
    let mut student = store.load_student(id).context("failed to load student")?;
    let def = config.stages_for(&student.category);
    sync::apply_status(store, &mut student, def, stage, Utc::now())
        .with_context(|| format!("failed to set status '{stage}'"))?;
    println!("{} is now at '{}'", student.name(), student.status);
    Ok(())
}

pub fn toggle_step(
    store: &SqliteStore,
    config: &WorkflowConfig,
    id: i64,
    stage: &str,
    completed: bool,
) -> anyhow::Result<()> {
    let mut student = store.load_student(id).context("failed to load student")?;
    let def = config.stages_for(&student.category);
    sync::apply_step_toggle(store, &mut student, def, stage, completed, Utc::now())
        .with_context(|| format!("failed to toggle step '{stage}'"))?;
    println!(
        "{} '{}' for {} — status: {}",
        if completed { "Ticked" } else { "Unticked" },
        stage,
        student.name(),
        student.status
    );
    Ok(())
}

pub fn show_steps(
    store: &SqliteStore,
    config: &WorkflowConfig,
    id: i64,
    json: bool,
) -> anyhow::Result<()> {
    let student = store.load_student(id).context("failed to load student")?;
    let def = config.stages_for(&student.category);
    let items = sync::step_items(def, &student.steps);

    if json {
        #[derive(serde::Serialize)]
        struct StepRow<'a> {
            key: &'a str,
            label: &'a str,
            completed: bool,
            current: bool,
            completed_at: Option<String>,
        }
        let rows: Vec<StepRow> = items
            .iter()
            .map(|i| StepRow {
                key: &i.key,
                label: &i.label,
                completed: i.completed,
                current: i.current,
                completed_at: i.completed_at.map(|t| t.to_rfc3339()),
            })
            .collect();
        print_json(&rows)?;
        return Ok(());
    }

    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|i| {
            vec![
                if i.completed { "[x]" } else { "[ ]" }.to_string(),
                i.label.clone(),
                if i.current { "← current" } else { "" }.to_string(),
                i.completed_at
                    .map(|t| t.date_naive().to_string())
                    .unwrap_or_default(),
            ]
        })
        .collect();
    println!("{} — {}", student.name(), student.status);
    print_table(&["Done", "Stage", "", "Completed"], &rows);
    Ok(())
}
