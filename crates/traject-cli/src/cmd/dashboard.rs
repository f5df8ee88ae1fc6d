use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use traject_core::dashboard;
use traject_core::store::{RosterStore, SqliteStore};
use traject_core::workflow::WorkflowConfig;

pub fn stats(store: &SqliteStore, config: &WorkflowConfig, json: bool) -> anyhow::Result<()> {
    let dash = load_dashboard(store, config)?;

    if json {
        print_json(&dash)?;
        return Ok(());
    }

    println!("Active:               {}", dash.active_count);
    println!("Needs action:         {}", dash.needs_action_count);
    println!("In review:            {}", dash.in_review_count);
    println!("Completed this month: {}", dash.completed_this_month);
    println!();
    let rows: Vec<Vec<String>> = dash
        .status_distribution
        .iter()
        .map(|b| {
            vec![
                b.label.clone(),
                b.count.to_string(),
                format!("{:.0}%", b.fraction * 100.0),
                b.tone.to_string(),
            ]
        })
        .collect();
    print_table(&["Status", "Count", "Share", "Tone"], &rows);
    Ok(())
}

pub fn alerts(store: &SqliteStore, config: &WorkflowConfig, json: bool) -> anyhow::Result<()> {
    let dash = load_dashboard(store, config)?;

    if json {
        print_json(&dash.alerts)?;
        return Ok(());
    }

    if dash.alerts.is_empty() {
        println!("Nothing needs attention.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = dash
        .alerts
        .iter()
        .map(|a| {
            vec![
                a.severity.to_string(),
                a.message.clone(),
                a.description.clone(),
            ]
        })
        .collect();
    print_table(&["Severity", "Alert", "Detail"], &rows);
    Ok(())
}

fn load_dashboard(
    store: &SqliteStore,
    config: &WorkflowConfig,
) -> anyhow::Result<dashboard::Dashboard> {
    let active = store.load_active().context("failed to load roster")?;
    let archived = store
        .load_archived()
        .context("failed to load archived roster")?;
    dashboard::aggregate(&active, &archived, config, Utc::now())
        .context("failed to aggregate dashboard")
}
