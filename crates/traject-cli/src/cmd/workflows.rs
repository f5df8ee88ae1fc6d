use crate::output::{print_json, print_table};
use clap::Subcommand;
use traject_core::workflow::{WarnLevel, WorkflowConfig};

#[derive(Subcommand)]
pub enum WorkflowsSubcommand {
    /// Show the pipeline stages per category
    Show,
    /// Validate the workflow configuration
    Check,
}

pub fn run(config: &WorkflowConfig, subcmd: WorkflowsSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        WorkflowsSubcommand::Show => show(config, json),
        WorkflowsSubcommand::Check => check(config, json),
    }
}

fn show(config: &WorkflowConfig, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(config)?;
        return Ok(());
    }
    for (category, def) in &config.categories {
        println!("{category}:");
        let rows: Vec<Vec<String>> = def
            .stages()
            .iter()
            .map(|s| {
                vec![
                    s.key.clone(),
                    s.label.clone(),
                    s.tone.to_string(),
                    if s.review { "review" } else { "" }.to_string(),
                ]
            })
            .collect();
        print_table(&["Key", "Label", "Tone", ""], &rows);
        println!();
    }
    Ok(())
}

fn check(config: &WorkflowConfig, json: bool) -> anyhow::Result<()> {
    let warnings = config.validate();
    if json {
        print_json(&warnings)?;
    } else if warnings.is_empty() {
        println!("Workflow configuration OK.");
    } else {
        for w in &warnings {
            let level = match w.level {
                WarnLevel::Error => "error",
                WarnLevel::Warning => "warning",
            };
            println!("{level}: {}", w.message);
        }
    }
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("workflow configuration has errors");
    }
    Ok(())
}
