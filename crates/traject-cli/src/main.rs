mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{
    contact::ContactSubcommand, deadline::DeadlineSubcommand, student::StudentSubcommand,
    workflows::WorkflowsSubcommand,
};
use std::path::PathBuf;
use traject_core::store::SqliteStore;
use traject_core::workflow::WorkflowConfig;

#[derive(Parser)]
#[command(
    name = "traject",
    about = "Track students through a supervision pipeline and surface what needs attention",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the roster database
    #[arg(long, global = true, env = "TRAJECT_DB", default_value = "traject.db")]
    db: PathBuf,

    /// Workflow configuration file (built-in pipeline when omitted)
    #[arg(long, global = true, env = "TRAJECT_WORKFLOWS")]
    workflows: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the student roster
    Student {
        #[command(subcommand)]
        subcommand: StudentSubcommand,
    },

    /// Set a student's status (resyncs the step checklist)
    Status { id: i64, stage: String },

    /// Tick or untick one workflow step (re-derives the status)
    Step {
        id: i64,
        stage: String,
        /// Untick instead of tick
        #[arg(long)]
        undo: bool,
    },

    /// Show a student's workflow checklist
    Steps { id: i64 },

    /// Log contact moments
    Contact {
        #[command(subcommand)]
        subcommand: ContactSubcommand,
    },

    /// Manage deadlines
    Deadline {
        #[command(subcommand)]
        subcommand: DeadlineSubcommand,
    },

    /// Dashboard summary counts and status distribution
    Stats,

    /// Prioritized alert feed
    Alerts,

    /// Inspect and validate the workflow configuration
    Workflows {
        #[command(subcommand)]
        subcommand: WorkflowsSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(cli) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    use anyhow::Context;

    let config = match &cli.workflows {
        Some(path) => WorkflowConfig::load(path)
            .with_context(|| format!("failed to load workflows from {}", path.display()))?,
        None => WorkflowConfig::default(),
    };
    let store = SqliteStore::open(&cli.db)
        .with_context(|| format!("failed to open database {}", cli.db.display()))?;

    match cli.command {
        Commands::Student { subcommand } => cmd::student::run(&store, &config, subcommand, cli.json),
        Commands::Status { id, stage } => cmd::progress::set_status(&store, &config, id, &stage),
        Commands::Step { id, stage, undo } => {
            cmd::progress::toggle_step(&store, &config, id, &stage, !undo)
        }
        Commands::Steps { id } => cmd::progress::show_steps(&store, &config, id, cli.json),
        Commands::Contact { subcommand } => cmd::contact::run(&store, subcommand),
        Commands::Deadline { subcommand } => cmd::deadline::run(&store, subcommand, cli.json),
        Commands::Stats => cmd::dashboard::stats(&store, &config, cli.json),
        Commands::Alerts => cmd::dashboard::alerts(&store, &config, cli.json),
        Commands::Workflows { subcommand } => cmd::workflows::run(&config, subcommand, cli.json),
    }
}
