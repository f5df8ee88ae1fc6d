use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use traject_core::store::SqliteStore;
use traject_core::student::ContactEvent;

#[derive(Subcommand)]
pub enum ContactSubcommand {
    /// Log a contact moment for a student
    Add {
        id: i64,
        /// Kind of contact (email, call, visit, ...)
        #[arg(long, default_value = "email")]
        kind: String,
        /// What was discussed
        content: String,
    },
}

pub fn run(store: &SqliteStore, subcmd: ContactSubcommand) -> anyhow::Result<()> {
    match subcmd {
        ContactSubcommand::Add { id, kind, content } => {
            let event = ContactEvent {
                at: Utc::now(),
                kind,
                content,
            };
            store
                .add_contact(id, &event)
                .context("failed to log contact")?;
            println!("Logged {} contact for student #{id}", event.kind);
            Ok(())
        }
    }
}
