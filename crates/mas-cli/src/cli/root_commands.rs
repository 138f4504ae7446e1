use clap::Subcommand;

use crate::cli::subcommands::{AuditCommands, ConsentCommands};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Audit trail: search, export, archive, compliance reports.
    Audit {
        #[command(subcommand)]
        action: AuditCommands,
    },
    /// Consent definitions and customer consent records.
    Consent {
        #[command(subcommand)]
        action: ConsentCommands,
    },
    /// List registered container services with their tags.
    Services,
}
