use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Filters shared by `search`, `export` and `verify`.
#[derive(Clone, Debug, Default, Args)]
pub struct AuditFilterArgs {
    /// Audit category (authentication, security, consent, ...).
    #[arg(long)]
    pub category: Option<String>,
    /// Substring of the action.
    #[arg(long)]
    pub action: Option<String>,
    /// Severity; repeat for several.
    #[arg(long = "severity")]
    pub severities: Vec<String>,
    #[arg(long)]
    pub user: Option<i64>,
    #[arg(long)]
    pub customer: Option<i64>,
    #[arg(long)]
    pub ip: Option<String>,
    /// Inclusive lower bound (RFC 3339 or YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<String>,
    /// Exclusive upper bound (RFC 3339 or YYYY-MM-DD).
    #[arg(long)]
    pub to: Option<String>,
    /// Free text over context, action and event id.
    #[arg(long)]
    pub search: Option<String>,
}

/// Audit trail commands.
#[derive(Clone, Debug, Subcommand)]
pub enum AuditCommands {
    /// Newest-first page of events.
    Search {
        #[command(flatten)]
        filter: AuditFilterArgs,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Write matching events to a file.
    Export {
        #[command(flatten)]
        filter: AuditFilterArgs,
        /// csv, json or xml.
        #[arg(long = "as", default_value = "json")]
        export_format: String,
        /// Gzip the output file.
        #[arg(long)]
        compress: bool,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Move events older than the retention period into the archive table.
    Archive {
        /// Age in days; defaults to the configured retention.
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        batch_size: Option<u32>,
        /// Export the archived range first (csv, json or xml).
        #[arg(long = "export-as")]
        export_format: Option<String>,
        #[arg(long)]
        compress: bool,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Compliance report for one regulation.
    Report {
        /// gdpr, sox, hipaa or pci-dss.
        regulation: String,
        /// Report over the last N days.
        #[arg(long, default_value_t = 30)]
        days: u32,
        /// Pass threshold in percent; defaults to the configured one.
        #[arg(long)]
        threshold: Option<u8>,
    },
    /// Recompute checksums of matching events.
    Verify {
        #[command(flatten)]
        filter: AuditFilterArgs,
    },
    /// Unacknowledged alerts, or acknowledge one.
    Alerts {
        #[arg(long, default_value_t = 50)]
        limit: u32,
        /// Alert id to acknowledge.
        #[arg(long)]
        ack: Option<i64>,
    },
}
