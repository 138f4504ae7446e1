use std::path::PathBuf;

use clap::Parser;

pub mod global;
pub mod root_commands;
pub mod subcommands;

pub use global::{GlobalFlags, OutputFormat};
pub use root_commands::Commands;

/// Top-level CLI parser for the `mas` binary.
#[derive(Debug, Parser)]
#[command(name = "mas", version, about = "MAS - audit trail and consent records")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, raw
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Configuration file (defaults to .mas/config.toml over the user config)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    #[must_use]
    pub fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            format: self.format,
            config: self.config.clone(),
            quiet: self.quiet,
            verbose: self.verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Commands, OutputFormat};
    use crate::cli::subcommands::{AuditCommands, ConsentCommands};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mas",
            "audit",
            "search",
            "--category",
            "security",
            "--verbose",
            "--format",
            "raw",
        ])
        .expect("cli should parse");

        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Raw);
        let Commands::Audit { action } = cli.command else {
            panic!("expected audit command");
        };
        let AuditCommands::Search { filter, page, limit } = action else {
            panic!("expected audit search");
        };
        assert_eq!(filter.category.as_deref(), Some("security"));
        assert_eq!((page, limit), (1, 50));
    }

    #[test]
    fn consent_summary_takes_a_customer_id() {
        let cli = Cli::try_parse_from(["mas", "consent", "summary", "42"]).expect("cli should parse");
        assert!(matches!(
            cli.command,
            Commands::Consent {
                action: ConsentCommands::Summary { customer_id: 42 }
            }
        ));
    }

    #[test]
    fn report_requires_a_regulation() {
        assert!(Cli::try_parse_from(["mas", "audit", "report"]).is_err());
    }
}
