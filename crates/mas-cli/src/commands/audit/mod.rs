mod alerts;
mod archive;
mod export;
mod report;
mod search;
mod verify;

use mas_app::Mas;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::AuditCommands;

/// Handle `mas audit`.
pub async fn handle(action: &AuditCommands, mas: &Mas, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        AuditCommands::Search {
            filter,
            page,
            limit,
        } => search::run(filter, *page, *limit, mas, flags).await,
        AuditCommands::Export {
            filter,
            export_format,
            compress,
            output_dir,
        } => export::run(filter, export_format, *compress, output_dir.as_deref(), mas, flags).await,
        AuditCommands::Archive {
            days,
            batch_size,
            export_format,
            compress,
            output_dir,
        } => {
            archive::run(
                *days,
                *batch_size,
                export_format.as_deref(),
                *compress,
                output_dir.clone(),
                mas,
                flags,
            )
            .await
        }
        AuditCommands::Report {
            regulation,
            days,
            threshold,
        } => report::run(regulation, *days, *threshold, mas, flags).await,
        AuditCommands::Verify { filter } => verify::run(filter, mas, flags).await,
        AuditCommands::Alerts { limit, ack } => alerts::run(*limit, *ack, mas, flags).await,
    }
}
