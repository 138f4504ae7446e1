use mas_app::Mas;
use mas_core::errors::MasError;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::AuditFilterArgs;
use crate::commands::shared::filter::audit_filter;
use crate::output::output;

pub async fn run(filter: &AuditFilterArgs, mas: &Mas, flags: &GlobalFlags) -> anyhow::Result<()> {
    let filter = audit_filter(filter)?;
    let report = mas
        .audit()
        .verify_range(&filter)
        .await
        .map_err(MasError::from)?;
    if !report.is_intact() {
        tracing::warn!(invalid = report.invalid.len(), "audit checksum mismatches found");
    }
    output(&report, flags.format)
}
