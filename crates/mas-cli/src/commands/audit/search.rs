use mas_app::Mas;
use mas_core::errors::MasError;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::AuditFilterArgs;
use crate::commands::shared::filter::audit_filter;
use crate::output::output;

pub async fn run(
    filter: &AuditFilterArgs,
    page: u32,
    limit: u32,
    mas: &Mas,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let filter = audit_filter(filter)?;
    let page = mas
        .audit()
        .search_logs(&filter, page, limit)
        .await
        .map_err(MasError::from)?;
    output(&page, flags.format)
}
