use std::path::Path;

use mas_app::Mas;
use mas_audit::{ExportFormat, ExportOptions};
use mas_core::errors::MasError;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::AuditFilterArgs;
use crate::commands::shared::filter::audit_filter;
use crate::commands::shared::parse::parse_value;
use crate::output::output;

pub async fn run(
    filter: &AuditFilterArgs,
    export_format: &str,
    compress: bool,
    output_dir: Option<&Path>,
    mas: &Mas,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let filter = audit_filter(filter)?;
    let format = parse_value::<ExportFormat>(export_format)?;
    let mut options = ExportOptions {
        compress,
        ..ExportOptions::default()
    };
    if let Some(dir) = output_dir {
        options.output_dir = dir.to_path_buf();
    }

    let summary = mas
        .audit()
        .export_to_format(&filter, format, &options)
        .await
        .map_err(MasError::from)?;
    output(&summary, flags.format)
}
