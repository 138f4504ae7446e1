use std::path::PathBuf;

use mas_app::Mas;
use mas_audit::{ArchiveOptions, ExportFormat};
use mas_core::errors::MasError;

use crate::cli::GlobalFlags;
use crate::commands::shared::parse::parse_value;
use crate::output::output;

pub async fn run(
    days: Option<u32>,
    batch_size: Option<u32>,
    export_format: Option<&str>,
    compress: bool,
    output_dir: Option<PathBuf>,
    mas: &Mas,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let options = ArchiveOptions {
        batch_size,
        export: export_format.map(parse_value::<ExportFormat>).transpose()?,
        compress,
        output_dir,
    };
    let days = days.unwrap_or(mas.config().audit.retention_days);

    let report = mas
        .audit()
        .archive_logs(days, &options)
        .await
        .map_err(MasError::from)?;
    output(&report, flags.format)
}
