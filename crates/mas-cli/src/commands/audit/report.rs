use mas_app::Mas;
use mas_audit::{DateRange, Regulation, ReportOptions};
use mas_core::errors::MasError;

use crate::cli::GlobalFlags;
use crate::commands::shared::parse::{invalid_argument, parse_value};
use crate::output::output;

pub async fn run(
    regulation: &str,
    days: u32,
    threshold: Option<u8>,
    mas: &Mas,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let regulation = parse_value::<Regulation>(regulation)?;
    if let Some(value) = threshold.filter(|value| *value > 100) {
        return Err(invalid_argument("threshold", &value.to_string(), "must be 0..=100"));
    }

    let report = mas
        .audit()
        .generate_compliance_report(regulation, DateRange::last_days(days), &ReportOptions { threshold })
        .await
        .map_err(MasError::from)?;
    output(&report, flags.format)
}
