use chrono::Utc;
use mas_app::Mas;
use mas_core::errors::MasError;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::ConsentCommands;
use crate::output::output;

#[derive(Debug, Serialize)]
struct ExpireResponse {
    processed: usize,
    expiries: Vec<mas_core::entities::ConsentExpiry>,
}

/// Handle `mas consent`.
pub async fn handle(action: &ConsentCommands, mas: &Mas, flags: &GlobalFlags) -> anyhow::Result<()> {
    let consent = mas.consent();
    match action {
        ConsentCommands::Definitions { all } => {
            let definitions = consent
                .list_definitions(!*all)
                .await
                .map_err(MasError::from)?;
            output(&definitions, flags.format)
        }
        ConsentCommands::Summary { customer_id } => {
            let summary = consent
                .get_customer_consent_summary(*customer_id)
                .await
                .map_err(MasError::from)?;
            output(&summary, flags.format)
        }
        ConsentCommands::Export { customer_id } => {
            let export = consent
                .export_customer_data(*customer_id)
                .await
                .map_err(MasError::from)?;
            output(&export, flags.format)
        }
        ConsentCommands::Expire => {
            let expiries = consent
                .process_expired(Utc::now())
                .await
                .map_err(MasError::from)?;
            output(
                &ExpireResponse {
                    processed: expiries.len(),
                    expiries,
                },
                flags.format,
            )
        }
    }
}
