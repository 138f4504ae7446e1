use mas_app::Mas;
use mas_core::errors::MasError;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::output::output;

#[derive(Debug, Serialize)]
struct AcknowledgeResponse {
    alert_id: i64,
    acknowledged: bool,
}

pub async fn run(limit: u32, ack: Option<i64>, mas: &Mas, flags: &GlobalFlags) -> anyhow::Result<()> {
    if let Some(alert_id) = ack {
        let acknowledged = mas
            .audit()
            .acknowledge_alert(alert_id)
            .await
            .map_err(MasError::from)?;
        return output(
            &AcknowledgeResponse {
                alert_id,
                acknowledged,
            },
            flags.format,
        );
    }

    let alerts = mas
        .audit()
        .unacknowledged_alerts(limit)
        .await
        .map_err(MasError::from)?;
    output(&alerts, flags.format)
}
