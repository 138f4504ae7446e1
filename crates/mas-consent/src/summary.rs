//! Per-customer summaries, data export and bulk recording.

use chrono::Utc;
use mas_core::enums::ConsentAction;
use serde_json::json;

use crate::error::ConsentError;
use crate::manager::ConsentManager;
use crate::types::{
    BulkFailure, BulkOutcome, ConsentMetadata, ConsentStatus, ConsentSummary, CustomerConsentExport,
};

impl ConsentManager {
    /// Current state of every active definition for one customer.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Database` if a query fails.
    pub async fn get_customer_consent_summary(
        &self,
        customer_id: i64,
    ) -> Result<ConsentSummary, ConsentError> {
        let now = Utc::now();
        let scheduled = self.scheduled_expiries(Some(customer_id)).await?;

        let mut consents = Vec::new();
        for definition in self.list_definitions(true).await? {
            let latest = self.latest_entry(customer_id, &definition.code).await?;
            let granted = self.has_consent_at(customer_id, &definition.code, now).await?;
            let expires_at = scheduled
                .iter()
                .find(|e| e.code == definition.code)
                .map(|e| e.expires_at);
            consents.push(ConsentStatus {
                code: definition.code,
                name: definition.name,
                category: definition.category,
                required: definition.required,
                granted,
                last_action: latest.as_ref().map(|e| e.action),
                last_changed_at: latest.as_ref().map(|e| e.created_at),
                consented_version: latest
                    .as_ref()
                    .filter(|e| e.action == ConsentAction::Accept)
                    .map(|e| e.version),
                current_version: definition.version,
                expires_at,
            });
        }

        let granted = consents.iter().filter(|c| c.granted).count();
        let missing_required = consents
            .iter()
            .filter(|c| c.required && !c.granted)
            .map(|c| c.code.clone())
            .collect();
        Ok(ConsentSummary {
            customer_id,
            consents,
            granted,
            missing_required,
            generated_at: now,
        })
    }

    /// Everything held about a customer's consents, for data portability.
    /// The export itself is audited as a completed GDPR request.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Database` if a query fails.
    pub async fn export_customer_data(
        &self,
        customer_id: i64,
    ) -> Result<CustomerConsentExport, ConsentError> {
        let export = CustomerConsentExport {
            customer_id,
            exported_at: Utc::now(),
            summary: self.get_customer_consent_summary(customer_id).await?,
            history: self.consent_history(customer_id, None).await?,
            proofs: self.customer_proofs(customer_id).await?,
            expiries: self.customer_expiries(customer_id).await?,
        };
        self.audit
            .log_gdpr_request(
                customer_id,
                "data_export",
                "completed",
                json!({"scope": "consent", "history_rows": export.history.len()}),
            )
            .await?;
        tracing::info!(customer_id, rows = export.history.len(), "consent data exported");
        Ok(export)
    }

    /// Record `code` for each customer independently. One failure never
    /// stops the rest.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::DefinitionNotFound` or
    /// `ConsentError::InactiveDefinition` up front, since every customer
    /// would fail the same way.
    pub async fn bulk_record_consent(
        &self,
        customer_ids: &[i64],
        code: &str,
        metadata: &ConsentMetadata,
    ) -> Result<BulkOutcome, ConsentError> {
        let definition = self.get_definition(code).await?;
        if !definition.active {
            return Err(ConsentError::InactiveDefinition(code.to_string()));
        }

        let mut outcome = BulkOutcome::default();
        for &customer_id in customer_ids {
            match self.record_consent(customer_id, code, metadata).await {
                Ok(_) => outcome.succeeded.push(customer_id),
                Err(error) => {
                    tracing::warn!(customer_id, code, %error, "bulk consent failed for customer");
                    outcome.failed.push(BulkFailure {
                        customer_id,
                        error: error.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            code,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "bulk consent recorded"
        );
        Ok(outcome)
    }
}
