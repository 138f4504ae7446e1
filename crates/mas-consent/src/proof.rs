//! Proof of record: a SHA-256 seal over each accepted consent.

use mas_core::entities::{ConsentLogEntry, ConsentProof, canonical_json, sha256_hex};
use mas_db::helpers::format_datetime;
use serde_json::{Value, json};

use crate::error::ConsentError;
use crate::manager::ConsentManager;
use crate::rows::{PROOF_COLUMNS, row_to_proof};

/// The sealed facts of a log row.
pub(crate) fn proof_payload(entry: &ConsentLogEntry) -> Value {
    json!({
        "consent_log_id": entry.id,
        "customer_id": entry.customer_id,
        "code": entry.code,
        "version": entry.version,
        "action": entry.action.as_str(),
        "metadata": entry.metadata,
        "ip_address": entry.ip_address,
        "user_agent": entry.user_agent,
        "created_at": format_datetime(&entry.created_at),
    })
}

pub(crate) fn proof_hash(payload: &Value) -> String {
    sha256_hex(canonical_json(payload).as_bytes())
}

/// Store the proof for `entry`. Runs inside the caller's transaction.
pub(crate) async fn insert_proof(
    conn: &libsql::Connection,
    entry: &ConsentLogEntry,
) -> Result<ConsentProof, ConsentError> {
    let payload = proof_payload(entry);
    let proof = ConsentProof {
        consent_log_id: entry.id,
        customer_id: entry.customer_id,
        code: entry.code.clone(),
        proof_hash: proof_hash(&payload),
        payload,
        created_at: entry.created_at,
    };
    conn.execute(
        &format!("INSERT INTO consent_proofs ({PROOF_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        libsql::params![
            proof.consent_log_id,
            proof.customer_id,
            proof.code.as_str(),
            proof.proof_hash.as_str(),
            proof.payload.to_string(),
            format_datetime(&proof.created_at)
        ],
    )
    .await?;
    Ok(proof)
}

impl ConsentManager {
    /// The stored proof for a log row, if one was written.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Database` if the query fails.
    pub async fn get_proof(&self, log_id: i64) -> Result<Option<ConsentProof>, ConsentError> {
        let mut rows = self
            .db
            .conn()
            .query(
                &format!("SELECT {PROOF_COLUMNS} FROM consent_proofs WHERE consent_log_id = ?1"),
                [log_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_proof(&row)?)),
            None => Ok(None),
        }
    }

    /// Whether the log row still matches its proof. `false` when no proof
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::LogEntryNotFound` for an unknown log id.
    pub async fn verify_proof(&self, log_id: i64) -> Result<bool, ConsentError> {
        let entry = self.get_log_entry(log_id).await?;
        let Some(proof) = self.get_proof(log_id).await? else {
            return Ok(false);
        };
        let recomputed = proof_payload(&entry);
        let intact = proof.payload == recomputed && proof.proof_hash == proof_hash(&recomputed);
        if !intact {
            tracing::warn!(log_id, code = %entry.code, "consent proof mismatch");
        }
        Ok(intact)
    }

    /// Every proof stored for a customer, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Database` if the query fails.
    pub async fn customer_proofs(&self, customer_id: i64) -> Result<Vec<ConsentProof>, ConsentError> {
        let mut rows = self
            .db
            .conn()
            .query(
                &format!(
                    "SELECT {PROOF_COLUMNS} FROM consent_proofs WHERE customer_id = ?1 ORDER BY consent_log_id"
                ),
                [customer_id],
            )
            .await?;
        let mut proofs = Vec::new();
        while let Some(row) = rows.next().await? {
            proofs.push(row_to_proof(&row)?);
        }
        Ok(proofs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mas_core::enums::ConsentAction;

    fn entry() -> ConsentLogEntry {
        ConsentLogEntry {
            id: 7,
            customer_id: 42,
            code: "newsletter".into(),
            version: 2,
            action: ConsentAction::Accept,
            metadata: json!({"method": "checkbox"}),
            ip_address: "10.0.0.1".into(),
            user_agent: "test".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn hash_changes_with_any_sealed_field() {
        let original = entry();
        let hash = proof_hash(&proof_payload(&original));
        assert_eq!(hash.len(), 64);

        let mut altered = original.clone();
        altered.version = 3;
        assert_ne!(proof_hash(&proof_payload(&altered)), hash);

        let mut altered = original;
        altered.metadata = json!({"method": "banner"});
        assert_ne!(proof_hash(&proof_payload(&altered)), hash);
    }
}
