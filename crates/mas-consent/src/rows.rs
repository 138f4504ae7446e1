//! Row mapping for the consent tables.

use mas_core::entities::{ConsentDefinition, ConsentExpiry, ConsentLogEntry, ConsentProof};
use mas_db::error::DatabaseError;
use mas_db::helpers::{get_bool, get_opt_i64, get_u32, parse_datetime, parse_enum, parse_json, parse_string_list};

pub(crate) const DEFINITION_COLUMNS: &str = "code, name, description, version, category, legal_basis, \
     required, expiry_period, data_categories, recipients, active, created_at, updated_at";

pub(crate) const LOG_COLUMNS: &str =
    "id, customer_id, code, version, action, metadata, ip_address, user_agent, created_at";

pub(crate) const EXPIRY_COLUMNS: &str = "id, customer_id, code, consent_log_id, expires_at, status";

pub(crate) const PROOF_COLUMNS: &str =
    "consent_log_id, customer_id, code, proof_hash, payload, created_at";

pub(crate) fn row_to_definition(row: &libsql::Row) -> Result<ConsentDefinition, DatabaseError> {
    let expiry_period = get_opt_i64(row, 7)?
        .map(|months| {
            u32::try_from(months)
                .map_err(|_| DatabaseError::InvalidState(format!("expiry_period out of range: {months}")))
        })
        .transpose()?;
    Ok(ConsentDefinition {
        code: row.get::<String>(0)?,
        name: row.get::<String>(1)?,
        description: row.get::<String>(2)?,
        version: get_u32(row, 3)?,
        category: parse_enum(&row.get::<String>(4)?)?,
        legal_basis: parse_enum(&row.get::<String>(5)?)?,
        required: get_bool(row, 6)?,
        expiry_period,
        data_categories: parse_string_list(&row.get::<String>(8)?)?,
        recipients: parse_string_list(&row.get::<String>(9)?)?,
        active: get_bool(row, 10)?,
        created_at: parse_datetime(&row.get::<String>(11)?)?,
        updated_at: parse_datetime(&row.get::<String>(12)?)?,
    })
}

pub(crate) fn row_to_log_entry(row: &libsql::Row) -> Result<ConsentLogEntry, DatabaseError> {
    Ok(ConsentLogEntry {
        id: row.get::<i64>(0)?,
        customer_id: row.get::<i64>(1)?,
        code: row.get::<String>(2)?,
        version: get_u32(row, 3)?,
        action: parse_enum(&row.get::<String>(4)?)?,
        metadata: parse_json(&row.get::<String>(5)?)?,
        ip_address: row.get::<String>(6)?,
        user_agent: row.get::<String>(7)?,
        created_at: parse_datetime(&row.get::<String>(8)?)?,
    })
}

pub(crate) fn row_to_expiry(row: &libsql::Row) -> Result<ConsentExpiry, DatabaseError> {
    Ok(ConsentExpiry {
        id: row.get::<i64>(0)?,
        customer_id: row.get::<i64>(1)?,
        code: row.get::<String>(2)?,
        consent_log_id: row.get::<i64>(3)?,
        expires_at: parse_datetime(&row.get::<String>(4)?)?,
        status: parse_enum(&row.get::<String>(5)?)?,
    })
}

pub(crate) fn row_to_proof(row: &libsql::Row) -> Result<ConsentProof, DatabaseError> {
    Ok(ConsentProof {
        consent_log_id: row.get::<i64>(0)?,
        customer_id: row.get::<i64>(1)?,
        code: row.get::<String>(2)?,
        proof_hash: row.get::<String>(3)?,
        payload: parse_json(&row.get::<String>(4)?)?,
        created_at: parse_datetime(&row.get::<String>(5)?)?,
    })
}
