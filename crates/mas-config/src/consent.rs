//! Consent manager configuration.

use serde::{Deserialize, Serialize};

const fn default_true() -> bool {
    true
}

/// Definition fields whose change bumps the definition version.
fn default_significant_fields() -> Vec<String> {
    [
        "description",
        "category",
        "legal_basis",
        "data_categories",
        "recipients",
        "expiry_period",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

const fn default_definition_cache_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsentConfig {
    /// Store a hash proof for every accepted consent.
    #[serde(default = "default_true")]
    pub proof_of_record: bool,

    #[serde(default = "default_significant_fields")]
    pub significant_fields: Vec<String>,

    /// How long definitions stay memoized in the cache.
    #[serde(default = "default_definition_cache_ttl_secs")]
    pub definition_cache_ttl_secs: u64,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            proof_of_record: true,
            significant_fields: default_significant_fields(),
            definition_cache_ttl_secs: default_definition_cache_ttl_secs(),
        }
    }
}

impl ConsentConfig {
    #[must_use]
    pub fn is_significant(&self, field: &str) -> bool {
        self.significant_fields.iter().any(|f| f == field)
    }
}
