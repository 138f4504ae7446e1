use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::runtime;

/// Facts about the request being served, supplied by the host application.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RequestContext {
    pub ip_address: String,
    pub session_id: String,
    pub user_agent: String,
    pub request_id: String,
    /// Authenticated administrator, if any.
    pub user_id: Option<i64>,
    /// Authenticated storefront customer, if any.
    pub customer_id: Option<i64>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            ip_address: "0.0.0.0".to_string(),
            session_id: String::new(),
            user_agent: String::new(),
            request_id: runtime::current_request_id().to_string(),
            user_id: None,
            customer_id: None,
        }
    }
}

impl RequestContext {
    /// Context for work not triggered by an HTTP request (CLI, jobs).
    #[must_use]
    pub fn system() -> Self {
        Self {
            ip_address: "127.0.0.1".to_string(),
            session_id: "system".to_string(),
            user_agent: "mas".to_string(),
            ..Self::default()
        }
    }
}
