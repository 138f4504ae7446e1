//! General application configuration.

use serde::{Deserialize, Serialize};

fn default_app_name() -> String {
    "mas".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Name stamped on exports and reports.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Store whose overrides are layered over the file configuration.
    #[serde(default)]
    pub store_id: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            store_id: 0,
        }
    }
}
