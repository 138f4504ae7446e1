use mas_app::Mas;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::cli::GlobalFlags;
use crate::output::output;

#[derive(Debug, Serialize)]
struct ServiceRow {
    id: String,
    tags: Vec<String>,
    instantiated: bool,
    metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct ServicesResponse {
    providers: Vec<String>,
    services: Vec<ServiceRow>,
    aliases: std::collections::BTreeMap<String, String>,
}

/// Handle `mas services`.
pub fn handle(mas: &Mas, flags: &GlobalFlags) -> anyhow::Result<()> {
    let container = mas.container();
    let services = container
        .service_ids()
        .into_iter()
        .map(|id| ServiceRow {
            tags: container
                .tags(&id)
                .map(|tags| tags.into_iter().collect())
                .unwrap_or_default(),
            instantiated: container.is_instantiated(&id),
            metadata: container.metadata(&id).unwrap_or_default(),
            id,
        })
        .collect();

    output(
        &ServicesResponse {
            providers: mas.providers().into_iter().map(str::to_string).collect(),
            services,
            aliases: container.aliases(),
        },
        flags.format,
    )
}
