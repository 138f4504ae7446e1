use anyhow::Context;
use mas_app::{AppError, Mas};
use mas_config::MasConfig;
use mas_core::errors::MasError;

use crate::cli::GlobalFlags;

/// Load `.env`, then the layered configuration.
pub fn load_config(flags: &GlobalFlags) -> anyhow::Result<MasConfig> {
    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let env_path = cwd.join(".env");
    if env_path.exists() {
        dotenvy::from_path(&env_path)
            .with_context(|| format!("failed to load dotenv file at {}", env_path.display()))?;
    }

    if let Some(path) = flags.config.as_deref().filter(|path| !path.is_file()) {
        anyhow::bail!("config file '{}' does not exist", path.display());
    }

    MasConfig::load_from(flags.config.as_deref(), None)
        .map_err(|error| MasError::from(AppError::Config(error)).into())
}

pub async fn boot(config: MasConfig) -> anyhow::Result<Mas> {
    Mas::boot(config)
        .await
        .map_err(|error| MasError::from(error).into())
}
