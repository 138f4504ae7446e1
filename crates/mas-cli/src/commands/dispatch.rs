use mas_app::Mas;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::Commands;
use crate::commands;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(command: Commands, mas: &Mas, flags: &GlobalFlags) -> anyhow::Result<()> {
    match command {
        Commands::Audit { action } => commands::audit::handle(&action, mas, flags).await,
        Commands::Consent { action } => commands::consent::handle(&action, mas, flags).await,
        Commands::Services => commands::services::handle(mas, flags),
    }
}
