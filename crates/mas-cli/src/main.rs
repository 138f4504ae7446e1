use clap::Parser;
use mas_core::errors::MasError;

mod bootstrap;
mod cli;
mod commands;
mod output;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("mas error: {}", describe(&error));
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let flags = cli.global_flags();
    init_tracing(&flags)?;

    let config = bootstrap::load_config(&flags)?;
    let mas = bootstrap::boot(config).await?;

    commands::dispatch::dispatch(cli.command, &mas, &flags).await
}

/// User-facing errors print their message; anything else is logged in full
/// and reported by id only.
fn describe(error: &anyhow::Error) -> String {
    let Some(mas) = error.downcast_ref::<MasError>() else {
        return format!("{error:#}");
    };
    if mas.is_user_facing() {
        return mas.message().to_string();
    }
    tracing::error!(error = %mas.to_value(), "command failed");
    format!("an internal error occurred (id {})", mas.id())
}

fn init_tracing(flags: &cli::GlobalFlags) -> anyhow::Result<()> {
    let level = if flags.quiet {
        "error"
    } else if flags.verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("MAS_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
