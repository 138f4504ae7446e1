use clap::Subcommand;

/// Consent commands.
#[derive(Clone, Debug, Subcommand)]
pub enum ConsentCommands {
    /// List consent definitions.
    Definitions {
        /// Include inactive definitions.
        #[arg(long)]
        all: bool,
    },
    /// Current consent state of one customer.
    Summary { customer_id: i64 },
    /// Full consent history, proofs and expiries of one customer.
    Export { customer_id: i64 },
    /// Write `expire` records for every consent past its expiry date.
    Expire,
}
