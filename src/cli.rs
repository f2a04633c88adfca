use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "payout-core")]
#[command(about = "Payout settlement pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server plus the background settlement worker (default)
    Serve,

    /// Run the settlement worker on its own
    Worker {
        /// Process a single batch and exit instead of looping
        #[arg(long)]
        once: bool,

        /// Batch size override
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Validate configuration and print a summary
    Config,
}
