use clap::{Parser, Subcommand};

/// Booking Gateway: Google Calendar appointment booking backend
#[derive(Parser)]
#[command(name = "booking-gateway", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind (defaults to PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect or manage the Google Calendar credential
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },

    /// Manage the privileged (super admin) account
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },

    /// Inspect local booking records
    Booking {
        #[command(subcommand)]
        command: BookingCommands,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Show whether a usable credential is stored
    Status,
    /// Print the Google consent URL
    Url,
    /// Refresh the access token now
    Refresh,
    /// Clear the stored credential
    Revoke,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create the super admin account if it does not exist
    Seed {
        /// Defaults to SUPER_ADMIN_EMAIL
        #[arg(long, env = "SUPER_ADMIN_EMAIL")]
        email: String,
        #[arg(long, env = "SUPER_ADMIN_NAME", default_value = "Super Admin")]
        name: String,
    },
}

#[derive(Subcommand)]
pub enum BookingCommands {
    /// List recent bookings
    List {
        #[arg(long)]
        call_log_id: Option<String>,
        /// 1 to 500
        #[arg(long, default_value = "20", value_parser = clap::value_parser!(i64).range(1..=500))]
        limit: i64,
    },
}
