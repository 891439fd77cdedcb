//! Command-line interface for Warden.

mod commands;

use clap::{Parser, Subcommand};

/// Warden - account, session and permission service
#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    #[command(alias = "daemon")]
    Serve,

    /// Write a default config.toml if none exists
    Init,

    /// Create an activated user in the Administrators group
    CreateAdmin {
        #[arg(long)]
        email: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// Falls back to the `WARDEN_ADMIN_PASSWORD` environment variable
        #[arg(long, env = "WARDEN_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Lift a temporary suspension
    Unsuspend {
        email: String,
    },

    /// List users with their lockout status
    #[command(alias = "ls")]
    Users {
        #[arg(default_value = "1")]
        page: u64,
    },
}

pub use commands::*;
