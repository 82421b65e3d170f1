mod users;

pub use users::UserCommands;

use clap::{Parser, Subcommand};

/// MedHeart Server - authentication and session API for heart monitoring
#[derive(Parser)]
#[command(name = "medheart-server")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server (default)
    Serve,

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Session maintenance commands
    #[command(subcommand)]
    Sessions(SessionCommands),
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Delete sessions past their expiry
    Prune,
}
