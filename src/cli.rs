use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medley")]
#[command(author, version, about = "Media library aggregation across Plex, Jellyfin, Emby and Subsonic")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ListKindArg {
    Playlist,
    Collection,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server and background sync
    Serve {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default search paths if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,

    /// Generate a bcrypt password hash
    HashPassword {
        /// Password to hash
        password: String,
    },

    /// Generate a random API key for programmatic access
    GenerateApiKey,

    /// Create a user in the database
    CreateUser {
        username: String,
        password: String,

        /// Grant the admin role
        #[arg(long)]
        admin: bool,
    },

    /// Run one sync pass over auto-sync lists, or sync a single list
    Sync {
        /// Id of a single list to sync
        #[arg(long)]
        list: Option<String>,

        /// Kind of the list given with --list
        #[arg(long, value_enum, default_value = "playlist")]
        kind: ListKindArg,
    },
}
