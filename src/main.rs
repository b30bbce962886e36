mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ListKindArg};
use medley_core::config::Config;
use medley_core::{Collection, MediaItemId, Playlist};
use medley_server::context::AppContext;
use rand::RngCore;
use std::path::Path;

/// Minimum password length accepted by `create-user`.
const MIN_PASSWORD_LEN: usize = 8;

fn load_config(path: Option<&Path>) -> Result<Config> {
    let (config, _) = Config::load_or_default(path)?;
    Ok(config)
}

async fn serve(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let (mut config, resolved_path) = Config::load_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting medley");
    medley_server::start(config, resolved_path).await?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "medley=trace,medley_server=trace,medley_sync=trace,medley_clients=debug,medley_db=debug,tower_http=debug".to_string()
        } else {
            "medley=debug,medley_server=debug,medley_sync=debug,medley_clients=info,medley_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(host, port, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("medley {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::HashPassword { password } => hash_password(&password),
        Commands::GenerateApiKey => {
            println!("{}", generate_api_key());
            Ok(())
        }
        Commands::CreateUser {
            username,
            password,
            admin,
        } => create_user(cli.config.as_deref(), &username, &password, admin),
        Commands::Sync { list, kind } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(sync(cli.config.as_deref(), list.as_deref(), kind))
        }
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let (config, source) = Config::load_or_default(path)?;
    match source {
        Some(p) => println!("Validating config: {}", p.display()),
        None => println!("No config file found, using defaults"),
    }
    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Database: {}", config.server.db_path.display());
    println!("  Auth enabled: {}", config.auth.enabled);
    println!(
        "  Background sync: {} (every {}s)",
        config.sync.enabled, config.sync.interval_secs
    );

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in warnings {
            println!("  - {warning}");
        }
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<()> {
    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST).context("failed to hash password")?;
    println!("{hash}");
    Ok(())
}

fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn create_user(config_path: Option<&Path>, username: &str, password: &str, admin: bool) -> Result<()> {
    let username = username.trim();
    if username.is_empty() {
        anyhow::bail!("username cannot be empty");
    }
    if password.len() < MIN_PASSWORD_LEN {
        anyhow::bail!("password must be at least {MIN_PASSWORD_LEN} characters");
    }
    let config = load_config(config_path)?;
    let db = medley_server::open_database(&config)?;
    let conn = medley_db::pool::get_conn(&db)?;

    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST).context("failed to hash password")?;
    let role = if admin { "admin" } else { "user" };
    let user = medley_db::queries::users::create_user(&conn, username, &hash, role)?;
    println!("Created {role} '{}' ({})", user.username, user.id);
    Ok(())
}

async fn sync(config_path: Option<&Path>, list: Option<&str>, kind: ListKindArg) -> Result<()> {
    let config = load_config(config_path)?;
    let db = medley_server::open_database(&config)?;
    let ctx = AppContext::new(db, config);

    let report = match list {
        Some(raw) => {
            let id: MediaItemId = raw
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid list id '{raw}': {e}"))?;
            let report = match kind {
                ListKindArg::Playlist => medley_server::lists::sync::<Playlist>(&ctx, None, id, None).await?,
                ListKindArg::Collection => {
                    medley_server::lists::sync::<Collection>(&ctx, None, id, None).await?
                }
            };
            serde_json::to_value(report)?
        }
        None => serde_json::to_value(medley_server::scheduler::run_pass(&ctx).await)?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
