//! Citycast CLI - weather front-end server and its admin commands

use citycast::{config::expand_path, session::store, Config, Core, Database};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "citycast")]
#[command(author = "Citycast Team")]
#[command(version)]
#[command(about = "Citycast - weather search with a feeling-lucky city draw", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.citycast/config.toml", env = "CITYCAST_CONFIG")]
    config: PathBuf,

    /// Override server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override server host
    #[arg(long)]
    host: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Initialize a new config file with fresh secrets
    #[arg(long)]
    init: bool,

    /// Print a table and exit
    #[arg(long, value_enum)]
    display: Option<Display>,

    /// Replace the city table from an OpenWeatherMap city.list.json and exit
    #[arg(long, value_name = "FILE")]
    import_cities: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Display {
    /// User session history
    History,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("citycast={},tower_http=debug", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = expand_path(&args.config);

    // Handle --init flag
    if args.init {
        if config_path.exists() {
            tracing::warn!("Config file already exists: {}", config_path.display());
            return Ok(());
        }
        Config::create_default(&config_path)?;
        tracing::info!("Created default config at: {}", config_path.display());
        return Ok(());
    }

    // Load configuration
    let mut config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        tracing::warn!(
            "Config file not found at {}, using defaults",
            config_path.display()
        );
        Config::default()
    };
    config.apply_env_overrides();

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    if let Some(Display::History) = args.display {
        let db = Database::open(config.db_path())?;
        print_session_history(&db)?;
        db.close()?;
        return Ok(());
    }

    if let Some(path) = &args.import_cities {
        let db = Database::open(config.db_path())?;
        import_cities(&db, path)?;
        db.close()?;
        return Ok(());
    }

    let db = Arc::new(Database::open(config.db_path())?);
    let core = Core::with_database(config, db).await?;

    // Blocks until Ctrl+C / SIGTERM, then sweeps and closes the database
    core.run().await?;

    Ok(())
}

fn print_session_history(db: &Database) -> anyhow::Result<()> {
    let rows = db.with_conn_blocking(|conn| store::list_history(conn))?;

    println!("User Session History:\n");
    println!(
        "{:<20} | {:<24} | {:<24} | {:<16} | Session Key",
        "Username", "Logged In Time", "Status Updated At", "Status"
    );
    println!("{}", "_".repeat(110));
    for row in rows {
        println!(
            "{:<20} | {:<24} | {:<24} | {:<16} | {}",
            row.username,
            citycast::db::format_timestamp(row.login_time),
            citycast::db::format_timestamp(row.status_updated_at),
            row.status,
            row.token
        );
    }
    Ok(())
}

fn import_cities(db: &Database, path: &Path) -> anyhow::Result<()> {
    let count = db.with_conn_blocking(|conn| citycast::lucky::import::import_file(conn, path))?;
    let target = db
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    println!("Imported {} cities into {}", count, target);
    Ok(())
}
