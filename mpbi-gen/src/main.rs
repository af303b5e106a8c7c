//! mpbi-gen - MemberPress bulk invoice generator
//!
//! `serve` (default) runs the HTTP service with the browser polling page.
//! `generate` drives a run against a running service from the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mpbi_common::api::load_shared_secret;
use mpbi_common::config::{CliOverrides, ConfigResolver, RootFolderInitializer, ServiceConfig};
use mpbi_common::db::init_database;
use mpbi_gen::client::PollingClient;
use mpbi_gen::models::{GenerationCriteria, GenerationMode};
use mpbi_gen::services::{build_renderer, cleanup};
use mpbi_gen::{build_router, AppState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for mpbi-gen
#[derive(Parser, Debug)]
#[command(name = "mpbi-gen")]
#[command(about = "Bulk PDF invoice generator for MemberPress transactions")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data folder holding the database and output directory
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Directory generated PDFs and archives are written to
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:5740
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Transactions rendered per advance request
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Log filter directive (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Generate invoices through a running service
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Service base URL
    #[arg(long, default_value = "http://127.0.0.1:5740", env = "MPBI_URL")]
    url: String,

    /// Operator account with the manage capability
    #[arg(long, env = "MPBI_OPERATOR")]
    operator: String,

    /// API shared secret (0 when authentication is disabled)
    #[arg(long, env = "MPBI_SHARED_SECRET", default_value = "0")]
    secret: i64,

    /// Generation mode: all or period
    #[arg(long, default_value = "all")]
    mode: GenerationMode,

    /// Comma-separated statuses (default: complete,pending,refunded; confirmed and failed are never invoiced)
    #[arg(long, value_delimiter = ',')]
    statuses: Option<Vec<String>>,

    /// Period start (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<String>,

    /// Period end (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<String>,

    /// Membership (product) id; 0 means all memberships
    #[arg(long)]
    membership: Option<i64>,

    /// Restrict to one customer's email
    #[arg(long)]
    email: Option<String>,

    /// Package the invoices into a ZIP archive when done
    #[arg(long)]
    zip: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing first; the configured level is applied once resolved
    let initial_level = cli.log_level.clone().unwrap_or_else(|| "info".to_string());
    let env_override = EnvFilter::try_from_default_env().ok();
    let honor_config_level = env_override.is_none();
    let (filter, filter_handle) =
        reload::Layer::new(env_override.unwrap_or_else(|| EnvFilter::new(&initial_level)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting MemberPress bulk invoice generator (mpbi-gen) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let overrides = CliOverrides {
        config_file: cli.config,
        root_folder: cli.root_folder,
        database: cli.database,
        output_dir: cli.output_dir,
        bind: cli.bind,
        batch_size: cli.batch_size,
        log_level: cli.log_level,
    };
    let config = ConfigResolver::new(overrides)
        .resolve()
        .context("Failed to resolve configuration")?;

    if honor_config_level && config.logging.level != initial_level {
        match EnvFilter::try_new(&config.logging.level) {
            Ok(filter) => {
                if let Err(e) = filter_handle.reload(filter) {
                    warn!("Could not apply log level {}: {}", config.logging.level, e);
                }
            }
            Err(e) => warn!("Invalid log level {}: {}", config.logging.level, e),
        }
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Generate(args) => generate(args).await,
    }
}

async fn serve(config: ServiceConfig) -> Result<()> {
    let initializer = RootFolderInitializer::new(config.root_folder.clone());
    initializer.ensure_directory_exists()?;
    info!("Root folder: {}", config.root_folder.display());

    info!("Database path: {}", config.database_path.display());
    let pool = match init_database(&config.database_path).await {
        Ok(pool) => {
            info!("✓ Connected to database");
            pool
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e.into());
        }
    };

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output_dir.display()
        )
    })?;
    info!("Output directory: {}", config.output_dir.display());

    let shared_secret = load_shared_secret(&pool)
        .await
        .context("Failed to load shared secret")?;
    if shared_secret == 0 {
        warn!("API authentication disabled (shared_secret = 0)");
    } else {
        info!("✓ Loaded shared secret for API authentication");
    }

    let renderer = build_renderer(&config.renderer);
    if renderer.is_available().await {
        info!("Invoice renderer: {}", renderer.name());
    } else {
        warn!(
            "Invoice renderer {} is not available; generation requests will fail",
            renderer.name()
        );
    }

    let _sweeper = cleanup::start_sweeper(
        pool.clone(),
        config.staleness_secs,
        config.cleanup_interval_secs,
    );

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(pool, config, renderer, shared_secret);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("mpbi-gen listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn generate(args: GenerateArgs) -> Result<()> {
    let criteria = GenerationCriteria {
        mode: args.mode,
        statuses: args.statuses,
        start_date: args.start_date,
        end_date: args.end_date,
        membership_id: args.membership,
        customer_email: args.email,
    };

    let client = PollingClient::new(args.url, args.operator, args.secret);
    let report = client
        .run(&criteria, args.zip, |snapshot| {
            info!(
                "Progress: {}/{} ({}%), {} errors",
                snapshot.processed,
                snapshot.total,
                snapshot.percentage,
                snapshot.errors.len()
            );
        })
        .await?;

    println!("{}", report.message);
    for error in &report.errors {
        println!("  {}", error);
    }
    if let Some(archive) = &report.archive {
        println!("Download: {} ({} files)", archive.zip_url, archive.file_count);
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
