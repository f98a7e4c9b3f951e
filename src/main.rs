//! Main entry point for the warboard service and CLI
//!
//! `serve` (the default) runs the HTTP dashboard API until a shutdown
//! signal arrives. The other subcommands run one ledger operation against
//! the configured storage and exit.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};
use warboard::config::AppConfig;
use warboard::rating::difficulty::rank_nodes;
use warboard::rating::{ReportingPeriod, SortKey};
use warboard::service::{AppState, HealthCheck, HealthStatus};

/// Warboard - alliance war ledger with power ratings, node difficulty and kill streaks
#[derive(Parser)]
#[command(
    name = "warboard",
    version,
    about = "Alliance war ledger: power ratings, node difficulty and kill streaks",
    long_about = "Warboard keeps per-player kill and death tallies for the 50 war nodes, derives \
                 power ratings and node difficulty from them, tracks kill streaks and manages \
                 seasons and battlegroups. It serves a JSON dashboard API with Prometheus metrics."
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        global = true,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Data directory override
    #[arg(long, global = true, value_name = "DIR", help = "Override the ledger data directory")]
    data_dir: Option<PathBuf>,

    /// HTTP port override
    #[arg(short, long, global = true, value_name = "PORT", help = "Override HTTP server port")]
    port: Option<u16>,

    /// Enable debug mode
    #[arg(short, long, global = true, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        global = true,
        help = "Validate configuration and exit without touching the ledger"
    )]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the dashboard API, health and metrics endpoints
    Serve {
        /// Perform a health check and exit
        #[arg(long, help = "Perform a health check and exit with status code")]
        health_check: bool,
    },

    /// Print player rankings and battlegroup totals
    Rankings {
        /// Sort key: pr, kills, deaths or solo_rate
        #[arg(short, long, default_value = "pr")]
        sort: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Recalculate node difficulty from the live entry log
    Recalculate {
        /// Number of hardest nodes to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Import a roster sheet (CSV) and optionally a streak sheet
    ImportSheet {
        /// Roster sheet path
        #[arg(value_name = "CSV")]
        roster: PathBuf,

        /// Streak sheet path
        #[arg(long, value_name = "CSV")]
        streaks: Option<PathBuf>,

        /// Reset the difficulty table to the sheet's node defaults
        #[arg(long)]
        initialize_difficulty: bool,
    },
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
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
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("🛡️  Warboard Alliance War Ledger");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   HTTP: {}:{}",
        config.service.http_host, config.service.http_port
    );
    info!(
        "   Storage: {:?} ({})",
        config.storage.backend,
        config.storage.data_dir.display()
    );
    info!("   Import season: {}", config.sheet.import_season);
    info!(
        "   Solo rate multiplier: {}",
        config.rating.solo_rate_multiplier
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from file or environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(data_dir) = &args.data_dir {
        config.storage.data_dir = data_dir.clone();
    }

    if let Some(port) = args.port {
        config.service.http_port = port;
    }

    warboard::config::validate_config(&config)?;
    Ok(config)
}

/// Perform health check and return appropriate exit code
async fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let app_state = AppState::new(config).await?;
    let health = HealthCheck::check(&app_state.ledger(), &app_state.config().service.name).await?;

    println!("Health Check: {}", health.status);
    for check in &health.checks {
        println!(
            "  {}: {}{}",
            check.name,
            check.status,
            check.message
                .as_deref()
                .map(|m| format!(" ({})", m))
                .unwrap_or_default()
        );
    }
    println!("  Roster: {} players", health.stats.roster_size);
    println!("  Live entries: {}", health.stats.live_entries);

    if health.status == HealthStatus::Unhealthy {
        std::process::exit(1);
    }
    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    display_startup_banner(&config);

    info!("Initializing service components...");
    let mut app_state = AppState::new(config.clone()).await?;

    app_state.start().await?;

    info!("✅ Warboard is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");

    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("✅ Graceful shutdown completed successfully"),
        Ok(Err(e)) => warn!("Shutdown finished with errors: {}", e),
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    info!("🛑 Warboard stopped");
    Ok(())
}

async fn print_rankings(config: AppConfig, sort: &str, as_json: bool) -> Result<()> {
    let sort: SortKey = sort.parse()?;
    let app_state = AppState::new(config).await?;
    let dashboard = app_state
        .ledger()
        .dashboard(sort, ReportingPeriod::default())?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&dashboard)?);
        return Ok(());
    }

    println!(
        "{} - {} kills, {} deaths, alliance solo rate {:.3}",
        dashboard.season.name,
        dashboard.alliance.kills,
        dashboard.alliance.deaths,
        dashboard.alliance_solo_rate
    );
    println!(
        "{:>4}  {:<20} {:<4} {:>6} {:>6} {:>6} {:>10}",
        "#", "Player", "BG", "Kills", "Deaths", "Solo", "PR"
    );
    for (index, player) in dashboard.players.iter().enumerate() {
        println!(
            "{:>4}  {:<20} {:<4} {:>6} {:>6} {:>6.3} {:>10.2}",
            index + 1,
            player.name,
            player.battlegroup,
            player.total_kills,
            player.total_deaths,
            player.solo_rate,
            player.power_rating
        );
    }

    println!();
    for bg in &dashboard.battlegroups {
        println!(
            "{}. {}  PR {:.2}  kills {}  deaths {}  players {}/{}",
            bg.rank,
            bg.battlegroup,
            bg.total_power_rating,
            bg.total_kills,
            bg.total_deaths,
            bg.visible_player_count,
            bg.player_count
        );
    }
    Ok(())
}

async fn recalculate(config: AppConfig, top: usize) -> Result<()> {
    let app_state = AppState::new(config).await?;
    let table = app_state.ledger().recalculate_difficulty().await?;

    println!(
        "Recalculated {} nodes (bounds {} to {})",
        table.nodes.len(),
        table.settings.min_value,
        table.settings.max_value
    );
    for (node, value) in rank_nodes(&table).into_iter().take(top) {
        println!("  node {:>2}: {:.3}", node, value);
    }
    Ok(())
}

async fn import_sheet(
    config: AppConfig,
    roster: PathBuf,
    streaks: Option<PathBuf>,
    initialize_difficulty: bool,
) -> Result<()> {
    let app_state = AppState::new(config).await?;
    let ledger = app_state.ledger();

    let players = ledger.import_roster_sheet(&roster).await?;
    println!("Imported {} players from {}", players, roster.display());

    if let Some(path) = streaks {
        let records = ledger.import_streak_sheet(&path).await?;
        println!("Imported {} streak records from {}", records, path.display());
    }

    if initialize_difficulty {
        let table = ledger.initialize_difficulty_from_sheet().await?;
        println!("Initialized {} nodes from sheet defaults", table.nodes.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without touching the ledger");
        return Ok(());
    }

    let result = match args.command.unwrap_or(Command::Serve {
        health_check: false,
    }) {
        Command::Serve { health_check: true } => perform_health_check(config).await,
        Command::Serve { health_check: false } => serve(config).await,
        Command::Rankings { sort, json } => print_rankings(config, &sort, json).await,
        Command::Recalculate { top } => recalculate(config, top).await,
        Command::ImportSheet {
            roster,
            streaks,
            initialize_difficulty,
        } => import_sheet(config, roster, streaks, initialize_difficulty).await,
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
