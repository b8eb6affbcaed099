//! Tierwatch CLI
//!
//! Local execution entry point: one-shot commands plus the long-running
//! `watch` loop.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tierwatch::{
    error::{AppError, Result},
    models::{Config, Tier, pct},
    pipeline::{Components, SyncMode},
    services::Lookup,
};

/// Tierwatch - tier data and news watcher
#[derive(Parser, Debug)]
#[command(
    name = "tierwatch",
    version,
    about = "Tier data scraper and news watcher"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "tierwatch.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the sync and refresh loops until Ctrl-C
    Watch,

    /// Run one news sync
    Sync {
        /// Apply the backfill cap, as on first activation
        #[arg(long)]
        cold: bool,
    },

    /// Print the tier list
    Tiers {
        /// Role filter (default: all)
        #[arg(short, long)]
        role: Option<String>,

        /// Only show one tier (S, A, B, C, D, F)
        #[arg(short, long)]
        tier: Option<String>,
    },

    /// Show stats for one subject
    Stats {
        name: String,

        #[arg(short, long)]
        role: Option<String>,

        /// Also save the subject's icon to this file
        #[arg(long)]
        icon: Option<PathBuf>,
    },

    /// List names matching a prefix or substring
    Suggest {
        query: String,

        #[arg(short, long)]
        role: Option<String>,
    },

    /// Rebuild the name index for every configured role
    Refresh,

    /// Mark a URL as already delivered
    Seed { url: String },

    /// Forget every delivered URL
    Reset,

    /// Validate the configuration file
    Validate,

    /// Show current state info
    Info,
}

/// Initialize logging based on verbosity flag and the configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.config);
    let config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default(),
    };
    init_logging(cli.verbose, &config.logging.level);

    match loaded {
        Ok(_) => log::info!("Loaded configuration from {}", cli.config.display()),
        Err(e) => log::warn!(
            "Config load failed from {}: {}. Using defaults.",
            cli.config.display(),
            e
        ),
    }

    if let Command::Validate = cli.command {
        log::info!("Validating configuration...");
        if let Err(e) = config.validate() {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
        log::info!("All validations passed!");
        return Ok(());
    }

    let app = Components::from_config(config)?;

    match cli.command {
        Command::Watch => {
            let service = app.start().await;
            tokio::signal::ctrl_c().await?;
            log::info!("Shutting down...");
            service.shutdown().await?;
        }

        Command::Sync { cold } => {
            let mode = if cold { SyncMode::Cold } else { SyncMode::Warm };
            match app.watcher.sync(mode).await? {
                Some(report) => log::info!(
                    "Sync complete: {} candidates, {} unseen, {} held back, {} delivered ({} degraded), {} failed",
                    report.candidates,
                    report.unseen,
                    report.held_back,
                    report.delivered,
                    report.degraded,
                    report.failed
                ),
                None => log::warn!("A sync is already running"),
            }
        }

        Command::Tiers { role, tier } => {
            let only = match tier.as_deref() {
                Some(label) => Some(
                    Tier::parse(label)
                        .ok_or_else(|| AppError::validation(format!("Unknown tier: {label}")))?,
                ),
                None => None,
            };
            let role = app.config.tiers.resolve_role(role.as_deref());
            let list = app.tiers.tier_list(&role).await?;

            if list.is_empty() {
                println!("No tier data for role {role}");
            }
            for (tier, names) in list.tiers(only) {
                println!("{tier}: {}", names.join(", "));
            }
        }

        Command::Stats { name, role, icon } => {
            let role = app.config.tiers.resolve_role(role.as_deref());
            match app.tiers.lookup(&role, &name).await? {
                Lookup::Found(record) => {
                    println!("{} ({role})", record.name);
                    println!(
                        "  Tier:     {}",
                        record.tier.map_or("-", |t| t.as_str())
                    );
                    println!("  Win rate: {}", pct(record.win_rate));
                    println!("  Pick rate: {}", pct(record.pick_rate));
                    println!("  Ban rate: {}", pct(record.ban_rate));
                    if let Some(matches) = record.matches {
                        println!("  Matches:  {matches}");
                    }
                    if let Some(path) = icon {
                        match app.tiers.icon(&record.slug()).await {
                            Some(bytes) => {
                                tokio::fs::write(&path, bytes.as_slice()).await?;
                                log::info!("Icon saved to {}", path.display());
                            }
                            None => log::warn!("No icon available for {}", record.name),
                        }
                    }
                }
                Lookup::Missing { suggestions } if suggestions.is_empty() => {
                    println!("No subject named {name:?}");
                }
                Lookup::Missing { suggestions } => {
                    println!("No subject named {name:?}. Did you mean: {}?", suggestions.join(", "));
                }
            }
        }

        Command::Suggest { query, role } => {
            let role = app.config.tiers.resolve_role(role.as_deref());
            app.names.load().await;
            for name in app.names.suggest(&role, &query).await {
                println!("{name}");
            }
        }

        Command::Refresh => {
            app.names.load().await;
            let report = app.names.refresh().await?;
            for (role, e) in &report.failed {
                log::error!("Role {} failed: {}", role, e);
            }
            log::info!(
                "Refreshed {} of {} roles",
                report.refreshed.len(),
                report.refreshed.len() + report.failed.len()
            );
        }

        Command::Seed { url } => {
            if app.state.seed(&url).await? {
                log::info!("Marked {} as delivered", url);
            } else {
                log::info!("{} was already in the ledger", url);
            }
        }

        Command::Reset => {
            let mut ledger = app.state.load_ledger().await;
            let forgotten = ledger.len();
            ledger.reset();
            app.state.save_ledger(&ledger).await?;
            log::info!("Forgot {} delivered URLs", forgotten);
        }

        Command::Validate => {}

        Command::Info => {
            let storage = &app.config.storage;
            log::info!("Storage directory: {}", storage.dir.display());
            let allow = app.config.news.allow_list();
            let hosts: Vec<&str> = allow.hosts().collect();
            log::info!("Allowed news hosts: {}", hosts.join(", "));

            let ledger = app.state.load_ledger().await;
            log::info!("Delivered items: {}", ledger.len());
            match ledger.last_checked_at {
                Some(at) => log::info!("Last checked: {}", at),
                None => log::info!("No sync recorded yet."),
            }

            let names = app.state.load_names().await;
            log::info!("Name index roles: {}", names.categories.len());
            if let Some(at) = names.updated_at {
                log::info!("Name index updated: {}", at);
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
