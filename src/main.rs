use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use facility_scout::config::{Config, DEFAULT_CONFIG_PATH};
use facility_scout::models::IdentityKey;
use facility_scout::schedule::{self, Schedule};
use facility_scout::scrapers::HttpFetcher;
use facility_scout::store::{MemoryStore, ReservationStore, SqliteStore};
use facility_scout::Orchestrator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "facility-scout", about = "Facility reservation crawler")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "FACILITY_SCOUT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Keep reservations in memory instead of the configured SQLite file
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one facility and print the outcome
    Crawl {
        /// Facility name as configured under [facilities]
        facility: String,
    },
    /// Crawl every configured facility
    CrawlAll,
    /// Crawl every configured facility on the configured schedule
    Watch,
    /// Show configured facilities
    Sources,
    /// Show stored reservations
    List {
        #[arg(short, long)]
        facility: Option<String>,
        /// Only this date (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Show the detail attributes of one stored reservation
    Details { facility: String, key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let store = open_store(&config, cli.memory)?;

    match cli.command {
        Commands::Crawl { facility } => {
            let orchestrator = build_orchestrator(&config, Arc::clone(&store))?;
            let outcome = orchestrator.run(&facility).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.is_ok() {
                std::process::exit(1);
            }
        }
        Commands::CrawlAll => {
            let orchestrator = Arc::new(build_orchestrator(&config, Arc::clone(&store))?);
            let outcomes = orchestrator.run_all().await;
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
        Commands::Watch => {
            if config.facilities.is_empty() {
                bail!("no facilities configured in {}", cli.config.display());
            }
            let initial = (
                Schedule::from_config(&config.schedule),
                Arc::new(build_orchestrator(&config, Arc::clone(&store))?),
            );
            let path = cli.config.clone();
            let reload = || -> anyhow::Result<(Schedule, Arc<Orchestrator>)> {
                let config = Config::load(&path)?;
                let orchestrator = build_orchestrator(&config, Arc::clone(&store))?;
                Ok((Schedule::from_config(&config.schedule), Arc::new(orchestrator)))
            };

            info!("👀 Watching {} facilities", config.facilities.len());
            let ticks = schedule::run_periodically(reload, initial, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            })
            .await;
            info!("Stopped after {} crawl rounds", ticks);
        }
        Commands::Sources => {
            println!("{}", serde_json::to_string_pretty(&config.sources())?);
        }
        Commands::List { facility, date } => {
            list(store.as_ref(), facility.as_deref(), date.as_deref()).await?;
        }
        Commands::Details { facility, key } => {
            let key = IdentityKey::new(key);
            let Some(reservation) = store.get(&facility, &key).await? else {
                bail!("no reservation {} for {}", key, facility);
            };
            println!("{} {} ({})", reservation.date, reservation.event, reservation.place);
            if reservation.details.is_empty() {
                println!("  (no details)");
            }
            for (label, value) in &reservation.details {
                println!("  {:<16} {}", label, value);
            }
        }
    }

    Ok(())
}

fn open_store(config: &Config, memory: bool) -> anyhow::Result<Arc<dyn ReservationStore>> {
    if memory {
        return Ok(Arc::new(MemoryStore::new()));
    }
    let path: &Path = &config.store.path;
    let store = SqliteStore::open(path)
        .with_context(|| format!("opening reservation store {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_orchestrator(
    config: &Config,
    store: Arc<dyn ReservationStore>,
) -> anyhow::Result<Orchestrator> {
    let fetcher = HttpFetcher::new(config.fetch.settings()).context("building HTTP client")?;
    Ok(Orchestrator::from_config(config, Arc::new(fetcher), store))
}

async fn list(
    store: &dyn ReservationStore,
    facility: Option<&str>,
    date: Option<&str>,
) -> anyhow::Result<()> {
    let facilities = match facility {
        Some(f) => vec![f.to_string()],
        None => store.facilities().await?,
    };

    let mut rows = Vec::new();
    for facility in &facilities {
        let found = match date {
            Some(d) => store.query_by_source_and_date(facility, d).await?,
            None => store.query_by_source(facility).await?,
        };
        rows.extend(found);
    }

    if rows.is_empty() {
        println!("No reservations found.");
        return Ok(());
    }

    println!(
        "{:<10} | {:<10} | {:<12} | {:<14} | {:<24} | {:<6} | {}",
        "Facility", "Date", "Place", "Department", "Event", "Status", "Key"
    );
    println!("{}", "-".repeat(160));
    for r in &rows {
        println!(
            "{:<10} | {:<10} | {:<12} | {:<14} | {:<24} | {:<6} | {}",
            truncate(&r.facility, 10),
            r.date,
            truncate(&r.place, 12),
            truncate(&r.department, 14),
            truncate(&r.event, 24),
            truncate(&r.approval, 6),
            r.key,
        );
    }
    println!("\n{} reservations", rows.len());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
