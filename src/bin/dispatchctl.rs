//! dispatchctl CLI: operator interface to the dispatch ledger.

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Arc;
use tracker_dispatch::config::{Config, PollerSettings};
use tracker_dispatch::db::Db;
use tracker_dispatch::ledger::{PgLedger, ProcessedLedger};
use tracker_dispatch::model::ItemId;
use tracker_dispatch::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "dispatchctl", about = "Inspect and repair tracker dispatch state")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Processed-item ledger operations
    Ledger {
        /// Ledger namespace (defaults to LEDGER_ADAPTER)
        #[arg(long)]
        adapter: Option<String>,
        #[command(subcommand)]
        action: LedgerAction,
    },
    /// Print the resolved poller configuration
    Config {
        /// TOML file with a [poller] table; the environment is used otherwise
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    /// List processed items, most recent first
    List {
        /// Maximum items to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one processed item
    Show {
        /// Tracker item ID
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Forget an item so a restarted poller dispatches it again
    Clear {
        /// Tracker item ID
        id: String,
    },
    /// Delete records older than the given age
    Purge {
        #[arg(long)]
        older_than_days: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Config { file } => cmd_config(file),
        Command::Ledger { adapter, action } => {
            let config = Config::from_env()?;
            let _guard = init_telemetry(TelemetryConfig {
                endpoint: config.otel_endpoint.clone(),
                service_name: "dispatchctl".to_string(),
                log_level: config.log_level.clone(),
            })?;

            let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
            db.migrate().await?;
            let adapter = adapter.unwrap_or(config.ledger_adapter);

            match action {
                LedgerAction::List { limit, json } => {
                    cmd_ledger_list(&db, &adapter, limit, json).await
                }
                LedgerAction::Show { id, json } => cmd_ledger_show(&db, &adapter, &id, json).await,
                LedgerAction::Clear { id } => {
                    cmd_ledger_clear(&db, &PgLedger::new(Arc::clone(&db), &adapter), &id).await
                }
                LedgerAction::Purge { older_than_days } => {
                    let ledger = PgLedger::new(Arc::clone(&db), &adapter);
                    cmd_ledger_purge(&ledger, older_than_days).await
                }
            }
        }
    }
}

fn cmd_config(file: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = match file {
        Some(path) => PollerSettings::load(&path)?,
        None => PollerSettings::from_env()?,
    };
    let config = settings.to_poller_config()?;

    println!("Scope:          {}", config.scope);
    println!("Trigger:        {}", config.labels.trigger);
    println!("In Progress:    {}", config.labels.in_progress);
    println!("Done:           {}", config.labels.done);
    println!("Failed:         {}", config.labels.failed);
    println!(
        "Projects:       {}",
        if config.project_ids.is_empty() {
            "(all)".to_string()
        } else {
            config.project_ids.join(", ")
        }
    );
    println!("Status Types:   {}", config.status_types.join(", "));
    println!("Page Size:      {}", config.page_size);
    println!("Interval:       {}s", config.poll_interval.as_secs());
    println!("Max Concurrent: {}", config.max_concurrent);
    Ok(())
}

async fn cmd_ledger_list(db: &Db, adapter: &str, limit: i64, json: bool) -> anyhow::Result<()> {
    let records = db.list_processed(adapter, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No processed items found.");
        return Ok(());
    }

    println!("{:<40}  {:<12}  PROCESSED", "ITEM", "OUTCOME");
    println!("{}", "-".repeat(72));

    for record in &records {
        println!(
            "{:<40}  {:<12}  {}",
            record.item_id,
            record.outcome,
            record.processed_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} item(s)", records.len());
    Ok(())
}

async fn cmd_ledger_show(db: &Db, adapter: &str, id: &str, json: bool) -> anyhow::Result<()> {
    let Some(record) = db.get_processed(adapter, id).await? else {
        anyhow::bail!("item {id} is not in the {adapter} ledger");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("Item:       {}", record.item_id);
    println!("Adapter:    {adapter}");
    println!("Outcome:    {}", record.outcome);
    println!("Processed:  {}", record.processed_at);
    Ok(())
}

async fn cmd_ledger_clear(db: &Db, ledger: &PgLedger, id: &str) -> anyhow::Result<()> {
    if db.get_processed(ledger.adapter(), id).await?.is_none() {
        println!("Item {id} was not marked; nothing to clear.");
        return Ok(());
    }
    ledger.unmark(&ItemId::new(id)).await?;
    println!("Cleared {id}. Remove its failed label before restarting the poller.");
    Ok(())
}

async fn cmd_ledger_purge(ledger: &PgLedger, older_than_days: u32) -> anyhow::Result<()> {
    let removed = ledger
        .purge_older_than(chrono::Duration::days(i64::from(older_than_days)))
        .await?;
    println!("Purged {removed} record(s) older than {older_than_days} day(s).");
    Ok(())
}
