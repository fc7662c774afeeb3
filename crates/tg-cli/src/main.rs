use std::{fs, sync::Arc};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tg_db::{MemTradeStore, PgTradeStore, TradeQuery, TradeStore};
use tracing::debug;

#[derive(Parser)]
#[command(name = "tg")]
#[command(about = "Tradegist trade journal CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Ingest a broker CSV export (trades or execution ledger) for one user
    Ingest {
        #[arg(long)]
        user: String,

        /// Path to the CSV file
        #[arg(long)]
        file: String,

        /// Use an in-memory store; nothing is persisted.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Run behavior analysis after ingest and print the tag counts.
        #[arg(long, default_value_t = false)]
        analyze: bool,

        /// Treat the file as an execution ledger
        /// (`date,ticker,action,quantity,price,amount`) and store FIFO round trips.
        #[arg(long, default_value_t = false)]
        ledger: bool,
    },

    /// Re-run behavior analysis for one user
    Analyze {
        #[arg(long)]
        user: String,
    },

    /// Print a user's trades with tags as JSON lines (newest first)
    Trades {
        #[arg(long)]
        user: String,

        #[arg(long, default_value_t = tg_db::DEFAULT_PAGE_LIMIT)]
        limit: u32,

        /// Case-insensitive symbol substring
        #[arg(long)]
        symbol: Option<String>,
    },

    /// Print daily metrics as JSON lines
    Metrics {
        #[arg(long)]
        user: String,

        /// Window like `30d`
        #[arg(long, default_value = "30d")]
        range: String,
    },

    /// Print the behavior catalog
    Behaviors,
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = tg_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = tg_db::status(&pool).await?;
                    println!("db_ok={} has_trades_table={}", s.ok, s.has_trades_table);
                }
                DbCmd::Migrate => {
                    tg_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = tg_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Ingest {
            user,
            file,
            dry_run,
            analyze,
            ledger,
        } => {
            let bytes = fs::read(&file).with_context(|| format!("read {file}"))?;
            let filename = std::path::Path::new(&file)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| file.clone());

            let store = open_store(dry_run).await?;
            let (run_id, c) = if ledger {
                let summary = tg_journal::ingest_ledger(&store, &bytes, &filename, &user).await?;
                for e in &summary.cash_events {
                    println!(
                        "cash_event date={} kind={} amount={} note={:?}",
                        e.date.date_naive(),
                        e.kind.as_str(),
                        e.amount.map(|a| a.to_string()).unwrap_or_default(),
                        e.note
                    );
                }
                println!(
                    "round_trips={} cash_events={} rows_ignored={}",
                    summary.round_trips,
                    summary.cash_events.len(),
                    summary.rows_ignored
                );
                (summary.run_id, summary.counters)
            } else {
                let summary = tg_journal::ingest_csv(&store, &bytes, &filename, &user).await?;
                (summary.run_id, summary.counters)
            };
            println!("run_id={run_id}");
            println!(
                "rows_processed={} rows_inserted={} rows_updated={} rows_failed={}",
                c.rows_processed, c.rows_inserted, c.rows_updated, c.rows_failed
            );

            if analyze {
                let a = tg_journal::analyze_user(store.as_ref(), &user).await?;
                println!(
                    "trades_analyzed={} tags_written={}",
                    a.trades_analyzed, a.tags_written
                );
            }
        }

        Commands::Analyze { user } => {
            let store = open_store(false).await?;
            let a = tg_journal::analyze_user(store.as_ref(), &user).await?;
            println!(
                "trades_analyzed={} tags_written={}",
                a.trades_analyzed, a.tags_written
            );
        }

        Commands::Trades {
            user,
            limit,
            symbol,
        } => {
            let store = open_store(false).await?;
            let mut q = TradeQuery::for_user(user);
            q.limit = limit;
            q.symbol = symbol;
            for t in tg_journal::list_trades_with_tags(store.as_ref(), q).await? {
                println!("{}", serde_json::to_string(&t)?);
            }
        }

        Commands::Metrics { user, range } => {
            let days = tg_behavior::parse_range(&range)
                .with_context(|| format!("invalid range '{range}'"))?;
            let store = open_store(false).await?;
            let today = Utc::now().date_naive();
            for m in tg_journal::daily_metrics(store.as_ref(), &user, today, days).await? {
                println!("{}", serde_json::to_string(&m)?);
            }
        }

        Commands::Behaviors => {
            for e in tg_behavior::CATALOG {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    e.code,
                    e.scope.as_str(),
                    e.category,
                    if e.is_positive { "+" } else { "-" },
                    e.label
                );
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn open_store(dry_run: bool) -> Result<Arc<dyn TradeStore>> {
    debug!(dry_run, "opening store");
    if dry_run {
        return Ok(Arc::new(MemTradeStore::new()));
    }
    let pool = tg_db::connect_from_env().await?;
    Ok(Arc::new(PgTradeStore::new(pool)))
}
