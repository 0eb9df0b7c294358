use clap::Parser;
use timekeep_core::{SqliteStorage, TimekeepConfig};
use tracing_subscriber::{fmt, EnvFilter};

use timekeep_server::{NotificationHub, ServiceLifecycle, StorageFacade};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "timekeep.toml")]
    config: String,

    #[arg(long)]
    health: bool,

    /// Keep everything in memory; nothing is written to disk.
    #[arg(long)]
    memory: bool,
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match TimekeepConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    if args.health {
        let pool = match timekeep_core::db::create_pool(&config.database).await {
            Ok(p) => p,
            Err(e) => {
                println!("❌ Database connection failed: {}", e);
                std::process::exit(1);
            }
        };
        match timekeep_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ SQLite connected: {}", v),
            Err(e) => {
                println!("❌ SQLite check failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ timekeep health check passed");
        return Ok(());
    }

    let lifecycle = ServiceLifecycle::new(config.service.clone());
    let Some(running) = lifecycle.start().await? else {
        // Not an error: the running instance keeps serving.
        return Ok(());
    };

    let pool = if args.memory {
        timekeep_core::db::create_memory_pool().await?
    } else {
        timekeep_core::db::create_pool(&config.database).await?
    };
    let storage = SqliteStorage::new(pool, &config.tracking)?;
    let facade = StorageFacade::new(storage, NotificationHub::new());
    facade.ensure_defaults().await?;

    let reason = running.serve(facade, interrupted()).await?;
    tracing::info!("Exited: {:?}", reason);
    Ok(())
}
