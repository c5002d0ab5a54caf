use std::sync::Arc;

use tracing::info;
use ulid::Ulid;

use equiptrack::compactor;
use equiptrack::config::Config;
use equiptrack::engine::Engine;
use equiptrack::service::BookingService;

const USAGE: &str = "usage: equiptrack <list [page] [size] | user <user_id> [page] [size] | calendar <equipment_id> | compact | run>";

fn arg<T: std::str::FromStr>(args: &[String], idx: usize, what: &str) -> Result<Option<T>, String> {
    match args.get(idx) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| format!("invalid {what}: {raw}")),
    }
}

fn required<T: std::str::FromStr>(args: &[String], idx: usize, what: &str) -> Result<T, String> {
    arg(args, idx, what)?.ok_or_else(|| format!("missing {what}\n{USAGE}"))
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    equiptrack::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let wal_path = config.wal_path();
    let engine = Arc::new(Engine::open(&wal_path, config.engine_options())?);
    info!("opened {}", wal_path.display());
    info!("  equipment: {}", engine.equipment_count());
    info!("  overlap policy: {:?}", engine.options().overlap);

    let service = BookingService::from_engine(engine.clone(), &config);
    let args: Vec<String> = std::env::args().skip(1).collect();

    let output = match args.first().map(String::as_str) {
        Some("list") => {
            let page = arg(&args, 1, "page")?;
            let size = arg(&args, 2, "size")?;
            serde_json::to_string_pretty(&service.list_equipment(page, size).await?)?
        }
        Some("user") => {
            let user: Ulid = required(&args, 1, "user id")?;
            let page = arg(&args, 2, "page")?;
            let size = arg(&args, 3, "size")?;
            serde_json::to_string_pretty(&service.list_user_equipment(user, page, size).await?)?
        }
        Some("calendar") => {
            let equipment: Ulid = required(&args, 1, "equipment id")?;
            serde_json::to_string_pretty(&service.reservation_info(equipment).await?)?
        }
        Some("compact") => {
            if !compactor::compact_if_due(&engine, 0).await {
                return Err("compaction failed".into());
            }
            return Ok(());
        }
        Some("run") => {
            // Keep the engine open and compact in the background until shutdown.
            info!("  compact threshold: {}", config.compact_threshold);
            let compaction = tokio::spawn(compactor::run_compactor(engine.clone(), config.compact_threshold));
            shutdown_signal().await?;
            compaction.abort();
            info!("shutting down");
            return Ok(());
        }
        _ => return Err(USAGE.into()),
    };
    println!("{output}");
    Ok(())
}
