use std::fs;

use catalog::CatalogStore;
use service::config::{config_path_from_env, load_or_create_config, resolve_path};
use service::{configure_watcher, MusicService};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let store_path_value = config.store_path.trim();
    let store_path_value = if store_path_value.is_empty() {
        "catalog.redb"
    } else {
        store_path_value
    };
    let store_path = resolve_path(&config_path, store_path_value);
    if let Some(parent) = store_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let store = CatalogStore::open(&store_path)?;

    let service = MusicService::start(config_path.clone(), config.clone(), store);
    if config.locations.is_empty() {
        info!(
            "No music locations configured yet; add one to {:?} or through the embedding UI.",
            config_path
        );
    } else {
        service.schedule_refresh();
    }
    configure_watcher(&service);

    shutdown_signal().await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
