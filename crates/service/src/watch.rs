use std::path::PathBuf;
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::rescan::ScanRequest;
use crate::service::{MusicService, ServiceError};

// Called at startup and again whenever the location list changes; replacing
// the stored watcher drops the previous one and ends its event loop.
pub fn configure_watcher(service: &MusicService) {
    let config = service.config.read().clone();
    if !config.watch_music {
        info!("Watcher disabled (watch_music=false)");
        *service.watcher.write() = None;
        return;
    }
    if config.locations.is_empty() {
        *service.watcher.write() = None;
        return;
    }

    let watch_debounce_secs = if config.watch_debounce_secs == 0 {
        2
    } else {
        config.watch_debounce_secs
    };
    let debounce = Duration::from_secs(watch_debounce_secs);
    let roots: Vec<PathBuf> = config.locations.iter().map(PathBuf::from).collect();

    match setup_watcher(service.clone(), &roots, debounce) {
        Ok(watcher) => {
            info!(
                "Watching {} locations for changes (debounce {}s)",
                roots.len(),
                debounce.as_secs()
            );
            *service.watcher.write() = Some(watcher);
        }
        Err(err) => {
            warn!("Failed to start watcher: {}", err);
            *service.watcher.write() = None;
        }
    }
}

fn setup_watcher(
    service: MusicService,
    roots: &[PathBuf],
    debounce: Duration,
) -> Result<RecommendedWatcher, notify::Error> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        NotifyConfig::default(),
    )?;

    for root in roots {
        if let Err(err) = watcher.watch(root, RecursiveMode::Recursive) {
            warn!("Failed to watch {}: {}", root.display(), err);
        }
    }

    tokio::spawn(async move {
        watch_loop(service, rx, debounce).await;
    });

    Ok(watcher)
}

async fn watch_loop(service: MusicService, mut rx: UnboundedReceiver<Event>, debounce: Duration) {
    loop {
        let event = match rx.recv().await {
            Some(event) => event,
            None => break,
        };
        if !is_relevant_event(&event) {
            continue;
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => {
                    info!("Filesystem change detected, rescanning catalog");
                    match service.scans.scan(ScanRequest::Full).await {
                        Ok(_) => {}
                        Err(ServiceError::ScanQueueClosed) => return,
                        // scan failures are logged by the coordinator
                        Err(_) => {}
                    }
                    break;
                }
                maybe_event = rx.recv() => {
                    if let Some(event) = maybe_event {
                        if !is_relevant_event(&event) {
                            continue;
                        }
                    } else {
                        return;
                    }
                }
            }
        }
    }
}

fn is_relevant_event(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
