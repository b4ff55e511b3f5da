//! Note directory watcher
//!
//! Watches directories for note file changes and feeds every change to the
//! [`SyncCoordinator`]. Debouncing of bursts is left to the coordinator.

use crate::sync::SyncCoordinator;
use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

/// Watcher that requests a sync whenever a note file changes
pub struct NoteWatcher {
    coordinator: Arc<SyncCoordinator>,
    extensions: Arc<Vec<String>>,
    watched_paths: Arc<RwLock<HashSet<PathBuf>>>,
    stop_tx: Option<mpsc::Sender<()>>,
}

impl NoteWatcher {
    pub fn new(coordinator: Arc<SyncCoordinator>, extensions: Vec<String>) -> Self {
        Self {
            coordinator,
            extensions: Arc::new(extensions),
            watched_paths: Arc::new(RwLock::new(HashSet::new())),
            stop_tx: None,
        }
    }

    /// Register a directory to watch. Takes effect on `start`.
    pub async fn watch(&mut self, path: &Path) -> Result<()> {
        let path = path.canonicalize().context("Failed to canonicalize path")?;

        let mut watched = self.watched_paths.write().await;
        if watched.insert(path.clone()) {
            tracing::info!("Now watching: {}", path.display());
        }
        Ok(())
    }

    /// Start the watcher background task
    pub async fn start(&mut self) -> Result<()> {
        if self.stop_tx.is_some() {
            return Ok(()); // Already running
        }

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let (event_tx, mut event_rx) = mpsc::channel::<PathBuf>(100);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) if is_content_change(&event.kind) => {
                    for path in event.paths {
                        // Runs on notify's own thread
                        let _ = event_tx.blocking_send(path);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Watch error: {}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .context("Failed to create watcher")?;

        for path in self.watched_paths.read().await.iter() {
            watcher
                .watch(path, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", path.display()))?;
        }

        self.stop_tx = Some(stop_tx);
        let coordinator = self.coordinator.clone();
        let extensions = self.extensions.clone();

        tokio::spawn(async move {
            // Keep watcher alive until stop signal
            let _watcher = watcher;
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::info!("Note watcher stopping");
                        break;
                    }
                    Some(path) = event_rx.recv() => {
                        if !should_sync_note(&path, &extensions) {
                            continue;
                        }
                        match tokio::fs::read_to_string(&path).await {
                            Ok(body) => {
                                let note_id = note_id_for(&path);
                                tracing::debug!(note_id = %note_id, "Note changed");
                                // Completion is reported through the metrics sink
                                drop(coordinator.request_sync(&note_id, body));
                            }
                            Err(e) => {
                                tracing::debug!("Skipping {}: {}", path.display(), e);
                            }
                        }
                    }
                }
            }
        });

        tracing::info!("Note watcher started");
        Ok(())
    }

    /// Stop the watcher
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(()).await;
        }
    }

    /// Get currently watched paths
    pub async fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched_paths.read().await.iter().cloned().collect()
    }
}

/// Note id used for a note file: its canonical absolute path.
///
/// Falls back to the path as given when it cannot be resolved (for example
/// after the file was removed).
pub fn note_id_for(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// Check if a file is a note based on extension and path
fn should_sync_note(path: &Path, extensions: &[String]) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    if !extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)) {
        return false;
    }

    // Skip hidden files and directories (editor swap files, .git, ...)
    !path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| s.starts_with('.') && s != "." && s != "..")
    })
}
