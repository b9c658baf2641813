//! File watching for live reload.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use quill_static::is_page;
use tokio::sync::mpsc as async_mpsc;

/// Events emitted by the file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// HTML page was modified
    PageModified(PathBuf),

    /// Any other file was modified
    AssetModified(PathBuf),

    /// File was created
    Created(PathBuf),

    /// File was deleted
    Deleted(PathBuf),
}

impl WatchEvent {
    /// Path the event is about.
    pub fn path(&self) -> &Path {
        match self {
            Self::PageModified(path)
            | Self::AssetModified(path)
            | Self::Created(path)
            | Self::Deleted(path) => path,
        }
    }
}

/// File watcher for detecting changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create a new file watcher for the given paths.
    ///
    /// Returns the watcher and a channel to receive events.
    pub fn new(
        paths: &[PathBuf],
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                let _ = sync_tx.send(event);
            }
        })
        .map_err(std::io::Error::other)?;

        for path in paths {
            if path.exists() {
                watcher
                    .watch(path, RecursiveMode::Recursive)
                    .map_err(std::io::Error::other)?;
            } else {
                tracing::warn!("Not watching missing path {}", path.display());
            }
        }

        // Forward events from the notify thread, dropping bursts
        std::thread::spawn(move || {
            let debounce = Duration::from_millis(100);
            let mut last_event: Option<std::time::Instant> = None;

            while let Ok(event) = sync_rx.recv() {
                let now = std::time::Instant::now();
                if last_event.is_some_and(|last| now.duration_since(last) < debounce) {
                    continue;
                }
                last_event = Some(now);

                for path in event.paths {
                    if let Some(watch_event) = classify_event(&path, &event.kind) {
                        if async_tx.blocking_send(watch_event).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

/// Classify a notify event into a WatchEvent.
fn classify_event(path: &Path, kind: &notify::EventKind) -> Option<WatchEvent> {
    use notify::EventKind;

    let path = path.to_path_buf();

    match kind {
        EventKind::Create(_) => Some(WatchEvent::Created(path)),
        EventKind::Remove(_) => Some(WatchEvent::Deleted(path)),
        EventKind::Modify(_) => {
            if is_page(&path) {
                Some(WatchEvent::PageModified(path))
            } else {
                Some(WatchEvent::AssetModified(path))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn classifies_events() {
        let modify = notify::EventKind::Modify(ModifyKind::Any);

        assert_eq!(
            classify_event(Path::new("pages/index.html"), &modify),
            Some(WatchEvent::PageModified(PathBuf::from("pages/index.html")))
        );
        assert_eq!(
            classify_event(Path::new("pages/site.css"), &modify),
            Some(WatchEvent::AssetModified(PathBuf::from("pages/site.css")))
        );
        assert_eq!(
            classify_event(
                Path::new("pages/new.html"),
                &notify::EventKind::Create(CreateKind::File)
            ),
            Some(WatchEvent::Created(PathBuf::from("pages/new.html")))
        );
        assert_eq!(
            classify_event(Path::new("pages/a.html"), &notify::EventKind::Any),
            None
        );
    }

    #[tokio::test]
    async fn watches_file_changes() {
        let temp = tempdir().unwrap();
        let test_file = temp.path().join("index.html");

        // Create the watcher first (so it catches file creation)
        let (watcher, mut rx) = FileWatcher::new(&[temp.path().to_path_buf()]).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&test_file, "<p>created</p>").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        drop(watcher);

        assert!(event.is_ok(), "timeout waiting for file watch event");
        assert!(event.unwrap().is_some(), "channel should not be closed");
    }
}
