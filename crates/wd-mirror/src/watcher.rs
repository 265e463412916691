//! Change watcher.
//!
//! Listens for filesystem notifications on the directories the mirror
//! registered, re-mirrors each written file and emits a [`ChangeEvent`] once
//! the mirrored copy is up to date.
//!
//! notify delivers on its own thread; the callback forwards into a tokio
//! channel and all processing happens in [`ChangeWatcher::watch`].

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::builder::{DirectoryRegistry, Mirror};
use crate::debouncer::EventDebouncer;
use crate::error::{MirrorError, WatchError};
use crate::event::ChangeEvent;
use crate::script::SCRIPT_FILENAME;

/// Default quiet period before a write is acted on.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// How often pending writes are checked.
const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

/// Raw notifications buffered between notify's thread and the watch loop.
const RAW_BUFFER: usize = 100;

/// Watches registered directories and keeps the mirror up to date.
pub struct ChangeWatcher {
    dirs: WatchedDirs,
    raw: mpsc::Receiver<notify::Result<Event>>,
    debounce: Duration,
}

struct WatchedDirs(RecommendedWatcher);

impl DirectoryRegistry for WatchedDirs {
    fn register(&mut self, dir: &Path) -> Result<(), MirrorError> {
        self.0
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| MirrorError::Watch {
                path: dir.to_path_buf(),
                source,
            })
    }
}

impl ChangeWatcher {
    /// Create the platform watcher. No directory is watched yet.
    pub fn new(debounce: Duration) -> Result<Self, WatchError> {
        let (tx, raw) = mpsc::channel(RAW_BUFFER);
        let watcher = notify::recommended_watcher(move |res| {
            // Fails only once the watch loop is gone
            let _ = tx.blocking_send(res);
        })
        .map_err(WatchError::Create)?;

        Ok(Self {
            dirs: WatchedDirs(watcher),
            raw,
            debounce,
        })
    }

    /// Process notifications until `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation. A watcher error or an unexpectedly
    /// closed notification stream is returned as an error; the mirror can no
    /// longer be trusted after that. Dropping `events` on return is what
    /// tells the dispatcher the stream is over.
    pub async fn watch(
        self,
        mirror: Arc<Mirror>,
        events: mpsc::Sender<ChangeEvent>,
        cancel: CancellationToken,
    ) -> Result<(), WatchError> {
        let Self {
            mut dirs,
            mut raw,
            debounce,
        } = self;
        let mut debouncer = EventDebouncer::new(debounce);
        let mut tick = tokio::time::interval(DRAIN_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(root = %mirror.source_root().display(), "Watching for changes");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Change watcher stopped");
                    return Ok(());
                }
                notification = raw.recv() => {
                    let event = notification.ok_or(WatchError::StreamClosed)??;
                    if is_write(event.kind) {
                        let now = Instant::now();
                        for path in event.paths {
                            if !mirror.contains(&path) {
                                debouncer.record(path, now);
                            }
                        }
                    }
                }
                _ = tick.tick() => {
                    for path in debouncer.drain_ready(Instant::now()) {
                        refresh(&mirror, &mut dirs, &path, &events);
                    }
                }
            }
        }
    }
}

impl DirectoryRegistry for ChangeWatcher {
    fn register(&mut self, dir: &Path) -> Result<(), MirrorError> {
        self.dirs.register(dir)
    }
}

/// Whether `kind` means new bytes may be at the event's path.
fn is_write(kind: EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(CreateKind::File | CreateKind::Folder | CreateKind::Any)
            | EventKind::Modify(
                ModifyKind::Data(_)
                    | ModifyKind::Any
                    | ModifyKind::Name(RenameMode::To | RenameMode::Both)
            )
    )
}

/// Bring the mirror up to date for one settled path.
fn refresh(
    mirror: &Mirror,
    dirs: &mut WatchedDirs,
    path: &Path,
    events: &mpsc::Sender<ChangeEvent>,
) {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Skipping vanished path");
            return;
        }
    };

    if metadata.is_dir() {
        match mirror.mirror_dir(path, dirs) {
            Ok(()) => tracing::debug!(path = %path.display(), "Mirrored new directory"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to mirror directory"),
        }
        return;
    }

    // The generated client owns this name at the mirror root
    if mirror
        .relative_path(path)
        .is_ok_and(|relative| relative == Path::new(SCRIPT_FILENAME))
    {
        tracing::warn!(
            path = %path.display(),
            "Ignoring change to a file shadowed by the generated client script"
        );
        return;
    }

    if let Err(e) = mirror.mirror_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to mirror file");
        return;
    }

    let Some(event) = mirror
        .relative_path(path)
        .ok()
        .and_then(ChangeEvent::from_relative)
    else {
        tracing::warn!(path = %path.display(), "Mirrored file has no URL path");
        return;
    };

    tracing::info!(path = %event, "File changed");
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            tracing::warn!(path = %event, "Change event dropped, dispatcher is behind");
        }
        Err(TrySendError::Closed(event)) => {
            tracing::debug!(path = %event, "No dispatcher for change event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_mirror;
    use crate::inject::RELOAD_MARKER;
    use crate::script::ClientScriptOptions;
    use notify::event::{DataChange, MetadataKind};
    use tokio::time::{sleep, timeout};

    const WAIT: Duration = Duration::from_secs(5);

    fn page(body: &str) -> String {
        format!("<!DOCTYPE html><html><head><title>t</title></head><body>{body}</body></html>")
    }

    struct Running {
        source: tempfile::TempDir,
        mirror: Arc<Mirror>,
        events: mpsc::Receiver<ChangeEvent>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<Result<(), WatchError>>,
    }

    fn start(source: tempfile::TempDir) -> Running {
        let mut watcher = ChangeWatcher::new(DEFAULT_DEBOUNCE).unwrap();
        let mirror = Arc::new(
            build_mirror(source.path(), &ClientScriptOptions::default(), &mut watcher).unwrap(),
        );
        let (tx, events) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.watch(Arc::clone(&mirror), tx, cancel.clone()));

        Running {
            source,
            mirror,
            events,
            cancel,
            handle,
        }
    }

    async fn wait_for_event(events: &mut mpsc::Receiver<ChangeEvent>, path: &str) {
        timeout(WAIT, async {
            loop {
                let event = events.recv().await.expect("event stream open");
                if event.path == path {
                    return;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no change event for {path}"));
    }

    #[test]
    fn test_is_write() {
        assert!(is_write(EventKind::Create(CreateKind::File)));
        assert!(is_write(EventKind::Create(CreateKind::Folder)));
        assert!(is_write(EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_write(EventKind::Modify(ModifyKind::Data(DataChange::Any))));
        assert!(is_write(EventKind::Modify(ModifyKind::Name(RenameMode::To))));

        assert!(!is_write(EventKind::Modify(ModifyKind::Name(RenameMode::From))));
        assert!(!is_write(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))));
        assert!(!is_write(EventKind::Remove(notify::event::RemoveKind::File)));
        assert!(!is_write(EventKind::Access(notify::event::AccessKind::Any)));
    }

    #[tokio::test]
    async fn test_watch_returns_on_cancel() {
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("index.html"), page("v1")).unwrap();
        let running = start(source);

        running.cancel.cancel();
        let result = timeout(WAIT, running.handle).await.unwrap().unwrap();

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_closes_event_stream() {
        let source = tempfile::tempdir().unwrap();
        let mut running = start(source);

        running.cancel.cancel();

        let next = timeout(WAIT, running.events.recv()).await.unwrap();
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn test_write_emits_one_event_after_refresh() {
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("index.html"), page("v1")).unwrap();
        let mut running = start(source);
        sleep(Duration::from_millis(100)).await;

        fs::write(running.source.path().join("index.html"), page("v2")).unwrap();

        let event = timeout(WAIT, running.events.recv()).await.unwrap().unwrap();
        assert_eq!(event.path, "/index.html");

        let mirrored = fs::read_to_string(running.mirror.root().join("index.html")).unwrap();
        assert!(mirrored.contains("v2"));
        assert!(mirrored.contains(RELOAD_MARKER));

        // One save, one event
        assert!(
            timeout(Duration::from_millis(400), running.events.recv())
                .await
                .is_err()
        );

        running.cancel.cancel();
        running.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_new_directory_is_mirrored_and_watched() {
        let source = tempfile::tempdir().unwrap();
        let mut running = start(source);
        sleep(Duration::from_millis(100)).await;

        let blog = running.source.path().join("blog");
        fs::create_dir(&blog).unwrap();
        fs::write(blog.join("post.html"), page("first")).unwrap();

        let mirrored = running.mirror.root().join("blog/post.html");
        timeout(WAIT, async {
            while !mirrored.exists() {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        fs::write(blog.join("post.html"), page("second")).unwrap();
        wait_for_event(&mut running.events, "/blog/post.html").await;

        timeout(WAIT, async {
            while !fs::read_to_string(&mirrored).unwrap().contains("second") {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        running.cancel.cancel();
        running.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_source_file_cannot_replace_client_script() {
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join(SCRIPT_FILENAME), "user v1").unwrap();
        let mut running = start(source);
        sleep(Duration::from_millis(100)).await;

        fs::write(running.source.path().join(SCRIPT_FILENAME), "user edit").unwrap();
        sleep(Duration::from_millis(20)).await;
        fs::write(running.source.path().join("style.css"), "body {}").unwrap();

        // Debounced writes are handled in first-seen order, so once the later
        // write is reported the script write has been dealt with
        let seen = timeout(WAIT, async {
            let mut seen = Vec::new();
            loop {
                let event = running.events.recv().await.expect("event stream open");
                seen.push(event.path.clone());
                if event.path == "/style.css" {
                    return seen;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(seen, vec!["/style.css".to_owned()]);
        let script = fs::read_to_string(running.mirror.root().join(SCRIPT_FILENAME)).unwrap();
        assert!(script.contains("new WebSocket"));
        assert!(!script.contains("user edit"));

        running.cancel.cancel();
        running.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_full_event_buffer_does_not_stall() {
        let source = tempfile::tempdir().unwrap();
        let mut watcher = ChangeWatcher::new(Duration::from_millis(20)).unwrap();
        let mirror = Arc::new(
            build_mirror(source.path(), &ClientScriptOptions::default(), &mut watcher).unwrap(),
        );
        let (tx, mut events) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.watch(Arc::clone(&mirror), tx, cancel.clone()));
        sleep(Duration::from_millis(100)).await;

        for name in ["a.css", "b.css", "c.css"] {
            fs::write(source.path().join(name), "x").unwrap();
        }

        // All three are mirrored even though only one event fits
        let root = mirror.root().to_path_buf();
        timeout(WAIT, async {
            while !["a.css", "b.css", "c.css"]
                .iter()
                .all(|name| root.join(name).exists())
            {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        assert!(events.recv().await.is_some());

        cancel.cancel();
        timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
    }
}
