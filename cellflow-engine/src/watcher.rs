//! File watcher actor
//!
//! Watches a single source file and serves its contents incrementally:
//! subscribers get the current text once, then an [`Overwrite`] diff each
//! time the contents actually change. Filesystem noise (editor temp files,
//! metadata-only events, double saves) is absorbed here so downstream
//! components only ever see real content changes.

use crate::error::EngineError;
use ambox::{Inbox, Mailbox, StateServer, Subscribe};
use cellflow_types::Overwrite;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

/// Messages handled by the watcher actor.
pub enum WatchMsg {
    /// Filesystem activity near the watched path.
    Changed,
    /// Downstream subscription to the text stream.
    Subscribe(Subscribe<String, Overwrite<String>>),
}

/// Actor state: the watched path and the text server.
pub struct FileWatcher {
    path: PathBuf,
    server: StateServer<String, Overwrite<String>>,
}

impl FileWatcher {
    /// Create a watcher for `path`, reading the initial contents eagerly
    /// so the first subscriber gets a meaningful snapshot.
    pub fn new(path: PathBuf) -> Self {
        let initial = read_or_empty(&path);
        Self {
            path,
            server: StateServer::new(initial),
        }
    }

    fn on_changed(&mut self) {
        let text = read_or_empty(&self.path);
        if *self.server.state() != text {
            tracing::debug!(path = %self.path.display(), bytes = text.len(), "file changed");
            self.server.update(Overwrite::OverwriteWith(text));
            self.server.flush_diffs();
        }
    }

    /// Serial message loop. Bursts of filesystem events are drained before
    /// the file is re-read, so one save produces one diff.
    pub async fn run(mut self, mut inbox: Inbox<WatchMsg>) {
        while let Some(msg) = inbox.recv().await {
            match msg {
                WatchMsg::Changed => {
                    let mut deferred = Vec::new();
                    while let Some(next) = inbox.try_recv() {
                        match next {
                            WatchMsg::Changed => {}
                            other => deferred.push(other),
                        }
                    }
                    self.on_changed();
                    for msg in deferred {
                        if let WatchMsg::Subscribe(request) = msg {
                            self.server.subscribe(request);
                        }
                    }
                }
                WatchMsg::Subscribe(request) => self.server.subscribe(request),
            }
        }
    }
}

/// Spawn the watcher actor and install the filesystem notifier.
///
/// The returned [`RecommendedWatcher`] must be kept alive for events to
/// keep flowing; dropping it detaches the actor from the filesystem.
pub fn spawn(path: &Path) -> Result<(Mailbox<WatchMsg>, RecommendedWatcher), EngineError> {
    let actor = FileWatcher::new(path.to_path_buf());
    let mailbox = ambox::launch("file-watcher", |inbox| actor.run(inbox));

    let events = mailbox.clone();
    let mut fs_watcher = RecommendedWatcher::new(
        move |result: notify::Result<notify::Event>| match result {
            Ok(_event) => events.send(WatchMsg::Changed),
            Err(err) => tracing::warn!("watcher error: {err}"),
        },
        notify::Config::default(),
    )
    .map_err(|source| EngineError::Watch {
        path: path.to_path_buf(),
        source,
    })?;

    // Watch the containing directory so rename-replace saves are seen.
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs_watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|source| EngineError::Watch {
            path: path.to_path_buf(),
            source,
        })?;

    Ok((mailbox, fs_watcher))
}

fn read_or_empty(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            tracing::debug!(path = %path.display(), "unreadable file treated as empty: {err}");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn subscription() -> (
        Subscribe<String, Overwrite<String>>,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedReceiver<Overwrite<String>>,
    ) {
        let (snap_tx, snap_rx) = mpsc::unbounded_channel();
        let (diff_tx, diff_rx) = mpsc::unbounded_channel();
        (
            Subscribe {
                reply: Mailbox::from_sender(snap_tx),
                subscriber: Mailbox::from_sender(diff_tx),
            },
            snap_rx,
            diff_rx,
        )
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = FileWatcher::new(dir.path().join("absent.cf"));

        let (request, mut snap_rx, _diff_rx) = subscription();
        watcher.server.subscribe(request);
        assert_eq!(snap_rx.try_recv().unwrap(), "");
    }

    #[test]
    fn test_unchanged_contents_emit_no_diff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.cf");
        std::fs::write(&path, "a\nb").unwrap();

        let mut watcher = FileWatcher::new(path.clone());
        let (request, mut snap_rx, mut diff_rx) = subscription();
        watcher.server.subscribe(request);
        assert_eq!(snap_rx.try_recv().unwrap(), "a\nb");

        // Event with no content change: nothing flows downstream.
        watcher.on_changed();
        assert!(diff_rx.try_recv().is_err());

        std::fs::write(&path, "a\nb\nc").unwrap();
        watcher.on_changed();
        assert_eq!(
            diff_rx.try_recv().unwrap(),
            Overwrite::OverwriteWith("a\nb\nc".to_string())
        );
    }

    #[test]
    fn test_deleted_file_becomes_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.cf");
        std::fs::write(&path, "a").unwrap();

        let mut watcher = FileWatcher::new(path.clone());
        std::fs::remove_file(&path).unwrap();
        watcher.on_changed();

        let (request, mut snap_rx, _diff_rx) = subscription();
        watcher.server.subscribe(request);
        assert_eq!(snap_rx.try_recv().unwrap(), "");
    }
}
