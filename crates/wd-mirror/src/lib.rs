//! Mirror tree and change watching for wd.
//!
//! The served directory is never the source directory. At startup
//! [`build_mirror`] copies the source tree into a scratch directory,
//! injecting the reload marker into every HTML document and writing the
//! generated client script next to it. [`ChangeWatcher`] then keeps the copy
//! current: each settled write is re-mirrored and reported as a
//! [`ChangeEvent`].
//!
//! - HTML detection by content sniffing, not file extension
//! - Write debouncing so one save yields one event
//! - Non-recursive watches registered per mirrored directory
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//! use wd_mirror::{ChangeWatcher, ClientScriptOptions, DEFAULT_DEBOUNCE, build_mirror};
//!
//! let mut watcher = ChangeWatcher::new(DEFAULT_DEBOUNCE)?;
//! let mirror = Arc::new(build_mirror("site".as_ref(), &ClientScriptOptions::default(), &mut watcher)?);
//! let (tx, mut rx) = mpsc::channel(64);
//! tokio::spawn(watcher.watch(Arc::clone(&mirror), tx, CancellationToken::new()));
//! while let Some(event) = rx.recv().await {
//!     println!("changed: {event}");
//! }
//! ```

mod builder;
mod debouncer;
mod error;
mod event;
mod inject;
mod script;
mod sniff;
mod watcher;

pub use builder::{DirectoryRegistry, Mirror, build_mirror};
pub use error::{MirrorError, WatchError};
pub use event::ChangeEvent;
pub use inject::{RELOAD_MARKER, inject, inject_reload_script};
pub use script::{ClientScriptOptions, SCRIPT_FILENAME};
pub use sniff::{ContentType, sniff};
pub use watcher::{ChangeWatcher, DEFAULT_DEBOUNCE};
