//! Change events emitted after a file has been re-mirrored.

use std::fmt;
use std::path::{Component, Path};

/// The mirrored copy of a file was just refreshed.
///
/// `path` is relative to the served root, starts with `/` and uses `/` as
/// separator regardless of platform (e.g. `/index.html`, `/css/site.css`).
/// This is exactly the text sent to browsers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    /// Root-relative URL path of the changed file.
    pub path: String,
}

impl ChangeEvent {
    /// Create an event for an already root-relative URL path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Create an event from a path relative to the source root.
    ///
    /// Returns `None` for paths that climb out of the root or are not
    /// valid UTF-8.
    #[must_use]
    pub fn from_relative(relative: &Path) -> Option<Self> {
        let mut path = String::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => {
                    path.push('/');
                    path.push_str(segment.to_str()?);
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        if path.is_empty() {
            return None;
        }
        Some(Self { path })
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}
