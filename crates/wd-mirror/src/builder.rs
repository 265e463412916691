//! Mirror tree construction.
//!
//! The mirror is a private copy of the source tree in a scratch directory.
//! HTML files carry the reload marker, everything else is copied byte for
//! byte, and one generated client script sits at the root. The HTTP layer
//! serves the mirror, never the source.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::MirrorError;
use crate::inject::inject_reload_script;
use crate::script::{ClientScriptOptions, SCRIPT_FILENAME};

/// Receives every directory the mirror visits so it can be watched.
pub trait DirectoryRegistry {
    /// Start watching `dir` (non-recursively) for changes.
    fn register(&mut self, dir: &Path) -> Result<(), MirrorError>;
}

/// A built mirror tree.
///
/// The scratch directory is removed when the mirror is dropped.
#[derive(Debug)]
pub struct Mirror {
    scratch: TempDir,
    /// Canonical mirror root; notification paths are compared against it.
    root: PathBuf,
    /// Canonical source root.
    source_root: PathBuf,
}

impl Mirror {
    /// Directory the HTTP layer serves.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory being mirrored.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Path of `path` relative to the source root.
    pub fn relative_path<'a>(&self, path: &'a Path) -> Result<&'a Path, MirrorError> {
        path.strip_prefix(&self.source_root)
            .map_err(|_| MirrorError::OutsideRoot(path.to_path_buf()))
    }

    /// Whether `path` lies inside the mirror itself.
    ///
    /// Only possible when the scratch directory was allocated inside the
    /// source tree.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root) || path.starts_with(self.scratch.path())
    }

    /// Mirror a single source file, returning the path written.
    pub fn mirror_file(&self, source: &Path) -> Result<PathBuf, MirrorError> {
        let target = self.root.join(self.relative_path(source)?);
        let content = fs::read(source).map_err(|e| MirrorError::read(source, e))?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| MirrorError::write(parent, e))?;
        }
        fs::write(&target, inject_reload_script(&content))
            .map_err(|e| MirrorError::write(&target, e))?;

        Ok(target)
    }

    /// Mirror `dir` and everything below it, registering each directory.
    pub fn mirror_dir(
        &self,
        dir: &Path,
        registry: &mut impl DirectoryRegistry,
    ) -> Result<(), MirrorError> {
        if self.contains(dir) {
            return Ok(());
        }

        let target = self.root.join(self.relative_path(dir)?);
        fs::create_dir_all(&target).map_err(|e| MirrorError::write(&target, e))?;
        registry.register(dir)?;

        let entries = fs::read_dir(dir).map_err(|e| MirrorError::read(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| MirrorError::read(dir, e))?;
            let path = entry.path();
            if self.contains(&path) {
                continue;
            }

            // Follow symlinks so linked files are copied by content
            let metadata = fs::metadata(&path).map_err(|e| MirrorError::read(&path, e))?;
            if metadata.is_dir() {
                self.mirror_dir(&path, registry)?;
            } else {
                self.mirror_file(&path)?;
            }
        }

        Ok(())
    }
}

/// Build a mirror of `source_root` in a fresh scratch directory.
///
/// Every directory is handed to `registry`, every file is copied with the
/// reload marker injected into HTML, and the client script is written last
/// so it wins over a source file of the same name. Any failure aborts the
/// build; the partial scratch directory is removed.
pub fn build_mirror(
    source_root: &Path,
    script: &ClientScriptOptions,
    registry: &mut impl DirectoryRegistry,
) -> Result<Mirror, MirrorError> {
    let source_root = source_root
        .canonicalize()
        .map_err(|source| MirrorError::SourceRoot {
            path: source_root.to_path_buf(),
            source,
        })?;
    if !source_root.is_dir() {
        return Err(MirrorError::SourceRoot {
            path: source_root,
            source: std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
        });
    }

    let scratch = tempfile::Builder::new()
        .prefix("wd_")
        .tempdir()
        .map_err(MirrorError::Scratch)?;
    let root = scratch.path().canonicalize().map_err(MirrorError::Scratch)?;

    tracing::info!(
        source = %source_root.display(),
        mirror = %root.display(),
        "Mirroring source directory"
    );

    let mirror = Mirror {
        scratch,
        root,
        source_root,
    };
    mirror.mirror_dir(&mirror.source_root, registry)?;

    let script_path = mirror.root.join(SCRIPT_FILENAME);
    fs::write(&script_path, script.render()).map_err(|e| MirrorError::write(&script_path, e))?;

    Ok(mirror)
}
