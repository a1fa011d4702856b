//! Changelog resolution
//!
//! Names are looked up among the changelogs compiled into the binary first,
//! then on the filesystem: absolute paths as given, relative paths under the
//! configured changelog directory and then the working directory.
//!
//! A changelog read from disk is named by its path relative to the changelog
//! directory (or the working directory), so `site.toml` and
//! `/etc/cairn/changelogs/site.toml` record the same changeset identities.

use crate::domain::{ChangelogError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Changelog declaring no changesets, used when no name is given
pub const EMPTY_CHANGELOG: &str = "cairn-empty-changelog.toml";

/// Core changelog shipped with Cairn
pub const CORE_CHANGELOG: &str = "cairn-core-changelog.toml";

const BUNDLED: &[(&str, &str)] = &[
    (
        EMPTY_CHANGELOG,
        include_str!("../../../changelogs/cairn-empty-changelog.toml"),
    ),
    (
        CORE_CHANGELOG,
        include_str!("../../../changelogs/cairn-core-changelog.toml"),
    ),
];

/// Where a resolved changelog came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangelogOrigin {
    /// Compiled into the binary
    Bundled,
    /// Read from this path
    File(PathBuf),
}

/// A changelog located and read into memory
#[derive(Debug, Clone)]
pub struct ResolvedChangelog {
    /// Logical name recorded as the `file` part of changeset identities
    pub name: String,
    /// Where it was found
    pub origin: ChangelogOrigin,
    /// Document text
    pub contents: String,
}

impl ResolvedChangelog {
    /// Key used to detect include cycles
    pub fn key(&self) -> String {
        match &self.origin {
            ChangelogOrigin::Bundled => format!("bundled:{}", self.name),
            ChangelogOrigin::File(path) => {
                let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.clone());
                format!("file:{}", canonical.display())
            }
        }
    }

    /// Directory that relative includes and SQL files are resolved against
    pub fn base_dir(&self) -> Option<&Path> {
        match &self.origin {
            ChangelogOrigin::Bundled => None,
            ChangelogOrigin::File(path) => path.parent(),
        }
    }
}

/// Resolves changelog names to documents
#[derive(Debug, Clone, Default)]
pub struct ChangelogLocator {
    directory: Option<PathBuf>,
}

impl ChangelogLocator {
    /// Creates a locator searching `directory` after the bundled changelogs
    pub fn new(directory: Option<PathBuf>) -> Self {
        Self { directory }
    }

    /// Text of a bundled changelog
    pub fn bundled(name: &str) -> Option<&'static str> {
        BUNDLED
            .iter()
            .find(|(bundled, _)| *bundled == name)
            .map(|(_, contents)| *contents)
    }

    /// Names of all bundled changelogs
    pub fn bundled_names() -> impl Iterator<Item = &'static str> {
        BUNDLED.iter().map(|(name, _)| *name)
    }

    /// Resolves a changelog name; `None` yields the empty changelog
    ///
    /// # Errors
    ///
    /// Returns [`ChangelogError::NotFound`] when nothing matches and
    /// [`CairnError::Io`](crate::domain::CairnError::Io) when a matching file
    /// cannot be read.
    pub fn locate(&self, name: Option<&str>) -> Result<ResolvedChangelog> {
        self.locate_relative(name.unwrap_or(EMPTY_CHANGELOG), None)
    }

    /// Resolves `name`, trying `base_dir` before the configured directory
    pub fn locate_relative(&self, name: &str, base_dir: Option<&Path>) -> Result<ResolvedChangelog> {
        if let Some(contents) = Self::bundled(name) {
            return Ok(ResolvedChangelog {
                name: name.to_string(),
                origin: ChangelogOrigin::Bundled,
                contents: contents.to_string(),
            });
        }

        let path = self
            .find_file(name, base_dir)
            .ok_or_else(|| ChangelogError::NotFound(name.to_string()))?;
        let contents = fs::read_to_string(&path)?;
        tracing::debug!(changelog = name, path = %path.display(), "Resolved changelog on filesystem");

        Ok(ResolvedChangelog {
            name: self.logical_name(name, &path),
            origin: ChangelogOrigin::File(path),
            contents,
        })
    }

    /// `path` relative to the changelog directory or the working directory,
    /// with `/` separators; `name` as given when it lies under neither
    fn logical_name(&self, name: &str, path: &Path) -> String {
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.directory
            .iter()
            .cloned()
            .chain(std::env::current_dir().ok())
            .filter_map(|root| fs::canonicalize(root).ok())
            .find_map(|root| {
                canonical
                    .strip_prefix(&root)
                    .ok()
                    .map(|relative| relative.to_path_buf())
            })
            .map(|relative| {
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_else(|| name.to_string())
    }

    /// Reads a resource referenced from a changelog, such as an SQL file
    pub fn read_resource(&self, name: &str, base_dir: Option<&Path>) -> Result<String> {
        let path = self
            .find_file(name, base_dir)
            .ok_or_else(|| ChangelogError::NotFound(name.to_string()))?;
        Ok(fs::read_to_string(path)?)
    }

    fn find_file(&self, name: &str, base_dir: Option<&Path>) -> Option<PathBuf> {
        let candidate = Path::new(name);
        if candidate.is_absolute() {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }

        base_dir
            .into_iter()
            .chain(self.directory.as_deref())
            .map(|dir| dir.join(candidate))
            .chain(std::iter::once(candidate.to_path_buf()))
            .find(|path| path.is_file())
    }
}
