//! Package ownership: which installed package a binary on disk belongs to.
//!
//! This module contains:
//! - `Package`: the resolved owner, including its reporter script lines.
//! - `PackageDatabase`: the lookup seam (dpkg admin dir, SQLite index, or a
//!   fake in tests).
//! - `PackageResolver`: the cached, single-flight front end callers use.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod dpkg;
pub mod index;
pub mod resolver;

pub use dpkg::DpkgDatabase;
pub use index::{PackageIndex, CURRENT_SCHEMA_VERSION};
pub use resolver::PackageResolver;

/// File name suffix of per-package reporter scripts in the dpkg info dir.
pub const SCRIPT_SUFFIX: &str = ".crash_reporter";

/// An installed package that owns one or more binaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Package identifier (e.g. `com.example.tweak`).
    pub identifier: String,
    /// Store identifier for App Store apps (container UUID), if any.
    pub store_identifier: Option<String>,
    /// Human-friendly name; falls back to the identifier.
    pub name: String,
    /// Author, usually `Name <email>`.
    pub author: Option<String>,
    /// Lines of the package's reporter script, in file order.
    pub config: Vec<String>,
    pub is_app_store: bool,
}

impl Package {
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            name: identifier.clone(),
            identifier,
            store_identifier: None,
            author: None,
            config: Vec::new(),
            is_app_store: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }

    pub fn with_config(mut self, config: Vec<String>) -> Self {
        self.config = config;
        self
    }

    /// True when the package ships its own reporter script.
    pub fn has_script(&self) -> bool {
        self.config.iter().any(|l| {
            let l = l.trim();
            !l.is_empty() && !l.starts_with('#')
        })
    }

    /// Email address from an `Name <email>` author field.
    pub fn author_email(&self) -> Option<&str> {
        let author = self.author.as_deref()?;
        let start = author.find('<')?;
        let end = author[start..].find('>')? + start;
        let email = author[start + 1..end].trim();
        (!email.is_empty()).then_some(email)
    }

    /// Display name from an `Name <email>` author field.
    pub fn author_name(&self) -> Option<&str> {
        let author = self.author.as_deref()?;
        let name = author.split('<').next().unwrap_or(author).trim();
        (!name.is_empty()).then_some(name)
    }
}

/// Outcome of resolving a path to its owner. Not finding a package is normal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Package(Arc<Package>),
    /// Unowned file under the OS base image.
    Apple,
    /// Unowned file elsewhere; treated as unofficial.
    Unknown,
}

impl Resolution {
    pub fn package(&self) -> Option<&Arc<Package>> {
        match self {
            Resolution::Package(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_apple(&self) -> bool {
        matches!(self, Resolution::Apple)
    }
}

/// Error type for package database lookups.
#[derive(Debug, Error)]
pub enum PackageDbError {
    #[error("Failed to read package database at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },
}

/// Convenience result type for package database operations.
pub type PackageDbResult<T> = Result<T, PackageDbError>;

/// A file-ownership index queried by absolute path.
pub trait PackageDatabase: Send + Sync {
    /// Find the package owning `path`, or `None` when no package does.
    fn find_owner(&self, path: &Path) -> PackageDbResult<Option<Package>>;

    /// Short name for log messages.
    fn name(&self) -> &'static str;
}

/// Pick the owner of `path` from `(recorded path, package id)` entries.
///
/// An exact entry wins. Otherwise the closest ancestor directory wins, but
/// only when exactly one package records it; shared directories such as
/// `/usr/lib` say nothing about ownership.
pub fn select_owner<'a, I>(path: &str, entries: I) -> Option<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let path = path.trim_end_matches('/');
    let mut best: Option<(usize, Vec<&str>)> = None;
    for (entry, id) in entries {
        let entry = entry.trim_end_matches('/');
        if entry == path {
            return Some(id.to_string());
        }
        let is_ancestor = !entry.is_empty()
            && path.len() > entry.len()
            && path.starts_with(entry)
            && path.as_bytes()[entry.len()] == b'/';
        if !is_ancestor {
            continue;
        }
        let closer = best.as_ref().map_or(true, |(len, _)| entry.len() > *len);
        if closer {
            best = Some((entry.len(), vec![id]));
        } else if let Some((len, ids)) = best.as_mut() {
            if *len == entry.len() && !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    match best {
        Some((_, ids)) if ids.len() == 1 => Some(ids[0].to_string()),
        _ => None,
    }
}

/// Synthesize a package for a binary inside an App Store container.
///
/// Layout: `<prefix><UUID>/<Name>.app/...`.
pub fn app_store_package(path: &str, prefixes: &[String]) -> Option<Package> {
    let rest = prefixes.iter().find_map(|p| path.strip_prefix(p.as_str()))?;
    let mut parts = rest.split('/');
    let uuid = parts.next().filter(|s| !s.is_empty())?;
    let bundle = parts.find(|s| s.ends_with(".app"))?;
    let name = bundle.trim_end_matches(".app");
    let mut pkg = Package::new(name).with_name(name);
    pkg.store_identifier = Some(uuid.to_string());
    pkg.is_app_store = true;
    Some(pkg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_owner_prefers_exact_then_unique_parent() {
        let entries = [
            ("/usr/lib", "a"),
            ("/usr/lib", "b"),
            ("/usr/lib/libfoo.dylib", "a"),
            ("/Applications/Foo.app", "foo"),
        ];
        assert_eq!(select_owner("/usr/lib/libfoo.dylib", entries), Some("a".into()));
        assert_eq!(select_owner("/Applications/Foo.app/Foo", entries), Some("foo".into()));
        assert_eq!(select_owner("/usr/lib/libbar.dylib", entries), None);
        assert_eq!(select_owner("/Applications/Foobar.app/x", entries), None);
    }

    #[test]
    fn author_fields() {
        let pkg = Package::new("x").with_author(Some("Jane Dev <jane@example.com>".into()));
        assert_eq!(pkg.author_email(), Some("jane@example.com"));
        assert_eq!(pkg.author_name(), Some("Jane Dev"));
    }

    #[test]
    fn app_store_container() {
        let prefixes = vec!["/var/mobile/Applications/".to_string()];
        let pkg = app_store_package("/var/mobile/Applications/ABCD-1234/Game.app/Game", &prefixes)
            .expect("container package");
        assert!(pkg.is_app_store);
        assert_eq!(pkg.identifier, "Game");
        assert_eq!(pkg.store_identifier.as_deref(), Some("ABCD-1234"));
    }
}
