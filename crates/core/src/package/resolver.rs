use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::ReporterConfig;
use crate::package::{app_store_package, Package, PackageDatabase, Resolution};

type Slot = Arc<OnceCell<Resolution>>;

/// Cached front end over a [`PackageDatabase`].
///
/// Each path gets one slot. The first caller for a path initializes the slot;
/// concurrent callers for the same path block on it and share the result, so
/// the database is queried once per path. Failed lookups are not cached.
pub struct PackageResolver {
    db: Box<dyn PackageDatabase>,
    apple_prefixes: Vec<String>,
    app_container_prefixes: Vec<String>,
    slots: Mutex<HashMap<PathBuf, Slot>>,
}

impl PackageResolver {
    pub fn new<D: PackageDatabase + 'static>(db: D, config: &ReporterConfig) -> Self {
        Self::from_boxed(Box::new(db), config)
    }

    pub fn from_boxed(db: Box<dyn PackageDatabase>, config: &ReporterConfig) -> Self {
        Self {
            db,
            apple_prefixes: config.apple_path_prefixes.clone(),
            app_container_prefixes: config.app_container_prefixes.clone(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the owner of `path`.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Resolution {
        let path = path.as_ref();
        let slot = self.slot(path);
        let result = slot.get_or_try_init(|| self.lookup(path));
        match result {
            Ok(resolution) => resolution.clone(),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    db = self.db.name(),
                    error = %err,
                    "package lookup failed"
                );
                Resolution::Unknown
            }
        }
    }

    /// Convenience for callers that only care about a found package.
    pub fn package_for(&self, path: impl AsRef<Path>) -> Option<Arc<Package>> {
        self.resolve(path).package().cloned()
    }

    /// Number of paths with a settled resolution.
    pub fn cached_len(&self) -> usize {
        self.lock_slots().values().filter(|s| s.get().is_some()).count()
    }

    /// Forget every cached resolution.
    pub fn clear(&self) {
        self.lock_slots().clear();
    }

    fn slot(&self, path: &Path) -> Slot {
        self.lock_slots().entry(path.to_path_buf()).or_default().clone()
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Slot>> {
        // A panic while holding the lock cannot leave the map inconsistent.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lookup(&self, path: &Path) -> Result<Resolution, crate::package::PackageDbError> {
        debug!(path = %path.display(), db = self.db.name(), "querying package database");
        if let Some(pkg) = self.db.find_owner(path)? {
            return Ok(Resolution::Package(Arc::new(pkg)));
        }
        let path_str = path.to_string_lossy();
        if let Some(pkg) = app_store_package(&path_str, &self.app_container_prefixes) {
            return Ok(Resolution::Package(Arc::new(pkg)));
        }
        if self.apple_prefixes.iter().any(|p| path_str.starts_with(p.as_str())) {
            Ok(Resolution::Apple)
        } else {
            Ok(Resolution::Unknown)
        }
    }
}

impl std::fmt::Debug for PackageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageResolver")
            .field("db", &self.db.name())
            .field("cached", &self.cached_len())
            .finish()
    }
}
