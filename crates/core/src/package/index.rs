use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::info;

use crate::package::{
    select_owner, DpkgDatabase, Package, PackageDatabase, PackageDbError, PackageDbResult,
};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Counts reported after an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub packages: usize,
    pub files: usize,
    pub script_lines: usize,
}

/// SQLite-backed local package index.
///
/// A snapshot of the dpkg database that answers ownership queries with one
/// indexed lookup per ancestor instead of a walk over every file list.
/// The connection sits behind a mutex so the index can be shared by a
/// resolver used from several threads.
#[derive(Debug)]
pub struct PackageIndex {
    conn: Mutex<Connection>,
}

impl PackageIndex {
    /// Open (or create) an index at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> PackageDbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory index, mostly for tests.
    pub fn open_in_memory() -> PackageDbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace a package record together with its owned files.
    pub fn upsert_package(&self, package: &Package, files: &[String]) -> PackageDbResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        write_package(&tx, package, files)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace the whole index with the contents of a dpkg admin directory.
    ///
    /// The dpkg side is read in full before the index is touched, and the
    /// wipe and inserts share one transaction. A failed import leaves the
    /// previous snapshot in place.
    pub fn import_dpkg(&self, dpkg: &DpkgDatabase) -> PackageDbResult<ImportStats> {
        let mut stats = ImportStats::default();
        let mut records = Vec::new();
        for (identifier, files) in dpkg.file_lists()? {
            let package = dpkg.package(&identifier)?;
            stats.packages += 1;
            stats.files += files.len();
            stats.script_lines += package.config.len();
            records.push((package, files));
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute_batch(
            r#"
            DELETE FROM package_config;
            DELETE FROM package_files;
            DELETE FROM packages;
            "#,
        )?;
        for (package, files) in &records {
            write_package(&tx, package, files)?;
        }
        tx.commit()?;

        info!(
            packages = stats.packages,
            files = stats.files,
            admin_dir = %dpkg.admin_dir().display(),
            "imported dpkg database"
        );
        Ok(stats)
    }

    /// Load a package record by identifier.
    pub fn package(&self, identifier: &str) -> PackageDbResult<Option<Package>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                r#"
                SELECT identifier, store_identifier, name, author, is_app_store
                FROM packages
                WHERE identifier = ?1
                "#,
                params![identifier],
                |row| {
                    Ok(Package {
                        identifier: row.get(0)?,
                        store_identifier: row.get(1)?,
                        name: row.get(2)?,
                        author: row.get(3)?,
                        config: Vec::new(),
                        is_app_store: row.get(4)?,
                    })
                },
            )
            .optional()?;
        let Some(mut package) = row else { return Ok(None) };

        let mut stmt = conn.prepare(
            r#"
            SELECT line
            FROM package_config
            WHERE identifier = ?1
            ORDER BY line_no
            "#,
        )?;
        let lines = stmt.query_map(params![identifier], |row| row.get::<_, String>(0))?;
        for line in lines {
            package.config.push(line?);
        }
        Ok(Some(package))
    }

    /// Number of packages in the index.
    pub fn package_count(&self) -> PackageDbResult<i64> {
        let count = self.conn().query_row("SELECT COUNT(*) FROM packages", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Candidate entries for `path`: the path itself and each ancestor.
    fn candidate_entries(&self, path: &str) -> PackageDbResult<Vec<(String, String)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT path, identifier FROM package_files WHERE path = ?1")?;
        let mut out = Vec::new();
        let mut current = path.trim_end_matches('/');
        loop {
            let rows = stmt.query_map(params![current], |row| Ok((row.get(0)?, row.get(1)?)))?;
            for row in rows {
                out.push(row?);
            }
            match current.rfind('/') {
                Some(idx) if idx > 0 => current = &current[..idx],
                _ => break,
            }
        }
        Ok(out)
    }
}

impl PackageDatabase for PackageIndex {
    fn find_owner(&self, path: &Path) -> PackageDbResult<Option<Package>> {
        let path_str = path.to_string_lossy();
        let entries = self.candidate_entries(&path_str)?;
        let owner =
            select_owner(&path_str, entries.iter().map(|(p, id)| (p.as_str(), id.as_str())));
        match owner {
            Some(id) => self.package(&id),
            None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "package-index"
    }
}

fn write_package(tx: &Transaction<'_>, package: &Package, files: &[String]) -> PackageDbResult<()> {
    tx.execute(
        r#"
        INSERT OR REPLACE INTO packages (identifier, store_identifier, name, author, is_app_store)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            package.identifier,
            package.store_identifier,
            package.name,
            package.author,
            package.is_app_store
        ],
    )?;
    tx.execute("DELETE FROM package_files WHERE identifier = ?1", params![package.identifier])?;
    tx.execute("DELETE FROM package_config WHERE identifier = ?1", params![package.identifier])?;
    let mut insert_file =
        tx.prepare("INSERT INTO package_files (path, identifier) VALUES (?1, ?2)")?;
    for file in files {
        insert_file.execute(params![file.trim_end_matches('/'), package.identifier])?;
    }
    let mut insert_line =
        tx.prepare("INSERT INTO package_config (identifier, line_no, line) VALUES (?1, ?2, ?3)")?;
    for (line_no, line) in package.config.iter().enumerate() {
        insert_line.execute(params![package.identifier, line_no as i64, line])?;
    }
    Ok(())
}

/// Apply schema migrations to bring the index to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: packages and package_files
/// - 2: add package_config (reporter script lines)
fn apply_migrations(conn: &Connection) -> PackageDbResult<()> {
    let current_version = current_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(PackageDbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS packages (
                identifier       TEXT PRIMARY KEY,
                store_identifier TEXT,
                name             TEXT NOT NULL,
                author           TEXT,
                is_app_store     INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS package_files (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                path       TEXT NOT NULL,
                identifier TEXT NOT NULL REFERENCES packages(identifier)
            );

            CREATE INDEX IF NOT EXISTS idx_package_files_path ON package_files(path);

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS package_config (
                identifier TEXT NOT NULL REFERENCES packages(identifier),
                line_no    INTEGER NOT NULL,
                line       TEXT NOT NULL,
                PRIMARY KEY (identifier, line_no)
            );

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> PackageDbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
