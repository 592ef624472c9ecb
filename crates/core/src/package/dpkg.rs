use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use crate::package::{
    select_owner, Package, PackageDatabase, PackageDbError, PackageDbResult, SCRIPT_SUFFIX,
};

/// One stanza of the dpkg `status` file, reduced to the fields we use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub identifier: String,
    pub name: Option<String>,
    pub author: Option<String>,
    pub maintainer: Option<String>,
    pub installed: bool,
}

/// Reads ownership straight from a dpkg admin directory.
///
/// Lookups walk every `info/*.list` file, like `dpkg -S` does. The `status`
/// file is parsed once and kept for the lifetime of the value.
#[derive(Debug)]
pub struct DpkgDatabase {
    admin_dir: PathBuf,
    status: OnceCell<HashMap<String, StatusEntry>>,
}

impl DpkgDatabase {
    pub fn new(admin_dir: impl Into<PathBuf>) -> Self {
        Self { admin_dir: admin_dir.into(), status: OnceCell::new() }
    }

    pub fn admin_dir(&self) -> &Path {
        &self.admin_dir
    }

    pub fn info_dir(&self) -> PathBuf {
        self.admin_dir.join("info")
    }

    /// Installed packages from the `status` file, keyed by identifier.
    pub fn status(&self) -> PackageDbResult<&HashMap<String, StatusEntry>> {
        self.status.get_or_try_init(|| {
            let path = self.admin_dir.join("status");
            let body = read(&path)?;
            Ok(parse_status(&body)
                .into_iter()
                .filter(|e| e.installed)
                .map(|e| (e.identifier.clone(), e))
                .collect())
        })
    }

    /// Recorded file list of every package, as `(identifier, paths)`.
    pub fn file_lists(&self) -> PackageDbResult<Vec<(String, Vec<String>)>> {
        let info_dir = self.info_dir();
        let entries = fs::read_dir(&info_dir)
            .map_err(|source| PackageDbError::Io { path: info_dir.clone(), source })?;
        let mut lists = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|source| PackageDbError::Io { path: info_dir.clone(), source })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("list") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let body = read(&path)?;
            let files = body.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from);
            lists.push((id.to_string(), files.collect()));
        }
        lists.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(lists)
    }

    /// Reporter script lines for `identifier`, empty when it ships none.
    pub fn script_lines(&self, identifier: &str) -> PackageDbResult<Vec<String>> {
        let path = self.info_dir().join(format!("{identifier}{SCRIPT_SUFFIX}"));
        if !path.is_file() {
            return Ok(Vec::new());
        }
        Ok(read(&path)?.lines().map(String::from).collect())
    }

    /// Build the full package record for `identifier`.
    pub fn package(&self, identifier: &str) -> PackageDbResult<Package> {
        let entry = self.status()?.get(identifier);
        let name = entry.and_then(|e| e.name.clone()).unwrap_or_else(|| identifier.to_string());
        let author = entry.and_then(|e| e.author.clone().or_else(|| e.maintainer.clone()));
        Ok(Package::new(identifier)
            .with_name(name)
            .with_author(author)
            .with_config(self.script_lines(identifier)?))
    }
}

impl PackageDatabase for DpkgDatabase {
    fn find_owner(&self, path: &Path) -> PackageDbResult<Option<Package>> {
        let lists = self.file_lists()?;
        let path_str = path.to_string_lossy();
        let entries = lists
            .iter()
            .flat_map(|(id, files)| files.iter().map(move |f| (f.as_str(), id.as_str())));
        match select_owner(&path_str, entries) {
            Some(id) => Ok(Some(self.package(&id)?)),
            None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "dpkg"
    }
}

fn read(path: &Path) -> PackageDbResult<String> {
    fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|source| PackageDbError::Io { path: path.to_path_buf(), source })
}

/// Parse the RFC 822-style stanzas of a dpkg `status` file.
pub fn parse_status(body: &str) -> Vec<StatusEntry> {
    let mut out = Vec::new();
    for stanza in body.split("\n\n") {
        let mut fields: HashMap<String, String> = HashMap::new();
        for line in stanza.lines() {
            if line.starts_with(' ') || line.starts_with('\t') {
                // Continuation lines only matter for Description, which we skip.
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_ascii_lowercase();
                fields.insert(key, value.trim().to_string());
            }
        }
        let Some(identifier) = fields.remove("package") else { continue };
        let installed = fields
            .get("status")
            .map(|s| s.split_whitespace().last() == Some("installed"))
            .unwrap_or(false);
        out.push(StatusEntry {
            identifier,
            name: fields.remove("name"),
            author: fields.remove("author"),
            maintainer: fields.remove("maintainer"),
            installed,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_keeps_installed_flag() {
        let body = "Package: com.example.a\nStatus: install ok installed\nName: Example A\nAuthor: A <a@example.com>\nDescription: thing\n more text\n\nPackage: com.example.b\nStatus: deinstall ok config-files\n";
        let entries = parse_status(body);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].installed);
        assert_eq!(entries[0].name.as_deref(), Some("Example A"));
        assert!(!entries[1].installed);
    }
}
