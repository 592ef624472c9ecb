use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ReporterConfig;
use crate::crashlog::{CrashLog, LOG_EXTENSIONS};
use crate::fsops::IoError;

/// Crash logs of one process found in one directory, newest first.
#[derive(Debug, Clone)]
pub struct CrashLogGroup {
    pub name: String,
    pub log_directory: PathBuf,
    pub crash_logs: Vec<CrashLog>,
}

impl CrashLogGroup {
    pub fn newest(&self) -> Option<&CrashLog> {
        self.crash_logs.first()
    }

    pub fn unviewed_count(&self) -> usize {
        self.crash_logs.iter().filter(|l| !l.is_viewed()).count()
    }

    /// Drop the entry for `path`; returns whether it was present.
    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.crash_logs.len();
        self.crash_logs.retain(|l| l.path() != path);
        before != self.crash_logs.len()
    }
}

/// Group the crash logs in `dir` by process name.
///
/// Groups are sorted by name; logs within a group newest first, with undated
/// logs last. A missing directory yields no groups.
pub fn scan_directory(dir: &Path) -> Result<Vec<CrashLogGroup>, IoError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(IoError::Io { path: dir.to_path_buf(), source }),
    };
    let mut groups: BTreeMap<String, Vec<CrashLog>> = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|source| IoError::Io { path: dir.to_path_buf(), source })?;
        let path = entry.path();
        let is_log = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| LOG_EXTENSIONS.contains(&ext));
        if !is_log || !path.is_file() {
            continue;
        }
        let log = CrashLog::new(path);
        groups.entry(log.log_name().to_string()).or_default().push(log);
    }
    Ok(groups
        .into_iter()
        .map(|(name, mut crash_logs)| {
            crash_logs.sort_by(|a, b| {
                b.log_date().cmp(&a.log_date()).then_with(|| a.path().cmp(b.path()))
            });
            CrashLogGroup { name, log_directory: dir.to_path_buf(), crash_logs }
        })
        .collect())
}

/// Scan the mobile log directory, then the root one.
pub fn scan_log_directories(config: &ReporterConfig) -> Result<Vec<CrashLogGroup>, IoError> {
    let mut groups = scan_directory(&config.mobile_log_dir)?;
    if config.root_log_dir != config.mobile_log_dir {
        groups.extend(scan_directory(&config.root_log_dir)?);
    }
    Ok(groups)
}
