use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::report::ClaimPolicy;

/// Environment variable naming a config file to load when none is given.
pub const CONFIG_ENV: &str = "CRASHREPORT_CONFIG";

/// Serializable configuration for the crash reporter.
///
/// Every field has a default matching the on-device layout, so an empty JSON
/// object (or no file at all) is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReporterConfig {
    /// Crash logs written for the unprivileged user.
    pub mobile_log_dir: PathBuf,
    /// Crash logs written for root. Files here need the privileged helper.
    pub root_log_dir: PathBuf,
    /// Shared temporary directory the privileged helper is allowed to touch.
    pub temp_dir: PathBuf,
    /// dpkg admin directory (contains `status` and `info/`).
    pub dpkg_dir: PathBuf,
    /// Optional SQLite package index. When set and present, it is used
    /// instead of scanning the dpkg database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_index: Option<PathBuf>,
    /// Script evaluated after every package script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_script: Option<PathBuf>,
    /// Directory holding `<uuid>.sym` symbol files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbols_dir: Option<PathBuf>,
    /// Privileged helper program (`copy` / `move` / `delete`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper: Option<PathBuf>,
    /// Path prefixes of the OS base image. Unowned binaries here are Apple's.
    pub apple_path_prefixes: Vec<String>,
    /// Path prefixes of App Store containers (`<prefix>/<UUID>/<Name>.app/...`).
    pub app_container_prefixes: Vec<String>,
    /// System log file; includes of this file are narrowed to the crash window.
    pub syslog_path: PathBuf,
    /// Width, in seconds, of the syslog window ending at the crash time.
    pub syslog_window_secs: i64,
    /// Whether the first package that ships a script stops suspect evaluation.
    pub claim_policy: ClaimPolicy,
    /// File whose modification time marks the OS build install.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_build_marker: Option<PathBuf>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            mobile_log_dir: PathBuf::from("/var/mobile/Library/Logs/CrashReporter"),
            root_log_dir: PathBuf::from("/Library/Logs/CrashReporter"),
            temp_dir: PathBuf::from("/tmp"),
            dpkg_dir: PathBuf::from("/var/lib/dpkg"),
            package_index: None,
            default_script: None,
            symbols_dir: None,
            helper: None,
            apple_path_prefixes: vec![
                "/System/".to_string(),
                "/usr/lib/".to_string(),
                "/Developer/".to_string(),
                "/Applications/".to_string(),
            ],
            app_container_prefixes: vec![
                "/var/mobile/Applications/".to_string(),
                "/var/mobile/Containers/Bundle/Application/".to_string(),
                "/private/var/mobile/Containers/Bundle/Application/".to_string(),
            ],
            syslog_path: PathBuf::from("/var/log/syslog"),
            syslog_window_secs: 60,
            claim_policy: ClaimPolicy::default(),
            os_build_marker: Some(PathBuf::from(
                "/System/Library/CoreServices/SystemVersion.plist",
            )),
        }
    }
}

impl ReporterConfig {
    /// True when `path` lies under one of the OS base-image prefixes.
    pub fn is_apple_path(&self, path: &str) -> bool {
        self.apple_path_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Directory holding per-package files (`<id>.list`, `<id>.crash_reporter`).
    pub fn dpkg_info_dir(&self) -> PathBuf {
        self.dpkg_dir.join("info")
    }
}

/// Load a config file, choosing JSON or YAML by extension.
pub fn load_config(path: &Path) -> Result<ReporterConfig> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&body)
            .with_context(|| format!("Failed to parse config YAML at {}", path.display()))?,
        _ => serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse config JSON at {}", path.display()))?,
    };
    Ok(config)
}

/// Resolve the config to use: explicit path, then `$CRASHREPORT_CONFIG`, then defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<ReporterConfig> {
    if let Some(p) = path {
        return load_config(p);
    }
    match std::env::var_os(CONFIG_ENV) {
        Some(p) => load_config(Path::new(&p)),
        None => Ok(ReporterConfig::default()),
    }
}
