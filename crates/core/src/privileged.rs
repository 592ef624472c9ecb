//! Interface to the privileged helper process.
//!
//! The helper runs as root and accepts exactly three commands:
//! `copy <src> <dst>`, `move <src> <dst>` and `delete <path>`. A non-zero exit
//! status means the operation failed. We check the same allow-list the helper
//! enforces before spawning it, so a refused path fails fast with a typed error.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::config::ReporterConfig;

#[derive(Debug, Error)]
pub enum PrivilegedOpError {
    #[error("no privileged helper configured")]
    NotConfigured,

    #[error("path {0} is outside the directories the helper may touch")]
    NotAllowed(PathBuf),

    #[error("failed to spawn privileged helper {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("privileged helper `{command}` exited with {status}")]
    Failed { command: String, status: String },
}

/// Operations the core delegates when it lacks permission itself.
pub trait PrivilegedHelper {
    fn copy(&self, src: &Path, dst: &Path) -> Result<(), PrivilegedOpError>;
    fn move_file(&self, src: &Path, dst: &Path) -> Result<(), PrivilegedOpError>;
    fn delete(&self, path: &Path) -> Result<(), PrivilegedOpError>;
}

/// Directories the helper may read from or write to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    roots: Vec<PathBuf>,
}

impl AllowList {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn from_config(config: &ReporterConfig) -> Self {
        Self::new(vec![config.root_log_dir.clone(), config.temp_dir.clone()])
    }

    /// `path` must be a direct child of an allowed root. Paths containing
    /// `..` are never allowed.
    pub fn permits(&self, path: &Path) -> bool {
        if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return false;
        }
        let Some(parent) = path.parent() else { return false };
        self.roots.iter().any(|root| parent == root.as_path())
    }

    fn check(&self, path: &Path) -> Result<(), PrivilegedOpError> {
        if self.permits(path) {
            Ok(())
        } else {
            Err(PrivilegedOpError::NotAllowed(path.to_path_buf()))
        }
    }
}

/// Runs an external helper program.
#[derive(Debug, Clone)]
pub struct HelperProcess {
    program: PathBuf,
    allow: AllowList,
}

impl HelperProcess {
    pub fn new(program: impl Into<PathBuf>, allow: AllowList) -> Self {
        Self { program: program.into(), allow }
    }

    /// Helper named in the config, if any.
    pub fn from_config(config: &ReporterConfig) -> Option<Self> {
        config.helper.as_ref().map(|p| Self::new(p.clone(), AllowList::from_config(config)))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, verb: &str, args: &[&Path]) -> Result<(), PrivilegedOpError> {
        for arg in args {
            self.allow.check(arg)?;
        }
        let command = std::iter::once(verb.to_string())
            .chain(args.iter().map(|a| a.display().to_string()))
            .collect::<Vec<_>>()
            .join(" ");
        debug!(program = %self.program.display(), %command, "invoking privileged helper");
        let status = Command::new(&self.program)
            .arg(verb)
            .args(args)
            .status()
            .map_err(|source| PrivilegedOpError::Spawn { program: self.program.clone(), source })?;
        if !status.success() {
            return Err(PrivilegedOpError::Failed { command, status: status.to_string() });
        }
        Ok(())
    }
}

impl PrivilegedHelper for HelperProcess {
    fn copy(&self, src: &Path, dst: &Path) -> Result<(), PrivilegedOpError> {
        self.run("copy", &[src, dst])
    }

    fn move_file(&self, src: &Path, dst: &Path) -> Result<(), PrivilegedOpError> {
        self.run("move", &[src, dst])
    }

    fn delete(&self, path: &Path) -> Result<(), PrivilegedOpError> {
        self.run("delete", &[path])
    }
}
