//! File replacement and removal, with fallback to the privileged helper.

use std::fs::Permissions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::privileged::{PrivilegedHelper, PrivilegedOpError};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("permission denied for {0} and no privileged helper is available")]
    PermissionDenied(PathBuf),

    #[error(transparent)]
    Privileged(#[from] PrivilegedOpError),
}

impl IoError {
    fn at(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            IoError::PermissionDenied(path.to_path_buf())
        } else {
            IoError::Io { path: path.to_path_buf(), source }
        }
    }
}

/// Replace `path` with `contents` so readers see either the old or new file.
///
/// The temp file is created next to `path` and renamed over it. When the
/// directory is not writable, the temp file goes to `temp_dir` and the
/// helper moves it into place. An existing file's permissions carry over to
/// the replacement.
pub fn replace_file_atomically(
    path: &Path,
    contents: &[u8],
    temp_dir: &Path,
    helper: Option<&dyn PrivilegedHelper>,
) -> Result<(), IoError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let permissions = std::fs::metadata(path).ok().map(|m| m.permissions());
    match write_temp(dir, contents, permissions.clone()) {
        Ok(tmp) => {
            tmp.persist(path).map_err(|e| IoError::at(path, e.error))?;
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            let Some(helper) = helper else {
                return Err(IoError::PermissionDenied(path.to_path_buf()));
            };
            let tmp = write_temp(temp_dir, contents, permissions)
                .map_err(|e| IoError::at(temp_dir, e))?;
            let (_file, tmp_path) = tmp.keep().map_err(|e| IoError::at(temp_dir, e.error))?;
            debug!(src = %tmp_path.display(), dst = %path.display(), "moving via helper");
            let moved = helper.move_file(&tmp_path, path);
            if moved.is_err() {
                let _ = std::fs::remove_file(&tmp_path);
            }
            moved.map_err(IoError::from)
        }
        Err(err) => Err(IoError::at(dir, err)),
    }
}

fn write_temp(
    dir: &Path,
    contents: &[u8],
    permissions: Option<Permissions>,
) -> std::io::Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions)?;
    }
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Remove `path`, delegating to the helper on permission denial.
pub fn delete_file(path: &Path, helper: Option<&dyn PrivilegedHelper>) -> Result<(), IoError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => match helper {
            Some(helper) => Ok(helper.delete(path)?),
            None => Err(IoError::PermissionDenied(path.to_path_buf())),
        },
        Err(err) => Err(IoError::at(path, err)),
    }
}
