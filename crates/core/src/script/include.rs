use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{Datelike, Duration, NaiveDateTime};
use thiserror::Error;

use crate::config::ReporterConfig;
use crate::script::{Include, IncludeKind};
use crate::time::syslog_line_time;

/// Why an include could not be resolved. The include stays in the report
/// with empty content.
#[derive(Debug, Error)]
pub enum IncludeError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode plist {path}: {source}")]
    Plist {
        path: PathBuf,
        #[source]
        source: plist::Error,
    },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    CommandFailed { command: String, status: String },
}

/// What include resolution needs to know about the crash.
#[derive(Debug, Clone)]
pub struct IncludeContext {
    pub syslog_path: PathBuf,
    pub crash_date: Option<NaiveDateTime>,
    pub window_secs: i64,
}

impl IncludeContext {
    pub fn new(config: &ReporterConfig, crash_date: Option<NaiveDateTime>) -> Self {
        Self {
            syslog_path: config.syslog_path.clone(),
            crash_date,
            window_secs: config.syslog_window_secs,
        }
    }
}

/// Produce the content of one include.
pub fn resolve_include(include: &Include, ctx: &IncludeContext) -> Result<String, IncludeError> {
    match include.kind {
        IncludeKind::File => {
            let path = Path::new(&include.target);
            let text = read_text(path)?;
            match ctx.crash_date {
                Some(date) if path == ctx.syslog_path => {
                    Ok(filter_syslog(&text, date, ctx.window_secs))
                }
                _ => Ok(text),
            }
        }
        IncludeKind::Plist => read_plist(Path::new(&include.target)),
        IncludeKind::Command => run_command(&include.target),
    }
}

fn read_text(path: &Path) -> Result<String, IncludeError> {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|source| IncludeError::Read { path: path.to_path_buf(), source })
}

/// Plists (binary or XML) are rendered as XML.
fn read_plist(path: &Path) -> Result<String, IncludeError> {
    let plist_err = |source| IncludeError::Plist { path: path.to_path_buf(), source };
    let value = plist::Value::from_file(path).map_err(plist_err)?;
    let mut out = Vec::new();
    value.to_writer_xml(&mut out).map_err(plist_err)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn run_command(command: &str) -> Result<String, IncludeError> {
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .output()
        .map_err(|source| IncludeError::Spawn { command: command.to_string(), source })?;
    if !output.status.success() {
        return Err(IncludeError::CommandFailed {
            command: command.to_string(),
            status: output.status.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Keep the syslog lines stamped within `window_secs` before `crash`
/// (inclusive). Unstamped lines follow the line before them.
pub fn filter_syslog(text: &str, crash: NaiveDateTime, window_secs: i64) -> String {
    let start = Duration::try_seconds(window_secs.max(0))
        .and_then(|window| crash.checked_sub_signed(window))
        .unwrap_or(NaiveDateTime::MIN);
    let mut keep = false;
    let mut out = String::new();
    for line in text.split_inclusive('\n') {
        if let Some(stamp) = stamp_before(line, crash) {
            keep = stamp >= start && stamp <= crash;
        }
        if keep {
            out.push_str(line);
        }
    }
    out
}

/// Syslog stamps carry no year. A stamp more than a day after the crash
/// belongs to the previous year (a December line read for a January crash).
fn stamp_before(line: &str, crash: NaiveDateTime) -> Option<NaiveDateTime> {
    let latest = crash.checked_add_signed(Duration::days(1)).unwrap_or(NaiveDateTime::MAX);
    match syslog_line_time(line, crash.year()) {
        Some(stamp) if stamp <= latest => Some(stamp),
        _ => syslog_line_time(line, crash.year() - 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::date_from_parts;

    #[test]
    fn syslog_window() {
        let crash = date_from_parts(2011, 2, 3, 12, 0, 30).unwrap();
        let log = "\
Feb  3 11:58:00 host a[1]: too early
Feb  3 11:59:45 host b[2]: inside
    continuation
Feb  3 12:00:30 host c[3]: at crash
Feb  3 12:00:31 host d[4]: after
";
        let kept = filter_syslog(log, crash, 60);
        assert_eq!(
            kept,
            "Feb  3 11:59:45 host b[2]: inside\n    continuation\nFeb  3 12:00:30 host c[3]: at crash\n"
        );
    }

    #[test]
    fn syslog_window_crosses_new_year() {
        let crash = date_from_parts(2012, 1, 1, 0, 0, 10).unwrap();
        let log = "Dec 31 23:58:00 host a[1]: too early
Dec 31 23:59:50 host b[2]: last of the year
Jan  1 00:00:05 host c[3]: first of the year
Jan  1 00:00:20 host d[4]: after
";
        let kept = filter_syslog(log, crash, 60);
        assert_eq!(
            kept,
            "Dec 31 23:59:50 host b[2]: last of the year\nJan  1 00:00:05 host c[3]: first of the year\n"
        );
    }
}
