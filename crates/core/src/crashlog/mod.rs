//! Crash log model.
//!
//! A [`CrashLog`] starts out knowing only its path, name, and date (taken
//! from the file name). [`CrashLog::load`] parses the text; after that the
//! victim image and ranked suspects can be derived, and
//! [`CrashLog::symbolicate`] can rewrite the file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ReporterConfig;
use crate::decode::decimal_to_integer;
use crate::fsops::{delete_file, replace_file_atomically, IoError};
use crate::package::{PackageResolver, Resolution};
use crate::privileged::PrivilegedHelper;
use crate::symbols::{image_for_address, symbolicate_text, SymbolSource, SymbolicationSummary};
use crate::time::date_from_parts;

pub mod directory;
pub mod image;
pub mod parse;

pub use directory::{scan_directory, scan_log_directories, CrashLogGroup};
pub use image::BinaryImage;
pub use parse::{CrashHeader, Frame, Thread};

/// File extensions recognized as crash logs.
pub const LOG_EXTENSIONS: &[&str] = &["crash", "ips"];

/// Kind of process that crashed, derived from its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogType {
    App,
    AppExtension,
    Service,
}

impl LogType {
    pub fn from_process_path(path: &str) -> Self {
        if path.contains(".appex/") {
            LogType::AppExtension
        } else if path.contains(".app/") {
            LogType::App
        } else {
            LogType::Service
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read crash log {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed crash log {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum CrashLogError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("crash log {0} has not been loaded")]
    NotLoaded(PathBuf),

    #[error(transparent)]
    Io(#[from] IoError),
}

/// A binary on the crashed thread's stack together with its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspect {
    pub image: BinaryImage,
    pub resolution: Resolution,
}

#[derive(Debug, Clone)]
struct Loaded {
    text: String,
    header: CrashHeader,
    threads: Vec<Thread>,
    images: Vec<BinaryImage>,
}

/// One crash log file.
#[derive(Debug, Clone)]
pub struct CrashLog {
    path: PathBuf,
    log_name: String,
    log_date: Option<NaiveDateTime>,
    log_type: LogType,
    symbolicated: bool,
    viewed: bool,
    loaded: Option<Loaded>,
}

impl CrashLog {
    /// Create an unloaded log. Name and date come from the file name
    /// `<Process>_<YYYY-MM-DD-HHMMSS>[_<device>].<ext>`; when it does not
    /// follow that pattern the whole stem is the name and the date is unknown.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let (log_name, log_date) = match split_file_stem(stem) {
            Some((name, date)) => (name.to_string(), Some(date)),
            None => (stem.to_string(), None),
        };
        Self {
            path,
            log_name,
            log_date,
            log_type: LogType::Service,
            symbolicated: false,
            viewed: false,
            loaded: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    /// Date from the header once loaded, from the file name before.
    pub fn log_date(&self) -> Option<NaiveDateTime> {
        self.loaded.as_ref().map(|l| l.header.date).or(self.log_date)
    }

    pub fn log_type(&self) -> LogType {
        self.log_type
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn is_symbolicated(&self) -> bool {
        self.symbolicated
    }

    pub fn is_viewed(&self) -> bool {
        self.viewed
    }

    pub fn mark_viewed(&mut self) {
        self.viewed = true;
    }

    pub fn header(&self) -> Option<&CrashHeader> {
        self.loaded.as_ref().map(|l| &l.header)
    }

    pub fn text(&self) -> Option<&str> {
        self.loaded.as_ref().map(|l| l.text.as_str())
    }

    pub fn threads(&self) -> &[Thread] {
        self.loaded.as_ref().map(|l| l.threads.as_slice()).unwrap_or_default()
    }

    pub fn images(&self) -> &[BinaryImage] {
        self.loaded.as_ref().map(|l| l.images.as_slice()).unwrap_or_default()
    }

    /// Hex SHA-256 of the loaded text.
    pub fn fingerprint(&self) -> Option<String> {
        let text = self.text()?;
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Some(format!("{:x}", hasher.finalize()))
    }

    /// Read and parse the file.
    pub fn load(&mut self, config: &ReporterConfig) -> Result<(), ParseError> {
        let bytes = std::fs::read(&self.path)
            .map_err(|source| ParseError::Unreadable { path: self.path.clone(), source })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let sections = parse::parse_sections(&text);
        let header = parse::build_header(&sections).map_err(|problem| ParseError::Malformed {
            path: self.path.clone(),
            reason: problem.to_string(),
        })?;
        if !sections.threads.iter().any(|t| t.index == header.crashed_thread) {
            return Err(ParseError::Malformed {
                path: self.path.clone(),
                reason: parse::HeaderProblem::NoCrashedThread.to_string(),
            });
        }

        let mut images = sections.images;
        if let Some(marker) = config
            .os_build_marker
            .as_ref()
            .and_then(|m| std::fs::metadata(m).and_then(|md| md.modified()).ok())
        {
            for img in &mut images {
                img.newer_than_os_build = image::modified_after(Path::new(&img.path), marker);
            }
        }

        self.log_type = header
            .process_path
            .as_deref()
            .map(LogType::from_process_path)
            .unwrap_or(LogType::Service);
        self.symbolicated = all_frames_symbolicated(&sections.threads);
        debug!(
            path = %self.path.display(),
            process = %header.process_name,
            threads = sections.threads.len(),
            images = images.len(),
            "loaded crash log"
        );
        self.loaded = Some(Loaded { text, header, threads: sections.threads, images });
        Ok(())
    }

    /// The crashed thread, once loaded.
    pub fn crashed_thread(&self) -> Option<&Thread> {
        let loaded = self.loaded.as_ref()?;
        loaded.threads.iter().find(|t| t.index == loaded.header.crashed_thread)
    }

    /// Image containing the top frame of the crashed thread.
    pub fn victim(&self) -> Option<&BinaryImage> {
        let frame = self.crashed_thread()?.frames.first()?;
        image_for_address(self.images(), frame.address)
    }

    /// Non-system images on the crashed thread's stack, nearest first,
    /// excluding the victim.
    pub fn suspects(&self, resolver: &PackageResolver) -> Vec<Suspect> {
        let Some(thread) = self.crashed_thread() else { return Vec::new() };
        let victim_path = self.victim().map(|v| v.path.as_str());
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        for frame in &thread.frames {
            let Some(image) = image_for_address(self.images(), frame.address) else { continue };
            if Some(image.path.as_str()) == victim_path || !seen.insert(image.path.as_str()) {
                continue;
            }
            let resolution = resolver.resolve(&image.path);
            if is_system(image, &resolution) {
                continue;
            }
            out.push(Suspect { image: image.clone(), resolution });
        }
        out
    }

    /// Suspects, then the victim, then every other unofficial image.
    /// System images are left out.
    pub fn potential_suspects(&self, resolver: &PackageResolver) -> Vec<Suspect> {
        let mut out = self.suspects(resolver);
        let mut seen: HashSet<String> = out.iter().map(|s| s.image.path.clone()).collect();
        let candidates = self
            .victim()
            .into_iter()
            .chain(self.images().iter().filter(|img| img.from_unofficial_source));
        for image in candidates {
            if !seen.insert(image.path.clone()) {
                continue;
            }
            let resolution = resolver.resolve(&image.path);
            if is_system(image, &resolution) {
                continue;
            }
            out.push(Suspect { image: image.clone(), resolution });
        }
        out
    }

    /// Rewrite unresolved frames and persist the result.
    ///
    /// Logs that are already symbolicated are left alone. The file is only
    /// written when at least one frame was resolved, and the flag is set only
    /// after the write succeeded.
    pub fn symbolicate(
        &mut self,
        source: &dyn SymbolSource,
        temp_dir: &Path,
        helper: Option<&dyn PrivilegedHelper>,
    ) -> Result<SymbolicationSummary, CrashLogError> {
        let loaded =
            self.loaded.as_ref().ok_or_else(|| CrashLogError::NotLoaded(self.path.clone()))?;
        if self.symbolicated {
            return Ok(SymbolicationSummary::default());
        }
        let (text, summary) = symbolicate_text(&loaded.text, &loaded.images, source);
        if summary.resolved == 0 {
            return Ok(summary);
        }
        replace_file_atomically(&self.path, text.as_bytes(), temp_dir, helper)?;
        info!(
            path = %self.path.display(),
            resolved = summary.resolved,
            unresolved = summary.errors.len(),
            "symbolicated crash log"
        );
        let threads = parse::parse_threads(&text);
        if let Some(loaded) = self.loaded.as_mut() {
            loaded.threads = threads;
            loaded.text = text;
        }
        self.symbolicated = true;
        Ok(summary)
    }

    /// Remove the backing file.
    pub fn delete(&self, helper: Option<&dyn PrivilegedHelper>) -> Result<(), IoError> {
        delete_file(&self.path, helper)
    }
}

fn is_system(image: &BinaryImage, resolution: &Resolution) -> bool {
    resolution.is_apple() && !image.from_unofficial_source
}

fn all_frames_symbolicated(threads: &[Thread]) -> bool {
    threads.iter().flat_map(|t| &t.frames).all(Frame::is_symbolicated)
}

const DATE_LEN: usize = "YYYY-MM-DD-HHMMSS".len();

/// Split `<name>_<YYYY-MM-DD-HHMMSS>[_<device>]` at the first valid date.
fn split_file_stem(stem: &str) -> Option<(&str, NaiveDateTime)> {
    let bytes = stem.as_bytes();
    for (pos, _) in stem.match_indices('_') {
        let start = pos + 1;
        let Some(slice) = bytes.get(start..start + DATE_LEN) else { break };
        let after = bytes.get(start + DATE_LEN);
        if pos == 0 || !matches!(after, None | Some(b'_')) || !is_date_shape(slice) {
            continue;
        }
        let field = |from: usize, to: usize| decimal_to_integer(&slice[from..to]);
        if let Some(date) = date_from_parts(
            field(0, 4),
            field(5, 7),
            field(8, 10),
            field(11, 13),
            field(13, 15),
            field(15, 17),
        ) {
            return Some((&stem[..pos], date));
        }
    }
    None
}

fn is_date_shape(slice: &[u8]) -> bool {
    slice.iter().enumerate().all(|(i, b)| match i {
        4 | 7 | 10 => *b == b'-',
        _ => b.is_ascii_digit(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_parts() {
        let log = CrashLog::new("/var/mobile/Library/Logs/CrashReporter/Mobile_Safari_2011-02-03-123456_iPhone.crash");
        assert_eq!(log.log_name(), "Mobile_Safari");
        assert_eq!(log.log_date(), date_from_parts(2011, 2, 3, 12, 34, 56));

        let bare = CrashLog::new("/tmp/SpringBoard_2012-12-31-235959.ips");
        assert_eq!(bare.log_name(), "SpringBoard");
        assert!(bare.log_date().is_some());

        let odd = CrashLog::new("/tmp/LowMemory.plist");
        assert_eq!(odd.log_name(), "LowMemory");
        assert_eq!(odd.log_date(), None);
    }

    #[test]
    fn invalid_calendar_date_is_not_split() {
        let log = CrashLog::new("/tmp/App_2011-13-40-999999_dev.crash");
        assert_eq!(log.log_name(), "App_2011-13-40-999999_dev");
        assert_eq!(log.log_date(), None);
    }

    #[test]
    fn log_type_from_path() {
        assert_eq!(LogType::from_process_path("/Applications/A.app/A"), LogType::App);
        assert_eq!(
            LogType::from_process_path("/Applications/A.app/PlugIns/W.appex/W"),
            LogType::AppExtension
        );
        assert_eq!(LogType::from_process_path("/usr/libexec/locationd"), LogType::Service);
    }
}
