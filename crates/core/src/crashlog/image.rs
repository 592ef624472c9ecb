use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::decode::hex_str;

/// A binary image loaded in the crashed process.
///
/// The address range is half-open: `[base, base + size)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryImage {
    pub base: u64,
    pub size: u64,
    /// Image name as printed in the log (without the `+` marker).
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Marked with `+` in the image table: not part of the OS.
    pub from_unofficial_source: bool,
    /// File on disk was modified after the OS build was installed.
    pub newer_than_os_build: bool,
}

impl BinaryImage {
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }

    /// Normalized UUID (lowercase, no dashes) for symbol lookups.
    pub fn uuid_key(&self) -> Option<String> {
        self.uuid.as_ref().map(|u| u.replace('-', "").to_ascii_lowercase())
    }
}

fn is_arch_token(token: &str) -> bool {
    token.starts_with("arm")
        || token.starts_with("x86")
        || token.starts_with("i386")
        || token.starts_with("ppc")
}

/// Parse one row of the `Binary Images:` table.
///
/// ```text
/// 0x1000 - 0x1fff +MobileSafari armv7  <a1b2c3d4...> /Applications/MobileSafari.app/MobileSafari
/// 0x10a3c5000 - 0x10a3c6fff +com.example.Helper (1.0 - 1) <UUID> /Library/Helper
/// ```
///
/// The end address in the table is inclusive. Returns `None` for anything
/// that is not an image row.
pub fn parse_image_line(line: &str) -> Option<BinaryImage> {
    let line = line.trim();
    if !line.starts_with("0x") {
        return None;
    }
    let path_start = line.find('/')?;
    let path = line[path_start..].trim().to_string();
    let head = &line[..path_start];

    let mut rest = head;
    let mut uuid = None;
    if let (Some(open), Some(close)) = (head.find('<'), head.rfind('>')) {
        if open < close {
            uuid = Some(head[open + 1..close].trim().to_string()).filter(|u| !u.is_empty());
            rest = &head[..open];
        }
    }
    let mut version = None;
    if let (Some(open), Some(close)) = (rest.find('('), rest.rfind(')')) {
        if open < close {
            version = Some(rest[open + 1..close].trim().to_string()).filter(|v| !v.is_empty());
            rest = &rest[..open];
        }
    }

    let mut tokens = rest.split_whitespace();
    let start = tokens.next()?;
    let mut end = tokens.next()?;
    if end == "-" {
        end = tokens.next()?;
    } else if let Some(stripped) = end.strip_prefix('-') {
        end = stripped;
    }
    if !end.starts_with("0x") {
        return None;
    }
    let base = hex_str(start);
    let last = hex_str(end);
    if last < base {
        return None;
    }

    let mut name_parts = Vec::new();
    let mut arch = None;
    for token in tokens {
        if arch.is_none() && !name_parts.is_empty() && is_arch_token(token) {
            arch = Some(token.to_string());
        } else if arch.is_none() {
            name_parts.push(token);
        }
    }
    let mut name = name_parts.join(" ");
    let from_unofficial_source = name.starts_with('+');
    if from_unofficial_source {
        name.remove(0);
    }
    if name.is_empty() {
        name = Path::new(&path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
    }

    let size = last.checked_sub(base)?.checked_add(1)?;

    Some(BinaryImage {
        base,
        size,
        name,
        path,
        arch,
        version,
        uuid,
        from_unofficial_source,
        newer_than_os_build: false,
    })
}

/// True when `path` exists and was modified after `marker`.
pub fn modified_after(path: &Path, marker: SystemTime) -> bool {
    std::fs::metadata(path).and_then(|m| m.modified()).map(|t| t > marker).unwrap_or(false)
}
