//! Text-level parsing of crash reports.
//!
//! A report is a header block of `Key: value` lines, one section per thread
//! (`Thread N:` / `Thread N Crashed:` followed by numbered frames), optional
//! register dumps, and the `Binary Images:` table.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::crashlog::image::{parse_image_line, BinaryImage};
use crate::decode::{decimal_to_integer, hex_str};
use crate::time::parse_crash_date;

/// Heading that starts the image table.
pub const BINARY_IMAGES_HEADING: &str = "Binary Images:";

/// Parsed header fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashHeader {
    pub process_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    pub date: NaiveDateTime,
    pub crashed_thread: u32,
}

/// Part of a frame line after the address, when it is still unresolved.
///
/// `0x000027d8 0x2000 + 2008`: image load address and offset into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLocation {
    pub load_address: u64,
    pub offset: u64,
}

/// One backtrace frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub index: u32,
    pub image_name: String,
    pub address: u64,
    /// Everything after the address token, as printed.
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawLocation>,
    /// Zero-based line number in the log text.
    #[serde(skip)]
    pub line: usize,
    /// Byte offset in the line just past the address token.
    #[serde(skip)]
    pub address_end: usize,
}

impl Frame {
    pub fn is_symbolicated(&self) -> bool {
        self.raw.is_none()
    }
}

/// One thread's backtrace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub index: u32,
    pub crashed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub frames: Vec<Frame>,
}

/// Everything structural in a report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSections {
    pub header_fields: HashMap<String, String>,
    pub threads: Vec<Thread>,
    pub images: Vec<BinaryImage>,
}

/// Reasons a header is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderProblem {
    MissingField(&'static str),
    BadDate(String),
    NoCrashedThread,
}

impl std::fmt::Display for HeaderProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderProblem::MissingField(field) => write!(f, "missing header field '{field}'"),
            HeaderProblem::BadDate(value) => write!(f, "unrecognized date '{value}'"),
            HeaderProblem::NoCrashedThread => write!(f, "crashed thread not found"),
        }
    }
}

enum ThreadHeading {
    Stack { index: u32, crashed: bool },
    Name { index: u32, name: String },
    State,
}

/// Recognize `Thread N:`, `Thread N Crashed:`, `Thread N name: ...` and
/// `Thread N crashed with ... State:`.
fn parse_thread_heading(line: &str) -> Option<ThreadHeading> {
    let rest = line.strip_prefix("Thread ")?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let index = u32::try_from(decimal_to_integer(&rest.as_bytes()[..digits])).ok()?;
    let tail = rest[digits..].trim();
    if tail == ":" {
        return Some(ThreadHeading::Stack { index, crashed: false });
    }
    if tail == "Crashed:" {
        return Some(ThreadHeading::Stack { index, crashed: true });
    }
    if let Some(name) = tail.strip_prefix("name:") {
        return Some(ThreadHeading::Name { index, name: name.trim().to_string() });
    }
    if tail.starts_with("crashed with") || tail.ends_with("State:") {
        return Some(ThreadHeading::State);
    }
    None
}

/// Parse one numbered frame line.
pub fn parse_frame_line(line: &str, line_no: usize) -> Option<Frame> {
    let trimmed_start = line.len() - line.trim_start().len();
    let body = &line[trimmed_start..];
    let digits = body.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let index = u32::try_from(decimal_to_integer(&body.as_bytes()[..digits])).ok()?;

    // Find the first whitespace-delimited token starting with "0x".
    let mut search = trimmed_start + digits;
    let (addr_start, addr_end) = loop {
        let rel = line[search..].find("0x")?;
        let pos = search + rel;
        let preceded_by_space = line[..pos].ends_with(|c: char| c.is_whitespace());
        if preceded_by_space {
            let end = line[pos..].find(char::is_whitespace).map_or(line.len(), |e| pos + e);
            break (pos, end);
        }
        search = pos + 2;
    };
    let image_name = line[trimmed_start + digits..addr_start].trim().to_string();
    if image_name.is_empty() {
        return None;
    }
    let address = hex_str(&line[addr_start..addr_end]);
    let detail = line[addr_end..].trim().to_string();
    let raw = parse_raw_location(&detail);

    Some(Frame { index, image_name, address, detail, raw, line: line_no, address_end: addr_end })
}

/// `0x2000 + 2008` means "not symbolicated yet".
fn parse_raw_location(detail: &str) -> Option<RawLocation> {
    let mut tokens = detail.split_whitespace();
    let load = tokens.next()?;
    if !load.starts_with("0x") || tokens.next()? != "+" {
        return None;
    }
    let offset = tokens.next()?;
    if tokens.next().is_some() || !offset.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let offset = offset.parse::<u64>().ok()?;
    Some(RawLocation { load_address: hex_str(load), offset })
}

/// Walk the thread sections only. Used by the symbolicator, which does not
/// need a valid header.
pub fn parse_threads(text: &str) -> Vec<Thread> {
    let mut threads: Vec<Thread> = Vec::new();
    let mut names: HashMap<u32, String> = HashMap::new();
    let mut in_stack = false;

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim_end_matches('\r');
        if line.starts_with(BINARY_IMAGES_HEADING) {
            break;
        }
        if let Some(heading) = parse_thread_heading(line) {
            match heading {
                ThreadHeading::Stack { index, crashed } => {
                    threads.push(Thread { index, crashed, name: None, frames: Vec::new() });
                    in_stack = true;
                }
                ThreadHeading::Name { index, name } => {
                    names.insert(index, name);
                    in_stack = false;
                }
                ThreadHeading::State => in_stack = false,
            }
            continue;
        }
        if line.trim().is_empty() {
            in_stack = false;
            continue;
        }
        if in_stack {
            if let Some(frame) = parse_frame_line(line, line_no) {
                if let Some(thread) = threads.last_mut() {
                    thread.frames.push(frame);
                }
            }
        }
    }
    for thread in &mut threads {
        thread.name = names.remove(&thread.index);
    }
    threads
}

/// Split a report into header fields, threads, and images.
pub fn parse_sections(text: &str) -> ParsedSections {
    let mut header_fields = HashMap::new();
    let mut in_header = true;
    let mut in_images = false;
    let mut images = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.starts_with(BINARY_IMAGES_HEADING) {
            in_images = true;
            in_header = false;
            continue;
        }
        if in_images {
            if let Some(image) = parse_image_line(line) {
                images.push(image);
            }
            continue;
        }
        if line.starts_with("Thread ") {
            in_header = false;
        }
        if in_header {
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                if !key.is_empty() && !key.contains(char::is_whitespace) || is_spaced_key(key) {
                    header_fields
                        .entry(key.to_string())
                        .or_insert_with(|| value.trim().to_string());
                }
            }
        }
    }

    ParsedSections { header_fields, threads: parse_threads(text), images }
}

fn is_spaced_key(key: &str) -> bool {
    matches!(
        key,
        "Hardware Model"
            | "Code Type"
            | "Parent Process"
            | "OS Version"
            | "Report Version"
            | "Exception Type"
            | "Exception Codes"
            | "Crashed Thread"
            | "Incident Identifier"
            | "CrashReporter Key"
    )
}

/// Build a [`CrashHeader`] from parsed sections.
pub fn build_header(sections: &ParsedSections) -> Result<CrashHeader, HeaderProblem> {
    let fields = &sections.header_fields;
    let process = fields.get("Process").ok_or(HeaderProblem::MissingField("Process"))?;
    let (process_name, pid) = split_process(process);
    if process_name.is_empty() {
        return Err(HeaderProblem::MissingField("Process"));
    }
    let date_value = fields.get("Date/Time").ok_or(HeaderProblem::MissingField("Date/Time"))?;
    let date =
        parse_crash_date(date_value).ok_or_else(|| HeaderProblem::BadDate(date_value.clone()))?;

    let crashed_thread = fields
        .get("Crashed Thread")
        .and_then(|v| {
            let digits: Vec<u8> = v.bytes().take_while(u8::is_ascii_digit).collect();
            (!digits.is_empty()).then(|| decimal_to_integer(&digits))
        })
        .and_then(|n| u32::try_from(n).ok())
        .or_else(|| sections.threads.iter().find(|t| t.crashed).map(|t| t.index))
        .ok_or(HeaderProblem::NoCrashedThread)?;

    Ok(CrashHeader {
        process_name,
        pid,
        process_path: fields.get("Path").cloned(),
        identifier: fields.get("Identifier").cloned(),
        version: fields.get("Version").cloned(),
        os_version: fields.get("OS Version").cloned(),
        exception_type: fields.get("Exception Type").cloned(),
        date,
        crashed_thread,
    })
}

/// `MobileSafari [1234]` -> (`MobileSafari`, Some(1234)).
fn split_process(value: &str) -> (String, Option<i32>) {
    match (value.find('['), value.rfind(']')) {
        (Some(open), Some(close)) if open < close => {
            let digits = value[open + 1..close].trim();
            let pid = (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                .then(|| decimal_to_integer(digits.as_bytes()));
            (value[..open].trim().to_string(), pid)
        }
        _ => (value.trim().to_string(), None),
    }
}
