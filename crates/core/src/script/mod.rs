//! Blame scripts.
//!
//! Packages ship a `<identifier>.crash_reporter` script telling the reporter
//! what evidence to attach and whom to contact:
//!
//! ```text
//! include [as <title>] file <filename>
//! include [as <title>] plist <filename>
//! include [as <title>] command <command>
//! deny <link-title>
//! link [as <title>] url <url>
//! link [as <title>] email <comma,separated,addresses>
//! ```
//!
//! One instruction per line; `#` comments and blank lines are ignored.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

pub mod eval;
pub mod include;
pub mod parse;
pub mod tokenize;

pub use eval::{evaluate, EvaluatedInstructions, Evaluation};
pub use include::{resolve_include, IncludeContext, IncludeError};
pub use parse::{parse_line, Script, ScriptError};

use tokenize::quote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeKind {
    File,
    Plist,
    Command,
}

impl IncludeKind {
    pub fn keyword(self) -> &'static str {
        match self {
            IncludeKind::File => "file",
            IncludeKind::Plist => "plist",
            IncludeKind::Command => "command",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Include {
    pub kind: IncludeKind,
    /// File path, or the command line for [`IncludeKind::Command`].
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTarget {
    Url(String),
    Email(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub target: LinkTarget,
    /// Default contact link (an `email` line without `as`).
    pub is_support: bool,
    /// Title before any display localization; `deny` matches on this.
    pub unlocalized_title: String,
}

impl Link {
    pub fn is_email(&self) -> bool {
        matches!(self.target, LinkTarget::Email(_))
    }

    pub fn recipients(&self) -> &[String] {
        match &self.target {
            LinkTarget::Email(r) => r,
            LinkTarget::Url(_) => &[],
        }
    }

    pub fn url(&self) -> Option<&str> {
        match &self.target {
            LinkTarget::Url(u) => Some(u),
            LinkTarget::Email(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstructionKind {
    Include(Include),
    Link(Link),
    Deny { target: String },
}

impl InstructionKind {
    fn rank(&self) -> u8 {
        match self {
            InstructionKind::Link(_) => 0,
            InstructionKind::Include(_) => 1,
            InstructionKind::Deny { .. } => 2,
        }
    }
}

/// One parsed script line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub title: String,
    /// Words of the source line after unquoting.
    pub tokens: Vec<String>,
    /// Position in the evaluation chain (or the script, before evaluation).
    pub order: usize,
    /// Package whose script declared this instruction; `None` for the default script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(flatten)]
    pub kind: InstructionKind,
}

impl Instruction {
    pub fn as_include(&self) -> Option<&Include> {
        match &self.kind {
            InstructionKind::Include(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&Link> {
        match &self.kind {
            InstructionKind::Link(l) => Some(l),
            _ => None,
        }
    }

    /// Declaration order, then title, then kind.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.order
            .cmp(&other.order)
            .then_with(|| self.title.cmp(&other.title))
            .then_with(|| self.kind.rank().cmp(&other.kind.rank()))
    }
}

/// Title used when a line has no `as <title>`.
pub fn default_title(kind: &InstructionKind) -> String {
    match kind {
        InstructionKind::Include(Include { kind: IncludeKind::Command, target }) => {
            tokenize::tokenize(target)
                .and_then(|words| words.into_iter().next())
                .unwrap_or_else(|| target.clone())
        }
        InstructionKind::Include(Include { target, .. }) => std::path::Path::new(target)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(target)
            .to_string(),
        InstructionKind::Link(Link { target: LinkTarget::Url(url), .. }) => url_host(url),
        InstructionKind::Link(Link { target: LinkTarget::Email(_), .. }) => "Support".to_string(),
        InstructionKind::Deny { target } => target.clone(),
    }
}

/// Host part of `url`, or the whole string when it has none.
pub fn url_host(url: &str) -> String {
    let Some((_, rest)) = url.split_once("://") else { return url.to_string() };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = match host.rfind(':') {
        Some(idx) if !host.ends_with(']') => &host[..idx],
        _ => host,
    };
    if host.is_empty() {
        url.to_string()
    } else {
        host.to_string()
    }
}

impl fmt::Display for Instruction {
    /// Canonical script line. `as <title>` is only written when the title
    /// differs from the default, so reparsing gives the same instruction.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let explicit_title = |keyword: &str| {
            if self.title == default_title(&self.kind) {
                keyword.to_string()
            } else {
                format!("{keyword} as {}", quote(&self.title))
            }
        };
        match &self.kind {
            InstructionKind::Include(include) => {
                let target = match include.kind {
                    IncludeKind::Command => include.target.clone(),
                    _ => quote(&include.target),
                };
                write!(f, "{} {} {}", explicit_title("include"), include.kind.keyword(), target)
            }
            InstructionKind::Link(link) => {
                // Only the support link may omit its title: an email line
                // without `as` always parses as the support link.
                let head = if link.is_support {
                    "link".to_string()
                } else if link.is_email() {
                    format!("link as {}", quote(&self.title))
                } else {
                    explicit_title("link")
                };
                match &link.target {
                    LinkTarget::Url(url) => write!(f, "{head} url {}", quote(url)),
                    LinkTarget::Email(recipients) => {
                        write!(f, "{head} email {}", quote(&recipients.join(",")))
                    }
                }
            }
            InstructionKind::Deny { target } => {
                write!(f, "deny {}", quote(target))
            }
        }
    }
}
