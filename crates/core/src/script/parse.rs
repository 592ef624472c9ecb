use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::warn;

use crate::script::tokenize::{join, tokenize};
use crate::script::{
    default_title, Include, IncludeKind, Instruction, InstructionKind, Link, LinkTarget,
};

/// A script line that could not be parsed. The line is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("line {line_no}: unterminated quote")]
    UnterminatedQuote { line_no: usize },

    #[error("line {line_no}: unknown keyword '{keyword}'")]
    UnknownKeyword { line_no: usize, keyword: String },

    #[error("line {line_no}: {reason}")]
    Malformed { line_no: usize, reason: String },
}

/// Parsed title and kind; `None` title means "use the default".
type Parsed = (Option<String>, InstructionKind);
type KeywordParser = fn(&[String]) -> Result<Parsed, String>;

static KEYWORDS: Lazy<HashMap<&'static str, KeywordParser>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, KeywordParser> = HashMap::new();
    table.insert("include", parse_include);
    table.insert("link", parse_link);
    table.insert("deny", parse_deny);
    table
});

/// Split off a leading `as <title>`.
fn take_title(args: &[String]) -> Result<(Option<String>, &[String]), String> {
    match args {
        [first, title, rest @ ..] if first == "as" => Ok((Some(title.clone()), rest)),
        [first] if first == "as" => Err("'as' without a title".to_string()),
        _ => Ok((None, args)),
    }
}

fn parse_include(args: &[String]) -> Result<Parsed, String> {
    let (title, rest) = take_title(args)?;
    let [kind, target @ ..] = rest else {
        return Err("include needs 'file', 'plist' or 'command'".to_string());
    };
    let kind = match kind.as_str() {
        "file" => IncludeKind::File,
        "plist" => IncludeKind::Plist,
        "command" => IncludeKind::Command,
        other => return Err(format!("unknown include kind '{other}'")),
    };
    if target.is_empty() || target.iter().all(|t| t.is_empty()) {
        return Err(format!("include {} needs a target", kind.keyword()));
    }
    let target = match kind {
        IncludeKind::Command => join(target),
        _ => target.join(" "),
    };
    Ok((title, InstructionKind::Include(Include { kind, target })))
}

fn parse_link(args: &[String]) -> Result<Parsed, String> {
    let (title, rest) = take_title(args)?;
    let [kind, target @ ..] = rest else {
        return Err("link needs 'url' or 'email'".to_string());
    };
    let target = match kind.as_str() {
        "url" => match target {
            [url] if !url.is_empty() => LinkTarget::Url(url.clone()),
            _ => return Err("link url needs exactly one URL".to_string()),
        },
        "email" => {
            let recipients: Vec<String> = target
                .join(" ")
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if recipients.is_empty() {
                return Err("link email needs at least one address".to_string());
            }
            LinkTarget::Email(recipients)
        }
        other => return Err(format!("unknown link kind '{other}'")),
    };
    let is_support = title.is_none() && matches!(target, LinkTarget::Email(_));
    Ok((
        title,
        InstructionKind::Link(Link { target, is_support, unlocalized_title: String::new() }),
    ))
}

fn parse_deny(args: &[String]) -> Result<Parsed, String> {
    let target = args.join(" ");
    if target.trim().is_empty() {
        return Err("deny needs a link title".to_string());
    }
    Ok((None, InstructionKind::Deny { target }))
}

/// Parse one line. `Ok(None)` for blank lines and comments.
///
/// `line_no` is 1-based and only used in errors; it also becomes the
/// instruction's declaration order within the script.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<Instruction>, ScriptError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let tokens = tokenize(trimmed).ok_or(ScriptError::UnterminatedQuote { line_no })?;
    let Some(keyword) = tokens.first() else { return Ok(None) };
    let parser = KEYWORDS
        .get(keyword.as_str())
        .ok_or_else(|| ScriptError::UnknownKeyword { line_no, keyword: keyword.clone() })?;
    let (title, mut kind) =
        parser(&tokens[1..]).map_err(|reason| ScriptError::Malformed { line_no, reason })?;
    let title = title.unwrap_or_else(|| default_title(&kind));
    if let InstructionKind::Link(link) = &mut kind {
        link.unlocalized_title = title.clone();
    }
    Ok(Some(Instruction { title, tokens, order: line_no, origin: None, kind }))
}

/// A parsed script: its instructions in file order plus the skipped lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub instructions: Vec<Instruction>,
    pub errors: Vec<ScriptError>,
}

impl Script {
    /// Parse `lines`, logging and skipping bad ones.
    pub fn parse<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut script = Script::default();
        for (idx, line) in lines.into_iter().enumerate() {
            match parse_line(line, idx + 1) {
                Ok(Some(instruction)) => script.instructions.push(instruction),
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "skipping script line");
                    script.errors.push(err);
                }
            }
        }
        script
    }

    pub fn parse_str(text: &str) -> Self {
        Self::parse(text.lines())
    }

    /// Read and parse a script file.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::parse_str(&String::from_utf8_lossy(&bytes)))
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{instruction}")?;
        }
        Ok(())
    }
}
