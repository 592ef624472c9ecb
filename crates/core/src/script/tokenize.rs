//! Shell-like word splitting for script lines.

use std::borrow::Cow;

/// Split `line` into words with POSIX shell quoting rules.
///
/// Returns `None` on an unterminated quote or a trailing backslash.
pub fn tokenize(line: &str) -> Option<Vec<String>> {
    shlex::split(line)
}

/// Quote `word` so that [`tokenize`] reads it back as one token.
///
/// Words holding a NUL byte cannot be quoted and are returned as-is.
pub fn quote(word: &str) -> String {
    shlex::try_quote(word).unwrap_or(Cow::Borrowed(word)).into_owned()
}

/// Quote each word and join with single spaces.
pub fn join(words: &[String]) -> String {
    shlex::try_join(words.iter().map(String::as_str))
        .unwrap_or_else(|_| words.iter().map(|w| quote(w)).collect::<Vec<_>>().join(" "))
}
