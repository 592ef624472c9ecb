use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::crashlog::image::BinaryImage;
use crate::decode::hex_str;
use crate::symbols::{SymbolSource, SymbolTable};

/// Symbol files stored as `<dir>/<uuid>.sym`.
///
/// Two layouts are accepted: plain `offset name` lines (hex offset), and
/// Breakpad text files, from which `FUNC` and `PUBLIC` records are read.
/// Tables are parsed once per UUID and shared.
#[derive(Debug)]
pub struct SymbolDirectory {
    dir: PathBuf,
    cache: Mutex<HashMap<String, Option<Arc<SymbolTable>>>>,
}

impl SymbolDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), cache: Mutex::new(HashMap::new()) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load(&self, key: &str) -> Option<Arc<SymbolTable>> {
        let path = self.dir.join(format!("{key}.sym"));
        if !path.is_file() {
            return None;
        }
        match std::fs::read(&path) {
            Ok(bytes) => {
                let table = parse_symbol_file(&String::from_utf8_lossy(&bytes));
                debug!(path = %path.display(), symbols = table.len(), "loaded symbol file");
                Some(Arc::new(table))
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read symbol file");
                None
            }
        }
    }
}

impl SymbolSource for SymbolDirectory {
    fn symbols_for(&self, image: &BinaryImage) -> Option<Arc<SymbolTable>> {
        let key = image.uuid_key()?;
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.entry(key.clone()).or_insert_with(|| self.load(&key)).clone()
    }
}

/// Parse either symbol file layout. A leading `MODULE` record selects Breakpad.
pub fn parse_symbol_file(body: &str) -> SymbolTable {
    let breakpad = body.trim_start().starts_with("MODULE ");
    let mut symbols = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(record) = line.strip_prefix("FUNC ") {
            // FUNC [m] address size parameter_size name
            if let Some(sym) = breakpad_record(record, 3) {
                symbols.push(sym);
            }
        } else if let Some(record) = line.strip_prefix("PUBLIC ") {
            // PUBLIC [m] address parameter_size name
            if let Some(sym) = breakpad_record(record, 2) {
                symbols.push(sym);
            }
        } else if breakpad {
            // Line records and other Breakpad sections carry no names.
            continue;
        } else if let Some((offset, name)) = line.split_once(char::is_whitespace) {
            if is_hex_token(offset) {
                symbols.push((hex_str(offset), name.trim().to_string()));
            }
        }
    }
    SymbolTable::new(symbols)
}

/// `fields` counts the numeric fields before the name, the address first.
fn breakpad_record(record: &str, fields: usize) -> Option<(u64, String)> {
    let record = record.strip_prefix("m ").unwrap_or(record);
    let mut parts = record.splitn(fields + 1, ' ');
    let address = parts.next()?;
    for _ in 1..fields {
        parts.next()?;
    }
    let name = parts.next()?.trim();
    if !is_hex_token(address) || name.is_empty() {
        return None;
    }
    Some((hex_str(address), name.to_string()))
}

fn is_hex_token(token: &str) -> bool {
    let digits = token.strip_prefix("0x").unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_breakpad_lines() {
        let body = "\
MODULE mac arm64 0A1B2C3D0 Helper
FILE 0 /src/main.c
FUNC 1000 40 0 main
1000 12 1
PUBLIC m 2000 0 helper_entry
";
        let table = parse_symbol_file(body);
        assert_eq!(table.lookup(0x1010), Some((0x1000, "main")));
        assert_eq!(table.lookup(0x2004), Some((0x2000, "helper_entry")));
        assert_eq!(table.len(), 2);

        let plain = parse_symbol_file("0x3000 -[Thing doStuff:]\n10 start\nnot a symbol\n");
        assert_eq!(plain.lookup(0x3001), Some((0x3000, "-[Thing doStuff:]")));
        assert_eq!(plain.lookup(0x11), Some((0x10, "start")));
        assert_eq!(plain.len(), 2);
    }
}
