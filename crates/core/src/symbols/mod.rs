//! Address symbolication.
//!
//! A [`SymbolTable`] maps image-relative offsets to names. A [`SymbolSource`]
//! hands out tables per binary image. [`symbolicate_text`] rewrites the
//! unresolved frames of a crash log using both.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::crashlog::image::BinaryImage;
use crate::crashlog::parse::parse_threads;

pub mod file;
#[cfg(feature = "object-symbols")]
pub mod object_file;

pub use file::SymbolDirectory;
#[cfg(feature = "object-symbols")]
pub use object_file::ObjectFileSymbols;

/// Sorted `(offset, name)` pairs for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: Vec<(u64, String)>,
}

impl SymbolTable {
    /// Build a table. When several names share an offset, the one that
    /// appears last in `symbols` is kept.
    pub fn new(mut symbols: Vec<(u64, String)>) -> Self {
        symbols.sort_by_key(|&(offset, _)| offset);
        symbols.dedup_by(|later, kept| {
            if later.0 == kept.0 {
                std::mem::swap(&mut later.1, &mut kept.1);
                true
            } else {
                false
            }
        });
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbol with the greatest offset `<= offset`.
    pub fn lookup(&self, offset: u64) -> Option<(u64, &str)> {
        let idx = self.symbols.partition_point(|&(start, _)| start <= offset);
        let (start, name) = self.symbols.get(idx.checked_sub(1)?)?;
        Some((*start, name.as_str()))
    }
}

impl FromIterator<(u64, String)> for SymbolTable {
    fn from_iter<T: IntoIterator<Item = (u64, String)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Supplies symbol tables for binary images.
pub trait SymbolSource {
    /// Table for `image`, or `None` when no symbols are available.
    fn symbols_for(&self, image: &BinaryImage) -> Option<Arc<SymbolTable>>;
}

/// Tables registered up front, keyed by normalized UUID or by path.
#[derive(Debug, Default, Clone)]
pub struct InMemorySymbols {
    by_uuid: HashMap<String, Arc<SymbolTable>>,
    by_path: HashMap<String, Arc<SymbolTable>>,
}

impl InMemorySymbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_uuid(&mut self, uuid: &str, table: SymbolTable) {
        self.by_uuid.insert(uuid.replace('-', "").to_ascii_lowercase(), Arc::new(table));
    }

    pub fn insert_path(&mut self, path: impl Into<String>, table: SymbolTable) {
        self.by_path.insert(path.into(), Arc::new(table));
    }
}

impl SymbolSource for InMemorySymbols {
    fn symbols_for(&self, image: &BinaryImage) -> Option<Arc<SymbolTable>> {
        image
            .uuid_key()
            .and_then(|key| self.by_uuid.get(&key))
            .or_else(|| self.by_path.get(&image.path))
            .cloned()
    }
}

/// Tries each source in order.
#[derive(Default)]
pub struct ChainedSymbols {
    sources: Vec<Box<dyn SymbolSource>>,
}

impl ChainedSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: impl SymbolSource + 'static) {
        self.sources.push(Box::new(source));
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SymbolSource for ChainedSymbols {
    fn symbols_for(&self, image: &BinaryImage) -> Option<Arc<SymbolTable>> {
        self.sources.iter().find_map(|s| s.symbols_for(image))
    }
}

/// Why one frame address could not be symbolicated.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SymbolicationError {
    #[error("{address:#x}: no binary image contains this address")]
    NoImage { address: u64 },

    #[error("{address:#x}: no symbols available for {image}")]
    NoSymbols { address: u64, image: PathBuf },

    #[error("{address:#x}: address precedes every symbol in {image}")]
    NoSymbol { address: u64, image: PathBuf },
}

/// Outcome of one symbolication pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SymbolicationSummary {
    /// Frames rewritten in this pass.
    pub resolved: usize,
    /// Frames left unresolved.
    pub errors: Vec<SymbolicationError>,
}

impl SymbolicationSummary {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Image containing `address`. Overlapping ranges resolve to the lowest base
/// so the answer does not depend on image order.
pub fn image_for_address(images: &[BinaryImage], address: u64) -> Option<&BinaryImage> {
    images.iter().filter(|img| img.contains(address)).min_by_key(|img| (img.base, &img.path))
}

/// Rewrite every unresolved frame in `text` that `source` has symbols for.
///
/// `0x000027d8 0x2000 + 2008` becomes `0x000027d8 main + 24`. Everything else
/// in the text, line terminators included, is left byte for byte.
pub fn symbolicate_text(
    text: &str,
    images: &[BinaryImage],
    source: &dyn SymbolSource,
) -> (String, SymbolicationSummary) {
    let mut summary = SymbolicationSummary::default();
    let mut rewrites: HashMap<usize, (usize, String)> = HashMap::new();
    let mut tables: HashMap<(u64, String), Option<Arc<SymbolTable>>> = HashMap::new();

    for thread in parse_threads(text) {
        for frame in thread.frames.iter().filter(|f| !f.is_symbolicated()) {
            let address = frame.address;
            let Some(image) = image_for_address(images, address) else {
                summary.errors.push(SymbolicationError::NoImage { address });
                continue;
            };
            let table = tables
                .entry((image.base, image.path.clone()))
                .or_insert_with(|| source.symbols_for(image));
            let Some(table) = table else {
                let image = image.path.clone().into();
                summary.errors.push(SymbolicationError::NoSymbols { address, image });
                continue;
            };
            let offset = address - image.base;
            let Some((start, name)) = table.lookup(offset) else {
                let image = image.path.clone().into();
                summary.errors.push(SymbolicationError::NoSymbol { address, image });
                continue;
            };
            let rendered = format!(" {name} + {}", offset - start);
            rewrites.insert(frame.line, (frame.address_end, rendered));
            summary.resolved += 1;
        }
    }

    if rewrites.is_empty() {
        return (text.to_string(), summary);
    }

    let mut out = String::with_capacity(text.len() + rewrites.len() * 16);
    for (line_no, piece) in text.split_inclusive('\n').enumerate() {
        match rewrites.get(&line_no) {
            Some((address_end, replacement)) => {
                let body_len = piece.trim_end_matches(['\n', '\r']).len();
                out.push_str(&piece[..*address_end]);
                out.push_str(replacement);
                out.push_str(&piece[body_len..]);
            }
            None => out.push_str(piece),
        }
    }
    debug!(resolved = summary.resolved, unresolved = summary.errors.len(), "symbolicated text");
    (out, summary)
}
