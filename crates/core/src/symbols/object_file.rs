use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use goblin::mach::{self, cputype::get_arch_name_from_types, MachO};
use goblin::{elf, Object};
use tracing::{debug, warn};

use crate::crashlog::image::BinaryImage;
use crate::symbols::{SymbolSource, SymbolTable};

/// Reads symbol tables out of the binaries themselves (Mach-O or ELF).
///
/// Offsets are made image-relative: Mach-O addresses are rebased on the
/// `__TEXT` segment, ELF addresses on the lowest loadable segment.
#[derive(Debug, Default)]
pub struct ObjectFileSymbols {
    root: Option<PathBuf>,
    cache: Mutex<HashMap<PathBuf, Option<Arc<SymbolTable>>>>,
}

impl ObjectFileSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve image paths below `root` instead of `/`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: Some(root.into()), cache: Mutex::new(HashMap::new()) }
    }

    fn disk_path(&self, image: &BinaryImage) -> PathBuf {
        match &self.root {
            Some(root) => root.join(image.path.trim_start_matches('/')),
            None => PathBuf::from(&image.path),
        }
    }
}

impl SymbolSource for ObjectFileSymbols {
    fn symbols_for(&self, image: &BinaryImage) -> Option<Arc<SymbolTable>> {
        let path = self.disk_path(image);
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache
            .entry(path.clone())
            .or_insert_with(|| {
                read_object_symbols(&path, image.arch.as_deref()).map(Arc::new)
            })
            .clone()
    }
}

/// Symbol table of the binary at `path`, `None` when it cannot be read or
/// has no usable symbols. `arch` picks the slice of a universal binary.
pub fn read_object_symbols(path: &Path, arch: Option<&str>) -> Option<SymbolTable> {
    let bytes = fs::read(path).ok()?;
    let symbols = match Object::parse(&bytes) {
        Ok(Object::Elf(elf)) => elf_symbols(&elf),
        Ok(Object::Mach(mach::Mach::Binary(bin))) => mach_symbols(&bin),
        Ok(Object::Mach(mach::Mach::Fat(fat))) => fat_slice_symbols(&fat, &bytes, arch)?,
        Ok(_) => return None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to parse binary for symbols");
            return None;
        }
    };
    if symbols.is_empty() {
        return None;
    }
    debug!(path = %path.display(), symbols = symbols.len(), "read symbols from binary");
    Some(SymbolTable::new(symbols))
}

fn elf_symbols(elf: &elf::Elf) -> Vec<(u64, String)> {
    let load_base = elf
        .program_headers
        .iter()
        .filter(|ph| ph.p_type == elf::program_header::PT_LOAD)
        .map(|ph| ph.p_vaddr)
        .min()
        .unwrap_or(0);
    let mut symbols = Vec::new();
    let tables = [(&elf.syms, &elf.strtab), (&elf.dynsyms, &elf.dynstrtab)];
    for (syms, strtab) in tables {
        for sym in syms.iter() {
            if !sym.is_function()
                || sym.st_value == 0
                || sym.st_shndx == elf::section_header::SHN_UNDEF as usize
            {
                continue;
            }
            let name = strtab.get_at(sym.st_name).unwrap_or("");
            if name.is_empty() {
                continue;
            }
            symbols.push((sym.st_value.saturating_sub(load_base), name.to_string()));
        }
    }
    symbols
}

fn mach_symbols(bin: &MachO) -> Vec<(u64, String)> {
    let text_base = bin
        .segments
        .iter()
        .find(|seg| seg.name().map(|n| n == "__TEXT").unwrap_or(false))
        .map(|seg| seg.vmaddr)
        .unwrap_or(0);
    let mut symbols = Vec::new();
    for sym in bin.symbols() {
        let Ok((name, nlist)) = sym else { continue };
        if nlist.is_stab() || nlist.is_undefined() || nlist.n_value == 0 {
            continue;
        }
        let name = name.strip_prefix('_').unwrap_or(name);
        if name.is_empty() {
            continue;
        }
        symbols.push((nlist.n_value.saturating_sub(text_base), name.to_string()));
    }
    symbols
}

fn fat_slice_symbols(
    fat: &mach::MultiArch,
    bytes: &[u8],
    arch: Option<&str>,
) -> Option<Vec<(u64, String)>> {
    let arches: Vec<_> = fat.iter_arches().filter_map(Result::ok).collect();
    let chosen = arch
        .and_then(|wanted| {
            arches.iter().find(|fa| {
                get_arch_name_from_types(fa.cputype, fa.cpusubtype) == Some(wanted)
            })
        })
        .or_else(|| arches.first())?;
    let slice = chosen.slice(bytes);
    let bin = MachO::parse(slice, 0).ok()?;
    Some(mach_symbols(&bin))
}
