use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use crashreport_core::config::{load_config_or_default, ReporterConfig};
use crashreport_core::crashlog::CrashLog;
use crashreport_core::package::{DpkgDatabase, PackageDatabase, PackageIndex, PackageResolver};
use crashreport_core::symbols::{ChainedSymbols, SymbolDirectory};

pub mod commands;
pub mod logging;

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
}

impl GlobalOptions {
    pub fn load_config(&self) -> Result<ReporterConfig> {
        load_config_or_default(self.config.as_deref())
    }
}

/// Package database to query: the SQLite index when configured and present,
/// the dpkg admin directory otherwise.
pub fn open_package_db(config: &ReporterConfig) -> Result<Box<dyn PackageDatabase>> {
    if let Some(index_path) = config.package_index.as_ref().filter(|p| p.is_file()) {
        let index = PackageIndex::open(index_path)
            .with_context(|| format!("Failed to open package index at {}", index_path.display()))?;
        return Ok(Box::new(index));
    }
    Ok(Box::new(DpkgDatabase::new(&config.dpkg_dir)))
}

pub fn build_resolver(config: &ReporterConfig) -> Result<PackageResolver> {
    Ok(PackageResolver::from_boxed(open_package_db(config)?, config))
}

/// Symbol sources in lookup order: symbol files, then the binaries on disk.
pub fn build_symbol_source(
    config: &ReporterConfig,
    symbols_dir: Option<&Path>,
    sysroot: Option<&Path>,
) -> ChainedSymbols {
    let mut chain = ChainedSymbols::new();
    if let Some(dir) = symbols_dir.or(config.symbols_dir.as_deref()) {
        chain.push(SymbolDirectory::new(dir));
    }
    #[cfg(feature = "object-symbols")]
    {
        use crashreport_core::symbols::ObjectFileSymbols;
        match sysroot {
            Some(root) => chain.push(ObjectFileSymbols::with_root(root)),
            None => chain.push(ObjectFileSymbols::new()),
        }
    }
    #[cfg(not(feature = "object-symbols"))]
    let _ = sysroot;
    chain
}

/// Create and load a crash log, with the path in any error.
pub fn load_crash_log(path: &Path, config: &ReporterConfig) -> Result<CrashLog> {
    let mut log = CrashLog::new(path);
    log.load(config).with_context(|| format!("Failed to load crash log {}", path.display()))?;
    Ok(log)
}

/// Format an optional date for listings.
pub fn format_date(date: Option<chrono::NaiveDateTime>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()).unwrap_or_else(|| "-".to_string())
}
