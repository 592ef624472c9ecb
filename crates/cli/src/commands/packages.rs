use std::path::Path;

use anyhow::{anyhow, Context, Result};
use crashreport_core::package::{DpkgDatabase, PackageIndex};

use crate::GlobalOptions;

/// Build (or rebuild) the SQLite package index from a dpkg admin directory.
pub fn index_packages_command(
    opts: &GlobalOptions,
    dpkg_dir: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let config = opts.load_config()?;
    let dpkg_dir = dpkg_dir.unwrap_or(&config.dpkg_dir);
    let output = output
        .or(config.package_index.as_deref())
        .ok_or_else(|| anyhow!("No index path: pass --output or set package_index in the config"))?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let index = PackageIndex::open(output)
        .with_context(|| format!("Failed to open package index at {}", output.display()))?;
    let dpkg = DpkgDatabase::new(dpkg_dir);
    let stats = index
        .import_dpkg(&dpkg)
        .with_context(|| format!("Failed to import dpkg database from {}", dpkg_dir.display()))?;

    println!("Indexed packages:");
    println!("  Packages: {}", stats.packages);
    println!("  Files: {}", stats.files);
    println!("  Script lines: {}", stats.script_lines);
    println!("  Index: {}", output.display());
    Ok(())
}
