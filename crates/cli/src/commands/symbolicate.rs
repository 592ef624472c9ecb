use std::path::Path;

use anyhow::{Context, Result};
use crashreport_core::config::ReporterConfig;
use crashreport_core::crashlog::CrashLog;
use crashreport_core::privileged::{HelperProcess, PrivilegedHelper};
use crashreport_core::symbols::SymbolicationSummary;

use crate::{build_symbol_source, load_crash_log, GlobalOptions};

/// Symbolicate `log` in place using the configured symbol sources.
pub fn symbolicate_log(
    log: &mut CrashLog,
    config: &ReporterConfig,
    symbols_dir: Option<&Path>,
    sysroot: Option<&Path>,
) -> Result<SymbolicationSummary> {
    let source = build_symbol_source(config, symbols_dir, sysroot);
    let helper = HelperProcess::from_config(config);
    let summary = log
        .symbolicate(&source, &config.temp_dir, helper.as_ref().map(|h| h as &dyn PrivilegedHelper))
        .with_context(|| format!("Failed to symbolicate {}", log.path().display()))?;
    Ok(summary)
}

pub fn symbolicate_command(
    opts: &GlobalOptions,
    path: &Path,
    symbols_dir: Option<&Path>,
    sysroot: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = opts.load_config()?;
    let mut log = load_crash_log(path, &config)?;
    let already = log.is_symbolicated();
    let summary = symbolicate_log(&mut log, &config, symbols_dir, sysroot)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if already {
        println!("{} is already symbolicated", path.display());
        return Ok(());
    }
    println!("Symbolicated {}", path.display());
    println!("  Resolved frames: {}", summary.resolved);
    println!("  Unresolved frames: {}", summary.errors.len());
    for err in &summary.errors {
        println!("    - {err}");
    }
    Ok(())
}
