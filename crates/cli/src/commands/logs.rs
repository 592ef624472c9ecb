use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use crashreport_core::crashlog::{
    scan_directory, scan_log_directories, CrashHeader, CrashLog, Suspect,
};
use crashreport_core::privileged::{HelperProcess, PrivilegedHelper};
use crashreport_core::report::{LogSummary, Owner, ReportedImage};
use serde::Serialize;

use crate::{build_resolver, format_date, load_crash_log, GlobalOptions};

#[derive(Debug, Serialize)]
struct ListedLog {
    path: PathBuf,
    date: Option<chrono::NaiveDateTime>,
}

#[derive(Debug, Serialize)]
struct ListedGroup {
    name: String,
    directory: PathBuf,
    logs: Vec<ListedLog>,
}

/// List crash logs grouped by process.
///
/// Scans `dir` when given, otherwise the mobile and root log directories.
pub fn list_command(opts: &GlobalOptions, dir: Option<&Path>, json: bool) -> Result<()> {
    let config = opts.load_config()?;
    let groups = match dir {
        Some(dir) => scan_directory(dir)
            .with_context(|| format!("Failed to scan {}", dir.display()))?,
        None => scan_log_directories(&config).context("Failed to scan crash log directories")?,
    };

    if json {
        let listed: Vec<ListedGroup> = groups
            .iter()
            .map(|g| ListedGroup {
                name: g.name.clone(),
                directory: g.log_directory.clone(),
                logs: g
                    .crash_logs
                    .iter()
                    .map(|l| ListedLog { path: l.path().to_path_buf(), date: l.log_date() })
                    .collect(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    println!("Crash logs:");
    if groups.is_empty() {
        println!("(none)");
        return Ok(());
    }
    for group in groups {
        println!(
            "- {} ({} in {})",
            group.name,
            group.crash_logs.len(),
            group.log_directory.display()
        );
        for log in &group.crash_logs {
            println!("    {}  {}", format_date(log.log_date()), log.path().display());
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ShowOutput<'a> {
    log: LogSummary,
    header: Option<&'a CrashHeader>,
    victim: Option<ReportedImage>,
    suspects: Vec<ReportedImage>,
    potential_suspects: Vec<ReportedImage>,
}

/// Print a crash log's header, victim, and suspects.
pub fn show_command(opts: &GlobalOptions, path: &Path, json: bool) -> Result<()> {
    let config = opts.load_config()?;
    let mut log = load_crash_log(path, &config)?;
    log.mark_viewed();
    let resolver = build_resolver(&config)?;

    let victim = log.victim().map(|image| {
        let resolution = resolver.resolve(&image.path);
        ReportedImage::from(&Suspect { image: image.clone(), resolution })
    });
    let suspects: Vec<ReportedImage> =
        log.suspects(&resolver).iter().map(ReportedImage::from).collect();
    let potential: Vec<ReportedImage> =
        log.potential_suspects(&resolver).iter().map(ReportedImage::from).collect();

    if json {
        let output = ShowOutput {
            log: LogSummary::from(&log),
            header: log.header(),
            victim,
            suspects,
            potential_suspects: potential,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_header(&log);
    match &victim {
        Some(v) => println!("Victim: {} ({})", v.image.name, owner_label(v)),
        None => println!("Victim: (unknown)"),
    }
    println!("Suspects:");
    if suspects.is_empty() {
        println!("(none)");
    }
    for (rank, s) in suspects.iter().enumerate() {
        println!("  {}. {} [{}] ({})", rank + 1, s.image.name, s.image.path, owner_label(s));
    }
    Ok(())
}

fn print_header(log: &CrashLog) {
    println!("Crash log: {}", log.path().display());
    if let Some(h) = log.header() {
        println!("  Process: {}", h.process_name);
        if let Some(p) = &h.process_path {
            println!("  Path: {p}");
        }
        println!("  Date: {}", h.date);
        if let Some(os) = &h.os_version {
            println!("  OS Version: {os}");
        }
        if let Some(exc) = &h.exception_type {
            println!("  Exception: {exc}");
        }
        println!("  Crashed thread: {}", h.crashed_thread);
    }
    println!("  Type: {:?}", log.log_type());
    println!("  Symbolicated: {}", if log.is_symbolicated() { "yes" } else { "no" });
}

/// Short owner description for text output.
pub fn owner_label(image: &ReportedImage) -> String {
    match &image.owner {
        Owner::Package { identifier, name, .. } if name != identifier => {
            format!("{name}, {identifier}")
        }
        Owner::Package { identifier, .. } => identifier.clone(),
        Owner::Apple => "system".to_string(),
        Owner::Unknown => "unknown".to_string(),
    }
}

/// Delete a crash log, through the privileged helper when needed.
pub fn delete_command(opts: &GlobalOptions, path: &Path) -> Result<()> {
    let config = opts.load_config()?;
    let helper = HelperProcess::from_config(&config);
    let log = CrashLog::new(path);
    log.delete(helper.as_ref().map(|h| h as &dyn PrivilegedHelper))
        .with_context(|| format!("Failed to delete {}", path.display()))?;
    println!("Deleted {}", path.display());
    Ok(())
}
