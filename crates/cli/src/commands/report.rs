use std::path::Path;

use anyhow::Result;
use crashreport_core::report::{build_report, Report};
use crashreport_core::script::{InstructionKind, LinkTarget};

use crate::commands::{owner_label, symbolicate_log};
use crate::{build_resolver, load_crash_log, GlobalOptions};

/// Build the blame report for one crash log.
pub fn report_command(
    opts: &GlobalOptions,
    path: &Path,
    symbolicate: bool,
    symbols_dir: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = opts.load_config()?;
    let mut log = load_crash_log(path, &config)?;
    if symbolicate {
        symbolicate_log(&mut log, &config, symbols_dir, None)?;
    }
    let resolver = build_resolver(&config)?;
    let report = build_report(&log, &resolver, &config);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &Report) {
    println!("Report for {} ({})", report.log.name, report.log.path.display());
    if let Some(fp) = &report.log.fingerprint {
        println!("  SHA-256: {fp}");
    }
    match &report.victim {
        Some(v) => println!("Victim: {} ({})", v.image.name, owner_label(v)),
        None => println!("Victim: (unknown)"),
    }

    println!("Suspects:");
    if report.suspects.is_empty() {
        println!("(none)");
    }
    for (rank, s) in report.suspects.iter().enumerate() {
        println!("  {}. {} ({})", rank + 1, s.image.name, owner_label(s));
    }

    println!("Links:");
    if report.links.is_empty() {
        println!("(none)");
    }
    for link in &report.links {
        if let InstructionKind::Link(l) = &link.kind {
            match &l.target {
                LinkTarget::Url(url) => println!("  - {}: {url}", link.title),
                LinkTarget::Email(to) => println!("  - {}: mailto:{}", link.title, to.join(",")),
            }
        }
    }

    println!("Includes:");
    if report.includes.is_empty() {
        println!("(none)");
    }
    for inc in &report.includes {
        println!("  - {} ({} bytes)", inc.instruction.title, inc.content.len());
    }

    if !report.failures.is_empty() {
        println!("Failures:");
        for f in &report.failures {
            println!("  - {}: {}", f.title, f.error);
        }
    }
}
