use std::path::Path;

use anyhow::{bail, Context, Result};
use crashreport_core::script::{evaluate, Script};

/// Parse a blame script, print its canonical form, and fail on bad lines.
pub fn check_script_command(path: &Path, json: bool) -> Result<()> {
    let script = Script::from_file(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    let evaluated = evaluate([&script]);

    if json {
        println!("{}", serde_json::to_string_pretty(&evaluated)?);
    } else {
        print!("{script}");
        println!(
            "# {} link(s) after deny, {} include(s)",
            evaluated.links.len(),
            evaluated.includes.len()
        );
    }

    if !script.errors.is_empty() {
        for err in &script.errors {
            eprintln!("{}: {err}", path.display());
        }
        bail!("{} invalid line(s) in {}", script.errors.len(), path.display());
    }
    Ok(())
}
