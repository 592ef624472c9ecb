use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use crashreport::commands::{
    check_script_command, delete_command, index_packages_command, list_command, report_command,
    show_command, symbolicate_command,
};
use crashreport::logging::{init_logging, LogLevel};
use crashreport::GlobalOptions;

/// Crash log analysis CLI.
///
/// A thin wrapper around `crashreport-core`: parsing, symbolication, package
/// resolution, and blame-script evaluation all live in the library.
#[derive(Parser, Debug)]
#[command(
    name = "crashreport",
    version,
    about = "Inspect crash logs and find who to blame",
    long_about = None
)]
struct Cli {
    /// Config file (JSON or YAML). Defaults to $CRASHREPORT_CONFIG, then built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List crash logs grouped by process, newest first.
    List {
        /// Directory to scan instead of the configured log directories.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show header, victim, and suspects of a crash log.
    Show {
        /// Crash log file.
        log: PathBuf,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Resolve raw frame addresses and rewrite the log in place.
    Symbolicate {
        log: PathBuf,

        /// Directory of `<uuid>.sym` files (overrides the config).
        #[arg(long)]
        symbols: Option<PathBuf>,

        /// Read binaries below this root instead of `/`.
        #[arg(long)]
        sysroot: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Evaluate blame scripts and print the resulting report.
    Report {
        log: PathBuf,

        /// Symbolicate the log first.
        #[arg(long, default_value_t = false)]
        symbolicate: bool,

        /// Directory of `<uuid>.sym` files used with --symbolicate.
        #[arg(long)]
        symbols: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Delete a crash log, via the privileged helper when required.
    Delete { log: PathBuf },

    /// Build the SQLite package index from the dpkg database.
    IndexPackages {
        /// dpkg admin directory (overrides the config).
        #[arg(long)]
        dpkg_dir: Option<PathBuf>,

        /// Index file to write (overrides `package_index` in the config).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Parse a blame script and report invalid lines.
    CheckScript {
        script: PathBuf,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.parse::<LogLevel>()?)?;
    let opts = GlobalOptions { config: cli.config };

    match cli.command {
        Command::List { dir, json } => list_command(&opts, dir.as_deref(), json)?,
        Command::Show { log, json } => show_command(&opts, &log, json)?,
        Command::Symbolicate { log, symbols, sysroot, json } => {
            symbolicate_command(&opts, &log, symbols.as_deref(), sysroot.as_deref(), json)?
        }
        Command::Report { log, symbolicate, symbols, json } => {
            report_command(&opts, &log, symbolicate, symbols.as_deref(), json)?
        }
        Command::Delete { log } => delete_command(&opts, &log)?,
        Command::IndexPackages { dpkg_dir, output } => {
            index_packages_command(&opts, dpkg_dir.as_deref(), output.as_deref())?
        }
        Command::CheckScript { script, json } => check_script_command(&script, json)?,
    }

    Ok(())
}
