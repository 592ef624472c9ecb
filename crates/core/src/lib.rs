//! crashreport-core
//!
//! Core library for analysing crash logs: parsing reports into structured
//! records, symbolicating raw addresses, resolving binaries to the packages
//! that installed them, and evaluating the packages' blame scripts into a
//! report of suspects, evidence and contacts.
//!
//! All substantive logic lives here so it is testable without the CLI.

pub mod config;
pub mod crashlog;
pub mod decode;
pub mod fsops;
pub mod package;
pub mod privileged;
pub mod report;
pub mod script;
pub mod symbols;
pub mod time;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
