//! Report assembly: victim, ranked suspects, and the evaluated instructions
//! of their packages' scripts.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ReporterConfig;
use crate::crashlog::{BinaryImage, CrashLog, LogType, Suspect};
use crate::package::{Package, PackageResolver, Resolution};
use crate::script::{
    resolve_include, Evaluation, IncludeContext, Instruction, InstructionKind, Link, LinkTarget,
    Script,
};

/// How far down the suspect list scripts are evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClaimPolicy {
    /// Every suspect's package contributes.
    #[default]
    Union,
    /// Stop after the first package that ships its own script.
    FirstClaim,
}

/// Who owns an image, in serializable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Owner {
    Package {
        identifier: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        has_script: bool,
        is_app_store: bool,
    },
    Apple,
    Unknown,
}

impl From<&Resolution> for Owner {
    fn from(resolution: &Resolution) -> Self {
        match resolution {
            Resolution::Package(p) => Owner::Package {
                identifier: p.identifier.clone(),
                name: p.name.clone(),
                author: p.author.clone(),
                has_script: p.has_script(),
                is_app_store: p.is_app_store,
            },
            Resolution::Apple => Owner::Apple,
            Resolution::Unknown => Owner::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedImage {
    #[serde(flatten)]
    pub image: BinaryImage,
    pub owner: Owner,
}

impl From<&Suspect> for ReportedImage {
    fn from(s: &Suspect) -> Self {
        Self { image: s.image.clone(), owner: Owner::from(&s.resolution) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    pub path: PathBuf,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDateTime>,
    pub log_type: LogType,
    pub symbolicated: bool,
    pub viewed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl From<&CrashLog> for LogSummary {
    fn from(log: &CrashLog) -> Self {
        Self {
            path: log.path().to_path_buf(),
            name: log.log_name().to_string(),
            process: log.header().map(|h| h.process_name.clone()),
            date: log.log_date(),
            log_type: log.log_type(),
            symbolicated: log.is_symbolicated(),
            viewed: log.is_viewed(),
            fingerprint: log.fingerprint(),
        }
    }
}

/// An include with its resolved content (empty on failure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludedEvidence {
    #[serde(flatten)]
    pub instruction: Instruction,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludeFailure {
    pub title: String,
    pub target: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub log: LogSummary,
    pub victim: Option<ReportedImage>,
    pub suspects: Vec<ReportedImage>,
    pub links: Vec<Instruction>,
    pub includes: Vec<IncludedEvidence>,
    pub failures: Vec<IncludeFailure>,
}

/// Contact link for a package without a script, from its author field.
pub fn author_link(package: &Package) -> Option<Instruction> {
    let email = package.author_email()?;
    let title = package.author_name().unwrap_or(&package.name).to_string();
    Some(Instruction {
        title: title.clone(),
        tokens: vec!["link".into(), "as".into(), title.clone(), "email".into(), email.into()],
        order: 0,
        origin: Some(package.identifier.clone()),
        kind: InstructionKind::Link(Link {
            target: LinkTarget::Email(vec![email.to_string()]),
            is_support: false,
            unlocalized_title: title,
        }),
    })
}

/// Assemble a report.
///
/// The victim's package is evaluated first, then each suspect's package in
/// rank order, then `default_script`. Each package is evaluated once even
/// when it owns several images.
pub fn assemble(
    log: &CrashLog,
    victim: Option<&Suspect>,
    suspects: &[Suspect],
    default_script: Option<&Script>,
    config: &ReporterConfig,
) -> Report {
    let mut eval = Evaluation::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let packages = victim.into_iter().chain(suspects).filter_map(|s| s.resolution.package());

    for package in packages {
        if !seen.insert(package.identifier.as_str()) {
            continue;
        }
        if package.has_script() {
            let script = Script::parse(package.config.iter().map(String::as_str));
            debug!(
                package = %package.identifier,
                instructions = script.instructions.len(),
                "evaluating package script"
            );
            eval.add_script(&script, Some(package.identifier.as_str()));
            if config.claim_policy == ClaimPolicy::FirstClaim {
                break;
            }
        } else if let Some(link) = author_link(package) {
            eval.add(link, Some(package.identifier.as_str()));
        }
    }
    if let Some(script) = default_script {
        eval.add_script(script, None);
    }
    let evaluated = eval.finish();

    let ctx = IncludeContext::new(config, log.log_date());
    let mut failures = Vec::new();
    let includes = evaluated
        .includes
        .into_iter()
        .map(|instruction| {
            let resolved = instruction.as_include().map(|inc| (inc, resolve_include(inc, &ctx)));
            let content = match resolved {
                Some((_, Ok(content))) => content,
                Some((inc, Err(err))) => {
                    warn!(
                        title = %instruction.title,
                        target = %inc.target,
                        error = %err,
                        "include failed"
                    );
                    failures.push(IncludeFailure {
                        title: instruction.title.clone(),
                        target: inc.target.clone(),
                        error: err.to_string(),
                    });
                    String::new()
                }
                None => String::new(),
            };
            IncludedEvidence { instruction, content }
        })
        .collect();

    Report {
        log: LogSummary::from(log),
        victim: victim.map(ReportedImage::from),
        suspects: suspects.iter().map(ReportedImage::from).collect(),
        links: evaluated.links,
        includes,
        failures,
    }
}

/// Resolve victim and suspects through `resolver`, load the configured
/// default script, and assemble.
pub fn build_report(log: &CrashLog, resolver: &PackageResolver, config: &ReporterConfig) -> Report {
    let victim = log
        .victim()
        .map(|image| Suspect { image: image.clone(), resolution: resolver.resolve(&image.path) });
    let suspects = log.suspects(resolver);
    let default_script =
        config.default_script.as_ref().and_then(|path| match Script::from_file(path) {
            Ok(script) => Some(script),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read default script");
                None
            }
        });
    assemble(log, victim.as_ref(), &suspects, default_script.as_ref(), config)
}
