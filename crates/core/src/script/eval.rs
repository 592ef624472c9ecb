use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::script::{Instruction, InstructionKind, Script};

/// Accumulates instructions across a chain of scripts.
///
/// Order numbers are reassigned as scripts are added, so declaration order
/// spans the whole chain. Denies are applied in [`Evaluation::finish`], after
/// every script has been seen.
#[derive(Debug, Default)]
pub struct Evaluation {
    next_order: usize,
    includes: Vec<Instruction>,
    links: Vec<Instruction>,
    denies: Vec<String>,
}

/// Links and includes left after deny filtering, each sorted with
/// [`Instruction::compare`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluatedInstructions {
    pub links: Vec<Instruction>,
    pub includes: Vec<Instruction>,
}

impl EvaluatedInstructions {
    /// Links first, then includes.
    pub fn rendering_order(&self) -> impl Iterator<Item = &Instruction> {
        self.links.iter().chain(self.includes.iter())
    }
}

impl Evaluation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `script`, tagging its instructions with `origin`.
    pub fn add_script(&mut self, script: &Script, origin: Option<&str>) {
        for instruction in &script.instructions {
            self.add(instruction.clone(), origin);
        }
    }

    pub fn add(&mut self, mut instruction: Instruction, origin: Option<&str>) {
        instruction.order = self.next_order;
        instruction.origin = origin.map(String::from);
        self.next_order += 1;
        match &instruction.kind {
            InstructionKind::Include(_) => self.includes.push(instruction),
            InstructionKind::Link(_) => self.links.push(instruction),
            InstructionKind::Deny { target } => self.denies.push(target.clone()),
        }
    }

    /// Apply denies, drop duplicates, and sort.
    ///
    /// A link is removed when its unlocalized title matches any deny, no
    /// matter which came first. Duplicate links (same title and target) and
    /// duplicate includes (same kind and target) keep their first occurrence.
    pub fn finish(self) -> EvaluatedInstructions {
        let denied: HashSet<&str> = self.denies.iter().map(String::as_str).collect();
        let before = self.links.len();

        let mut seen_links = HashSet::new();
        let mut links: Vec<Instruction> = self
            .links
            .into_iter()
            .filter(|i| {
                let Some(link) = i.as_link() else { return false };
                !denied.contains(link.unlocalized_title.as_str())
                    && seen_links.insert((link.unlocalized_title.clone(), link.target.clone()))
            })
            .collect();
        links.sort_by(Instruction::compare);

        let mut seen_includes = HashSet::new();
        let mut includes: Vec<Instruction> = self
            .includes
            .into_iter()
            .filter(|i| {
                i.as_include()
                    .is_some_and(|inc| seen_includes.insert((inc.kind, inc.target.clone())))
            })
            .collect();
        includes.sort_by(Instruction::compare);

        debug!(
            links = links.len(),
            removed = before - links.len(),
            includes = includes.len(),
            "evaluated script chain"
        );
        EvaluatedInstructions { links, includes }
    }
}

/// Evaluate scripts in order, without origins.
pub fn evaluate<'a>(scripts: impl IntoIterator<Item = &'a Script>) -> EvaluatedInstructions {
    let mut eval = Evaluation::new();
    for script in scripts {
        eval.add_script(script, None);
    }
    eval.finish()
}
