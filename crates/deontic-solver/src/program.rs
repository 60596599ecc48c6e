//! Logic program rendering.
//!
//! One program per requirement: a comment header, `#external` declarations
//! for the rule body, the normative rule, the extracted facts, the status
//! mapping and `#show status/1.`

use std::collections::BTreeSet;
use std::fmt::Write;

use dpacheck_core::{ExtractedFact, Requirement};

/// Render the solver input for `requirement` given the facts that
/// segments asserted about it.
pub fn render_program(requirement: &Requirement, facts: &[ExtractedFact]) -> String {
    let mut out = String::new();
    let encoding = &requirement.encoding;

    let _ = writeln!(out, "% requirement {}", requirement.id);
    for line in requirement.text.lines().filter(|l| !l.trim().is_empty()) {
        let _ = writeln!(out, "% {}", line.trim());
    }
    let segments: BTreeSet<&str> = facts.iter().map(|f| f.segment_id.as_str()).collect();
    if !segments.is_empty() {
        let ids: Vec<&str> = segments.into_iter().collect();
        let _ = writeln!(out, "% segments: {}", ids.join(", "));
    }
    out.push('\n');

    let mut declared = BTreeSet::new();
    for atom in encoding.body_atoms() {
        let atom = atom.strip_prefix('-').unwrap_or(&atom).to_string();
        if declared.insert(atom.clone()) {
            let _ = writeln!(out, "#external {atom}.");
        }
    }
    if !declared.is_empty() {
        out.push('\n');
    }

    let _ = writeln!(out, "{}", encoding.rule);
    out.push('\n');

    let mut seen = BTreeSet::new();
    for fact in facts {
        if seen.insert(fact.predicate.as_str()) {
            let _ = writeln!(out, "{}.", fact.predicate);
        }
    }
    if !seen.is_empty() {
        out.push('\n');
    }

    let kind = requirement.modality.status_kind();
    let p = &encoding.predicate;
    let _ = writeln!(out, "status(satisfied) :- &fulfilled_{kind}{{{p}}}.");
    let _ = writeln!(out, "status(violated) :- &violated_{kind}{{{p}}}.");
    let _ = writeln!(out, "status(not_mentioned) :- &undetermined_{kind}{{{p}}}.");
    out.push('\n');
    out.push_str("#show status/1.\n");
    out
}
