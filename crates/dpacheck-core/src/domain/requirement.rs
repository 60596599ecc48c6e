//! Regulatory requirements and their deontic encodings.
//!
//! A requirement rule has the shape `&op{predicate} :- body.` where `op` is
//! one of `obligatory`, `permitted` or `forbidden` and the body is an
//! optional comma-separated list of atoms (each optionally prefixed by
//! `not `).

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Requirement identifier as it appears in the requirements file.
pub type RequirementId = String;

/// Actor assumed when a rule body carries no `role(..)` atom.
pub const DEFAULT_ACTOR: &str = "processor";

/// Deontic modality of a requirement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Obligation,
    Permission,
    Prohibition,
}

impl Modality {
    /// Deontic operator used in the rule head.
    pub fn operator(&self) -> &'static str {
        match self {
            Modality::Obligation => "obligatory",
            Modality::Permission => "permitted",
            Modality::Prohibition => "forbidden",
        }
    }

    /// Suffix used by the solver's status atoms (`&fulfilled_<kind>{..}`).
    pub fn status_kind(&self) -> &'static str {
        match self {
            Modality::Obligation => "obligation",
            Modality::Permission => "permission",
            Modality::Prohibition => "prohibition",
        }
    }

    pub fn from_operator(op: &str) -> Option<Self> {
        match op {
            "obligatory" => Some(Modality::Obligation),
            "permitted" => Some(Modality::Permission),
            "forbidden" => Some(Modality::Prohibition),
            _ => None,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_kind())
    }
}

fn head_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^&(obligatory|permitted|forbidden)\{\s*([^{}]+?)\s*\}\s*(?::-\s*(.*?))?\s*\.?\s*$")
            .expect("static regex")
    })
}

fn atom_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^-?[a-z_][A-Za-z0-9_]*(\([A-Za-z0-9_, ]*\))?$").expect("static regex")
    })
}

/// Returns true when `atom` is a ground ASP atom, optionally classically
/// negated with a leading `-`.
pub fn is_atom(atom: &str) -> bool {
    atom_regex().is_match(atom)
}

/// Split a rule body on top-level commas, ignoring commas inside
/// parentheses.
fn split_body(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in body.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Parsed form of a requirement's symbolic rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeonticEncoding {
    pub modality: Modality,
    /// Head predicate, including a leading `-` when classically negated.
    pub predicate: String,
    /// Body literals in source order, `not ` prefixes preserved.
    pub body: Vec<String>,
    /// The rule exactly as written, normalised to end with a `.`.
    pub rule: String,
}

impl DeonticEncoding {
    /// Parse a rule of the form `&op{predicate} :- body.`
    pub fn parse(rule: &str) -> Result<Self, String> {
        let trimmed = rule.trim();
        if trimmed.is_empty() {
            return Err("symbolic rule is empty".to_string());
        }
        let caps = head_regex()
            .captures(trimmed)
            .ok_or_else(|| format!("unrecognised deontic rule: {trimmed}"))?;

        let modality = Modality::from_operator(&caps[1])
            .ok_or_else(|| format!("unknown deontic operator: {}", &caps[1]))?;
        let predicate = caps[2].trim().to_string();
        if !is_atom(&predicate) {
            return Err(format!("invalid head predicate: {predicate}"));
        }

        let body = match caps.get(3) {
            Some(m) if !m.as_str().trim().is_empty() => split_body(m.as_str()),
            _ => Vec::new(),
        };
        for literal in &body {
            let atom = literal.strip_prefix("not ").unwrap_or(literal).trim();
            if !is_atom(atom) {
                return Err(format!("invalid body literal: {literal}"));
            }
        }

        let rule = if trimmed.ends_with('.') {
            trimmed.to_string()
        } else {
            format!("{trimmed}.")
        };

        Ok(Self {
            modality,
            predicate,
            body,
            rule,
        })
    }

    /// Body atoms with any `not ` prefix removed. These are declared
    /// `#external` in generated programs.
    pub fn body_atoms(&self) -> Vec<String> {
        self.body
            .iter()
            .map(|lit| lit.strip_prefix("not ").unwrap_or(lit).trim().to_string())
            .collect()
    }

    /// Actor named by a `role(..)` body atom, if any.
    pub fn actor(&self) -> Option<String> {
        self.body_atoms().into_iter().find_map(|atom| {
            atom.strip_prefix("role(")
                .and_then(|rest| rest.strip_suffix(')'))
                .map(|actor| actor.trim().to_string())
        })
    }

    /// Body literals other than the `role(..)` atom, joined with `, `.
    pub fn condition(&self) -> Option<String> {
        let rest: Vec<&str> = self
            .body
            .iter()
            .filter(|lit| !lit.starts_with("role("))
            .map(String::as_str)
            .collect();
        if rest.is_empty() {
            None
        } else {
            Some(rest.join(", "))
        }
    }
}

/// A single regulatory obligation, permission or prohibition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Requirement {
    pub id: RequirementId,
    /// Natural-language statement of the requirement.
    pub text: String,
    pub encoding: DeonticEncoding,
    pub actor: String,
    pub modality: Modality,
    pub condition: Option<String>,
    /// Ground atoms the fact extractor may emit for this requirement.
    pub atoms: Vec<String>,
}

impl Requirement {
    /// Predicate the requirement is about, without classical negation.
    pub fn head_atom(&self) -> &str {
        self.encoding
            .predicate
            .strip_prefix('-')
            .unwrap_or(&self.encoding.predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_obligation_with_role() {
        let enc =
            DeonticEncoding::parse("&obligatory{ensure_security_of_processing} :- role(processor).")
                .unwrap();
        assert_eq!(enc.modality, Modality::Obligation);
        assert_eq!(enc.predicate, "ensure_security_of_processing");
        assert_eq!(enc.body, vec!["role(processor)"]);
        assert_eq!(enc.actor().as_deref(), Some("processor"));
        assert!(enc.condition().is_none());
    }

    #[test]
    fn test_parse_prohibition_with_condition_and_negation() {
        let enc = DeonticEncoding::parse(
            "&forbidden{engage_sub_processor} :- role(processor), not authorization_obtained",
        )
        .unwrap();
        assert_eq!(enc.modality, Modality::Prohibition);
        assert_eq!(enc.rule.chars().last(), Some('.'));
        assert_eq!(
            enc.body_atoms(),
            vec!["role(processor)", "authorization_obtained"]
        );
        assert_eq!(enc.condition().as_deref(), Some("not authorization_obtained"));
    }

    #[test]
    fn test_parse_fact_rule_without_body() {
        let enc = DeonticEncoding::parse("&permitted{-retain_copies}.").unwrap();
        assert_eq!(enc.modality, Modality::Permission);
        assert_eq!(enc.predicate, "-retain_copies");
        assert!(enc.body.is_empty());
        assert!(enc.actor().is_none());
    }

    #[test]
    fn test_body_split_ignores_nested_commas() {
        let enc = DeonticEncoding::parse(
            "&obligatory{notify_breach} :- role(processor), breach(personal, data).",
        )
        .unwrap();
        assert_eq!(enc.body.len(), 2);
        assert_eq!(enc.body[1], "breach(personal, data)");
    }

    #[test]
    fn test_parse_rejects_malformed_rules() {
        assert!(DeonticEncoding::parse("").is_err());
        assert!(DeonticEncoding::parse("obligatory(x) :- role(processor).").is_err());
        assert!(DeonticEncoding::parse("&mandatory{x} :- role(processor).").is_err());
        assert!(DeonticEncoding::parse("&obligatory{Bad Predicate}.").is_err());
        assert!(DeonticEncoding::parse("&obligatory{x} :- role(processor), 42.").is_err());
    }

    #[test]
    fn test_is_atom() {
        assert!(is_atom("role(processor)"));
        assert!(is_atom("-ensure_confidentiality_commitment"));
        assert!(!is_atom("Ensure"));
        assert!(!is_atom("two words"));
        assert!(!is_atom(""));
    }

    #[test]
    fn test_head_atom_strips_negation() {
        let enc = DeonticEncoding::parse("&obligatory{-transfer_data}.").unwrap();
        let req = Requirement {
            id: "3".into(),
            text: "t".into(),
            actor: DEFAULT_ACTOR.into(),
            modality: enc.modality,
            condition: None,
            atoms: vec![],
            encoding: enc,
        };
        assert_eq!(req.head_atom(), "transfer_data");
    }
}
