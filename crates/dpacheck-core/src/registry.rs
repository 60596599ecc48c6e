//! Requirement registry: loads the requirements file and resolves
//! requirement selections.
//!
//! The requirements file is a JSON object keyed by requirement id:
//!
//! ```json
//! {
//!   "1": {
//!     "text": "The processor shall ...",
//!     "symbolic": "&obligatory{process_data_on_documented_instructions} :- role(processor).",
//!     "atoms": ["process_data_on_documented_instructions"]
//!   }
//! }
//! ```
//!
//! # Invariants
//!
//! - Requirement ids are unique.
//! - Iteration order is numeric ascending when every id is numeric,
//!   lexicographic otherwise, and is stable across loads.
//! - Every loaded requirement has a parseable deontic encoding.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    is_atom, DeonticEncoding, DpaError, Requirement, RequirementId, Result, DEFAULT_ACTOR,
};

#[derive(Debug, Deserialize)]
struct RequirementRecord {
    text: Option<String>,
    symbolic: Option<String>,
    #[serde(default)]
    atoms: Vec<String>,
    actor: Option<String>,
    condition: Option<String>,
}

fn build_requirement(id: &str, record: RequirementRecord) -> Result<Requirement> {
    let text = record
        .text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| DpaError::malformed(id, "missing natural-language text"))?;
    let symbolic = record
        .symbolic
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| DpaError::malformed(id, "missing symbolic rule"))?;
    let encoding =
        DeonticEncoding::parse(&symbolic).map_err(|reason| DpaError::malformed(id, reason))?;

    for atom in &record.atoms {
        if !is_atom(atom.trim()) {
            return Err(DpaError::malformed(id, format!("invalid atom: {atom}")));
        }
    }

    let actor = record
        .actor
        .or_else(|| encoding.actor())
        .unwrap_or_else(|| DEFAULT_ACTOR.to_string());
    let condition = record.condition.or_else(|| encoding.condition());

    let mut req = Requirement {
        id: id.to_string(),
        text,
        modality: encoding.modality,
        actor,
        condition,
        atoms: record.atoms.iter().map(|a| a.trim().to_string()).collect(),
        encoding,
    };
    if req.atoms.is_empty() {
        let mut atoms = vec![req.head_atom().to_string()];
        for atom in req.encoding.body_atoms() {
            if !atoms.contains(&atom) {
                atoms.push(atom);
            }
        }
        req.atoms = atoms;
    }
    Ok(req)
}

fn compare_ids(numeric: bool) -> impl Fn(&Requirement, &Requirement) -> Ordering {
    move |a, b| {
        if numeric {
            let an: u64 = a.id.parse().unwrap_or(u64::MAX);
            let bn: u64 = b.id.parse().unwrap_or(u64::MAX);
            an.cmp(&bn)
        } else {
            a.id.cmp(&b.id)
        }
    }
}

/// Which requirements a run evaluates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequirementSelector {
    #[default]
    All,
    Ids(Vec<RequirementId>),
}

impl FromStr for RequirementSelector {
    type Err = DpaError;

    /// Accepts `all` (case-insensitive) or a comma-separated id list.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        let ids: Vec<String> = s
            .split(',')
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(DpaError::Configuration(
                "requirement selection is empty".to_string(),
            ));
        }
        Ok(Self::Ids(ids))
    }
}

impl fmt::Display for RequirementSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Ids(ids) => f.write_str(&ids.join(",")),
        }
    }
}

/// Ordered, validated set of requirements.
#[derive(Debug, Clone, Default)]
pub struct RequirementRegistry {
    requirements: Vec<Requirement>,
}

impl RequirementRegistry {
    /// Load and validate a requirements file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let registry = Self::from_json_str(&raw)?;
        debug!(path = %path.display(), count = registry.len(), "loaded requirements");
        Ok(registry)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let entries: HashMap<String, serde_json::Value> = serde_json::from_str(raw)?;
        if entries.is_empty() {
            return Err(DpaError::Configuration(
                "requirements file contains no requirements".to_string(),
            ));
        }
        let mut requirements = Vec::with_capacity(entries.len());
        for (id, value) in entries {
            let id = id.trim().to_string();
            if id.is_empty() {
                return Err(DpaError::malformed("<empty>", "requirement id is empty"));
            }
            let record: RequirementRecord = serde_json::from_value(value)
                .map_err(|e| DpaError::malformed(&id, e.to_string()))?;
            requirements.push(build_requirement(&id, record)?);
        }
        Ok(Self::from_requirements(requirements))
    }

    /// Build a registry from already-parsed requirements, applying the
    /// canonical ordering. Later duplicates of an id are dropped.
    pub fn from_requirements(requirements: Vec<Requirement>) -> Self {
        let mut seen = BTreeSet::new();
        let mut requirements: Vec<Requirement> = requirements
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        let numeric = requirements.iter().all(|r| r.id.parse::<u64>().is_ok());
        requirements.sort_by(compare_ids(numeric));
        Self { requirements }
    }

    pub fn all(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn get(&self, id: &str) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Resolve a selection to requirements in registry order.
    ///
    /// Fails with [`DpaError::UnknownRequirement`] on the first id the
    /// registry does not know.
    pub fn select(&self, selector: &RequirementSelector) -> Result<Vec<Requirement>> {
        match selector {
            RequirementSelector::All => Ok(self.requirements.clone()),
            RequirementSelector::Ids(ids) => {
                let wanted: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
                for id in &wanted {
                    if self.get(id).is_none() {
                        return Err(DpaError::UnknownRequirement((*id).to_string()));
                    }
                }
                Ok(self
                    .requirements
                    .iter()
                    .filter(|r| wanted.contains(r.id.as_str()))
                    .cloned()
                    .collect())
            }
        }
    }
}
