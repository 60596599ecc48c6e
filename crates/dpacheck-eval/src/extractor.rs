//! Fact Extractor and Classifier.
//!
//! Classification asks which targeted requirements a segment addresses;
//! extraction asks, for one (segment, requirement) pair, which of the
//! requirement's atoms the segment supports. Neither step aborts a run:
//! unusable model output becomes an [`ExtractionFailure`] and an empty
//! result.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use dpacheck_core::{
    is_atom, obs, ExtractedFact, Metrics, Requirement, RequirementId, Segment, SegmentId,
};
use llm_gateway::{Gateway, GatewayResult, GenerateOptions, GenerateRequest};
use regex::Regex;
use tracing::debug;

use crate::prompts;

/// Which step produced an unusable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    Classify,
    Extract,
}

impl fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionStage::Classify => f.write_str("classify"),
            ExtractionStage::Extract => f.write_str("extract"),
        }
    }
}

/// A non-fatal extraction problem. Logged and counted, never propagated.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionFailure {
    pub segment_id: SegmentId,
    pub requirement_id: Option<RequirementId>,
    pub stage: ExtractionStage,
    pub reason: String,
}

impl ExtractionFailure {
    pub fn record(&self, metrics: &Metrics) {
        metrics.inc_extraction_failures();
        obs::emit_extraction_failed(
            &self.segment_id,
            self.requirement_id.as_deref(),
            &self.stage.to_string(),
            &self.reason,
        );
    }
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_.\-]+").expect("static regex"))
}

/// Parse a classification answer into known requirement ids, in the order
/// they appear. `NONE`/`OTHER` means no candidates.
pub fn parse_classification(
    response: &str,
    known: &[RequirementId],
) -> Result<Vec<RequirementId>, String> {
    let tokens: Vec<&str> = token_regex()
        .find_iter(response)
        .map(|m| m.as_str().trim_matches(|c| c == '.' || c == '-'))
        .filter(|t| !t.is_empty())
        .collect();

    match tokens.first() {
        None => return Err("empty classification response".to_string()),
        Some(first)
            if first.eq_ignore_ascii_case(prompts::NONE_LABEL)
                || first.eq_ignore_ascii_case("OTHER") =>
        {
            return Ok(Vec::new())
        }
        Some(_) => {}
    }

    let mut ids = Vec::new();
    for token in tokens {
        let candidate = if known.iter().any(|k| k == token) {
            Some(token)
        } else {
            token
                .strip_prefix('R')
                .or_else(|| token.strip_prefix('r'))
                .filter(|rest| known.iter().any(|k| k == rest))
        };
        match candidate {
            Some(id) if !ids.iter().any(|i: &RequirementId| i == id) => ids.push(id.to_string()),
            Some(_) => {}
            None => debug!(token, "ignoring token that names no targeted requirement"),
        }
    }

    if ids.is_empty() {
        return Err(format!("no targeted requirement id in response: {}", response.trim()));
    }
    Ok(ids)
}

/// Parse an extraction answer (`a; b; -c` or `NO_FACTS`) into predicates.
pub fn parse_facts(response: &str) -> Result<Vec<String>, String> {
    let trimmed = response.trim().trim_matches('`').trim();
    if trimmed.is_empty() {
        return Err("empty extraction response".to_string());
    }

    let mut predicates: Vec<String> = Vec::new();
    for token in trimmed.split([';', '\n']) {
        let token = token.trim().trim_matches('`').trim().trim_end_matches('.').trim();
        if token.is_empty() || token.eq_ignore_ascii_case(prompts::NO_FACTS_LABEL) {
            continue;
        }
        if !is_atom(token) {
            return Err(format!("not a well-formed atom: {token}"));
        }
        if !predicates.iter().any(|p| p == token) {
            predicates.push(token.to_string());
        }
    }
    Ok(predicates)
}

/// Merge per-segment facts for one requirement, keeping the first
/// segment that asserted each predicate.
pub fn merge_facts<I>(facts: I) -> Vec<ExtractedFact>
where
    I: IntoIterator<Item = ExtractedFact>,
{
    let mut seen = HashSet::new();
    facts
        .into_iter()
        .filter(|f| seen.insert(f.predicate.clone()))
        .collect()
}

/// Drives the classification and extraction calls.
pub struct FactExtractor {
    gateway: Arc<Gateway>,
    options: GenerateOptions,
    metrics: Arc<Metrics>,
    require_actor_fact: bool,
}

impl FactExtractor {
    pub fn new(gateway: Arc<Gateway>, options: GenerateOptions, metrics: Arc<Metrics>) -> Self {
        Self {
            gateway,
            options,
            metrics,
            require_actor_fact: false,
        }
    }

    /// Discard a segment's facts unless it also asserts `role(<actor>)`.
    pub fn with_require_actor_fact(mut self, require: bool) -> Self {
        self.require_actor_fact = require;
        self
    }

    /// Candidate requirements for one segment. Failures degrade to none.
    pub async fn classify_segment(
        &self,
        segment: &Segment,
        requirements: &[Requirement],
    ) -> Vec<RequirementId> {
        let request = GenerateRequest::new(prompts::classification_prompt(segment), self.options.clone())
            .with_system(prompts::classification_system(requirements));
        let known: Vec<RequirementId> = requirements.iter().map(|r| r.id.clone()).collect();

        let reason = match self.gateway.generate(&request).await {
            Ok(text) => match parse_classification(&text, &known) {
                Ok(ids) => {
                    debug!(segment_id = %segment.id, candidates = ?ids, "segment classified");
                    return ids;
                }
                Err(reason) => reason,
            },
            Err(err) => err.to_string(),
        };

        ExtractionFailure {
            segment_id: segment.id.clone(),
            requirement_id: None,
            stage: ExtractionStage::Classify,
            reason,
        }
        .record(&self.metrics);
        Vec::new()
    }

    /// Facts a segment supports for one requirement.
    ///
    /// Unparseable answers give an empty list; gateway failures are
    /// returned so the caller can mark the requirement's evidence missing.
    pub async fn extract(
        &self,
        segment: &Segment,
        requirement: &Requirement,
    ) -> GatewayResult<Vec<ExtractedFact>> {
        let request = GenerateRequest::new(
            prompts::extraction_prompt(requirement, segment),
            self.options.clone(),
        )
        .with_system(prompts::EXTRACTION_SYSTEM);
        let text = self.gateway.generate(&request).await?;

        let predicates = match parse_facts(&text) {
            Ok(predicates) => predicates,
            Err(reason) => {
                ExtractionFailure {
                    segment_id: segment.id.clone(),
                    requirement_id: Some(requirement.id.clone()),
                    stage: ExtractionStage::Extract,
                    reason,
                }
                .record(&self.metrics);
                return Ok(Vec::new());
            }
        };

        if self.require_actor_fact && !predicates.is_empty() {
            let actor_atom = format!("role({})", requirement.actor);
            if !predicates.iter().any(|p| *p == actor_atom) {
                debug!(
                    segment_id = %segment.id,
                    requirement_id = %requirement.id,
                    "dropping facts without actor atom"
                );
                return Ok(Vec::new());
            }
        }

        Ok(predicates
            .into_iter()
            .map(|predicate| ExtractedFact {
                segment_id: segment.id.clone(),
                requirement_id: requirement.id.clone(),
                predicate,
                confidence: 1.0,
            })
            .collect())
    }
}
