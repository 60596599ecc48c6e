//! Direct Evaluator: one call per requirement over the whole document.

use std::sync::{Arc, OnceLock};

use dpacheck_core::{Completeness, Evidence, Requirement, Segment, Verdict};
use llm_gateway::{Gateway, GatewayResult, GenerateOptions, GenerateRequest};
use regex::Regex;

use crate::prompts;

/// Label at the start of a line, as a whole word, optionally after Markdown
/// emphasis and a `Completeness:` / `Verdict:` style prefix.
fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^[\s*#`>_-]*(?:(?:final\s+)?(?:completeness|verdict|answer|label)\s*[:=-]\s*[*`_]*\s*)?(INCOMPLETE|COMPLETE|UNCLEAR)\b",
        )
        .expect("static regex")
    })
}

/// Read the label on the first non-empty line and the rationale after it.
/// `None` when no label is present.
pub fn parse_direct_response(response: &str) -> Option<(Completeness, String)> {
    let mut lines = response.lines().skip_while(|l| l.trim().is_empty());
    let first = lines.next()?.trim();
    let caps = label_re().captures(first)?;
    let label = caps.get(1)?;
    let completeness = match label.as_str().to_ascii_uppercase().as_str() {
        "INCOMPLETE" => Completeness::Incomplete,
        "COMPLETE" => Completeness::Complete,
        _ => Completeness::Unclear,
    };

    let tail = first[label.end()..]
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .trim();
    let rest: Vec<&str> = lines.map(str::trim).filter(|l| !l.is_empty()).collect();
    let rationale = match (tail.is_empty(), rest.is_empty()) {
        (true, _) => rest.join(" "),
        (false, true) => tail.to_string(),
        (false, false) => format!("{tail} {}", rest.join(" ")),
    };
    Some((completeness, rationale))
}

pub struct DirectEvaluator {
    gateway: Arc<Gateway>,
    options: GenerateOptions,
}

impl DirectEvaluator {
    pub fn new(gateway: Arc<Gateway>, options: GenerateOptions) -> Self {
        Self { gateway, options }
    }

    /// Evaluate one requirement against every segment in a single call.
    pub async fn evaluate(
        &self,
        requirement: &Requirement,
        segments: &[Segment],
    ) -> GatewayResult<Verdict> {
        let request = GenerateRequest::new(
            prompts::direct_prompt(requirement, segments),
            self.options.clone(),
        )
        .with_system(prompts::DIRECT_SYSTEM);
        let text = self.gateway.generate(&request).await?;

        let evidence = segments
            .iter()
            .map(|s| Evidence::Segment {
                segment_id: s.id.clone(),
            })
            .collect();

        let (completeness, justification) = match parse_direct_response(&text) {
            Some((completeness, rationale)) if rationale.is_empty() => {
                (completeness, format!("model answered {completeness}"))
            }
            Some(parsed) => parsed,
            None => (
                Completeness::Unclear,
                format!("unparseable model answer: {}", text.trim()),
            ),
        };

        Ok(Verdict {
            requirement_id: requirement.id.clone(),
            completeness,
            evidence,
            justification,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        assert_eq!(
            parse_direct_response("COMPLETE\nSegment 4 requires encryption."),
            Some((Completeness::Complete, "Segment 4 requires encryption.".into()))
        );
        assert_eq!(
            parse_direct_response("\n**Incomplete** - no breach notice"),
            Some((Completeness::Incomplete, "no breach notice".into()))
        );
        assert_eq!(
            parse_direct_response("unclear"),
            Some((Completeness::Unclear, String::new()))
        );
    }

    #[test]
    fn test_parse_prefixed_label() {
        assert_eq!(
            parse_direct_response("Completeness: INCOMPLETE\nno breach clause"),
            Some((Completeness::Incomplete, "no breach clause".into()))
        );
        assert_eq!(
            parse_direct_response("**Verdict:** complete. Clause 7 covers audits."),
            Some((Completeness::Complete, "Clause 7 covers audits.".into()))
        );
    }

    #[test]
    fn test_label_must_be_a_whole_word() {
        assert_eq!(parse_direct_response("Completely missing from the DPA."), None);
        assert_eq!(parse_direct_response("COMPLETENESS unknown"), None);
        assert_eq!(parse_direct_response("Incompleteness noted"), None);
    }

    #[test]
    fn test_parse_unlabelled() {
        assert_eq!(parse_direct_response("The DPA mostly covers it."), None);
        assert_eq!(parse_direct_response(""), None);
    }
}
