//! Pairwise Comparator: one coverage score per (segment, requirement).

use std::sync::{Arc, OnceLock};

use dpacheck_core::{obs, PairScore, Requirement, Segment};
use llm_gateway::{Gateway, GatewayResult, GenerateOptions, GenerateRequest};
use regex::Regex;
use serde_json::Value;

use crate::prompts;

fn leading_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\**\s*([0-9]*\.?[0-9]+)").expect("static regex"))
}

fn coverage_value(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read `(coverage, rationale)` from a model answer.
///
/// Takes the first JSON object carrying a `coverage` field, else a number at
/// the start of the text. The score is not clamped here.
pub fn parse_pair_response(response: &str) -> Result<(f32, String), String> {
    for (start, _) in response.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&response[start..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(obj))) = stream.next() {
            if let Some(score) = obj.get("coverage").and_then(coverage_value) {
                let rationale = obj
                    .get("rationale")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                return Ok((score, rationale));
            }
        }
    }

    if let Some(caps) = leading_number().captures(response) {
        if let Ok(score) = caps[1].parse::<f32>() {
            let rest = response[caps.get(0).map_or(0, |m| m.end())..]
                .trim_start_matches(|c: char| c == '*' || c.is_whitespace() || c == '-' || c == ':')
                .trim()
                .to_string();
            return Ok((score, rest));
        }
    }

    Err(format!("no coverage score in response: {}", response.trim()))
}

pub struct PairwiseComparator {
    gateway: Arc<Gateway>,
    options: GenerateOptions,
}

impl PairwiseComparator {
    pub fn new(gateway: Arc<Gateway>, options: GenerateOptions) -> Self {
        Self { gateway, options }
    }

    /// Score one pair. `Ok(None)` when the answer held no usable score.
    pub async fn score(
        &self,
        segment: &Segment,
        requirement: &Requirement,
    ) -> GatewayResult<Option<PairScore>> {
        let request = GenerateRequest::new(
            prompts::pairwise_prompt(requirement, segment),
            self.options.clone(),
        )
        .with_system(prompts::PAIRWISE_SYSTEM);
        let text = self.gateway.generate(&request).await?;

        match parse_pair_response(&text) {
            Ok((score, rationale)) => Ok(Some(PairScore::new(
                segment.id.clone(),
                requirement.id.clone(),
                score,
                rationale,
            ))),
            Err(reason) => {
                obs::emit_pair_unscored(&segment.id, &requirement.id, &reason);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_object() {
        let (score, rationale) =
            parse_pair_response(r#"{"coverage": 0.9, "rationale": "States encryption."}"#).unwrap();
        assert!((score - 0.9).abs() < 1e-6);
        assert_eq!(rationale, "States encryption.");
    }

    #[test]
    fn test_parse_json_inside_prose() {
        let text = "Here is my assessment:\n```json\n{\"coverage\": \"0.4\"}\n```\nThanks";
        let (score, rationale) = parse_pair_response(text).unwrap();
        assert!((score - 0.4).abs() < 1e-6);
        assert_eq!(rationale, "");
    }

    #[test]
    fn test_parse_leading_number() {
        let (score, rationale) = parse_pair_response("0.75 - partially covered").unwrap();
        assert!((score - 0.75).abs() < 1e-6);
        assert_eq!(rationale, "partially covered");
        let (score, _) = parse_pair_response("**1**").unwrap();
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_parse_rejects_unscored_text() {
        assert!(parse_pair_response("The segment is unrelated.").is_err());
        assert!(parse_pair_response(r#"{"rationale": "no score"}"#).is_err());
    }

    #[test]
    fn test_out_of_range_score_is_clamped_by_pair_score() {
        let (score, _) = parse_pair_response(r#"{"coverage": 7}"#).unwrap();
        let pair = PairScore::new("1", "5", score, "");
        assert_eq!(pair.coverage_score, 1.0);
    }
}
