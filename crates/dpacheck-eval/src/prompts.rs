//! Prompt templates for the three strategies.

use std::fmt::Write;

use dpacheck_core::{Requirement, Segment};

pub const NONE_LABEL: &str = "NONE";
pub const NO_FACTS_LABEL: &str = "NO_FACTS";

const CLASSIFICATION_SYSTEM: &str = "\
You are a legal expert on the GDPR reviewing a Data Processing Agreement (DPA).
Decide which of the requirements below a DPA segment addresses.

A segment addresses a requirement only if it states a concrete, actionable
obligation or right of the processor that matches the requirement. Definitions,
headings, party descriptions and processor-to-controller notices that do not
match a requirement are not relevant.

Answer with the matching requirement ids separated by spaces (e.g. `3` or
`6 8`), or `NONE` if the segment addresses none of them.
Do not output any explanation.

Requirements:
";

pub const EXTRACTION_SYSTEM: &str = "\
You are a legal text analysis expert. Analyse a DPA clause against one GDPR
requirement and extract the symbolic facts the clause supports.

Input: REQUIREMENT (text), SYMBOLIC (formal rule), PREDICATES (allowed atoms),
CLAUSE (the DPA text).

Output rules:
- Output ONLY a semicolon-separated list of atoms taken from PREDICATES,
  e.g. `role(processor); ensure_security_of_processing`.
- Prefix an atom with `-` when the clause states the opposite, e.g. the
  requirement says \"shall do X\" and the clause says \"will not do X\".
- Extract `role(processor)` only when the clause places a real obligation on
  the processor.
- If the clause supports no atom, output exactly `NO_FACTS`.
- Do not output explanations or any other text.
";

pub const PAIRWISE_SYSTEM: &str = "\
You are a legal expert on the GDPR. Judge how completely a single DPA segment
covers one requirement.

Respond with a JSON object only:
{\"coverage\": <number between 0 and 1>, \"rationale\": \"<one sentence>\"}

Use 1 when the segment fully states the obligation, around 0.5 when it
addresses it partially or vaguely, and 0 when it is unrelated.
";

pub const DIRECT_SYSTEM: &str = "\
You are a legal expert on the GDPR. Decide whether a Data Processing Agreement
satisfies one requirement, using only the numbered segments provided.

On the first line answer exactly one word: COMPLETE, INCOMPLETE or UNCLEAR.
On the following lines give a short rationale citing segment numbers.
";

/// System prompt listing every targeted requirement.
pub fn classification_system(requirements: &[Requirement]) -> String {
    let mut out = String::from(CLASSIFICATION_SYSTEM);
    for req in requirements {
        let _ = writeln!(out, "{}: {}", req.id, one_line(&req.text));
    }
    out
}

pub fn classification_prompt(segment: &Segment) -> String {
    segment.raw_text.clone()
}

pub fn extraction_prompt(requirement: &Requirement, segment: &Segment) -> String {
    format!(
        "REQUIREMENT: {}\nSYMBOLIC: {}\nPREDICATES: {}\nCLAUSE: {}",
        one_line(&requirement.text),
        requirement.encoding.rule,
        requirement.atoms.join("; "),
        segment.raw_text
    )
}

pub fn pairwise_prompt(requirement: &Requirement, segment: &Segment) -> String {
    format!(
        "REQUIREMENT: {}\nSEGMENT: {}",
        one_line(&requirement.text),
        segment.raw_text
    )
}

pub fn direct_prompt(requirement: &Requirement, segments: &[Segment]) -> String {
    let mut out = format!("REQUIREMENT: {}\n\nDPA SEGMENTS:\n", one_line(&requirement.text));
    for segment in segments {
        let _ = writeln!(out, "[{}] {}", segment.id, segment.raw_text);
    }
    out
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpacheck_core::DeonticEncoding;

    fn requirement() -> Requirement {
        let encoding =
            DeonticEncoding::parse("&obligatory{notify_breach} :- role(processor).").unwrap();
        Requirement {
            id: "9".into(),
            text: "The processor shall notify the controller\n without undue delay.".into(),
            actor: "processor".into(),
            modality: encoding.modality,
            condition: None,
            atoms: vec!["role(processor)".into(), "notify_breach".into()],
            encoding,
        }
    }

    #[test]
    fn test_classification_system_lists_requirements() {
        let system = classification_system(&[requirement()]);
        assert!(system.ends_with(
            "9: The processor shall notify the controller without undue delay.\n"
        ));
        assert!(system.contains("`NONE`"));
    }

    #[test]
    fn test_extraction_prompt_layout() {
        let segment = Segment::new("4", 3, "Processor shall inform Customer of any breach.", "dpa");
        let prompt = extraction_prompt(&requirement(), &segment);
        assert_eq!(
            prompt,
            "REQUIREMENT: The processor shall notify the controller without undue delay.\n\
             SYMBOLIC: &obligatory{notify_breach} :- role(processor).\n\
             PREDICATES: role(processor); notify_breach\n\
             CLAUSE: Processor shall inform Customer of any breach."
        );
    }

    #[test]
    fn test_direct_prompt_numbers_segments() {
        let segments = vec![
            Segment::new("1", 0, "Definitions.", "dpa"),
            Segment::new("2", 1, "Processor shall notify breaches.", "dpa"),
        ];
        let prompt = direct_prompt(&requirement(), &segments);
        assert!(prompt.contains("[1] Definitions.\n[2] Processor shall notify breaches.\n"));
    }
}
