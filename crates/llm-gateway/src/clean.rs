use std::sync::OnceLock;

use regex::Regex;

fn think_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<think>.*?</think>").expect("static regex"))
}

fn blank_lines_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("static regex"))
}

/// Strip `<think>...</think>` sections emitted by reasoning models and
/// collapse runs of blank lines.
pub fn clean_response(text: &str) -> String {
    let without_think = think_regex().replace_all(text, "");
    blank_lines_regex()
        .replace_all(&without_think, "\n")
        .trim()
        .to_string()
}
