//! Input template rewriting.

use std::sync::OnceLock;

use regex::{NoExpand, Regex};

fn text_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*text\s*\}\}").expect("valid placeholder regex"))
}

pub fn has_text_placeholder(template: &str) -> bool {
    text_placeholder().is_match(template)
}

/// Substitute every `{{text}}` in `template` with `text`, verbatim.
pub fn apply_input_template(template: &str, text: &str) -> String {
    text_placeholder()
        .replace_all(template, NoExpand(text))
        .into_owned()
}
