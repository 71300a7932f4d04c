//! Template variable engine.
//!
//! Prompt text may contain `{{name}}` placeholders where `name` is made of
//! ASCII letters, digits, underscores and dashes. Anything else between
//! braces is not a placeholder: malformed tokens are left untouched by
//! rendering and ignored by extraction. Rendering never fails; a placeholder
//! without a value degrades to the empty string.

use std::collections::{BTreeSet, HashMap};

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Locates the well-formed placeholder starting at byte `start` (which must
/// point at `{{`), returning the variable name and the byte offset just past
/// the closing `}}`.
fn placeholder_at(text: &str, start: usize) -> Option<(&str, usize)> {
    let name_start = start + 2;
    let rest = &text[name_start..];
    let name_len = rest.chars().take_while(|&c| is_name_char(c)).count();
    if name_len == 0 {
        return None;
    }
    // name chars are all ASCII, so the byte length equals the char count
    let name_end = name_start + name_len;
    if text[name_end..].starts_with("}}") {
        Some((&text[name_start..name_end], name_end + 2))
    } else {
        None
    }
}

/// Extracts the set of distinct placeholder names found in `text`.
pub fn extract_variables(text: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut i = 0;
    while i < text.len() {
        if text[i..].starts_with("{{") {
            if let Some((name, end)) = placeholder_at(text, i) {
                names.insert(name.to_string());
                i = end;
                continue;
            }
        }
        i += text[i..].chars().next().map(char::len_utf8).unwrap_or(1);
    }
    names
}

/// Union of the placeholders in a version's system and user prompts.
pub fn extract_from_prompts(system_prompt: &str, user_prompt: &str) -> BTreeSet<String> {
    let mut names = extract_variables(system_prompt);
    names.extend(extract_variables(user_prompt));
    names
}

/// Renders a template by substituting every well-formed placeholder.
///
/// Missing values become the empty string, so the output never contains a
/// placeholder that extraction would report. Pure and deterministic: no I/O,
/// same inputs, same output.
pub fn render(template: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    while i < template.len() {
        if template[i..].starts_with("{{") {
            if let Some((name, end)) = placeholder_at(template, i) {
                if let Some(value) = values.get(name) {
                    out.push_str(value);
                }
                i = end;
                continue;
            }
        }
        match template[i..].chars().next() {
            Some(c) => {
                out.push(c);
                i += c.len_utf8();
            }
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values<const N: usize>(pairs: [(&str, &str); N]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn extracts_distinct_names() {
        let found = extract_variables("{{a}} and {{b}} and {{a}} again");
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn extracts_full_charset() {
        let found = extract_variables("{{snake_case}} {{kebab-case}} {{Mixed9}}");
        assert!(found.contains("snake_case"));
        assert!(found.contains("kebab-case"));
        assert!(found.contains("Mixed9"));
    }

    #[test]
    fn malformed_placeholders_are_ignored() {
        assert!(extract_variables("{{bad name}}").is_empty());
        assert!(extract_variables("{{}}").is_empty());
        assert!(extract_variables("{{unclosed").is_empty());
        assert!(extract_variables("{single}").is_empty());
        assert!(extract_variables("{{no.dots}}").is_empty());
    }

    #[test]
    fn extra_brace_before_placeholder_still_matches() {
        // "{{{name}}}" contains a well-formed "{{name}}" one byte in
        let found = extract_variables("{{{name}}}");
        assert!(found.contains("name"));
    }

    #[test]
    fn union_across_prompts() {
        let found = extract_from_prompts("sys {{a}}", "user {{b}} {{a}}");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn render_substitutes_all_occurrences() {
        let out = render("{{x}}-{{x}}", &values([("x", "X")]));
        assert_eq!(out, "X-X");
    }

    #[test]
    fn render_blanks_missing_values() {
        let out = render("Write about {{topic}} for {{audience}}", &values([("topic", "AI")]));
        assert_eq!(out, "Write about AI for ");
    }

    #[test]
    fn render_with_empty_mapping_leaves_no_placeholder() {
        let template = "a {{x}} b {{y-z}} c";
        let out = render(template, &HashMap::new());
        for name in extract_variables(template) {
            assert!(!out.contains(&format!("{{{{{}}}}}", name)));
        }
        assert_eq!(out, "a  b  c");
    }

    #[test]
    fn render_keeps_malformed_tokens() {
        let out = render("{{bad name}} {{}}", &HashMap::new());
        assert_eq!(out, "{{bad name}} {{}}");
    }

    #[test]
    fn render_is_idempotent_on_plain_output() {
        let vals = values([("topic", "AI")]);
        let once = render("Write about {{topic}}", &vals);
        assert_eq!(once, "Write about AI");
        assert_eq!(render(&once, &vals), once);
    }

    #[test]
    fn render_handles_unicode_around_placeholders() {
        let out = render("héllo {{name}} 日本", &values([("name", "wörld")]));
        assert_eq!(out, "héllo wörld 日本");
    }

    #[test]
    fn blog_scenario() {
        let template = "Write about {{topic}}";
        assert!(extract_variables(template).contains("topic"));
        let out = render(template, &values([("topic", "AI")]));
        assert_eq!(out, "Write about AI");
    }
}
