//! Cloze deletion masking and reveal
//!
//! Raw syntax is `{{c<N>::answer}}` or `{{c<N>::answer::hint}}`. Anki may
//! also pre-render clozes as `<span class=cloze>`, quoted or not.

use super::markup::matching_close;
use super::PLACEHOLDER;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Bracketed ellipsis Anki renders in place of a hidden answer
static HIDDEN_ANSWER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\s*(?:\.\.\.|…)\s*\]").expect("hidden answer pattern must compile")
});

/// Non-greedy per group; group 2 is the answer, group 3 the optional hint.
/// Group bodies may not contain `{{`, so the innermost group matches first.
static RAW_CLOZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{c(\d+)::((?:[^{]|\{[^{])*?)(?:::((?:[^{]|\{[^{])*?))?\}\}")
        .expect("cloze pattern must compile")
});

/// Group 1 is the tag name; groups 2-4 the double-quoted, single-quoted or
/// bare class value
static OPEN_TAG_WITH_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)<([a-z][a-z0-9-]*)\b[^>]*?\sclass\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))[^>]*>"#,
    )
    .expect("class tag pattern must compile")
});

/// Upper bound on unwrap passes for nested groups
const MAX_PASSES: usize = 8;

/// Replace the host's `[...]` placeholder with the spoken placeholder
pub fn replace_hidden_answer(html: &str) -> String {
    HIDDEN_ANSWER.replace_all(html, PLACEHOLDER).into_owned()
}

/// Question side: every raw cloze group becomes the placeholder
pub fn mask_raw(html: &str) -> String {
    rewrite_until_stable(html, |_| PLACEHOLDER.to_string())
}

/// Answer side: drop the wrapper and hint, keep the answer text
pub fn reveal_raw(html: &str) -> String {
    rewrite_until_stable(html, |caps| caps[2].to_string())
}

fn rewrite_until_stable<F>(html: &str, mut replace: F) -> String
where
    F: FnMut(&Captures) -> String,
{
    let mut current = html.to_string();
    for _ in 0..MAX_PASSES {
        if !RAW_CLOZE.is_match(&current) {
            break;
        }
        current = RAW_CLOZE.replace_all(&current, |caps: &Captures| replace(caps)).into_owned();
    }
    current
}

/// Question side: replace every element carrying the `cloze` class token
///
/// An element whose closing tag is missing is masked through the end of the
/// input so its answer can never leak.
pub fn mask_rendered(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(caps) = OPEN_TAG_WITH_CLASS.captures_at(html, pos) {
        let Some(open) = caps.get(0) else { break };
        let classes = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());

        if !has_class_token(classes, "cloze") {
            result.push_str(&html[pos..open.end()]);
            pos = open.end();
            continue;
        }

        result.push_str(&html[pos..open.start()]);
        result.push_str(PLACEHOLDER);

        let tag = caps[1].to_ascii_lowercase();
        match matching_close(&html[open.end()..], &tag) {
            Some((_, end)) => pos = open.end() + end,
            None => {
                pos = html.len();
                break;
            }
        }
    }

    result.push_str(&html[pos..]);
    result
}

fn has_class_token(classes: &str, token: &str) -> bool {
    classes.split_whitespace().any(|class| class.eq_ignore_ascii_case(token))
}
