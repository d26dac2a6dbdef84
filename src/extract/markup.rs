//! Structural markup passes
//!
//! A fixed, ordered set of pattern rules tuned to Anki's card templates.
//! This is not a general HTML or LaTeX parser: deeply nested or malformed
//! input degrades to best-effort text.

use once_cell::sync::Lazy;
use regex::Regex;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in markup pattern must compile")
}

/// `<hr id=answer>` separates the question part from the answer part
static ANSWER_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| compile(r#"(?i)<hr\s+id\s*=\s*["']?answer["']?\s*/?\s*>"#));

/// `<div id="text">` wraps the main text in the standard cloze template
static MAIN_CONTAINER_OPEN: Lazy<Regex> = Lazy::new(|| {
    compile(r#"(?i)<div\b[^>]*?\sid\s*=\s*(?:"text"|'text'|text)(?:\s[^>]*)?>"#)
});

/// Any opening or closing tag; group 1 is the slash, group 2 the name
static ANY_TAG: Lazy<Regex> = Lazy::new(|| compile(r"(?i)<(/?)([a-z][a-z0-9-]*)\b[^>]*>"));

static IMAGE: Lazy<Regex> = Lazy::new(|| compile(r"(?is)<img\b[^>]*>"));

static SCRIPT: Lazy<Regex> = Lazy::new(|| compile(r"(?is)<script\b.*?</script\s*>"));
static STYLE: Lazy<Regex> = Lazy::new(|| compile(r"(?is)<style\b.*?</style\s*>"));
static TIMER: Lazy<Regex> =
    Lazy::new(|| compile(r#"(?is)<div\s+class\s*=\s*["']timer["'][^>]*>.*?</div\s*>"#));
static TAGS_CONTAINER: Lazy<Regex> =
    Lazy::new(|| compile(r#"(?is)<div\s+id\s*=\s*["']tags-container["'][^>]*>.*?</div\s*>"#));

static COMMENT: Lazy<Regex> = Lazy::new(|| compile(r"(?s)<!--.*?-->"));

/// Tags that separate words visually; replaced by a space rather than nothing
static BLOCK_TAG: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)</?(?:br|div|p|li|ul|ol|tr|td|th|h[1-6]|hr|blockquote|table)\b[^>]*>")
});

/// Any other tag; a bare `<` followed by a space is text, not markup
static TAG: Lazy<Regex> = Lazy::new(|| compile(r"(?s)</?[a-zA-Z!][^>]*>"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| compile(r"\s+"));

static INLINE_MATH: Lazy<Regex> = Lazy::new(|| compile(r"(?s)\\\(.*?\\\)"));
static DISPLAY_MATH: Lazy<Regex> = Lazy::new(|| compile(r"(?s)\\\[.*?\\\]"));
static DOUBLE_DOLLAR_MATH: Lazy<Regex> = Lazy::new(|| compile(r"(?s)\$\$.*?\$\$"));
static LATEX_TAG: Lazy<Regex> =
    Lazy::new(|| compile(r"(?is)\[(latex|\$\$|\$)\].*?\[/(latex|\$\$|\$)\]"));
static STRAY_MATH_DELIMITER: Lazy<Regex> = Lazy::new(|| compile(r"\\[\(\)\[\]]"));

/// Drop everything up to and including the answer separator
///
/// Returns the input unchanged when the separator is missing.
pub fn after_answer_separator(html: &str) -> &str {
    match ANSWER_SEPARATOR.find(html) {
        Some(m) => &html[m.end()..],
        None => html,
    }
}

/// Narrow to the main text container if the template has one
///
/// Field lines are wrapped in their own `<div>`s, so the matching close is
/// found by depth. An unclosed container runs to the end of the input.
pub fn main_container(html: &str) -> &str {
    let Some(open) = MAIN_CONTAINER_OPEN.find(html) else {
        return html;
    };
    let inner = &html[open.end()..];
    match matching_close(inner, "div") {
        Some((start, _)) => &inner[..start],
        None => inner,
    }
}

/// Byte range of the `</tag>` closing an element whose open tag ends just
/// before `html`, honouring nested elements of the same name
pub(crate) fn matching_close(html: &str, tag: &str) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    for caps in ANY_TAG.captures_iter(html) {
        if !caps[2].eq_ignore_ascii_case(tag) {
            continue;
        }
        let whole = caps.get(0)?;
        if caps[1].is_empty() {
            depth += 1;
        } else if depth == 0 {
            return Some((whole.start(), whole.end()));
        } else {
            depth -= 1;
        }
    }
    None
}

/// True when the markup holds images and nothing else worth speaking
pub fn is_image_only(html: &str) -> bool {
    if !IMAGE.is_match(html) {
        return false;
    }
    let without_images = IMAGE.replace_all(html, "");
    to_plain_text(&without_images).is_empty()
}

/// Remove scripts, styles, the review timer and the tag list
pub fn remove_non_content(html: &str) -> String {
    let html = SCRIPT.replace_all(html, "");
    let html = STYLE.replace_all(&html, "");
    let html = TIMER.replace_all(&html, "");
    TAGS_CONTAINER.replace_all(&html, "").into_owned()
}

/// Discard math notation rather than reading it aloud
///
/// `$...$` is only treated as math when it contains a backslash command,
/// so "$5 and $10" survives.
pub fn strip_math(text: &str) -> String {
    let text = LATEX_TAG.replace_all(text, " ");
    let text = DISPLAY_MATH.replace_all(&text, " ");
    let text = INLINE_MATH.replace_all(&text, " ");
    let text = DOUBLE_DOLLAR_MATH.replace_all(&text, " ");
    let text = strip_dollar_math(&text);
    STRAY_MATH_DELIMITER.replace_all(&text, " ").into_owned()
}

fn strip_dollar_math(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('$') {
        let after = &rest[open + 1..];
        match after.find('$') {
            Some(close) if after[..close].contains('\\') => {
                result.push_str(&rest[..open]);
                result.push(' ');
                rest = &after[close + 1..];
            }
            _ => {
                // Not math: keep this dollar sign and look for the next one
                result.push_str(&rest[..=open]);
                rest = after;
            }
        }
    }

    result.push_str(rest);
    result
}

/// Strip tags, decode entities and collapse whitespace
pub fn to_plain_text(html: &str) -> String {
    let text = COMMENT.replace_all(html, "");
    let text = BLOCK_TAG.replace_all(&text, " ");
    let text = TAG.replace_all(&text, "");
    let decoded = decode_entities(&text);
    // Entities can spell out delimiters the math pass never saw
    let decoded = STRAY_MATH_DELIMITER.replace_all(&decoded, " ");
    collapse_whitespace(&decoded)
}

/// Upper bound on decode passes for multiply-encoded entities
const MAX_DECODE_PASSES: usize = 4;

/// Decode entities until nothing changes, so `&amp;amp;` ends up as `&`
pub fn decode_entities(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        let decoded = html_escape::decode_html_entities(&current);
        if decoded == current {
            break;
        }
        current = decoded.into_owned();
    }
    current
}

/// Collapse runs of whitespace to a single space and trim
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_separator() {
        let html = "Question<hr id=answer>Answer";
        assert_eq!(after_answer_separator(html), "Answer");

        let html = r#"Q<HR ID="answer" />A"#;
        assert_eq!(after_answer_separator(html), "A");

        assert_eq!(after_answer_separator("No separator"), "No separator");
    }

    #[test]
    fn test_main_container() {
        let html = r#"<div class="card"><div id="text">Main</div><div>Extra</div></div>"#;
        assert_eq!(main_container(html), "Main");
        assert_eq!(main_container("<p>Plain</p>"), "<p>Plain</p>");
    }

    #[test]
    fn test_image_only() {
        assert!(is_image_only(r#"<img src="x.png">"#));
        assert!(is_image_only(r#"<div> <img src="a.png"> &nbsp; </div>"#));
        assert!(!is_image_only(r#"<img src="x.png"> Heart"#));
        assert!(!is_image_only(""));
        assert!(!is_image_only("text"));
    }

    #[test]
    fn test_remove_non_content() {
        let html = concat!(
            "Keep<script>var a = 1;</script>",
            "<style>.x { color: red }</style>",
            r#"<div class="timer">0:12</div>"#,
            r#"<div id="tags-container">geo</div> this"#,
        );
        assert_eq!(to_plain_text(&remove_non_content(html)), "Keep this");
    }

    #[test]
    fn test_strip_math() {
        assert_eq!(collapse_whitespace(&strip_math(r"Solve \(x^2\) now")), "Solve now");
        assert_eq!(collapse_whitespace(&strip_math(r"Area \[\pi r^2\]")), "Area");
        assert_eq!(collapse_whitespace(&strip_math(r"Sum $$\sum x$$ done")), "Sum done");
        assert_eq!(collapse_whitespace(&strip_math(r"Root $\sqrt{2}$ here")), "Root here");
    }

    #[test]
    fn test_dollar_amounts_survive() {
        assert_eq!(strip_math("Costs $5 and $10"), "Costs $5 and $10");
        assert_eq!(
            collapse_whitespace(&strip_math(r"Pay $5 for $\alpha$ please")),
            "Pay $5 for please"
        );
    }

    #[test]
    fn test_unterminated_math_delimiters_removed() {
        let result = strip_math(r"Broken \(x + y");
        assert!(!result.contains(r"\("));
        assert!(result.contains("x + y"));
    }

    #[test]
    fn test_to_plain_text() {
        assert_eq!(to_plain_text("<b>Bold</b> and <i>italic</i>"), "Bold and italic");
        assert_eq!(to_plain_text("line<br>break"), "line break");
        assert_eq!(to_plain_text("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(to_plain_text("  lots \n\t of   space "), "lots of space");
        assert_eq!(to_plain_text("a < b"), "a < b");
    }

    #[test]
    fn test_double_encoded_entities() {
        assert_eq!(to_plain_text("AT&amp;amp;T"), "AT&T");
        assert_eq!(decode_entities("&amp;lt;"), "<");
        assert_eq!(decode_entities("plain"), "plain");
    }

    #[test]
    fn test_main_container_with_line_divs() {
        let html = r#"<div id="text"><div>First line</div><div>Second line</div></div><div>Extra</div>"#;
        assert_eq!(main_container(html), "<div>First line</div><div>Second line</div>");

        let html = "<div class=card id=text>Unquoted</div>";
        assert_eq!(main_container(html), "Unquoted");

        let html = r#"<div data-id="text">Not it</div>"#;
        assert_eq!(main_container(html), html);

        let html = r#"<div id="text">Never closed"#;
        assert_eq!(main_container(html), "Never closed");
    }

    #[test]
    fn test_matching_close() {
        let html = "<b>x</b></b>after";
        assert_eq!(matching_close(html, "b"), Some((8, 12)));
        assert_eq!(matching_close("no close", "b"), None);
    }
}
