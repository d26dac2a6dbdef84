//! Speakable-text extraction from card HTML
//!
//! Turns the markup Anki renders for one side of a card into bounded plain
//! text for a speech backend. The passes run in a fixed order; cloze answers
//! are masked on the question side and revealed on the answer side.
//!
//! Extraction never fails: input that doesn't match the expected template
//! degrades to best-effort text or an empty string.

pub mod cloze;
pub mod markup;

use crate::symbols::replace_symbols;
use log::debug;

/// Spoken in place of any hidden answer
pub const PLACEHOLDER: &str = "blank";

/// Maximum length of speakable text, in code points (ellipsis included)
pub const MAX_SPEAKABLE_CHARS: usize = 500;

/// Appended when text is truncated
pub const ELLIPSIS: &str = "...";

/// Which side of the card is being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardSide {
    Question,
    Answer,
}

/// One cloze group, identified by its 1-based index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClozeReference(u32);

impl ClozeReference {
    /// Create from a 1-based index; zero is not a valid group
    pub fn new(index: u32) -> Option<Self> {
        (index >= 1).then_some(Self(index))
    }

    /// Create from the host's zero-based card ordinal
    pub fn from_ordinal(ordinal: u32) -> Self {
        Self(ordinal.saturating_add(1))
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

/// Extract speakable text from one side of a card
///
/// Every cloze group is masked on the question side regardless of
/// `active_cloze`; on the answer side every group is revealed.
pub fn extract(markup: &str, side: CardSide, active_cloze: Option<ClozeReference>) -> String {
    if markup.trim().is_empty() {
        return String::new();
    }
    debug!(
        "Extracting {:?} side ({} bytes, active cloze {:?})",
        side,
        markup.len(),
        active_cloze.map(|c| c.index())
    );

    let content = match side {
        CardSide::Answer => markup::after_answer_separator(markup),
        CardSide::Question => markup,
    };
    let content = markup::main_container(content);

    if markup::is_image_only(content) {
        debug!("Image-only card, nothing to speak");
        return String::new();
    }

    let content = cloze::replace_hidden_answer(content);
    let content = match side {
        CardSide::Question => cloze::mask_rendered(&cloze::mask_raw(&content)),
        CardSide::Answer => cloze::reveal_raw(&content),
    };

    let content = markup::strip_math(&content);
    let content = markup::remove_non_content(&content);
    let text = markup::to_plain_text(&content);
    // Entity-encoded braces only become cloze syntax once decoded
    let text = match side {
        CardSide::Question => cloze::mask_raw(&text),
        CardSide::Answer => cloze::reveal_raw(&text),
    };

    let text = markup::collapse_whitespace(&replace_symbols(&text));
    truncate_at_word(&text, MAX_SPEAKABLE_CHARS)
}

/// Bound `text` to `cap` code points, cutting at the last whole word
pub fn truncate_at_word(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }

    let budget = cap.saturating_sub(ELLIPSIS.chars().count());
    let cut = text
        .char_indices()
        .nth(budget)
        .map_or(text.len(), |(idx, _)| idx);
    let head = &text[..cut];

    let at_boundary = text[cut..].starts_with(char::is_whitespace);
    let head = if at_boundary {
        head
    } else {
        match head.rfind(char::is_whitespace) {
            Some(idx) if idx > 0 => &head[..idx],
            // One enormous word: hard cut
            _ => head,
        }
    };

    format!("{}{}", head.trim_end(), ELLIPSIS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloze_reference() {
        assert_eq!(ClozeReference::new(0), None);
        assert_eq!(ClozeReference::new(2).map(|c| c.index()), Some(2));
        assert_eq!(ClozeReference::from_ordinal(0).index(), 1);
    }

    #[test]
    fn test_question_masks_clozes() {
        let html = "{{c1::Paris::city}} is the capital of {{c2::France}}.";
        let text = extract(html, CardSide::Question, None);
        assert_eq!(text, "blank is the capital of blank.");
    }

    #[test]
    fn test_answer_reveals_clozes() {
        let html = "Front<hr id=answer>{{c1::Paris::city}} is the capital of {{c2::France}}.";
        let text = extract(html, CardSide::Answer, Some(ClozeReference::from_ordinal(0)));
        assert_eq!(text, "Paris is the capital of France.");
    }

    #[test]
    fn test_answer_without_separator_uses_everything() {
        let text = extract("<b>Only</b> answer", CardSide::Answer, None);
        assert_eq!(text, "Only answer");
    }

    #[test]
    fn test_image_only() {
        assert_eq!(extract(r#"<img src="x.png">"#, CardSide::Question, None), "");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(extract("", CardSide::Question, None), "");
        assert_eq!(extract("   ", CardSide::Answer, None), "");
    }

    #[test]
    fn test_entity_encoded_cloze() {
        let html = "Capital: &#123;&#123;c1::Paris&#125;&#125;";
        assert_eq!(extract(html, CardSide::Question, None), "Capital: blank");
        assert_eq!(extract(html, CardSide::Answer, None), "Capital: Paris");
    }

    #[test]
    fn test_cloze_spanning_line_divs() {
        let html = r#"<div id="text">Capital: {{c1::Paris<div>France</div>}}</div>"#;
        assert_eq!(extract(html, CardSide::Question, None), "Capital: blank");

        let html = r#"<div id="text"><div>First line</div><div>Second line</div></div>"#;
        assert_eq!(extract(html, CardSide::Question, None), "First line Second line");
    }

    #[test]
    fn test_symbols_after_tag_stripping() {
        let html = r#"<span title="α">Angle</span> θ"#;
        assert_eq!(extract(html, CardSide::Question, None), "Angle theta");
    }

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_at_word("short text", 500), "short text");
    }

    #[test]
    fn test_truncate_on_word_boundary() {
        let text = "alpha beta gamma delta";
        let result = truncate_at_word(text, 14);
        assert_eq!(result, "alpha beta...");
        assert!(result.chars().count() <= 14);
    }

    #[test]
    fn test_truncate_single_long_word() {
        let text = "x".repeat(40);
        let result = truncate_at_word(&text, 10);
        assert_eq!(result, format!("{}...", "x".repeat(7)));
    }
}
