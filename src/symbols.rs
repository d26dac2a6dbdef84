//! Symbol-to-word substitution for speech output
//!
//! Greek letters and common math/comparison symbols are spoken as words
//! ("α" becomes "alpha", "≤" becomes "less than or equal to") so that every
//! speech backend pronounces them the same way.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Fixed symbol table (glyph -> spoken form)
pub static SYMBOLS: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert('π', "pi");
    m.insert('α', "alpha");
    m.insert('β', "beta");
    m.insert('γ', "gamma");
    m.insert('δ', "delta");
    m.insert('ε', "epsilon");
    m.insert('θ', "theta");
    m.insert('λ', "lambda");
    m.insert('μ', "mu");
    m.insert('σ', "sigma");
    m.insert('τ', "tau");
    m.insert('φ', "phi");
    m.insert('ω', "omega");
    m.insert('Δ', "delta");
    m.insert('∆', "delta");
    m.insert('Σ', "sigma");
    m.insert('Ω', "omega");
    m.insert('±', "plus or minus");
    m.insert('×', "times");
    m.insert('÷', "divided by");
    m.insert('→', "arrow");
    m.insert('∞', "infinity");
    m.insert('≈', "approximately");
    m.insert('≠', "not equal");
    m.insert('≤', "less than or equal to");
    m.insert('≥', "greater than or equal to");
    m.insert('<', "less than");
    m.insert('>', "greater than");
    m.insert('∑', "sum");
    m.insert('∏', "product");
    m.insert('∫', "integral");
    m.insert('∇', "nabla");
    m.insert('√', "square root");
    m
});

/// Replace every mapped symbol with its spoken form
///
/// Words are padded with spaces so "x≤y" reads as "x less than or equal to y";
/// callers collapse whitespace afterwards.
pub fn replace_symbols(text: &str) -> String {
    if !text.chars().any(|ch| SYMBOLS.contains_key(&ch)) {
        return text.to_string();
    }

    let mut result = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match SYMBOLS.get(&ch) {
            Some(word) => {
                result.push(' ');
                result.push_str(word);
                result.push(' ');
            }
            None => result.push(ch),
        }
    }
    result
}
