//! Text normalisation applied to both user questions and stored questions
//! before they are compared.

use std::sync::LazyLock;

use regex::Regex;

// Word characters are letters, numbers and `_`. Combining marks are not
// word characters, so decomposed accents are dropped.
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\p{L}\p{N}_\s\x1C-\x1F]").expect("static pattern compiles")
});

/// The ASCII file/group/record/unit separators count as whitespace.
fn is_separator(c: char) -> bool {
    c.is_whitespace() || ('\x1C'..='\x1F').contains(&c)
}

/// Lowercase `text`, drop every character that is neither a word character
/// nor whitespace, then collapse whitespace runs to single spaces and trim.
///
/// ```rust
/// use kbchat_runtime::normalize::normalize;
///
/// assert_eq!(normalize("  What's   the PRICE?! "), "whats the price");
/// assert_eq!(normalize(""), "");
/// ```
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    stripped
        .split(is_separator)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
