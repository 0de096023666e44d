//! Splits sentence text into addressable word tokens.
//!
//! A token is a maximal run of word characters (Unicode alphanumerics and `_`).
//! Whitespace and punctuation only separate tokens, so "I'm here" yields
//! `I`, `m`, `here` at positions 0, 1, 2.
//!
//! "Alphanumeric" is the Unicode `Alphabetic` or `Numeric` property, which
//! includes `Other_Alphabetic` combining marks such as the Devanagari vowel
//! sign U+093E. A regex `\w` built on general categories stops at those marks
//! and splits "का" in two; here the syllable stays one token.

use crate::error::{GlossaError, Result};
use std::iter::FusedIterator;

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lazy iterator over `(index, token)` pairs of a text.
///
/// Cloning the iterator restarts the walk from the clone's position, so a fresh
/// `tokenize` call (or a clone taken before iteration) can be consumed again.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    text: &'a str,
    offset: usize,
    index: usize,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.text[self.offset..];
        let (start_rel, _) = rest.char_indices().find(|&(_, c)| is_word_char(c))?;
        let start = self.offset + start_rel;
        let end = self.text[start..]
            .char_indices()
            .find(|&(_, c)| !is_word_char(c))
            .map(|(i, _)| start + i)
            .unwrap_or(self.text.len());

        self.offset = end;
        let index = self.index;
        self.index += 1;
        Some((index, &self.text[start..end]))
    }
}

impl FusedIterator for Tokens<'_> {}

/// Tokenizes `text` into zero-indexed word tokens, left to right.
pub fn tokenize(text: &str) -> Tokens<'_> {
    Tokens {
        text,
        offset: 0,
        index: 0,
    }
}

/// Returns the token at `index`, or `NotFound` when the text has fewer tokens.
pub fn word_at(text: &str, index: usize) -> Result<&str> {
    tokenize(text)
        .nth(index)
        .map(|(_, token)| token)
        .ok_or_else(|| GlossaError::not_found("Token", index))
}

/// Number of tokens in `text`.
pub fn token_count(text: &str) -> usize {
    tokenize(text).count()
}
