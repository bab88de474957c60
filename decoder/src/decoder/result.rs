use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::vocab::Vocabulary;

static SPACE_RE: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| Regex::new(r"\s+"));

/// One ranked decoding of an utterance.
///
/// `score` is the full search score. `am_score` and `lm_score` split the
/// representative path into its acoustic and (weighted) language model parts;
/// word, silence and unknown-word bonuses only appear in `score`, and with
/// log-add merging so does the mass of merged paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeResult {
    pub tokens: Vec<usize>,
    pub words: Vec<String>,
    pub score: f32,
    pub am_score: f32,
    pub lm_score: f32,
    /// Frame at which each entry of `tokens` was emitted.
    pub timesteps: Vec<usize>,
}

impl DecodeResult {
    /// Words joined by spaces, or the token symbols with separators as spaces
    /// when decoding ran without a lexicon.
    pub fn transcript(&self, vocab: &Vocabulary) -> String {
        if !self.words.is_empty() {
            return self.words.join(" ");
        }
        let raw: String = self
            .tokens
            .iter()
            .filter_map(|&t| {
                if t == vocab.separator() {
                    Some(" ")
                } else {
                    vocab.symbol(t)
                }
            })
            .collect();
        match &*SPACE_RE {
            Ok(re) => re.replace_all(raw.trim(), " ").into_owned(),
            Err(_) => raw.trim().to_string(),
        }
    }
}
