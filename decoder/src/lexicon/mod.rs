mod trie;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::vocab::Vocabulary;

pub use trie::{NodeId, SmearingMode, Trie, WordMarker};

/// Word emitted for paths that leave the lexicon when the unknown-word fallback is on.
pub const UNK_WORD: &str = "<unk>";

#[derive(Error, Debug)]
pub enum LexiconError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Word {word:?} has an empty spelling")]
    EmptySpelling { word: String },
    #[error("Word {word:?} uses token {token:?}, which is not in the vocabulary")]
    UnknownToken { word: String, token: String },
    #[error("Word {word:?} uses token index {index}, outside the vocabulary of size {size}")]
    TokenOutOfRange {
        word: String,
        index: usize,
        size: usize,
    },
    #[error("Word {word:?} has the word separator inside its spelling")]
    SeparatorInSpelling { word: String },
    #[error("Word {word:?} has the blank token inside its spelling")]
    BlankInSpelling { word: String },
    #[error("Line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// One spelling of a word. `label` is the word's position in [`Lexicon::words`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexiconEntry {
    pub word: String,
    pub label: usize,
    pub tokens: Vec<usize>,
}

/// Parsed lexicon: every spelling plus the distinct words in first-declared order.
#[derive(Debug, Clone)]
pub struct Lexicon {
    entries: Vec<LexiconEntry>,
    words: Vec<String>,
    labels: HashMap<String, usize>,
}

impl Lexicon {
    pub fn from_entries<W, I>(entries: I, vocab: &Vocabulary) -> Result<Self, LexiconError>
    where
        W: Into<String>,
        I: IntoIterator<Item = (W, Vec<usize>)>,
    {
        let mut lexicon = Self {
            entries: Vec::new(),
            words: Vec::new(),
            labels: HashMap::new(),
        };
        for (word, tokens) in entries {
            lexicon.push(word.into(), tokens, vocab)?;
        }
        Ok(lexicon)
    }

    /// Parses `<word> <token> <token> ...` lines against the vocabulary's symbols.
    pub fn parse(content: &str, vocab: &Vocabulary) -> Result<Self, LexiconError> {
        let mut lexicon = Self::from_entries(Vec::<(String, Vec<usize>)>::new(), vocab)?;

        for (n, raw) in content.lines().enumerate() {
            let mut parts = raw.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };
            let tokens = parts
                .map(|symbol| {
                    vocab
                        .index_of(symbol)
                        .ok_or_else(|| LexiconError::UnknownToken {
                            word: word.to_string(),
                            token: symbol.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if tokens.is_empty() {
                return Err(LexiconError::Parse {
                    line: n + 1,
                    reason: format!("word {word:?} has no tokens"),
                });
            }
            lexicon.push(word.to_string(), tokens, vocab)?;
        }

        Ok(lexicon)
    }

    pub fn load<P: AsRef<Path>>(path: P, vocab: &Vocabulary) -> Result<Self, LexiconError> {
        let content = fs::read_to_string(path.as_ref())?;
        let lexicon = Self::parse(&content, vocab)?;
        log::info!(
            "Loaded lexicon {} ({} entries, {} words)",
            path.as_ref().display(),
            lexicon.entries.len(),
            lexicon.words.len()
        );
        Ok(lexicon)
    }

    fn push(
        &mut self,
        word: String,
        mut tokens: Vec<usize>,
        vocab: &Vocabulary,
    ) -> Result<(), LexiconError> {
        // Lexicons commonly end every spelling with the separator; the decoder
        // closes words on the separator itself.
        while tokens.last() == Some(&vocab.separator()) {
            tokens.pop();
        }
        if tokens.is_empty() {
            return Err(LexiconError::EmptySpelling { word });
        }
        for &index in &tokens {
            if index >= vocab.len() {
                return Err(LexiconError::TokenOutOfRange {
                    word,
                    index,
                    size: vocab.len(),
                });
            }
            if index == vocab.separator() {
                return Err(LexiconError::SeparatorInSpelling { word });
            }
            if index == vocab.blank() {
                return Err(LexiconError::BlankInSpelling { word });
            }
        }

        let label = match self.labels.get(&word) {
            Some(&label) => label,
            None => {
                let label = self.words.len();
                self.labels.insert(word.clone(), label);
                self.words.push(word.clone());
                label
            }
        };
        self.entries.push(LexiconEntry {
            word,
            label,
            tokens,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[LexiconEntry] {
        &self.entries
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn label_of(&self, word: &str) -> Option<usize> {
        self.labels.get(word).copied()
    }

    /// Label handed to the language model for an unknown word.
    pub fn unk_label(&self) -> usize {
        self.words.len()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.labels.contains_key(word)
    }

    /// Word strings indexed by label, with [`UNK_WORD`] appended at [`Self::unk_label`].
    pub fn lm_labels(&self) -> Vec<String> {
        let mut labels = self.words.clone();
        labels.push(UNK_WORD.to_string());
        labels
    }

    pub fn build_trie(&self, vocab_size: usize) -> Result<Trie, LexiconError> {
        Trie::build(&self.entries, vocab_size)
    }
}
