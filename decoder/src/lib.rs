//! Lexicon-constrained CTC beam search decoding.
//!
//! An acoustic model's per-frame token log-probabilities go in; ranked word
//! (or token) sequences come out. The search is constrained by a lexicon trie
//! and scored by any [`lm::LanguageModel`].

pub mod decoder;
pub mod error;
pub mod lexicon;
pub mod lm;
pub mod vocab;

mod util;

pub use decoder::{
    Beam, ConfigError, DecodeResult, Decoder, DecoderOptions, DecoderSession, Hypothesis,
    MergeKey, PartialWordPolicy, Position, UtteranceResult,
};
pub use error::{DecodeError, Error};
pub use lexicon::{Lexicon, LexiconEntry, LexiconError, SmearingMode, Trie, UNK_WORD};
pub use lm::{LanguageModel, LmError, NgramLm, NgramModel, NoLm};
pub use util::log_add;
pub use vocab::{Vocabulary, VocabularyError};
