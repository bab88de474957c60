use thiserror::Error;

use crate::decoder::ConfigError;
use crate::lexicon::LexiconError;
use crate::lm::LmError;
use crate::vocab::VocabularyError;

/// Unified decoder errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Vocabulary: {0}")]
    Vocabulary(#[from] VocabularyError),

    #[error("Lexicon: {0}")]
    Lexicon(#[from] LexiconError),

    #[error("Language model: {0}")]
    Lm(#[from] LmError),

    #[error("Decode: {0}")]
    Decode(#[from] DecodeError),
}

impl Error {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Config(_) => "The decoder options are invalid. Check beam sizes and weights.",
            Self::Vocabulary(_) => {
                "The token list could not be used. Check it lists every token once, including blank and separator."
            }
            Self::Lexicon(_) => {
                "The lexicon could not be used. Every spelling must use tokens from the token list."
            }
            Self::Lm(_) => "The language model file could not be read.",
            Self::Decode(DecodeError::DeadlineExceeded { .. }) => {
                "Decoding ran out of time before the utterance was finished."
            }
            Self::Decode(_) => "The emission matrix does not match the token list.",
        }
    }
}

/// Per-utterance failures. Other utterances in a batch are unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Timestep {timestep} has {found} scores, expected one per token ({expected})")]
    DimensionMismatch {
        timestep: usize,
        expected: usize,
        found: usize,
    },

    #[error("Utterance length {length} exceeds the {frames} available frames")]
    LengthExceedsFrames { length: usize, frames: usize },

    #[error("Deadline passed before timestep {timestep}")]
    DeadlineExceeded { timestep: usize },
}
