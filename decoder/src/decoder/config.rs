use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lexicon::SmearingMode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid options file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{name} must be positive")]
    NonPositive { name: &'static str },
    #[error("nbest ({nbest}) cannot exceed beam_size ({beam_size})")]
    NbestExceedsBeam { nbest: usize, beam_size: usize },
    #[error("beam_size_token ({value}) exceeds the vocabulary size ({vocab_size})")]
    BeamSizeTokenTooLarge { value: usize, vocab_size: usize },
    #[error("{name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: f32 },
    #[error("beam_threshold must be non-negative, got {0}")]
    NegativeThreshold(f32),
}

/// What to do with a hypothesis that ends in the middle of a lexicon word.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialWordPolicy {
    #[default]
    Discard,
    /// Keep it, adding this (usually negative) score.
    Penalty(f32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    pub nbest: usize,
    pub beam_size: usize,
    /// Per-timestep candidate tokens, chosen by raw emission score. `None` tries all.
    pub beam_size_token: Option<usize>,
    pub beam_threshold: f32,
    pub lm_weight: f32,
    pub word_score: f32,
    /// Score for leaving the lexicon. `None` disables the unknown-word fallback.
    pub unk_score: Option<f32>,
    pub sil_score: f32,
    pub log_add: bool,
    pub smearing: SmearingMode,
    pub partial_word: PartialWordPolicy,
    pub cache_lm_scores: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            nbest: 1,
            beam_size: 50,
            beam_size_token: None,
            beam_threshold: 50.0,
            lm_weight: 2.0,
            word_score: 0.0,
            unk_score: None,
            sil_score: 0.0,
            log_add: false,
            smearing: SmearingMode::Max,
            partial_word: PartialWordPolicy::Discard,
            cache_lm_scores: true,
        }
    }
}

impl DecoderOptions {
    pub fn from_env() -> Self {
        let mut options = Self::default();
        options.apply_env_overrides("LEXBEAM_");
        options
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        let options: Self = serde_json::from_str(&content)?;
        log::debug!("Loaded decoder options from {}", path.as_ref().display());
        Ok(options)
    }

    /// Overrides fields from `{prefix}NBEST`, `{prefix}BEAM_SIZE`, ... when set
    /// and parseable; anything else is left alone.
    pub fn apply_env_overrides(&mut self, prefix: &str) {
        let parse_env = |suffix: &str| std::env::var(format!("{prefix}{suffix}")).ok();
        let apply = |suffix: &str, target: &mut f32| {
            if let Some(v) = parse_env(suffix).and_then(|s| s.parse().ok()) {
                *target = v;
            }
        };

        apply("BEAM_THRESHOLD", &mut self.beam_threshold);
        apply("LM_WEIGHT", &mut self.lm_weight);
        apply("WORD_SCORE", &mut self.word_score);
        apply("SIL_SCORE", &mut self.sil_score);

        if let Some(v) = parse_env("NBEST").and_then(|s| s.parse().ok()) {
            self.nbest = v;
        }
        if let Some(v) = parse_env("BEAM_SIZE").and_then(|s| s.parse().ok()) {
            self.beam_size = v;
        }
        if let Some(v) = parse_env("BEAM_SIZE_TOKEN").and_then(|s| s.parse().ok()) {
            self.beam_size_token = Some(v);
        }
        if let Some(v) = parse_env("UNK_SCORE") {
            self.unk_score = v.parse().ok();
        }
        if let Some(v) = parse_env("LOG_ADD").and_then(|s| s.parse().ok()) {
            self.log_add = v;
        }
        if let Some(v) = parse_env("SMEARING") {
            match v.to_lowercase().as_str() {
                "none" => self.smearing = SmearingMode::None,
                "max" => self.smearing = SmearingMode::Max,
                "logadd" => self.smearing = SmearingMode::LogAdd,
                other => log::warn!("Ignoring unknown smearing mode {other:?}"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nbest == 0 {
            return Err(ConfigError::NonPositive { name: "nbest" });
        }
        if self.beam_size == 0 {
            return Err(ConfigError::NonPositive { name: "beam_size" });
        }
        if self.beam_size_token == Some(0) {
            return Err(ConfigError::NonPositive {
                name: "beam_size_token",
            });
        }
        if self.nbest > self.beam_size {
            return Err(ConfigError::NbestExceedsBeam {
                nbest: self.nbest,
                beam_size: self.beam_size,
            });
        }
        // NaN fails this comparison too.
        if !(self.beam_threshold >= 0.0) {
            return Err(ConfigError::NegativeThreshold(self.beam_threshold));
        }

        let mut weights = vec![
            ("lm_weight", self.lm_weight),
            ("word_score", self.word_score),
            ("sil_score", self.sil_score),
        ];
        if let Some(unk) = self.unk_score {
            weights.push(("unk_score", unk));
        }
        if let PartialWordPolicy::Penalty(p) = self.partial_word {
            weights.push(("partial_word penalty", p));
        }
        for (name, value) in weights {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { name, value });
            }
        }
        Ok(())
    }

    pub fn validate_for_vocabulary(&self, vocab_size: usize) -> Result<(), ConfigError> {
        self.validate()?;
        match self.beam_size_token {
            Some(value) if value > vocab_size => {
                Err(ConfigError::BeamSizeTokenTooLarge { value, vocab_size })
            }
            _ => Ok(()),
        }
    }
}
