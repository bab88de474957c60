use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use lexbeam_decoder::{ConfigError, DecoderOptions, SmearingMode};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Smearing {
    None,
    Max,
    #[value(name = "logadd")]
    LogAdd,
}

impl From<Smearing> for SmearingMode {
    fn from(value: Smearing) -> Self {
        match value {
            Smearing::None => SmearingMode::None,
            Smearing::Max => SmearingMode::Max,
            Smearing::LogAdd => SmearingMode::LogAdd,
        }
    }
}

/// Options come from defaults, then `--config`, then `LEXBEAM_*` variables,
/// then the flags below.
#[derive(Parser, Debug)]
#[command(name = "lexbeam")]
#[command(author, version, about = "Lexicon-constrained CTC beam search decoder", long_about = None)]
pub struct Args {
    /// Token list, one symbol per line or `symbol index` pairs
    #[arg(long, short = 't', env = "LEXBEAM_TOKENS")]
    pub tokens: PathBuf,

    /// Lexicon file (`word tok tok ...`); decodes lexicon-free when omitted
    #[arg(long, short = 'l', env = "LEXBEAM_LEXICON")]
    pub lexicon: Option<PathBuf>,

    /// ARPA n-gram language model
    #[arg(long, env = "LEXBEAM_LM")]
    pub lm: Option<PathBuf>,

    /// JSON log-probabilities: `[[f32]]` for one utterance, `[[[f32]]]` for a batch
    #[arg(long, short = 'e')]
    pub emissions: PathBuf,

    /// JSON file with decoder options
    #[arg(long, short = 'c', env = "LEXBEAM_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "-")]
    pub blank: String,

    #[arg(long, default_value = "|")]
    pub separator: String,

    #[arg(long)]
    pub nbest: Option<usize>,

    #[arg(long)]
    pub beam_size: Option<usize>,

    #[arg(long)]
    pub beam_size_token: Option<usize>,

    #[arg(long)]
    pub beam_threshold: Option<f32>,

    #[arg(long, allow_negative_numbers = true)]
    pub lm_weight: Option<f32>,

    #[arg(long, allow_negative_numbers = true)]
    pub word_score: Option<f32>,

    /// Enables the unknown-word fallback with this score
    #[arg(long, allow_negative_numbers = true)]
    pub unk_score: Option<f32>,

    #[arg(long, allow_negative_numbers = true)]
    pub sil_score: Option<f32>,

    /// Merge hypotheses by log-add instead of max
    #[arg(long)]
    pub log_add: bool,

    #[arg(long, value_enum)]
    pub smearing: Option<Smearing>,

    /// Log per-utterance decode details
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Args {
    pub fn decoder_options(&self) -> Result<DecoderOptions, ConfigError> {
        let mut options = match &self.config {
            Some(path) => DecoderOptions::from_json_file(path)?,
            None => DecoderOptions::default(),
        };
        options.apply_env_overrides("LEXBEAM_");
        self.apply(&mut options);
        options.validate()?;
        Ok(options)
    }

    fn apply(&self, options: &mut DecoderOptions) {
        if let Some(v) = self.nbest {
            options.nbest = v;
        }
        if let Some(v) = self.beam_size {
            options.beam_size = v;
        }
        if let Some(v) = self.beam_size_token {
            options.beam_size_token = Some(v);
        }
        if let Some(v) = self.beam_threshold {
            options.beam_threshold = v;
        }
        if let Some(v) = self.lm_weight {
            options.lm_weight = v;
        }
        if let Some(v) = self.word_score {
            options.word_score = v;
        }
        if let Some(v) = self.unk_score {
            options.unk_score = Some(v);
        }
        if let Some(v) = self.sil_score {
            options.sil_score = v;
        }
        if self.log_add {
            options.log_add = true;
        }
        if let Some(v) = self.smearing {
            options.smearing = v.into();
        }
    }
}
