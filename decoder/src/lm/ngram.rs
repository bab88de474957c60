use std::collections::HashMap;
use std::f32::consts::LN_10;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use super::LanguageModel;
use crate::lexicon::Lexicon;
use crate::vocab::Vocabulary;

#[derive(Error, Debug)]
pub enum LmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ARPA line {line}: {reason}")]
    Arpa { line: usize, reason: String },
    #[error("ARPA file has no n-grams")]
    Empty,
}

/// Back-off n-gram model read from an ARPA file.
///
/// Probabilities and back-off weights are kept in log10, as written in the file;
/// [`NgramLm`] converts to natural log at the decoder boundary.
#[derive(Debug, Clone)]
pub struct NgramModel {
    order: usize,
    vocab: HashMap<String, u32>,
    id_to_word: Vec<String>,
    /// (log10 prob, log10 back-off) per n-gram of word ids.
    ngrams: HashMap<Vec<u32>, (f32, f32)>,
    unk_id: Option<u32>,
    bos_id: Option<u32>,
    eos_id: Option<u32>,
}

impl NgramModel {
    pub fn new(order: usize) -> Self {
        Self {
            order,
            vocab: HashMap::new(),
            id_to_word: Vec::new(),
            ngrams: HashMap::new(),
            unk_id: None,
            bos_id: None,
            eos_id: None,
        }
    }

    /// Adds or replaces one n-gram, registering unseen words.
    pub fn insert(&mut self, words: &[&str], log10_prob: f32, log10_backoff: f32) {
        let ids: Vec<u32> = words.iter().map(|w| self.intern(w)).collect();
        self.order = self.order.max(ids.len());
        self.ngrams.insert(ids, (log10_prob, log10_backoff));
    }

    fn intern(&mut self, word: &str) -> u32 {
        if let Some(&id) = self.vocab.get(word) {
            return id;
        }
        let id = self.id_to_word.len() as u32;
        self.vocab.insert(word.to_string(), id);
        self.id_to_word.push(word.to_string());
        match word {
            "<unk>" | "<UNK>" => self.unk_id = Some(id),
            "<s>" => self.bos_id = Some(id),
            "</s>" => self.eos_id = Some(id),
            _ => {}
        }
        id
    }

    pub fn load_arpa<P: AsRef<Path>>(path: P) -> Result<Self, LmError> {
        let file = File::open(path.as_ref())?;
        let model = Self::parse_arpa(BufReader::new(file))?;
        log::info!(
            "Loaded {}-gram LM from {} ({} words, {} n-grams)",
            model.order,
            path.as_ref().display(),
            model.vocab_size(),
            model.ngrams.len()
        );
        Ok(model)
    }

    /// Parses the ARPA text format:
    ///
    /// ```text
    /// \data\
    /// ngram 1=<count>
    /// ngram 2=<count>
    ///
    /// \1-grams:
    /// <log10_prob> <word> [<log10_backoff>]
    ///
    /// \2-grams:
    /// <log10_prob> <word1> <word2> [<log10_backoff>]
    ///
    /// \end\
    /// ```
    pub fn parse_arpa<R: BufRead>(reader: R) -> Result<Self, LmError> {
        let mut model = Self::new(0);
        let mut declared: HashMap<usize, usize> = HashMap::new();
        let mut parsed: HashMap<usize, usize> = HashMap::new();
        let mut seen_data = false;
        let mut current_order = 0;

        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            let lineno = n + 1;

            if line.is_empty() {
                continue;
            }
            if line == "\\data\\" {
                seen_data = true;
                current_order = 0;
                continue;
            }
            if line == "\\end\\" {
                break;
            }
            if let Some(spec) = line.strip_prefix("ngram ") {
                let (order, count) = spec.split_once('=').ok_or_else(|| LmError::Arpa {
                    line: lineno,
                    reason: format!("malformed count line {line:?}"),
                })?;
                let order = parse_field::<usize>(order.trim(), lineno, "n-gram order")?;
                let count = parse_field::<usize>(count.trim(), lineno, "n-gram count")?;
                declared.insert(order, count);
                continue;
            }
            if line.starts_with('\\') && line.ends_with("-grams:") {
                current_order =
                    parse_field::<usize>(&line[1..line.len() - 7], lineno, "section order")?;
                if current_order == 0 {
                    return Err(LmError::Arpa {
                        line: lineno,
                        reason: "section order must be positive".to_string(),
                    });
                }
                continue;
            }
            if !seen_data {
                return Err(LmError::Arpa {
                    line: lineno,
                    reason: "content before \\data\\ header".to_string(),
                });
            }
            if current_order == 0 {
                log::warn!("ARPA line {lineno} outside any n-gram section, skipping");
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < current_order + 1 || parts.len() > current_order + 2 {
                return Err(LmError::Arpa {
                    line: lineno,
                    reason: format!("malformed {current_order}-gram entry {line:?}"),
                });
            }
            let log_prob = parse_field::<f32>(parts[0], lineno, "probability")?;
            let backoff = match parts.get(current_order + 1) {
                Some(bo) => parse_field::<f32>(bo, lineno, "back-off weight")?,
                None => 0.0,
            };
            model.insert(&parts[1..=current_order], log_prob, backoff);
            *parsed.entry(current_order).or_default() += 1;
        }

        if model.ngrams.is_empty() {
            return Err(LmError::Empty);
        }
        for (order, count) in &declared {
            let got = parsed.get(order).copied().unwrap_or(0);
            if got != *count {
                log::warn!("ARPA header declares {count} {order}-grams but {got} were read");
            }
        }
        Ok(model)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn vocab_size(&self) -> usize {
        self.id_to_word.len()
    }

    pub fn word_to_id(&self, word: &str) -> Option<u32> {
        self.vocab.get(word).copied()
    }

    pub fn id_to_word(&self, id: u32) -> Option<&str> {
        self.id_to_word.get(id as usize).map(String::as_str)
    }

    pub fn unk_id(&self) -> Option<u32> {
        self.unk_id
    }

    pub fn bos_id(&self) -> Option<u32> {
        self.bos_id
    }

    pub fn eos_id(&self) -> Option<u32> {
        self.eos_id
    }

    /// log10 P(word | context), backing off through shorter contexts.
    pub fn score(&self, context: &[u32], word: u32) -> f32 {
        let keep = self.order.saturating_sub(1).min(context.len());
        let mut ngram = context[context.len() - keep..].to_vec();
        ngram.push(word);
        self.score_ngram(&ngram)
    }

    fn score_ngram(&self, ngram: &[u32]) -> f32 {
        if ngram.is_empty() {
            return 0.0;
        }
        if let Some(&(log_prob, _)) = self.ngrams.get(ngram) {
            return log_prob;
        }
        if ngram.len() > 1 {
            let backoff = self
                .ngrams
                .get(&ngram[..ngram.len() - 1])
                .map(|&(_, bo)| bo)
                .unwrap_or(0.0);
            return backoff + self.score_ngram(&ngram[1..]);
        }
        self.oov_score()
    }

    /// Floor used for words the model has never seen.
    pub fn oov_score(&self) -> f32 {
        -(self.vocab_size().max(1) as f32).log10()
    }

    /// Longest suffix of `history` (at most `order - 1` words) that the model
    /// knows as an n-gram. Shorter contexts score identically, so histories
    /// that reduce to the same suffix are the same state.
    pub fn minimal_context(&self, history: &[u32]) -> Vec<u32> {
        let keep = self.order.saturating_sub(1).min(history.len());
        let mut suffix = &history[history.len() - keep..];
        while !suffix.is_empty() && !self.ngrams.contains_key(suffix) {
            suffix = &suffix[1..];
        }
        suffix.to_vec()
    }
}

fn parse_field<T: std::str::FromStr>(raw: &str, line: usize, what: &str) -> Result<T, LmError> {
    raw.parse().map_err(|_| LmError::Arpa {
        line,
        reason: format!("invalid {what} {raw:?}"),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NgramState {
    context: Vec<u32>,
}

impl NgramState {
    pub fn context(&self) -> &[u32] {
        &self.context
    }
}

/// Adapts an [`NgramModel`] to decoder labels.
///
/// `labels[i]` is the model word for decoder label `i`; labels the model does not
/// know map to `<unk>`, or score the out-of-vocabulary floor when the model has
/// no `<unk>` entry.
#[derive(Debug, Clone)]
pub struct NgramLm {
    model: Arc<NgramModel>,
    label_ids: Vec<Option<u32>>,
}

impl NgramLm {
    pub fn new(model: Arc<NgramModel>, labels: &[String]) -> Self {
        let mut unmapped = 0;
        let label_ids = labels
            .iter()
            .map(|label| {
                model.word_to_id(label).or_else(|| {
                    unmapped += 1;
                    model.unk_id()
                })
            })
            .collect();
        if unmapped > 0 {
            log::debug!(
                "{unmapped} of {} decoder labels are not in the LM vocabulary",
                labels.len()
            );
        }
        Self { model, label_ids }
    }

    /// Word-level scoring for lexicon decoding, including the unknown-word label.
    pub fn for_lexicon(model: Arc<NgramModel>, lexicon: &Lexicon) -> Self {
        Self::new(model, &lexicon.lm_labels())
    }

    /// Token-level scoring for lexicon-free decoding.
    pub fn for_vocabulary(model: Arc<NgramModel>, vocab: &Vocabulary) -> Self {
        Self::new(model, vocab.symbols())
    }

    pub fn model(&self) -> &NgramModel {
        &self.model
    }

    fn advance(&self, state: &NgramState, word: u32) -> (NgramState, f32) {
        let log10 = self.model.score(&state.context, word);
        let mut history = state.context.clone();
        history.push(word);
        let next = NgramState {
            context: self.model.minimal_context(&history),
        };
        (next, log10 * LN_10)
    }
}

impl LanguageModel for NgramLm {
    type State = NgramState;

    fn start(&self, start_with_nothing: bool) -> NgramState {
        match self.model.bos_id() {
            Some(bos) if !start_with_nothing => NgramState {
                context: self.model.minimal_context(&[bos]),
            },
            _ => NgramState::default(),
        }
    }

    fn score(&self, state: &NgramState, label: usize) -> (NgramState, f32) {
        match self.label_ids.get(label).copied().flatten() {
            Some(word) => self.advance(state, word),
            None => (NgramState::default(), self.model.oov_score() * LN_10),
        }
    }

    fn finish(&self, state: &NgramState) -> (NgramState, f32) {
        match self.model.eos_id() {
            Some(eos) => self.advance(state, eos),
            None => (state.clone(), 0.0),
        }
    }
}
