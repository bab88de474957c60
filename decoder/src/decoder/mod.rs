use std::time::Instant;

use ndarray::ArrayView2;

use crate::error::{DecodeError, Error};
use crate::lexicon::{Lexicon, SmearingMode, Trie};
use crate::lm::LanguageModel;
use crate::vocab::Vocabulary;

mod batch;
pub(crate) mod config;
mod nbest;
mod result;
pub(crate) mod search;
mod session;
pub(crate) mod state;

pub use batch::UtteranceResult;
pub use config::{ConfigError, DecoderOptions, PartialWordPolicy};
pub use result::DecodeResult;
pub use session::DecoderSession;
pub use state::{Beam, Hypothesis, MergeKey, Position};

/// CTC beam search decoder over a fixed vocabulary, an optional lexicon and a
/// language model. Immutable once built; decode any number of utterances,
/// from any number of threads when `L: Sync`.
pub struct Decoder<L: LanguageModel> {
    options: DecoderOptions,
    vocab: Vocabulary,
    lexicon: Option<(Lexicon, Trie)>,
    lm: L,
}

impl<L: LanguageModel> Decoder<L> {
    /// Without a lexicon, or with one that has no entries, the decoder runs
    /// lexicon-free: any token sequence is allowed and the language model
    /// scores tokens instead of words.
    pub fn new(
        options: DecoderOptions,
        vocab: Vocabulary,
        lexicon: Option<Lexicon>,
        lm: L,
    ) -> Result<Self, Error> {
        options.validate_for_vocabulary(vocab.len())?;

        let lexicon = lexicon.filter(|lex| {
            if lex.entries().is_empty() {
                log::warn!("Lexicon has no entries, decoding lexicon-free");
                false
            } else {
                true
            }
        });
        let lexicon = match lexicon {
            Some(lexicon) => {
                let mut trie = lexicon.build_trie(vocab.len())?;
                if options.smearing == SmearingMode::None {
                    trie.smear(SmearingMode::None, |_| 0.0);
                } else {
                    let start = lm.start(false);
                    trie.smear(options.smearing, |label| lm.score(&start, label).1);
                }
                Some((lexicon, trie))
            }
            None => None,
        };

        match &lexicon {
            Some((lex, trie)) => log::info!(
                "Decoder ready: {} tokens, {} words, {} trie nodes, beam_size={}",
                vocab.len(),
                lex.words().len(),
                trie.node_count(),
                options.beam_size
            ),
            None => log::info!(
                "Decoder ready (lexicon-free): {} tokens, beam_size={}",
                vocab.len(),
                options.beam_size
            ),
        }

        Ok(Self {
            options,
            vocab,
            lexicon,
            lm,
        })
    }

    pub fn session(&self) -> DecoderSession<'_, L> {
        DecoderSession::new(search::Search {
            options: &self.options,
            vocab: &self.vocab,
            lexicon: self.lexicon.as_ref().map(|(lex, trie)| (lex, trie)),
            lm: &self.lm,
        })
    }

    /// Decodes one `T x V` matrix of log-probabilities into at most `nbest`
    /// results, best first. An empty result means no path satisfied the lexicon.
    pub fn decode(&self, emissions: ArrayView2<f32>) -> Result<Vec<DecodeResult>, DecodeError> {
        self.decode_inner(emissions, None)
    }

    /// Like [`Self::decode`], giving up at the first timestep boundary past `deadline`.
    pub fn decode_until(
        &self,
        emissions: ArrayView2<f32>,
        deadline: Instant,
    ) -> Result<Vec<DecodeResult>, DecodeError> {
        self.decode_inner(emissions, Some(deadline))
    }

    fn decode_inner(
        &self,
        emissions: ArrayView2<f32>,
        deadline: Option<Instant>,
    ) -> Result<Vec<DecodeResult>, DecodeError> {
        let start = Instant::now();
        let mut session = self.session();
        session.step_all(emissions, deadline)?;
        let results = session.finish();
        log::debug!(
            "Decoded {} frames into {} result(s) in {:?}",
            emissions.nrows(),
            results.len(),
            start.elapsed()
        );
        Ok(results)
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn lexicon(&self) -> Option<&Lexicon> {
        self.lexicon.as_ref().map(|(lex, _)| lex)
    }

    pub fn trie(&self) -> Option<&Trie> {
        self.lexicon.as_ref().map(|(_, trie)| trie)
    }

    pub fn language_model(&self) -> &L {
        &self.lm
    }
}
