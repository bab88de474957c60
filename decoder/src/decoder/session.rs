use std::time::Instant;

use ndarray::{ArrayView1, ArrayView2};

use super::nbest;
use super::result::DecodeResult;
use super::search::{self, Search};
use super::state::Beam;
use crate::error::DecodeError;
use crate::lm::{LanguageModel, ScoreCache};

/// Incremental decoding of one utterance: feed frames with [`Self::step`], peek
/// with [`Self::best`], and close with [`Self::finish`].
pub struct DecoderSession<'d, L: LanguageModel> {
    search: Search<'d, L>,
    beam: Beam<L::State>,
    cache: ScoreCache<L::State>,
    timestep: usize,
}

impl<'d, L: LanguageModel> DecoderSession<'d, L> {
    pub(crate) fn new(search: Search<'d, L>) -> Self {
        let cache = ScoreCache::new(search.options.cache_lm_scores);
        let beam = Beam::new(vec![search.initial()]);
        Self {
            search,
            beam,
            cache,
            timestep: 0,
        }
    }

    /// Expands, merges and prunes the beam over one frame of log-probabilities.
    pub fn step(&mut self, frame: ArrayView1<f32>) -> Result<(), DecodeError> {
        let expected = self.search.vocab.len();
        if frame.len() != expected {
            return Err(DecodeError::DimensionMismatch {
                timestep: self.timestep,
                expected,
                found: frame.len(),
            });
        }

        let opts = self.search.options;
        let candidates =
            self.search
                .expand(self.beam.hypotheses(), &frame, self.timestep, &mut self.cache);
        let generated = candidates.len();
        let mut merged = search::merge(candidates, opts.log_add);
        let distinct = merged.len();
        search::prune(&mut merged, opts.beam_size, opts.beam_threshold);

        log::trace!(
            "t={} candidates={} merged={} kept={}",
            self.timestep,
            generated,
            distinct,
            merged.len()
        );
        if merged.is_empty() && !self.beam.is_empty() {
            log::debug!("Beam exhausted at timestep {}", self.timestep);
        }

        self.beam = Beam::new(merged);
        self.timestep += 1;
        Ok(())
    }

    /// Steps through every row of `emissions`, checking `deadline` before each one.
    pub fn step_all(
        &mut self,
        emissions: ArrayView2<f32>,
        deadline: Option<Instant>,
    ) -> Result<(), DecodeError> {
        let expected = self.search.vocab.len();
        if emissions.nrows() > 0 && emissions.ncols() != expected {
            return Err(DecodeError::DimensionMismatch {
                timestep: self.timestep,
                expected,
                found: emissions.ncols(),
            });
        }
        for frame in emissions.outer_iter() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(DecodeError::DeadlineExceeded {
                    timestep: self.timestep,
                });
            }
            self.step(frame)?;
        }
        Ok(())
    }

    pub fn beam(&self) -> &Beam<L::State> {
        &self.beam
    }

    /// Frames consumed so far.
    pub fn timestep(&self) -> usize {
        self.timestep
    }

    pub fn cache(&self) -> &ScoreCache<L::State> {
        &self.cache
    }

    /// Current leader as it stands, without closing open words or the LM.
    pub fn best(&self) -> Option<DecodeResult> {
        self.beam.best().map(|hyp| self.search.result(hyp))
    }

    pub fn finish(mut self) -> Vec<DecodeResult> {
        log::debug!(
            "Finishing after {} frames: {} live hypotheses, LM cache {} hits / {} misses",
            self.timestep,
            self.beam.len(),
            self.cache.hits(),
            self.cache.misses()
        );
        let beam = std::mem::replace(&mut self.beam, Beam::new(Vec::new()));
        nbest::finalize(&self.search, beam, &mut self.cache)
    }
}
