use std::cmp::Ordering;

use super::result::DecodeResult;
use super::search::{merge_by, Search};
use super::state::Beam;
use crate::lm::{LanguageModel, ScoreCache};

/// Ends every surviving hypothesis and returns the `nbest` best, best first.
pub(crate) fn finalize<L: LanguageModel>(
    search: &Search<'_, L>,
    beam: Beam<L::State>,
    cache: &mut ScoreCache<L::State>,
) -> Vec<DecodeResult> {
    let lm_weight = search.options.lm_weight;
    let survivors = beam.len();

    let finished: Vec<_> = beam
        .into_hypotheses()
        .into_iter()
        .filter_map(|hyp| search.complete(hyp, cache))
        .map(|mut hyp| {
            let (state, lm) = search.lm.finish(&hyp.lm_state);
            hyp.lm_state = state;
            hyp.add(0.0, lm_weight * lm, 0.0);
            hyp
        })
        .collect();
    let completed = finished.len();

    if completed < survivors {
        log::debug!(
            "{} of {survivors} hypotheses ended mid-word and were dropped",
            survivors - completed
        );
    }

    // Once input ends, the CTC repeat state no longer distinguishes paths:
    // hypotheses spelling the same tokens and words are one decoding.
    let merged = merge_by(finished, search.options.log_add, |hyp| {
        (hyp.tokens(), hyp.word_labels())
    });
    if merged.len() < completed {
        log::trace!("Merged {completed} finished hypotheses into {}", merged.len());
    }

    let mut results: Vec<DecodeResult> = merged.iter().map(|hyp| search.result(hyp)).collect();

    results.sort_by(rank);
    results.truncate(search.options.nbest);
    results
}

/// Higher score first, then fewer tokens, then word and token order.
pub(crate) fn rank(a: &DecodeResult, b: &DecodeResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.tokens.len().cmp(&b.tokens.len()))
        .then_with(|| a.words.cmp(&b.words))
        .then_with(|| a.tokens.cmp(&b.tokens))
}
