use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

use ndarray::ArrayView1;

use super::config::{DecoderOptions, PartialWordPolicy};
use super::result::DecodeResult;
use super::state::{Hypothesis, Position};
use crate::lexicon::{Lexicon, NodeId, Trie, UNK_WORD};
use crate::lm::{LanguageModel, ScoreCache};
use crate::util::log_add;
use crate::vocab::Vocabulary;

/// Read-only view of a decoder that drives one utterance's expansion.
pub(crate) struct Search<'d, L: LanguageModel> {
    pub(crate) options: &'d DecoderOptions,
    pub(crate) vocab: &'d Vocabulary,
    pub(crate) lexicon: Option<(&'d Lexicon, &'d Trie)>,
    pub(crate) lm: &'d L,
}

impl<'d, L: LanguageModel> Search<'d, L> {
    pub(crate) fn initial(&self) -> Hypothesis<L::State> {
        Hypothesis::initial(Position::Node(NodeId::ROOT), self.lm.start(false))
    }

    /// All successors of `beam` for one frame, in beam order then candidate order.
    pub(crate) fn expand(
        &self,
        beam: &[Hypothesis<L::State>],
        frame: &ArrayView1<f32>,
        timestep: usize,
        cache: &mut ScoreCache<L::State>,
    ) -> Vec<Hypothesis<L::State>> {
        let tokens = candidate_tokens(frame, self.options.beam_size_token);
        let mut successors = Vec::with_capacity(beam.len() * tokens.len());
        for hyp in beam {
            for &token in &tokens {
                if let Some(next) = self.extend(hyp, token, frame[token], timestep, cache) {
                    successors.push(next);
                }
            }
        }
        successors
    }

    fn extend(
        &self,
        hyp: &Hypothesis<L::State>,
        token: usize,
        am: f32,
        timestep: usize,
        cache: &mut ScoreCache<L::State>,
    ) -> Option<Hypothesis<L::State>> {
        let separator = self.vocab.separator();

        if token == self.vocab.blank() {
            let mut next = hyp.clone();
            next.add(am, 0.0, 0.0);
            next.prev_blank = true;
            return Some(next);
        }

        if hyp.last_token == Some(token) && !hyp.prev_blank {
            let mut next = hyp.clone();
            let sil = if token == separator {
                self.options.sil_score
            } else {
                0.0
            };
            next.add(am, 0.0, sil);
            return Some(next);
        }

        if token == separator {
            self.separate(hyp, token, am, timestep, cache)
        } else {
            self.advance(hyp, token, am, timestep, cache)
        }
    }

    fn separate(
        &self,
        hyp: &Hypothesis<L::State>,
        token: usize,
        am: f32,
        timestep: usize,
        cache: &mut ScoreCache<L::State>,
    ) -> Option<Hypothesis<L::State>> {
        let opts = self.options;
        let mut next = hyp.emit(token, timestep);

        let Some((lexicon, trie)) = self.lexicon else {
            let (state, lm) = cache.score(self.lm, &hyp.lm_state, token);
            next.lm_state = state;
            next.add(am, opts.lm_weight * lm, opts.sil_score);
            return Some(next);
        };

        match hyp.position {
            Position::Node(node) if node == trie.root() => {
                next.add(am, 0.0, opts.sil_score);
            }
            Position::Node(node) => {
                let marker = trie.words(node).first()?;
                let (state, lm) = cache.score(self.lm, &hyp.lm_state, marker.label);
                next.lm_state = state;
                next.words = hyp.words.push(marker.label);
                next.position = Position::Node(trie.root());
                next.add(
                    am,
                    opts.lm_weight * (lm - trie.lookahead(node)),
                    opts.sil_score + opts.word_score,
                );
            }
            Position::Unknown => {
                let unk = lexicon.unk_label();
                let (state, lm) = cache.score(self.lm, &hyp.lm_state, unk);
                next.lm_state = state;
                next.words = hyp.words.push(unk);
                next.position = Position::Node(trie.root());
                next.add(am, opts.lm_weight * lm, opts.sil_score);
            }
        }
        Some(next)
    }

    fn advance(
        &self,
        hyp: &Hypothesis<L::State>,
        token: usize,
        am: f32,
        timestep: usize,
        cache: &mut ScoreCache<L::State>,
    ) -> Option<Hypothesis<L::State>> {
        let opts = self.options;

        let Some((_, trie)) = self.lexicon else {
            let mut next = hyp.emit(token, timestep);
            let (state, lm) = cache.score(self.lm, &hyp.lm_state, token);
            next.lm_state = state;
            next.add(am, opts.lm_weight * lm, 0.0);
            return Some(next);
        };

        match hyp.position {
            Position::Node(node) => match trie.child(node, token) {
                Some(child) => {
                    let mut next = hyp.emit(token, timestep);
                    next.position = Position::Node(child);
                    next.add(
                        am,
                        opts.lm_weight * (trie.lookahead(child) - trie.lookahead(node)),
                        0.0,
                    );
                    Some(next)
                }
                None => {
                    let unk_score = opts.unk_score?;
                    let mut next = hyp.emit(token, timestep);
                    next.position = Position::Unknown;
                    next.add(am, -opts.lm_weight * trie.lookahead(node), unk_score);
                    Some(next)
                }
            },
            Position::Unknown => {
                let mut next = hyp.emit(token, timestep);
                next.add(am, 0.0, 0.0);
                Some(next)
            }
        }
    }

    /// Closes whatever word is still open at the end of the utterance. `None`
    /// drops the hypothesis.
    pub(crate) fn complete(
        &self,
        mut hyp: Hypothesis<L::State>,
        cache: &mut ScoreCache<L::State>,
    ) -> Option<Hypothesis<L::State>> {
        let Some((lexicon, trie)) = self.lexicon else {
            return Some(hyp);
        };
        let opts = self.options;

        match hyp.position {
            Position::Node(node) if node == trie.root() => {}
            Position::Node(node) => match trie.words(node).first() {
                Some(marker) => {
                    let (state, lm) = cache.score(self.lm, &hyp.lm_state, marker.label);
                    hyp.lm_state = state;
                    hyp.words = hyp.words.push(marker.label);
                    hyp.position = Position::Node(trie.root());
                    hyp.add(0.0, opts.lm_weight * (lm - trie.lookahead(node)), opts.word_score);
                }
                None => match opts.partial_word {
                    PartialWordPolicy::Discard => return None,
                    PartialWordPolicy::Penalty(penalty) => {
                        hyp.add(0.0, -opts.lm_weight * trie.lookahead(node), penalty);
                    }
                },
            },
            Position::Unknown => {
                let unk = lexicon.unk_label();
                let (state, lm) = cache.score(self.lm, &hyp.lm_state, unk);
                hyp.lm_state = state;
                hyp.words = hyp.words.push(unk);
                hyp.position = Position::Node(trie.root());
                hyp.add(0.0, opts.lm_weight * lm, 0.0);
            }
        }
        Some(hyp)
    }

    pub(crate) fn word(&self, label: usize) -> String {
        self.lexicon
            .and_then(|(lexicon, _)| lexicon.words().get(label))
            .cloned()
            .unwrap_or_else(|| UNK_WORD.to_string())
    }

    pub(crate) fn result(&self, hyp: &Hypothesis<L::State>) -> DecodeResult {
        let (tokens, timesteps) = hyp.tokens.to_vec().into_iter().unzip();
        DecodeResult {
            tokens,
            words: hyp
                .word_labels()
                .into_iter()
                .map(|label| self.word(label))
                .collect(),
            score: hyp.score,
            am_score: hyp.am_score,
            lm_score: hyp.lm_score,
            timesteps,
        }
    }
}

/// Token indices to try at one frame: everything, or the `limit` best by raw
/// emission score (lower index first on ties).
pub(crate) fn candidate_tokens(frame: &ArrayView1<f32>, limit: Option<usize>) -> Vec<usize> {
    let mut tokens: Vec<usize> = (0..frame.len()).collect();
    if let Some(k) = limit.filter(|&k| k < frame.len()) {
        tokens.sort_by(|&a, &b| frame[b].total_cmp(&frame[a]).then(a.cmp(&b)));
        tokens.truncate(k);
    }
    tokens
}

/// Collapses successors that share a merge key.
pub(crate) fn merge<S: Clone + Eq + Hash>(
    candidates: Vec<Hypothesis<S>>,
    use_log_add: bool,
) -> Vec<Hypothesis<S>> {
    merge_by(candidates, use_log_add, Hypothesis::merge_key)
}

/// Collapses hypotheses with equal `key`. The best member's history represents
/// the group; scores combine by log-add or max. Output keeps first-seen order.
pub(crate) fn merge_by<S, K, F>(
    candidates: Vec<Hypothesis<S>>,
    use_log_add: bool,
    key: F,
) -> Vec<Hypothesis<S>>
where
    K: Eq + Hash,
    F: Fn(&Hypothesis<S>) -> K,
{
    let mut slots: HashMap<K, usize> = HashMap::with_capacity(candidates.len());
    let mut merged: Vec<Hypothesis<S>> = Vec::with_capacity(candidates.len());

    for cand in candidates {
        match slots.entry(key(&cand)) {
            Entry::Occupied(slot) => {
                let rep = &mut merged[*slot.get()];
                let combined = if use_log_add {
                    log_add(rep.score, cand.score)
                } else {
                    rep.score.max(cand.score)
                };
                if cand.score > rep.score {
                    *rep = cand;
                }
                rep.score = combined;
            }
            Entry::Vacant(slot) => {
                slot.insert(merged.len());
                merged.push(cand);
            }
        }
    }
    merged
}

/// Drops impossible hypotheses and those more than `threshold` below the best,
/// then keeps the `beam_size` best. Sorting is stable so equal scores keep
/// expansion order.
pub(crate) fn prune<S>(hyps: &mut Vec<Hypothesis<S>>, beam_size: usize, threshold: f32) {
    hyps.retain(|h| h.score > f32::NEG_INFINITY);
    let Some(best) = hyps.iter().map(|h| h.score).max_by(|a, b| a.total_cmp(b)) else {
        return;
    };
    let floor = best - threshold;
    hyps.retain(|h| h.score >= floor);
    hyps.sort_by(|a, b| b.score.total_cmp(&a.score));
    hyps.truncate(beam_size);
}
