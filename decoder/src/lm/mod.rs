//! Language model adapters used by the beam search.
//!
//! The decoder only talks to a model through [`LanguageModel`]: it asks for a
//! start state, advances states one label at a time, and closes each finished
//! hypothesis with `finish`. Labels are word labels (positions in
//! [`crate::lexicon::Lexicon::words`], with the unknown word at
//! [`crate::lexicon::Lexicon::unk_label`]) when decoding with a lexicon, and
//! token indices when decoding lexicon-free.

mod cache;
mod ngram;

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

pub use cache::ScoreCache;
pub use ngram::{LmError, NgramLm, NgramModel, NgramState};

pub trait LanguageModel {
    /// Conditioning context. Equal states must score every label identically.
    type State: Clone + Eq + Hash + Debug;

    fn start(&self, start_with_nothing: bool) -> Self::State;

    /// Advances `state` by `label`, returning the new state and its natural-log
    /// probability. Must be deterministic.
    fn score(&self, state: &Self::State, label: usize) -> (Self::State, f32);

    /// End-of-sequence transition.
    fn finish(&self, state: &Self::State) -> (Self::State, f32);
}

impl<L: LanguageModel + ?Sized> LanguageModel for &L {
    type State = L::State;

    fn start(&self, start_with_nothing: bool) -> Self::State {
        (**self).start(start_with_nothing)
    }

    fn score(&self, state: &Self::State, label: usize) -> (Self::State, f32) {
        (**self).score(state, label)
    }

    fn finish(&self, state: &Self::State) -> (Self::State, f32) {
        (**self).finish(state)
    }
}

impl<L: LanguageModel + ?Sized> LanguageModel for Arc<L> {
    type State = L::State;

    fn start(&self, start_with_nothing: bool) -> Self::State {
        (**self).start(start_with_nothing)
    }

    fn score(&self, state: &Self::State, label: usize) -> (Self::State, f32) {
        (**self).score(state, label)
    }

    fn finish(&self, state: &Self::State) -> (Self::State, f32) {
        (**self).finish(state)
    }
}

/// Contributes nothing: every transition scores 0 and the state never changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLm;

impl LanguageModel for NoLm {
    type State = ();

    fn start(&self, _start_with_nothing: bool) -> Self::State {}

    fn score(&self, _state: &(), _label: usize) -> ((), f32) {
        ((), 0.0)
    }

    fn finish(&self, _state: &()) -> ((), f32) {
        ((), 0.0)
    }
}
