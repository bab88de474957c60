use std::collections::HashMap;

use super::LanguageModel;

/// Per-utterance memo of `(state, label) -> (next state, score)` transitions.
///
/// Equivalent hypotheses keep asking for the same transitions within and
/// across timesteps; the cache answers those without touching the model.
#[derive(Debug)]
pub struct ScoreCache<S> {
    entries: HashMap<(S, usize), (S, f32)>,
    enabled: bool,
    hits: u64,
    misses: u64,
}

impl<S: Clone + Eq + std::hash::Hash> ScoreCache<S> {
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: HashMap::new(),
            enabled,
            hits: 0,
            misses: 0,
        }
    }

    pub fn score<L>(&mut self, lm: &L, state: &S, label: usize) -> (S, f32)
    where
        L: LanguageModel<State = S> + ?Sized,
    {
        if !self.enabled {
            self.misses += 1;
            return lm.score(state, label);
        }
        if let Some((next, score)) = self.entries.get(&(state.clone(), label)) {
            self.hits += 1;
            return (next.clone(), *score);
        }
        self.misses += 1;
        let result = lm.score(state, label);
        self.entries.insert((state.clone(), label), result.clone());
        result
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }
}
