use std::sync::Arc;

use crate::lexicon::NodeId;

#[derive(Debug)]
struct Link<T> {
    value: T,
    parent: Trail<T>,
}

/// Persistent append-only history. Successors share their predecessor's prefix,
/// so extending a hypothesis never touches the one it came from.
#[derive(Debug)]
pub(crate) struct Trail<T>(Option<Arc<Link<T>>>);

impl<T> Trail<T> {
    pub(crate) fn empty() -> Self {
        Self(None)
    }

    pub(crate) fn push(&self, value: T) -> Self {
        Self(Some(Arc::new(Link {
            value,
            parent: self.clone(),
        })))
    }
}

impl<T: Copy> Trail<T> {
    pub(crate) fn to_vec(&self) -> Vec<T> {
        let mut out = Vec::new();
        let mut cur = self.0.as_deref();
        while let Some(link) = cur {
            out.push(link.value);
            cur = link.parent.0.as_deref();
        }
        out.reverse();
        out
    }
}

impl<T> Clone for Trail<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Drop for Trail<T> {
    // Unlink iteratively; long histories would otherwise recurse once per link.
    fn drop(&mut self) {
        let mut cur = self.0.take();
        while let Some(link) = cur {
            match Arc::try_unwrap(link) {
                Ok(mut link) => cur = link.parent.0.take(),
                Err(_) => break,
            }
        }
    }
}

/// Where a hypothesis stands in the lexicon. Lexicon-free decoding stays at the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Node(NodeId),
    /// Spelling a word the lexicon does not contain, until the next separator.
    Unknown,
}

/// Hypotheses with equal keys score every future identically and are merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey<S> {
    pub position: Position,
    pub lm_state: S,
    pub last_token: Option<usize>,
    pub prev_blank: bool,
}

/// One partial decoding path.
#[derive(Debug, Clone)]
pub struct Hypothesis<S> {
    pub(crate) score: f32,
    pub(crate) am_score: f32,
    pub(crate) lm_score: f32,
    pub(crate) position: Position,
    pub(crate) lm_state: S,
    pub(crate) last_token: Option<usize>,
    pub(crate) prev_blank: bool,
    /// (token, timestep) pairs after CTC collapsing.
    pub(crate) tokens: Trail<(usize, usize)>,
    pub(crate) token_count: usize,
    pub(crate) words: Trail<usize>,
}

impl<S: Clone> Hypothesis<S> {
    pub(crate) fn initial(position: Position, lm_state: S) -> Self {
        Self {
            score: 0.0,
            am_score: 0.0,
            lm_score: 0.0,
            position,
            lm_state,
            last_token: None,
            prev_blank: false,
            tokens: Trail::empty(),
            token_count: 0,
            words: Trail::empty(),
        }
    }

    /// `am` and `lm` are tracked separately; `bonus` only enters the total.
    pub(crate) fn add(&mut self, am: f32, lm: f32, bonus: f32) {
        self.am_score += am;
        self.lm_score += lm;
        self.score += am + lm + bonus;
    }

    pub(crate) fn emit(&self, token: usize, timestep: usize) -> Self {
        let mut next = self.clone();
        next.tokens = self.tokens.push((token, timestep));
        next.token_count += 1;
        next.last_token = Some(token);
        next.prev_blank = false;
        next
    }

    pub fn merge_key(&self) -> MergeKey<S> {
        MergeKey {
            position: self.position,
            lm_state: self.lm_state.clone(),
            last_token: self.last_token,
            prev_blank: self.prev_blank,
        }
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn am_score(&self) -> f32 {
        self.am_score
    }

    pub fn lm_score(&self) -> f32 {
        self.lm_score
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn lm_state(&self) -> &S {
        &self.lm_state
    }

    pub fn last_token(&self) -> Option<usize> {
        self.last_token
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn tokens(&self) -> Vec<usize> {
        self.tokens.to_vec().into_iter().map(|(t, _)| t).collect()
    }

    pub fn timesteps(&self) -> Vec<usize> {
        self.tokens.to_vec().into_iter().map(|(_, t)| t).collect()
    }

    pub fn word_labels(&self) -> Vec<usize> {
        self.words.to_vec()
    }
}

/// Live hypotheses for one utterance, best first, unique by [`MergeKey`].
#[derive(Debug, Clone)]
pub struct Beam<S> {
    hyps: Vec<Hypothesis<S>>,
}

impl<S> Beam<S> {
    pub(crate) fn new(hyps: Vec<Hypothesis<S>>) -> Self {
        Self { hyps }
    }

    pub fn len(&self) -> usize {
        self.hyps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hyps.is_empty()
    }

    pub fn hypotheses(&self) -> &[Hypothesis<S>] {
        &self.hyps
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hypothesis<S>> {
        self.hyps.iter()
    }

    pub fn best(&self) -> Option<&Hypothesis<S>> {
        self.hyps.first()
    }

    pub(crate) fn into_hypotheses(self) -> Vec<Hypothesis<S>> {
        self.hyps
    }
}
