use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{LexiconEntry, LexiconError};
use crate::util::log_add;

/// Handle to a node in the trie arena. Only valid for the trie that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// How node lookahead scores are derived from the words below them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmearingMode {
    None,
    #[default]
    Max,
    LogAdd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordMarker {
    pub label: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
struct Node {
    children: HashMap<usize, NodeId>,
    words: Vec<WordMarker>,
    lookahead: f32,
}

/// Prefix tree over token spellings. Nodes live in one arena and are addressed
/// by [`NodeId`]; a child is always allocated after its parent.
#[derive(Debug, Clone)]
pub struct Trie {
    nodes: Vec<Node>,
    vocab_size: usize,
}

impl Trie {
    pub fn build(entries: &[LexiconEntry], vocab_size: usize) -> Result<Self, LexiconError> {
        let mut trie = Self {
            nodes: vec![Node::default()],
            vocab_size,
        };
        for entry in entries {
            trie.insert(entry)?;
        }
        log::debug!(
            "Built lexicon trie: {} entries, {} nodes",
            entries.len(),
            trie.nodes.len()
        );
        Ok(trie)
    }

    fn insert(&mut self, entry: &LexiconEntry) -> Result<(), LexiconError> {
        if entry.tokens.is_empty() {
            return Err(LexiconError::EmptySpelling {
                word: entry.word.clone(),
            });
        }
        if let Some(&index) = entry.tokens.iter().find(|&&t| t >= self.vocab_size) {
            return Err(LexiconError::TokenOutOfRange {
                word: entry.word.clone(),
                index,
                size: self.vocab_size,
            });
        }

        let mut node = NodeId::ROOT;
        for &token in &entry.tokens {
            node = match self.nodes[node.index()].children.get(&token) {
                Some(&child) => child,
                None => {
                    let child = NodeId(self.nodes.len() as u32);
                    self.nodes.push(Node::default());
                    self.nodes[node.index()].children.insert(token, child);
                    child
                }
            };
        }
        self.nodes[node.index()].words.push(WordMarker {
            label: entry.label,
            score: 0.0,
        });
        Ok(())
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn child(&self, node: NodeId, token: usize) -> Option<NodeId> {
        self.nodes.get(node.index())?.children.get(&token).copied()
    }

    /// Words spelled exactly by the path to `node`, in declaration order.
    pub fn words(&self, node: NodeId) -> &[WordMarker] {
        self.nodes
            .get(node.index())
            .map(|n| n.words.as_slice())
            .unwrap_or_default()
    }

    pub fn is_word_end(&self, node: NodeId) -> bool {
        !self.words(node).is_empty()
    }

    pub fn has_children(&self, node: NodeId) -> bool {
        self.nodes
            .get(node.index())
            .is_some_and(|n| !n.children.is_empty())
    }

    /// Smeared lookahead score of `node`. The root is the baseline and scores 0.
    pub fn lookahead(&self, node: NodeId) -> f32 {
        if node == NodeId::ROOT {
            return 0.0;
        }
        self.nodes
            .get(node.index())
            .map(|n| n.lookahead)
            .unwrap_or(0.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Assigns every word marker its auxiliary score and recomputes lookaheads.
    pub fn smear<F>(&mut self, mode: SmearingMode, word_score: F)
    where
        F: Fn(usize) -> f32,
    {
        for node in &mut self.nodes {
            for marker in &mut node.words {
                marker.score = word_score(marker.label);
            }
        }

        // Children always have larger ids than their parent.
        for i in (0..self.nodes.len()).rev() {
            let lookahead = match mode {
                SmearingMode::None => 0.0,
                SmearingMode::Max | SmearingMode::LogAdd => {
                    let node = &self.nodes[i];
                    let own = node.words.iter().map(|w| w.score);
                    let below = node
                        .children
                        .values()
                        .map(|c| self.nodes[c.index()].lookahead);
                    let combine = |acc: f32, s: f32| match mode {
                        SmearingMode::LogAdd => log_add(acc, s),
                        _ => acc.max(s),
                    };
                    own.chain(below).fold(f32::NEG_INFINITY, combine)
                }
            };
            self.nodes[i].lookahead = lookahead;
        }
    }
}
