#![allow(dead_code)]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use lexbeam_decoder::{DecoderOptions, Lexicon, Vocabulary};
use ndarray::Array2;

pub const BLANK: usize = 0;
pub const SEP: usize = 1;
pub const A: usize = 2;
pub const B: usize = 3;
pub const C: usize = 4;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `_ | a b c`
pub fn vocab() -> Vocabulary {
    Vocabulary::new(
        ["_", "|", "a", "b", "c"].iter().map(|s| s.to_string()).collect(),
        "_",
        "|",
    )
    .expect("vocabulary should build")
}

pub fn lexicon(vocab: &Vocabulary, words: &[(&str, &[usize])]) -> Lexicon {
    Lexicon::from_entries(
        words.iter().map(|(w, tokens)| (w.to_string(), tokens.to_vec())),
        vocab,
    )
    .expect("lexicon should build")
}

/// Options with no language model influence and a plain max merge.
pub fn plain_options(beam_size: usize, nbest: usize) -> DecoderOptions {
    DecoderOptions {
        nbest,
        beam_size,
        lm_weight: 0.0,
        word_score: 0.0,
        sil_score: 0.0,
        log_add: false,
        ..Default::default()
    }
}

/// Rows of probabilities to log-probabilities.
pub fn log_probs(rows: &[&[f32]]) -> Array2<f32> {
    let width = rows.first().map_or(0, |r| r.len());
    Array2::from_shape_fn((rows.len(), width), |(t, v)| rows[t][v].ln())
}

/// One frame that puts `p` on `token` and spreads the rest evenly.
pub fn peaked(token: usize, p: f32, width: usize) -> Vec<f32> {
    let rest = (1.0 - p) / (width - 1) as f32;
    (0..width).map(|v| if v == token { p } else { rest }).collect()
}

pub fn peaked_frames(tokens: &[usize], p: f32, width: usize) -> Array2<f32> {
    let rows: Vec<Vec<f32>> = tokens.iter().map(|&t| peaked(t, p, width)).collect();
    let refs: Vec<&[f32]> = rows.iter().map(Vec::as_slice).collect();
    log_probs(&refs)
}

/// Linear congruential generator yielding floats in [0, 1).
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(2862933555777941757).wrapping_add(3037000493))
    }

    pub fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 40) as f32 / (1u64 << 24) as f32
    }
}

/// Random log-softmax frames.
pub fn random_emissions(seed: u64, frames: usize, width: usize) -> Array2<f32> {
    let mut rng = Lcg::new(seed);
    let mut out = Array2::zeros((frames, width));
    for mut row in out.rows_mut() {
        for v in row.iter_mut() {
            *v = rng.next_f32() * 6.0;
        }
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        let norm = row.iter().map(|v| (v - max).exp()).sum::<f32>().ln() + max;
        row.mapv_inplace(|v| v - norm);
    }
    out
}

/// Argmax per frame, repeats collapsed, blanks removed.
pub fn greedy(emissions: &Array2<f32>, blank: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut prev = None;
    for row in emissions.rows() {
        let best = row
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc })
            .0;
        if Some(best) != prev && best != blank {
            out.push(best);
        }
        prev = Some(best);
    }
    out
}

pub fn temp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("lexbeam_{name}_{nanos}"))
}
