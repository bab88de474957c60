mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use lexbeam_decoder::{
    DecodeError, Decoder, DecoderOptions, LanguageModel, Lexicon, NgramLm, NgramModel, NoLm,
    PartialWordPolicy, UNK_WORD,
};
use ndarray::Array2;

const SAMPLE_WORDS: &[(&str, &[usize])] = &[
    ("ab", &[A, B]),
    ("ba", &[B, A]),
    ("abc", &[A, B, C]),
    ("cab", &[C, A, B]),
    ("c", &[C]),
];

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

#[test]
fn test_single_word_score_is_path_sum() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, &[("ab", &[A, B])]);
    let decoder = Decoder::new(plain_options(5, 1), vocab, Some(lexicon), NoLm).unwrap();

    let emissions = peaked_frames(&[BLANK, A, B, BLANK], 0.6, 5);
    let results = decoder.decode(emissions.view()).unwrap();

    assert_eq!(results.len(), 1);
    let best = &results[0];
    assert_eq!(best.tokens, vec![A, B]);
    assert_eq!(best.words, vec!["ab".to_string()]);
    assert_eq!(best.timesteps, vec![1, 2]);
    assert!(close(best.score, 4.0 * 0.6f32.ln()));
    assert!(close(best.am_score, best.score));
    assert_eq!(best.lm_score, 0.0);
}

#[test]
fn test_beam_one_matches_greedy_without_lexicon() {
    init_logging();
    let decoder = Decoder::new(plain_options(1, 1), vocab(), None, NoLm).unwrap();

    for seed in 0..20 {
        let emissions = random_emissions(seed, 15, 5);
        let results = decoder.decode(emissions.view()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tokens, greedy(&emissions, BLANK), "seed {seed}");
        assert!(results[0].words.is_empty());
    }
}

#[test]
fn test_beam_one_matches_greedy_with_lexicon() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, &[("ab", &[A, B]), ("ba", &[B, A])]);
    let decoder = Decoder::new(plain_options(1, 1), vocab, Some(lexicon), NoLm).unwrap();

    let path = [A, A, B, BLANK, SEP, B, BLANK, A];
    let emissions = peaked_frames(&path, 0.8, 5);
    let results = decoder.decode(emissions.view()).unwrap();

    assert_eq!(results[0].tokens, greedy(&emissions, BLANK));
    assert_eq!(results[0].tokens, vec![A, B, SEP, B, A]);
    assert_eq!(results[0].words, vec!["ab".to_string(), "ba".to_string()]);
    assert!(close(results[0].score, 8.0 * 0.8f32.ln()));
}

#[test]
fn test_lexicon_free_transcript_keeps_separators() {
    init_logging();
    let vocab = vocab();
    let decoder = Decoder::new(plain_options(4, 2), vocab.clone(), None, NoLm).unwrap();

    let emissions = peaked_frames(&[A, B, SEP, SEP, C, BLANK, C], 0.9, 5);
    let results = decoder.decode(emissions.view()).unwrap();

    assert_eq!(results[0].tokens, vec![A, B, SEP, C, C]);
    assert!(results[0].words.is_empty());
    assert_eq!(results[0].transcript(&vocab), "ab cc");
}

#[test]
fn test_results_are_bounded_and_sorted() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, SAMPLE_WORDS);
    let options = DecoderOptions {
        nbest: 5,
        beam_size: 8,
        unk_score: Some(-4.0),
        ..plain_options(8, 5)
    };
    let decoder = Decoder::new(options, vocab, Some(lexicon), NoLm).unwrap();

    for seed in 0..10 {
        let emissions = random_emissions(seed, 12, 5);
        let results = decoder.decode(emissions.view()).unwrap();
        assert!(results.len() <= 5);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score, "seed {seed}: not sorted");
        }
        for r in &results {
            assert_eq!(r.tokens.len(), r.timesteps.len());
            assert!(r.timesteps.windows(2).all(|w| w[0] < w[1]));
        }
    }
}

#[test]
fn test_decoding_is_deterministic() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, SAMPLE_WORDS);

    let mut model = NgramModel::new(2);
    model.insert(&["<s>"], -1.0, -0.3);
    model.insert(&["</s>"], -0.7, 0.0);
    model.insert(&["ab"], -0.8, -0.2);
    model.insert(&["ba"], -1.2, -0.2);
    model.insert(&["c"], -1.0, -0.2);
    model.insert(&["<s>", "ab"], -0.3, 0.0);
    model.insert(&["ab", "c"], -0.2, 0.0);
    let lm = NgramLm::for_lexicon(Arc::new(model), &lexicon);

    let options = DecoderOptions {
        nbest: 3,
        lm_weight: 1.0,
        word_score: 0.5,
        ..plain_options(10, 3)
    };
    let decoder = Decoder::new(options, vocab, Some(lexicon), lm).unwrap();

    let emissions = random_emissions(7, 20, 5);
    let first = decoder.decode(emissions.view()).unwrap();
    let second = decoder.decode(emissions.view()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_beam_stays_bounded_with_unique_keys() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, SAMPLE_WORDS);
    let options = DecoderOptions {
        unk_score: Some(-2.0),
        ..plain_options(3, 1)
    };
    let decoder = Decoder::new(options, vocab, Some(lexicon), NoLm).unwrap();

    let emissions = random_emissions(11, 25, 5);
    let mut session = decoder.session();
    for frame in emissions.rows() {
        session.step(frame).unwrap();
        let beam = session.beam();
        assert!(beam.len() <= 3);

        let keys: HashSet<_> = beam.iter().map(|h| h.merge_key()).collect();
        assert_eq!(keys.len(), beam.len());
        for hyp in beam.iter() {
            assert!(hyp.token_count() <= session.timestep());
            assert_eq!(hyp.tokens().len(), hyp.token_count());
        }
    }
    assert_eq!(session.timestep(), 25);
}

#[test]
fn test_unpruned_search_dominates_small_beams() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, SAMPLE_WORDS);

    let exhaustive = Decoder::new(
        DecoderOptions {
            beam_threshold: f32::INFINITY,
            ..plain_options(10_000, 1)
        },
        vocab.clone(),
        Some(lexicon.clone()),
        NoLm,
    )
    .unwrap();

    for seed in 0..8 {
        let emissions = random_emissions(100 + seed, 10, 5);
        let reference = exhaustive.decode(emissions.view()).unwrap();
        let reference = reference.first().map(|r| r.score);

        for beam_size in [1, 2, 4, 8] {
            let decoder = Decoder::new(
                plain_options(beam_size, 1),
                vocab.clone(),
                Some(lexicon.clone()),
                NoLm,
            )
            .unwrap();
            let results = decoder.decode(emissions.view()).unwrap();
            if let Some(found) = results.first() {
                let best = reference.expect("exhaustive search must find a path too");
                assert!(
                    best >= found.score - 1e-4,
                    "seed {seed} beam {beam_size}: {} beat {best}",
                    found.score
                );
            }
        }
    }
}

#[test]
fn test_words_come_from_lexicon() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, SAMPLE_WORDS);
    let decoder = Decoder::new(plain_options(16, 8), vocab, Some(lexicon.clone()), NoLm).unwrap();

    for seed in 0..10 {
        let emissions = random_emissions(200 + seed, 14, 5);
        for result in decoder.decode(emissions.view()).unwrap() {
            for word in &result.words {
                assert!(lexicon.contains(word), "seed {seed}: {word} not in lexicon");
            }
            // Every emitted token belongs to a spelled word or is a separator.
            let spelled: usize = result
                .words
                .iter()
                .map(|w| {
                    let label = lexicon.label_of(w).unwrap();
                    lexicon
                        .entries()
                        .iter()
                        .find(|e| e.label == label)
                        .unwrap()
                        .tokens
                        .len()
                })
                .sum();
            let separators = result.tokens.iter().filter(|&&t| t == SEP).count();
            assert_eq!(spelled + separators, result.tokens.len());
        }
    }
}

#[test]
fn test_unknown_word_fallback() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, &[("ab", &[A, B])]);
    let emissions = peaked_frames(&[B, A, SEP, A, B], 0.7, 5);

    let with_unk = Decoder::new(
        DecoderOptions {
            unk_score: Some(-1.0),
            ..plain_options(10, 1)
        },
        vocab.clone(),
        Some(lexicon.clone()),
        NoLm,
    )
    .unwrap();
    let results = with_unk.decode(emissions.view()).unwrap();
    assert_eq!(results[0].words, vec![UNK_WORD.to_string(), "ab".to_string()]);
    assert_eq!(results[0].tokens, vec![B, A, SEP, A, B]);
    assert!(close(results[0].score, 5.0 * 0.7f32.ln() - 1.0));

    let without_unk = Decoder::new(plain_options(10, 5), vocab, Some(lexicon), NoLm).unwrap();
    for result in without_unk.decode(emissions.view()).unwrap() {
        assert!(!result.words.iter().any(|w| w == UNK_WORD));
    }
}

#[test]
fn test_partial_word_policy() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, &[("abc", &[A, B, C])]);
    let emissions = peaked_frames(&[A, B], 0.9, 5);

    let discard = Decoder::new(plain_options(10, 1), vocab.clone(), Some(lexicon.clone()), NoLm)
        .unwrap();
    let results = discard.decode(emissions.view()).unwrap();
    assert!(results.iter().all(|r| r.tokens != vec![A, B]));

    let penalty = Decoder::new(
        DecoderOptions {
            partial_word: PartialWordPolicy::Penalty(-3.0),
            ..plain_options(10, 1)
        },
        vocab,
        Some(lexicon),
        NoLm,
    )
    .unwrap();
    let results = penalty.decode(emissions.view()).unwrap();
    assert_eq!(results[0].tokens, vec![A, B]);
    assert!(results[0].words.is_empty());
    assert!(close(results[0].score, 2.0 * 0.9f32.ln() - 3.0));
}

#[test]
fn test_exhausted_beam_returns_no_results() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, &[("ab", &[A, B])]);
    let decoder = Decoder::new(plain_options(5, 1), vocab, Some(lexicon), NoLm).unwrap();

    // Only `b` is possible, and no word starts with it.
    let mut emissions = Array2::from_elem((3, 5), f32::NEG_INFINITY);
    emissions.column_mut(B).fill(0.0);
    let results = decoder.decode(emissions.view()).unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_empty_utterance() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, &[("ab", &[A, B])]);
    let decoder = Decoder::new(plain_options(5, 1), vocab, Some(lexicon), NoLm).unwrap();

    let results = decoder.decode(Array2::<f32>::zeros((0, 5)).view()).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].tokens.is_empty());
    assert!(results[0].words.is_empty());
    assert_eq!(results[0].score, 0.0);
}

#[test]
fn test_lm_cache_does_not_change_results() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, SAMPLE_WORDS);

    let mut model = NgramModel::new(2);
    for (word, p) in [("ab", -0.6), ("ba", -0.9), ("abc", -1.4), ("cab", -1.1), ("c", -0.8)] {
        model.insert(&[word], p, -0.25);
    }
    model.insert(&["ab", "c"], -0.1, 0.0);
    model.insert(&["c", "ba"], -0.3, 0.0);
    let lm = NgramLm::for_lexicon(Arc::new(model), &lexicon);

    let build = |cache: bool| {
        Decoder::new(
            DecoderOptions {
                lm_weight: 1.5,
                cache_lm_scores: cache,
                ..plain_options(12, 4)
            },
            vocab.clone(),
            Some(lexicon.clone()),
            lm.clone(),
        )
        .unwrap()
    };
    let cached = build(true);
    let uncached = build(false);

    for seed in 0..5 {
        let emissions = random_emissions(300 + seed, 18, 5);
        assert_eq!(
            cached.decode(emissions.view()).unwrap(),
            uncached.decode(emissions.view()).unwrap()
        );
    }

    let emissions = random_emissions(300, 18, 5);
    let mut session = cached.session();
    session.step_all(emissions.view(), None).unwrap();
    assert!(session.cache().hits() > 0);
}

/// Rewards one word label and penalizes everything else.
struct FavorLm {
    favored: usize,
    finishes: AtomicUsize,
}

impl LanguageModel for FavorLm {
    type State = ();

    fn start(&self, _start_with_nothing: bool) -> Self::State {}

    fn score(&self, _state: &(), label: usize) -> ((), f32) {
        ((), if label == self.favored { 0.0 } else { -5.0 })
    }

    fn finish(&self, _state: &()) -> ((), f32) {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        ((), 0.0)
    }
}

#[test]
fn test_custom_language_model_changes_ranking() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, &[("ab", &[A, B]), ("ba", &[B, A])]);
    let emissions = log_probs(&[
        &[0.05, 0.05, 0.5, 0.35, 0.05],
        &[0.05, 0.05, 0.35, 0.5, 0.05],
    ]);
    let lm = FavorLm {
        favored: lexicon.label_of("ba").unwrap(),
        finishes: AtomicUsize::new(0),
    };

    let acoustic =
        Decoder::new(plain_options(10, 2), vocab.clone(), Some(lexicon.clone()), &lm).unwrap();
    let results = acoustic.decode(emissions.view()).unwrap();
    assert_eq!(results[0].words, vec!["ab".to_string()]);

    let weighted = Decoder::new(
        DecoderOptions {
            lm_weight: 1.0,
            ..plain_options(20, 10)
        },
        vocab,
        Some(lexicon),
        &lm,
    )
    .unwrap();
    let results = weighted.decode(emissions.view()).unwrap();
    assert_eq!(results[0].words, vec!["ba".to_string()]);
    assert!(close(results[0].score, (0.35f32 * 0.35).ln()));
    assert!(close(results[0].lm_score, 0.0));

    let disfavored = results
        .iter()
        .find(|r| r.words == ["ab"])
        .expect("ab should still be ranked");
    assert!(close(disfavored.lm_score, -5.0));
    assert!(close(disfavored.am_score, 0.25f32.ln()));
}

#[test]
fn test_finish_runs_once_per_surviving_hypothesis() {
    init_logging();
    let lm = FavorLm {
        favored: A,
        finishes: AtomicUsize::new(0),
    };
    let decoder = Decoder::new(
        DecoderOptions {
            lm_weight: 0.5,
            ..plain_options(6, 1)
        },
        vocab(),
        None,
        &lm,
    )
    .unwrap();

    let emissions = random_emissions(42, 10, 5);
    let mut session = decoder.session();
    session.step_all(emissions.view(), None).unwrap();
    let survivors = session.beam().len();
    assert!(survivors > 0);

    let results = session.finish();
    assert_eq!(lm.finishes.load(Ordering::SeqCst), survivors);
    assert_eq!(results.len(), 1);
}

#[test]
fn test_best_tracks_partial_result() {
    init_logging();
    let vocab = vocab();
    let lexicon = lexicon(&vocab, &[("ab", &[A, B])]);
    let decoder = Decoder::new(plain_options(5, 1), vocab, Some(lexicon), NoLm).unwrap();

    let emissions = peaked_frames(&[A, B], 0.9, 5);
    let mut session = decoder.session();
    session.step(emissions.row(0)).unwrap();
    let partial = session.best().unwrap();
    assert_eq!(partial.tokens, vec![A]);
    assert!(partial.words.is_empty());

    session.step(emissions.row(1)).unwrap();
    let results = session.finish();
    assert_eq!(results[0].words, vec!["ab".to_string()]);
}

#[test]
fn test_dimension_mismatch_is_reported() {
    init_logging();
    let decoder = Decoder::new(plain_options(5, 1), vocab(), None, NoLm).unwrap();
    let emissions = Array2::<f32>::zeros((4, 3));
    assert_eq!(
        decoder.decode(emissions.view()),
        Err(DecodeError::DimensionMismatch {
            timestep: 0,
            expected: 5,
            found: 3,
        })
    );
}

#[test]
fn test_deadline_stops_decoding() {
    init_logging();
    let decoder = Decoder::new(plain_options(5, 1), vocab(), None, NoLm).unwrap();
    let emissions = random_emissions(1, 6, 5);

    let past = Instant::now();
    assert_eq!(
        decoder.decode_until(emissions.view(), past),
        Err(DecodeError::DeadlineExceeded { timestep: 0 })
    );

    let later = Instant::now() + Duration::from_secs(60);
    assert!(decoder.decode_until(emissions.view(), later).is_ok());
}

#[test]
fn test_nbest_transcripts_are_distinct() {
    init_logging();
    let rest = 0.1 / 3.0;
    let a = peaked(A, 0.9, 5);
    let b = peaked(B, 0.9, 5);
    let last = [0.45, rest, rest, 0.45, rest];
    let emissions = log_probs(&[&a, &b, &last]);

    // Every alignment of `a b` over the three frames.
    let ab_paths: [f32; 5] = [
        0.9 * 0.9 * 0.45,     // a b _
        0.9 * 0.9 * 0.45,     // a b b
        0.9 * 0.025 * 0.45,   // a a b
        0.9 * 0.025 * 0.45,   // a _ b
        0.025 * 0.025 * 0.45, // _ a b
    ];
    let best_path = ab_paths[0];

    for log_add in [false, true] {
        let vocab = vocab();
        let lexicon = lexicon(&vocab, &[("ab", &[A, B])]);
        let options = DecoderOptions {
            log_add,
            ..plain_options(10, 3)
        };
        let decoder = Decoder::new(options, vocab, Some(lexicon), NoLm).unwrap();
        let results = decoder.decode(emissions.view()).unwrap();

        let distinct: HashSet<_> = results.iter().map(|r| (&r.tokens, &r.words)).collect();
        assert_eq!(distinct.len(), results.len(), "log_add={log_add}");

        let ab: Vec<_> = results.iter().filter(|r| r.tokens == vec![A, B]).collect();
        assert_eq!(ab.len(), 1, "log_add={log_add}");
        assert_eq!(ab[0].words, vec!["ab".to_string()]);
        assert_eq!(results[0].tokens, vec![A, B]);

        let expected = if log_add {
            ab_paths.iter().sum::<f32>().ln()
        } else {
            best_path.ln()
        };
        assert!(close(ab[0].score, expected), "log_add={log_add}: {}", ab[0].score);
    }
}

#[test]
fn test_empty_lexicon_decodes_lexicon_free() {
    init_logging();
    let vocab = vocab();
    let lexicon = Lexicon::parse("", &vocab).unwrap();
    assert!(lexicon.entries().is_empty());

    let decoder = Decoder::new(plain_options(8, 1), vocab, Some(lexicon), NoLm).unwrap();
    assert!(decoder.lexicon().is_none());

    let emissions = peaked_frames(&[A, B, BLANK, C], 0.9, 5);
    let results = decoder.decode(emissions.view()).unwrap();
    assert_eq!(results[0].tokens, vec![A, B, C]);
    assert_eq!(results[0].tokens, greedy(&emissions, BLANK));
    assert!(results[0].words.is_empty());
}
