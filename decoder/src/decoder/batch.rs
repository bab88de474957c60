use std::thread;

use ndarray::{ArrayView3, Axis};

use super::result::DecodeResult;
use super::Decoder;
use crate::error::DecodeError;
use crate::lm::LanguageModel;

const THREAD_ENV: &str = "LEXBEAM_THREADS";

fn resolve_thread_count(jobs: usize) -> usize {
    std::env::var(THREAD_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(num_cpus::get_physical)
        .clamp(1, jobs.max(1))
}

pub type UtteranceResult = Result<Vec<DecodeResult>, DecodeError>;

impl<L: LanguageModel + Sync> Decoder<L> {
    /// Decodes a `B x T x V` batch, one result per utterance in input order.
    ///
    /// `lengths[i]` limits utterance `i` to its first frames (padding is
    /// ignored); missing lengths use all `T` frames. Utterances run in parallel
    /// and fail independently.
    pub fn decode_batch(
        &self,
        emissions: ArrayView3<f32>,
        lengths: Option<&[usize]>,
    ) -> Vec<UtteranceResult> {
        let batch = emissions.len_of(Axis(0));
        let frames = emissions.len_of(Axis(1));
        let threads = resolve_thread_count(batch);
        log::debug!("Decoding batch of {batch} utterance(s) on {threads} thread(s)");

        let decode_one = |i: usize| -> UtteranceResult {
            let length = lengths.and_then(|l| l.get(i)).copied().unwrap_or(frames);
            if length > frames {
                return Err(DecodeError::LengthExceedsFrames { length, frames });
            }
            let utterance = emissions.index_axis(Axis(0), i);
            self.decode(utterance.slice(ndarray::s![..length, ..]))
        };

        if threads <= 1 {
            return (0..batch).map(decode_one).collect();
        }

        let mut indexed: Vec<(usize, UtteranceResult)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|worker| {
                    let decode_one = &decode_one;
                    scope.spawn(move || {
                        (worker..batch)
                            .step_by(threads)
                            .map(|i| (i, decode_one(i)))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| match h.join() {
                    Ok(done) => done,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        indexed.sort_by_key(|(i, _)| *i);
        indexed.into_iter().map(|(_, r)| r).collect()
    }
}
