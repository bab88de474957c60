//! `lexbeam`: decode CTC emission matrices from the command line and print the
//! ranked results as JSON.

mod cli;
mod emissions;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use lexbeam_decoder::{
    DecodeResult, Decoder, DecoderOptions, LanguageModel, Lexicon, NgramLm, NgramModel, NoLm,
    Vocabulary,
};

use cli::Args;
use emissions::Emissions;

#[derive(Serialize)]
struct Ranked {
    transcript: String,
    #[serde(flatten)]
    result: DecodeResult,
}

#[derive(Serialize)]
struct UtteranceOutput {
    index: usize,
    results: Vec<Ranked>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let options = args.decoder_options().context("invalid decoder options")?;
    let vocab = Vocabulary::load(&args.tokens, &args.blank, &args.separator)
        .with_context(|| format!("failed to load tokens from {}", args.tokens.display()))?;
    let lexicon = args
        .lexicon
        .as_ref()
        .map(|path| {
            Lexicon::load(path, &vocab)
                .with_context(|| format!("failed to load lexicon from {}", path.display()))
        })
        .transpose()?;
    let emissions = emissions::load(&args.emissions, vocab.len())?;

    let outputs = match &args.lm {
        Some(path) => {
            let model = NgramModel::load_arpa(path)
                .with_context(|| format!("failed to load language model from {}", path.display()))?;
            let model = Arc::new(model);
            let lm = match &lexicon {
                Some(lexicon) => NgramLm::for_lexicon(model, lexicon),
                None => NgramLm::for_vocabulary(model, &vocab),
            };
            run(options, vocab, lexicon, lm, &emissions)?
        }
        None => run(options, vocab, lexicon, NoLm, &emissions)?,
    };

    println!("{}", serde_json::to_string_pretty(&outputs)?);
    Ok(())
}

fn run<L: LanguageModel + Sync>(
    options: DecoderOptions,
    vocab: Vocabulary,
    lexicon: Option<Lexicon>,
    lm: L,
    emissions: &Emissions,
) -> Result<Vec<UtteranceOutput>> {
    let decoder = Decoder::new(options, vocab, lexicon, lm).map_err(|e| {
        let hint = e.user_message();
        anyhow::Error::new(e).context(hint)
    })?;

    let results = decoder.decode_batch(emissions.data.view(), Some(emissions.lengths.as_slice()));
    let outputs = results
        .into_iter()
        .enumerate()
        .map(|(index, result)| match result {
            Ok(ranked) => UtteranceOutput {
                index,
                results: ranked
                    .into_iter()
                    .map(|result| Ranked {
                        transcript: result.transcript(decoder.vocabulary()),
                        result,
                    })
                    .collect(),
                error: None,
            },
            Err(e) => {
                log::warn!("Utterance {index} failed: {e}");
                UtteranceOutput {
                    index,
                    results: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        })
        .collect();
    Ok(outputs)
}
