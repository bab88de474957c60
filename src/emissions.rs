use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::Array3;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum EmissionsFile {
    Batch(Vec<Vec<Vec<f32>>>),
    Single(Vec<Vec<f32>>),
}

/// Utterances padded to a common length, with each one's real frame count.
pub struct Emissions {
    pub data: Array3<f32>,
    pub lengths: Vec<usize>,
}

pub fn load<P: AsRef<Path>>(path: P, width: usize) -> Result<Emissions> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read emissions from {}", path.display()))?;
    let file: EmissionsFile = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON emission matrix", path.display()))?;
    let utterances = match file {
        EmissionsFile::Batch(batch) => batch,
        EmissionsFile::Single(single) => vec![single],
    };
    let emissions = pad(utterances, width)?;
    log::info!(
        "Loaded {} utterance(s) of up to {} frames from {}",
        emissions.lengths.len(),
        emissions.data.shape()[1],
        path.display()
    );
    Ok(emissions)
}

fn pad(utterances: Vec<Vec<Vec<f32>>>, width: usize) -> Result<Emissions> {
    let lengths: Vec<usize> = utterances.iter().map(Vec::len).collect();
    let frames = lengths.iter().copied().max().unwrap_or(0);
    let mut data = Array3::zeros((utterances.len(), frames, width));

    for (i, utterance) in utterances.into_iter().enumerate() {
        for (t, row) in utterance.into_iter().enumerate() {
            if row.len() != width {
                bail!(
                    "utterance {i}, frame {t} has {} scores but the token list has {width}",
                    row.len()
                );
            }
            for (v, score) in row.into_iter().enumerate() {
                data[[i, t, v]] = score;
            }
        }
    }

    Ok(Emissions { data, lengths })
}
