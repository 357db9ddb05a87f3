//! Fusion of several prediction files into one label file.
//!
//! Inputs are CSVs with a header and columns `qid1,qid2,score`; every input
//! must list the same pairs in the same order, and every score must be a
//! probability in `[0, 1]`. Outputs are written as
//! `qid1,qid2,label`, replacing any existing file.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("no input files given")]
    NoInputs,
    #[error("{path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path}: expected header starting with qid1,qid2 and a score column, found {found}")]
    BadHeader { path: PathBuf, found: String },
    #[error("{path}:{line}: score '{value}' is not a probability in [0, 1]")]
    BadScore {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("{path} has {found} rows but {reference} has {expected}")]
    RowCount {
        path: PathBuf,
        found: usize,
        reference: PathBuf,
        expected: usize,
    },
    #[error("{path}:{line}: pair ({qid1}, {qid2}) does not match ({expected_qid1}, {expected_qid2}) in the first input")]
    QidMismatch {
        path: PathBuf,
        line: usize,
        qid1: String,
        qid2: String,
        expected_qid1: String,
        expected_qid2: String,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub threshold: f32,
}

impl EnsembleConfig {
    pub fn new(inputs: Vec<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            inputs,
            output: output.into(),
            threshold: 0.5,
        }
    }
}

/// One prediction file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreFile {
    pub ids: Vec<(String, String)>,
    pub scores: Vec<f32>,
}

pub fn read_scores(path: &Path) -> Result<ScoreFile, EnsembleError> {
    let read_err = |source: csv::Error| EnsembleError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(read_err)?;
    let headers = reader.headers().map_err(read_err)?.clone();
    if headers.len() < 3
        || headers.get(0).map(str::trim) != Some("qid1")
        || headers.get(1).map(str::trim) != Some("qid2")
    {
        return Err(EnsembleError::BadHeader {
            path: path.to_path_buf(),
            found: headers.iter().collect::<Vec<_>>().join(","),
        });
    }

    let mut file = ScoreFile {
        ids: Vec::new(),
        scores: Vec::new(),
    };
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(read_err)?;
        let raw = record.get(2).unwrap_or("").trim();
        // NaN fails the range check.
        let score = raw
            .parse::<f32>()
            .ok()
            .filter(|score| (0.0..=1.0).contains(score))
            .ok_or_else(|| EnsembleError::BadScore {
                path: path.to_path_buf(),
                line: row + 2,
                value: raw.to_string(),
            })?;
        file.ids.push((
            record.get(0).unwrap_or("").to_string(),
            record.get(1).unwrap_or("").to_string(),
        ));
        file.scores.push(score);
    }
    Ok(file)
}

/// Reads every input and checks that they describe the same pairs.
fn load_aligned(inputs: &[PathBuf]) -> Result<Vec<ScoreFile>, EnsembleError> {
    let (first_path, rest) = inputs.split_first().ok_or(EnsembleError::NoInputs)?;
    let first = read_scores(first_path)?;
    let mut files = vec![first];
    for path in rest {
        let file = read_scores(path)?;
        let reference = &files[0];
        if file.scores.len() != reference.scores.len() {
            return Err(EnsembleError::RowCount {
                path: path.clone(),
                found: file.scores.len(),
                reference: first_path.clone(),
                expected: reference.scores.len(),
            });
        }
        if let Some((row, (found, expected))) = file
            .ids
            .iter()
            .zip(&reference.ids)
            .enumerate()
            .find(|(_, (found, expected))| found != expected)
        {
            return Err(EnsembleError::QidMismatch {
                path: path.clone(),
                line: row + 2,
                qid1: found.0.clone(),
                qid2: found.1.clone(),
                expected_qid1: expected.0.clone(),
                expected_qid2: expected.1.clone(),
            });
        }
        files.push(file);
    }
    Ok(files)
}

/// Geometric mean of the scores of one row.
pub fn geometric_mean(scores: &[f32]) -> f64 {
    let product: f64 = scores.iter().map(|&s| s as f64).product();
    product.powf(1.0 / scores.len() as f64)
}

/// `1` when strictly more scores exceed `threshold` than do not.
pub fn vote(scores: &[f32], threshold: f32) -> u8 {
    let positive = scores.iter().filter(|&&s| s > threshold).count();
    u8::from(positive > scores.len() - positive)
}

/// Labels each pair `1` when the geometric mean of its scores exceeds the threshold.
pub fn geometric_fusion(config: &EnsembleConfig) -> Result<Vec<u8>, EnsembleError> {
    combine(config, "geometric", |scores| {
        u8::from(geometric_mean(scores) > config.threshold as f64)
    })
}

/// Labels each pair by strict majority of per-file thresholded scores; ties give `0`.
pub fn majority_vote(config: &EnsembleConfig) -> Result<Vec<u8>, EnsembleError> {
    combine(config, "vote", |scores| vote(scores, config.threshold))
}

fn combine(
    config: &EnsembleConfig,
    method: &str,
    decide: impl Fn(&[f32]) -> u8,
) -> Result<Vec<u8>, EnsembleError> {
    let files = load_aligned(&config.inputs)?;
    let rows = files[0].scores.len();
    let mut row_scores = Vec::with_capacity(files.len());
    let labels: Vec<u8> = (0..rows)
        .map(|row| {
            row_scores.clear();
            row_scores.extend(files.iter().map(|file| file.scores[row]));
            decide(&row_scores)
        })
        .collect();

    write_labels(&config.output, &files[0].ids, &labels)?;
    log::info!(
        "{method} ensemble of {} files wrote {rows} labels to {}",
        files.len(),
        config.output.display()
    );
    Ok(labels)
}

fn write_labels(path: &Path, ids: &[(String, String)], labels: &[u8]) -> Result<(), EnsembleError> {
    let write_err = |source: csv::Error| EnsembleError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(write_err)?;
    writer.write_record(["qid1", "qid2", "label"]).map_err(write_err)?;
    for ((qid1, qid2), label) in ids.iter().zip(labels) {
        let label = label.to_string();
        writer
            .write_record([qid1.as_str(), qid2.as_str(), label.as_str()])
            .map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|err| write_err(csv::Error::from(err)))?;
    Ok(())
}
