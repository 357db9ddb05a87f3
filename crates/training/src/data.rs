//! Sentence-pair datasets and batching.
//!
//! Files are CSVs with a header row and columns `qid1,qid2,q1,q2[,label]`,
//! where `q1`/`q2` hold space-separated token ids. Every sequence is padded
//! with `pad_id` or truncated to `max_len` when loaded.

use std::path::Path;

use candle_core::{Device, Tensor};
use model::PairBatch;
use rand::{rngs::StdRng, seq::SliceRandom};

use crate::TrainingError;

#[derive(Debug, Clone, PartialEq)]
pub struct PairExample {
    pub qid1: String,
    pub qid2: String,
    pub q1: Vec<u32>,
    pub q2: Vec<u32>,
    pub label: Option<u8>,
}

/// One model-ready batch plus the bookkeeping needed for reports and exports.
#[derive(Debug, Clone)]
pub struct LabeledBatch {
    pub pair: PairBatch,
    /// `(batch, 1)` f32 targets when every example is labelled.
    pub labels: Option<Tensor>,
    pub ids: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct PairDataset {
    examples: Vec<PairExample>,
    max_len: usize,
}

impl PairDataset {
    pub fn from_examples(
        mut examples: Vec<PairExample>,
        max_len: usize,
        pad_id: u32,
    ) -> Result<Self, TrainingError> {
        if max_len == 0 {
            return Err(TrainingError::initialization("max_len must be greater than 0"));
        }
        for example in &mut examples {
            pad_or_truncate(&mut example.q1, max_len, pad_id);
            pad_or_truncate(&mut example.q2, max_len, pad_id);
        }
        Ok(Self { examples, max_len })
    }

    pub fn from_csv(path: impl AsRef<Path>, max_len: usize, pad_id: u32) -> Result<Self, TrainingError> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path).map_err(|err| csv_error(path, err))?;
        let headers = reader.headers().map_err(|err| csv_error(path, err))?.clone();
        let expected = ["qid1", "qid2", "q1", "q2"];
        if headers.len() < expected.len()
            || headers.iter().zip(expected).any(|(found, want)| found.trim() != want)
        {
            return Err(TrainingError::initialization(format!(
                "{}: expected header qid1,qid2,q1,q2[,label], found {:?}",
                path.display(),
                headers
            )));
        }

        let mut examples = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|err| csv_error(path, err))?;
            let line = row + 2;
            let field = |idx: usize| record.get(idx).unwrap_or("").trim();
            let label = match field(4) {
                "" => None,
                raw => Some(parse_label(raw).ok_or_else(|| {
                    TrainingError::initialization(format!(
                        "{}:{line}: label must be 0 or 1, got '{raw}'",
                        path.display()
                    ))
                })?),
            };
            examples.push(PairExample {
                qid1: field(0).to_string(),
                qid2: field(1).to_string(),
                q1: parse_ids(field(2)).map_err(|msg| {
                    TrainingError::initialization(format!("{}:{line}: q1 {msg}", path.display()))
                })?,
                q2: parse_ids(field(3)).map_err(|msg| {
                    TrainingError::initialization(format!("{}:{line}: q2 {msg}", path.display()))
                })?,
                label,
            });
        }
        log::info!("loaded {} pairs from {}", examples.len(), path.display());
        Self::from_examples(examples, max_len, pad_id)
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn examples(&self) -> &[PairExample] {
        &self.examples
    }

    pub fn is_labeled(&self) -> bool {
        !self.examples.is_empty() && self.examples.iter().all(|ex| ex.label.is_some())
    }

    pub fn labels(&self) -> Option<Vec<u8>> {
        self.examples.iter().map(|ex| ex.label).collect()
    }

    /// Example indices grouped into batches, optionally shuffled first.
    pub fn batch_indices(&self, batch_size: usize, rng: Option<&mut StdRng>) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.examples.len()).collect();
        if let Some(rng) = rng {
            order.shuffle(rng);
        }
        order
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    pub fn batch(&self, indices: &[usize], device: &Device) -> Result<LabeledBatch, TrainingError> {
        if indices.is_empty() {
            return Err(TrainingError::runtime("cannot build an empty batch"));
        }
        let rows = indices.len();
        let mut q1 = Vec::with_capacity(rows * self.max_len);
        let mut q2 = Vec::with_capacity(rows * self.max_len);
        let mut labels = Vec::with_capacity(rows);
        let mut ids = Vec::with_capacity(rows);
        for &idx in indices {
            let example = self.examples.get(idx).ok_or_else(|| {
                TrainingError::runtime(format!("example index {idx} out of range"))
            })?;
            q1.extend_from_slice(&example.q1);
            q2.extend_from_slice(&example.q2);
            labels.push(example.label);
            ids.push((example.qid1.clone(), example.qid2.clone()));
        }

        let q1 = Tensor::from_vec(q1, (rows, self.max_len), device)?;
        let q2 = Tensor::from_vec(q2, (rows, self.max_len), device)?;
        let labels = labels
            .into_iter()
            .map(|label| label.map(f32::from))
            .collect::<Option<Vec<_>>>()
            .map(|values| Tensor::from_vec(values, (rows, 1), device))
            .transpose()?;

        Ok(LabeledBatch {
            pair: PairBatch::words(q1, q2),
            labels,
            ids,
        })
    }
}

pub fn pad_or_truncate(ids: &mut Vec<u32>, max_len: usize, pad_id: u32) {
    ids.truncate(max_len);
    ids.resize(max_len, pad_id);
}

fn parse_ids(raw: &str) -> Result<Vec<u32>, String> {
    raw.split_whitespace()
        .map(|tok| {
            tok.parse::<u32>()
                .map_err(|_| format!("has non-integer token id '{tok}'"))
        })
        .collect()
}

fn parse_label(raw: &str) -> Option<u8> {
    match raw.parse::<f32>().ok()? {
        v if v == 0.0 => Some(0),
        v if v == 1.0 => Some(1),
        _ => None,
    }
}

fn csv_error(path: &Path, err: csv::Error) -> TrainingError {
    TrainingError::initialization(format!("{}: {err}", path.display()))
}
