//! Classification metrics for binary match labels.
//!
//! Class `0` is reported as "Good" and class `1` as "Bad".

use crate::TrainingError;

pub const NUM_CLASSES: usize = 2;

/// Confusion matrix and derived scores.
///
/// `matrix[i][j]` counts examples with label `i` predicted as `j`; row and
/// column index [`NUM_CLASSES`] hold the sums.
#[derive(Debug, Clone, PartialEq)]
pub struct PrfReport {
    pub matrix: [[u64; NUM_CLASSES + 1]; NUM_CLASSES + 1],
    pub acc: f64,
    /// Per-class `[precision, recall, f1]`, each indexed by class.
    pub each_prf: [[f64; NUM_CLASSES]; 3],
    /// Macro `[precision, recall, f1]`.
    pub macro_prf: [f64; 3],
}

/// Computes the confusion matrix, accuracy, per-class and macro P/R/F1.
///
/// Any ratio with a zero denominator is reported as `0`.
pub fn prf(labels: &[u8], predictions: &[u8]) -> Result<PrfReport, TrainingError> {
    if labels.len() != predictions.len() {
        return Err(TrainingError::runtime(format!(
            "labels ({}) and predictions ({}) differ in length",
            labels.len(),
            predictions.len()
        )));
    }
    let mut matrix = [[0u64; NUM_CLASSES + 1]; NUM_CLASSES + 1];
    for (&label, &predict) in labels.iter().zip(predictions) {
        let (i, j) = (label as usize, predict as usize);
        if i >= NUM_CLASSES || j >= NUM_CLASSES {
            return Err(TrainingError::runtime(format!(
                "labels and predictions must be 0 or 1, got {label} and {predict}"
            )));
        }
        matrix[i][j] += 1;
    }
    for i in 0..NUM_CLASSES {
        matrix[i][NUM_CLASSES] = matrix[i][..NUM_CLASSES].iter().sum();
    }
    for j in 0..=NUM_CLASSES {
        matrix[NUM_CLASSES][j] = (0..NUM_CLASSES).map(|i| matrix[i][j]).sum();
    }

    let correct: u64 = (0..NUM_CLASSES).map(|i| matrix[i][i]).sum();
    let acc = ratio(correct, matrix[NUM_CLASSES][NUM_CLASSES]);

    let mut each_prf = [[0.0; NUM_CLASSES]; 3];
    for i in 0..NUM_CLASSES {
        let p = ratio(matrix[i][i], matrix[NUM_CLASSES][i]);
        let r = ratio(matrix[i][i], matrix[i][NUM_CLASSES]);
        each_prf[0][i] = p;
        each_prf[1][i] = r;
        each_prf[2][i] = f1(p, r);
    }
    let macro_p = each_prf[0].iter().sum::<f64>() / NUM_CLASSES as f64;
    let macro_r = each_prf[1].iter().sum::<f64>() / NUM_CLASSES as f64;

    Ok(PrfReport {
        matrix,
        acc,
        each_prf,
        macro_prf: [macro_p, macro_r, f1(macro_p, macro_r)],
    })
}

/// Thresholds probabilities into hard labels (`> threshold` is `1`).
pub fn threshold_scores(scores: &[f32], threshold: f32) -> Vec<u8> {
    scores.iter().map(|&s| u8::from(s > threshold)).collect()
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(p: f64, r: f64) -> f64 {
    if p + r > 0.0 {
        2.0 * p * r / (p + r)
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    alpha: f64,
    value: Option<f64>,
}

impl ExponentialMovingAverage {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    pub fn update(&mut self, sample: f64) -> f64 {
        let v = match self.value {
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
            None => sample,
        };
        self.value = Some(v);
        v
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_right_predictions() {
        let report = prf(&[0, 0, 1, 1], &[0, 1, 1, 0]).unwrap();
        assert_eq!(report.matrix[0][0] + report.matrix[1][1], 2);
        assert_eq!(report.matrix[2][2], 4);
        assert!((report.acc - 0.5).abs() < 1e-12);
        assert!(report.macro_prf[2].is_finite());
        assert!((report.macro_prf[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn perfect_predictions() {
        let report = prf(&[0, 1, 0, 1], &[0, 1, 0, 1]).unwrap();
        assert_eq!(report.acc, 1.0);
        assert_eq!(report.macro_prf, [1.0, 1.0, 1.0]);
        assert_eq!(report.matrix[0], [2, 0, 2]);
        assert_eq!(report.matrix[2], [2, 2, 4]);
    }

    #[test]
    fn missing_class_reports_zero_instead_of_nan() {
        let report = prf(&[0, 0], &[0, 0]).unwrap();
        assert_eq!(report.each_prf[0][1], 0.0);
        assert_eq!(report.each_prf[1][1], 0.0);
        assert_eq!(report.each_prf[2][1], 0.0);
        assert!((report.macro_prf[0] - 0.5).abs() < 1e-12);

        let empty = prf(&[], &[]).unwrap();
        assert_eq!(empty.acc, 0.0);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(prf(&[0, 1], &[0]).is_err());
        assert!(prf(&[2], &[0]).is_err());
    }

    #[test]
    fn thresholding_is_strict() {
        assert_eq!(threshold_scores(&[0.5, 0.51, 0.1], 0.5), vec![0, 1, 0]);
    }
}
