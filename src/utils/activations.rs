//! Activation and loss helpers
//!
//! - ReLU (in-place, f32)
//! - Softmax (row-wise, numerically stable)
//! - Softmax cross-entropy against one-hot labels, with its gradient
//! - Row argmax for accuracy

/// ReLU activation function applied in-place.
///
/// Sets all negative values to 0.0, keeps positive values unchanged.
pub fn relu_inplace(data: &mut [f32]) {
    for value in data.iter_mut() {
        if *value < 0.0 {
            *value = 0.0;
        }
    }
}

/// Softmax activation function applied row-wise.
///
/// Uses the max-subtraction trick for numerical stability.
///
/// # Arguments
/// * `outputs` - Flat array containing row-major matrix data
/// * `rows` - Number of rows in the matrix
/// * `cols` - Number of columns in the matrix
pub fn softmax_rows(outputs: &mut [f32], rows: usize, cols: usize) {
    if cols == 0 {
        return;
    }
    assert_eq!(outputs.len(), rows * cols, "outputs length mismatch in softmax_rows");

    for row in outputs.chunks_exact_mut(cols).take(rows) {
        let max_value = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        let mut sum = 0.0f32;
        for value in row.iter_mut() {
            *value = (*value - max_value).exp();
            sum += *value;
        }

        let inv_sum = 1.0f32 / sum;
        for value in row.iter_mut() {
            *value *= inv_sum;
        }
    }
}

/// Mean softmax cross-entropy over a batch of one-hot labels.
///
/// Writes `d loss / d logits = (softmax - labels) / rows` into `grad_logits`
/// and returns the mean loss.
pub fn softmax_cross_entropy(
    logits: &[f32],
    labels: &[f32],
    rows: usize,
    cols: usize,
    grad_logits: &mut [f32],
) -> f32 {
    assert_eq!(logits.len(), rows * cols, "logits length mismatch");
    assert_eq!(labels.len(), rows * cols, "labels length mismatch");
    assert_eq!(grad_logits.len(), rows * cols, "gradient length mismatch");

    let eps = 1e-12f32;
    grad_logits.copy_from_slice(logits);
    softmax_rows(grad_logits, rows, cols);

    let scale = 1.0 / rows as f32;
    let mut loss = 0.0f32;
    for (probs, targets) in grad_logits
        .chunks_exact_mut(cols)
        .zip(labels.chunks_exact(cols))
    {
        for (p, &y) in probs.iter_mut().zip(targets) {
            if y > 0.0 {
                loss -= y * p.max(eps).ln();
            }
            *p = (*p - y) * scale;
        }
    }
    loss * scale
}

/// Index of the largest value in each row.
pub fn argmax_rows(values: &[f32], cols: usize) -> Vec<usize> {
    values
        .chunks_exact(cols)
        .map(|row| {
            let mut best = 0usize;
            for (j, &v) in row.iter().enumerate().skip(1) {
                if v > row[best] {
                    best = j;
                }
            }
            best
        })
        .collect()
}

/// Fraction of rows whose logit argmax matches the one-hot label argmax.
pub fn batch_accuracy(logits: &[f32], labels: &[f32], cols: usize) -> f32 {
    let predicted = argmax_rows(logits, cols);
    let expected = argmax_rows(labels, cols);
    if predicted.is_empty() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(&expected)
        .filter(|(p, e)| p == e)
        .count();
    correct as f32 / predicted.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON_F32: f32 = 1e-6;

    #[test]
    fn test_relu_mixed() {
        let mut data = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        relu_inplace(&mut data);
        assert_eq!(data, vec![0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_softmax_single_row_sum() {
        let mut data = vec![1.0, 2.0, 3.0];
        softmax_rows(&mut data, 1, 3);
        let sum: f32 = data.iter().sum();
        assert!((sum - 1.0).abs() < EPSILON_F32);
    }

    #[test]
    fn test_softmax_numerical_stability() {
        let mut data = vec![1000.0, 1001.0, 1002.0];
        softmax_rows(&mut data, 1, 3);
        let sum: f32 = data.iter().sum();
        assert!((sum - 1.0).abs() < EPSILON_F32);
        assert!(!data.iter().any(|&x| x.is_nan() || x.is_infinite()));
    }

    #[test]
    fn test_cross_entropy_uniform_logits() {
        let logits = vec![0.0, 0.0, 0.0, 0.0];
        let labels = vec![1.0, 0.0, 0.0, 1.0];
        let mut grad = vec![0.0; 4];
        let loss = softmax_cross_entropy(&logits, &labels, 2, 2, &mut grad);
        assert!((loss - 2.0f32.ln()).abs() < EPSILON_F32);
        // (0.5 - 1) / 2 and (0.5 - 0) / 2
        assert!((grad[0] + 0.25).abs() < EPSILON_F32);
        assert!((grad[1] - 0.25).abs() < EPSILON_F32);
    }

    #[test]
    fn test_cross_entropy_gradient_rows_sum_to_zero() {
        let logits = vec![0.3, -1.2, 2.0, 0.5, 0.5, -0.1];
        let labels = vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0];
        let mut grad = vec![0.0; 6];
        softmax_cross_entropy(&logits, &labels, 2, 3, &mut grad);
        for row in grad.chunks_exact(3) {
            let s: f32 = row.iter().sum();
            assert!(s.abs() < EPSILON_F32);
        }
    }

    #[test]
    fn test_batch_accuracy() {
        let logits = vec![2.0, 1.0, 0.0, 3.0, 5.0, -1.0];
        let labels = vec![1.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let acc = batch_accuracy(&logits, &labels, 2);
        assert!((acc - 1.0 / 3.0).abs() < EPSILON_F32);
    }
}
