//! Learning-rate decay driven by the training-accuracy trend
//!
//! The policy is consulted at the permanent-checkpoint cadence. It compares
//! the latest training accuracy with up to nine of its predecessors and
//! decays the rate when training has stopped improving.

use crate::config::DecayConfig;
use tracing::warn;

/// Number of history entries inspected, the latest included.
pub const HISTORY_SPAN: usize = 10;

/// Outcome of one policy consultation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LrDecision {
    /// Improvement reached the threshold; the rate is unchanged.
    Keep { improvement: f32 },
    /// Improvement fell short; `learning_rate` is the new, reduced rate.
    Decay { improvement: f32, learning_rate: f32 },
    /// Too few predecessors to judge; the rate is unchanged.
    Skipped { window: usize },
}

impl LrDecision {
    /// Rate to use after this decision.
    pub fn learning_rate(&self, current: f32) -> f32 {
        match self {
            LrDecision::Decay { learning_rate, .. } => *learning_rate,
            _ => current,
        }
    }
}

/// Core trait for learning-rate decay policies.
///
/// # Example
///
/// ```ignore
/// let decision = policy.adjust(history.train_acc(), state.learning_rate);
/// state.learning_rate = decision.learning_rate(state.learning_rate);
/// ```
pub trait LrDecayPolicy {
    /// Decide on the next rate from the training-accuracy history (0-100 scale).
    fn adjust(&self, train_acc_history: &[f32], learning_rate: f32) -> LrDecision;
}

/// Divides the rate by `factor` when the latest training accuracy exceeds the
/// mean of its window by less than `threshold` points.
///
/// The window is `history[len - 10 .. len - 1]`, clipped at the start, so it
/// holds up to nine predecessors of the latest value. The improvement is
/// `sum(latest - acc) / window_len`, i.e. `latest - mean(window)`.
///
/// # Example
///
/// ```
/// use alexnet_trainer::training::lr_policy::{AccuracyTrendDecay, LrDecayPolicy, LrDecision};
///
/// let policy = AccuracyTrendDecay::new(2.0, 10.0, 1);
/// let rising: Vec<f32> = (70..=80).map(|v| v as f32).collect();
/// assert!(matches!(policy.adjust(&rising, 0.01), LrDecision::Keep { .. }));
///
/// let flat = vec![70.0; 11];
/// assert!(matches!(policy.adjust(&flat, 0.01), LrDecision::Decay { .. }));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyTrendDecay {
    threshold: f32,
    factor: f32,
    min_window: usize,
}

impl AccuracyTrendDecay {
    /// `min_window` is the smallest window the policy acts on; with `0` an
    /// empty window counts as zero improvement and decays the rate.
    pub fn new(threshold: f32, factor: f32, min_window: usize) -> Self {
        Self {
            threshold,
            factor,
            min_window,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Mean improvement of the latest value over its window, with the window
    /// length. An empty window yields `(0.0, 0)`.
    pub fn improvement(history: &[f32]) -> (f32, usize) {
        let Some((&latest, earlier)) = history.split_last() else {
            return (0.0, 0);
        };
        let start = history.len().saturating_sub(HISTORY_SPAN);
        let window = &earlier[start.min(earlier.len())..];
        if window.is_empty() {
            return (0.0, 0);
        }
        let size = window.len() as f32;
        let improvement = window.iter().map(|acc| (latest - acc) / size).sum();
        (improvement, window.len())
    }
}

impl From<&DecayConfig> for AccuracyTrendDecay {
    fn from(config: &DecayConfig) -> Self {
        Self::new(config.threshold, config.factor, config.min_window)
    }
}

impl LrDecayPolicy for AccuracyTrendDecay {
    fn adjust(&self, train_acc_history: &[f32], learning_rate: f32) -> LrDecision {
        let (improvement, window) = Self::improvement(train_acc_history);
        if window < self.min_window {
            warn!(
                window,
                min_window = self.min_window,
                "too few accuracy samples for a decay decision"
            );
            return LrDecision::Skipped { window };
        }
        if improvement < self.threshold {
            LrDecision::Decay {
                improvement,
                learning_rate: learning_rate / self.factor,
            }
        } else {
            LrDecision::Keep { improvement }
        }
    }
}
