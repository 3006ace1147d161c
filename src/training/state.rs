//! Mutable state of a run that survives a checkpoint round-trip

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// 0-based index of the last fully completed epoch.
    pub last_completed_epoch: Option<usize>,
    /// Live learning rate; only the decay policy changes it.
    pub learning_rate: f32,
    /// Number of decays applied so far.
    #[serde(default)]
    pub decay_count: usize,
    /// Cross-entropy of the most recent training batch.
    #[serde(default)]
    pub last_loss: f32,
}

impl TrainingState {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            last_completed_epoch: None,
            learning_rate,
            decay_count: 0,
            last_loss: 0.0,
        }
    }

    /// Epoch the next run should start at.
    pub fn next_epoch(&self) -> usize {
        self.last_completed_epoch.map_or(0, |e| e + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_epoch() {
        let mut state = TrainingState::new(0.01);
        assert_eq!(state.next_epoch(), 0);
        state.last_completed_epoch = Some(4);
        assert_eq!(state.next_epoch(), 5);
    }
}
