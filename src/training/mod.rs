//! Training control loop
//!
//! [`TrainingLoop::run`] drives epochs of momentum SGD over a
//! [`BatchSource`], samples losses, validates on a fixed epoch cadence,
//! decays the learning rate when training accuracy stalls and keeps a
//! rolling checkpoint that a later run resumes from.
//!
//! Per epoch, in order:
//!
//! 1. train `floor(train_count / batch_size)` batches, sampling the loss every
//!    `loss_sampling_step` iterations
//! 2. export the first-layer kernel snapshot
//! 3. append the epoch line to `loss.txt`
//! 4. every `acc_sampling_step` epochs validate, record both accuracies and
//!    redraw the plots; on multiples of `checkpoint_every` (never epoch 0)
//!    also write `model_epoch<N>` and consult the decay policy
//! 5. overwrite the rolling `model/` checkpoint

pub mod log;
pub mod lr_policy;
pub mod metrics;
pub mod state;
pub mod step;

pub use log::LossLog;
pub use lr_policy::{AccuracyTrendDecay, LrDecayPolicy, LrDecision};
pub use metrics::MetricHistory;
pub use state::TrainingState;
pub use step::{evaluate_batch, optimization_step, StepOutcome};

use crate::checkpoint::CheckpointManager;
use crate::config::{Hyperparameters, TrainingConfig};
use crate::data::BatchSource;
use crate::error::{Result, TrainError};
use crate::export::{export_accuracy_plot, export_loss_plot, KernelGrid, KernelSnapshot};
use crate::layout::OutputLayout;
use crate::model::Classifier;
use crate::optimizers::Momentum;
use std::fs;
use std::time::Instant;
use tracing::{debug, info};

/// What a finished [`TrainingLoop::run`] reports.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// First epoch trained by this run (0-based); later than 0 on resume.
    pub first_epoch: usize,
    pub epochs_run: usize,
    pub final_learning_rate: f32,
    pub decay_count: usize,
    pub state: TrainingState,
    pub history: MetricHistory,
}

pub struct TrainingLoop<C: Classifier, S: BatchSource> {
    classifier: C,
    source: S,
    optimizer: Momentum,
    hyperparameters: Hyperparameters,
    policy: Box<dyn LrDecayPolicy>,
    checkpoint_every: usize,
    kernel_grid: KernelGrid,
    layout: OutputLayout,
}

impl<C: Classifier, S: BatchSource> TrainingLoop<C, S> {
    pub fn new(classifier: C, source: S, config: &TrainingConfig, layout: OutputLayout) -> Self {
        Self {
            classifier,
            source,
            optimizer: Momentum::new(config.hyperparameters.momentum),
            hyperparameters: config.hyperparameters,
            policy: Box::new(AccuracyTrendDecay::from(&config.decay)),
            checkpoint_every: config.run.checkpoint_every,
            kernel_grid: config.kernel_grid,
            layout,
        }
    }

    /// Replaces the accuracy-trend policy.
    pub fn with_policy(mut self, policy: Box<dyn LrDecayPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn into_classifier(self) -> C {
        self.classifier
    }

    fn iterations(&self, count: usize, split: &str) -> Result<usize> {
        let iterations = count / self.hyperparameters.batch_size;
        if iterations == 0 {
            return Err(TrainError::precondition(format!(
                "{split} set of {count} examples is smaller than batch size {}",
                self.hyperparameters.batch_size
            )));
        }
        Ok(iterations)
    }

    fn restore_or_init(
        &mut self,
        loss_sampling_step: usize,
        acc_sampling_step: usize,
    ) -> Result<(TrainingState, MetricHistory)> {
        match CheckpointManager::restore_if_exists(&self.layout.model_dir())? {
            Some(snapshot) => {
                let (state, mut history) = snapshot.apply(&mut self.classifier, &mut self.optimizer)?;
                history.set_strides(loss_sampling_step, acc_sampling_step);
                info!(
                    next_epoch = state.next_epoch(),
                    learning_rate = state.learning_rate,
                    "resuming from rolling checkpoint"
                );
                Ok((state, history))
            }
            None => {
                info!("no checkpoint found, training from fresh initialization");
                Ok((
                    TrainingState::new(self.hyperparameters.learning_rate),
                    MetricHistory::new(loss_sampling_step, acc_sampling_step),
                ))
            }
        }
    }

    /// Mean batch accuracy over the validation split, 0-100 scale.
    fn validate(&mut self, iterations: usize) -> Result<f32> {
        let mut accuracy = 0.0f32;
        for _ in 0..iterations {
            let batch = self.source.next_val(self.hyperparameters.batch_size)?;
            accuracy += evaluate_batch(&mut self.classifier, &batch)? / iterations as f32 * 100.0;
        }
        Ok(accuracy)
    }

    fn export_plots(&self, history: &MetricHistory) -> Result<()> {
        export_loss_plot(history, &self.layout.loss_plot())?;
        export_accuracy_plot(history, &self.layout.accuracy_plot())
    }

    fn consult_policy(
        &self,
        state: &mut TrainingState,
        history: &MetricHistory,
        log: &LossLog,
    ) -> Result<()> {
        match self.policy.adjust(history.train_acc(), state.learning_rate) {
            LrDecision::Decay {
                improvement,
                learning_rate,
            } => {
                info!(improvement, from = state.learning_rate, to = learning_rate, "[learning rate reducing]");
                state.learning_rate = learning_rate;
                state.decay_count += 1;
                log.learning_rate_reduced()?;
            }
            LrDecision::Keep { improvement } => {
                debug!(improvement, learning_rate = state.learning_rate, "learning rate kept");
            }
            LrDecision::Skipped { .. } => {}
        }
        Ok(())
    }

    /// Trains until epoch `max_epoch` (exclusive, 0-based), resuming after
    /// the last epoch recorded in `model/` when a checkpoint exists.
    pub fn run(
        &mut self,
        max_epoch: usize,
        loss_sampling_step: usize,
        acc_sampling_step: usize,
    ) -> Result<RunSummary> {
        if loss_sampling_step == 0 || acc_sampling_step == 0 {
            return Err(TrainError::precondition("sampling steps must be positive"));
        }
        if max_epoch == 0 {
            return Err(TrainError::precondition("max_epoch must be at least 1"));
        }
        if self.hyperparameters.batch_size == 0 {
            return Err(TrainError::precondition("batch size must be positive"));
        }
        if self.checkpoint_every == 0 {
            return Err(TrainError::precondition("checkpoint cadence must be positive"));
        }
        let train_iterations = self.iterations(self.source.train_count(), "training")?;
        let val_iterations = self.iterations(self.source.val_count(), "validation")?;
        let batch_size = self.hyperparameters.batch_size;
        let keep_prob = self.hyperparameters.keep_prob;

        let root = self.layout.root().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| TrainError::io(&root, e))?;
        let (mut state, mut history) = self.restore_or_init(loss_sampling_step, acc_sampling_step)?;
        let loss_log = LossLog::new(self.layout.loss_log());
        let first_epoch = state.next_epoch();
        let started = Instant::now();

        info!(
            first_epoch,
            max_epoch,
            train_iterations,
            val_iterations,
            batch_size,
            "training started"
        );

        for epoch in first_epoch..max_epoch {
            let mut train_acc = 0.0f32;
            for itr in 0..train_iterations {
                let batch = self.source.next_train(batch_size)?;
                let outcome = optimization_step(
                    &mut self.classifier,
                    &mut self.optimizer,
                    &batch,
                    keep_prob,
                    state.learning_rate,
                )?;
                train_acc += outcome.accuracy / train_iterations as f32 * 100.0;
                state.last_loss = outcome.loss;

                if itr % loss_sampling_step == 0 {
                    history.record_loss(outcome.loss);
                    let progress = itr as f32 / train_iterations as f32 * 100.0;
                    info!(epoch = epoch + 1, "progress : {progress:.2}%  loss :{}", outcome.loss);
                }
            }

            KernelSnapshot::from_groups(&self.classifier.first_layer_kernels())?.export(
                &self.layout.kernel_dir(),
                epoch,
                self.kernel_grid,
            )?;

            let elapsed = started.elapsed().as_secs_f64();
            loss_log.epoch(epoch + 1, state.last_loss, elapsed)?;
            state.last_completed_epoch = Some(epoch);
            info!(epoch = epoch + 1, batch_loss = state.last_loss, elapsed, "epoch finished");

            if epoch % acc_sampling_step == 0 {
                let val_acc = self.validate(val_iterations)?;
                history.record_accuracy(val_acc, train_acc);
                loss_log.accuracies(val_acc, train_acc)?;
                info!(epoch = epoch + 1, "test accuracy: {val_acc}");
                info!(epoch = epoch + 1, "train accuracy: {train_acc}");
                self.export_plots(&history)?;

                if epoch % self.checkpoint_every == 0 && epoch != 0 {
                    let dir = self.layout.epoch_model_dir(epoch + 1);
                    CheckpointManager::save(&dir, &self.classifier, &self.optimizer, &state, &history)?;
                    info!(path = %dir.display(), "permanent checkpoint written");
                    self.consult_policy(&mut state, &history, &loss_log)?;
                }
            }

            CheckpointManager::save(
                &self.layout.model_dir(),
                &self.classifier,
                &self.optimizer,
                &state,
                &history,
            )?;
        }

        self.export_plots(&history)?;
        info!(
            learning_rate = state.learning_rate,
            decays = state.decay_count,
            "training finished"
        );

        Ok(RunSummary {
            first_epoch,
            epochs_run: max_epoch.saturating_sub(first_epoch),
            final_learning_rate: state.learning_rate,
            decay_count: state.decay_count,
            state,
            history,
        })
    }
}
