//! One optimization step and one evaluation step

use crate::data::Batch;
use crate::error::{Result, TrainError};
use crate::model::Classifier;
use crate::optimizers::Optimizer;
use crate::utils::{batch_accuracy, softmax_cross_entropy};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// Mean softmax cross-entropy of the batch.
    pub loss: f32,
    /// Cross-entropy plus regularization, the minimized objective.
    pub total_loss: f32,
    /// Fraction of correctly classified examples, in [0, 1].
    pub accuracy: f32,
}

fn check_batch(classifier: &dyn Classifier, batch: &Batch) -> Result<()> {
    if batch.num_classes != classifier.num_classes()
        || batch.labels.len() != batch.batch_size * batch.num_classes
        || batch.images.len() != batch.batch_size * classifier.input_len()
    {
        return Err(TrainError::precondition(format!(
            "batch of {} samples ({} values, {} classes) does not fit a classifier with {} inputs and {} classes",
            batch.batch_size,
            batch.images.len(),
            batch.num_classes,
            classifier.input_len(),
            classifier.num_classes()
        )));
    }
    Ok(())
}

/// Forward, loss, backward and a momentum update at `learning_rate`.
///
/// Returns `TrainError::Numeric` when the logits or the loss are not finite;
/// parameters are left untouched in that case.
pub fn optimization_step(
    classifier: &mut dyn Classifier,
    optimizer: &mut dyn Optimizer,
    batch: &Batch,
    keep_prob: f32,
    learning_rate: f32,
) -> Result<StepOutcome> {
    check_batch(classifier, batch)?;
    let classes = classifier.num_classes();
    let pass = classifier.forward(&batch.images, batch.batch_size, keep_prob)?;
    if pass.logits.len() != batch.labels.len() {
        return Err(TrainError::precondition(format!(
            "classifier returned {} logits for {} label values",
            pass.logits.len(),
            batch.labels.len()
        )));
    }
    if pass.logits.iter().any(|v| !v.is_finite()) {
        return Err(TrainError::Numeric("classifier produced non-finite logits".into()));
    }

    let mut grad_logits = vec![0.0f32; pass.logits.len()];
    let loss = softmax_cross_entropy(
        &pass.logits,
        &batch.labels,
        batch.batch_size,
        classes,
        &mut grad_logits,
    );
    let total_loss = loss + pass.regularization;
    if !total_loss.is_finite() {
        return Err(TrainError::Numeric(format!(
            "non-finite loss (cross-entropy {loss}, regularization {})",
            pass.regularization
        )));
    }
    let accuracy = batch_accuracy(&pass.logits, &batch.labels, classes);

    classifier.zero_grad();
    classifier.backward(&grad_logits, batch.batch_size)?;
    for param in classifier.parameters_mut() {
        optimizer.update(param, learning_rate);
    }

    Ok(StepOutcome {
        loss,
        total_loss,
        accuracy,
    })
}

/// Accuracy of `batch` with dropout disabled and no parameter update.
pub fn evaluate_batch(classifier: &mut dyn Classifier, batch: &Batch) -> Result<f32> {
    check_batch(classifier, batch)?;
    let pass = classifier.forward(&batch.images, batch.batch_size, 1.0)?;
    Ok(batch_accuracy(&pass.logits, &batch.labels, classifier.num_classes()))
}
