use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    error::{TrainError, TsPrepResult},
    window::{BatchConfig, ForecastBatch, WindowedDataset},
};

// ================================================================================================
// Trainer Boundary
// ================================================================================================

/// The narrow interface to an external forecasting model and its optimizer.
///
/// This crate never implements a model: it submits batches and receives
/// losses, and asks the trainer to persist or restore its own checkpoints in
/// whatever format it uses.
pub trait ForecastTrainer {
    /// Runs one optimizer step on `batch` and returns the batch loss.
    fn train_step(&mut self, batch: &ForecastBatch) -> TsPrepResult<f64>;

    /// Computes the loss on `batch` without updating parameters.
    fn evaluate(&mut self, batch: &ForecastBatch) -> TsPrepResult<f64>;

    fn save_checkpoint(&self, dir: &Path) -> TsPrepResult<()>;

    fn load_checkpoint(&mut self, dir: &Path) -> TsPrepResult<()>;
}

/// Sample-weighted mean loss over one pass of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct EpochSummary {
    pub mean_loss: f64,
    pub batches: usize,
    pub samples: usize,
}

impl EpochSummary {
    fn record(&mut self, loss: f64, samples: usize) -> TsPrepResult<()> {
        if !loss.is_finite() {
            return Err(TrainError::NonFiniteLoss {
                loss,
                batch: self.batches,
            }
            .into());
        }
        let total = self.samples + samples;
        self.mean_loss += (loss - self.mean_loss) * samples as f64 / total as f64;
        self.samples = total;
        self.batches += 1;
        Ok(())
    }
}

/// Runs one training pass over `dataset`.
///
/// # Errors
/// - [`TrainError::NonFiniteLoss`] if a step reports NaN or infinity.
/// - Any error returned by the trainer.
#[tracing::instrument(skip(trainer, dataset), fields(windows = dataset.len()))]
pub fn train_epoch<T: ForecastTrainer + ?Sized>(
    trainer: &mut T,
    dataset: &WindowedDataset,
    config: &BatchConfig,
) -> TsPrepResult<EpochSummary> {
    let mut summary = EpochSummary::default();
    for batch in dataset.batches(config)? {
        let batch = batch?;
        let loss = trainer.train_step(&batch)?;
        summary.record(loss, batch.len())?;
    }
    tracing::info!(
        mean_loss = summary.mean_loss,
        batches = summary.batches,
        "Training epoch finished"
    );
    Ok(summary)
}

/// Evaluates `dataset` in order, without shuffling.
#[tracing::instrument(skip(trainer, dataset), fields(windows = dataset.len()))]
pub fn evaluate_dataset<T: ForecastTrainer + ?Sized>(
    trainer: &mut T,
    dataset: &WindowedDataset,
    batch_size: usize,
) -> TsPrepResult<EpochSummary> {
    let mut summary = EpochSummary::default();
    for batch in dataset.batches(&BatchConfig::new(batch_size))? {
        let batch = batch?;
        let loss = trainer.evaluate(&batch)?;
        summary.record(loss, batch.len())?;
    }
    tracing::info!(
        mean_loss = summary.mean_loss,
        batches = summary.batches,
        "Evaluation finished"
    );
    Ok(summary)
}

// ================================================================================================
// Early Stopping
// ================================================================================================

/// Outcome of feeding one validation loss to [`EarlyStopping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    /// New best loss; callers usually checkpoint here.
    Improved,
    Continue,
    Stop,
}

/// Stops training after `patience` epochs without an improvement of more than `min_delta`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f64,
    best: Option<f64>,
    stale_epochs: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            best: None,
            stale_epochs: 0,
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn update(&mut self, loss: f64) -> StopDecision {
        let improved = self.best.is_none_or(|best| loss < best - self.min_delta);
        if improved {
            self.best = Some(loss);
            self.stale_epochs = 0;
            return StopDecision::Improved;
        }

        self.stale_epochs += 1;
        if self.stale_epochs >= self.patience {
            tracing::info!(
                best = self.best,
                epochs = self.stale_epochs,
                "Early stopping triggered"
            );
            StopDecision::Stop
        } else {
            StopDecision::Continue
        }
    }
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self::new(10, 0.0001)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::TsPrepError, table::TimeSeriesTable, window::WindowedDatasetBuilder,
    };

    /// Loss is the mean of the horizon values; records what it was given.
    #[derive(Default)]
    struct MeanHorizonTrainer {
        steps: usize,
        seen: Vec<usize>,
        checkpoint: Option<usize>,
        poison: bool,
    }

    impl ForecastTrainer for MeanHorizonTrainer {
        fn train_step(&mut self, batch: &ForecastBatch) -> TsPrepResult<f64> {
            self.steps += 1;
            self.seen.extend(&batch.offsets);
            if self.poison {
                return Ok(f64::NAN);
            }
            Ok(batch.future_values.mean().unwrap_or(0.0))
        }

        fn evaluate(&mut self, batch: &ForecastBatch) -> TsPrepResult<f64> {
            Ok(batch.future_values.mean().unwrap_or(0.0))
        }

        fn save_checkpoint(&self, _dir: &Path) -> TsPrepResult<()> {
            Ok(())
        }

        fn load_checkpoint(&mut self, _dir: &Path) -> TsPrepResult<()> {
            self.checkpoint = Some(self.steps);
            Ok(())
        }
    }

    fn ramp_dataset() -> WindowedDataset {
        let table = TimeSeriesTable::from_targets([("v", (0..12).map(f64::from).collect())])
            .expect("valid table");
        WindowedDatasetBuilder::new(2, 1)
            .build(table, &[])
            .expect("valid geometry")
    }

    #[test]
    fn epoch_visits_every_window_once() {
        let dataset = ramp_dataset(); // 10 windows, horizons 2..=11
        let mut trainer = MeanHorizonTrainer::default();
        let summary = train_epoch(&mut trainer, &dataset, &BatchConfig::new(3).with_shuffle_seed(7))
            .expect("epoch");

        assert_eq!(summary.batches, 4);
        assert_eq!(summary.samples, 10);
        assert!((summary.mean_loss - 6.5).abs() < 1e-12);

        trainer.seen.sort_unstable();
        assert_eq!(trainer.seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn evaluation_weights_batches_by_size() {
        let dataset = ramp_dataset();
        let mut trainer = MeanHorizonTrainer::default();
        let summary = evaluate_dataset(&mut trainer, &dataset, 4).expect("evaluation");

        // batches of 4, 4, 2 with mean horizons 3.5, 7.5, 10.5
        assert!((summary.mean_loss - 6.5).abs() < 1e-12);
        assert_eq!(trainer.steps, 0);
    }

    #[test]
    fn non_finite_loss_aborts_the_epoch() {
        let dataset = ramp_dataset();
        let mut trainer = MeanHorizonTrainer {
            poison: true,
            ..Default::default()
        };
        let err = train_epoch(&mut trainer, &dataset, &BatchConfig::new(5)).unwrap_err();
        assert!(matches!(
            err,
            TsPrepError::Train(TrainError::NonFiniteLoss { batch: 0, .. })
        ));
        assert_eq!(trainer.steps, 1);
    }

    #[test]
    fn early_stopping_waits_for_patience() {
        let mut stopper = EarlyStopping::new(2, 0.1);
        assert_eq!(stopper.update(1.0), StopDecision::Improved);
        assert_eq!(stopper.update(0.95), StopDecision::Continue);
        assert_eq!(stopper.update(0.5), StopDecision::Improved);
        assert_eq!(stopper.update(0.5), StopDecision::Continue);
        assert_eq!(stopper.update(0.45), StopDecision::Stop);
        assert_eq!(stopper.best(), Some(0.5));
    }

    #[test]
    fn trainer_is_usable_as_trait_object() {
        let dataset = ramp_dataset();
        let mut trainer = MeanHorizonTrainer::default();
        let boxed: &mut dyn ForecastTrainer = &mut trainer;
        evaluate_dataset(&mut *boxed, &dataset, 10).expect("evaluation");
        boxed
            .load_checkpoint(Path::new("unused"))
            .expect("load checkpoint");
        assert_eq!(trainer.checkpoint, Some(0));
    }
}
