use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use tracing::instrument;

use crate::{Blob, BlobCollection, Error, Result};

/// Named scalar losses reported by one training step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Losses {
    pub total: f64,
    pub components: BTreeMap<String, f64>,
}

impl Losses {
    pub fn new(total: f64) -> Self {
        Self {
            total,
            components: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.components.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.components.get(name).copied()
    }
}

impl fmt::Display for Losses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "total loss: {:.6}", self.total)?;
        for (name, value) in &self.components {
            write!(f, ", {name}: {value:.6}")?;
        }
        Ok(())
    }
}

/// Everything a model needs before its first step. Replaces process-wide seeds and sessions.
#[derive(Debug, Clone, Copy)]
pub struct InitOptions<'a> {
    pub pretrained: Option<&'a Path>,
    pub summary_dir: Option<&'a Path>,
    pub seed: u64,
    pub learning_rate: f64,
    pub momentum: f64,
}

/// A detector owned by an external framework. The network, the optimizer and the checkpoint
/// format all live behind this trait.
pub trait TrainableModel {
    type Error: std::error::Error + Send + Sync + 'static;

    fn initialize(&mut self, options: &InitOptions<'_>) -> std::result::Result<(), Self::Error>;

    fn set_learning_rate(&mut self, learning_rate: f64) -> std::result::Result<(), Self::Error>;

    /// Runs one optimization step on a single blob. `with_summary` asks the model to also emit
    /// its summaries for this step.
    fn train_step(
        &mut self,
        blob: &Blob,
        with_summary: bool,
    ) -> std::result::Result<Losses, Self::Error>;

    fn save(&mut self, path: &Path) -> std::result::Result<(), Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    /// Epoch at whose start the learning rate is multiplied by `lr_decay_factor`.
    pub lr_decay_epoch: Option<usize>,
    pub lr_decay_factor: f64,
    pub seed: u64,
    pub pretrained_model: Option<PathBuf>,
    pub summary_dir: Option<PathBuf>,
    pub output_path: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 1e-4,
            momentum: 0.9,
            lr_decay_epoch: Some(150),
            lr_decay_factor: 0.1,
            seed: 17,
            pretrained_model: Some("nets/vgg16.ckpt".into()),
            summary_dir: None,
            output_path: "output/model.ckpt".into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TrainerBuilder {
    config: TrainConfig,
}

impl TrainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.config.epochs = epochs;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.config.learning_rate = learning_rate;
        self
    }

    pub fn momentum(mut self, momentum: f64) -> Self {
        self.config.momentum = momentum;
        self
    }

    pub fn lr_decay(mut self, epoch: Option<usize>, factor: f64) -> Self {
        self.config.lr_decay_epoch = epoch;
        self.config.lr_decay_factor = factor;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn pretrained_model(mut self, path: Option<PathBuf>) -> Self {
        self.config.pretrained_model = path;
        self
    }

    pub fn summary_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.summary_dir = Some(path.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = path.into();
        self
    }

    pub fn build(self) -> Trainer {
        Trainer {
            config: self.config,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub learning_rate: f64,
    pub steps: usize,
    pub last_losses: Losses,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainReport {
    pub epochs: Vec<EpochSummary>,
    pub final_learning_rate: f64,
}

#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainConfig,
}

impl Trainer {
    pub fn builder() -> TrainerBuilder {
        TrainerBuilder::new()
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Presents every blob once per epoch, in collection order, then saves the model.
    #[instrument(skip(self, model, blobs), fields(blobs = blobs.len()))]
    pub fn train<M: TrainableModel>(
        &self,
        model: &mut M,
        blobs: &BlobCollection,
    ) -> Result<TrainReport> {
        let config = &self.config;
        if blobs.is_empty() {
            return Err(Error::EmptyCollection);
        }

        if let Some(pretrained) = &config.pretrained_model {
            log::info!("Loading initial model weights from {}", pretrained.display());
        }
        model
            .initialize(&InitOptions {
                pretrained: config.pretrained_model.as_deref(),
                summary_dir: config.summary_dir.as_deref(),
                seed: config.seed,
                learning_rate: config.learning_rate,
                momentum: config.momentum,
            })
            .map_err(Error::model)?;

        let mut learning_rate = config.learning_rate;
        model
            .set_learning_rate(learning_rate)
            .map_err(Error::model)?;

        let mut report = TrainReport::default();
        for epoch in 0..config.epochs {
            if config.lr_decay_epoch == Some(epoch) {
                learning_rate *= config.lr_decay_factor;
                log::info!("Decaying learning rate to {learning_rate} at epoch {epoch}");
                model
                    .set_learning_rate(learning_rate)
                    .map_err(Error::model)?;
            }

            // the first epoch runs without summaries
            let with_summary = epoch != 0;
            let mut last_losses = Losses::default();
            for blob in blobs {
                last_losses = model.train_step(blob, with_summary).map_err(Error::model)?;
            }

            log::info!(
                "iter: {} / {}, {last_losses}, lr: {learning_rate}",
                epoch + 1,
                config.epochs
            );
            report.epochs.push(EpochSummary {
                epoch,
                learning_rate,
                steps: blobs.len(),
                last_losses,
            });
        }

        model.save(&config.output_path).map_err(Error::model)?;
        log::info!("Saved model to {}", config.output_path.display());
        report.final_learning_rate = learning_rate;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use approx::assert_relative_eq;
    use image::DynamicImage;

    use super::*;
    use crate::ImageInfo;

    #[derive(Debug, thiserror::Error)]
    #[error("step failed")]
    struct StepFailed;

    #[derive(Default)]
    struct RecordingModel {
        initialized_with: Option<(Option<PathBuf>, u64)>,
        rates: Vec<f64>,
        steps: Vec<(PathBuf, bool)>,
        saved: Vec<PathBuf>,
        fail_after: Option<usize>,
    }

    impl TrainableModel for RecordingModel {
        type Error = StepFailed;

        fn initialize(&mut self, options: &InitOptions<'_>) -> Result<(), StepFailed> {
            self.initialized_with = Some((options.pretrained.map(Path::to_path_buf), options.seed));
            Ok(())
        }

        fn set_learning_rate(&mut self, learning_rate: f64) -> Result<(), StepFailed> {
            self.rates.push(learning_rate);
            Ok(())
        }

        fn train_step(&mut self, blob: &Blob, with_summary: bool) -> Result<Losses, StepFailed> {
            if self.fail_after == Some(self.steps.len()) {
                return Err(StepFailed);
            }
            self.steps.push((blob.source.clone(), with_summary));
            let loss = 1.0 / self.steps.len() as f64;
            Ok(Losses::new(loss)
                .with("rpn_loss_cls", loss / 2.0)
                .with("rpn_loss_box", loss / 2.0))
        }

        fn save(&mut self, path: &Path) -> Result<(), StepFailed> {
            self.saved.push(path.to_path_buf());
            Ok(())
        }
    }

    fn blobs(names: &[&str]) -> BlobCollection {
        names
            .iter()
            .map(|name| Blob {
                data: DynamicImage::new_rgb8(1, 1),
                gt_list: Vec::new(),
                im_info: ImageInfo {
                    height: 1,
                    width: 1,
                    scale: 1.0,
                },
                source: PathBuf::from(name),
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn presents_blobs_in_order_each_epoch() {
        let trainer = Trainer::builder()
            .epochs(3)
            .lr_decay(Some(2), 0.1)
            .pretrained_model(None)
            .output_path("out/model")
            .build();
        let mut model = RecordingModel::default();
        let report = trainer.train(&mut model, &blobs(&["a", "b"])).unwrap();

        let order = model
            .steps
            .iter()
            .map(|(path, summary)| (path.to_str().unwrap(), *summary))
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                ("a", false),
                ("b", false),
                ("a", true),
                ("b", true),
                ("a", true),
                ("b", true),
            ]
        );
        assert_eq!(model.initialized_with, Some((None, 17)));
        assert_eq!(model.saved, vec![PathBuf::from("out/model")]);

        assert_eq!(model.rates.len(), 2);
        assert_relative_eq!(model.rates[0], 1e-4);
        assert_relative_eq!(model.rates[1], 1e-5, epsilon = 1e-12);
        assert_eq!(report.epochs.len(), 3);
        assert_relative_eq!(report.epochs[1].learning_rate, 1e-4);
        assert_relative_eq!(report.epochs[2].learning_rate, 1e-5, epsilon = 1e-12);
        assert_relative_eq!(report.final_learning_rate, 1e-5, epsilon = 1e-12);
        assert_eq!(report.epochs[2].steps, 2);
        assert_relative_eq!(report.epochs[2].last_losses.total, 1.0 / 6.0);
        assert!(report.epochs[0].last_losses.get("rpn_loss_box").is_some());
    }

    #[test]
    fn empty_collection_is_rejected() {
        let trainer = Trainer::builder().epochs(1).build();
        let mut model = RecordingModel::default();
        assert!(matches!(
            trainer.train(&mut model, &BlobCollection::default()),
            Err(Error::EmptyCollection)
        ));
        assert!(model.saved.is_empty());
    }

    #[test]
    fn model_errors_stop_training() {
        let trainer = Trainer::builder().epochs(2).build();
        let mut model = RecordingModel {
            fail_after: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            trainer.train(&mut model, &blobs(&["a", "b"])),
            Err(Error::Model(_))
        ));
        assert!(model.saved.is_empty());
    }

    #[test]
    fn losses_display() {
        let losses = Losses::new(1.5).with("loss_box", 0.25);
        assert_eq!(losses.to_string(), "total loss: 1.500000, loss_box: 0.250000");
    }
}
