use std::sync::Arc;

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    nn::loss::BinaryCrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::{
    data::{CifarBatch, CifarBatcher},
    dataset::CifarItem,
    model::{Cnn, CnnConfig},
};

/// Number of batches between progress lines.
const LOG_INTERVAL: usize = 100;

#[derive(Config)]
pub struct TrainingConfig {
    pub model: CnnConfig,
    pub optimizer: SgdConfig,
    #[config(default = 10)]
    pub num_epochs: usize,
    #[config(default = 100)]
    pub batch_size: usize,
    #[config(default = 2)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 0.5)]
    pub learning_rate: f64,
}

/// Outcome of a full training run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    /// Accuracy of every training batch, in order of processing.
    pub train_accuracies: Vec<f32>,
    /// Mean accuracy over the test split.
    pub test_accuracy: f32,
}

/// Fraction of samples whose highest-probability class matches the target.
fn accuracy<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f32 {
    let [batch_size, _num_classes] = output.dims();
    let predictions = output.argmax(1).reshape([batch_size]);
    let num_corrects: f32 = predictions.equal(targets).int().sum().into_scalar().elem();

    num_corrects / batch_size as f32
}

/// Runs the trained model over the whole test split and averages the per-batch
/// accuracies into a single scalar.
///
/// The model is used as-is: when called with an autodiff-backend model, the
/// normalization layers keep using per-batch statistics and the backward graph
/// is still recorded, exactly as during fitting.
pub fn evaluate<B: Backend>(
    model: &Cnn<B>,
    dataloader: Arc<dyn DataLoader<B, CifarBatch<B>>>,
) -> f32 {
    let mut accuracies = Vec::new();

    for batch in dataloader.iter() {
        let output = model.forward(batch.images);
        accuracies.push(accuracy(output, batch.targets));
    }

    accuracies.iter().sum::<f32>() / accuracies.len() as f32
}

/// Fits the classifier on the training split and reports accuracy on the test
/// split.
///
/// Every batch: build the one-hot ground truth, run the forward pass, compute
/// the binary cross entropy between predicted probabilities and the one-hot
/// targets, backpropagate and apply one SGD step. Every [`LOG_INTERVAL`]
/// batches a progress line with the averaged loss and the current batch
/// accuracy is printed.
pub fn train<B: AutodiffBackend, D: Dataset<CifarItem> + 'static>(
    device: B::Device,
    dataset_train: D,
    dataset_test: D,
    config: TrainingConfig,
) -> TrainingSummary {
    B::seed(config.seed);

    let mut model = config.model.init::<B>(&device);
    let mut optim = config.optimizer.init();

    let dataloader_train = DataLoaderBuilder::new(CifarBatcher::<B>::for_training(&device))
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(dataset_train);

    let dataloader_test = DataLoaderBuilder::new(CifarBatcher::<B>::for_testing(&device))
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(dataset_test);

    let mut train_accuracies = Vec::new();

    for epoch in 1..=config.num_epochs {
        let mut running_loss = 0.0;

        for (iteration, batch) in dataloader_train.iter().enumerate() {
            let targets_one_hot: Tensor<B, 2, Int> =
                batch.targets.clone().one_hot(config.model.num_classes);

            let output = model.forward(batch.images);
            let loss = BinaryCrossEntropyLossConfig::new()
                .init(&output.device())
                .forward(output.clone(), targets_one_hot);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(config.learning_rate, model, grads);

            let batch_accuracy = accuracy(output, batch.targets);
            train_accuracies.push(batch_accuracy);

            let loss_value: f64 = loss.into_scalar().elem();
            running_loss += loss_value;
            if (iteration + 1) % LOG_INTERVAL == 0 {
                println!(
                    "[{}, {:5}] loss: {:.10}, accuracy: {:.3}",
                    epoch,
                    iteration + 1,
                    running_loss / LOG_INTERVAL as f64,
                    batch_accuracy
                );
                running_loss = 0.0;
            }
        }
    }

    let test_accuracy = evaluate(&model, dataloader_test);

    TrainingSummary {
        train_accuracies,
        test_accuracy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::{dataloader::batcher::Batcher, dataset::InMemDataset};

    use crate::dataset::IMAGE_BYTES;

    type TestBackend = burn::backend::NdArray<f32>;
    type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;

    fn synthetic_item(index: usize, label: u8) -> CifarItem {
        CifarItem {
            image: (0..IMAGE_BYTES)
                .map(|p| ((index * 37 + p * 13) % 251) as u8)
                .collect(),
            label,
        }
    }

    fn synthetic_dataset(count: usize, num_classes: u8) -> InMemDataset<CifarItem> {
        InMemDataset::new(
            (0..count)
                .map(|i| synthetic_item(i, (i % num_classes as usize) as u8))
                .collect(),
        )
    }

    #[test]
    fn one_hot_targets_mark_the_label_index() {
        let device = Default::default();
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([3, 0, 7], &device);

        let one_hot: Tensor<TestBackend, 2, Int> = targets.clone().one_hot(10);

        assert_eq!(one_hot.dims(), [3, 10]);

        let row_sums = one_hot
            .clone()
            .sum_dim(1)
            .into_data()
            .to_vec::<i64>()
            .expect("Row sums should convert to a vector");
        assert_eq!(row_sums, vec![1, 1, 1]);

        one_hot
            .argmax(1)
            .reshape([3])
            .into_data()
            .assert_eq(&targets.into_data(), false);
    }

    #[test]
    fn accuracy_counts_matching_predictions() {
        let device = Default::default();
        let output = Tensor::<TestBackend, 2>::from_floats(
            [[0.8, 0.1, 0.1], [0.2, 0.7, 0.1], [0.3, 0.3, 0.4]],
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 0], &device);

        let value = accuracy(output, targets);

        assert!((value - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn sgd_step_updates_the_model() {
        let device = Default::default();
        let config = TrainingConfig::new(CnnConfig::new(2), SgdConfig::new());
        let mut model = config.model.init::<TestAutodiffBackend>(&device);
        let mut optim = config.optimizer.init();

        let batcher = CifarBatcher::<TestAutodiffBackend>::for_testing(&device);
        let items = (0..4).map(|i| synthetic_item(i, (i % 2) as u8)).collect();
        let batch = batcher.batch(items, &device);

        let probe = batch.images.clone();
        let before = model.forward(probe.clone()).into_data();

        let targets_one_hot: Tensor<TestAutodiffBackend, 2, Int> =
            batch.targets.clone().one_hot(2);
        let output = model.forward(batch.images);
        let loss = BinaryCrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output, targets_one_hot);

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(config.learning_rate, model, grads);

        let after = model.forward(probe).into_data();
        assert_ne!(before, after);
    }

    #[test]
    fn shuffled_loader_visits_every_sample_once_per_epoch() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let dataset = InMemDataset::new((0..20).map(|i| synthetic_item(i, i as u8)).collect());

        let dataloader = DataLoaderBuilder::new(CifarBatcher::<TestBackend>::for_testing(&device))
            .batch_size(5)
            .shuffle(42)
            .num_workers(1)
            .set_device(device.clone())
            .build(dataset);

        let mut seen: Vec<i64> = Vec::new();
        for batch in dataloader.iter() {
            seen.extend(
                batch
                    .targets
                    .into_data()
                    .to_vec::<i64>()
                    .expect("Targets should convert to a vector"),
            );
        }

        assert_eq!(seen.len(), 20);
        seen.sort_unstable();
        let expected: Vec<i64> = (0..20).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn evaluation_is_deterministic_on_a_frozen_model() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let model = CnnConfig::new(2).init::<TestBackend>(&device);

        let dataloader = DataLoaderBuilder::new(CifarBatcher::<TestBackend>::for_testing(&device))
            .batch_size(5)
            .num_workers(1)
            .set_device(device.clone())
            .build(synthetic_dataset(10, 2));

        let first = evaluate(&model, dataloader.clone());
        let second = evaluate(&model, dataloader);

        assert_eq!(first, second);
    }

    #[test]
    fn tiny_run_produces_one_accuracy_per_batch() {
        let device = Default::default();
        let config = TrainingConfig::new(CnnConfig::new(2), SgdConfig::new())
            .with_num_epochs(1)
            .with_batch_size(5)
            .with_num_workers(1);

        let summary = train::<TestAutodiffBackend, _>(
            device,
            synthetic_dataset(20, 2),
            synthetic_dataset(20, 2),
            config,
        );

        assert_eq!(summary.train_accuracies.len(), 4);
        assert!(summary.test_accuracy >= 0.0);
        assert!(summary.test_accuracy <= 1.0);
        for value in summary.train_accuracies {
            assert!((0.0..=1.0).contains(&value));
        }
    }
}
