use burn::{data::dataloader::batcher::Batcher, prelude::*};
use rand::Rng;

use crate::dataset::{CifarItem, CHANNELS, HEIGHT, IMAGE_BYTES, WIDTH};

// Per-channel mean and std values applied after scaling pixels to [0, 1].
const MEAN: [f32; 3] = [0.0, 0.0, 0.0];
const STD: [f32; 3] = [1.0, 1.0, 1.0];

/// Zero padding added to each spatial edge before the random crop.
const CROP_PADDING: usize = 4;

/// Normalizer for the CIFAR-10 dataset.
#[derive(Clone)]
pub struct Normalizer<B: Backend> {
    pub mean: Tensor<B, 4>,
    pub std: Tensor<B, 4>,
}

impl<B: Backend> Normalizer<B> {
    /// Creates a new normalizer.
    pub fn new(device: &Device<B>) -> Self {
        let mean = Tensor::<B, 1>::from_floats(MEAN, device).reshape([1, 3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(STD, device).reshape([1, 3, 1, 1]);
        Self { mean, std }
    }

    /// Normalizes the input image according to `input = (input - mean) / std`.
    ///
    /// The input image should be in the range [0, 1].
    pub fn normalize(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        (input - self.mean.clone()) / self.std.clone()
    }

    /// Returns a new normalizer on the given device.
    pub fn to_device(&self, device: &B::Device) -> Self {
        Self {
            mean: self.mean.clone().to_device(device),
            std: self.std.clone().to_device(device),
        }
    }
}

#[derive(Clone)]
pub struct CifarBatcher<B: Backend> {
    normalizer: Normalizer<B>,
    augment: bool,
}

#[derive(Clone, Debug)]
pub struct CifarBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> CifarBatcher<B> {
    /// Batcher for the training split: random flip and crop before normalization.
    pub fn for_training(device: &Device<B>) -> Self {
        Self {
            normalizer: Normalizer::new(device),
            augment: true,
        }
    }

    /// Batcher for the test split: normalization only.
    pub fn for_testing(device: &Device<B>) -> Self {
        Self {
            normalizer: Normalizer::new(device),
            augment: false,
        }
    }
}

/// Randomly flips the image horizontally, then pads and crops it back to its
/// original size at a random offset.
fn augment<B: Backend>(image: Tensor<B, 3>) -> Tensor<B, 3> {
    let mut rng = rand::rng();

    let image = if rng.random_bool(0.5) {
        image.flip([2])
    } else {
        image
    };

    let padded = image.pad(
        (CROP_PADDING, CROP_PADDING, CROP_PADDING, CROP_PADDING),
        0.0.elem::<B::FloatElem>(),
    );
    let top = rng.random_range(0..=2 * CROP_PADDING);
    let left = rng.random_range(0..=2 * CROP_PADDING);

    padded.slice([0..CHANNELS, top..top + HEIGHT, left..left + WIDTH])
}

impl<B: Backend> Batcher<B, CifarItem, CifarBatch<B>> for CifarBatcher<B> {
    fn batch(&self, items: Vec<CifarItem>, device: &B::Device) -> CifarBatch<B> {
        let targets = items
            .iter()
            .map(|item| {
                Tensor::<B, 1, Int>::from_data(
                    TensorData::from([(item.label as i64).elem::<B::IntElem>()]),
                    device,
                )
            })
            .collect();

        let images = items
            .into_iter()
            .map(|item| {
                debug_assert_eq!(item.image.len(), IMAGE_BYTES);
                TensorData::new(item.image, Shape::new([CHANNELS, HEIGHT, WIDTH]))
            })
            .map(|data| Tensor::<B, 3>::from_data(data.convert::<B::FloatElem>(), device))
            .map(|tensor| tensor / 255) // scale between [0, 1]
            .map(|tensor| {
                if self.augment {
                    augment(tensor)
                } else {
                    tensor
                }
            })
            .collect();

        let images = Tensor::stack(images, 0);
        let targets = Tensor::cat(targets, 0);

        let images = self.normalizer.to_device(device).normalize(images);

        CifarBatch { images, targets }
    }
}
