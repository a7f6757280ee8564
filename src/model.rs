use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AvgPool2d, AvgPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::activation::softmax,
};

/// Configuration to create the [classifier](Cnn).
#[derive(Config, Debug)]
pub struct CnnConfig {
    /// Number of output classes.
    pub num_classes: usize,
    /// Width of the fully-connected hidden layer.
    #[config(default = 64)]
    pub hidden_size: usize,
}

/// Small convolutional network for 32x32 color images.
///
/// Three convolution blocks (convolution, batch norm, ReLU, 2x average pooling)
/// followed by two fully-connected layers. The output is a per-class
/// probability distribution.
#[derive(Module, Debug)]
pub struct Cnn<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    bn2: BatchNorm<B, 2>,
    bn3: BatchNorm<B, 2>,
    bn4: BatchNorm<B, 0>,
    pool: AvgPool2d,
    fc1: Linear<B>,
    fc2: Linear<B>,
    activation: Relu,
}

impl CnnConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> Cnn<B> {
        let padding = PaddingConfig2d::Explicit(2, 2);

        Cnn {
            conv1: Conv2dConfig::new([3, 32], [5, 5])
                .with_padding(padding.clone())
                .init(device),
            conv2: Conv2dConfig::new([32, 32], [5, 5])
                .with_padding(padding.clone())
                .init(device),
            conv3: Conv2dConfig::new([32, 64], [5, 5])
                .with_padding(padding)
                .init(device),
            bn1: BatchNormConfig::new(32).init(device),
            bn2: BatchNormConfig::new(32).init(device),
            bn3: BatchNormConfig::new(64).init(device),
            bn4: BatchNormConfig::new(self.hidden_size).init(device),
            pool: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            // Three 2x downsamples reduce 32x32 to 4x4 at 64 channels.
            fc1: LinearConfig::new(64 * 4 * 4, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> Cnn<B> {
    /// Maps an image batch `[batch_size, 3, 32, 32]` to per-class probabilities
    /// `[batch_size, num_classes]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(input);
        let x = self.activation.forward(self.bn1.forward(x));
        let x = self.pool.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(self.bn2.forward(x));
        let x = self.pool.forward(x);

        let x = self.conv3.forward(x);
        let x = self.activation.forward(self.bn3.forward(x));
        let x = self.pool.forward(x);

        let x = x.flatten::<2>(1, 3);
        let x = self.activation.forward(self.bn4.forward(self.fc1.forward(x)));

        softmax(self.fc2.forward(x), 1)
    }
}
