#![recursion_limit = "256"]

use burn::{
    optim::{decay::WeightDecayConfig, SgdConfig},
    tensor::backend::AutodiffBackend,
};

use cifar_classification::{
    dataset::{CifarDataset, NUM_CLASSES},
    model::CnnConfig,
    plot::AccuracyPlot,
    training::{self, TrainingConfig},
};

pub fn launch<B: AutodiffBackend>(device: B::Device) {
    log::info!("Training on {device:?}");

    let config = TrainingConfig::new(
        CnnConfig::new(NUM_CLASSES),
        SgdConfig::new().with_weight_decay(Some(WeightDecayConfig::new(1e-5))),
    );

    let summary = training::train::<B, _>(
        device,
        CifarDataset::train(),
        CifarDataset::test(),
        config,
    );

    println!("{}", summary.test_accuracy);
    println!(
        "{}",
        AccuracyPlot::new(summary.train_accuracies)
            .render("Classification accuracies (training) over minibatches")
    );
}

#[cfg(any(
    feature = "ndarray",
    feature = "ndarray-blas-netlib",
    feature = "ndarray-blas-openblas",
    feature = "ndarray-blas-accelerate",
))]
mod ndarray {
    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };

    use crate::launch;

    pub fn run() {
        launch::<Autodiff<NdArray<f32>>>(NdArrayDevice::Cpu);
    }
}

#[cfg(feature = "tch-gpu")]
mod tch_gpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };

    use crate::launch;

    pub fn run() {
        #[cfg(not(target_os = "macos"))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(target_os = "macos")]
        let device = LibTorchDevice::Mps;

        launch::<Autodiff<LibTorch<f32>>>(device);
    }
}

#[cfg(feature = "tch-cpu")]
mod tch_cpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };

    use crate::launch;

    pub fn run() {
        launch::<Autodiff<LibTorch<f32>>>(LibTorchDevice::Cpu);
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use burn::backend::{wgpu::Wgpu, Autodiff};

    use crate::launch;

    pub fn run() {
        launch::<Autodiff<Wgpu<f32, i32>>>(Default::default());
    }
}

#[cfg(feature = "cuda")]
mod cuda {
    use burn::backend::{Autodiff, Cuda};

    use crate::launch;

    pub fn run() {
        launch::<Autodiff<Cuda<f32, i32>>>(Default::default());
    }
}

fn main() {
    env_logger::init();

    #[cfg(any(
        feature = "ndarray",
        feature = "ndarray-blas-netlib",
        feature = "ndarray-blas-openblas",
        feature = "ndarray-blas-accelerate",
    ))]
    ndarray::run();
    #[cfg(feature = "tch-gpu")]
    tch_gpu::run();
    #[cfg(feature = "tch-cpu")]
    tch_cpu::run();
    #[cfg(feature = "wgpu")]
    wgpu::run();
    #[cfg(feature = "cuda")]
    cuda::run();
}
