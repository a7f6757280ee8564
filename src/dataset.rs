use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tar::Archive;

use burn::data::dataset::{Dataset, InMemDataset};
use burn::data::network::downloader;

/// Canonical binary distribution of the CIFAR-10 dataset.
const URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";

/// Image width.
pub const WIDTH: usize = 32;
/// Image height.
pub const HEIGHT: usize = 32;
/// Color channels per image.
pub const CHANNELS: usize = 3;
/// Number of classes.
pub const NUM_CLASSES: usize = 10;

/// Pixel bytes per image, stored channel-first (all red rows, then green, then blue).
pub const IMAGE_BYTES: usize = CHANNELS * HEIGHT * WIDTH;

/// One record of the binary format: a label byte followed by the pixel bytes.
const RECORD_BYTES: usize = 1 + IMAGE_BYTES;

/// CIFAR-10 item.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CifarItem {
    /// Image as channel-first bytes.
    pub image: Vec<u8>,

    /// Label of the image.
    pub label: u8,
}

/// The CIFAR-10 dataset consists of 60,000 32x32 color images in 10 classes, with 6,000 images
/// per class. There are 50,000 training images and 10,000 test images.
///
/// The data is downloaded from the web from the [University of Toronto mirror](https://www.cs.toronto.edu/~kriz/cifar.html).
pub struct CifarDataset {
    dataset: InMemDataset<CifarItem>,
}

impl Dataset<CifarItem> for CifarDataset {
    fn get(&self, index: usize) -> Option<CifarItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl CifarDataset {
    /// Creates a new train dataset.
    pub fn train() -> Self {
        Self::new("train")
    }

    /// Creates a new test dataset.
    pub fn test() -> Self {
        Self::new("test")
    }

    fn new(split: &str) -> Self {
        let root = Self::download();

        let files: Vec<PathBuf> = match split {
            "train" => (1..=5)
                .map(|batch| root.join(format!("data_batch_{batch}.bin")))
                .collect(),
            "test" => vec![root.join("test_batch.bin")],
            _ => panic!("Invalid split specified {split}"),
        };

        // The full dataset is small enough to keep in memory (~180Mb of pixel bytes).
        let mut items = Vec::with_capacity(files.len() * 10_000);
        for file in files {
            let mut bytes = Vec::new();
            File::open(&file)
                .unwrap_or_else(|_| panic!("Should be able to open {}", file.display()))
                .read_to_end(&mut bytes)
                .expect("Should be able to read batch file");
            items.append(&mut Self::parse_records(&bytes));
        }

        Self {
            dataset: InMemDataset::new(items),
        }
    }

    /// Download the CIFAR-10 archive and unpack it in the cache directory.
    /// Panics if the download cannot be completed or the archive cannot be unpacked.
    fn download() -> PathBuf {
        // Dataset files are stored in the cache directory
        let cache_dir = dirs::cache_dir()
            .expect("Could not get cache directory")
            .join("cifar10");
        let cifar_dir = cache_dir.join("cifar-10-batches-bin");

        // Check for already downloaded content
        if !cifar_dir.exists() {
            log::info!("Downloading CIFAR-10 dataset from {URL}");

            // Download gzip file
            let bytes = downloader::download_file_as_bytes(URL, "cifar-10-binary.tar.gz");

            // Decode gzip file content and unpack archive
            let gz_buffer = GzDecoder::new(&bytes[..]);
            let mut archive = Archive::new(gz_buffer);
            archive
                .unpack(&cache_dir)
                .expect("Should be able to unpack the CIFAR-10 archive");
        }

        cifar_dir
    }

    /// Split the raw bytes of a batch file into labeled records.
    fn parse_records(bytes: &[u8]) -> Vec<CifarItem> {
        debug_assert_eq!(bytes.len() % RECORD_BYTES, 0);

        bytes
            .chunks_exact(RECORD_BYTES)
            .map(|record| CifarItem {
                image: record[1..].to_vec(),
                label: record[0],
            })
            .collect()
    }
}
