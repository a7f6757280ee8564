pub mod data;
pub mod dataset;
pub mod model;
pub mod plot;
pub mod training;

pub use dataset::CifarDataset;
