//! Downscaling saliency core library.
//!
//! Relevance maps for climate downscaling models by prediction-difference
//! analysis:
//! - Gridded tensors, output locations and the model capability trait
//! - Distributional losses (Bernoulli-Gamma, Gaussian)
//! - Baseline resampling and the relevance engine
//! - Settings loading, structured logging, progress events and exit codes
//!
//! The binary entry point is in `main.rs`.

pub mod baseline;
pub mod config;
pub mod events;
pub mod exit_codes;
pub mod grid;
pub mod io;
pub mod logging;
pub mod loss;
pub mod model;
pub mod relevance;
pub mod report;
pub mod tensor;

pub use baseline::{Baseline, SamplingScope};
pub use grid::{GridExtent, OutputLocation, TrainingTemplate};
pub use loss::DistributionalLoss;
pub use model::{ConstantPredictor, LinearReadout, ModelCheckpoint, Predictor};
pub use relevance::{
    compute_relevance_maps, AbortHandle, RelevanceEngine, RelevanceMap, RelevanceOptions,
    RelevanceRun, UnitScheme,
};
pub use tensor::{ChannelTensor, GridMetadata};
