//! Relevance maps by prediction-difference analysis.
//!
//! - `units`: how a sample is split into perturbation units
//! - `engine`: scoring, parallel execution and failure accounting
//! - `map`: the resulting `(sample, row, col, channel, location)` scores

pub mod engine;
pub mod map;
pub mod units;

pub use engine::{
    compute_relevance_maps, unit_seed, AbortHandle, RelevanceEngine, RelevanceOptions,
    RelevanceRun, SampleScorer,
};
pub use map::{RelevanceMap, RelevanceMapDocument};
pub use units::{Unit, UnitScheme};
