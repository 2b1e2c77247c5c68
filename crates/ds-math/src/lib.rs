//! Downscaling saliency math utilities.

pub mod math;

pub use math::stable::*;
pub use math::bernoulli;
pub use math::bernoulli_gamma;
pub use math::gamma::*;
pub use math::normal;
