//! Core math modules.

pub mod stable;
pub mod bernoulli;
pub mod bernoulli_gamma;
pub mod gamma;
pub mod normal;
