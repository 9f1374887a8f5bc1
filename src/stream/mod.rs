//! Stream utilities for status observers

mod sample;

pub use sample::{SampleExt, Sampled};
