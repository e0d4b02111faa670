//! Outbound web lookups: search-engine fallback for generator names.

pub mod cache;
pub mod search;

pub use search::{GeneratorFinder, GeneratorSearch, SearchError, extract_generator_name};
