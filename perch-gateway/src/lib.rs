pub mod discord;
pub mod generator;
pub mod pipeline;
pub mod rate_limit;
pub mod render;
pub mod server;
pub mod state;
pub mod web;

pub use generator::{GeneratorCache, GeneratorError, Resolver, RuntimeError};
pub use pipeline::{Outcome, Pipeline};
pub use rate_limit::RateLimitGate;
pub use state::AppState;
