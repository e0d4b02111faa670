//! Generator instances: loading, caching and resolving output.
//!
//! A generator is a Perchance page downloaded by name and booted inside a
//! sandboxed browser tab. [`GeneratorCache`] owns the booted instances,
//! [`Resolver`] turns a command into output text.

mod cache;
pub mod chromium;
mod error;
mod loader;
mod path;
pub mod perchance;
mod resolver;
mod runtime;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheOptions, GeneratorCache};
pub use error::{GeneratorError, RuntimeError};
pub use loader::{GeneratorCatalog, GeneratorLoader, LoadPolicy};
pub use path::OutputPath;
pub use resolver::{DEFAULT_OUTPUT_FIELDS, Resolver};
pub use runtime::{GeneratorRuntime, RuntimeHost};
