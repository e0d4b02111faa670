use std::sync::Arc;

use async_trait::async_trait;
use perch_core::AssignedValue;

use super::{OutputPath, RuntimeError};

/// A booted generator: one sandboxed script context holding `root`.
///
/// Paths follow permissive traversal rules: assigning through a missing
/// intermediate node is a silent no-op, reading through one is an error.
#[async_trait]
pub trait GeneratorRuntime: Send + Sync {
    /// Whether the generator has finished booting and exposes its root.
    async fn is_ready(&self) -> Result<bool, RuntimeError>;

    /// Whether `root[field]` exists and is truthy.
    async fn has_output(&self, field: &str) -> Result<bool, RuntimeError>;

    /// Stringified value at `path` below the root.
    async fn read_output(&self, path: &OutputPath) -> Result<String, RuntimeError>;

    /// Set `path` on both the root and the page's global scope.
    async fn assign(&self, path: &OutputPath, value: &AssignedValue) -> Result<(), RuntimeError>;

    /// Evaluate Perchance text (e.g. `the [animal] sat`) against the root.
    async fn evaluate(&self, code: &str) -> Result<String, RuntimeError>;

    /// Release the sandbox. Later calls fail with [`RuntimeError::Closed`].
    async fn close(&self);
}

/// Boots generator pages into fresh sandboxes.
#[async_trait]
pub trait RuntimeHost: Send + Sync {
    async fn boot(&self, name: &str, html: String)
    -> Result<Arc<dyn GeneratorRuntime>, RuntimeError>;
}
