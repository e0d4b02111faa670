/// Failures raised inside a generator sandbox.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// The generator's own script threw; carries the script error message.
    #[error("{0}")]
    Script(String),

    #[error("this generator engine has no text evaluator")]
    EvaluatorMissing,

    #[error("the generator sandbox was closed")]
    Closed,

    #[error("sandbox failure: {0}")]
    Sandbox(String),
}

/// Errors surfaced to chat users. The `Display` text is the reply body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeneratorError {
    #[error("Error: There's no generator called '{0}'.")]
    NotFound(String),

    #[error("Error: Couldn't initialize '{0}' - it took too long.")]
    Timeout(String),

    #[error("Error: No 'botOutput', '$output' or 'output' list in the '{0}' generator?")]
    NoOutputField(String),

    #[error("Error: Couldn't reach the generator server ({0}).")]
    Request(String),

    #[error("Error: {0}")]
    Runtime(#[from] RuntimeError),
}
