use std::sync::Arc;

use perch_core::{Assignment, command::CODE_MARKER};
use tracing::debug;

use super::{GeneratorCache, GeneratorError, GeneratorRuntime, OutputPath};

/// Output fields probed, in order, when no list is named.
pub const DEFAULT_OUTPUT_FIELDS: [&str; 3] = ["botOutput", "$output", "output"];

/// What to read from a generator after assignments are applied.
enum Selector<'a> {
    Code(&'a str),
    List(OutputPath),
    Default,
}

impl<'a> Selector<'a> {
    fn parse(raw: Option<&'a str>) -> Self {
        match raw {
            None | Some("") => Self::Default,
            Some(raw) => match raw.strip_prefix(CODE_MARKER) {
                Some(code) => Self::Code(code),
                None => Self::List(OutputPath::parse(raw)),
            },
        }
    }
}

/// Turns a generator name, selector and assignments into output text.
pub struct Resolver {
    cache: Arc<GeneratorCache>,
}

impl Resolver {
    pub fn new(cache: Arc<GeneratorCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &GeneratorCache {
        &self.cache
    }

    /// Resolve one result.
    ///
    /// Script errors while evaluating inline code or reading a list become the
    /// result text; load failures and a missing output field are errors.
    pub async fn resolve(
        &self,
        generator: &str,
        selector: Option<&str>,
        assignments: &[Assignment],
    ) -> Result<String, GeneratorError> {
        let runtime = self.cache.get_or_load(generator).await?;

        for assignment in assignments {
            let path = OutputPath::parse(&assignment.path);
            runtime.assign(&path, &assignment.value).await?;
        }

        let text = match Selector::parse(selector) {
            Selector::Code(code) => match runtime.evaluate(code).await {
                Ok(text) => text,
                Err(err) => {
                    debug!(generator, error = %err, "inline code failed");
                    err.to_string()
                }
            },
            Selector::List(path) => read_list(runtime.as_ref(), &path).await,
            Selector::Default => {
                let field = default_field(runtime.as_ref())
                    .await?
                    .ok_or_else(|| GeneratorError::NoOutputField(generator.to_string()))?;
                read_list(runtime.as_ref(), &OutputPath::parse(field)).await
            }
        };

        Ok(if text.is_empty() { " ".to_string() } else { text })
    }

    /// Like [`Resolver::resolve`], with errors rendered as their reply text.
    pub async fn resolve_text(
        &self,
        generator: &str,
        selector: Option<&str>,
        assignments: &[Assignment],
    ) -> String {
        self.resolve(generator, selector, assignments)
            .await
            .unwrap_or_else(|err| err.to_string())
    }
}

async fn default_field(
    runtime: &dyn GeneratorRuntime,
) -> Result<Option<&'static str>, GeneratorError> {
    for field in DEFAULT_OUTPUT_FIELDS {
        if runtime.has_output(field).await? {
            return Ok(Some(field));
        }
    }
    Ok(None)
}

async fn read_list(runtime: &dyn GeneratorRuntime, path: &OutputPath) -> String {
    match runtime.read_output(path).await {
        Ok(text) => text,
        Err(err) => format!("Error: {err}"),
    }
}
