use std::fmt;

/// Dot-separated path into a generator's output graph, e.g. `city.stats.population`.
///
/// Segments are kept verbatim (empty segments included) so the path walks
/// exactly the keys the user typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPath {
    segments: Vec<String>,
}

impl OutputPath {
    pub fn parse(raw: &str) -> Self {
        Self {
            segments: raw.split('.').map(str::to_string).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Intermediate segments and the final key.
    pub fn split_leaf(&self) -> (&[String], &str) {
        match self.segments.split_last() {
            Some((leaf, parents)) => (parents, leaf.as_str()),
            None => (&[], ""),
        }
    }

    /// JSON array literal of the segments, safe to splice into a script.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.segments).unwrap_or_else(|_| "[]".to_string())
    }
}

impl From<&str> for OutputPath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for OutputPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}
