//! In-process generator doubles: a JSON-tree runtime plus fake catalog/host.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use perch_core::AssignedValue;
use serde_json::{Value, json};

use super::{
    GeneratorCatalog, GeneratorError, GeneratorRuntime, OutputPath, RuntimeError, RuntimeHost,
};

pub(crate) type Evaluator = Arc<dyn Fn(&Value, &str) -> Result<String, String> + Send + Sync>;

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| if item.is_null() { String::new() } else { js_string(item) })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn assign_into(tree: &mut Value, parents: &[String], leaf: &str, value: Value) {
    let mut current = Some(tree);
    for segment in parents {
        current = match current {
            Some(node) if truthy(node) => node.get_mut(segment.as_str()),
            other => other,
        };
    }
    if let Some(Value::Object(map)) = current {
        map.insert(leaf.to_string(), value);
    }
}

/// Runtime over a JSON tree with JS-like read and assign semantics.
pub(crate) struct MemoryRuntime {
    root: Mutex<Value>,
    window: Mutex<Value>,
    evaluator: Option<Evaluator>,
    unready_polls: AtomicU32,
    closed: AtomicBool,
}

impl MemoryRuntime {
    pub(crate) fn new(root: Value) -> Self {
        Self {
            root: Mutex::new(root),
            window: Mutex::new(json!({})),
            evaluator: None,
            unready_polls: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn root(&self) -> Value {
        self.root.lock().unwrap().clone()
    }

    pub(crate) fn window(&self) -> Value {
        self.window.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), RuntimeError> {
        if self.is_closed() {
            return Err(RuntimeError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl GeneratorRuntime for MemoryRuntime {
    async fn is_ready(&self) -> Result<bool, RuntimeError> {
        self.ensure_open()?;
        let pending = self.unready_polls.load(Ordering::SeqCst);
        if pending > 0 {
            self.unready_polls.store(pending - 1, Ordering::SeqCst);
            return Ok(false);
        }
        Ok(true)
    }

    async fn has_output(&self, field: &str) -> Result<bool, RuntimeError> {
        self.ensure_open()?;
        Ok(self.root.lock().unwrap().get(field).is_some_and(truthy))
    }

    async fn read_output(&self, path: &OutputPath) -> Result<String, RuntimeError> {
        self.ensure_open()?;
        let root = self.root.lock().unwrap();
        let (parents, leaf) = path.split_leaf();

        let mut current = Some(&*root);
        for segment in parents {
            current = match current {
                Some(node) if truthy(node) => node.get(segment.as_str()),
                other => other,
            };
        }

        match current {
            None => Err(RuntimeError::Script(format!(
                "Cannot read properties of undefined (reading '{leaf}')"
            ))),
            Some(Value::Null) => Err(RuntimeError::Script(format!(
                "Cannot read properties of null (reading '{leaf}')"
            ))),
            Some(node) => Ok(node
                .get(leaf)
                .map(js_string)
                .unwrap_or_else(|| "undefined".to_string())),
        }
    }

    async fn assign(&self, path: &OutputPath, value: &AssignedValue) -> Result<(), RuntimeError> {
        self.ensure_open()?;
        let value = serde_json::to_value(value).map_err(|e| RuntimeError::Sandbox(e.to_string()))?;
        let (parents, leaf) = path.split_leaf();
        assign_into(&mut self.window.lock().unwrap(), parents, leaf, value.clone());
        assign_into(&mut self.root.lock().unwrap(), parents, leaf, value);
        Ok(())
    }

    async fn evaluate(&self, code: &str) -> Result<String, RuntimeError> {
        self.ensure_open()?;
        let evaluator = self.evaluator.as_ref().ok_or(RuntimeError::EvaluatorMissing)?;
        let root = self.root();
        evaluator(&root, code).map_err(RuntimeError::Script)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Catalog serving placeholder pages with a settable edit time.
#[derive(Default)]
pub(crate) struct FakeCatalog {
    missing: HashSet<String>,
    edit_time: AtomicI64,
    stats_failing: AtomicBool,
    stats_calls: AtomicUsize,
    downloads: AtomicUsize,
}

impl FakeCatalog {
    pub(crate) fn with_missing(mut self, name: &str) -> Self {
        self.missing.insert(name.to_string());
        self
    }

    pub(crate) fn set_edit_time(&self, epoch_ms: i64) {
        self.edit_time.store(epoch_ms, Ordering::SeqCst);
    }

    pub(crate) fn fail_stats(&self, failing: bool) {
        self.stats_failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeneratorCatalog for FakeCatalog {
    async fn download(&self, name: &str) -> Result<String, GeneratorError> {
        if self.missing.contains(name) {
            return Err(GeneratorError::NotFound(name.to_string()));
        }
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(format!("<html><body>{name}</body></html>"))
    }

    async fn last_edit_time(&self, _name: &str) -> Result<i64, GeneratorError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        if self.stats_failing.load(Ordering::SeqCst) {
            return Err(GeneratorError::Request("stats unavailable".into()));
        }
        Ok(self.edit_time.load(Ordering::SeqCst))
    }
}

/// Host that boots [`MemoryRuntime`]s from per-generator trees.
pub(crate) struct FakeHost {
    unready_polls: u32,
    trees: HashMap<String, Value>,
    evaluator: Option<Evaluator>,
    booted: Mutex<Vec<(String, Arc<MemoryRuntime>)>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::ready_after(0)
    }
}

impl FakeHost {
    pub(crate) fn ready_after(polls: u32) -> Self {
        Self {
            unready_polls: polls,
            trees: HashMap::new(),
            evaluator: None,
            booted: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn never_ready() -> Self {
        Self::ready_after(u32::MAX)
    }

    pub(crate) fn with_tree(mut self, name: &str, tree: Value) -> Self {
        self.trees.insert(name.to_string(), tree);
        self
    }

    pub(crate) fn with_evaluator(
        mut self,
        evaluator: impl Fn(&Value, &str) -> Result<String, String> + Send + Sync + 'static,
    ) -> Self {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    pub(crate) fn booted(&self) -> Vec<String> {
        self.booted
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub(crate) fn runtime(&self, index: usize) -> Arc<MemoryRuntime> {
        self.booted.lock().unwrap()[index].1.clone()
    }
}

#[async_trait]
impl RuntimeHost for FakeHost {
    async fn boot(
        &self,
        name: &str,
        _html: String,
    ) -> Result<Arc<dyn GeneratorRuntime>, RuntimeError> {
        let mut runtime =
            MemoryRuntime::new(self.trees.get(name).cloned().unwrap_or_else(|| json!({})));
        runtime.evaluator = self.evaluator.clone();
        runtime.unready_polls = AtomicU32::new(self.unready_polls);

        let runtime = Arc::new(runtime);
        self.booted
            .lock()
            .unwrap()
            .push((name.to_string(), runtime.clone()));
        Ok(runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_follow_js_semantics() {
        let runtime = MemoryRuntime::new(json!({
            "output": "hi",
            "n": 3,
            "list": ["a", "b"],
            "zero": 0,
        }));

        assert_eq!(runtime.read_output(&"output".into()).await.unwrap(), "hi");
        assert_eq!(runtime.read_output(&"n".into()).await.unwrap(), "3");
        assert_eq!(runtime.read_output(&"list".into()).await.unwrap(), "a,b");
        assert_eq!(runtime.read_output(&"missing".into()).await.unwrap(), "undefined");
        assert_eq!(runtime.read_output(&"zero.x".into()).await.unwrap(), "undefined");
        assert_eq!(
            runtime.read_output(&"missing.x".into()).await.unwrap_err(),
            RuntimeError::Script("Cannot read properties of undefined (reading 'x')".into())
        );
    }

    #[tokio::test]
    async fn assign_through_missing_parent_is_ignored() {
        let runtime = MemoryRuntime::new(json!({ "a": {} }));

        runtime
            .assign(&"nope.deep".into(), &AssignedValue::Number(1.0))
            .await
            .unwrap();
        runtime
            .assign(&"a.b".into(), &AssignedValue::Bool(true))
            .await
            .unwrap();

        assert_eq!(runtime.root(), json!({ "a": { "b": true } }));
    }

    #[tokio::test]
    async fn closed_runtime_rejects_calls() {
        let runtime = MemoryRuntime::new(json!({}));
        runtime.close().await;
        assert_eq!(runtime.is_ready().await.unwrap_err(), RuntimeError::Closed);
    }
}
