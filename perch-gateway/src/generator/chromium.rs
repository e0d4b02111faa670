//! Headless Chromium sandbox for generator pages.
//!
//! One browser process is shared by every generator; each generator gets its
//! own tab. All interaction goes through `Runtime.evaluate` with small
//! self-contained scripts that report `{ ok, value | error }` so script
//! exceptions come back as data instead of protocol failures.

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use perch_core::{AssignedValue, BrowserSettings};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{GeneratorRuntime, OutputPath, RuntimeError, RuntimeHost};

/// Owns the browser process and its CDP event loop.
pub struct ChromiumHost {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
}

impl ChromiumHost {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self, RuntimeError> {
        let mut builder = BrowserConfig::builder();
        if !settings.headless {
            builder = builder.with_head();
        }
        if settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(executable) = &settings.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(RuntimeError::Sandbox)?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .map_err(|e| RuntimeError::Sandbox(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(err) = event {
                    // Page scripts misbehave all the time; keep the loop alive.
                    debug!(error = %err, "browser event error");
                }
            }
        });

        info!(headless = settings.headless, "Generator browser launched");
        Ok(Self {
            browser: Mutex::new(browser),
            handler,
        })
    }

    pub async fn shutdown(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(err) = browser.close().await {
            warn!(error = %err, "failed to close generator browser");
        }
        let _ = browser.wait().await;
        self.handler.abort();
    }
}

#[async_trait]
impl RuntimeHost for ChromiumHost {
    async fn boot(
        &self,
        name: &str,
        html: String,
    ) -> Result<Arc<dyn GeneratorRuntime>, RuntimeError> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| RuntimeError::Sandbox(e.to_string()))?
        };

        if let Err(err) = page.set_content(html).await {
            // A page that errors while loading may still finish booting.
            debug!(generator = name, error = %err, "generator page reported a load error");
        }

        Ok(Arc::new(ChromiumRuntime {
            name: name.to_string(),
            page: Mutex::new(Some(page)),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ScriptOutcome<T> {
    ok: bool,
    value: Option<T>,
    error: Option<String>,
    #[serde(default)]
    missing_evaluator: bool,
}

/// One generator tab.
pub struct ChromiumRuntime {
    name: String,
    page: Mutex<Option<Page>>,
}

impl ChromiumRuntime {
    async fn page(&self) -> Result<Page, RuntimeError> {
        self.page.lock().await.clone().ok_or(RuntimeError::Closed)
    }

    async fn run<T: DeserializeOwned>(&self, script: String) -> Result<Option<T>, RuntimeError> {
        let page = self.page().await?;
        let result = page
            .evaluate_expression(script)
            .await
            .map_err(|e| RuntimeError::Sandbox(e.to_string()))?;
        let outcome: ScriptOutcome<T> = result
            .into_value()
            .map_err(|e| RuntimeError::Sandbox(format!("unexpected script result: {e}")))?;

        if outcome.ok {
            return Ok(outcome.value);
        }
        if outcome.missing_evaluator {
            return Err(RuntimeError::EvaluatorMissing);
        }
        Err(RuntimeError::Script(
            outcome.error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

/// Wraps a script body so exceptions are reported as `{ ok: false, error }`.
fn guarded(body: &str) -> String {
    format!(
        "(() => {{ try {{ {body} }} catch (e) {{ \
         return {{ ok: false, error: String(e && e.message !== undefined ? e.message : e) }}; }} }})()"
    )
}

fn json_literal<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

#[async_trait]
impl GeneratorRuntime for ChromiumRuntime {
    async fn is_ready(&self) -> Result<bool, RuntimeError> {
        let script = guarded("return { ok: true, value: Boolean(window.root) };");
        Ok(self.run::<bool>(script).await?.unwrap_or(false))
    }

    async fn has_output(&self, field: &str) -> Result<bool, RuntimeError> {
        let script = guarded(&format!(
            "return {{ ok: true, value: Boolean(window.root && window.root[{}]) }};",
            json_literal(field)
        ));
        Ok(self.run::<bool>(script).await?.unwrap_or(false))
    }

    async fn read_output(&self, path: &OutputPath) -> Result<String, RuntimeError> {
        let script = guarded(&format!(
            "const parts = {}; const last = parts.pop(); let r = window.root; \
             for (const n of parts) {{ if (r) r = r[n]; }} \
             return {{ ok: true, value: String(r[last]) }};",
            path.to_json()
        ));
        Ok(self.run::<String>(script).await?.unwrap_or_default())
    }

    async fn assign(&self, path: &OutputPath, value: &AssignedValue) -> Result<(), RuntimeError> {
        let script = guarded(&format!(
            "const parts = {}; const last = parts.pop(); const value = {}; \
             let w = window; let r = window.root; \
             for (const n of parts) {{ if (w) w = w[n]; if (r) r = r[n]; }} \
             if (w) w[last] = value; if (r) r[last] = value; \
             return {{ ok: true, value: null }};",
            path.to_json(),
            json_literal(value)
        ));
        self.run::<serde_json::Value>(script).await?;
        Ok(())
    }

    async fn evaluate(&self, code: &str) -> Result<String, RuntimeError> {
        let script = guarded(&format!(
            "if (typeof window.__evaluateText !== 'function') \
             return {{ ok: false, missing_evaluator: true }}; \
             const out = window.__evaluateText(window.root, window.root, {}); \
             return {{ ok: true, value: String(out) }};",
            json_literal(code)
        ));
        Ok(self.run::<String>(script).await?.unwrap_or_default())
    }

    async fn close(&self) {
        let Some(page) = self.page.lock().await.take() else {
            return;
        };
        if let Err(err) = page.close().await {
            warn!(generator = %self.name, error = %err, "failed to close generator tab");
        }
    }
}
