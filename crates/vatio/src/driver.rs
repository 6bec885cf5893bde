//! Page driver abstraction.
//!
//! Every DOM interaction goes through [`PageDriver`] so the locator and
//! playback logic are testable without a browser. The real CDP-backed
//! implementation lives in the `session` module behind the `browser`
//! feature; [`MockPage`] records call history and replays queued
//! evaluation results for unit tests.

use crate::config::SessionConfig;
use crate::error::{VatioError, VatioResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Async driver over a live page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL and wait for the document to commit.
    async fn goto(&self, url: &str) -> VatioResult<()>;

    /// Evaluate a JavaScript expression, returning its JSON value.
    async fn evaluate(&self, js: &str) -> VatioResult<Value>;

    /// Click at viewport coordinates.
    async fn click_at(&self, x: f64, y: f64) -> VatioResult<()>;

    /// Send a keyboard key (e.g. `"Escape"`).
    async fn press_key(&self, key: &str) -> VatioResult<()>;

    /// Sleep for a fixed settle period.
    async fn wait_ms(&self, ms: u64) -> VatioResult<()> {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        Ok(())
    }
}

/// A launched browser session: a page driver plus teardown.
#[async_trait]
pub trait Session: PageDriver {
    /// Close the session. Called exactly once per trial; implementations
    /// must tolerate a session that already died.
    async fn teardown(&mut self) -> VatioResult<()>;
}

// Lets a boxed session be handed to anything wanting a plain driver
#[async_trait]
impl PageDriver for Box<dyn Session> {
    async fn goto(&self, url: &str) -> VatioResult<()> {
        (**self).goto(url).await
    }

    async fn evaluate(&self, js: &str) -> VatioResult<Value> {
        (**self).evaluate(js).await
    }

    async fn click_at(&self, x: f64, y: f64) -> VatioResult<()> {
        (**self).click_at(x, y).await
    }

    async fn press_key(&self, key: &str) -> VatioResult<()> {
        (**self).press_key(key).await
    }

    async fn wait_ms(&self, ms: u64) -> VatioResult<()> {
        (**self).wait_ms(ms).await
    }
}

/// Launches sessions from configurations. The trial coordinator only
/// sees this trait, so tests substitute a mock launcher.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Launch a session for the configuration, navigated to its URL.
    async fn launch(&self, config: &SessionConfig) -> VatioResult<Box<dyn Session>>;
}

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// Navigation with URL
    Goto(String),
    /// Script evaluation with source
    Evaluate(String),
    /// Click at coordinates
    ClickAt(f64, f64),
    /// Key press with key name
    PressKey(String),
    /// Settle wait
    WaitMs(u64),
}

impl MockCall {
    /// Variant name for history queries.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Goto(_) => "goto",
            Self::Evaluate(_) => "evaluate",
            Self::ClickAt(_, _) => "click_at",
            Self::PressKey(_) => "press_key",
            Self::WaitMs(_) => "wait_ms",
        }
    }
}

#[derive(Debug, Default)]
struct MockPageInner {
    calls: Mutex<Vec<MockCall>>,
    eval_results: Mutex<VecDeque<Value>>,
    teardown_count: Mutex<u32>,
    fail_evaluate: Mutex<bool>,
}

/// In-memory page for tests. Clones share state so a test can keep a
/// handle while the coordinator owns the boxed session.
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    inner: Arc<MockPageInner>,
}

impl MockPage {
    /// Create an empty mock page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result returned by the next `evaluate` call. Calls
    /// beyond the queue yield `Value::Null`.
    pub fn queue_eval(&self, value: Value) {
        self.inner.eval_results.lock().unwrap().push_back(value);
    }

    /// Queue the same result `n` times.
    pub fn queue_eval_repeat(&self, value: Value, n: usize) {
        for _ in 0..n {
            self.queue_eval(value.clone());
        }
    }

    /// Make every subsequent `evaluate` fail with a driver error.
    pub fn fail_evaluations(&self) {
        *self.inner.fail_evaluate.lock().unwrap() = true;
    }

    /// Full call history.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Whether any call of the named kind was made.
    #[must_use]
    pub fn was_called(&self, name: &str) -> bool {
        self.calls().iter().any(|c| c.name() == name)
    }

    /// Number of calls of the named kind.
    #[must_use]
    pub fn call_count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.name() == name).count()
    }

    /// Number of click attempts.
    #[must_use]
    pub fn click_count(&self) -> usize {
        self.call_count("click_at")
    }

    /// How many times teardown ran.
    #[must_use]
    pub fn teardown_count(&self) -> u32 {
        *self.inner.teardown_count.lock().unwrap()
    }

    fn record(&self, call: MockCall) {
        self.inner.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn goto(&self, url: &str) -> VatioResult<()> {
        self.record(MockCall::Goto(url.to_string()));
        Ok(())
    }

    async fn evaluate(&self, js: &str) -> VatioResult<Value> {
        self.record(MockCall::Evaluate(js.to_string()));
        if *self.inner.fail_evaluate.lock().unwrap() {
            return Err(VatioError::driver("mock evaluation failure"));
        }
        Ok(self
            .inner
            .eval_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Value::Null))
    }

    async fn click_at(&self, x: f64, y: f64) -> VatioResult<()> {
        self.record(MockCall::ClickAt(x, y));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> VatioResult<()> {
        self.record(MockCall::PressKey(key.to_string()));
        Ok(())
    }

    async fn wait_ms(&self, ms: u64) -> VatioResult<()> {
        // No real sleeping in tests
        self.record(MockCall::WaitMs(ms));
        Ok(())
    }
}

#[async_trait]
impl Session for MockPage {
    async fn teardown(&mut self) -> VatioResult<()> {
        *self.inner.teardown_count.lock().unwrap() += 1;
        Ok(())
    }
}

/// Launcher handing out pre-built mock pages, or failing outright.
#[derive(Debug, Default)]
pub struct MockLauncher {
    pages: Mutex<VecDeque<MockPage>>,
    fail: bool,
}

impl MockLauncher {
    /// Launcher that serves the given pages in order, then fresh ones.
    #[must_use]
    pub fn with_pages(pages: impl IntoIterator<Item = MockPage>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().collect()),
            fail: false,
        }
    }

    /// Launcher whose every launch fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl SessionLauncher for MockLauncher {
    async fn launch(&self, config: &SessionConfig) -> VatioResult<Box<dyn Session>> {
        if self.fail {
            return Err(VatioError::session_launch(format!(
                "mock launch refused for {}",
                config.name
            )));
        }
        let page = self
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        page.goto(&config.url).await?;
        Ok(Box::new(page))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    mod mock_page_tests {
        use super::*;

        #[tokio::test]
        async fn test_records_calls() {
            let page = MockPage::new();
            page.goto("https://example.com").await.unwrap();
            page.click_at(10.0, 20.0).await.unwrap();
            page.press_key("Escape").await.unwrap();

            assert!(page.was_called("goto"));
            assert!(page.was_called("click_at"));
            assert!(page.was_called("press_key"));
            assert!(!page.was_called("evaluate"));
            assert_eq!(page.click_count(), 1);
        }

        #[tokio::test]
        async fn test_queued_eval_results() {
            let page = MockPage::new();
            page.queue_eval(json!({"found": true}));
            let first = page.evaluate("probe()").await.unwrap();
            let second = page.evaluate("probe()").await.unwrap();
            assert_eq!(first, json!({"found": true}));
            assert_eq!(second, Value::Null);
        }

        #[tokio::test]
        async fn test_failing_evaluations() {
            let page = MockPage::new();
            page.fail_evaluations();
            assert!(page.evaluate("x").await.is_err());
        }

        #[tokio::test]
        async fn test_clones_share_history() {
            let page = MockPage::new();
            let handle = page.clone();
            page.click_at(1.0, 1.0).await.unwrap();
            assert_eq!(handle.click_count(), 1);
        }

        #[tokio::test]
        async fn test_teardown_counted() {
            let mut page = MockPage::new();
            let handle = page.clone();
            page.teardown().await.unwrap();
            assert_eq!(handle.teardown_count(), 1);
        }
    }

    mod mock_launcher_tests {
        use super::*;
        use crate::config::{BrowserIdentity, PlatformKind, SessionConfig};

        fn config() -> SessionConfig {
            SessionConfig {
                name: "chrome_apple_1x".to_string(),
                identity: BrowserIdentity::chrome(),
                platform: PlatformKind::Apple,
                speed: 1.0,
                url: "https://example.com/episode".to_string(),
            }
        }

        #[tokio::test]
        async fn test_launch_navigates() {
            let page = MockPage::new();
            let launcher = MockLauncher::with_pages([page.clone()]);
            let _session = launcher.launch(&config()).await.unwrap();
            assert!(page.was_called("goto"));
        }

        #[tokio::test]
        async fn test_failing_launcher() {
            let launcher = MockLauncher::failing();
            // Sessions are not Debug, so take the error side directly
            let err = launcher.launch(&config()).await.err().unwrap();
            assert!(matches!(err, VatioError::SessionLaunch { .. }));
        }
    }
}
