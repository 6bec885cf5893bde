//! Real browser sessions over CDP.
//!
//! Compiled only with the `browser` feature. Launches a headed
//! Chromium-family browser with a persistent profile, restores stored
//! login state before navigating, and implements [`PageDriver`] over
//! the CDP connection. Everything above this module is
//! browser-agnostic.

use crate::config::{ExperimentSettings, SessionConfig};
use crate::driver::{PageDriver, Session, SessionLauncher};
use crate::error::{VatioError, VatioResult};
use crate::platform::PlatformProfile;
use crate::playback;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Flags that keep a measurement honest: media must start without a
/// gesture and the renderer must not be throttled while unfocused.
const LAUNCH_ARGS: &[&str] = &[
    "--autoplay-policy=no-user-gesture-required",
    "--disable-features=PreloadMediaEngagementData",
    "--disable-background-timer-throttling",
    "--disable-renderer-backgrounding",
    "--disable-backgrounding-occluded-windows",
    "--no-default-browser-check",
    "--no-first-run",
];

/// Launches [`BrowserSession`]s for the trial coordinator.
#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    settings: ExperimentSettings,
}

impl BrowserLauncher {
    /// Launcher using the given experiment timings for startup and
    /// page-load settles.
    #[must_use]
    pub fn new(settings: ExperimentSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SessionLauncher for BrowserLauncher {
    async fn launch(&self, config: &SessionConfig) -> VatioResult<Box<dyn Session>> {
        config.identity.resolve()?;

        let mut builder = CdpConfig::builder()
            .with_head()
            .window_size(1440, 900)
            .user_data_dir(&config.identity.profile_dir)
            .args(LAUNCH_ARGS.to_vec());
        if let Some(ref exe) = config.identity.executable {
            builder = builder.chrome_executable(exe);
        }
        let cdp_config = builder
            .build()
            .map_err(VatioError::session_launch)?;

        info!(
            config = %config.name,
            browser = config.identity.kind.name(),
            "launching browser"
        );
        let (browser, mut handler) = CdpBrowser::launch(cdp_config)
            .await
            .map_err(|e| VatioError::session_launch(e.to_string()))?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });
        tokio::time::sleep(self.settings.browser_startup_wait).await;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| VatioError::session_launch(e.to_string()))?;

        let session = BrowserSession {
            browser: Arc::new(Mutex::new(browser)),
            page,
            handle,
            closed: false,
        };

        if let Some(ref state_path) = config.identity.session_state {
            session.restore_session_state(state_path, &config.url).await?;
        }

        session.goto(&config.url).await?;
        let page = &session;
        let ready = RetryPolicy::new(self.settings.page_load_wait)
            .with_poll_interval(Duration::from_millis(500))
            .poll_until(|| async move {
                let state = page.evaluate("document.readyState").await?;
                Ok((state == "complete").then_some(()))
            })
            .await?;
        if ready.is_none() {
            // Heavy players can stay in "interactive" and still work
            warn!(config = %config.name, "document never reached readyState complete");
        }

        let profile = PlatformProfile::for_kind(config.platform);
        if playback::dismiss_cookie_banner(&session, profile).await? {
            debug!(config = %config.name, "cookie banner dismissed");
        }

        Ok(Box::new(session))
    }
}

/// One live headed browser bound to a single page.
#[derive(Debug)]
pub struct BrowserSession {
    browser: Arc<Mutex<CdpBrowser>>,
    page: CdpPage,
    handle: tokio::task::JoinHandle<()>,
    closed: bool,
}

/// Stored login state captured by the one-time interactive login.
#[derive(Debug, Deserialize)]
struct SessionState {
    #[serde(default)]
    cookies: Vec<StoredCookie>,
    #[serde(default, alias = "localStorage")]
    local_storage: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    secure: Option<bool>,
    #[serde(default, alias = "httpOnly")]
    http_only: Option<bool>,
    #[serde(default)]
    expires: Option<f64>,
}

impl BrowserSession {
    /// Inject cookies and localStorage from a stored session file. The
    /// page must visit the target origin before localStorage is writable
    /// for it.
    async fn restore_session_state(&self, state_path: &Path, url: &str) -> VatioResult<()> {
        let raw = std::fs::read_to_string(state_path)?;
        let state: SessionState = serde_json::from_str(&raw).map_err(|e| {
            VatioError::session_launch(format!(
                "malformed session state {}: {e}",
                state_path.display()
            ))
        })?;
        let origin = origin_of(url).ok_or_else(|| {
            VatioError::session_launch(format!("cannot derive origin from URL {url:?}"))
        })?;

        let cookies = cookie_params(&state, &origin)?;
        let cookie_count = cookies.len();
        self.page
            .set_cookies(cookies)
            .await
            .map_err(|e| VatioError::session_launch(e.to_string()))?;

        if !state.local_storage.is_empty() {
            // localStorage is origin-scoped, so land on the origin first
            self.goto(&origin).await?;
            let entries = serde_json::to_string(&state.local_storage)?;
            let js = format!(
                "(() => {{ const entries = {entries}; \
                 for (const [k, v] of Object.entries(entries)) \
                 {{ try {{ localStorage.setItem(k, v); }} catch (e) {{}} }} \
                 return Object.keys(entries).length; }})()"
            );
            self.evaluate(&js).await?;
        }

        info!(
            cookies = cookie_count,
            local_storage = state.local_storage.len(),
            "session state restored"
        );
        Ok(())
    }
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn goto(&self, url: &str) -> VatioResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| VatioError::driver(format!("navigation to {url} failed: {e}")))?;
        Ok(())
    }

    async fn evaluate(&self, js: &str) -> VatioResult<Value> {
        let result = self
            .page
            .evaluate(js)
            .await
            .map_err(|e| VatioError::driver(format!("evaluation failed: {e}")))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn click_at(&self, x: f64, y: f64) -> VatioResult<()> {
        let press = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MousePressed)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(VatioError::driver)?;
        let release = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseReleased)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(VatioError::driver)?;
        self.page
            .execute(press)
            .await
            .map_err(|e| VatioError::driver(e.to_string()))?;
        self.page
            .execute(release)
            .await
            .map_err(|e| VatioError::driver(e.to_string()))?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> VatioResult<()> {
        let down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key)
            .code(key)
            .build()
            .map_err(VatioError::driver)?;
        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key)
            .code(key)
            .build()
            .map_err(VatioError::driver)?;
        self.page
            .execute(down)
            .await
            .map_err(|e| VatioError::driver(e.to_string()))?;
        self.page
            .execute(up)
            .await
            .map_err(|e| VatioError::driver(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Session for BrowserSession {
    async fn teardown(&mut self) -> VatioResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            // A browser that already died still counts as closed
            warn!(error = %e, "browser close reported an error");
        }
        if let Err(e) = browser.wait().await {
            debug!(error = %e, "browser wait after close");
        }
        self.handle.abort();
        Ok(())
    }
}

/// CDP cookie params for every stored cookie, scoped to `origin` when
/// the capture carried no domain.
fn cookie_params(state: &SessionState, origin: &str) -> VatioResult<Vec<CookieParam>> {
    let mut cookies = Vec::with_capacity(state.cookies.len());
    for stored in &state.cookies {
        let mut builder = CookieParam::builder()
            .name(&stored.name)
            .value(&stored.value)
            .url(origin);
        if let Some(ref domain) = stored.domain {
            builder = builder.domain(domain);
        }
        if let Some(ref path) = stored.path {
            builder = builder.path(path);
        }
        if let Some(secure) = stored.secure {
            builder = builder.secure(secure);
        }
        if let Some(http_only) = stored.http_only {
            builder = builder.http_only(http_only);
        }
        if let Some(expires) = stored.expires {
            builder = builder.expires(TimeSinceEpoch::new(expires));
        }
        cookies.push(builder.build().map_err(VatioError::session_launch)?);
    }
    Ok(cookies)
}

/// `scheme://host[:port]` prefix of a URL, without the path.
fn origin_of(url: &str) -> Option<String> {
    let scheme_end = url.find("://")?;
    let rest = &url[scheme_end + 3..];
    if rest.is_empty() {
        return None;
    }
    let host_end = rest.find('/').unwrap_or(rest.len());
    Some(format!("{}{}", &url[..scheme_end + 3], &rest[..host_end]))
}
