//! Experiment configuration.
//!
//! All tunables are resolved once into explicit objects handed to the
//! trial coordinator at construction. Nothing reads ambient global state
//! after startup; environment variables are consulted only inside
//! [`builtin_configs`] and [`ExperimentSettings::from_env`].

use crate::error::{VatioError, VatioResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Browser family a session runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    /// Stock Chromium/Chrome
    Chrome,
    /// Brave (Chromium-based, ad-blocking defaults)
    Brave,
}

impl BrowserKind {
    /// Short name used in configuration names and profile paths.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Brave => "brave",
        }
    }
}

/// A browser identity: executable, persistent profile, and optional
/// stored login state injected before navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserIdentity {
    /// Browser family
    pub kind: BrowserKind,
    /// Explicit executable path (None = auto-detect)
    pub executable: Option<PathBuf>,
    /// Persistent user-data directory, one per identity
    pub profile_dir: PathBuf,
    /// Stored session state (cookies + localStorage) captured by a
    /// one-time interactive login, required by platforms with accounts
    pub session_state: Option<PathBuf>,
}

impl BrowserIdentity {
    /// Chrome identity with its default profile directory.
    #[must_use]
    pub fn chrome() -> Self {
        Self {
            kind: BrowserKind::Chrome,
            executable: None,
            profile_dir: PathBuf::from(".vatio-chrome-profile"),
            session_state: None,
        }
    }

    /// Brave identity with its default profile directory and a
    /// per-platform executable guess.
    #[must_use]
    pub fn brave() -> Self {
        Self {
            kind: BrowserKind::Brave,
            executable: brave_executable(),
            profile_dir: PathBuf::from(".vatio-brave-profile"),
            session_state: None,
        }
    }

    /// Attach a stored session-state file.
    #[must_use]
    pub fn with_session_state(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_state = Some(path.into());
        self
    }

    /// Verify the identity is resolvable before any browser process
    /// starts: a named executable and any referenced session-state file
    /// must exist on disk.
    pub fn resolve(&self) -> VatioResult<()> {
        if let Some(ref exe) = self.executable {
            if !exe.exists() {
                return Err(VatioError::session_launch(format!(
                    "{} executable not found: {}",
                    self.kind.name(),
                    exe.display()
                )));
            }
        }
        if let Some(ref state) = self.session_state {
            if !state.exists() {
                return Err(VatioError::session_launch(format!(
                    "session state file not found: {} (run the one-time login capture first)",
                    state.display()
                )));
            }
        }
        Ok(())
    }
}

/// Locate a Brave executable for the current OS. Returns `None` when no
/// well-known install location exists; the launcher reports that as a
/// session launch failure.
fn brave_executable() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "macos") {
        vec![PathBuf::from(
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        )]
    } else if cfg!(target_os = "windows") {
        std::env::var("LOCALAPPDATA")
            .map(|base| {
                vec![Path::new(&base)
                    .join("BraveSoftware")
                    .join("Brave-Browser")
                    .join("Application")
                    .join("brave.exe")]
            })
            .unwrap_or_default()
    } else {
        vec![
            PathBuf::from("/usr/bin/brave-browser"),
            PathBuf::from("/usr/bin/brave"),
        ]
    };
    candidates.into_iter().find(|p| p.exists())
}

/// Media platform a configuration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// Spotify web player (requires a stored login session)
    Spotify,
    /// Apple Podcasts web player (no login)
    Apple,
}

impl PlatformKind {
    /// Short name used in configuration names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Spotify => "spotify",
            Self::Apple => "apple",
        }
    }

    /// Whether the platform needs stored session state before navigation.
    #[must_use]
    pub const fn requires_session_state(self) -> bool {
        matches!(self, Self::Spotify)
    }
}

/// One named experiment configuration: identity x platform x speed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique configuration name, e.g. `chrome_apple_1x`
    pub name: String,
    /// Browser identity to launch under
    pub identity: BrowserIdentity,
    /// Target platform
    pub platform: PlatformKind,
    /// Playback speed multiplier
    pub speed: f64,
    /// Episode URL to navigate to
    pub url: String,
}

impl SessionConfig {
    /// Validate invariants: positive speed, non-empty URL, resolvable
    /// identity.
    pub fn validate(&self) -> VatioResult<()> {
        if self.speed <= 0.0 || !self.speed.is_finite() {
            return Err(VatioError::invalid_config(format!(
                "{}: speed must be > 0, got {}",
                self.name, self.speed
            )));
        }
        if self.url.trim().is_empty() {
            return Err(VatioError::invalid_config(format!(
                "{}: URL must be non-empty",
                self.name
            )));
        }
        self.identity.resolve()
    }

    /// Target speed rendered the way the players label it (`1x`, `1.5x`).
    #[must_use]
    pub fn speed_label(&self) -> String {
        format!("{}x", self.speed)
    }
}

/// Fixed experiment timings, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSettings {
    /// Trials per configuration
    pub runs_per_config: usize,
    /// Active playback recorded per trial
    pub measurement_duration: Duration,
    /// Idle pause between trials
    pub cooldown: Duration,
    /// Settle time after the browser opens
    pub browser_startup_wait: Duration,
    /// Settle time after navigating to the episode URL
    pub page_load_wait: Duration,
    /// Settle time after the play click before speed setting
    pub playback_start_wait: Duration,
    /// Sampler interval
    pub sampler_interval: Duration,
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            runs_per_config: 30,
            measurement_duration: Duration::from_secs(45),
            cooldown: Duration::from_secs(30),
            browser_startup_wait: Duration::from_secs(5),
            page_load_wait: Duration::from_secs(10),
            playback_start_wait: Duration::from_secs(3),
            sampler_interval: Duration::from_millis(500),
        }
    }
}

impl ExperimentSettings {
    /// Defaults with the sampler interval overridable through
    /// `ENERGIBRIDGE_INTERVAL_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(ms) = std::env::var("ENERGIBRIDGE_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            settings.sampler_interval = Duration::from_millis(ms);
        }
        settings
    }
}

const SPOTIFY_EPISODE_URL: &str =
    "https://open.spotify.com/episode/18IGzOgfs3Bmcr5JZapdEt?trackId=7uRNuBCVQYxPX1ZcyIBAug";
const APPLE_EPISODE_URL: &str =
    "https://podcasts.apple.com/us/podcast/open-retrieve-expand-load/id617416468?i=1000746253334";

/// Default stored-session path for Spotify identities.
const SPOTIFY_SESSION_FILE: &str = "spotify_session.json";

/// The eight built-in configurations: {chrome, brave} x {spotify, apple}
/// x {1.0, 2.0}. Episode URLs and the Spotify session path are
/// overridable via `SPOTIFY_EPISODE_URL`, `APPLE_EPISODE_URL`, and
/// `SPOTIFY_SESSION_FILE`.
#[must_use]
pub fn builtin_configs() -> Vec<SessionConfig> {
    let spotify_url =
        std::env::var("SPOTIFY_EPISODE_URL").unwrap_or_else(|_| SPOTIFY_EPISODE_URL.to_string());
    let apple_url =
        std::env::var("APPLE_EPISODE_URL").unwrap_or_else(|_| APPLE_EPISODE_URL.to_string());
    let session_file =
        std::env::var("SPOTIFY_SESSION_FILE").unwrap_or_else(|_| SPOTIFY_SESSION_FILE.to_string());

    let identity = |kind: BrowserKind, platform: PlatformKind| {
        let base = match kind {
            BrowserKind::Chrome => BrowserIdentity::chrome(),
            BrowserKind::Brave => BrowserIdentity::brave(),
        };
        if platform.requires_session_state() {
            base.with_session_state(&session_file)
        } else {
            base
        }
    };

    let mut configs = Vec::new();
    for kind in [BrowserKind::Chrome, BrowserKind::Brave] {
        for platform in [PlatformKind::Spotify, PlatformKind::Apple] {
            for speed in [1.0_f64, 2.0] {
                let url = match platform {
                    PlatformKind::Spotify => spotify_url.clone(),
                    PlatformKind::Apple => apple_url.clone(),
                };
                configs.push(SessionConfig {
                    name: format!("{}_{}_{}x", kind.name(), platform.name(), speed),
                    identity: identity(kind, platform),
                    platform,
                    speed,
                    url,
                });
            }
        }
    }
    configs
}
