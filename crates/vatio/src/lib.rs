//! Vatio: energy measurement for web media playback
//!
//! Vatio (Spanish: "watt") runs automated experiments measuring the
//! energy a machine spends while a media web player (Spotify or Apple
//! Podcasts) plays an episode at a given speed under a given browser
//! identity.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     VATIO Architecture                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐  │
//! │  │ Session  │   │ Playback  │   │ Energy   │   │ Results  │  │
//! │  │ Config   │──►│ Machine   │   │ Sampler  │──►│ Manager  │  │
//! │  │ (x8)     │   │ (CDP/JS)  │   │ (ext.)   │   │ (JSON)   │  │
//! │  └──────────┘   └───────────┘   └──────────┘   └──────────┘  │
//! │        └───────── trial coordinator ──────────────┘          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The trial coordinator drives one configuration at a time: launch a
//! browser session, start the external sampler, push the player into
//! playback at the target speed, hold for the measurement window, then
//! stop the sampler and persist the reduced measurement.

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

mod config;
mod driver;
mod error;
mod locator;
mod platform;
mod playback;
mod results;
mod retry;
mod sampler;
mod series;
mod trial;

/// CDP-backed browser sessions; only compiled with the `browser` feature.
#[cfg(feature = "browser")]
mod session;

pub use config::{
    builtin_configs, BrowserIdentity, BrowserKind, ExperimentSettings, PlatformKind,
    SessionConfig,
};
pub use driver::{MockCall, MockLauncher, MockPage, PageDriver, Session, SessionLauncher};
pub use error::{VatioError, VatioResult};
pub use locator::{normalize_label, BoundingBox, ElementDescriptor};
pub use platform::PlatformProfile;
pub use playback::{dismiss_cookie_banner, PlaybackMachine, PlaybackState, PlaybackTiming};
pub use results::{BatchSummary, ConfigSummary, ResultsManager, TrialRecord};
pub use retry::RetryPolicy;
pub use sampler::{EnergySampler, SamplerConfig};
pub use series::{ColumnRole, EnergySummary, HardwareClass, SampleSeries};
pub use trial::TrialCoordinator;

#[cfg(feature = "browser")]
pub use session::{BrowserLauncher, BrowserSession};
