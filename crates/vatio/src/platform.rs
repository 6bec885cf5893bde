//! Platform profiles.
//!
//! Everything that differs between the two web players lives here as
//! data: prioritized control-region roots, menu-surface selectors,
//! control labels, and dismissal selector lists. The locator and
//! playback state machine never branch on the platform.

use crate::config::PlatformKind;

/// Data-only description of one player's markup conventions.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    /// Platform this profile describes
    pub kind: PlatformKind,
    /// Root scopes searched in priority order for transport and speed
    /// controls; a controls region comes before the whole document so a
    /// stray "2x" in episode content never wins
    pub control_roots: &'static [&'static str],
    /// Containers a speed-selection surface may render into
    pub menu_roots: &'static [&'static str],
    /// Normalized labels identifying the play control
    pub play_labels: &'static [&'static str],
    /// Normalized labels the play control flips to once playing
    pub pause_labels: &'static [&'static str],
    /// Minimum viewport x for a play control; filters sidebar buttons
    pub min_play_x: f64,
    /// CSS selectors that close blocking modal overlays
    pub modal_dismiss_css: &'static [&'static str],
    /// Normalized labels that confirm a blocking modal (e.g. locale pickers)
    pub modal_confirm_labels: &'static [&'static str],
    /// CSS selectors for cookie/consent banner accept buttons
    pub cookie_css: &'static [&'static str],
    /// Normalized labels for cookie/consent accept buttons
    pub cookie_labels: &'static [&'static str],
}

impl PlatformProfile {
    /// Profile for the requested platform.
    #[must_use]
    pub const fn for_kind(kind: PlatformKind) -> &'static Self {
        match kind {
            PlatformKind::Spotify => &SPOTIFY,
            PlatformKind::Apple => &APPLE,
        }
    }
}

/// Spotify web player. Speed and transport controls live in the
/// now-playing bar pinned to the bottom of the viewport; sidebar play
/// buttons (x < 200) start unrelated playlists and are skipped.
pub static SPOTIFY: PlatformProfile = PlatformProfile {
    kind: PlatformKind::Spotify,
    control_roots: &["[data-testid=\"now-playing-bar\"]", "footer", "body"],
    menu_roots: &[
        "[role=\"menu\"]",
        "[data-testid*=\"context-menu\" i]",
        "[data-testid*=\"popover\" i]",
        "[role=\"dialog\"]",
    ],
    play_labels: &["play"],
    pause_labels: &["pause"],
    min_play_x: 200.0,
    modal_dismiss_css: &[],
    modal_confirm_labels: &[],
    cookie_css: &[
        "[data-testid=\"consent-banner-accept\"]",
        "#onetrust-accept-btn-handler",
    ],
    cookie_labels: &[
        "acceptall",
        "acceptcookies",
        "accept",
        "iaccept",
        "agree",
        "ok",
    ],
};

/// Apple Podcasts web player. A locale modal (Continue/Close) frequently
/// blocks the player and must be dismissed before clicking play.
pub static APPLE: PlatformProfile = PlatformProfile {
    kind: PlatformKind::Apple,
    control_roots: &[
        ".web-chrome-playback-controls",
        "[data-testid*=\"playback\" i]",
        "footer",
        "body",
    ],
    menu_roots: &[
        "[role=\"menu\"]",
        "[role=\"dialog\"]",
        "[data-testid*=\"popover\" i]",
        "[data-testid*=\"menu\" i]",
    ],
    play_labels: &["play", "playepisode"],
    pause_labels: &["pause"],
    min_play_x: 0.0,
    modal_dismiss_css: &[
        "[data-testid=\"close-button\"]",
        "button[aria-label=\"Close\"]",
        "button[aria-label=\"close\"]",
    ],
    modal_confirm_labels: &["continue"],
    cookie_css: &["#onetrust-accept-btn-handler"],
    cookie_labels: &["acceptall", "acceptcookies", "accept", "agree", "ok"],
};
