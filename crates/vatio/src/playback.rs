//! Playback state machine.
//!
//! Sequences "start playback" and "set speed" over a [`PageDriver`],
//! confirming each step through the locator. A UI failure never aborts
//! the trial: the machine parks in [`PlaybackState::Degraded`] and the
//! trial is recorded with reduced confidence.
//!
//! Platform differences enter exclusively through the injected
//! [`PlatformProfile`]; there are no per-platform branches here.

use crate::driver::PageDriver;
use crate::error::{VatioError, VatioResult};
use crate::locator::{
    self, locate_any, locate_by_css, locate_speed_label, media_is_playing, normalize_label,
    reveal_in_scrollable,
};
use crate::platform::PlatformProfile;
use crate::retry::RetryPolicy;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-trial playback state, owned by the machine and discarded at
/// trial end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing attempted yet
    Idle,
    /// Play control located, click issued
    Initiating,
    /// Waiting for a textual flip or a live media handle
    AwaitingConfirmation,
    /// Playback confirmed
    Playing,
    /// Looking for the current speed label
    SpeedPending,
    /// Speed verified or set
    SpeedConfirmed,
    /// A UI step failed; trial continues with reduced confidence
    Degraded,
}

impl PlaybackState {
    /// Whether the machine reached a usable playback state.
    #[must_use]
    pub const fn is_confirmed(self) -> bool {
        matches!(self, Self::Playing | Self::SpeedConfirmed)
    }
}

/// Timing knobs for the confirmation and speed-setting waits. Tests use
/// millisecond-scale budgets.
#[derive(Debug, Clone)]
pub struct PlaybackTiming {
    /// Primary playback-confirmation wait
    pub confirm: RetryPolicy,
    /// Secondary wait after the dismiss-and-reclick retry
    pub confirm_retry: RetryPolicy,
    /// Wait for the current speed label to render
    pub locate_speed: RetryPolicy,
    /// Settle after clicking play
    pub post_play_settle_ms: u64,
    /// Settle after opening the speed menu
    pub menu_settle_ms: u64,
    /// Scroll budget per direction inside the speed menu
    pub scroll_steps: usize,
}

impl Default for PlaybackTiming {
    fn default() -> Self {
        Self {
            confirm: RetryPolicy::new(Duration::from_secs(15))
                .with_poll_interval(Duration::from_millis(500)),
            confirm_retry: RetryPolicy::new(Duration::from_secs(10))
                .with_poll_interval(Duration::from_millis(500)),
            locate_speed: RetryPolicy::new(Duration::from_secs(12))
                .with_poll_interval(Duration::from_millis(250)),
            post_play_settle_ms: 800,
            menu_settle_ms: 200,
            scroll_steps: locator::DEFAULT_SCROLL_STEPS,
        }
    }
}

impl PlaybackTiming {
    /// Millisecond-scale timing for unit tests.
    #[must_use]
    pub fn fast() -> Self {
        let policy = RetryPolicy::new(Duration::from_millis(20))
            .with_poll_interval(Duration::from_millis(5));
        Self {
            confirm: policy,
            confirm_retry: policy,
            locate_speed: policy,
            post_play_settle_ms: 0,
            menu_settle_ms: 0,
            scroll_steps: 3,
        }
    }
}

/// Drives one trial's playback: play, confirm, set speed.
pub struct PlaybackMachine<'a> {
    driver: &'a dyn PageDriver,
    profile: &'static PlatformProfile,
    timing: PlaybackTiming,
    state: PlaybackState,
}

impl<'a> PlaybackMachine<'a> {
    /// New machine in `Idle`.
    #[must_use]
    pub fn new(
        driver: &'a dyn PageDriver,
        profile: &'static PlatformProfile,
        timing: PlaybackTiming,
    ) -> Self {
        Self {
            driver,
            profile,
            timing,
            state: PlaybackState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> PlaybackState {
        self.state
    }

    /// Full sequence: start playback, then set the target speed.
    /// Returns the final state; only driver/transport errors propagate.
    pub async fn run(&mut self, target_speed_label: &str) -> VatioResult<PlaybackState> {
        self.start_playback().await?;
        if self.state == PlaybackState::Playing {
            self.set_speed(target_speed_label).await?;
        }
        Ok(self.state)
    }

    /// `Idle -> Initiating -> AwaitingConfirmation -> Playing | Degraded`.
    ///
    /// Confirmation accepts either the play control's label flipping to
    /// pause semantics or a live media handle anywhere in the document.
    /// On primary timeout the modal-dismiss-and-click sequence runs once
    /// more with a shorter secondary wait.
    pub async fn start_playback(&mut self) -> VatioResult<()> {
        self.state = PlaybackState::Initiating;
        self.dismiss_modals().await?;
        self.click_play().await?;
        self.driver.wait_ms(self.timing.post_play_settle_ms).await?;

        self.state = PlaybackState::AwaitingConfirmation;
        if self.await_confirmation(self.timing.confirm).await? {
            self.state = PlaybackState::Playing;
            return Ok(());
        }

        warn!(platform = self.profile.kind.name(), "playback not confirmed, retrying once");
        self.dismiss_modals().await?;
        self.click_play().await?;
        if self.await_confirmation(self.timing.confirm_retry).await? {
            self.state = PlaybackState::Playing;
        } else {
            warn!(platform = self.profile.kind.name(), "playback unconfirmed, degrading trial");
            self.state = PlaybackState::Degraded;
        }
        Ok(())
    }

    /// Five-step speed protocol:
    /// 1. locate the current `Nx` label in the control region (bounded);
    /// 2. normalized-equal target means success with zero clicks;
    /// 3. otherwise click the label to open the selection surface;
    /// 4. search the surface, sweeping up then down within the budget;
    /// 5. click the match, or press Escape and degrade.
    pub async fn set_speed(&mut self, target_label: &str) -> VatioResult<()> {
        self.state = PlaybackState::SpeedPending;
        let driver = self.driver;
        let roots = self.profile.control_roots;

        let current = self
            .timing
            .locate_speed
            .poll_until(|| async move { locate_speed_label(driver, roots).await })
            .await?;

        let Some(current) = current else {
            let cause = VatioError::element_not_found("current speed label in control region");
            warn!(platform = self.profile.kind.name(), error = %cause, "degrading trial");
            self.state = PlaybackState::Degraded;
            return Ok(());
        };

        let want = normalize_label(target_label);
        if normalize_label(&current.label) == want {
            info!(speed = %want, "speed already set, no interaction needed");
            self.state = PlaybackState::SpeedConfirmed;
            return Ok(());
        }

        debug!(current = %current.label, target = %want, "opening speed menu");
        locator::click(driver, &current).await?;
        self.driver.wait_ms(self.timing.menu_settle_ms).await?;

        let option = match locate_any(driver, self.profile.menu_roots, &[&want], 0.0).await? {
            Some(found) => Some(found),
            None => {
                reveal_in_scrollable(driver, self.profile.menu_roots, &want, self.timing.scroll_steps)
                    .await?
            }
        };

        match option {
            Some(found) => {
                locator::click(driver, &found).await?;
                info!(speed = %want, "speed set via selection surface");
                self.state = PlaybackState::SpeedConfirmed;
            }
            None => {
                warn!(target = %want, "speed option not found in menu, cancelling");
                self.driver.press_key("Escape").await?;
                self.state = PlaybackState::Degraded;
            }
        }
        Ok(())
    }

    async fn click_play(&self) -> VatioResult<()> {
        let found = locate_any(
            self.driver,
            self.profile.control_roots,
            self.profile.play_labels,
            self.profile.min_play_x,
        )
        .await?;
        match found {
            Some(ref desc) => {
                debug!(label = %desc.label, "clicking play control");
                locator::click(self.driver, desc).await
            }
            None => {
                // Playback may already be running; confirmation decides.
                debug!("no play control found, relying on confirmation probe");
                Ok(())
            }
        }
    }

    async fn await_confirmation(&self, policy: RetryPolicy) -> VatioResult<bool> {
        let driver = self.driver;
        let roots = self.profile.control_roots;
        let pause_labels = self.profile.pause_labels;
        let confirmed = policy
            .poll_until(|| async move {
                if locate_any(driver, roots, pause_labels, 0.0).await?.is_some() {
                    return Ok(Some(()));
                }
                if media_is_playing(driver).await? {
                    return Ok(Some(()));
                }
                Ok(None)
            })
            .await?;
        Ok(confirmed.is_some())
    }

    /// Best-effort dismissal of blocking overlays: click a close button
    /// when one exists, otherwise send Escape if a confirmation modal is
    /// on screen.
    async fn dismiss_modals(&self) -> VatioResult<()> {
        if let Some(close) = locate_by_css(self.driver, self.profile.modal_dismiss_css).await? {
            debug!("dismissing modal via close button");
            locator::click(self.driver, &close).await?;
            return Ok(());
        }
        if !self.profile.modal_confirm_labels.is_empty()
            && locate_any(
                self.driver,
                &["body"],
                self.profile.modal_confirm_labels,
                0.0,
            )
            .await?
            .is_some()
        {
            debug!("dismissing confirmation modal via Escape");
            self.driver.press_key("Escape").await?;
        }
        Ok(())
    }
}

/// Dismiss a cookie/consent banner after navigation: CSS selectors
/// first, text labels second. Best effort; absence is not an error.
pub async fn dismiss_cookie_banner(
    driver: &dyn PageDriver,
    profile: &PlatformProfile,
) -> VatioResult<bool> {
    if let Some(accept) = locate_by_css(driver, profile.cookie_css).await? {
        locator::click(driver, &accept).await?;
        driver.wait_ms(800).await?;
        return Ok(true);
    }
    if let Some(accept) = locate_any(driver, &["body"], profile.cookie_labels, 0.0).await? {
        locator::click(driver, &accept).await?;
        driver.wait_ms(800).await?;
        return Ok(true);
    }
    Ok(false)
}
