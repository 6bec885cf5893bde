//! Trial coordination.
//!
//! One trial is: validate, launch a session, start the sampler, drive
//! playback, hold for the measurement window, stop the sampler, record.
//! The coordinator owns the failure policy: a degraded UI step records
//! with a note, any hard error records as a failed trial, and the batch
//! always moves on to the next run. The session is torn down exactly
//! once on every path.

use crate::config::{ExperimentSettings, SessionConfig};
use crate::driver::{PageDriver, SessionLauncher};
use crate::error::VatioResult;
use crate::platform::PlatformProfile;
use crate::playback::{PlaybackMachine, PlaybackState, PlaybackTiming};
use crate::results::{ConfigSummary, ResultsManager, TrialRecord};
use crate::sampler::{EnergySampler, SamplerConfig};
use crate::series::EnergySummary;
use std::time::Duration;
use tracing::{info, warn};

/// Runs trials and batches against a session launcher.
pub struct TrialCoordinator<L> {
    launcher: L,
    settings: ExperimentSettings,
    results: ResultsManager,
    sampler_config: SamplerConfig,
    timing: PlaybackTiming,
    dry_run: bool,
}

impl<L: SessionLauncher> TrialCoordinator<L> {
    /// New coordinator with default playback timing.
    #[must_use]
    pub fn new(
        launcher: L,
        settings: ExperimentSettings,
        results: ResultsManager,
        sampler_config: SamplerConfig,
    ) -> Self {
        let mut timing = PlaybackTiming::default();
        timing.post_play_settle_ms = settings.playback_start_wait.as_millis() as u64;
        Self {
            launcher,
            settings,
            results,
            sampler_config,
            timing,
            dry_run: false,
        }
    }

    /// Drive the full browser automation but never start the sampler.
    /// Validates the UI side of a setup without elevation or the
    /// measurement tool.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Override playback timing (tests use millisecond budgets).
    #[must_use]
    pub fn with_timing(mut self, timing: PlaybackTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Run one trial. Never returns an error; every outcome becomes a
    /// [`TrialRecord`].
    pub async fn run_trial(&self, config: &SessionConfig, run_id: u32) -> TrialRecord {
        info!(config = %config.name, run_id, dry_run = self.dry_run, "trial starting");
        match self.execute(config, run_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(config = %config.name, run_id, error = %e, "trial failed");
                TrialRecord::failed(&config.name, run_id, &e.to_string())
            }
        }
    }

    /// Run every configuration for the settings' run count, persisting
    /// each trial as it completes. `progress` is invoked once per
    /// recorded trial.
    pub async fn run_batch(
        &self,
        configs: &[SessionConfig],
        mut progress: impl FnMut(&TrialRecord),
    ) -> VatioResult<Vec<ConfigSummary>> {
        let runs = self.settings.runs_per_config as u32;
        let mut summaries = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            let mut successes = 0;
            for run_id in 1..=runs {
                let record = self.run_trial(config, run_id).await;
                if record.success {
                    successes += 1;
                }
                self.results.save_trial(&record)?;
                progress(&record);
                // Cooldown after every trial, including configuration
                // boundaries, so thermal state never bleeds into the
                // next measurement; nothing follows the last trial
                let last = index + 1 == configs.len() && run_id == runs;
                if !last && !self.dry_run {
                    self.pause(self.settings.cooldown).await;
                }
            }
            info!(config = %config.name, successes, runs, "configuration complete");
            summaries.push(ConfigSummary {
                config: config.name.clone(),
                runs,
                successes,
            });
        }
        self.results.save_summary(summaries.clone())?;
        Ok(summaries)
    }

    async fn execute(&self, config: &SessionConfig, run_id: u32) -> VatioResult<TrialRecord> {
        config.validate()?;

        let mut session = self.launcher.launch(config).await?;
        self.pause(self.settings.page_load_wait).await;

        let outcome = self.measure(config, run_id, &session).await;
        // Teardown exactly once; a teardown failure never masks the
        // measurement outcome
        if let Err(e) = session.teardown().await {
            warn!(config = %config.name, error = %e, "session teardown failed");
        }
        let (summary, state) = outcome?;

        let record = TrialRecord::new(&config.name, run_id, summary);
        Ok(if state == PlaybackState::Degraded {
            record.with_note("playback not fully confirmed, recorded with reduced confidence")
        } else {
            record
        })
    }

    async fn measure(
        &self,
        config: &SessionConfig,
        run_id: u32,
        driver: &dyn PageDriver,
    ) -> VatioResult<(EnergySummary, PlaybackState)> {
        let energy_path = self.results.energy_filepath(&config.name, run_id)?;
        let mut sampler_config = self.sampler_config.clone();
        // A coordinator dry run still exercises the whole browser
        // automation; only the measurement tool is skipped
        sampler_config.dry_run = sampler_config.dry_run || self.dry_run;
        let sampler = EnergySampler::start(sampler_config, &energy_path).await?;

        let profile = PlatformProfile::for_kind(config.platform);
        let mut machine = PlaybackMachine::new(driver, profile, self.timing.clone());
        let state = match machine.run(&config.speed_label()).await {
            Ok(state) => state,
            Err(e) if e.is_degradation() => {
                warn!(config = %config.name, error = %e, "playback degraded by driver");
                PlaybackState::Degraded
            }
            Err(e) => {
                // Driver died mid-playback; still flush the sampler
                if let Err(stop_err) = sampler.stop().await {
                    warn!(error = %stop_err, "sampler stop after playback failure");
                }
                return Err(e);
            }
        };

        self.pause(self.settings.measurement_duration).await;
        let summary = sampler.stop().await?;
        Ok((summary, state))
    }

    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{BrowserIdentity, PlatformKind};
    use crate::driver::{MockLauncher, MockPage};
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn fast_settings() -> ExperimentSettings {
        ExperimentSettings {
            runs_per_config: 2,
            measurement_duration: Duration::ZERO,
            cooldown: Duration::ZERO,
            browser_startup_wait: Duration::ZERO,
            page_load_wait: Duration::ZERO,
            playback_start_wait: Duration::ZERO,
            sampler_interval: Duration::from_millis(500),
        }
    }

    fn no_sampler() -> SamplerConfig {
        SamplerConfig {
            dry_run: true,
            ..SamplerConfig::default()
        }
    }

    fn apple_config(speed: f64) -> SessionConfig {
        SessionConfig {
            name: format!("chrome_apple_{speed}x"),
            identity: BrowserIdentity::chrome(),
            platform: PlatformKind::Apple,
            speed,
            url: "https://example.com/episode".to_string(),
        }
    }

    fn coordinator(launcher: MockLauncher, dir: &TempDir) -> TrialCoordinator<MockLauncher> {
        TrialCoordinator::new(
            launcher,
            fast_settings(),
            ResultsManager::new(dir.path()),
            no_sampler(),
        )
        .with_timing(PlaybackTiming::fast())
    }

    /// Queue a full successful trial on the page: modal probes miss,
    /// play control misses, media probe confirms, speed already correct.
    fn queue_success(page: &MockPage, speed_label: &str) {
        page.queue_eval(Value::Null); // modal close button
        page.queue_eval(Value::Null); // modal confirm label
        page.queue_eval(Value::Null); // play control
        page.queue_eval(Value::Null); // pause label
        page.queue_eval(json!({"present": true, "playing": true}));
        page.queue_eval(json!({
            "x": 100.0, "y": 700.0, "width": 40.0, "height": 20.0,
            "label": speed_label, "aux_id": null, "strategy": "speed"
        }));
    }

    mod trial_tests {
        use super::*;

        #[tokio::test]
        async fn test_successful_trial_tears_down_once() {
            let dir = TempDir::new().unwrap();
            let page = MockPage::new();
            queue_success(&page, "1x");
            let coordinator = coordinator(MockLauncher::with_pages([page.clone()]), &dir);

            let record = coordinator.run_trial(&apple_config(1.0), 1).await;
            assert!(record.success, "error: {:?}", record.error);
            assert!(record.error.is_none());
            assert_eq!(page.teardown_count(), 1);
        }

        #[tokio::test]
        async fn test_degraded_trial_records_with_note() {
            let dir = TempDir::new().unwrap();
            // Empty queue: playback never confirms, speed never found
            let page = MockPage::new();
            let coordinator = coordinator(MockLauncher::with_pages([page.clone()]), &dir);

            let record = coordinator.run_trial(&apple_config(2.0), 1).await;
            assert!(record.success);
            assert!(record.error.as_deref().unwrap().contains("reduced confidence"));
            assert_eq!(page.teardown_count(), 1);
        }

        #[tokio::test]
        async fn test_driver_failure_still_tears_down() {
            let dir = TempDir::new().unwrap();
            let page = MockPage::new();
            page.fail_evaluations();
            let coordinator = coordinator(MockLauncher::with_pages([page.clone()]), &dir);

            let record = coordinator.run_trial(&apple_config(1.0), 1).await;
            assert!(!record.success);
            assert_eq!(page.teardown_count(), 1);
        }

        #[tokio::test]
        async fn test_launch_failure_records_failed_trial() {
            let dir = TempDir::new().unwrap();
            let coordinator = coordinator(MockLauncher::failing(), &dir);

            let record = coordinator.run_trial(&apple_config(1.0), 1).await;
            assert!(!record.success);
            assert!(record.error.as_deref().unwrap().contains("mock launch refused"));
        }

        #[tokio::test]
        async fn test_invalid_config_never_launches() {
            let dir = TempDir::new().unwrap();
            let page = MockPage::new();
            let coordinator = coordinator(MockLauncher::with_pages([page.clone()]), &dir);

            let mut config = apple_config(1.0);
            config.speed = 0.0;
            let record = coordinator.run_trial(&config, 1).await;
            assert!(!record.success);
            assert!(!page.was_called("goto"));
        }

        #[tokio::test]
        async fn test_sampler_start_failure_tears_down() {
            let dir = TempDir::new().unwrap();
            let page = MockPage::new();
            let mut coordinator = coordinator(MockLauncher::with_pages([page.clone()]), &dir);
            coordinator.sampler_config = SamplerConfig {
                binary: PathBuf::from("/nonexistent/energibridge"),
                dry_run: false,
                elevate: false,
                ..SamplerConfig::default()
            };

            let record = coordinator.run_trial(&apple_config(1.0), 1).await;
            assert!(!record.success);
            assert_eq!(page.teardown_count(), 1);
        }
    }

    mod dry_run_tests {
        use super::*;

        #[tokio::test]
        async fn test_dry_run_still_drives_playback() {
            let dir = TempDir::new().unwrap();
            let page = MockPage::new();
            queue_success(&page, "1x");
            let coordinator =
                coordinator(MockLauncher::with_pages([page.clone()]), &dir).with_dry_run(true);

            let record = coordinator.run_trial(&apple_config(1.0), 1).await;
            assert!(record.success, "error: {:?}", record.error);
            assert_eq!(record.energy, Some(EnergySummary::empty()));
            // The session launched and the automation ran end to end
            assert!(page.was_called("goto"));
            assert!(page.was_called("evaluate"));
            assert_eq!(page.teardown_count(), 1);
        }

        #[tokio::test]
        async fn test_dry_run_never_starts_sampler() {
            let dir = TempDir::new().unwrap();
            let page = MockPage::new();
            queue_success(&page, "1x");
            let mut coordinator =
                coordinator(MockLauncher::with_pages([page.clone()]), &dir).with_dry_run(true);
            // An unspawnable sampler proves it is never started
            coordinator.sampler_config = SamplerConfig {
                binary: PathBuf::from("/nonexistent/energibridge"),
                dry_run: false,
                elevate: false,
                ..SamplerConfig::default()
            };

            let record = coordinator.run_trial(&apple_config(1.0), 1).await;
            assert!(record.success, "error: {:?}", record.error);
            assert_eq!(record.energy, Some(EnergySummary::empty()));
        }

        #[tokio::test]
        async fn test_dry_run_still_validates() {
            let dir = TempDir::new().unwrap();
            let coordinator = coordinator(MockLauncher::failing(), &dir).with_dry_run(true);

            let mut config = apple_config(1.0);
            config.url = String::new();
            let record = coordinator.run_trial(&config, 1).await;
            assert!(!record.success);
        }
    }

    mod batch_tests {
        use super::*;

        #[tokio::test]
        async fn test_batch_persists_trials_and_summary() {
            let dir = TempDir::new().unwrap();
            let coordinator = coordinator(MockLauncher::default(), &dir).with_dry_run(true);

            let configs = vec![apple_config(1.0), apple_config(2.0)];
            let mut seen = 0;
            let summaries = coordinator
                .run_batch(&configs, |_| seen += 1)
                .await
                .unwrap();

            assert_eq!(seen, 4);
            assert_eq!(summaries.len(), 2);
            assert!(summaries.iter().all(|s| s.runs == 2 && s.successes == 2));
            assert!(dir.path().join("chrome_apple_1x/trial_01.json").exists());
            assert!(dir.path().join("chrome_apple_2x/trial_02.json").exists());
            assert!(dir.path().join("summary.json").exists());
        }

        #[tokio::test]
        async fn test_batch_continues_after_failures() {
            let dir = TempDir::new().unwrap();
            let coordinator = coordinator(MockLauncher::failing(), &dir);

            let configs = vec![apple_config(1.0)];
            let summaries = coordinator.run_batch(&configs, |_| {}).await.unwrap();
            assert_eq!(summaries[0].successes, 0);
            assert_eq!(summaries[0].runs, 2);
            // Failed trials are still recorded
            assert!(dir.path().join("chrome_apple_1x/trial_02.json").exists());
        }

        #[tokio::test]
        async fn test_cooldown_applied_between_configurations() {
            let dir = TempDir::new().unwrap();
            let mut settings = fast_settings();
            settings.runs_per_config = 1;
            settings.cooldown = Duration::from_millis(80);
            let first = MockPage::new();
            queue_success(&first, "1x");
            let second = MockPage::new();
            queue_success(&second, "2x");
            let coordinator = TrialCoordinator::new(
                MockLauncher::with_pages([first, second]),
                settings,
                ResultsManager::new(dir.path()),
                no_sampler(),
            )
            .with_timing(PlaybackTiming::fast());

            let configs = vec![apple_config(1.0), apple_config(2.0)];
            let started = std::time::Instant::now();
            coordinator.run_batch(&configs, |_| {}).await.unwrap();
            assert!(started.elapsed() >= Duration::from_millis(80));
        }

        #[tokio::test]
        async fn test_no_cooldown_after_final_trial() {
            let dir = TempDir::new().unwrap();
            let mut settings = fast_settings();
            settings.runs_per_config = 1;
            settings.cooldown = Duration::from_secs(60);
            let page = MockPage::new();
            queue_success(&page, "1x");
            let coordinator = TrialCoordinator::new(
                MockLauncher::with_pages([page]),
                settings,
                ResultsManager::new(dir.path()),
                no_sampler(),
            )
            .with_timing(PlaybackTiming::fast());

            let configs = vec![apple_config(1.0)];
            let started = std::time::Instant::now();
            coordinator.run_batch(&configs, |_| {}).await.unwrap();
            assert!(started.elapsed() < Duration::from_secs(60));
        }
    }
}
