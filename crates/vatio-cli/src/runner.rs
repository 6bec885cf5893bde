//! Experiment execution for the CLI

use crate::commands::{ListArgs, RunArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output;
use vatio::{
    builtin_configs, ExperimentSettings, ResultsManager, SamplerConfig, SessionConfig,
    SessionLauncher, TrialCoordinator,
};

/// Run measurement trials per the command-line arguments.
pub async fn run_experiment(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let mut settings = ExperimentSettings::from_env();
    if let Some(runs) = args.runs {
        if runs == 0 {
            return Err(CliError::config("--runs must be at least 1"));
        }
        settings.runs_per_config = runs;
    }
    let configs = select_configs(args.config.as_deref())?;

    let sampler = SamplerConfig {
        interval: settings.sampler_interval,
        dry_run: args.dry_run,
        ..SamplerConfig::default()
    };
    let results = ResultsManager::new(&args.output_dir);

    #[cfg(feature = "browser")]
    {
        let launcher = vatio::BrowserLauncher::new(settings.clone());
        execute(config, launcher, settings, results, sampler, args.dry_run, &configs).await
    }
    #[cfg(not(feature = "browser"))]
    {
        if !args.dry_run {
            return Err(CliError::config(
                "this build has no browser support; only --dry-run is available",
            ));
        }
        let launcher = vatio::MockLauncher::default();
        execute(config, launcher, settings, results, sampler, true, &configs).await
    }
}

async fn execute<L: SessionLauncher>(
    config: &CliConfig,
    launcher: L,
    settings: ExperimentSettings,
    results: ResultsManager,
    sampler: SamplerConfig,
    dry_run: bool,
    configs: &[SessionConfig],
) -> CliResult<()> {
    let total = (configs.len() * settings.runs_per_config) as u64;
    let coordinator =
        TrialCoordinator::new(launcher, settings, results, sampler).with_dry_run(dry_run);

    let progress = output::batch_progress(config, total);
    let summaries = coordinator
        .run_batch(configs, |record| {
            output::trial_line(&progress, record);
            progress.inc(1);
        })
        .await?;
    progress.finish_and_clear();

    output::print_summary(config, &summaries);
    let failed: u32 = summaries.iter().map(|s| s.runs - s.successes).sum();
    if failed > 0 {
        return Err(CliError::execution(format!("{failed} trial(s) failed")));
    }
    Ok(())
}

/// Print the built-in configuration listing.
pub fn list_configs(args: &ListArgs) {
    output::print_config_list(&builtin_configs(), args.urls);
}

/// All built-in configurations, or the one matching `name`.
fn select_configs(name: Option<&str>) -> CliResult<Vec<SessionConfig>> {
    let configs = builtin_configs();
    let Some(name) = name else {
        return Ok(configs);
    };
    configs
        .iter()
        .find(|c| c.name == name)
        .cloned()
        .map(|c| vec![c])
        .ok_or_else(|| {
            let names: Vec<&str> = configs.iter().map(|c| c.name.as_str()).collect();
            CliError::config(format!(
                "unknown configuration {name:?}; available: {}",
                names.join(", ")
            ))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all_by_default() {
        assert_eq!(select_configs(None).unwrap().len(), 8);
    }

    #[test]
    fn test_select_single_config() {
        let configs = select_configs(Some("brave_apple_2x")).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name, "brave_apple_2x");
    }

    #[test]
    fn test_unknown_config_lists_names() {
        let err = select_configs(Some("firefox_apple_1x")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("firefox_apple_1x"));
        assert!(msg.contains("chrome_spotify_1x"));
        assert!(msg.contains("brave_apple_2x"));
    }

    #[tokio::test]
    async fn test_dry_run_experiment_writes_records() {
        use serde_json::{json, Value};
        use std::time::Duration;
        use vatio::{MockLauncher, MockPage};

        let dir = tempfile::TempDir::new().unwrap();
        let settings = ExperimentSettings {
            runs_per_config: 2,
            measurement_duration: Duration::ZERO,
            cooldown: Duration::ZERO,
            browser_startup_wait: Duration::ZERO,
            page_load_wait: Duration::ZERO,
            playback_start_wait: Duration::ZERO,
            sampler_interval: Duration::from_millis(500),
        };
        let sampler = SamplerConfig {
            dry_run: true,
            ..SamplerConfig::default()
        };
        // One fully scripted page per run: modals miss, media probe
        // confirms, speed already correct
        let pages: Vec<MockPage> = (0..2)
            .map(|_| {
                let page = MockPage::new();
                page.queue_eval(Value::Null);
                page.queue_eval(Value::Null);
                page.queue_eval(Value::Null);
                page.queue_eval(Value::Null);
                page.queue_eval(json!({"present": true, "playing": true}));
                page.queue_eval(json!({
                    "x": 100.0, "y": 700.0, "width": 40.0, "height": 20.0,
                    "label": "1x", "aux_id": null, "strategy": "speed"
                }));
                page
            })
            .collect();
        let launcher = MockLauncher::with_pages(pages);

        let configs = select_configs(Some("chrome_apple_1x")).unwrap();
        let results = ResultsManager::new(dir.path());
        execute(&CliConfig::new(), launcher, settings, results, sampler, true, &configs)
            .await
            .unwrap();
        assert!(dir.path().join("chrome_apple_1x/trial_01.json").exists());
        assert!(dir.path().join("chrome_apple_1x/trial_02.json").exists());
        assert!(dir.path().join("summary.json").exists());
    }

    #[tokio::test]
    async fn test_zero_runs_rejected() {
        let args = RunArgs {
            config: None,
            runs: Some(0),
            dry_run: true,
            output_dir: std::path::PathBuf::from("results"),
        };
        let err = run_experiment(&CliConfig::new(), &args).await.unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }
}
