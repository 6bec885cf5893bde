//! Results layout and persistence.
//!
//! Each configuration gets its own subdirectory under the output root:
//!
//! ```text
//! results/
//!   chrome_spotify_1x/
//!     energy_run_01.csv     raw sampler output
//!     trial_01.json         per-trial record
//!   summary.json            batch roll-up
//! ```
//!
//! Run numbering is 1-based and zero-padded so a directory listing
//! sorts chronologically.

use crate::error::VatioResult;
use crate::series::EnergySummary;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything recorded about one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Configuration name the trial ran under
    pub config: String,
    /// 1-based run number within the configuration
    pub run_id: u32,
    /// RFC 3339 completion time
    pub timestamp: String,
    /// Whether the trial produced a usable measurement. Degraded trials
    /// count as successes; `error` carries the degradation note.
    pub success: bool,
    /// Measurement, when one was taken
    pub energy: Option<EnergySummary>,
    /// Failure cause or degradation note
    pub error: Option<String>,
}

impl TrialRecord {
    /// Record for a completed trial.
    #[must_use]
    pub fn new(config: &str, run_id: u32, energy: EnergySummary) -> Self {
        Self {
            config: config.to_string(),
            run_id,
            timestamp: now_rfc3339(),
            success: true,
            energy: Some(energy),
            error: None,
        }
    }

    /// Record for a failed trial.
    #[must_use]
    pub fn failed(config: &str, run_id: u32, error: &str) -> Self {
        Self {
            config: config.to_string(),
            run_id,
            timestamp: now_rfc3339(),
            success: false,
            energy: None,
            error: Some(error.to_string()),
        }
    }

    /// Attach a degradation note without marking the trial failed.
    #[must_use]
    pub fn with_note(mut self, note: &str) -> Self {
        self.error = Some(note.to_string());
        self
    }
}

/// Per-configuration roll-up written into the batch summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    /// Configuration name
    pub config: String,
    /// Trials attempted
    pub runs: u32,
    /// Trials that produced a usable measurement
    pub successes: u32,
}

/// Batch summary written once at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// RFC 3339 completion time of the batch
    pub completed_at: String,
    /// One entry per configuration, in execution order
    pub configs: Vec<ConfigSummary>,
}

/// Owns the output directory layout.
#[derive(Debug, Clone)]
pub struct ResultsManager {
    root: PathBuf,
}

impl ResultsManager {
    /// Manager rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the sampler writes run `run_id` of `config` into. Creates
    /// the configuration directory.
    pub fn energy_filepath(&self, config: &str, run_id: u32) -> VatioResult<PathBuf> {
        let dir = self.config_dir(config)?;
        Ok(dir.join(format!("energy_run_{run_id:02}.csv")))
    }

    /// Persist a trial record as `trial_NN.json`.
    pub fn save_trial(&self, record: &TrialRecord) -> VatioResult<PathBuf> {
        let dir = self.config_dir(&record.config)?;
        let path = dir.join(format!("trial_{:02}.json", record.run_id));
        write_json(&path, record)?;
        debug!(path = %path.display(), success = record.success, "trial recorded");
        Ok(path)
    }

    /// Persist the batch summary as `summary.json` at the root.
    pub fn save_summary(&self, configs: Vec<ConfigSummary>) -> VatioResult<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join("summary.json");
        let summary = BatchSummary {
            completed_at: now_rfc3339(),
            configs,
        };
        write_json(&path, &summary)?;
        Ok(path)
    }

    fn config_dir(&self, config: &str) -> VatioResult<PathBuf> {
        let dir = self.root.join(config);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> VatioResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn summary() -> EnergySummary {
        EnergySummary {
            samples: 3,
            total_energy_joules: Some(4.5),
            mean_power_watts: Some(3.0),
            duration_seconds: Some(1.5),
            column_used: Some("SYSTEM_POWER (Watts)".to_string()),
        }
    }

    #[test]
    fn test_layout_is_per_config() {
        let dir = TempDir::new().unwrap();
        let manager = ResultsManager::new(dir.path());

        let energy = manager.energy_filepath("chrome_spotify_1x", 1).unwrap();
        assert_eq!(
            energy,
            dir.path().join("chrome_spotify_1x").join("energy_run_01.csv")
        );
        assert!(dir.path().join("chrome_spotify_1x").is_dir());
    }

    #[test]
    fn test_run_numbers_are_zero_padded() {
        let dir = TempDir::new().unwrap();
        let manager = ResultsManager::new(dir.path());
        let path = manager.energy_filepath("brave_apple_2x", 12).unwrap();
        assert!(path.ends_with("brave_apple_2x/energy_run_12.csv"));
    }

    #[test]
    fn test_trial_round_trips() {
        let dir = TempDir::new().unwrap();
        let manager = ResultsManager::new(dir.path());

        let record = TrialRecord::new("chrome_spotify_1x", 3, summary());
        let path = manager.save_trial(&record).unwrap();
        assert!(path.ends_with("chrome_spotify_1x/trial_03.json"));

        let loaded: TrialRecord =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, record);
        assert!(loaded.success);
    }

    #[test]
    fn test_failed_trial_record() {
        let record = TrialRecord::failed("brave_apple_1x", 1, "launch refused");
        assert!(!record.success);
        assert_eq!(record.error.as_deref(), Some("launch refused"));
        assert!(record.energy.is_none());
    }

    #[test]
    fn test_degradation_note_keeps_success() {
        let record = TrialRecord::new("chrome_apple_2x", 1, summary())
            .with_note("playback confirmation timed out, recorded with reduced confidence");
        assert!(record.success);
        assert!(record.error.as_deref().unwrap().contains("reduced confidence"));
    }

    #[test]
    fn test_batch_summary_written_at_root() {
        let dir = TempDir::new().unwrap();
        let manager = ResultsManager::new(dir.path());
        let path = manager
            .save_summary(vec![ConfigSummary {
                config: "chrome_spotify_1x".to_string(),
                runs: 30,
                successes: 29,
            }])
            .unwrap();
        assert_eq!(path, dir.path().join("summary.json"));

        let loaded: BatchSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.configs.len(), 1);
        assert_eq!(loaded.configs[0].successes, 29);
    }
}
