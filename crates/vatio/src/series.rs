//! Sample-series interpretation.
//!
//! The sampler writes a CSV whose energy column depends on the hardware
//! the measurement tool detected. This module classifies the header,
//! extracts the one column that matters for the platform, and reduces
//! it to an [`EnergySummary`] in joules.
//!
//! Two column shapes exist: cumulative joule counters (Intel/AMD RAPL)
//! and instantaneous watt gauges (Apple silicon, Windows). Watt gauges
//! are integrated over the sample timing; joule counters are differenced
//! end to end.

use crate::error::{VatioError, VatioResult};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Energy-reporting hardware families the sampler distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareClass {
    /// Intel RAPL counters
    IntelRapl,
    /// AMD RAPL counters
    AmdRapl,
    /// Apple silicon power gauges
    AppleSilicon,
    /// Windows on Intel power gauges
    WindowsIntel,
    /// Detection failed; parsing a series for this class is an error
    Unknown,
}

/// How the values in an energy column are to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnRole {
    /// Monotonic joule counter; energy is last minus first
    CumulativeJoules,
    /// Instantaneous watt gauge; energy is power integrated over time
    InstantWatts,
}

impl HardwareClass {
    /// Best-effort detection from the build target. A cross-vendor
    /// refinement (reading the CPU vendor at runtime) is not attempted;
    /// x86 Linux and macOS hosts default to Intel RAPL, and the column
    /// check on the actual header catches a wrong guess.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            Self::AppleSilicon
        } else if cfg!(target_os = "windows") {
            Self::WindowsIntel
        } else if cfg!(any(target_arch = "x86_64", target_arch = "x86")) {
            Self::IntelRapl
        } else {
            Self::Unknown
        }
    }

    /// The CSV column this hardware family reports energy in.
    #[must_use]
    pub const fn energy_column(self) -> Option<(&'static str, ColumnRole)> {
        match self {
            Self::IntelRapl => Some(("PACKAGE_ENERGY (J)", ColumnRole::CumulativeJoules)),
            Self::AmdRapl => Some(("CPU_ENERGY (J)", ColumnRole::CumulativeJoules)),
            Self::AppleSilicon => Some(("SYSTEM_POWER (Watts)", ColumnRole::InstantWatts)),
            Self::WindowsIntel => Some(("CPU_POWER (W)", ColumnRole::InstantWatts)),
            Self::Unknown => None,
        }
    }

    /// Stable name for logs and records.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IntelRapl => "intel-rapl",
            Self::AmdRapl => "amd-rapl",
            Self::AppleSilicon => "apple-silicon",
            Self::WindowsIntel => "windows-intel",
            Self::Unknown => "unknown",
        }
    }
}

/// Elapsed-time column, cumulative milliseconds since sampling began.
const DELTA_COLUMN: &str = "Delta";
/// Wall-clock column, epoch milliseconds.
const TIME_COLUMN: &str = "Time";

/// One parsed measurement series: the platform's energy column plus
/// whatever timing the file carried.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSeries {
    /// Header of the column the values came from
    pub column: String,
    /// How to read the values
    pub role: ColumnRole,
    /// Column values in row order
    pub values: Vec<f64>,
    /// Per-row timestamps in milliseconds, when the file had a usable
    /// timing column
    pub timestamps_ms: Option<Vec<f64>>,
}

impl SampleSeries {
    /// Parse a sampler output file for the given hardware class.
    pub fn from_path(path: &Path, class: HardwareClass) -> VatioResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, class)
    }

    /// Parse sampler CSV output for the given hardware class.
    ///
    /// Fails when the class is unknown or the expected column is absent;
    /// both errors carry the raw header so the mismatch is diagnosable
    /// from the log alone.
    pub fn from_reader<R: Read>(reader: R, class: HardwareClass) -> VatioResult<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader.headers()?.clone();
        let raw_header = headers.iter().collect::<Vec<_>>().join(",");

        let Some((column, role)) = class.energy_column() else {
            return Err(VatioError::series_parse(format!(
                "cannot interpret samples for unrecognized hardware, header was: {raw_header}"
            )));
        };
        let Some(value_idx) = headers.iter().position(|h| h == column) else {
            return Err(VatioError::series_parse(format!(
                "column {column:?} expected for {} not found, header was: {raw_header}",
                class.name()
            )));
        };

        // Elapsed time beats wall clock when both are present
        let time_idx = headers
            .iter()
            .position(|h| h == DELTA_COLUMN)
            .or_else(|| headers.iter().position(|h| h == TIME_COLUMN));

        let mut values = Vec::new();
        let mut timestamps = time_idx.map(|_| Vec::new());
        for record in csv_reader.records() {
            let record = record?;
            values.push(parse_cell(&record, value_idx, column)?);
            if let (Some(ts), Some(idx)) = (timestamps.as_mut(), time_idx) {
                ts.push(parse_cell(&record, idx, "timestamp")?);
            }
        }

        debug!(
            column,
            rows = values.len(),
            timed = timestamps.is_some(),
            "parsed sample series"
        );
        Ok(Self {
            column: column.to_string(),
            role,
            values,
            timestamps_ms: timestamps,
        })
    }

    /// Reduce the series to an energy summary.
    ///
    /// Watt gauges: every sample is charged one sampling period. With
    /// timestamps the observed gaps supply the first `n - 1` periods and
    /// the final sample reuses the last observed gap; without timestamps
    /// `nominal_interval` stands in for every period.
    ///
    /// Joule counters: a non-decreasing series is a cumulative counter
    /// and reduces to last minus first; otherwise the values are treated
    /// as per-sample joules and summed. A counter that wrapped mid-run
    /// is misread by this rule; runs are short enough that wraps have
    /// not been observed.
    #[must_use]
    pub fn summarize(&self, nominal_interval: Duration) -> EnergySummary {
        let n = self.values.len();
        if n == 0 {
            return EnergySummary::empty();
        }

        let total = match self.role {
            ColumnRole::CumulativeJoules => {
                if self.values.windows(2).all(|w| w[1] >= w[0]) {
                    self.values[n - 1] - self.values[0]
                } else {
                    self.values.iter().sum()
                }
            }
            ColumnRole::InstantWatts => self.integrate_power(nominal_interval),
        };

        let duration = self.duration_seconds(nominal_interval);
        let mean_power = match duration {
            Some(d) if d > 0.0 => Some(total / d),
            _ => None,
        };
        EnergySummary {
            samples: n,
            total_energy_joules: Some(total),
            mean_power_watts: mean_power,
            duration_seconds: duration,
            column_used: Some(self.column.clone()),
        }
    }

    fn integrate_power(&self, nominal_interval: Duration) -> f64 {
        let n = self.values.len();
        let nominal_s = nominal_interval.as_secs_f64();
        let deltas_s: Vec<f64> = match &self.timestamps_ms {
            Some(ts) if ts.len() == n && n >= 2 => {
                let mut deltas: Vec<f64> =
                    ts.windows(2).map(|w| (w[1] - w[0]) / 1000.0).collect();
                // The final sample has no successor; charge it the last
                // observed period
                deltas.push(deltas[n - 2]);
                deltas
            }
            _ => vec![nominal_s; n],
        };
        self.values
            .iter()
            .zip(&deltas_s)
            .map(|(watts, secs)| watts * secs)
            .sum()
    }

    fn duration_seconds(&self, nominal_interval: Duration) -> Option<f64> {
        let n = self.values.len();
        if n == 0 {
            return None;
        }
        match &self.timestamps_ms {
            Some(ts) if ts.len() == n && n >= 2 => Some((ts[n - 1] - ts[0]) / 1000.0),
            _ => Some(nominal_interval.as_secs_f64() * n as f64),
        }
    }
}

/// Reduced measurement for one trial, serialized into trial records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergySummary {
    /// Number of samples in the series
    pub samples: usize,
    /// Total energy in joules, absent when nothing was measured
    pub total_energy_joules: Option<f64>,
    /// Mean power in watts over the measured duration
    pub mean_power_watts: Option<f64>,
    /// Measured duration in seconds
    pub duration_seconds: Option<f64>,
    /// Header of the column the summary was computed from
    pub column_used: Option<String>,
}

impl EnergySummary {
    /// Summary for a trial where nothing was measured (dry runs, empty
    /// sampler output).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            samples: 0,
            total_energy_joules: None,
            mean_power_watts: None,
            duration_seconds: None,
            column_used: None,
        }
    }
}

fn parse_cell(record: &csv::StringRecord, idx: usize, what: &str) -> VatioResult<f64> {
    let cell = record.get(idx).ok_or_else(|| {
        VatioError::series_parse(format!("row too short, missing {what} at index {idx}"))
    })?;
    cell.trim().parse::<f64>().map_err(|_| {
        VatioError::series_parse(format!("non-numeric {what} value {cell:?}"))
    })
}
