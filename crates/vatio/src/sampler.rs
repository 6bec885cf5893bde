//! Energy sampler process control.
//!
//! Wraps the `energibridge` measurement tool: spawn it around an idle
//! child so it samples for as long as we let it live, probe that it
//! survived startup (a missing driver or refused sudo kills it within
//! milliseconds), and stop it gracefully so it flushes its CSV before
//! the series is parsed.

use crate::error::{VatioError, VatioResult};
use crate::series::{EnergySummary, HardwareClass, SampleSeries};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Grace period between SIGINT and forced kill.
const STOP_GRACE: Duration = Duration::from_secs(10);

/// How the sampler binary is invoked.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Path to the measurement binary
    pub binary: PathBuf,
    /// Sampling interval passed to the tool
    pub interval: Duration,
    /// Prefix the invocation with `sudo -n`; RAPL counters on Linux
    /// need elevation
    pub elevate: bool,
    /// Skip spawning entirely and report an empty measurement
    pub dry_run: bool,
    /// How long to wait before checking the process survived startup
    pub probe_delay: Duration,
    /// Hardware class used to interpret the output
    pub hardware: HardwareClass,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            binary: std::env::var_os("ENERGIBRIDGE_PATH")
                .map_or_else(|| PathBuf::from("energibridge"), PathBuf::from),
            interval: Duration::from_millis(500),
            elevate: cfg!(target_os = "linux"),
            dry_run: false,
            probe_delay: Duration::from_millis(500),
            hardware: HardwareClass::detect(),
        }
    }
}

impl SamplerConfig {
    /// Disable elevation regardless of platform.
    #[must_use]
    pub fn without_elevation(mut self) -> Self {
        self.elevate = false;
        self
    }
}

/// A running (or dry-run) measurement around one trial.
#[derive(Debug)]
pub struct EnergySampler {
    config: SamplerConfig,
    output: PathBuf,
    child: Option<Child>,
}

impl EnergySampler {
    /// Start sampling into `output`. Returns once the process has
    /// survived the startup probe.
    ///
    /// The tool is given an effectively infinite idle command to time;
    /// the measurement window is whatever elapses before [`stop`](Self::stop).
    pub async fn start(config: SamplerConfig, output: &Path) -> VatioResult<Self> {
        if config.dry_run {
            info!("dry run, not spawning sampler");
            return Ok(Self {
                config,
                output: output.to_path_buf(),
                child: None,
            });
        }

        let mut command = if config.elevate {
            let mut c = Command::new("sudo");
            c.arg("-n").arg(&config.binary);
            c
        } else {
            Command::new(&config.binary)
        };
        command
            .arg("--output")
            .arg(output)
            .arg("--interval")
            .arg(config.interval.as_millis().to_string())
            .arg("--");
        if cfg!(target_os = "windows") {
            command.args(["ping", "-n", "99999", "127.0.0.1"]);
        } else {
            command.args(["sleep", "99999"]);
        }
        command.stdout(Stdio::null()).stderr(Stdio::piped());

        debug!(binary = %config.binary.display(), output = %output.display(), "starting sampler");
        let mut child = command.spawn().map_err(|e| {
            VatioError::sampler_start(format!(
                "failed to spawn {}: {e}",
                config.binary.display()
            ))
        })?;

        // An immediate exit means a broken setup, not an empty measurement
        tokio::time::sleep(config.probe_delay).await;
        if let Some(status) = child.try_wait()? {
            let stderr = read_stderr(&mut child).await;
            return Err(VatioError::sampler_start(format!(
                "sampler exited during startup ({status}): {stderr}"
            )));
        }

        info!(interval_ms = config.interval.as_millis() as u64, "sampler running");
        Ok(Self {
            config,
            output: output.to_path_buf(),
            child: Some(child),
        })
    }

    /// Stop sampling and parse whatever was written.
    ///
    /// SIGINT first so the tool flushes its CSV; a process still alive
    /// after the grace period is killed, and the (possibly truncated)
    /// output is parsed anyway.
    pub async fn stop(mut self) -> VatioResult<EnergySummary> {
        let Some(mut child) = self.child.take() else {
            return Ok(EnergySummary::empty());
        };

        if child.try_wait()?.is_none() {
            interrupt(&child)?;
            match tokio::time::timeout(STOP_GRACE, child.wait()).await {
                Ok(status) => {
                    let status = status?;
                    debug!(%status, "sampler stopped");
                }
                Err(_) => {
                    warn!("sampler ignored interrupt, killing");
                    child.start_kill().map_err(|e| {
                        VatioError::sampler_stop(format!("kill failed: {e}"))
                    })?;
                    child.wait().await?;
                }
            }
        } else {
            warn!("sampler exited before stop was requested");
        }

        if !self.output.exists() {
            return Err(VatioError::sampler_stop(format!(
                "sampler wrote no output at {}",
                self.output.display()
            )));
        }
        let series = SampleSeries::from_path(&self.output, self.config.hardware)?;
        Ok(series.summarize(self.config.interval))
    }
}

#[cfg(unix)]
fn interrupt(child: &Child) -> VatioResult<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    kill(Pid::from_raw(pid as i32), Signal::SIGINT)
        .map_err(|e| VatioError::sampler_stop(format!("SIGINT failed: {e}")))
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) -> VatioResult<()> {
    // No gentle interrupt; the grace-period timeout escalates to kill
    Ok(())
}

async fn read_stderr(child: &mut Child) -> String {
    let Some(mut stderr) = child.stderr.take() else {
        return String::from("(no stderr)");
    };
    let mut buf = Vec::new();
    if stderr.read_to_end(&mut buf).await.is_err() {
        return String::from("(stderr unreadable)");
    }
    String::from_utf8_lossy(&buf).trim().to_string()
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        file.write_all(body.as_bytes()).unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config(binary: PathBuf) -> SamplerConfig {
        SamplerConfig {
            binary,
            interval: Duration::from_millis(500),
            elevate: false,
            dry_run: false,
            probe_delay: Duration::from_millis(100),
            hardware: HardwareClass::IntelRapl,
        }
    }

    #[tokio::test]
    async fn test_startup_failure_captures_stderr() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "broken", "echo 'rapl: permission denied' >&2\nexit 1\n");
        let out = dir.path().join("energy.csv");

        let err = EnergySampler::start(config(script), &out).await.unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, VatioError::SamplerStart { .. }));
        assert!(msg.contains("permission denied"), "got: {msg}");
    }

    #[tokio::test]
    async fn test_start_stop_parses_output() {
        let dir = TempDir::new().unwrap();
        // Fake sampler: honor --output, write a tiny series, then idle
        let script = write_script(
            &dir,
            "fake-sampler",
            r#"out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf 'Delta,PACKAGE_ENERGY (J)\n0,10.0\n500,12.0\n' > "$out"
sleep 60
"#,
        );
        let out = dir.path().join("energy.csv");

        let sampler = EnergySampler::start(config(script), &out).await.unwrap();
        let summary = sampler.stop().await.unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.total_energy_joules, Some(2.0));
    }

    #[tokio::test]
    async fn test_missing_output_is_stop_error() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "no-output", "sleep 60\n");
        let out = dir.path().join("energy.csv");

        let sampler = EnergySampler::start(config(script), &out).await.unwrap();
        let err = sampler.stop().await.unwrap_err();
        assert!(matches!(err, VatioError::SamplerStop { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_measures_nothing() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(PathBuf::from("/nonexistent"));
        cfg.dry_run = true;
        let out = dir.path().join("energy.csv");

        let sampler = EnergySampler::start(cfg, &out).await.unwrap();
        let summary = sampler.stop().await.unwrap();
        assert_eq!(summary, EnergySummary::empty());
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_spawn() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("energy.csv");
        let err = EnergySampler::start(config(PathBuf::from("/nonexistent/energibridge")), &out)
            .await
            .unwrap_err();
        assert!(matches!(err, VatioError::SamplerStart { .. }));
    }
}
