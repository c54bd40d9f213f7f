//! Test driver -- launches the process under test and waits for it.
//!
//! The driven process is described by a JSON scenario descriptor:
//!
//! ```json
//! {
//!   "description": "MQTT5 jobs service client test",
//!   "command": "node",
//!   "working_dir": "servicetests/tests/jobs_execution",
//!   "arguments": [
//!     { "name": "dist/index.js" },
//!     { "name": "--endpoint", "secret": "ci/endpoint" },
//!     { "name": "--thing_name", "data": "$THING_NAME" }
//!   ],
//!   "env": { "AWS_REGION": "$REGION" },
//!   "timeout_secs": 600
//! }
//! ```
//!
//! Every argument `name` is passed as is. `data` is passed after it with
//! placeholders substituted, `secret` is passed after it with the secret's
//! value. Placeholders: `$INPUT_UUID`, `$THING_NAME`, `$CERT_PATH`,
//! `$KEY_PATH`, `$REGION`.
//!
//! Output is streamed line by line to the `devicetest::driver` tracing target
//! and the last lines are kept for the failure diagnostic. Exit status is the
//! only signal interpreted.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use devicetest_control_plane::SecretStore;
use devicetest_core::{DeviceTestError, RunId};

use crate::secret::SecretResolver;

/// Tracing target for lines produced by the driven process.
pub const OUTPUT_TARGET: &str = "devicetest::driver";

/// How long output readers may keep draining after the process exited or
/// was killed. A grandchild holding the pipes open must not stall the run.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Scenario descriptor as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDescriptor {
    #[serde(default)]
    pub description: String,
    /// Program to execute (looked up in `PATH` when not a path).
    pub command: String,
    /// Working directory of the process; the harness's own when absent.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub arguments: Vec<ScenarioArgument>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Overrides the harness default driver timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// One command-line argument, optionally followed by a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioArgument {
    pub name: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

impl ScenarioDescriptor {
    /// Reads and validates the descriptor at `path`.
    pub async fn load(path: &Path) -> Result<Self, DeviceTestError> {
        let scenario_error = |reason: String| DeviceTestError::Scenario {
            path: path.display().to_string(),
            reason,
        };

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| scenario_error(format!("cannot read: {e}")))?;
        let descriptor: Self = serde_json::from_str(&content)
            .map_err(|e| scenario_error(format!("invalid JSON: {e}")))?;
        descriptor.validate().map_err(scenario_error)?;
        Ok(descriptor)
    }

    fn validate(&self) -> Result<(), String> {
        if self.command.trim().is_empty() {
            return Err("command must not be empty".to_owned());
        }
        if self.timeout_secs == Some(0) {
            return Err("timeout_secs must be greater than 0".to_owned());
        }
        for argument in &self.arguments {
            if argument.name.is_empty() {
                return Err("argument name must not be empty".to_owned());
            }
            if argument.data.is_some() && argument.secret.is_some() {
                return Err(format!(
                    "argument '{}' has both 'data' and 'secret'",
                    argument.name
                ));
            }
        }
        Ok(())
    }
}

/// Run-specific values made available to the driven process.
#[derive(Debug, Clone)]
pub struct DriveContext {
    pub run_id: RunId,
    pub thing_name: String,
    pub certificate_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub region: String,
}

impl DriveContext {
    fn path_text(path: Option<&PathBuf>) -> String {
        path.map(|p| p.display().to_string()).unwrap_or_default()
    }

    /// Replaces every placeholder in `value`.
    pub fn substitute(&self, value: &str) -> String {
        value
            .replace("$INPUT_UUID", self.run_id.as_str())
            .replace("$THING_NAME", &self.thing_name)
            .replace("$CERT_PATH", &Self::path_text(self.certificate_path.as_ref()))
            .replace("$KEY_PATH", &Self::path_text(self.key_path.as_ref()))
            .replace("$REGION", &self.region)
    }

    /// Variables every driven process receives.
    fn env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("DEVICETEST_RUN_ID", self.run_id.to_string()),
            ("DEVICETEST_THING_NAME", self.thing_name.clone()),
            (
                "DEVICETEST_CERT_PATH",
                Self::path_text(self.certificate_path.as_ref()),
            ),
            ("DEVICETEST_KEY_PATH", Self::path_text(self.key_path.as_ref())),
            ("DEVICETEST_REGION", self.region.clone()),
        ]
    }
}

/// Fully resolved launch parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

/// How the driven process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    /// Exit code 0.
    Passed,
    /// Non-zero exit or terminated by a signal.
    NonZeroExit,
    /// Killed after exceeding its timeout.
    Timeout,
}

/// Result of one driven process.
#[derive(Debug, Clone, Serialize)]
pub struct DriverReport {
    pub status: DriverStatus,
    pub exit_code: Option<i32>,
    /// Last lines of combined stdout/stderr.
    pub captured_output: Vec<String>,
    pub elapsed: Duration,
    pub timeout: Duration,
}

impl DriverReport {
    pub fn passed(&self) -> bool {
        self.status == DriverStatus::Passed
    }

    /// Converts a failed report into its error.
    pub fn into_result(self) -> Result<Self, DeviceTestError> {
        match self.status {
            DriverStatus::Passed => Ok(self),
            DriverStatus::NonZeroExit => Err(DeviceTestError::DriverNonZeroExit {
                code: self.exit_code,
            }),
            DriverStatus::Timeout => Err(DeviceTestError::DriverTimeout {
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// Launches scenario processes.
pub struct TestDriver<S: SecretStore> {
    secrets: SecretResolver<S>,
    default_timeout: Duration,
    tail_lines: usize,
}

impl<S: SecretStore> TestDriver<S> {
    pub fn new(secrets: SecretResolver<S>, default_timeout: Duration, tail_lines: usize) -> Self {
        Self {
            secrets,
            default_timeout,
            tail_lines,
        }
    }

    /// Resolves secrets and placeholders of `descriptor` for `ctx`.
    pub async fn prepare(
        &self,
        descriptor: &ScenarioDescriptor,
        ctx: &DriveContext,
    ) -> Result<PreparedCommand, DeviceTestError> {
        let mut args = Vec::with_capacity(descriptor.arguments.len() * 2);
        for argument in &descriptor.arguments {
            args.push(argument.name.clone());
            if let Some(secret) = &argument.secret {
                args.push(self.secrets.resolve(secret).await?);
            } else if let Some(data) = &argument.data {
                args.push(ctx.substitute(data));
            }
        }

        let mut env: Vec<(String, String)> = descriptor
            .env
            .iter()
            .map(|(k, v)| (k.clone(), ctx.substitute(v)))
            .collect();
        env.extend(ctx.env().into_iter().map(|(k, v)| (k.to_owned(), v)));

        Ok(PreparedCommand {
            program: descriptor.command.clone(),
            args,
            env,
            working_dir: descriptor.working_dir.clone(),
            timeout: descriptor
                .timeout_secs
                .map_or(self.default_timeout, Duration::from_secs),
        })
    }

    /// Loads the descriptor at `scenario_path` and runs it for `ctx`.
    ///
    /// A process that ran and failed is an `Ok` report with a failing
    /// status. Errors are reserved for runs that could not start.
    ///
    /// # Errors
    ///
    /// - `Scenario`: missing or malformed descriptor
    /// - `SecretUnavailable`: an argument secret could not be read
    /// - `DriverLaunch`: the process could not be spawned
    pub async fn run(
        &self,
        scenario_path: &Path,
        ctx: &DriveContext,
    ) -> Result<DriverReport, DeviceTestError> {
        let descriptor = ScenarioDescriptor::load(scenario_path).await?;
        let prepared = self.prepare(&descriptor, ctx).await?;

        info!(
            scenario = %scenario_path.display(),
            description = descriptor.description.as_str(),
            program = prepared.program.as_str(),
            run_id = %ctx.run_id,
            timeout_secs = prepared.timeout.as_secs(),
            "launching driven process"
        );

        self.execute(&prepared).await
    }

    /// Spawns `prepared` and waits for it within its timeout.
    pub async fn execute(&self, prepared: &PreparedCommand) -> Result<DriverReport, DeviceTestError> {
        let mut command = Command::new(&prepared.program);
        command
            .args(&prepared.args)
            .envs(prepared.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &prepared.working_dir {
            command.current_dir(dir);
        }
        // own process group, so a timeout also reaches what a wrapper spawned
        #[cfg(unix)]
        command.process_group(0);

        let started = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| DeviceTestError::DriverLaunch {
                reason: format!("{}: {e}", prepared.program),
            })?;

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(self.tail_lines)));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump_output(
                stdout,
                "stdout",
                Arc::clone(&tail),
                self.tail_lines,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump_output(
                stderr,
                "stderr",
                Arc::clone(&tail),
                self.tail_lines,
            )));
        }

        let (status, exit_code) = match tokio::time::timeout(prepared.timeout, child.wait()).await
        {
            Ok(Ok(exit)) => {
                let status = if exit.success() {
                    DriverStatus::Passed
                } else {
                    DriverStatus::NonZeroExit
                };
                (status, exit.code())
            }
            Ok(Err(e)) => return Err(DeviceTestError::Io(e)),
            Err(_elapsed) => {
                warn!(
                    program = prepared.program.as_str(),
                    timeout_secs = prepared.timeout.as_secs(),
                    "driven process timed out, killing it"
                );
                #[cfg(unix)]
                if let Some(pid) = child.id() {
                    kill_process_group(pid);
                }
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill driven process");
                }
                (DriverStatus::Timeout, None)
            }
        };
        let elapsed = started.elapsed();

        for reader in readers {
            let abort = reader.abort_handle();
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await.is_err() {
                abort.abort();
            }
        }

        let captured_output = tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        info!(
            program = prepared.program.as_str(),
            status = ?status,
            exit_code = ?exit_code,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "driven process finished"
        );

        Ok(DriverReport {
            status,
            exit_code,
            captured_output,
            elapsed,
            timeout: prepared.timeout,
        })
    }
}

/// Sends SIGKILL to every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) with a negative pid only signals the group.
    let result = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if result != 0 {
        warn!(
            pgid,
            error = %std::io::Error::last_os_error(),
            "failed to kill driven process group"
        );
    }
}

/// Forwards each line of `stream` to tracing and keeps the last `limit`.
async fn pump_output<R>(
    stream: R,
    stream_name: &'static str,
    tail: Arc<Mutex<VecDeque<String>>>,
    limit: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                info!(target: OUTPUT_TARGET, stream = stream_name, "{line}");
                if limit == 0 {
                    continue;
                }
                let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
                if tail.len() == limit {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(stream = stream_name, error = %e, "stopped reading driven process output");
                break;
            }
        }
    }
}
