//! Engine backed by an external command-line tool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::engine::{Engine, EngineRequest, ensure_supported};
use crate::error::{EngineError, Result};
use crate::matrix::ConversionMatrix;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

fn default_timeout_secs() -> u64 {
    600
}

/// Declarative description of a command engine.
///
/// ```toml
/// [[engines]]
/// name = "LibreOffice"
/// program = "soffice"
/// command = "soffice --headless --convert-to {output_format} --outdir {output_dir} {input}"
/// matrix = { docx = ["pdf"], xlsx = ["pdf"] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEngineConfig {
    pub name: String,
    /// Shell command template.
    pub command: String,
    #[serde(default)]
    pub matrix: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Binary probed with `--version` to decide availability.
    #[serde(default)]
    pub program: Option<String>,
}

impl CommandEngineConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            matrix: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
            program: None,
        }
    }

    pub fn with_outputs<I, S>(mut self, input: &str, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.matrix
            .entry(input.to_string())
            .or_default()
            .extend(outputs.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }
}

/// Runs a shell command per conversion.
///
/// Success means the process exited with status 0; the router still checks
/// the output file afterwards.
pub struct CommandEngine {
    config: CommandEngineConfig,
    matrix: ConversionMatrix,
    /// Cached `--version` output, if probed.
    version: Option<String>,
    available: bool,
}

enum Wait {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Aborted(EngineError),
}

impl CommandEngine {
    pub fn new(config: CommandEngineConfig) -> Self {
        let matrix = ConversionMatrix::from(config.matrix.clone());
        let (available, version) = match config.program.as_deref() {
            Some(program) => match Self::detect_version(program) {
                Some(version) => (true, Some(version)),
                None => (false, None),
            },
            None => (true, None),
        };

        Self {
            config,
            matrix,
            version,
            available,
        }
    }

    pub fn config(&self) -> &CommandEngineConfig {
        &self.config
    }

    /// Run `program --version`; `None` when the program cannot be spawned.
    fn detect_version(program: &str) -> Option<String> {
        let mut cmd = std::process::Command::new(program);
        cmd.arg("--version");
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
        let output = cmd.output().ok()?;
        let text = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        let first_line = String::from_utf8_lossy(&text)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string();
        Some(first_line)
    }

    /// Expand placeholders in the command template.
    fn substitute_variables(command: &str, request: &EngineRequest) -> String {
        let output_dir = request
            .output_path
            .parent()
            .unwrap_or_else(|| Path::new("."));
        command
            .replace("{input}", &shell_quote(&request.input_path))
            .replace("{output}", &shell_quote(&request.output_path))
            .replace("{output_dir}", &shell_quote(output_dir))
            .replace("{input_format}", &request.input_format)
            .replace("{output_format}", &request.output_format)
    }

    fn shell_command(command: &str) -> Command {
        #[cfg(windows)]
        let mut cmd = {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c.creation_flags(CREATE_NO_WINDOW);
            c
        };

        #[cfg(not(windows))]
        let mut cmd = {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[cfg(not(windows))]
fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

#[cfg(windows)]
fn shell_quote(path: &Path) -> String {
    format!("\"{}\"", path.to_string_lossy())
}

#[async_trait]
impl Engine for CommandEngine {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn conversion_matrix(&self) -> &ConversionMatrix {
        &self.matrix
    }

    fn features(&self) -> BTreeMap<String, bool> {
        BTreeMap::from([("external_tools".to_string(), true)])
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }

    async fn convert(&self, request: &EngineRequest) -> Result<bool> {
        ensure_supported(self, request)?;

        if let Some(parent) = request.output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let command = Self::substitute_variables(&self.config.command, request);
        let running = format!("Running {}", self.config.name);
        request.report(10, &running)?;

        info!(engine = %self.config.name, "Executing command: {}", command);
        let start = std::time::Instant::now();

        let mut child = Self::shell_command(&command)
            .spawn()
            .map_err(|e| EngineError::Process(format!("Failed to spawn command: {e}")))?;

        let stdout_handle = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("stdout: {}", line);
                }
            })
        });

        let stderr_handle = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.contains("error") || line.contains("Error") {
                        warn!("stderr: {}", line);
                    } else {
                        debug!("stderr: {}", line);
                    }
                }
            })
        });

        let deadline = tokio::time::sleep(Duration::from_secs(self.config.timeout_secs));
        tokio::pin!(deadline);
        let mut heartbeat = tokio::time::interval(Duration::from_secs(1));
        heartbeat.tick().await;

        let outcome = loop {
            tokio::select! {
                status = child.wait() => break Wait::Exited(status),
                _ = &mut deadline => break Wait::TimedOut,
                _ = heartbeat.tick() => {
                    if let Err(e) = request.report(20, &running) {
                        break Wait::Aborted(e);
                    }
                }
            }
        };

        let result = match outcome {
            Wait::Exited(Ok(status)) => Ok(status),
            Wait::Exited(Err(e)) => Err(EngineError::Process(format!(
                "Failed to wait for command: {e}"
            ))),
            Wait::TimedOut => {
                error!("Command timed out after {}s", self.config.timeout_secs);
                let _ = child.kill().await;
                Err(EngineError::Timeout {
                    secs: self.config.timeout_secs,
                })
            }
            Wait::Aborted(e) => {
                info!(engine = %self.config.name, "Stopping command: {}", e);
                let _ = child.kill().await;
                Err(e)
            }
        };

        if let Some(h) = stdout_handle {
            let _ = h.await;
        }
        if let Some(h) = stderr_handle {
            let _ = h.await;
        }

        let status = result?;
        if !status.success() {
            error!("Command exited with status: {}", status);
            return Err(EngineError::Process(format!(
                "Command failed with exit code: {}",
                status.code().unwrap_or(-1)
            )));
        }

        info!(
            engine = %self.config.name,
            "Command completed in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        request.report(90, "Finalizing output")?;
        Ok(true)
    }
}
