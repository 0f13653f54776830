//! `arduino-cli` backed pipeline.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::{BuildReport, DevicePipeline, MonitorStream, Sketch, Stage, StageFailure};

/// Board and toolchain settings.
#[derive(Debug, Clone)]
pub struct ArduinoConfig {
    /// Path or name of the `arduino-cli` executable.
    pub cli: PathBuf,
    /// Serial port the board is attached to.
    pub port: String,
    /// Fully qualified board name.
    pub fqbn: String,
    pub baud_rate: u32,
}

impl Default for ArduinoConfig {
    fn default() -> Self {
        Self {
            cli: PathBuf::from("arduino-cli"),
            port: "/dev/ttyUSB0".to_string(),
            fqbn: "arduino:avr:uno".to_string(),
            baud_rate: 9600,
        }
    }
}

pub struct ArduinoCliPipeline {
    config: ArduinoConfig,
}

impl ArduinoCliPipeline {
    pub fn new(config: ArduinoConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.config.cli);
        command.stdin(Stdio::null()).kill_on_drop(true);
        command
    }

    fn compile_command(&self, sketch: &Sketch) -> Command {
        let mut command = self.command();
        command
            .arg("compile")
            .arg("--fqbn")
            .arg(&self.config.fqbn)
            .arg("--build-path")
            .arg(&sketch.build_dir)
            .arg(&sketch.dir);
        command
    }

    fn upload_command(&self, sketch: &Sketch) -> Command {
        let mut command = self.command();
        command
            .arg("upload")
            .arg("-p")
            .arg(&self.config.port)
            .arg("--fqbn")
            .arg(&self.config.fqbn)
            .arg("--input-dir")
            .arg(&sketch.build_dir)
            .arg(&sketch.dir);
        command
    }

    fn monitor_command(&self) -> Command {
        let mut command = self.command();
        command
            .arg("monitor")
            .arg("-p")
            .arg(&self.config.port)
            .arg("--config")
            .arg(format!("baudrate={}", self.config.baud_rate))
            .arg("--quiet");
        command
    }
}

/// Runs `command` to completion. Returns stderr on success, or the most
/// useful diagnostic on failure.
async fn run(stage: Stage, mut command: Command) -> Result<String, StageFailure> {
    let output = command
        .output()
        .await
        .map_err(|e| StageFailure::new(stage, format!("could not start arduino-cli: {e}")))?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if output.status.success() {
        return Ok(stderr);
    }

    let detail = if stderr.is_empty() {
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            format!("arduino-cli exited with {}", output.status)
        } else {
            stdout
        }
    } else {
        stderr
    };
    Err(StageFailure::new(stage, detail))
}

/// One serial line, minus any trailing `\r`. Bytes that are not UTF-8
/// become U+FFFD.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[async_trait]
impl DevicePipeline for ArduinoCliPipeline {
    async fn build(&self, sketch: &Sketch) -> Result<BuildReport, StageFailure> {
        debug!(dir = %sketch.dir.display(), fqbn = %self.config.fqbn, "Compiling sketch");
        let warnings = run(Stage::Build, self.compile_command(sketch)).await?;
        Ok(BuildReport { warnings })
    }

    async fn transfer(&self, sketch: &Sketch) -> Result<(), StageFailure> {
        debug!(dir = %sketch.dir.display(), port = %self.config.port, "Uploading sketch");
        run(Stage::Transfer, self.upload_command(sketch)).await?;
        info!(port = %self.config.port, "Sketch uploaded");
        Ok(())
    }

    async fn monitor(&self) -> Result<MonitorStream, StageFailure> {
        let mut child = self
            .monitor_command()
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                StageFailure::new(Stage::Monitor, format!("could not start arduino-cli: {e}"))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            StageFailure::new(Stage::Monitor, "monitor stdout was not captured")
        })?;
        let lines = BufReader::new(stdout).split(b'\n');

        // The child travels with the stream; dropping the stream kills it.
        let stream = stream::unfold(Some((child, lines)), |state| async move {
            let (child, mut lines) = state?;
            match lines.next_segment().await {
                Ok(Some(raw)) => Some((Ok(decode_line(&raw)), Some((child, lines)))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        });

        Ok(stream.boxed())
    }
}
