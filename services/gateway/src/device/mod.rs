//! Device session gateway.
//!
//! Access to the lab board is gated on entitlement. An attempt stages the
//! submitted code in its own directory, then runs the pipeline stages in
//! order: build, transfer, monitor. A failed stage ends the attempt and no
//! later stage runs.

mod arduino;
mod mock;
mod session;
mod staging;

pub use arduino::{ArduinoCliPipeline, ArduinoConfig};
pub use mock::{MockPipeline, MockScript, StagedSnapshot};
pub use session::{DeviceGateway, DeviceSession, SessionEnd};
pub use staging::{Sketch, StagingArea};

use std::fmt;
use std::io;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::ledger::LedgerError;

/// Device output, one line per item. An error item means the link dropped.
pub type MonitorStream = BoxStream<'static, io::Result<String>>;

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Transfer,
    Monitor,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Build => "build",
            Stage::Transfer => "transfer",
            Stage::Monitor => "monitor",
        })
    }
}

/// A stage that did not complete. `detail` is what the toolchain reported.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} failed: {detail}")]
pub struct StageFailure {
    pub stage: Stage,
    pub detail: String,
}

impl StageFailure {
    pub fn new(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            detail: detail.into(),
        }
    }
}

/// Output of a successful build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Compiler diagnostics that did not fail the build.
    pub warnings: String,
}

/// The compile/upload/monitor toolchain for the lab board.
#[async_trait]
pub trait DevicePipeline: Send + Sync {
    async fn build(&self, sketch: &Sketch) -> Result<BuildReport, StageFailure>;

    async fn transfer(&self, sketch: &Sketch) -> Result<(), StageFailure>;

    /// Opens the serial monitor. Dropping the stream closes it.
    async fn monitor(&self) -> Result<MonitorStream, StageFailure>;
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no active slot")]
    EntitlementDenied,

    #[error("failed to stage sketch: {0}")]
    Staging(#[source] io::Error),

    #[error(transparent)]
    Stage(#[from] StageFailure),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Status lines sent to device session clients.
pub mod status {
    pub const UPLOAD_SUCCESSFUL: &str = "Upload successful, monitoring...";
    pub const NO_ACTIVE_SLOT: &str = "Error: no active slot";
    pub const ENTITLEMENT_UNAVAILABLE: &str = "Error: could not verify slot";

    pub fn compilation_failed(detail: &str) -> String {
        format!("Compilation failed: {detail}")
    }

    pub fn upload_failed(detail: &str) -> String {
        format!("Upload failed: {detail}")
    }

    pub fn link_lost(detail: &str) -> String {
        format!("Error: device link lost: {detail}")
    }

    pub fn staging_failed(detail: &str) -> String {
        format!("Error: could not stage code: {detail}")
    }
}
