//! Scripted pipeline for tests and for running without a board.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::info;

use super::{BuildReport, DevicePipeline, MonitorStream, Sketch, Stage, StageFailure};

/// What the mock pipeline does on each call.
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    pub build_error: Option<String>,
    pub build_warnings: String,
    pub transfer_error: Option<String>,
    pub monitor_error: Option<String>,
    /// Lines the monitor emits before anything else happens.
    pub monitor_lines: Vec<String>,
    /// After the lines, report a dropped link with this detail.
    pub link_drop: Option<String>,
    /// After the lines, stay open instead of ending.
    pub hold_open: bool,
}

/// Pipeline that follows a [`MockScript`] and counts calls.
#[derive(Debug)]
pub struct MockPipeline {
    script: MockScript,
    builds: AtomicUsize,
    transfers: AtomicUsize,
    monitors: AtomicUsize,
    staged: Mutex<Vec<StagedSnapshot>>,
}

/// What a build call saw on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSnapshot {
    pub dir: PathBuf,
    pub source: Option<String>,
}

impl MockPipeline {
    pub fn new(script: MockScript) -> Self {
        Self {
            script,
            builds: AtomicUsize::new(0),
            transfers: AtomicUsize::new(0),
            monitors: AtomicUsize::new(0),
            staged: Mutex::new(Vec::new()),
        }
    }

    /// A board that accepts everything and prints a greeting.
    pub fn healthy() -> Self {
        Self::new(MockScript {
            monitor_lines: vec!["[mock] board ready".to_string()],
            hold_open: true,
            ..MockScript::default()
        })
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }

    pub fn monitors(&self) -> usize {
        self.monitors.load(Ordering::SeqCst)
    }

    /// Staging directories seen by `build`, in call order.
    pub fn staged(&self) -> Vec<StagedSnapshot> {
        self.staged
            .lock()
            .map(|staged| staged.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn record(&self, snapshot: StagedSnapshot) {
        match self.staged.lock() {
            Ok(mut staged) => staged.push(snapshot),
            Err(poisoned) => poisoned.into_inner().push(snapshot),
        }
    }
}

impl Default for MockPipeline {
    fn default() -> Self {
        Self::healthy()
    }
}

#[async_trait]
impl DevicePipeline for MockPipeline {
    async fn build(&self, sketch: &Sketch) -> Result<BuildReport, StageFailure> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let source = tokio::fs::read_to_string(&sketch.source).await.ok();
        self.record(StagedSnapshot {
            dir: sketch.dir.clone(),
            source,
        });
        info!(dir = %sketch.dir.display(), "[MOCK] Building sketch");

        match &self.script.build_error {
            Some(detail) => Err(StageFailure::new(Stage::Build, detail.clone())),
            None => Ok(BuildReport {
                warnings: self.script.build_warnings.clone(),
            }),
        }
    }

    async fn transfer(&self, sketch: &Sketch) -> Result<(), StageFailure> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        info!(dir = %sketch.dir.display(), "[MOCK] Uploading sketch");

        match &self.script.transfer_error {
            Some(detail) => Err(StageFailure::new(Stage::Transfer, detail.clone())),
            None => Ok(()),
        }
    }

    async fn monitor(&self) -> Result<MonitorStream, StageFailure> {
        self.monitors.fetch_add(1, Ordering::SeqCst);
        if let Some(detail) = &self.script.monitor_error {
            return Err(StageFailure::new(Stage::Monitor, detail.clone()));
        }

        let lines = stream::iter(self.script.monitor_lines.clone().into_iter().map(Ok));
        let tail = match (&self.script.link_drop, self.script.hold_open) {
            (Some(detail), _) => stream::iter(vec![Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                detail.clone(),
            ))])
            .boxed(),
            (None, true) => stream::pending().boxed(),
            (None, false) => stream::empty().boxed(),
        };

        Ok(lines.chain(tail).boxed())
    }
}
