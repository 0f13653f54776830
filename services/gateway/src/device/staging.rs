//! Per-attempt working directory.

use std::io;
use std::path::{Path, PathBuf};

use slotgate_id::AttemptId;
use tracing::{debug, warn};

/// Extension of staged source files.
const SKETCH_EXTENSION: &str = "ino";

/// Paths of a staged sketch.
///
/// The toolchain requires the source file to be named after its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sketch {
    pub dir: PathBuf,
    pub source: PathBuf,
    pub build_dir: PathBuf,
}

/// Owns `<root>/<attempt_id>/` for the lifetime of one attempt.
///
/// Call [`StagingArea::close`] to remove it and observe errors. If the value
/// is dropped instead (an early return, a cancelled task, a panic), the
/// directory is removed synchronously in `Drop`.
#[derive(Debug)]
pub struct StagingArea {
    attempt_id: AttemptId,
    sketch: Sketch,
    removed: bool,
}

impl StagingArea {
    /// Creates the directory and writes `code` into it.
    pub async fn create(root: &Path, attempt_id: AttemptId, code: &str) -> io::Result<Self> {
        let name = attempt_id.to_string();
        let dir = root.join(&name);
        let sketch = Sketch {
            source: dir.join(format!("{name}.{SKETCH_EXTENSION}")),
            build_dir: dir.join("build"),
            dir,
        };

        tokio::fs::create_dir_all(&sketch.dir).await?;
        // Guard exists from here on, so a failed write still cleans up.
        let area = Self {
            attempt_id,
            sketch,
            removed: false,
        };
        tokio::fs::write(&area.sketch.source, code).await?;

        debug!(attempt_id = %attempt_id, dir = %area.sketch.dir.display(), "Sketch staged");
        Ok(area)
    }

    pub fn sketch(&self) -> &Sketch {
        &self.sketch
    }

    pub fn path(&self) -> &Path {
        &self.sketch.dir
    }

    /// Removes the directory.
    pub async fn close(mut self) -> io::Result<()> {
        self.removed = true;
        match tokio::fs::remove_dir_all(&self.sketch.dir).await {
            Ok(()) => {
                debug!(attempt_id = %self.attempt_id, "Staging area removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_dir_all(&self.sketch.dir) {
            Ok(()) => debug!(attempt_id = %self.attempt_id, "Staging area removed on drop"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                error = %e,
                attempt_id = %self.attempt_id,
                dir = %self.sketch.dir.display(),
                "Failed to remove staging area"
            ),
        }
    }
}
