//! Entitlement-gated access to the device pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use slotgate_id::{AttemptId, UserId};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::staging::StagingArea;
use super::{status, BuildReport, DeviceError, DevicePipeline};
use crate::clock::Clock;
use crate::entitlement::EntitlementChecker;
use crate::ledger::Slot;

/// Entry point to the board.
#[derive(Clone)]
pub struct DeviceGateway {
    pipeline: Arc<dyn DevicePipeline>,
    entitlement: EntitlementChecker,
    clock: Arc<dyn Clock>,
    staging_root: PathBuf,
}

impl DeviceGateway {
    pub fn new(
        pipeline: Arc<dyn DevicePipeline>,
        entitlement: EntitlementChecker,
        clock: Arc<dyn Clock>,
        staging_root: PathBuf,
    ) -> Self {
        Self {
            pipeline,
            entitlement,
            clock,
            staging_root,
        }
    }

    pub fn staging_root(&self) -> &PathBuf {
        &self.staging_root
    }

    /// Returns the slot that entitles `user_id` right now.
    pub async fn authorize(&self, user_id: UserId) -> Result<Slot, DeviceError> {
        self.entitlement
            .active_slot(user_id, self.clock.now())
            .await?
            .ok_or(DeviceError::EntitlementDenied)
    }

    /// Stages and builds `code` without touching the board.
    pub async fn compile_once(
        &self,
        user_id: UserId,
        code: &str,
    ) -> Result<BuildReport, DeviceError> {
        self.authorize(user_id).await?;

        let attempt_id = AttemptId::new();
        let staging = StagingArea::create(&self.staging_root, attempt_id, code)
            .await
            .map_err(DeviceError::Staging)?;

        let result = self.pipeline.build(staging.sketch()).await;
        close_staging(staging, attempt_id).await;

        debug!(
            attempt_id = %attempt_id,
            user_id = %user_id,
            ok = result.is_ok(),
            "One-shot build finished"
        );
        Ok(result?)
    }

    /// Starts a long-lived session for `user_id`.
    pub fn session(&self, user_id: UserId) -> DeviceSession {
        DeviceSession {
            gateway: self.clone(),
            user_id,
        }
    }
}

/// Why a device session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client went away.
    Disconnected,
    /// The user's slot was no longer active when code arrived.
    Denied,
}

enum Attempt {
    /// Ready for the next payload.
    Done,
    /// A new payload arrived while monitoring.
    Superseded(String),
    Disconnected,
    Denied,
}

/// One client's device session.
///
/// Each inbound item is a code payload. Status lines and device output are
/// written to the outbound channel.
pub struct DeviceSession {
    gateway: DeviceGateway,
    user_id: UserId,
}

impl DeviceSession {
    pub async fn run<I>(self, mut inbound: I, outbound: mpsc::Sender<String>) -> SessionEnd
    where
        I: Stream<Item = String> + Unpin + Send,
    {
        let mut pending: Option<String> = None;
        loop {
            let code = match pending.take() {
                Some(code) => code,
                None => match inbound.next().await {
                    Some(code) => code,
                    None => return SessionEnd::Disconnected,
                },
            };

            match self.attempt(code, &mut inbound, &outbound).await {
                Attempt::Done => {}
                Attempt::Superseded(code) => pending = Some(code),
                Attempt::Disconnected => return SessionEnd::Disconnected,
                Attempt::Denied => return SessionEnd::Denied,
            }
        }
    }

    async fn attempt<I>(
        &self,
        code: String,
        inbound: &mut I,
        outbound: &mpsc::Sender<String>,
    ) -> Attempt
    where
        I: Stream<Item = String> + Unpin + Send,
    {
        let gateway = &self.gateway;
        let attempt_id = AttemptId::new();

        match gateway.authorize(self.user_id).await {
            Ok(_) => {}
            Err(DeviceError::EntitlementDenied) => {
                info!(
                    attempt_id = %attempt_id,
                    user_id = %self.user_id,
                    "Device access denied: no active slot"
                );
                let _ = outbound.send(status::NO_ACTIVE_SLOT.to_string()).await;
                return Attempt::Denied;
            }
            Err(e) => {
                error!(
                    error = %e,
                    attempt_id = %attempt_id,
                    user_id = %self.user_id,
                    "Entitlement check failed"
                );
                let _ = outbound.send(status::ENTITLEMENT_UNAVAILABLE.to_string()).await;
                return Attempt::Denied;
            }
        }

        let staging = match StagingArea::create(&gateway.staging_root, attempt_id, &code).await {
            Ok(staging) => staging,
            Err(e) => {
                error!(error = %e, attempt_id = %attempt_id, "Failed to stage code");
                return say(outbound, status::staging_failed(&e.to_string())).await;
            }
        };

        if let Err(failure) = gateway.pipeline.build(staging.sketch()).await {
            debug!(attempt_id = %attempt_id, detail = %failure.detail, "Build failed");
            close_staging(staging, attempt_id).await;
            return say(outbound, status::compilation_failed(&failure.detail)).await;
        }

        if let Err(failure) = gateway.pipeline.transfer(staging.sketch()).await {
            debug!(attempt_id = %attempt_id, detail = %failure.detail, "Upload failed");
            close_staging(staging, attempt_id).await;
            return say(outbound, status::upload_failed(&failure.detail)).await;
        }

        if outbound.send(status::UPLOAD_SUCCESSFUL.to_string()).await.is_err() {
            return Attempt::Disconnected;
        }

        let mut monitor = match gateway.pipeline.monitor().await {
            Ok(monitor) => monitor,
            Err(failure) => {
                close_staging(staging, attempt_id).await;
                return say(outbound, status::link_lost(&failure.detail)).await;
            }
        };

        info!(attempt_id = %attempt_id, user_id = %self.user_id, "Monitoring device");
        let outcome = loop {
            tokio::select! {
                payload = inbound.next() => match payload {
                    Some(code) => break Attempt::Superseded(code),
                    None => break Attempt::Disconnected,
                },
                line = monitor.next() => match line {
                    Some(Ok(line)) => {
                        if outbound.send(line).await.is_err() {
                            break Attempt::Disconnected;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, attempt_id = %attempt_id, "Device link lost");
                        break say(outbound, status::link_lost(&e.to_string())).await;
                    }
                    None => {
                        warn!(attempt_id = %attempt_id, "Device monitor ended");
                        break say(outbound, status::link_lost("monitor output closed")).await;
                    }
                },
            }
        };

        // Stop the monitor before its working directory goes away.
        drop(monitor);
        close_staging(staging, attempt_id).await;
        outcome
    }
}

/// Sends a status line, reporting whether the client is still there.
async fn say(outbound: &mpsc::Sender<String>, line: String) -> Attempt {
    if outbound.send(line).await.is_err() {
        Attempt::Disconnected
    } else {
        Attempt::Done
    }
}

async fn close_staging(staging: StagingArea, attempt_id: AttemptId) {
    if let Err(e) = staging.close().await {
        warn!(error = %e, attempt_id = %attempt_id, "Failed to remove staging area");
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration as StdDuration;

    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use tokio_stream::wrappers::ReceiverStream;

    use super::*;
    use crate::clock::FixedClock;
    use crate::device::{MockPipeline, MockScript};
    use crate::ledger::{MemoryLedger, SlotLedger, SlotOwner, SlotPeriod, SlotTime};

    struct Fixture {
        gateway: DeviceGateway,
        pipeline: Arc<MockPipeline>,
        clock: Arc<FixedClock>,
        user_id: UserId,
        slot_start: NaiveDateTime,
        _root: tempfile::TempDir,
    }

    async fn fixture(script: MockScript) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let user_id = UserId::new();
        let slot_time =
            SlotTime::on_day(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(), "14:00").unwrap();
        ledger
            .create(
                &SlotOwner {
                    user_id,
                    username: "ada".to_string(),
                },
                slot_time,
                SlotPeriod::Pm,
            )
            .await
            .unwrap();

        let clock = Arc::new(FixedClock::new(slot_time.starts_at() + Duration::minutes(5)));
        let pipeline = Arc::new(MockPipeline::new(script));
        let gateway = DeviceGateway::new(
            pipeline.clone(),
            EntitlementChecker::new(ledger),
            clock.clone(),
            root.path().to_path_buf(),
        );

        Fixture {
            gateway,
            pipeline,
            clock,
            user_id,
            slot_start: slot_time.starts_at(),
            _root: root,
        }
    }

    fn is_empty_dir(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    /// Drives a session with `payloads`, waits for `expected` output lines,
    /// then disconnects and collects whatever else was written.
    async fn run_with(
        fixture: &Fixture,
        payloads: &[&str],
        expected: usize,
    ) -> (SessionEnd, Vec<String>) {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let task = tokio::spawn(
            fixture
                .gateway
                .session(fixture.user_id)
                .run(ReceiverStream::new(in_rx), out_tx),
        );
        for payload in payloads {
            in_tx.send(payload.to_string()).await.unwrap();
        }

        let mut lines = Vec::new();
        while lines.len() < expected {
            match tokio::time::timeout(StdDuration::from_secs(5), out_rx.recv())
                .await
                .unwrap()
            {
                Some(line) => lines.push(line),
                None => break,
            }
        }

        drop(in_tx);
        let end = tokio::time::timeout(StdDuration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        while let Ok(line) = out_rx.try_recv() {
            lines.push(line);
        }
        (end, lines)
    }

    #[tokio::test]
    async fn test_build_failure_skips_transfer_and_cleans_up() {
        let fixture = fixture(MockScript {
            build_error: Some("expected ';' before '}' token".to_string()),
            ..MockScript::default()
        })
        .await;

        let (end, lines) = run_with(&fixture, &["void loop() {"], 1).await;

        assert_eq!(end, SessionEnd::Disconnected);
        assert_eq!(lines, ["Compilation failed: expected ';' before '}' token"]);
        assert_eq!(fixture.pipeline.builds(), 1);
        assert_eq!(fixture.pipeline.transfers(), 0);
        assert_eq!(fixture.pipeline.monitors(), 0);

        let staged = fixture.pipeline.staged();
        assert_eq!(staged[0].source.as_deref(), Some("void loop() {"));
        assert!(!staged[0].dir.exists());
        assert!(is_empty_dir(fixture.gateway.staging_root()));
    }

    #[tokio::test]
    async fn test_upload_failure_skips_monitor() {
        let fixture = fixture(MockScript {
            transfer_error: Some("no device found on /dev/ttyUSB0".to_string()),
            ..MockScript::default()
        })
        .await;

        let (_, lines) = run_with(&fixture, &["code"], 1).await;

        assert_eq!(lines, ["Upload failed: no device found on /dev/ttyUSB0"]);
        assert_eq!(fixture.pipeline.monitors(), 0);
        assert!(is_empty_dir(fixture.gateway.staging_root()));
    }

    #[tokio::test]
    async fn test_success_relays_output_until_link_drop() {
        let fixture = fixture(MockScript {
            monitor_lines: vec!["tick 1".to_string(), "tick 2".to_string()],
            link_drop: Some("port vanished".to_string()),
            ..MockScript::default()
        })
        .await;

        let (_, lines) = run_with(&fixture, &["code"], 4).await;

        assert_eq!(
            lines,
            [
                "Upload successful, monitoring...",
                "tick 1",
                "tick 2",
                "Error: device link lost: port vanished"
            ]
        );
        assert!(is_empty_dir(fixture.gateway.staging_root()));
    }

    #[tokio::test]
    async fn test_session_continues_after_failed_attempt() {
        let fixture = fixture(MockScript {
            build_error: Some("bad".to_string()),
            ..MockScript::default()
        })
        .await;

        let (end, lines) = run_with(&fixture, &["one", "two"], 2).await;
        assert_eq!(end, SessionEnd::Disconnected);
        assert_eq!(lines.len(), 2);
        assert_eq!(fixture.pipeline.builds(), 2);
    }

    #[tokio::test]
    async fn test_expired_slot_ends_session() {
        let fixture = fixture(MockScript::default()).await;
        fixture
            .clock
            .set(fixture.slot_start + Duration::minutes(30) + Duration::nanoseconds(1));

        let (end, lines) = run_with(&fixture, &["code", "more code"], 1).await;

        assert_eq!(end, SessionEnd::Denied);
        assert_eq!(lines, ["Error: no active slot"]);
        assert_eq!(fixture.pipeline.builds(), 0);
    }

    #[tokio::test]
    async fn test_new_payload_replaces_monitoring_attempt() {
        let fixture = fixture(MockScript {
            hold_open: true,
            ..MockScript::default()
        })
        .await;

        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let session = fixture.gateway.session(fixture.user_id);
        let task = tokio::spawn(session.run(ReceiverStream::new(in_rx), out_tx));

        in_tx.send("first".to_string()).await.unwrap();
        assert_eq!(out_rx.recv().await.unwrap(), "Upload successful, monitoring...");

        in_tx.send("second".to_string()).await.unwrap();
        assert_eq!(out_rx.recv().await.unwrap(), "Upload successful, monitoring...");
        assert_eq!(fixture.pipeline.builds(), 2);

        // Only the second attempt's directory remains while it is monitoring.
        let staged = fixture.pipeline.staged();
        assert!(!staged[0].dir.exists());
        assert!(staged[1].dir.exists());

        drop(in_tx);
        let end = tokio::time::timeout(StdDuration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(end, SessionEnd::Disconnected);
        assert!(is_empty_dir(fixture.gateway.staging_root()));
    }

    #[tokio::test]
    async fn test_aborted_session_removes_staging_area() {
        let fixture = fixture(MockScript {
            hold_open: true,
            ..MockScript::default()
        })
        .await;

        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let task = tokio::spawn(
            fixture
                .gateway
                .session(fixture.user_id)
                .run(ReceiverStream::new(in_rx), out_tx),
        );

        in_tx.send("code".to_string()).await.unwrap();
        assert_eq!(out_rx.recv().await.unwrap(), "Upload successful, monitoring...");
        assert!(!is_empty_dir(fixture.gateway.staging_root()));

        task.abort();
        let _ = task.await;
        assert!(is_empty_dir(fixture.gateway.staging_root()));
    }

    #[tokio::test]
    async fn test_compile_once() {
        let fixture = fixture(MockScript {
            build_warnings: "unused variable 'x'".to_string(),
            ..MockScript::default()
        })
        .await;

        let report = fixture
            .gateway
            .compile_once(fixture.user_id, "code")
            .await
            .unwrap();
        assert_eq!(report.warnings, "unused variable 'x'");
        assert_eq!(fixture.pipeline.transfers(), 0);
        assert!(is_empty_dir(fixture.gateway.staging_root()));

        let err = fixture
            .gateway
            .compile_once(UserId::new(), "code")
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::EntitlementDenied));
    }
}
