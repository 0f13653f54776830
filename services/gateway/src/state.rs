//! Application state shared across request handlers.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;

use crate::auth::{Authenticator, IdentityStore};
use crate::channel::LiveChannel;
use crate::clock::Clock;
use crate::device::{DeviceGateway, DevicePipeline};
use crate::entitlement::EntitlementChecker;
use crate::ledger::SlotLedger;

/// Tunables that do not come from a backend.
#[derive(Debug, Clone)]
pub struct StateOptions {
    pub token_lifetime: Duration,
    pub staging_root: PathBuf,
    /// Allowed CORS origin; `None` allows any.
    pub cors_origin: Option<String>,
}

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    ledger: Arc<dyn SlotLedger>,
    auth: Authenticator,
    entitlement: EntitlementChecker,
    live: LiveChannel,
    device: DeviceGateway,
    clock: Arc<dyn Clock>,
    cors_origin: Option<String>,
}

impl AppState {
    /// Wires the services together over the given backends.
    pub fn new(
        ledger: Arc<dyn SlotLedger>,
        identities: Arc<dyn IdentityStore>,
        pipeline: Arc<dyn DevicePipeline>,
        clock: Arc<dyn Clock>,
        options: StateOptions,
    ) -> Self {
        let entitlement = EntitlementChecker::new(ledger.clone());
        let device = DeviceGateway::new(
            pipeline,
            entitlement.clone(),
            clock.clone(),
            options.staging_root,
        );

        Self {
            inner: Arc::new(AppStateInner {
                auth: Authenticator::new(identities, options.token_lifetime),
                live: LiveChannel::new(ledger.clone(), clock.clone()),
                ledger,
                entitlement,
                device,
                clock,
                cors_origin: options.cors_origin,
            }),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn SlotLedger> {
        &self.inner.ledger
    }

    pub fn auth(&self) -> &Authenticator {
        &self.inner.auth
    }

    pub fn entitlement(&self) -> &EntitlementChecker {
        &self.inner.entitlement
    }

    pub fn live(&self) -> &LiveChannel {
        &self.inner.live
    }

    pub fn device(&self) -> &DeviceGateway {
        &self.inner.device
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn cors_origin(&self) -> Option<&str> {
        self.inner.cors_origin.as_deref()
    }
}
