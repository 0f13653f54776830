//! Probes: `/livez` and `/healthz` answer as long as the process serves
//! requests, `/readyz` also pings the ledger and the identity store.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Degraded,
    Unavailable,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: Status,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
}

impl HealthReport {
    fn new(status: Status, components: Option<Components>) -> Self {
        Self {
            status,
            service: "slotgate",
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now().to_rfc3339(),
            components,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Components {
    pub ledger: Probe,
    pub identity: Probe,
}

impl Components {
    fn all_ok(&self) -> bool {
        [&self.ledger, &self.identity]
            .iter()
            .all(|probe| probe.status == Status::Ok)
    }
}

#[derive(Debug, Serialize)]
pub struct Probe {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<E: std::fmt::Display> From<Result<(), E>> for Probe {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self {
                status: Status::Ok,
                message: None,
            },
            Err(e) => Self {
                status: Status::Unavailable,
                message: Some(e.to_string()),
            },
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/livez", get(livez))
}

async fn healthz() -> Json<HealthReport> {
    Json(HealthReport::new(Status::Ok, None))
}

async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let components = Components {
        ledger: state.ledger().health_check().await.into(),
        identity: state.auth().health_check().await.into(),
    };

    if components.all_ok() {
        (StatusCode::OK, Json(HealthReport::new(Status::Ok, Some(components))))
    } else {
        tracing::warn!(?components, "Readiness probe failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthReport::new(Status::Degraded, Some(components))),
        )
    }
}

async fn livez() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_healthz_has_no_components() {
        let Json(report) = healthz().await;
        assert_eq!(report.status, Status::Ok);
        assert!(report.components.is_none());
    }

    #[test]
    fn test_failed_probe_degrades_readiness() {
        let components = Components {
            ledger: Ok::<(), &str>(()).into(),
            identity: Err("connection refused").into(),
        };
        assert!(!components.all_ok());
        assert_eq!(components.identity.status, Status::Unavailable);
        assert_eq!(
            components.identity.message.as_deref(),
            Some("connection refused")
        );
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_value(HealthReport::new(Status::Degraded, None)).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["service"], "slotgate");
        assert!(json.get("components").is_none());
    }
}
