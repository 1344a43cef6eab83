use std::path::PathBuf;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    pub template_path: PathBuf,
    pub storage_configured: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub template: HealthCheck,
    pub storage: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Liveness without external calls; `/ping` covers the generation
/// endpoint. A missing connection string only degrades the report since
/// uploads are advisory, so the status code stays 200.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let template = if state.template_path.exists() {
        HealthCheck {
            status: "ready",
            detail: format!("template found at {}", state.template_path.display()),
        }
    } else {
        HealthCheck {
            status: "ready",
            detail: format!(
                "no template at {}, decks use the blank scaffold",
                state.template_path.display()
            ),
        }
    };

    let storage = if state.storage_configured {
        HealthCheck { status: "ready", detail: "storage connection configured".to_string() }
    } else {
        HealthCheck {
            status: "degraded",
            detail: "no storage connection string, uploads will report failure".to_string(),
        }
    };

    let ready = storage.status == "ready";
    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "deckgen-server runtime initialized".to_string(),
        },
        template,
        storage,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use std::path::PathBuf;

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_reports_ready_with_storage_configured() {
        let (status, Json(payload)) = health(State(HealthState {
            template_path: PathBuf::from("does/not/exist.pptx"),
            storage_configured: true,
        }))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.service.status, "ready");
        assert_eq!(payload.storage.status, "ready");
        assert!(payload.template.detail.contains("blank scaffold"));
    }

    #[tokio::test]
    async fn health_degrades_without_storage_but_stays_200() {
        let (status, Json(payload)) = health(State(HealthState {
            template_path: PathBuf::from("does/not/exist.pptx"),
            storage_configured: false,
        }))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.storage.status, "degraded");
    }
}
