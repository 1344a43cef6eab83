//! The `/auto_ppt` endpoint: outline generation, deck assembly, and
//! artifact publishing in strict sequence.
//!
//! The response always carries the deck bytes when generation and assembly
//! succeed; the publish outcome is surfaced out-of-band in the
//! `X-Upload-Status` header and never fails the request.

use axum::{
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use deckgen_agent::{GenerateError, OutlineBrief};
use deckgen_pptx::{generation_stamp, DeckError, PPTX_CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::bootstrap::AppState;

pub const UPLOAD_STATUS_HEADER: HeaderName = HeaderName::from_static("x-upload-status");

pub fn router(state: AppState) -> Router {
    Router::new().route("/auto_ppt", get(auto_ppt)).with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct BriefQuery {
    theme: Option<String>,
    audience: Option<String>,
    goal: Option<String>,
}

impl BriefQuery {
    fn into_brief(self) -> OutlineBrief {
        let defaults = OutlineBrief::default();
        OutlineBrief {
            theme: self.theme.unwrap_or(defaults.theme),
            audience: self.audience.unwrap_or(defaults.audience),
            goal: self.goal.unwrap_or(defaults.goal),
        }
    }
}

/// Fatal faults of the primary pipeline. Either stage failing means there
/// is no usable document; a partial deck is never returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("outline generation failed: {0}")]
    Generate(#[from] GenerateError),
    #[error("deck assembly failed: {0}")]
    Assemble(#[from] DeckError),
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        tracing::error!(
            event_name = "server.auto_ppt.failed",
            error = %self,
            "deck pipeline failed"
        );
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "detail": self.to_string() })),
        )
            .into_response()
    }
}

pub async fn auto_ppt(
    State(state): State<AppState>,
    Query(query): Query<BriefQuery>,
) -> Result<Response, PipelineError> {
    let brief = query.into_brief();
    let outline = state.generator.generate(&brief).await?;

    let stamp = generation_stamp(state.timezone_offset_hours);
    let deck = state.builder.assemble(&outline, &stamp)?;
    let filename = deck_filename(&stamp, state.unique_suffix);

    let outcome = state.publisher.publish(&deck, &filename).await;
    tracing::info!(
        event_name = "server.auto_ppt.completed",
        filename = %filename,
        slide_count = outline.len(),
        deck_bytes = deck.len(),
        published = outcome.is_published(),
        "deck request completed"
    );

    let headers = [
        (header::CONTENT_TYPE, PPTX_CONTENT_TYPE.to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        (UPLOAD_STATUS_HEADER, sanitize_header_value(outcome.status_line())),
    ];
    Ok((headers, deck).into_response())
}

/// Timestamped artifact name. The short random token keeps concurrent
/// same-second requests from colliding on one blob path; deployments that
/// need the bare name disable it in config.
fn deck_filename(stamp: &str, unique_suffix: bool) -> String {
    if unique_suffix {
        let token = Uuid::new_v4().simple().to_string();
        format!("{stamp}_{}_auto_docs.pptx", &token[..8])
    } else {
        format!("{stamp}_auto_docs.pptx")
    }
}

/// Header values must stay single-line visible ASCII; upstream failure
/// reasons can contain anything.
fn sanitize_header_value(value: &str) -> String {
    value.chars().map(|c| if (' '..='~').contains(&c) { c } else { ' ' }).collect()
}
