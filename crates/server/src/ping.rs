use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use deckgen_agent::{ChatMessage, ChatRequest};
use serde_json::{json, Value};

use crate::bootstrap::AppState;

pub fn router(state: AppState) -> Router {
    Router::new().route("/ping", get(ping)).with_state(state)
}

/// Liveness check against the generation endpoint itself.
///
/// One attempt, no retry: wrapping this in the backoff budget would mask
/// exactly the flakiness it exists to observe. Failures are captured in
/// full, with the error source chain, instead of propagating.
pub async fn ping(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let request = ChatRequest::new(vec![ChatMessage::user("Reply with a one-word greeting.")])
        .with_max_completion_tokens(16);

    match state.chat.complete(&request).await {
        Ok(answer) => {
            (StatusCode::OK, Json(json!({ "status": "success", "answer": answer.trim() })))
        }
        Err(error) => {
            tracing::error!(
                event_name = "server.ping.failed",
                error = %error,
                "generation endpoint liveness check failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "detail": error.to_string(),
                    "trace": error_trace(&error),
                })),
            )
        }
    }
}

fn error_trace(error: &dyn std::error::Error) -> Vec<String> {
    let mut chain = vec![format!("{error:?}")];
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}
