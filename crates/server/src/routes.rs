use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse,
    },
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Debug, Deserialize)]
pub(crate) struct AskRequest {
    question: String,
}

/// Payload of one SSE `data:` line.
#[derive(Serialize)]
struct Frame<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk: Option<&'a str>,
    done: bool,
}

pub(crate) async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub(crate) async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /ask`: stream the agent's fragments as they are produced.
pub(crate) async fn handle_ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::invalid_request("question must not be empty"));
    }

    tracing::info!("Question received ({} chars)", question.chars().count());
    let rx = state.agent.answer(question);

    let sse = Sse::new(answer_events(rx)).keep_alive(KeepAlive::default());
    Ok(([(header::CACHE_CONTROL, "no-cache")], sse))
}

/// One event per fragment, then a terminal `done` event.
///
/// The receiver lives inside the stream, so dropping the response drops it
/// and the agent stops at its next send.
fn answer_events(
    rx: mpsc::Receiver<String>,
) -> impl Stream<Item = Result<Event, axum::Error>> + Send {
    let fragments = stream::unfold(rx, |mut rx| async move {
        let fragment = rx.recv().await?;
        let event = Event::default().json_data(Frame {
            chunk: Some(&fragment),
            done: false,
        });
        Some((event, rx))
    });

    let done = stream::once(async {
        Event::default().json_data(Frame {
            chunk: None,
            done: true,
        })
    });

    fragments.chain(done)
}
