use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::{self, Stream};

use super::json_body;
use crate::core::errors::ApiError;
use crate::rag::{AnswerEvent, AskRequest};
use crate::state::AppState;

pub const STREAM_END_MARKER: &str = "[DONE]";

pub async fn ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload)?;
    Ok(Json(state.pipeline.ask(&request).await))
}

/// `data: <text>` per increment, then `data: [DONE]`.
///
/// Dropping the response (client disconnect) drops the receiver, which
/// cancels the provider call upstream.
pub async fn ask_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request = json_body(payload)?;
    let events = state.pipeline.clone().ask_stream(request);

    let stream = stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        let sse = match event {
            AnswerEvent::Chunk(text) | AnswerEvent::Fallback(text) => {
                Event::default().data(text.replace('\r', ""))
            }
            AnswerEvent::Done => Event::default().data(STREAM_END_MARKER),
        };
        Some((Ok(sse), events))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
