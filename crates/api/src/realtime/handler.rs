//! NDJSON stream endpoints
//!
//! Both endpoints authenticate via the `token` query parameter instead of the
//! auth middleware. A stream starts with a `ready` frame, then carries one
//! event per line plus a `heartbeat` frame every configured interval, on a
//! fixed period that events do not reset. It ends when the client
//! disconnects or the hub evicts the subscriber.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use futures::stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

use super::{Audience, ChannelSink, Scope, StreamEvent, Subscription};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    token: String,
}

/// Staff-wide feed of every conversation event
pub async fn staff_stream(
    State(state): State<AppState>,
    Query(params): Query<StreamQuery>,
) -> ApiResult<Response> {
    let user = state.auth_state().authenticate(&params.token)?;
    if !user.role.is_staff() {
        return Err(ApiError::Forbidden("Staff role required".into()));
    }

    tracing::info!(user_id = %user.user_id, "Staff stream opened");
    Ok(open_stream(&state, Scope::Staff, Audience::Staff))
}

/// Feed of a single conversation, for its customer or any staff member
pub async fn conversation_stream(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<StreamQuery>,
) -> ApiResult<Response> {
    let user = state.auth_state().authenticate(&params.token)?;
    let actor = user.actor();
    state
        .engine
        .authorize_subscription(&actor, conversation_id)
        .await?;

    tracing::info!(
        user_id = %user.user_id,
        conversation_id = %conversation_id,
        "Conversation stream opened"
    );
    Ok(open_stream(
        &state,
        Scope::Conversation(conversation_id),
        Audience::for_staff(actor.is_staff()),
    ))
}

struct StreamState {
    events: mpsc::Receiver<StreamEvent>,
    heartbeat: Interval,
    // Dropping the stream drops this, which unregisters the subscriber
    _subscription: Subscription,
}

fn open_stream(state: &AppState, scope: Scope, audience: Audience) -> Response {
    let (sink, events) = ChannelSink::channel(state.config.stream_buffer);
    let subscription = state.hub.subscribe(scope, audience, Arc::new(sink));

    let period = state.config.heartbeat_interval();
    let mut heartbeat = interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let frames = stream::unfold(
        StreamState {
            events,
            heartbeat,
            _subscription: subscription,
        },
        |mut s| async move {
            let event = tokio::select! {
                biased;
                event = s.events.recv() => match event {
                    Some(event) => event,
                    // Sender dropped: the hub evicted this subscriber
                    None => return None,
                },
                _ = s.heartbeat.tick() => StreamEvent::Heartbeat,
            };
            Some((Ok::<_, Infallible>(event.to_ndjson_line()), s))
        },
    );

    (
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}
