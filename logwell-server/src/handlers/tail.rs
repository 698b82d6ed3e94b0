use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use logwell_core::TailEvent;
use logwell_model::LogFilter;

use crate::errors::AppResult;
use crate::handlers::logs::parse_level;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TailQuery {
    pub container: Option<String>,
    pub level: Option<String>,
}

/// Server-sent events stream of newly committed entries.
///
/// Events: `log` (JSON body; `{"lagged":true}` after a queue overflow),
/// `heartbeat` (idle keep-alive), `close` (wall-clock limit, client gone,
/// or shutdown).
pub async fn tail_logs(
    State(state): State<AppState>,
    Query(params): Query<TailQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, anyhow::Error>>>> {
    let filter = LogFilter {
        container: params.container,
        level: parse_level(params.level.as_deref())?,
        ..Default::default()
    };

    let mut subscription = state.broker.subscribe(filter)?;
    let mut shutdown = state.shutdown.clone();
    let session_limit = state.config.tail_session_limit;
    let heartbeat_period = state.config.tail_heartbeat;
    debug!("tail subscription opened");

    let stream = async_stream::stream! {
        let deadline = tokio::time::sleep(session_limit);
        tokio::pin!(deadline);
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + heartbeat_period,
            heartbeat_period,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    yield Ok(Event::default().event("close").data(""));
                    break;
                }
                _ = shutdown.changed() => {
                    yield Ok(Event::default().event("close").data(""));
                    break;
                }
                _ = heartbeat.tick() => {
                    yield Ok(Event::default().event("heartbeat").data(""));
                }
                event = subscription.recv() => match event {
                    Some(TailEvent::Entry(entry)) => {
                        heartbeat.reset();
                        match serde_json::to_string(entry.as_ref()) {
                            Ok(payload) => yield Ok(
                                Event::default()
                                    .event("log")
                                    .id(entry.id.to_string())
                                    .data(payload)
                            ),
                            Err(err) => {
                                yield Err(err.into());
                                break;
                            }
                        }
                    }
                    Some(TailEvent::Lagged) => {
                        yield Ok(Event::default().event("log").data(r#"{"lagged":true}"#));
                    }
                    None => {
                        yield Ok(Event::default().event("close").data(""));
                        break;
                    }
                }
            }
        }
        debug!("tail subscription closed");
    };

    Ok(Sse::new(stream))
}
