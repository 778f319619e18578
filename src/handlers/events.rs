use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use chrono::NaiveDate;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

use crate::services::lifecycle::BookingEvent;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct EventsQuery {
    pub date: Option<NaiveDate>,
}

fn to_sse(event: &BookingEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default().data(data).event("booking")
}

// GET /api/events?date=YYYY-MM-DD
pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.bookings.subscribe();
    let date = query.date;

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if date.map_or(true, |d| d == event.date) => {
            Some(Ok::<_, Infallible>(to_sse(&event)))
        }
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "booking event subscriber lagged");
            None
        }
    });

    let keepalive_stream = tokio_stream::StreamExt::map(
        IntervalStream::new(tokio::time::interval(Duration::from_secs(30))),
        |_| Ok(Event::default().comment("keepalive")),
    );

    Sse::new(StreamExt::merge(live_stream, keepalive_stream))
}
