//! Server-Sent Events for live updates

use axum::response::sse::{Event, KeepAlive, Sse};
use consultboard_core::{DataEvent, EventBus};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// JSON payload sent along with the event name
fn event_data(event: &DataEvent) -> Value {
    match event {
        DataEvent::DatasetReloaded(table) => json!({ "table": table }),
        DataEvent::TimesheetSaved(consultant, month) => {
            json!({ "consultant": consultant, "month": month })
        }
        DataEvent::StaffingUpdated(id) | DataEvent::MissionUpdated(id) => json!({ "mission": id }),
        DataEvent::BillUpdated(id) | DataEvent::ExpenseUpdated(id) => json!({ "id": id }),
        DataEvent::LoadCompleted => json!({}),
        DataEvent::WatcherError(message) => json!({ "message": message }),
    }
}

/// Create an SSE stream from the event bus
///
/// Lagging subscribers skip the events they missed.
pub fn create_sse_stream(event_bus: &EventBus) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(event_bus.subscribe());

    let sse_stream = stream.filter_map(|result| {
        result.ok().map(|event: DataEvent| {
            Ok(Event::default()
                .event(event.name())
                .data(event_data(&event).to_string()))
        })
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
