use tracing::error;

use crate::conversion::stream::events::AnthropicStreamEvent;

/// Frames one event as `event: <type>\ndata: <json>\n\n`.
pub fn encode_event(event: &AnthropicStreamEvent) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|serialize_error| {
        error!(
            phase = "encode_sse_event",
            event_type = event.event_type(),
            error = %serialize_error,
            "Failed to serialize stream event"
        );
        "{}".to_string()
    });
    format!("event: {}\ndata: {data}\n\n", event.event_type())
}
