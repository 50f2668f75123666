use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{Stream, StreamExt, stream};
use tracing::{error, warn};

use crate::constants::SSE_DONE_SENTINEL;
use crate::errors::UpstreamError;

/// One server-sent event read from an upstream body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    pub fn is_done(&self) -> bool {
        self.data.trim() == SSE_DONE_SENTINEL
    }

    /// Re-encodes the event for relaying to an OpenAI-protocol client.
    pub fn to_frame(&self) -> String {
        let mut frame = String::new();
        if let Some(event) = &self.event {
            frame.push_str("event: ");
            frame.push_str(event);
            frame.push('\n');
        }
        for line in self.data.split('\n') {
            frame.push_str("data: ");
            frame.push_str(line);
            frame.push('\n');
        }
        frame.push('\n');
        frame
    }
}

pub type UpstreamEventStream = Pin<Box<dyn Stream<Item = Result<SseEvent, UpstreamError>> + Send>>;

/// Incremental line decoder. Bytes are buffered until a full line is
/// available so multi-byte characters split across reads stay intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.handle_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(event) = self.handle_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn handle_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event, data })
    }
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    finished: bool,
}

/// Wraps an upstream byte stream. Ends after the `[DONE]` sentinel (which is
/// yielded) or when the body closes; a read error is yielded once and ends
/// the stream.
pub fn event_stream<S, B>(body: S) -> UpstreamEventStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                if event.is_done() {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.push(bytes.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(read_error)) => {
                    state.finished = true;
                    return Some((Err(classify_read_error(&read_error)), state));
                }
                None => {
                    state.finished = true;
                    if let Some(event) = state.decoder.finish() {
                        state.pending.push_back(event);
                    }
                }
            }
        }
    })
    .boxed()
}

fn classify_read_error(read_error: &reqwest::Error) -> UpstreamError {
    if read_error.is_timeout() {
        warn!(
            phase = "upstream_stream_timeout",
            "Upstream stream read timed out: {read_error}"
        );
        return UpstreamError::timeout(format!("upstream stream timed out: {read_error}"));
    }

    error!(
        phase = "upstream_stream_read_failed",
        "Failed to read upstream stream: {read_error}"
    );
    UpstreamError::bad_gateway(format!("failed to read upstream stream: {read_error}"))
}

#[cfg(test)]
mod tests {
    use futures_util::{StreamExt, stream};

    use super::{SseDecoder, SseEvent, event_stream};

    fn data(text: &str) -> SseEvent {
        SseEvent {
            event: None,
            data: text.to_string(),
        }
    }

    #[test]
    fn decodes_events_split_across_reads() {
        let mut decoder = SseDecoder::default();

        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let events = decoder.push(b"1}\r\n\r\n: comment\n\nevent: ping\ndata: x\n\n");

        assert_eq!(
            events,
            vec![
                data("{\"a\":1}"),
                SseEvent {
                    event: Some("ping".to_string()),
                    data: "x".to_string()
                },
            ]
        );
    }

    #[test]
    fn keeps_multibyte_characters_across_reads() {
        let mut decoder = SseDecoder::default();
        let bytes = "data: héllo\n\n".as_bytes();

        assert!(decoder.push(&bytes[..8]).is_empty());
        assert_eq!(decoder.push(&bytes[8..]), vec![data("héllo")]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), Some(data("tail")));
    }

    #[test]
    fn relay_frame_round_trips_multiline_data() {
        let event = data("line1\nline2");
        assert_eq!(event.to_frame(), "data: line1\ndata: line2\n\n");
    }

    #[tokio::test]
    async fn stream_ends_after_done_sentinel() {
        let body = stream::iter(vec![
            Ok::<_, reqwest::Error>(b"data: one\n\ndata: [DONE]\n\ndata: ignored\n\n".to_vec()),
        ]);

        let events: Vec<_> = event_stream(body)
            .map(|item| item.expect("no read error"))
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], data("one"));
        assert!(events[1].is_done());
    }
}
