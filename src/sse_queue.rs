use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use salvo::http::body::BodySender;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, trace};

use crate::constants::SSE_KEEPALIVE_FRAME;
use crate::conversion::stream::{AnthropicStreamEvent, encode_event};

/// Destination of SSE frames. A failed write means the client went away.
pub trait SseSink: Send + 'static {
    fn write(&mut self, frame: String) -> impl Future<Output = io::Result<()>> + Send;

    /// True once the client has gone, even if nothing has been written since.
    fn is_closed(&self) -> bool {
        false
    }
}

impl SseSink for BodySender {
    async fn write(&mut self, frame: String) -> io::Result<()> {
        self.send_data(frame).await
    }

    fn is_closed(&self) -> bool {
        BodySender::is_closed(self)
    }
}

/// How often an idle flusher looks for a disconnected client.
const CLIENT_CHECK_PERIOD: Duration = Duration::from_secs(1);

struct QueuedFrame {
    frame: String,
    written: oneshot::Sender<()>,
}

/// Serialized writer for one SSE response. A single flusher task owns the
/// sink, so event frames and keepalive pings never interleave.
pub struct SseWriteQueue {
    frames: mpsc::UnboundedSender<QueuedFrame>,
    stopped: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    stopped_signal: Arc<Notify>,
}

impl SseWriteQueue {
    /// Spawns the flusher. `keepalive` of `None` disables pings.
    pub fn new<S: SseSink>(sink: S, keepalive: Option<Duration>) -> Self {
        let (frames, receiver) = mpsc::unbounded_channel();
        let stopped = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());
        let stopped_signal = Arc::new(Notify::new());

        tokio::spawn(run_flusher(
            sink,
            receiver,
            keepalive.filter(|period| !period.is_zero()),
            stopped.clone(),
            shutdown.clone(),
            stopped_signal.clone(),
        ));

        Self {
            frames,
            stopped,
            shutdown,
            stopped_signal,
        }
    }

    pub async fn send_event(&self, event: &AnthropicStreamEvent) {
        self.send_raw(encode_event(event)).await;
    }

    /// Resolves once the frame has been written, or immediately when the
    /// queue is stopped. Never fails.
    pub async fn send_raw(&self, frame: String) {
        if self.is_stopped() {
            return;
        }

        let (written, done) = oneshot::channel();
        if self.frames.send(QueuedFrame { frame, written }).is_err() {
            return;
        }
        let _ = done.await;
    }

    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.shutdown.notify_one();
            self.stopped_signal.notify_waiters();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once the queue is stopped, by `stop()` or by a client abort.
    pub async fn stopped(&self) {
        loop {
            let notified = self.stopped_signal.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for SseWriteQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_flusher<S: SseSink>(
    mut sink: S,
    mut receiver: mpsc::UnboundedReceiver<QueuedFrame>,
    keepalive: Option<Duration>,
    stopped: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    stopped_signal: Arc<Notify>,
) {
    let mut ticker = keepalive.map(delayed_interval);
    let mut client_check = delayed_interval(CLIENT_CHECK_PERIOD);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            queued = receiver.recv() => {
                let Some(QueuedFrame { frame, written }) = queued else {
                    break;
                };
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                let result = sink.write(frame).await;
                if let Err(error) = result {
                    debug!(
                        phase = "sse_write",
                        error = %error,
                        "Client disconnected, stopping SSE writer"
                    );
                    stopped.store(true, Ordering::SeqCst);
                    let _ = written.send(());
                    break;
                }
                let _ = written.send(());
            }
            _ = client_check.tick() => {
                if sink.is_closed() {
                    debug!(phase = "sse_client_check", "Client disconnected, stopping SSE writer");
                    break;
                }
            }
            _ = next_tick(&mut ticker) => {
                trace!(phase = "sse_keepalive", "Sending SSE keepalive");
                if let Err(error) = sink.write(SSE_KEEPALIVE_FRAME.to_string()).await {
                    debug!(
                        phase = "sse_keepalive",
                        error = %error,
                        "Client disconnected during keepalive"
                    );
                    break;
                }
            }
        }
    }

    stopped.store(true, Ordering::SeqCst);
    stopped_signal.notify_waiters();
    receiver.close();
}

fn delayed_interval(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::{SseSink, SseWriteQueue};
    use crate::conversion::stream::AnthropicStreamEvent;

    #[derive(Clone, Default)]
    struct RecordingSink {
        frames: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingSink {
        fn frames(&self) -> Vec<String> {
            self.frames.lock().expect("lock").clone()
        }
    }

    impl SseSink for RecordingSink {
        async fn write(&mut self, frame: String) -> io::Result<()> {
            self.frames.lock().expect("lock").push(frame);
            Ok(())
        }
    }

    struct ClosedSink;

    impl SseSink for ClosedSink {
        async fn write(&mut self, _frame: String) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "client gone"))
        }
    }

    #[tokio::test]
    async fn writes_frames_in_submission_order() {
        let sink = RecordingSink::default();
        let queue = SseWriteQueue::new(sink.clone(), None);

        queue.send_raw("a".to_string()).await;
        queue.send_event(&AnthropicStreamEvent::MessageStop).await;
        queue.send_raw("c".to_string()).await;

        assert_eq!(
            sink.frames(),
            vec![
                "a".to_string(),
                "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n".to_string(),
                "c".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn writes_after_stop_are_dropped_silently() {
        let sink = RecordingSink::default();
        let queue = SseWriteQueue::new(sink.clone(), None);

        queue.send_raw("before".to_string()).await;
        queue.stop();
        queue.stop();
        queue.send_raw("after".to_string()).await;

        assert!(queue.is_stopped());
        assert_eq!(sink.frames(), vec!["before".to_string()]);
    }

    #[tokio::test]
    async fn failed_write_stops_the_queue() {
        let queue = SseWriteQueue::new(ClosedSink, None);

        queue.send_raw("lost".to_string()).await;
        tokio::task::yield_now().await;

        assert!(queue.is_stopped());
        queue.send_raw("ignored".to_string()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_pings_fall_between_whole_frames() {
        let sink = RecordingSink::default();
        let queue = SseWriteQueue::new(sink.clone(), Some(Duration::from_secs(10)));

        queue.send_event(&AnthropicStreamEvent::MessageStop).await;
        tokio::time::sleep(Duration::from_secs(25)).await;
        queue.send_event(&AnthropicStreamEvent::MessageStop).await;

        let frames = sink.frames();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[1], ": ping\n\n");
        assert_eq!(frames[2], ": ping\n\n");
        assert!(frames[0].starts_with("event: message_stop\n"));
        assert!(frames[3].starts_with("event: message_stop\n"));
    }

    #[derive(Clone, Default)]
    struct DisconnectingSink {
        closed: Arc<AtomicBool>,
    }

    impl SseSink for DisconnectingSink {
        async fn write(&mut self, _frame: String) -> io::Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_queue_notices_client_disconnect() {
        let sink = DisconnectingSink::default();
        let queue = SseWriteQueue::new(sink.clone(), None);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!queue.is_stopped());

        sink.closed.store(true, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), queue.stopped())
            .await
            .expect("queue should stop after the client goes away");
        assert!(queue.is_stopped());
    }

    #[tokio::test]
    async fn stopped_resolves_after_stop() {
        let queue = SseWriteQueue::new(RecordingSink::default(), None);
        queue.stop();
        queue.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_keepalive() {
        let sink = RecordingSink::default();
        let queue = SseWriteQueue::new(sink.clone(), Some(Duration::from_secs(5)));

        queue.stop();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(sink.frames().is_empty());
    }
}
