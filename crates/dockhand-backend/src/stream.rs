//! Producer/consumer bridge for live log streaming.
//!
//! Both backend variants feed the same bounded channel: the local variant
//! from the engine's async log stream, the remote variant from a blocking
//! SSH read loop running on the blocking pool. The channel closing is the
//! end-of-stream sentinel; a stalled consumer blocks only its own producer
//! (capacity bound instead of the unbounded-queue risk), and a consumer
//! that hangs up makes the next send fail so the producer can release its
//! session promptly.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use dockhand_common::LogChunk;

/// Chunks buffered between producer and consumer before backpressure.
pub const CHANNEL_CAPACITY: usize = 256;

/// Handle a blocking producer pushes chunks through.
pub struct LogSink {
    tx: mpsc::Sender<LogChunk>,
}

impl LogSink {
    /// Deliver one chunk, blocking when the consumer is behind. Returns
    /// `false` once the consumer has hung up; the producer must stop and
    /// tear down its source.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.tx.blocking_send(LogChunk::new(text)).is_ok()
    }
}

/// Async counterpart of [`LogSink`] for producers that are already async.
pub struct AsyncLogSink {
    tx: mpsc::Sender<LogChunk>,
}

impl AsyncLogSink {
    /// Deliver one chunk. Returns `false` once the consumer has hung up.
    pub async fn send(&self, text: impl Into<String>) -> bool {
        self.tx.send(LogChunk::new(text)).await.is_ok()
    }
}

/// One live log stream delivered to a single consumer.
pub struct LogStream {
    rx: mpsc::Receiver<LogChunk>,
}

impl LogStream {
    /// Raw channel for an async producer task. Dropping the sink ends the
    /// stream.
    pub fn channel() -> (AsyncLogSink, LogStream) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (AsyncLogSink { tx }, LogStream { rx })
    }

    /// Run a blocking producer on the blocking pool. The producer owns the
    /// raw read loop and exits when its source reaches EOF, fails, or
    /// `LogSink::send` reports the consumer gone; dropping the sink on exit
    /// is the completion sentinel.
    pub fn from_blocking<F>(producer: F) -> Self
    where
        F: FnOnce(LogSink) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::task::spawn_blocking(move || producer(LogSink { tx }));
        LogStream { rx }
    }

    pub async fn next_chunk(&mut self) -> Option<LogChunk> {
        self.rx.recv().await
    }
}

impl Stream for LogStream {
    type Item = LogChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<LogChunk>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn consumer_receives_exactly_the_produced_chunks_then_ends() {
        let mut stream = LogStream::from_blocking(|sink| {
            for i in 0..7 {
                assert!(sink.send(format!("chunk {i}\n")));
            }
        });

        let mut received = Vec::new();
        while let Some(chunk) = stream.next_chunk().await {
            received.push(chunk.text);
        }
        assert_eq!(received.len(), 7);
        assert_eq!(received[0], "chunk 0\n");
        assert_eq!(received[6], "chunk 6\n");
        // Channel is closed; no extra chunks, no hang.
        assert!(stream.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn producer_observes_consumer_hangup() {
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let stream = LogStream::from_blocking(move |sink| {
            let mut delivered = 0u32;
            loop {
                if !sink.send("line\n") {
                    break;
                }
                delivered += 1;
            }
            done_tx.send(delivered).unwrap();
        });

        drop(stream);

        let delivered =
            tokio::task::spawn_blocking(move || done_rx.recv_timeout(Duration::from_secs(5)))
                .await
                .unwrap()
                .expect("producer never exited after consumer hangup");
        // The producer may fill the channel buffer before noticing, but it
        // must stop soon after the receiver is gone.
        assert!(delivered <= CHANNEL_CAPACITY as u32 + 1);
    }

    #[tokio::test]
    async fn async_sink_delivers_in_order() {
        let (sink, mut stream) = LogStream::channel();
        tokio::spawn(async move {
            for i in 0..3 {
                assert!(sink.send(format!("{i}")).await);
            }
        });

        assert_eq!(stream.next_chunk().await.unwrap().text, "0");
        assert_eq!(stream.next_chunk().await.unwrap().text, "1");
        assert_eq!(stream.next_chunk().await.unwrap().text, "2");
        assert!(stream.next_chunk().await.is_none());
    }
}
