//! Eager prefetch for lazily produced streams
//!
//! Listing a remote tree is slow to start: the first page costs a full
//! round trip. [`eager`] moves production onto a runtime task that starts
//! immediately and fills a bounded buffer, so the consumer finds items
//! waiting instead of paying that latency on its first pull.

use crate::error::BlobSyncError;
use futures::stream::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Stream produced ahead of its consumer by a background task
#[must_use = "streams do nothing unless polled"]
pub struct EagerStream<T, E> {
    items: mpsc::Receiver<Result<T, E>>,
    producer: JoinHandle<()>,
    producer_done: bool,
}

/// Start draining `source` now, buffering up to `buffer` items.
///
/// Yields exactly the items of `source`, in order. Dropping the returned
/// stream aborts production. A panic in `source` is resumed in the
/// consumer once the buffered items have been delivered; a producer that
/// was cancelled ends the stream with a [`BlobSyncError::Task`] error.
///
/// Must be called from within a tokio runtime.
pub fn eager<S, T, E>(source: S, buffer: usize) -> EagerStream<T, E>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<BlobSyncError> + Send + 'static,
{
    let (tx, items) = mpsc::channel(buffer.max(1));
    let producer = tokio::spawn(async move {
        futures::pin_mut!(source);
        while let Some(item) = source.next().await {
            if tx.send(item).await.is_err() {
                // Consumer is gone
                break;
            }
        }
    });

    EagerStream {
        items,
        producer,
        producer_done: false,
    }
}

impl<T, E: From<BlobSyncError>> Stream for EagerStream<T, E> {
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.items.poll_recv(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(item)),
            Poll::Ready(None) => {
                if this.producer_done {
                    return Poll::Ready(None);
                }
                // The channel closes before the task reports how it ended
                match Pin::new(&mut this.producer).poll(cx) {
                    Poll::Ready(Ok(())) => {
                        this.producer_done = true;
                        Poll::Ready(None)
                    }
                    Poll::Ready(Err(err)) => {
                        this.producer_done = true;
                        if err.is_panic() {
                            std::panic::resume_unwind(err.into_panic());
                        }
                        Poll::Ready(Some(Err(BlobSyncError::from(err).into())))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> Drop for EagerStream<T, E> {
    fn drop(&mut self) {
        self.producer.abort();
    }
}
