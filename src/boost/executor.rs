//! Bounded-concurrency mapping over streams
//!
//! [`BoostExecutor`] runs an async function over every item of an input
//! stream with at most `concurrency` tasks in flight, across all mapping
//! calls made on the same executor. Two output disciplines are offered:
//!
//! - [`BoostExecutor::map_ordered`] yields results in input order, buffering
//!   results that finish ahead of an earlier, slower task.
//! - [`BoostExecutor::map_unordered`] yields results as they complete.
//!
//! Task futures are polled by whoever consumes the returned stream; nothing
//! is spawned. Dropping the stream drops every in-flight task and returns
//! its slot. The first task error ends the stream and cancels the rest.
//!
//! A mapping call driven from inside a task of the same executor (a copy
//! task reading its source with ranged requests, say) runs one task at a
//! time on the slot its caller already holds whenever no free slot is
//! left, so nesting never waits on its own parent.

use super::slots::{SlotPool, SlotWaiter};
use crate::config::BoostConfig;
use crate::error::Result;
use futures::future::BoxFuture;
use futures::stream::{FuturesOrdered, FuturesUnordered, Stream, StreamExt, TryStream, TryStreamExt};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Boxed in-flight task holding its slot
pub type TaskFuture<'a, T> = BoxFuture<'a, T>;

/// Stream returned by [`BoostExecutor::map_ordered`]
pub type OrderedBoost<'a, S, F, O, E> =
    Boosted<'a, S, F, FuturesOrdered<TaskFuture<'a, std::result::Result<O, E>>>>;

/// Stream returned by [`BoostExecutor::map_unordered`]
pub type UnorderedBoost<'a, S, F, O, E> =
    Boosted<'a, S, F, FuturesUnordered<TaskFuture<'a, std::result::Result<O, E>>>>;

/// Bounded-concurrency task executor
#[derive(Debug)]
pub struct BoostExecutor {
    config: BoostConfig,
    slots: SlotPool,
}

impl BoostExecutor {
    /// Create an executor allowing `concurrency` in-flight tasks
    pub fn new(concurrency: usize) -> Result<Self> {
        Self::with_config(BoostConfig::with_concurrency(concurrency))
    }

    /// Create an executor from a full configuration
    pub fn with_config(config: BoostConfig) -> Result<Self> {
        config.validate()?;
        let slots = SlotPool::new(config.concurrency);
        Ok(Self { config, slots })
    }

    /// Get the executor configuration
    pub fn config(&self) -> &BoostConfig {
        &self.config
    }

    /// Maximum number of in-flight tasks
    pub fn concurrency(&self) -> usize {
        self.slots.capacity()
    }

    /// Number of tasks currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.slots.in_use()
    }

    /// Map `f` over `inputs`, yielding results in input order.
    ///
    /// A slow task at position k holds back results already finished at
    /// positions after k; their slots are released as soon as they finish.
    /// A failure surfaces at its own position, after every earlier result.
    pub fn map_ordered<'a, S, F, Fut, O, E>(
        &'a self,
        f: F,
        inputs: S,
    ) -> OrderedBoost<'a, S, F, O, E>
    where
        S: Stream + Unpin,
        F: FnMut(S::Item) -> Fut,
        Fut: Future<Output = std::result::Result<O, E>> + Send + 'a,
        O: Send + 'a,
        E: Send + 'a,
    {
        Boosted::new(&self.slots, f, inputs)
    }

    /// Map `f` over `inputs`, yielding results in completion order.
    pub fn map_unordered<'a, S, F, Fut, O, E>(
        &'a self,
        f: F,
        inputs: S,
    ) -> UnorderedBoost<'a, S, F, O, E>
    where
        S: Stream + Unpin,
        F: FnMut(S::Item) -> Fut,
        Fut: Future<Output = std::result::Result<O, E>> + Send + 'a,
        O: Send + 'a,
        E: Send + 'a,
    {
        Boosted::new(&self.slots, f, inputs)
    }
}

/// Set of in-flight tasks with a delivery discipline
pub trait TaskQueue<'a>: Default {
    /// Output of each task
    type Output;

    /// Add a started task
    fn push(&mut self, task: TaskFuture<'a, Self::Output>);

    /// Poll for the next deliverable output
    fn poll_next_output(&mut self, cx: &mut Context<'_>) -> Poll<Option<Self::Output>>;

    /// Number of tasks not yet delivered
    fn len(&self) -> usize;

    /// Whether no task is pending delivery
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a, T> TaskQueue<'a> for FuturesOrdered<TaskFuture<'a, T>> {
    type Output = T;

    fn push(&mut self, task: TaskFuture<'a, T>) {
        self.push_back(task);
    }

    fn poll_next_output(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.poll_next_unpin(cx)
    }

    fn len(&self) -> usize {
        FuturesOrdered::len(self)
    }
}

impl<'a, T> TaskQueue<'a> for FuturesUnordered<TaskFuture<'a, T>> {
    type Output = T;

    fn push(&mut self, task: TaskFuture<'a, T>) {
        FuturesUnordered::push(self, task);
    }

    fn poll_next_output(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.poll_next_unpin(cx)
    }

    fn len(&self) -> usize {
        FuturesUnordered::len(self)
    }
}

/// Stream of results from a bounded mapping call
#[must_use = "streams do nothing unless polled"]
pub struct Boosted<'a, S, F, Q> {
    slots: &'a SlotPool,
    waiter: SlotWaiter,
    /// `None` once the input stream is exhausted or the call failed
    inputs: Option<S>,
    f: F,
    running: Q,
    finished: bool,
}

// Neither the input stream nor the mapping function is ever pinned in place.
impl<S, F, Q> Unpin for Boosted<'_, S, F, Q> {}

impl<'a, S, F, Q> Boosted<'a, S, F, Q>
where
    Q: TaskQueue<'a>,
{
    fn new(slots: &'a SlotPool, f: F, inputs: S) -> Self {
        Self {
            slots,
            waiter: slots.waiter(),
            inputs: Some(inputs),
            f,
            running: Q::default(),
            finished: false,
        }
    }

    /// Number of tasks started but not yet delivered
    pub fn pending(&self) -> usize {
        self.running.len()
    }
}

impl<'a, S, F, Fut, O, E, Q> Boosted<'a, S, F, Q>
where
    S: Stream + Unpin,
    F: FnMut(S::Item) -> Fut,
    Fut: Future<Output = std::result::Result<O, E>> + Send + 'a,
    Q: TaskQueue<'a, Output = std::result::Result<O, E>>,
{
    /// Start tasks until slots or ready inputs run out.
    ///
    /// A slot is taken before the next input is pulled so inputs are never
    /// consumed faster than tasks can start.
    fn start_tasks(&mut self, cx: &mut Context<'_>) {
        let slots = self.slots;
        let nested = slots.is_current();
        while let Some(inputs) = self.inputs.as_mut() {
            let slot = match self.waiter.poll_acquire(cx) {
                Poll::Ready(slot) => Some(slot),
                // Borrow the caller's slot for one task at a time
                Poll::Pending if nested && self.running.is_empty() => None,
                Poll::Pending => return,
            };

            match inputs.poll_next_unpin(cx) {
                Poll::Ready(Some(item)) => {
                    let borrowed = slot.is_none();
                    let task = (self.f)(item);
                    self.running.push(Box::pin(slots.scope(async move {
                        let _slot = slot;
                        task.await
                    })));
                    tracing::trace!(
                        in_flight = slots.in_use(),
                        pending = self.running.len(),
                        borrowed,
                        "started task"
                    );
                }
                Poll::Ready(None) => {
                    self.inputs = None;
                }
                // The slot goes back to the pool until an input shows up
                Poll::Pending => return,
            }
        }
    }

    fn fail(&mut self) {
        let cancelled = self.running.len();
        self.running = Q::default();
        self.inputs = None;
        self.finished = true;
        if cancelled > 0 {
            tracing::warn!(cancelled, "task failed, cancelling in-flight tasks");
        }
    }
}

impl<'a, S, F, Fut, O, E, Q> Stream for Boosted<'a, S, F, Q>
where
    S: Stream + Unpin,
    F: FnMut(S::Item) -> Fut,
    Fut: Future<Output = std::result::Result<O, E>> + Send + 'a,
    Q: TaskQueue<'a, Output = std::result::Result<O, E>>,
{
    type Item = std::result::Result<O, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        this.start_tasks(cx);

        match this.running.poll_next_output(cx) {
            Poll::Ready(Some(Ok(output))) => Poll::Ready(Some(Ok(output))),
            Poll::Ready(Some(Err(err))) => {
                this.fail();
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) if this.inputs.is_none() => {
                this.finished = true;
                Poll::Ready(None)
            }
            // Waiting on a slot or on the input stream; both wakers are set
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        // A failure ends the stream early, so only the upper bound is known
        let running = self.running.len();
        let upper = match &self.inputs {
            Some(inputs) => inputs.size_hint().1.and_then(|h| h.checked_add(running)),
            None => Some(running),
        };
        (0, upper)
    }
}

/// Drain a fallible stream, returning how many items it produced
pub async fn consume<S>(stream: S) -> std::result::Result<usize, S::Error>
where
    S: TryStream,
{
    stream
        .try_fold(0usize, |count, _| futures::future::ready(Ok(count + 1)))
        .await
}
