//! Async read loop for one chat turn
//!
//! [`TurnStream`] pulls chunks from a response body, feeds them to a
//! [`SessionEventDispatcher`] and yields the resulting [`ChatEvent`]s. The
//! body is dropped as soon as the turn finishes, fails, is cancelled, or the
//! stream itself is dropped.

use super::accumulator::PartialContentAccumulator;
use super::dispatcher::{ChatEvent, SessionEventDispatcher};
use super::events::TaskState;
use super::tracker::TaskTracker;
use super::TurnError;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// Callback type for turn events
///
/// Called once per event, in arrival order.
pub type ChatCallback = Box<dyn Fn(ChatEvent) + Send + Sync>;

/// Stream of events for one `send_message` call
pub struct TurnStream {
    inner: BoxStream<'static, ChatEvent>,
    cancelled: Arc<AtomicBool>,
    tracker: TaskTracker,
    content: PartialContentAccumulator,
}

impl TurnStream {
    /// Drive a turn from a response body
    ///
    /// `idle_timeout` bounds the wait for each chunk; exceeding it fails the
    /// turn with [`TurnError::Network`].
    pub fn from_body<S, B, E>(body: S, idle_timeout: Duration) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Display + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let body: Body<B, E> = Box::pin(body);
        let driver = TurnDriver {
            body: Some(body),
            dispatcher: SessionEventDispatcher::new(),
            pending: VecDeque::new(),
            cancelled: cancelled.clone(),
            idle_timeout,
        };
        let inner = stream::unfold(driver, TurnDriver::next_event).boxed();
        Self::with_inner(inner, cancelled)
    }

    /// A turn that failed before any byte was read
    pub fn failed(error: TurnError) -> Self {
        tracing::warn!(target: "chat", error = %error, "Could not open turn stream");
        let inner = stream::iter([ChatEvent::Error(error)]).boxed();
        Self::with_inner(inner, Arc::new(AtomicBool::new(false)))
    }

    fn with_inner(inner: BoxStream<'static, ChatEvent>, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            inner,
            cancelled,
            tracker: TaskTracker::new(),
            content: PartialContentAccumulator::new(),
        }
    }

    /// Stop reading; the stream ends without an error event
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Latest task seen by the consumer, `None` once the turn has ended
    pub fn current_task(&self) -> Option<&TaskState> {
        self.tracker.current()
    }

    /// Assistant text assembled from the deltas yielded so far
    pub fn content(&self) -> &str {
        self.content.as_str()
    }

    /// Deliver every event to `callback`, then return
    pub async fn run(mut self, callback: ChatCallback) {
        while let Some(event) = self.next().await {
            callback(event);
        }
    }

    fn observe(&mut self, event: &ChatEvent) {
        match event {
            ChatEvent::PartialContent(delta) => self.content.push(delta),
            ChatEvent::TaskUpdate(task) => self.tracker.update(task),
            ChatEvent::Error(_) => self.tracker.clear(),
            ChatEvent::QuestionGenerated(_) | ChatEvent::Complete(_) => {}
        }
    }
}

impl Stream for TurnStream {
    type Item = ChatEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ChatEvent>> {
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(event)) => {
                self.observe(&event);
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.tracker.clear();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

type Body<B, E> = Pin<Box<dyn Stream<Item = Result<B, E>> + Send>>;

struct TurnDriver<B, E> {
    body: Option<Body<B, E>>,
    dispatcher: SessionEventDispatcher,
    pending: VecDeque<ChatEvent>,
    cancelled: Arc<AtomicBool>,
    idle_timeout: Duration,
}

impl<B, E> TurnDriver<B, E>
where
    B: AsRef<[u8]>,
    E: Display,
{
    async fn next_event(mut self) -> Option<(ChatEvent, Self)> {
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                self.dispatcher.cancel();
                self.pending.clear();
                self.release();
                return None;
            }

            if let Some(event) = self.pending.pop_front() {
                return Some((event, self));
            }

            if self.dispatcher.is_finished() {
                self.release();
                return None;
            }

            let body = self.body.as_mut()?;
            match tokio::time::timeout(self.idle_timeout, body.next()).await {
                Ok(Some(Ok(chunk))) => {
                    let events = self.dispatcher.push(chunk.as_ref());
                    self.pending.extend(events);
                }
                Ok(Some(Err(e))) => {
                    let event = self.dispatcher.fail(TurnError::Network(e.to_string()));
                    self.pending.push_back(event);
                }
                Ok(None) => {
                    let events = self.dispatcher.finish();
                    self.pending.extend(events);
                }
                Err(_) => {
                    let event = self.dispatcher.fail(TurnError::Network(format!(
                        "no data for {} seconds",
                        self.idle_timeout.as_secs()
                    )));
                    self.pending.push_back(event);
                }
            }
        }
    }

    fn release(&mut self) {
        if self.body.take().is_some() {
            tracing::trace!(target: "chat", "Response body released");
        }
    }
}
