//! Cancellable live-query subscriptions

use futures_util::Stream;
use log::trace;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

/// One immutable result set delivered by a live query
pub type Snapshot<T> = Arc<Vec<T>>;

/// Sending half handed to the task that produces snapshots
pub type SnapshotSender<T> = mpsc::Sender<Result<Snapshot<T>>>;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Detaches a subscription when dropped
struct CancelGuard {
    task: Option<JoinHandle<()>>,
    cleanup: Option<Cleanup>,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

/// A live subscription delivering a full snapshot on every change.
///
/// The holder owns the subscription: dropping it, or calling [`cancel`],
/// stops the producing task and detaches from the backend. Failures arrive
/// as `Err` items; the stream ends once the backend side has gone away.
///
/// [`cancel`]: Subscription::cancel
pub struct Subscription<T> {
    rx: mpsc::Receiver<Result<Snapshot<T>>>,
    guard: CancelGuard,
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

impl<T> Subscription<T> {
    /// Wait for the next snapshot; `None` once the subscription has ended
    pub async fn next_snapshot(&mut self) -> Option<Result<Snapshot<T>>> {
        self.rx.recv().await
    }

    /// Whether the producing task is still running
    pub fn is_active(&self) -> bool {
        self.guard
            .task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Detach from the backend
    pub fn cancel(self) {
        trace!("Subscription cancelled");
        drop(self);
    }
}

impl<T: Send + Sync + 'static> Subscription<T> {
    /// Create the channel a producer task writes snapshots into
    pub fn channel(buffer: usize) -> (SnapshotSender<T>, mpsc::Receiver<Result<Snapshot<T>>>) {
        mpsc::channel(buffer.max(1))
    }

    /// Wrap a receiver and the task feeding it
    pub fn new(rx: mpsc::Receiver<Result<Snapshot<T>>>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            guard: CancelGuard {
                task: Some(task),
                cleanup: None,
            },
        }
    }

    /// Run `cleanup` once when the subscription is cancelled or dropped
    pub fn on_cancel<F>(mut self, cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.guard.cleanup = Some(Box::new(cleanup));
        self
    }

    /// Turn each snapshot item into a `U`, dropping items `f` rejects
    pub fn map<U, F>(self, buffer: usize, f: F) -> Subscription<U>
    where
        U: Send + Sync + 'static,
        F: Fn(&T) -> Option<U> + Send + 'static,
    {
        let (tx, rx) = Subscription::<U>::channel(buffer);
        let mut inner = self;
        let task = tokio::spawn(async move {
            while let Some(item) = inner.rx.recv().await {
                let mapped = item.map(|snapshot| Arc::new(snapshot.iter().filter_map(&f).collect::<Vec<U>>()));
                if tx.send(mapped).await.is_err() {
                    break;
                }
            }
        });
        Subscription::new(rx, task)
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<Snapshot<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
