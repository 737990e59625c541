//! Observable values derived from stored state.
//!
//! A [`Subscription`] is a typed projection over a `tokio::sync::watch`
//! channel: [`Subscription::get`] reads the current value synchronously and
//! [`Subscription::changed`] resolves once the *projected* value differs
//! from the last one this handle observed. Source updates that leave the
//! projection unchanged are not reported.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::SubscriptionClosed;

#[async_trait]
trait Source<T>: Send + Sync {
    fn current(&self) -> T;

    /// Project the latest value and mark it seen.
    fn observe(&mut self) -> T;

    async fn changed(&mut self) -> Result<(), SubscriptionClosed>;

    fn clone_box(&self) -> Box<dyn Source<T>>;
}

struct Projected<S, T> {
    rx: watch::Receiver<S>,
    project: Arc<dyn Fn(&S) -> T + Send + Sync>,
}

#[async_trait]
impl<S, T> Source<T> for Projected<S, T>
where
    S: Send + Sync + 'static,
    T: Send + 'static,
{
    fn current(&self) -> T {
        (self.project)(&*self.rx.borrow())
    }

    fn observe(&mut self) -> T {
        (self.project)(&*self.rx.borrow_and_update())
    }

    async fn changed(&mut self) -> Result<(), SubscriptionClosed> {
        self.rx.changed().await.map_err(|_| SubscriptionClosed)
    }

    fn clone_box(&self) -> Box<dyn Source<T>> {
        Box::new(Self {
            rx: self.rx.clone(),
            project: Arc::clone(&self.project),
        })
    }
}

/// A subscribable, read-only view of a value.
pub struct Subscription<T> {
    source: Box<dyn Source<T>>,
    last: T,
}

impl<T> Subscription<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Subscribe to a watch channel as is.
    #[must_use]
    pub fn from_watch(rx: watch::Receiver<T>) -> Self {
        Self::map(rx, T::clone)
    }

    /// Subscribe to a projection of a watch channel.
    #[must_use]
    pub fn map<S, F>(rx: watch::Receiver<S>, project: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(&S) -> T + Send + Sync + 'static,
    {
        let mut source = Projected {
            rx,
            project: Arc::new(project),
        };
        let last = source.observe();
        Self {
            source: Box::new(source),
            last,
        }
    }

    /// The current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.source.current()
    }

    /// Wait until the value differs from the one last observed through this
    /// handle and return it.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionClosed`] once the underlying state is dropped.
    pub async fn changed(&mut self) -> Result<T, SubscriptionClosed> {
        loop {
            let next = self.source.observe();
            if next != self.last {
                self.last = next.clone();
                return Ok(next);
            }
            self.source.changed().await?;
        }
    }
}

impl<T: Clone> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone_box(),
            last: self.last.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}
