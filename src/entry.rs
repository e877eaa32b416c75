use std::sync::Arc;

use tokio::sync::watch::{channel, Receiver, Sender};

use crate::error::{BoxError, FieldSettlementError};

/// The observable state of a lazy field.
#[derive(Clone, Debug)]
pub enum EntryState<T> {
    Pending,
    Settled(T),
    Failed(FieldSettlementError),
}

impl<T> EntryState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

// What actually travels through the channel.  `cancelled` lives next to
// the state so that both are read and written under the same lock.
struct Slot<T> {
    state: EntryState<T>,
    cancelled: bool,
}

impl<T: Clone> Slot<T> {
    fn outcome(&self) -> Option<Result<T, FieldSettlementError>> {
        match &self.state {
            EntryState::Pending => None,
            EntryState::Settled(value) => Some(Ok(value.clone())),
            EntryState::Failed(error) => Some(Err(error.clone())),
        }
    }
}

/// A live handle to one lazy field of a [`DeferredBundle`](
/// crate::DeferredBundle).
///
/// Handles are cheap to clone and only ever observe the field; the
/// outcome is written exactly once by the task that was spawned for it
/// when the bundle was built.
pub struct PendingEntry<T> {
    inner: Arc<EntryInner<T>>,
}

struct EntryInner<T> {
    field: String,
    sender: Sender<Slot<T>>,
}

/// The write half of an entry, owned by the producing task.
///
/// Dropping this without settling fails the entry as abandoned, which
/// covers the producing task panicking or being torn down with the
/// runtime.
pub(crate) struct EntrySettler<T> {
    inner: Arc<EntryInner<T>>,
    done: bool,
}

/// A subscription to a [`PendingEntry`], typically held by a future that
/// needs the outcome of the field.
pub struct EntrySubscription<T> {
    field: String,
    receiver: Receiver<Slot<T>>,
}

impl<T> Clone for PendingEntry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PendingEntry<T> {
    pub(crate) fn new(field: impl Into<String>) -> (Self, EntrySettler<T>) {
        let (sender, _) = channel(Slot {
            state: EntryState::Pending,
            cancelled: false,
        });
        let inner = Arc::new(EntryInner {
            field: field.into(),
            sender,
        });
        let settler = EntrySettler {
            inner: Arc::clone(&inner),
            done: false,
        };
        (Self { inner }, settler)
    }

    pub fn field(&self) -> &str {
        &self.inner.field
    }

    pub fn is_pending(&self) -> bool {
        self.inner.sender.borrow().state.is_pending()
    }

    /// Whether a bundle-level cancellation reached this entry while it
    /// was still pending.
    pub fn is_cancelled(&self) -> bool {
        self.inner.sender.borrow().cancelled
    }

    pub fn subscribe(&self) -> EntrySubscription<T> {
        EntrySubscription {
            field: self.inner.field.clone(),
            receiver: self.inner.sender.subscribe(),
        }
    }

    /// Mark the entry as cancelled.  A pending entry will never
    /// transition afterwards; returns whether it was still pending.
    pub(crate) fn cancel(&self) -> bool {
        let mut was_pending = false;
        self.inner.sender.send_if_modified(|slot| {
            if slot.cancelled || !slot.state.is_pending() {
                return false;
            }
            was_pending = true;
            slot.cancelled = true;
            true
        });
        if was_pending {
            tracing::trace!(field = %self.inner.field, "deferred entry cancelled");
        }
        was_pending
    }
}

impl<T: Clone> PendingEntry<T> {
    /// A copy of the current state.
    pub fn state(&self) -> EntryState<T> {
        self.inner.sender.borrow().state.clone()
    }

    /// Wait for the outcome of this entry.
    ///
    /// Returns `None` if the entry was cancelled before it settled.
    pub async fn outcome(&self) -> Option<Result<T, FieldSettlementError>> {
        self.subscribe().wait().await
    }
}

impl<T> EntryInner<T> {
    // The check and the write happen under the channel's write lock, so
    // only the first caller ever moves the entry out of `Pending`.
    fn transition(&self, next: EntryState<T>) -> bool {
        self.sender.send_if_modified(move |slot| {
            if slot.cancelled || !slot.state.is_pending() {
                return false;
            }
            slot.state = next;
            true
        })
    }
}

impl<T> EntrySettler<T> {
    pub(crate) fn settle(mut self, result: Result<T, BoxError>) -> bool {
        self.done = true;
        let field = &self.inner.field;
        let next = match result {
            Ok(value) => {
                tracing::trace!(%field, "deferred entry settled");
                EntryState::Settled(value)
            }
            Err(source) => {
                tracing::trace!(%field, error = %source, "deferred entry failed");
                EntryState::Failed(FieldSettlementError::failed(field, source))
            }
        };
        self.inner.transition(next)
    }
}

impl<T> Drop for EntrySettler<T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let field = &self.inner.field;
        if self
            .inner
            .transition(EntryState::Failed(FieldSettlementError::abandoned(field)))
        {
            tracing::warn!(%field, "deferred entry abandoned by its task");
        }
    }
}

impl<T> EntrySubscription<T> {
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl<T: Clone> EntrySubscription<T> {
    /// Asynchronously wait for the field to settle.
    ///
    /// This returns immediately if the field has already settled.  If the
    /// field gets cancelled instead, `None` is returned and no outcome
    /// will ever be produced for it.
    pub async fn wait(mut self) -> Option<Result<T, FieldSettlementError>> {
        let outcome = match self
            .receiver
            .wait_for(|slot| slot.cancelled || !slot.state.is_pending())
            .await
        {
            Ok(slot) => slot.outcome(),
            // every sender is gone, which only happens once the entry
            // itself was dropped
            Err(_) => None,
        };
        outcome
    }
}

mod debug {
    use super::*;
    use std::fmt;

    impl<T: fmt::Debug> fmt::Debug for PendingEntry<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let slot = self.inner.sender.borrow();
            f.debug_struct("PendingEntry")
                .field("field", &self.inner.field)
                .field("state", &slot.state)
                .field("cancelled", &slot.cancelled)
                .field("subscribers", &self.inner.sender.receiver_count())
                .finish()
        }
    }

    impl<T> fmt::Debug for EntrySubscription<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("EntrySubscription")
                .field("field", &self.field)
                .finish()
        }
    }
}
