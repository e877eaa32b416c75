use std::{
    collections::{BTreeMap, HashSet},
    future::Future,
};

use futures::{
    future::{join_all, try_join_all, BoxFuture},
    FutureExt,
};
use tokio::task::AbortHandle;

use crate::{
    entry::{EntryState, PendingEntry},
    error::{BoxError, BundleConstructionError},
};

type FieldFuture<T> = BoxFuture<'static, Result<T, BoxError>>;

enum FieldSource<T> {
    Value(T),
    Critical(FieldFuture<T>),
    Lazy(FieldFuture<T>),
}

fn boxed<T, F, E>(fut: F) -> FieldFuture<T>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<BoxError>,
{
    fut.map(|result| result.map_err(Into::into)).boxed()
}

/// A response made of critical values that are known up front and lazy
/// values that settle on their own time.
///
/// The set of field names is fixed once the bundle is built; only the
/// settlement state of the lazy entries changes afterwards.
pub struct DeferredBundle<T> {
    critical: BTreeMap<String, T>,
    lazy: BTreeMap<String, PendingEntry<T>>,
    tasks: Vec<AbortHandle>,
}

/// Collects the fields of a [`DeferredBundle`].
///
/// Nothing is triggered until [`build`](DeferredBundleBuilder::build) is
/// awaited.
pub struct DeferredBundleBuilder<T> {
    fields: Vec<(String, FieldSource<T>)>,
}

impl<T> Default for DeferredBundleBuilder<T> {
    fn default() -> Self {
        Self { fields: Vec::new() }
    }
}

impl<T> DeferredBundleBuilder<T>
where
    T: Send + Sync + 'static,
{
    /// A critical field whose value is already known.
    pub fn value(mut self, field: impl Into<String>, value: T) -> Self {
        self.fields.push((field.into(), FieldSource::Value(value)));
        self
    }

    /// A critical field computed asynchronously; the bundle is not built
    /// until this completes, and fails as a whole if this fails.
    pub fn critical<F, E>(mut self, field: impl Into<String>, fut: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.fields
            .push((field.into(), FieldSource::Critical(boxed(fut))));
        self
    }

    /// A lazy field; its computation is spawned when the bundle is built
    /// and the bundle never waits for it.
    pub fn lazy<F, E>(mut self, field: impl Into<String>, fut: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.fields.push((field.into(), FieldSource::Lazy(boxed(fut))));
        self
    }

    /// Build the bundle.
    ///
    /// Every lazy computation is spawned onto the current tokio runtime
    /// exactly once, then all critical computations are awaited
    /// concurrently.  Should any of them fail, the lazy entries spawned
    /// here are cancelled before the error is returned, so none of them
    /// will ever be seen settling.  The same applies when the returned
    /// future is dropped before it completes.
    pub async fn build(self) -> Result<DeferredBundle<T>, BundleConstructionError> {
        {
            let mut seen = HashSet::new();
            for (field, _) in &self.fields {
                if !seen.insert(field.as_str()) {
                    return Err(BundleConstructionError::DuplicateField {
                        field: field.clone(),
                    });
                }
            }
        }

        let mut critical = BTreeMap::new();
        let mut lazy = BTreeMap::new();
        let mut tasks = Vec::new();
        let mut pending_critical = Vec::new();

        for (field, source) in self.fields {
            match source {
                FieldSource::Value(value) => {
                    critical.insert(field, value);
                }
                FieldSource::Critical(fut) => pending_critical.push(async move {
                    match fut.await {
                        Ok(value) => Ok((field, value)),
                        Err(source) => Err(BundleConstructionError::Critical { field, source }),
                    }
                }),
                FieldSource::Lazy(fut) => {
                    let (entry, settler) = PendingEntry::new(field.clone());
                    let task = tokio::spawn(async move {
                        settler.settle(fut.await);
                    });
                    tasks.push(task.abort_handle());
                    lazy.insert(field, entry);
                }
            }
        }

        tracing::debug!(
            critical = critical.len() + pending_critical.len(),
            lazy = lazy.len(),
            "building deferred bundle",
        );

        let mut bundle = DeferredBundle {
            critical,
            lazy,
            tasks,
        };

        // the guard also covers this future being dropped mid-await
        let outcome = {
            let guard = CancelOnDrop::new(&bundle);
            let outcome = try_join_all(pending_critical).await;
            if outcome.is_ok() {
                guard.disarm();
            }
            outcome
        };

        match outcome {
            Ok(resolved) => {
                bundle.critical.extend(resolved);
                Ok(bundle)
            }
            Err(error) => {
                tracing::warn!(
                    field = error.field(),
                    %error,
                    "deferred bundle construction failed",
                );
                Err(error)
            }
        }
    }
}

// Cancels a bundle still under construction unless disarmed.
struct CancelOnDrop<'a, T> {
    bundle: &'a DeferredBundle<T>,
    armed: bool,
}

impl<'a, T> CancelOnDrop<'a, T> {
    fn new(bundle: &'a DeferredBundle<T>) -> Self {
        Self {
            bundle,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T> Drop for CancelOnDrop<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.bundle.cancel();
        }
    }
}

impl<T> DeferredBundle<T>
where
    T: Send + Sync + 'static,
{
    pub fn builder() -> DeferredBundleBuilder<T> {
        DeferredBundleBuilder::default()
    }
}

impl<T> DeferredBundle<T> {
    pub fn critical(&self) -> &BTreeMap<String, T> {
        &self.critical
    }

    pub fn critical_value(&self, field: &str) -> Option<&T> {
        self.critical.get(field)
    }

    pub fn lazy_entries(&self) -> &BTreeMap<String, PendingEntry<T>> {
        &self.lazy
    }

    pub fn lazy_entry(&self, field: &str) -> Option<&PendingEntry<T>> {
        self.lazy.get(field)
    }

    /// All field names, the critical ones first.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.critical
            .keys()
            .chain(self.lazy.keys())
            .map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.critical.contains_key(field) || self.lazy.contains_key(field)
    }

    /// Names of the lazy fields that have yet to settle.
    pub fn pending_fields(&self) -> Vec<&str> {
        self.lazy
            .iter()
            .filter(|(_, entry)| entry.is_pending())
            .map(|(field, _)| field.as_str())
            .collect()
    }

    /// Whether no lazy field can change any more, either because it
    /// settled or because it was cancelled.
    pub fn is_done(&self) -> bool {
        self.lazy
            .values()
            .all(|entry| !entry.is_pending() || entry.is_cancelled())
    }

    /// Cancel the bundle.
    ///
    /// Every lazy field still pending is marked so it will never settle,
    /// and the task computing it is aborted.  Fields that already settled
    /// keep their outcome.  Calling this again has no further effect.
    pub fn cancel(&self) {
        let cancelled = self
            .lazy
            .values()
            .filter(|entry| entry.cancel())
            .count();
        for task in &self.tasks {
            task.abort();
        }
        if cancelled > 0 {
            tracing::debug!(cancelled, "deferred bundle cancelled");
        }
    }
}

impl<T: Clone> DeferredBundle<T> {
    /// Wait until every lazy field that was not cancelled has settled,
    /// then return the state of each.
    pub async fn settled(&self) -> BTreeMap<String, EntryState<T>> {
        join_all(self.lazy.values().map(|entry| entry.subscribe().wait())).await;
        self.lazy
            .iter()
            .map(|(field, entry)| (field.clone(), entry.state()))
            .collect()
    }
}

mod debug {
    use super::*;
    use std::fmt;

    impl<T: fmt::Debug> fmt::Debug for DeferredBundle<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("DeferredBundle")
                .field("critical", &self.critical)
                .field("lazy", &self.lazy)
                .finish()
        }
    }

    impl<T> fmt::Debug for DeferredBundleBuilder<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_list()
                .entries(self.fields.iter().map(|(field, _)| field))
                .finish()
        }
    }
}
