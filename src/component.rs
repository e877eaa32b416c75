//! Leptos rendering for lazy fields.
//!
//! A lazy field maps naturally onto `<Suspense>`: the fallback is the
//! placeholder, and the children become the resolved (or errored) view
//! once the entry settles.  Under SSR this streams out like any other
//! suspended view.
use std::sync::Arc;

use leptos::prelude::*;

use crate::{entry::PendingEntry, error::FieldSettlementError};

/// Render a single lazy field.
///
/// The `fallback` is shown until the entry settles, after which it is
/// replaced by `resolved` or `errored`.  A field that gets cancelled
/// before it settled renders nothing.
///
/// ```
/// use leptos::prelude::*;
/// use leptos_deferred::{component::await_entry, DeferredBundle};
///
/// fn lazy_view(bundle: &DeferredBundle<String>) -> impl IntoView {
///     bundle.lazy_entry("lazy1").cloned().map(|entry| {
///         await_entry(
///             entry,
///             || "loading 1...".into_any(),
///             |value| view! { <p>{value}</p> }.into_any(),
///             |error| view! { <p class="error">{error.message()}</p> }.into_any(),
///         )
///     })
/// }
/// ```
pub fn await_entry<T, F, R, E>(
    entry: PendingEntry<T>,
    fallback: F,
    resolved: R,
    errored: E,
) -> impl IntoView
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> AnyView + Send + Sync + 'static,
    R: Fn(T) -> AnyView + Send + Sync + 'static,
    E: Fn(FieldSettlementError) -> AnyView + Send + Sync + 'static,
{
    let resolved = Arc::new(resolved);
    let errored = Arc::new(errored);

    let suspend = move || {
        let subscription = entry.subscribe();
        let resolved = Arc::clone(&resolved);
        let errored = Arc::clone(&errored);
        Suspend::new(async move {
            match subscription.wait().await {
                Some(Ok(value)) => resolved(value),
                Some(Err(error)) => errored(error),
                None => ().into_any(),
            }
        })
    };

    view! { <Suspense fallback=move || fallback()>{move || suspend()}</Suspense> }
}
