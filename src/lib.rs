//! This crate provides deferred loader data for the Leptos framework, or
//! for anything else that wants to hand out a response before all of it is
//! known.  A loader returns a [`DeferredBundle`], made of critical values
//! that were awaited before the bundle was produced, along with lazy values
//! that are still being computed and settle on their own time, each either
//! to a value or to an error.  A [`Renderer`] then shows a placeholder for
//! every lazy value and swaps it for the outcome once that value settles,
//! without ever waiting on any of the others.
//!
//! ## Use case
//!
//! A typical page has some data that it simply cannot render without
//! (e.g. the title and summary of a record), and some data that is slow
//! to produce but which the page is perfectly usable without (comments,
//! related items, some expensive aggregate).  Waiting on all of it before
//! sending anything penalizes the whole page for its slowest part, while
//! fetching the slow parts separately from the client side means the
//! requests only start once the page has arrived.
//!
//! With a deferred bundle the loader kicks off the slow computations right
//! away, waits only for the critical ones, and returns.  The slow values
//! then fill in their regions as they become available, and a failure in
//! one of them is shown in place of that region alone, rather than failing
//! the whole page.
//!
//! # Example
//!
//! ```
//! use std::convert::Infallible;
//!
//! use leptos_deferred::{
//!     DeferredBundle, ErrorReport, FieldPhase, Presenter, RenderOptions, Renderer,
//! };
//!
//! struct Text;
//!
//! impl Presenter<String> for Text {
//!     type View = String;
//!
//!     fn critical(&self, _: &str, value: &String) -> String {
//!         value.clone()
//!     }
//!
//!     fn placeholder(&self, field: &str) -> String {
//!         format!("loading {field}...")
//!     }
//!
//!     fn resolved(&self, _: &str, value: &String) -> String {
//!         value.clone()
//!     }
//!
//!     fn errored(&self, report: &ErrorReport) -> String {
//!         format!("error: {}", report.message)
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let bundle = DeferredBundle::builder()
//!     .critical("title", async { Ok::<_, Infallible>("A title".to_string()) })
//!     .lazy("comments", async { Ok::<_, Infallible>("No comments".to_string()) })
//!     .lazy("related", async { Err::<String, _>("service unavailable") })
//!     .build()
//!     .await?;
//!
//! let mut renderer = Renderer::attach(&bundle, Text, RenderOptions::new());
//! // critical values are displayed right away
//! assert_eq!(renderer.display("title").unwrap().phase, FieldPhase::Critical);
//!
//! let mut updates = renderer.updates().unwrap();
//! while let Some(update) = updates.recv().await {
//!     println!("{} is now {:?}: {}", update.field, update.phase, update.view);
//! }
//! assert_eq!(renderer.display("comments").unwrap().view, "No comments");
//! assert_eq!(
//!     renderer.display("related").unwrap().view,
//!     "error: service unavailable",
//! );
//! # Ok::<_, leptos_deferred::BundleConstructionError>(())
//! # }).unwrap();
//! ```
//!
//! Under Leptos, a lazy field is more directly rendered through the
//! [`component::await_entry`] helper, which wraps the field in a
//! `<Suspense>`.
//!
//! # Feature Flags
#![cfg_attr(
    feature = "document-features",
    cfg_attr(doc, doc = ::document_features::document_features!())
)]

mod bundle;
pub mod component;
mod entry;
mod error;
mod render;


pub use bundle::{DeferredBundle, DeferredBundleBuilder};
pub use entry::{EntryState, EntrySubscription, PendingEntry};
pub use error::{BoxError, BundleConstructionError, ErrorReport, FieldSettlementError};
pub use render::{
    ErrorRendererSelection, FieldDisplay, FieldOverride, FieldPhase, Presenter, RenderOptions,
    Renderer, RendererSettings,
};
