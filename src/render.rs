//! Presentation of a [`DeferredBundle`] as a set of per-field display
//! states.
//!
//! A [`Renderer`] is attached to a bundle and, for every field, keeps a
//! [`FieldDisplay`] describing what should currently be shown.  Critical
//! fields are shown as-is straight away.  Lazy fields show a placeholder
//! until their entry settles, after which the placeholder is swapped for
//! either the resolved value or an error, exactly once, and without any
//! regard for how the sibling fields are doing.
//!
//! What the views actually are is up to the [`Presenter`], which provides
//! the shared descriptions for every field.  Individual fields may replace
//! any of those through a [`FieldOverride`].
//!
//! The renderer never waits on anything: each lazy field gets its own
//! continuation task, and the only way display state changes is through
//! those.  Dropping the renderer (or calling [`Renderer::detach`]) severs
//! all of them, after which a late settlement is simply not observed.
use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, watch},
    task::AbortHandle,
};

use crate::{
    bundle::DeferredBundle,
    entry::{EntryState, EntrySubscription},
    error::{ErrorReport, FieldSettlementError},
};

/// Provides the shared descriptions of how fields are displayed.
pub trait Presenter<T>: Send + Sync + 'static {
    type View: Clone + Send + Sync + 'static;

    /// The view for a critical field.
    fn critical(&self, field: &str, value: &T) -> Self::View;

    /// The view for a lazy field that has yet to settle.
    fn placeholder(&self, field: &str) -> Self::View;

    /// The view for a lazy field that settled with a value.
    fn resolved(&self, field: &str, value: &T) -> Self::View;

    /// The generic error view, used for failed fields without an error
    /// renderer of their own.
    fn errored(&self, report: &ErrorReport) -> Self::View;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldPhase {
    Critical,
    Placeholder,
    Resolved,
    Errored,
}

impl FieldPhase {
    /// Whether no further transition can follow this phase.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Placeholder)
    }
}

/// What a single field currently displays.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDisplay<V> {
    pub field: String,
    pub phase: FieldPhase,
    pub view: V,
}

type PlaceholderFn<V> = Arc<dyn Fn() -> V + Send + Sync>;
type ResolvedFn<T, V> = Arc<dyn Fn(&T) -> V + Send + Sync>;
type ErroredFn<V> = Arc<dyn Fn(&FieldSettlementError) -> V + Send + Sync>;

/// Field-specific replacements for the [`Presenter`] descriptions.
pub struct FieldOverride<T, V> {
    placeholder: Option<PlaceholderFn<V>>,
    resolved: Option<ResolvedFn<T, V>>,
    errored: Option<ErroredFn<V>>,
}

impl<T, V> Default for FieldOverride<T, V> {
    fn default() -> Self {
        Self {
            placeholder: None,
            resolved: None,
            errored: None,
        }
    }
}

impl<T, V> Clone for FieldOverride<T, V> {
    fn clone(&self) -> Self {
        Self {
            placeholder: self.placeholder.clone(),
            resolved: self.resolved.clone(),
            errored: self.errored.clone(),
        }
    }
}

impl<T, V> FieldOverride<T, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn placeholder(mut self, f: impl Fn() -> V + Send + Sync + 'static) -> Self {
        self.placeholder = Some(Arc::new(f));
        self
    }

    pub fn resolved(mut self, f: impl Fn(&T) -> V + Send + Sync + 'static) -> Self {
        self.resolved = Some(Arc::new(f));
        self
    }

    /// An error renderer for this field alone.  Whether it gets used is
    /// decided by [`RendererSettings::error_renderer`].
    pub fn errored(
        mut self,
        f: impl Fn(&FieldSettlementError) -> V + Send + Sync + 'static,
    ) -> Self {
        self.errored = Some(Arc::new(f));
        self
    }
}

/// Which error renderer a failed field is displayed with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorRendererSelection {
    /// A field's own error renderer if it has one, else the generic one.
    #[default]
    PerField,
    /// Always the generic error renderer.
    BundleWide,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub error_renderer: ErrorRendererSelection,
    /// Whether error reports carry diagnostic detail in addition to the
    /// message.
    pub include_detail: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            error_renderer: ErrorRendererSelection::default(),
            include_detail: true,
        }
    }
}

/// Everything a [`Renderer`] is configured with besides the presenter.
pub struct RenderOptions<T, V> {
    overrides: BTreeMap<String, FieldOverride<T, V>>,
    settings: RendererSettings,
}

impl<T, V> Default for RenderOptions<T, V> {
    fn default() -> Self {
        Self {
            overrides: BTreeMap::new(),
            settings: RendererSettings::default(),
        }
    }
}

impl<T, V> RenderOptions<T, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: impl Into<String>, field_override: FieldOverride<T, V>) -> Self {
        self.overrides.insert(field.into(), field_override);
        self
    }

    pub fn settings(mut self, settings: RendererSettings) -> Self {
        self.settings = settings;
        self
    }
}

// Everything needed to produce the views of one lazy field.
struct FieldRenderer<T, P: Presenter<T>> {
    field: String,
    presenter: Arc<P>,
    field_override: FieldOverride<T, P::View>,
    settings: RendererSettings,
}

impl<T, P: Presenter<T>> FieldRenderer<T, P> {
    fn placeholder(&self) -> FieldDisplay<P::View> {
        let view = match &self.field_override.placeholder {
            Some(f) => f(),
            None => self.presenter.placeholder(&self.field),
        };
        self.display(FieldPhase::Placeholder, view)
    }

    fn settled(&self, outcome: Result<&T, &FieldSettlementError>) -> FieldDisplay<P::View> {
        match outcome {
            Ok(value) => {
                let view = match &self.field_override.resolved {
                    Some(f) => f(value),
                    None => self.presenter.resolved(&self.field, value),
                };
                self.display(FieldPhase::Resolved, view)
            }
            Err(error) => {
                let custom = match self.settings.error_renderer {
                    ErrorRendererSelection::PerField => self.field_override.errored.as_ref(),
                    ErrorRendererSelection::BundleWide => None,
                };
                let view = match custom {
                    Some(f) => f(error),
                    None => self
                        .presenter
                        .errored(&error.report(self.settings.include_detail)),
                };
                self.display(FieldPhase::Errored, view)
            }
        }
    }

    fn display(&self, phase: FieldPhase, view: P::View) -> FieldDisplay<P::View> {
        FieldDisplay {
            field: self.field.clone(),
            phase,
            view,
        }
    }
}

// The registered continuation for one lazy field; the sole writer of
// that field's display cell.
struct Continuation<T, P: Presenter<T>> {
    renderer: FieldRenderer<T, P>,
    cell: watch::Sender<FieldDisplay<P::View>>,
    updates: mpsc::UnboundedSender<FieldDisplay<P::View>>,
    attached: Arc<RwLock<bool>>,
}

impl<T, P> Continuation<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Presenter<T>,
{
    async fn run(self, subscription: EntrySubscription<T>) {
        let Some(outcome) = subscription.wait().await else {
            return;
        };
        let update = self.renderer.settled(outcome.as_ref());
        self.emit(update);
    }

    fn emit(&self, update: FieldDisplay<P::View>) {
        // detaching takes the write lock, so once it returns nothing can
        // get past this point
        let attached = self.attached.read();
        if !*attached {
            return;
        }
        tracing::trace!(field = %update.field, phase = ?update.phase, "field display updated");
        self.cell.send_replace(update.clone());
        let _ = self.updates.send(update);
    }
}

/// The display state of every field of one [`DeferredBundle`].
pub struct Renderer<V> {
    fields: Vec<(String, watch::Receiver<FieldDisplay<V>>)>,
    updates: Option<mpsc::UnboundedReceiver<FieldDisplay<V>>>,
    attached: Arc<RwLock<bool>>,
    continuations: Vec<AbortHandle>,
}

impl<V> Renderer<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Attach a renderer to the bundle.
    ///
    /// This returns immediately with critical fields displayed, and lazy
    /// fields displayed as placeholders unless they already settled.  A
    /// continuation is spawned onto the current tokio runtime for every
    /// lazy field that is still pending.
    pub fn attach<T, P>(
        bundle: &DeferredBundle<T>,
        presenter: P,
        options: RenderOptions<T, V>,
    ) -> Self
    where
        T: Clone + Send + Sync + 'static,
        P: Presenter<T, View = V>,
    {
        let presenter = Arc::new(presenter);
        let RenderOptions {
            mut overrides,
            settings,
        } = options;
        let attached = Arc::new(RwLock::new(true));
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let mut fields = Vec::new();
        let mut continuations = Vec::new();

        for (field, value) in bundle.critical() {
            let (_, receiver) = watch::channel(FieldDisplay {
                field: field.clone(),
                phase: FieldPhase::Critical,
                view: presenter.critical(field, value),
            });
            fields.push((field.clone(), receiver));
        }

        for (field, entry) in bundle.lazy_entries() {
            let renderer = FieldRenderer {
                field: field.clone(),
                presenter: Arc::clone(&presenter),
                field_override: overrides.remove(field).unwrap_or_default(),
                settings: settings.clone(),
            };
            let initial = match entry.state() {
                EntryState::Pending => None,
                EntryState::Settled(value) => Some(renderer.settled(Ok(&value))),
                EntryState::Failed(error) => Some(renderer.settled(Err(&error))),
            };
            match initial {
                Some(display) => {
                    let (_, receiver) = watch::channel(display);
                    fields.push((field.clone(), receiver));
                }
                None => {
                    let (cell, receiver) = watch::channel(renderer.placeholder());
                    let continuation = Continuation {
                        renderer,
                        cell,
                        updates: updates_tx.clone(),
                        attached: Arc::clone(&attached),
                    };
                    let task = tokio::spawn(continuation.run(entry.subscribe()));
                    continuations.push(task.abort_handle());
                    fields.push((field.clone(), receiver));
                }
            }
        }

        for field in overrides.keys() {
            tracing::warn!(%field, "override given for a field that is not lazy in this bundle");
        }
        tracing::debug!(
            fields = fields.len(),
            continuations = continuations.len(),
            "renderer attached",
        );

        Self {
            fields,
            updates: Some(updates_rx),
            attached,
            continuations,
        }
    }

    /// The current display of a field.
    pub fn display(&self, field: &str) -> Option<FieldDisplay<V>> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, receiver)| receiver.borrow().clone())
    }

    /// The current display of every field, the critical ones first.
    pub fn snapshot(&self) -> Vec<FieldDisplay<V>> {
        self.fields
            .iter()
            .map(|(_, receiver)| receiver.borrow().clone())
            .collect()
    }

    /// A receiver that observes the display of a single field.
    pub fn watch(&self, field: &str) -> Option<watch::Receiver<FieldDisplay<V>>> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, receiver)| receiver.clone())
    }

    /// Take the stream of display transitions.
    ///
    /// Only the swaps from placeholder to a terminal display are sent.
    /// The stream ends once no continuation is left, i.e. when every
    /// observed field has settled or the renderer was detached.  This
    /// can be taken only once.
    pub fn updates(&mut self) -> Option<mpsc::UnboundedReceiver<FieldDisplay<V>>> {
        self.updates.take()
    }

    /// Whether every field shows its final display.
    pub fn is_settled(&self) -> bool {
        self.fields
            .iter()
            .all(|(_, receiver)| receiver.borrow().phase.is_terminal())
    }

    pub fn is_attached(&self) -> bool {
        *self.attached.read()
    }
}

impl<V> Renderer<V> {
    /// Tear down the renderer, no further display update will happen.
    pub fn detach(self) {}

    fn sever(&mut self) {
        {
            let mut attached = self.attached.write();
            if !*attached {
                return;
            }
            *attached = false;
        }
        for continuation in &self.continuations {
            continuation.abort();
        }
        tracing::debug!(
            continuations = self.continuations.len(),
            "renderer detached",
        );
    }
}

impl<V> Drop for Renderer<V> {
    fn drop(&mut self) {
        self.sever();
    }
}

mod debug {
    use super::*;
    use std::fmt;

    impl<V: Clone + fmt::Debug> fmt::Debug for Renderer<V> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Renderer")
                .field(
                    "fields",
                    &self
                        .fields
                        .iter()
                        .map(|(_, receiver)| receiver.borrow().clone())
                        .collect::<Vec<_>>(),
                )
                .field("attached", &*self.attached.read())
                .finish()
        }
    }

    impl<T, V> fmt::Debug for FieldOverride<T, V> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("FieldOverride")
                .field("placeholder", &self.placeholder.is_some())
                .field("resolved", &self.resolved.is_some())
                .field("errored", &self.errored.is_some())
                .finish()
        }
    }

    impl<T, V> fmt::Debug for RenderOptions<T, V> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("RenderOptions")
                .field("overrides", &self.overrides)
                .field("settings", &self.settings)
                .finish()
        }
    }
}
