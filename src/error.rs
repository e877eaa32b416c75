//! Errors produced while building and settling a [`DeferredBundle`](
//! crate::DeferredBundle).
//!
//! The two failure modes differ in reach: a
//! [`BundleConstructionError`] means no bundle exists at all, while a
//! [`FieldSettlementError`] is plain data that belongs to exactly one lazy
//! field and is only ever handed to that field's observers.
use std::{error::Error as StdError, fmt::Write as _, sync::Arc};

use thiserror::Error;

/// The error type accepted from caller-provided computations.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure to produce a bundle.
#[derive(Debug, Error)]
pub enum BundleConstructionError {
    /// A critical field's computation failed, so the whole response failed.
    #[error("critical field `{field}` failed: {source}")]
    Critical {
        field: String,
        #[source]
        source: BoxError,
    },
    /// The same field name was declared more than once.
    #[error("field `{field}` was declared more than once")]
    DuplicateField { field: String },
}

impl BundleConstructionError {
    /// The field responsible for the failure.
    pub fn field(&self) -> &str {
        match self {
            Self::Critical { field, .. } | Self::DuplicateField { field } => field,
        }
    }
}

/// The terminal failure of a single lazy field.
///
/// This is cheap to clone as every observer of the field receives a copy.
#[derive(Clone, Debug, Error)]
pub enum FieldSettlementError {
    /// The underlying computation returned an error.
    #[error("deferred field `{field}` failed: {source}")]
    Failed {
        field: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync + 'static>,
    },
    /// The task producing the field went away without settling it.
    #[error("deferred field `{field}` was abandoned before it settled")]
    Abandoned { field: String },
}

impl FieldSettlementError {
    pub(crate) fn failed(field: &str, source: BoxError) -> Self {
        Self::Failed {
            field: field.to_string(),
            source: Arc::from(source),
        }
    }

    pub(crate) fn abandoned(field: &str) -> Self {
        Self::Abandoned {
            field: field.to_string(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Failed { field, .. } | Self::Abandoned { field } => field,
        }
    }

    /// The message of the underlying error, without the field prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Failed { source, .. } => source.to_string(),
            Self::Abandoned { .. } => "the computation ended without a result".to_string(),
        }
    }

    /// Diagnostic detail: the debug form of the underlying error followed
    /// by its chain of causes.
    pub fn detail(&self) -> String {
        let Self::Failed { source, .. } = self else {
            return format!("{self:?}");
        };
        let mut detail = format!("{source:?}");
        let mut cause = source.source();
        while let Some(err) = cause {
            let _ = write!(detail, "\ncaused by: {err}");
            cause = err.source();
        }
        detail
    }

    /// Produce the report handed to generic error renderers.
    pub fn report(&self, include_detail: bool) -> ErrorReport {
        ErrorReport {
            field: self.field().to_string(),
            message: self.message(),
            detail: include_detail.then(|| self.detail()),
        }
    }
}

/// What a generic error renderer gets to show for a failed field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorReport {
    pub field: String,
    pub message: String,
    pub detail: Option<String>,
}
