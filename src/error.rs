//! Startup and infrastructure errors.

use crate::bind::OutputKind;
use crate::closer::CloseError;

/// The error type returned by rivet's fallible setup operations.
///
/// Request-time failures are not `Error`s: they are rendered into problem
/// responses by the pipeline. This type surfaces what stops a service from
/// starting: a handler that cannot be bound, or a listener that cannot be
/// opened. It also reports close actions that failed during shutdown.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("when binding HTTP handler {method} {path}: {source}")]
    Bind {
        method: http::Method,
        path: String,
        #[source]
        source: BindError,
    },

    #[error("invalid route `{path}`: {source}")]
    Route {
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("shutdown: {0}")]
    Close(#[from] CloseError),
}

/// Why a handler was rejected at bind time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("handler should accept at most 3 parameters, it accepts {0}")]
    TooManyParameters(usize),

    #[error("handler accepts {0} structured input types, at most one is allowed")]
    MultipleInputTypes(usize),

    #[error("cannot bind input type `{type_name}`: {reason}")]
    UnbindableInputType {
        type_name: &'static str,
        reason: String,
    },

    #[error("handler should return (), Result<(), E> or Result<T, E>; its outputs are {0:?}")]
    InvalidReturnShape(Vec<OutputKind>),

    #[error("handler should return an error if it doesn't accept the response writer")]
    HandlerMustSignalCompletion,

    #[error("handler should not return anything if it controls the response writer directly")]
    AmbiguousResponseOwnership,
}
