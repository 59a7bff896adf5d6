//! Structured errors: coded templates, typed details and chain annotations.
//!
//! Everything here is a plain [`std::error::Error`] with `source()` chaining,
//! so `?`, `Box<dyn Error>` and any chain-walking code keep working. The
//! pieces:
//!
//! - [`Coder`]: an immutable error template (type tag, HTTP status, user
//!   message). [`Coder::wrap`] turns a cause into a [`Coded`] error.
//! - [`CoderDetailer`]: a [`Coder`] that also attaches a typed detail value.
//! - [`bag`]: typed key/value pairs stacked on a cause chain.
//! - [`Wrapped`]: a cause with a context message, the `"msg: cause"` kind.
//!
//! ```rust
//! use std::sync::LazyLock;
//! use rivet::errors::{self, Coder};
//!
//! static NOT_FOUND: LazyLock<Coder> = LazyLock::new(|| {
//!     Coder::new("NOT_FOUND").with_http_code(404).with_message("user not found")
//! });
//!
//! let err: errors::BoxError = NOT_FOUND.wrap(std::io::Error::other("no row")).into();
//! let coded = errors::code(&*err).unwrap();
//! assert_eq!(coded.http_code(), 404);
//! assert_eq!(coded.kind(), "NOT_FOUND");
//! ```

pub mod bag;
mod coder;
mod detailer;

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

pub use bag::{Bag, Key};
pub use coder::{code, Coded, Coder};
pub use detailer::CoderDetailer;

/// The error type handlers return and the pipeline renders.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Iterates an error chain from the outermost error to the root cause.
pub fn chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |e: &&'a (dyn StdError + 'static)| (*e).source())
}

// ── Wrapped ───────────────────────────────────────────────────────────────────

/// A cause annotated with a context message.
///
/// Displays as `"{message}: {cause}"`.
#[derive(Debug)]
pub struct Wrapped {
    message: Cow<'static, str>,
    cause: BoxError,
}

impl Wrapped {
    pub fn new(cause: impl Into<BoxError>, message: impl Into<Cow<'static, str>>) -> Self {
        Self { message: message.into(), cause: cause.into() }
    }

    pub fn message(&self) -> &str { &self.message }

    pub fn into_cause(self) -> BoxError { self.cause }
}

impl fmt::Display for Wrapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.message, self.cause)
    }
}

impl StdError for Wrapped {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.cause)
    }
}

// ── Result extensions ─────────────────────────────────────────────────────────

/// Annotation helpers on `Result`.
///
/// An `Ok` value passes through untouched; only errors get wrapped.
pub trait ResultExt<T> {
    /// Attaches a key/value pair to the error. See [`bag`].
    fn with_bag<V>(self, key: Key<V>, value: V) -> Result<T, BoxError>
    where
        V: serde::Serialize + fmt::Debug + Send + Sync + 'static;

    /// Wraps the error with a context message.
    fn context(self, message: impl Into<Cow<'static, str>>) -> Result<T, BoxError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<BoxError>,
{
    fn with_bag<V>(self, key: Key<V>, value: V) -> Result<T, BoxError>
    where
        V: serde::Serialize + fmt::Debug + Send + Sync + 'static,
    {
        self.map_err(|e| Bag::new(e, key, value).into())
    }

    fn context(self, message: impl Into<Cow<'static, str>>) -> Result<T, BoxError> {
        self.map_err(|e| Wrapped::new(e, message).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_walks_outside_in() {
        let err: BoxError = Wrapped::new(Wrapped::new(std::io::Error::other("root"), "inner"), "outer").into();
        let texts: Vec<String> = chain(&*err).map(|e| e.to_string()).collect();
        assert_eq!(texts, ["outer: inner: root", "inner: root", "root"]);
    }

    #[test]
    fn context_keeps_ok() {
        let res: Result<&str, std::io::Error> = Ok("fine");
        assert_eq!(res.context("reading config").unwrap(), "fine");
    }

    #[test]
    fn context_wraps_err() {
        let res: Result<(), std::io::Error> = Err(std::io::Error::other("eof"));
        assert_eq!(res.context("reading config").unwrap_err().to_string(), "reading config: eof");
    }
}
