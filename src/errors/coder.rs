use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;

use super::{chain, BoxError};

// ── Coder ─────────────────────────────────────────────────────────────────────

/// An immutable error template: type tag, HTTP status and user message.
///
/// Every `with_*` call returns a new `Coder`; the receiver is never touched.
/// That makes a `static` coder safe to share and to specialise from many
/// threads at once:
///
/// ```rust
/// use rivet::errors::Coder;
///
/// let base = Coder::new("VALIDATION").with_http_code(422);
/// let email = base.clone().with_message("email is invalid");
/// assert_eq!(base.message(), "");
/// assert_eq!(email.message(), "email is invalid");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coder {
    kind: Cow<'static, str>,
    http_code: u16,
    message: Cow<'static, str>,
}

impl Coder {
    /// A template with the given type tag, HTTP 500 and no message.
    pub const fn new(kind: &'static str) -> Self {
        Self {
            kind: Cow::Borrowed(kind),
            http_code: 500,
            message: Cow::Borrowed(""),
        }
    }

    pub fn with_type(&self, kind: impl Into<Cow<'static, str>>) -> Self {
        Self { kind: kind.into(), ..self.clone() }
    }

    pub fn with_message(&self, message: impl Into<Cow<'static, str>>) -> Self {
        Self { message: message.into(), ..self.clone() }
    }

    /// `format!`-style variant of [`with_message`](Self::with_message).
    pub fn with_message_fmt(&self, args: fmt::Arguments<'_>) -> Self {
        self.with_message(args.to_string())
    }

    pub fn with_http_code(&self, http_code: u16) -> Self {
        Self { http_code, ..self.clone() }
    }

    pub fn kind(&self) -> &str { &self.kind }

    pub fn http_code(&self) -> u16 { self.http_code }

    pub fn message(&self) -> &str { &self.message }

    /// Enriches `cause` with this template.
    pub fn wrap(&self, cause: impl Into<BoxError>) -> Coded {
        Coded {
            kind: self.kind.clone(),
            http_code: self.http_code,
            message: self.message.clone(),
            cause: cause.into(),
        }
    }

    /// Whether any [`Coded`] on `err`'s chain was produced by this template.
    pub fn matches(&self, err: &(dyn StdError + 'static)) -> bool {
        chain(err)
            .filter_map(|e| e.downcast_ref::<Coded>())
            .any(|c| c.kind == self.kind && c.http_code == self.http_code && c.message == self.message)
    }
}

impl fmt::Display for Coder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

// ── Coded ─────────────────────────────────────────────────────────────────────

/// An error enriched by a [`Coder`].
///
/// `Display` is the cause's text; the user-facing text is [`message`](Self::message).
#[derive(Debug)]
pub struct Coded {
    kind: Cow<'static, str>,
    http_code: u16,
    message: Cow<'static, str>,
    cause: BoxError,
}

impl Coded {
    /// The HTTP status. Out-of-range codes read as 500.
    pub fn http_code(&self) -> u16 {
        match StatusCode::from_u16(self.http_code) {
            Ok(_) => self.http_code,
            Err(_) => 500,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.http_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn kind(&self) -> &str { &self.kind }

    /// The user message composed with every coded error underneath it,
    /// outermost first: `"outer: inner: innermost"`. Empty parts are skipped.
    pub fn message(&self) -> String {
        let inner = chain(&*self.cause)
            .filter_map(|e| e.downcast_ref::<Coded>())
            .next()
            .map(Coded::message)
            .unwrap_or_default();

        match (self.message.is_empty(), inner.is_empty()) {
            (_, true) => self.message.to_string(),
            (true, false) => inner,
            (false, false) => format!("{}: {inner}", self.message),
        }
    }

    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) { &*self.cause }

    pub fn into_cause(self) -> BoxError { self.cause }
}

impl fmt::Display for Coded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.cause, f)
    }
}

impl StdError for Coded {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.cause)
    }
}

/// Finds the outermost [`Coded`] on `err`'s chain.
pub fn code<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a Coded> {
    chain(err).find_map(|e| e.downcast_ref::<Coded>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Wrapped;

    fn not_found() -> Coder {
        Coder::new("NOT_FOUND").with_http_code(404).with_message("user not found")
    }

    #[test]
    fn defaults() {
        let c = Coder::new("INTERNAL");
        assert_eq!(c.http_code(), 500);
        assert_eq!(c.message(), "");
        assert_eq!(c.to_string(), "INTERNAL: ");
    }

    #[test]
    fn with_methods_copy() {
        let base = not_found();
        let renamed = base.with_type("GONE").with_http_code(410);
        assert_eq!(base.kind(), "NOT_FOUND");
        assert_eq!(base.http_code(), 404);
        assert_eq!(renamed.kind(), "GONE");
        assert_eq!(renamed.message(), "user not found");
    }

    #[test]
    fn message_fmt() {
        let c = Coder::new("LIMIT").with_message_fmt(format_args!("at most {} items", 10));
        assert_eq!(c.message(), "at most 10 items");
    }

    #[test]
    fn wrap_keeps_cause() {
        let coded = not_found().wrap(std::io::Error::new(std::io::ErrorKind::NotFound, "no row"));
        assert_eq!(coded.to_string(), "no row");
        let cause = coded.into_cause();
        let io = cause.downcast::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn code_finds_template_fields() {
        let err: BoxError = Wrapped::new(not_found().wrap(std::io::Error::other("no row")), "loading user").into();
        let coded = code(&*err).unwrap();
        assert_eq!(coded.http_code(), 404);
        assert_eq!(coded.kind(), "NOT_FOUND");
        assert_eq!(coded.message(), "user not found");
    }

    #[test]
    fn nested_messages_compose_outermost_first() {
        let inner = not_found().wrap(std::io::Error::other("no row"));
        let outer = Coder::new("PROFILE_UNAVAILABLE").with_http_code(503).with_message("profile unavailable");
        let err: BoxError = outer.wrap(inner).into();

        let coded = code(&*err).unwrap();
        assert_eq!(coded.kind(), "PROFILE_UNAVAILABLE");
        assert_eq!(coded.http_code(), 503);
        assert_eq!(coded.message(), "profile unavailable: user not found");
    }

    #[test]
    fn empty_outer_message_is_skipped() {
        let err = Coder::new("WRAP").wrap(not_found().wrap(std::io::Error::other("x")));
        assert_eq!(err.message(), "user not found");
    }

    #[test]
    fn out_of_range_status_reads_as_500() {
        let err = Coder::new("ODD").with_http_code(1000).wrap(std::io::Error::other("x"));
        assert_eq!(err.http_code(), 500);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn matches_template() {
        let err: BoxError = not_found().wrap(std::io::Error::other("x")).into();
        assert!(not_found().matches(&*err));
        assert!(!not_found().with_http_code(410).matches(&*err));
    }
}
