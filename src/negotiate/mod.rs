//! Content negotiation and response marshaling.
//!
//! A [`Negotiator`] owns a table of MIME type → [`Marshaler`] plus one
//! default marshaler. For every response it reads the request's `Accept`
//! header, picks a marshaler, shapes the document according to its
//! [`ResponseStyle`], and writes it.
//!
//! ```rust
//! use rivet::negotiate::{Json, Negotiator, ResponseStyle, Xml};
//!
//! let negotiator = Negotiator::builder(Json)
//!     .register("application/json", Json)
//!     .register("application/xml", Xml)
//!     .style(ResponseStyle::Direct)
//!     .build();
//! assert_eq!(negotiator.supported(), ["application/json", "application/xml"]);
//! ```

pub mod accept;

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, LazyLock};

use serde_json::{json, Value};

use crate::errors::Coder;
use crate::request::Request;
use crate::response::ResponseWriter;

use self::accept::{AcceptError, Selection};

// ── Marshalers ────────────────────────────────────────────────────────────────

/// Encodes a document in one concrete format.
pub trait Marshaler: Send + Sync + 'static {
    /// The `content-type` header value written alongside the body.
    fn content_type(&self) -> &'static str;

    fn marshal(&self, value: &Value, out: &mut dyn io::Write) -> Result<(), MarshalError>;
}

/// `application/json` via `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Json;

impl Marshaler for Json {
    fn content_type(&self) -> &'static str { "application/json" }

    fn marshal(&self, value: &Value, out: &mut dyn io::Write) -> Result<(), MarshalError> {
        serde_json::to_writer(out, value).map_err(MarshalError::Json)
    }
}

/// `application/xml` via `quick-xml`, wrapped in a `<response>` root.
#[derive(Clone, Copy, Debug, Default)]
pub struct Xml;

impl Marshaler for Xml {
    fn content_type(&self) -> &'static str { "application/xml" }

    fn marshal(&self, value: &Value, out: &mut dyn io::Write) -> Result<(), MarshalError> {
        let text = quick_xml::se::to_string_with_root("response", value)
            .map_err(|e| MarshalError::Xml(e.to_string()))?;
        out.write_all(text.as_bytes())?;
        Ok(())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Wraps [`MarshalError::NegotiationFailed`] when it reaches the client.
pub static ERR_NOT_ACCEPTABLE: LazyLock<Coder> = LazyLock::new(|| {
    Coder::new("NOT_ACCEPTABLE")
        .with_http_code(406)
        .with_message("none of the accepted content types can be produced")
});

#[derive(Debug, thiserror::Error)]
pub enum MarshalError {
    /// The client's `Accept` header cannot be satisfied.
    #[error("failed to negotiate content type for `{accept}` (supported: {})", .supported.join(", "))]
    NegotiationFailed {
        accept: String,
        supported: Vec<String>,
        #[source]
        reason: Option<AcceptError>,
    },
    #[error("json: {0}")]
    Json(#[source] serde_json::Error),
    #[error("xml: {0}")]
    Xml(String),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl MarshalError {
    pub fn is_negotiation(&self) -> bool {
        matches!(self, Self::NegotiationFailed { .. })
    }
}

// ── Response style ────────────────────────────────────────────────────────────

/// How documents are shaped before marshaling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseStyle {
    /// Every body is `{"data": …, "error": …, "success": bool}`.
    #[default]
    Envelope,
    /// Success bodies are the value itself; error bodies are the problem.
    Direct,
}

impl ResponseStyle {
    pub fn document(self, data: Value, error: Option<Value>) -> Value {
        match self {
            Self::Envelope => {
                let success = error.is_none();
                json!({ "data": data, "error": error, "success": success })
            }
            Self::Direct => error.unwrap_or(data),
        }
    }
}

// ── Negotiator ────────────────────────────────────────────────────────────────

/// Picks a [`Marshaler`] per request from the `Accept` header.
///
/// Immutable once built; share it behind an `Arc`.
pub struct Negotiator {
    marshalers: HashMap<String, Arc<dyn Marshaler>>,
    known: Vec<String>,
    default: Arc<dyn Marshaler>,
    style: ResponseStyle,
}

impl Negotiator {
    pub fn builder(default: impl Marshaler) -> NegotiatorBuilder {
        NegotiatorBuilder {
            marshalers: Vec::new(),
            default: Arc::new(default),
            style: ResponseStyle::default(),
        }
    }

    /// Registered MIME types, in registration order.
    pub fn supported(&self) -> &[String] { &self.known }

    pub fn style(&self) -> ResponseStyle { self.style }

    /// Chooses the marshaler for `req`.
    ///
    /// # Panics
    ///
    /// Panics if negotiation lands on a type with no registered marshaler.
    /// The table and the known list are built together, so this means the
    /// negotiator itself is broken, not the request.
    pub fn select(&self, req: &Request) -> Result<&dyn Marshaler, MarshalError> {
        let header = req.header("accept").map(str::trim).unwrap_or_default();
        if header.is_empty() || header == "*/*" {
            return Ok(&*self.default);
        }

        let failed = |reason| MarshalError::NegotiationFailed {
            accept: header.to_owned(),
            supported: self.known.clone(),
            reason,
        };

        let ranges = accept::parse(header).map_err(|e| failed(Some(e)))?;
        match accept::select(&ranges, &self.known, self.default.content_type()) {
            Some(Selection::Wildcard) => Ok(&*self.default),
            Some(Selection::Exact(mime)) => match self.marshalers.get(mime) {
                Some(m) => Ok(&**m),
                None => panic!("no marshaler registered for negotiated type `{mime}`"),
            },
            None => Err(failed(None)),
        }
    }

    /// Negotiates, shapes and writes one document.
    ///
    /// Nothing is written to `w` unless encoding succeeds.
    pub fn marshal(
        &self,
        req: &Request,
        w: &ResponseWriter,
        data: Value,
        error: Option<Value>,
    ) -> Result<(), MarshalError> {
        let marshaler = self.select(req)?;
        self.write_with(marshaler, w, data, error)
    }

    /// Like [`marshal`](Self::marshal), skipping negotiation.
    pub fn marshal_default(
        &self,
        w: &ResponseWriter,
        data: Value,
        error: Option<Value>,
    ) -> Result<(), MarshalError> {
        self.write_with(&*self.default, w, data, error)
    }

    fn write_with(
        &self,
        marshaler: &dyn Marshaler,
        w: &ResponseWriter,
        data: Value,
        error: Option<Value>,
    ) -> Result<(), MarshalError> {
        let document = self.style.document(data, error);
        let mut body = Vec::new();
        marshaler.marshal(&document, &mut body)?;

        w.set_content_type(marshaler.content_type());
        w.write_body(&body)?;
        Ok(())
    }
}

/// JSON and XML, JSON by default, enveloped responses.
impl Default for Negotiator {
    fn default() -> Self {
        Self::builder(Json)
            .register("application/json", Json)
            .register("application/xml", Xml)
            .build()
    }
}

/// Fluent builder for [`Negotiator`]. Obtain via [`Negotiator::builder`].
pub struct NegotiatorBuilder {
    marshalers: Vec<(String, Arc<dyn Marshaler>)>,
    default: Arc<dyn Marshaler>,
    style: ResponseStyle,
}

impl NegotiatorBuilder {
    /// Maps `mime` to `marshaler`. Registering the same type again replaces it.
    pub fn register(mut self, mime: &str, marshaler: impl Marshaler) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        self.marshalers.retain(|(known, _)| *known != mime);
        self.marshalers.push((mime, Arc::new(marshaler)));
        self
    }

    pub fn style(mut self, style: ResponseStyle) -> Self {
        self.style = style;
        self
    }

    pub fn build(self) -> Negotiator {
        let known = self.marshalers.iter().map(|(mime, _)| mime.clone()).collect();
        Negotiator {
            marshalers: self.marshalers.into_iter().collect(),
            known,
            default: self.default,
            style: self.style,
        }
    }
}
