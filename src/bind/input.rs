//! Structured handler inputs.
//!
//! An input type is a plain `serde` struct. By default the whole request
//! body is decoded as JSON; override [`Input::binding`] to pull individual
//! fields out of the path, the query string and headers instead:
//!
//! ```rust
//! use rivet::{Binding, Field, FieldKind, Input};
//!
//! #[derive(serde::Deserialize, schemars::JsonSchema)]
//! struct ListOrders {
//!     user_id: u64,
//!     #[serde(default)]
//!     status: Vec<String>,
//!     page: Option<u32>,
//!     request_id: Option<String>,
//! }
//!
//! impl Input for ListOrders {
//!     fn binding() -> Binding {
//!         Binding::Fields(vec![
//!             Field::path("user_id").kind(FieldKind::Integer),
//!             Field::query("status").repeated(),
//!             Field::query("page").kind(FieldKind::Integer),
//!             Field::header("request_id").key("x-request-id"),
//!         ])
//!     }
//! }
//! ```

use std::any::type_name;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::LazyLock;

use http::header::HeaderName;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::BindError;
use crate::errors::{Bag, BoxError, Coder, Key, Wrapped};
use crate::request::Request;

/// Wraps decode failures caused by the client: bad JSON, a field that does
/// not coerce, a missing required field, a failed validation rule.
pub static ERR_MALFORMED_REQUEST: LazyLock<Coder> = LazyLock::new(|| {
    Coder::new("BAD_REQUEST")
        .with_http_code(400)
        .with_message("malformed request body")
});

/// Bag key naming the field that failed to decode.
pub const FIELD: Key<String> = Key::new("field");

// ── Input ─────────────────────────────────────────────────────────────────────

/// A type a handler can receive as its structured input, via [`In<T>`].
pub trait Input: DeserializeOwned + JsonSchema + Send + 'static {
    /// Where each field comes from. Defaults to the whole body as JSON.
    fn binding() -> Binding {
        Binding::Json
    }

    /// Runs after decoding. A returned error is reported as a malformed field.
    fn validate(&self) -> Result<(), FieldError> {
        Ok(())
    }
}

/// Handler parameter carrying a decoded [`Input`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct In<T>(pub T);

impl<T> In<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for In<T> {
    type Target = T;
    fn deref(&self) -> &T { &self.0 }
}

impl<T> DerefMut for In<T> {
    fn deref_mut(&mut self) -> &mut T { &mut self.0 }
}

// ── Binding rules ─────────────────────────────────────────────────────────────

/// How an input type is assembled from a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "fields", rename_all = "snake_case")]
pub enum Binding {
    /// Decode the whole body as one JSON document.
    Json,
    /// Assemble the value field by field.
    Fields(Vec<Field>),
}

/// Where a bound field is read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Path,
    Query,
    Header,
    /// The whole body, parsed as JSON.
    Body,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
        })
    }
}

/// The type a raw string is coerced to before deserialization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
}

/// One field binding rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Field {
    name: Cow<'static, str>,
    key: Option<Cow<'static, str>>,
    location: Location,
    kind: FieldKind,
    repeated: bool,
    required: bool,
}

impl Field {
    fn new(name: impl Into<Cow<'static, str>>, location: Location) -> Self {
        Self {
            name: name.into(),
            key: None,
            location,
            kind: FieldKind::String,
            repeated: false,
            required: location == Location::Path,
        }
    }

    /// A path parameter. Always required.
    pub fn path(name: impl Into<Cow<'static, str>>) -> Self { Self::new(name, Location::Path) }
    pub fn query(name: impl Into<Cow<'static, str>>) -> Self { Self::new(name, Location::Query) }
    pub fn header(name: impl Into<Cow<'static, str>>) -> Self { Self::new(name, Location::Header) }
    /// The request body as a JSON value, stored under `name`.
    pub fn body(name: impl Into<Cow<'static, str>>) -> Self { Self::new(name, Location::Body) }

    /// The external name, when it differs from the struct field name.
    pub fn key(mut self, key: impl Into<Cow<'static, str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    /// Collect every occurrence into an array instead of taking the first.
    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn external_key(&self) -> &str { self.key.as_deref().unwrap_or(&self.name) }
    pub fn location(&self) -> Location { self.location }
    pub fn value_kind(&self) -> FieldKind { self.kind }
    pub fn is_repeated(&self) -> bool { self.repeated }
    pub fn is_required(&self) -> bool { self.required }
}

// ── Field errors ──────────────────────────────────────────────────────────────

/// A single field failed coercion or validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field `{field}`: {reason}")]
pub struct FieldError {
    pub field: String,
    pub location: Option<Location>,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), location: None, reason: reason.into() }
    }

    fn at(field: &Field, reason: impl Into<String>) -> Self {
        Self {
            field: field.name().to_owned(),
            location: Some(field.location),
            reason: reason.into(),
        }
    }
}

// ── Compiled decoder ──────────────────────────────────────────────────────────

/// A validated [`Binding`], ready to decode requests. Built once at bind time.
#[doc(hidden)]
#[derive(Debug)]
pub struct InputPlan {
    rules: Rules,
}

#[derive(Debug)]
enum Rules {
    Json,
    Fields(Vec<(Field, Option<HeaderName>)>),
}

impl InputPlan {
    pub(crate) fn compile<T: Input>() -> Result<Self, BindError> {
        let unbindable = |reason: String| BindError::UnbindableInputType {
            type_name: type_name::<T>(),
            reason,
        };

        let fields = match T::binding() {
            Binding::Json => return Ok(Self { rules: Rules::Json }),
            Binding::Fields(fields) => fields,
        };

        let mut seen = HashSet::new();
        let mut bodies = 0;
        let mut rules = Vec::with_capacity(fields.len());
        for field in fields {
            if field.name.is_empty() {
                return Err(unbindable("field with an empty name".to_owned()));
            }
            if !seen.insert(field.name.clone()) {
                return Err(unbindable(format!("field `{}` is bound twice", field.name)));
            }
            let header = match field.location {
                Location::Header => {
                    let name = HeaderName::from_bytes(field.external_key().as_bytes()).map_err(|_| {
                        unbindable(format!("`{}` is not a valid header name", field.external_key()))
                    })?;
                    Some(name)
                }
                Location::Path if field.repeated => {
                    return Err(unbindable(format!("path field `{}` cannot be repeated", field.name)));
                }
                Location::Body => {
                    bodies += 1;
                    if bodies > 1 {
                        return Err(unbindable("only one field may be bound to the body".to_owned()));
                    }
                    None
                }
                _ => None,
            };
            rules.push((field, header));
        }
        Ok(Self { rules: Rules::Fields(rules) })
    }

    pub(crate) fn decode<T: Input>(&self, req: &Request) -> Result<T, BoxError> {
        let value: T = match &self.rules {
            // An absent body binds like `{}`, so all-optional inputs work on GET.
            Rules::Json if req.body().is_empty() => {
                serde_json::from_value(Value::Object(Map::new())).map_err(json_error)?
            }
            Rules::Json => serde_json::from_slice(req.body()).map_err(json_error)?,
            Rules::Fields(rules) => {
                let document = assemble(rules, req).map_err(malformed)?;
                serde_json::from_value(document).map_err(json_error)?
            }
        };
        value.validate().map_err(malformed)?;
        Ok(value)
    }
}

fn assemble(rules: &[(Field, Option<HeaderName>)], req: &Request) -> Result<Value, FieldError> {
    let mut query = None;
    let mut document = Map::new();

    for (field, header) in rules {
        let raw: Vec<Cow<'_, str>> = match field.location {
            Location::Path => req.param(field.external_key()).map(Cow::Borrowed).into_iter().collect(),
            Location::Query => {
                if query.is_none() {
                    let pairs = req
                        .query_pairs()
                        .map_err(|e| FieldError::at(field, format!("malformed query string: {e}")))?;
                    query = Some(pairs);
                }
                query
                    .iter()
                    .flatten()
                    .filter(|(k, _)| k == field.external_key())
                    .map(|(_, v)| Cow::Owned(v.clone()))
                    .collect()
            }
            Location::Header => {
                let Some(name) = header else { continue };
                req.headers()
                    .get_all(name)
                    .iter()
                    .map(|v| v.to_str().map(Cow::Borrowed))
                    .collect::<Result<_, _>>()
                    .map_err(|_| FieldError::at(field, "header value is not valid UTF-8"))?
            }
            Location::Body => {
                if req.body().is_empty() {
                    Vec::new()
                } else {
                    let body: Value = serde_json::from_slice(req.body())
                        .map_err(|e| FieldError::at(field, format!("invalid JSON body: {e}")))?;
                    document.insert(field.name.to_string(), body);
                    continue;
                }
            }
        };

        if raw.is_empty() {
            if field.required {
                return Err(FieldError::at(field, "missing required value"));
            }
            continue;
        }

        let value = if field.repeated {
            let items = raw
                .iter()
                .map(|r| coerce(field, r))
                .collect::<Result<Vec<_>, _>>()?;
            Value::Array(items)
        } else {
            coerce(field, &raw[0])?
        };
        document.insert(field.name.to_string(), value);
    }

    Ok(Value::Object(document))
}

fn coerce(field: &Field, raw: &str) -> Result<Value, FieldError> {
    let trimmed = raw.trim();
    match field.kind {
        FieldKind::String => Ok(Value::String(raw.to_owned())),
        FieldKind::Integer => trimmed
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| trimmed.parse::<u64>().map(Value::from))
            .map_err(|_| FieldError::at(field, format!("expected an integer, got `{raw}`"))),
        FieldKind::Float => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| FieldError::at(field, format!("expected a number, got `{raw}`"))),
        FieldKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Ok(Value::Bool(true)),
            "false" | "0" | "off" | "no" => Ok(Value::Bool(false)),
            _ => Err(FieldError::at(field, format!("expected a boolean, got `{raw}`"))),
        },
    }
}

fn malformed(err: FieldError) -> BoxError {
    let field = err.field.clone();
    Bag::new(ERR_MALFORMED_REQUEST.wrap(err), FIELD, field).into()
}

fn json_error(err: serde_json::Error) -> BoxError {
    ERR_MALFORMED_REQUEST.wrap(err).into()
}

/// The request body could not be read off the connection. Not the
/// client's document, so it is reported as an internal failure.
pub(crate) fn read_failure(err: impl Into<BoxError>) -> Wrapped {
    Wrapped::new(err, "failed to decode request")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;
    use schemars::JsonSchema;
    use serde::Deserialize;

    use super::*;
    use crate::errors::{bag, code};

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Lookup {
        id: u64,
        #[serde(default)]
        tags: Vec<String>,
        verbose: Option<bool>,
        trace: Option<String>,
        ratio: Option<f64>,
    }

    impl Input for Lookup {
        fn binding() -> Binding {
            Binding::Fields(vec![
                Field::path("id").kind(FieldKind::Integer),
                Field::query("tags").key("tag").repeated(),
                Field::query("verbose").kind(FieldKind::Boolean),
                Field::header("trace").key("x-trace"),
                Field::query("ratio").kind(FieldKind::Float),
            ])
        }

        fn validate(&self) -> Result<(), FieldError> {
            if self.id == 0 {
                return Err(FieldError::new("id", "must be positive"));
            }
            Ok(())
        }
    }

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Create {
        name: String,
    }

    impl Input for Create {}

    fn request(uri: &str, id: Option<&str>, body: &'static [u8]) -> Request {
        let req = http::Request::builder()
            .uri(uri)
            .header("x-trace", "t-1")
            .body(Bytes::from_static(body))
            .unwrap();
        let params = id.map(|id| HashMap::from([("id".to_owned(), id.to_owned())])).unwrap_or_default();
        Request::from_http(req, params)
    }

    fn http_code(err: &BoxError) -> Option<u16> {
        code(&**err).map(|c| c.http_code())
    }

    #[test]
    fn decodes_fields_from_every_location() {
        let plan = InputPlan::compile::<Lookup>().unwrap();
        let req = request("/x?tag=a&tag=b&verbose=yes&ratio=0.5", Some("7"), b"");
        let got: Lookup = plan.decode(&req).unwrap();
        assert_eq!(
            got,
            Lookup {
                id: 7,
                tags: vec!["a".into(), "b".into()],
                verbose: Some(true),
                trace: Some("t-1".into()),
                ratio: Some(0.5),
            }
        );
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let plan = InputPlan::compile::<Lookup>().unwrap();
        let got: Lookup = plan.decode(&request("/x", Some("1"), b"")).unwrap();
        assert_eq!(got.tags, Vec::<String>::new());
        assert_eq!(got.verbose, None);
    }

    #[test]
    fn coercion_failure_is_malformed_with_field() {
        let plan = InputPlan::compile::<Lookup>().unwrap();
        let err = plan.decode::<Lookup>(&request("/x", Some("abc"), b"")).unwrap_err();
        assert_eq!(http_code(&err), Some(400));
        assert_eq!(bag::get(&*err, FIELD).map(String::as_str), Some("id"));
    }

    #[test]
    fn missing_path_param_is_malformed() {
        let plan = InputPlan::compile::<Lookup>().unwrap();
        let err = plan.decode::<Lookup>(&request("/x", None, b"")).unwrap_err();
        assert_eq!(http_code(&err), Some(400));
        assert!(err.to_string().contains("missing required value"));
    }

    #[test]
    fn validation_failure_is_malformed() {
        let plan = InputPlan::compile::<Lookup>().unwrap();
        let err = plan.decode::<Lookup>(&request("/x", Some("0"), b"")).unwrap_err();
        assert_eq!(http_code(&err), Some(400));
        assert_eq!(err.to_string(), "field `id`: must be positive");
    }

    #[test]
    fn json_body() {
        let plan = InputPlan::compile::<Create>().unwrap();
        let got: Create = plan.decode(&request("/", None, br#"{"name":"x"}"#)).unwrap();
        assert_eq!(got, Create { name: "x".into() });

        let err = plan.decode::<Create>(&request("/", None, b"{not json")).unwrap_err();
        assert_eq!(http_code(&err), Some(400));
    }

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Search {
        q: Option<String>,
        limit: Option<u32>,
    }

    impl Input for Search {}

    #[test]
    fn empty_json_body_binds_as_empty_object() {
        let plan = InputPlan::compile::<Search>().unwrap();
        let got: Search = plan.decode(&request("/", None, b"")).unwrap();
        assert_eq!(got, Search { q: None, limit: None });

        let plan = InputPlan::compile::<Create>().unwrap();
        let err = plan.decode::<Create>(&request("/", None, b"")).unwrap_err();
        assert_eq!(http_code(&err), Some(400));
        assert!(err.to_string().contains("missing field `name`"), "{err}");
    }

    #[test]
    fn read_failure_is_not_a_client_error() {
        let err: BoxError = read_failure(std::io::Error::other("connection reset")).into();
        assert_eq!(http_code(&err), None);
        assert_eq!(err.to_string(), "failed to decode request: connection reset");
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Broken {
        a: String,
    }

    impl Input for Broken {
        fn binding() -> Binding {
            Binding::Fields(vec![Field::query("a"), Field::header("a")])
        }
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct BadHeader {
        a: String,
    }

    impl Input for BadHeader {
        fn binding() -> Binding {
            Binding::Fields(vec![Field::header("a").key("not a header")])
        }
    }

    #[test]
    fn bind_time_rejections() {
        let err = InputPlan::compile::<Broken>().unwrap_err();
        assert!(matches!(err, BindError::UnbindableInputType { ref reason, .. } if reason.contains("bound twice")));

        let err = InputPlan::compile::<BadHeader>().unwrap_err();
        assert!(matches!(err, BindError::UnbindableInputType { ref reason, .. } if reason.contains("header name")));
    }
}
