//! Binding plain async functions to HTTP.
//!
//! [`Binder::bind`] inspects a handler's parameter and return types,
//! rejects shapes it cannot serve, compiles the input decoder once, and
//! returns a [`BoundHandler`] plus a [`Meta`] descriptor.
//!
//! ```rust
//! use rivet::errors::BoxError;
//! use rivet::{bind, In, Input};
//!
//! #[derive(serde::Deserialize, schemars::JsonSchema)]
//! struct Greet {
//!     name: String,
//! }
//!
//! impl Input for Greet {}
//!
//! async fn greet(In(req): In<Greet>) -> Result<String, BoxError> {
//!     Ok(format!("hello, {}", req.name))
//! }
//!
//! let (handler, meta) = bind(greet).unwrap();
//! assert!(meta.input.is_some());
//! assert!(!meta.writer_intercepted);
//! # drop(handler);
//! ```
//!
//! # Request pipeline
//!
//! Every call of a bound handler runs one fixed sequence:
//!
//! 1. **Decode**: extract each parameter in declared order. The first
//!    failure is rendered and ends the request.
//! 2. **Invoke** the handler.
//! 3. **Classify**: an `Err` is rendered and ends the request.
//! 4. **Produce**: a value is negotiated and marshaled; `Ok(())` marshals an
//!    empty object; a writer handler's response is sent as written. If
//!    marshaling fails the partial body is discarded and the failure is
//!    rendered instead.

mod input;
mod param;
mod reply;
mod signature;

use std::any::{type_name, TypeId};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

use bytes::Bytes;
use http_body_util::Full;
use schemars::{schema_for, JsonSchema, Schema};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::BindError;
use crate::errors::Wrapped;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::negotiate::{Negotiator, ERR_NOT_ACCEPTABLE};
use crate::problem::{ErrorRenderer, ProblemRenderer};
use crate::request::Request;
use crate::response::ResponseWriter;

pub use input::{
    Binding, Field, FieldError, FieldKind, In, Input, Location, ERR_MALFORMED_REQUEST, FIELD,
};
pub(crate) use input::read_failure;
pub use param::Param;
pub use reply::Reply;
pub use signature::{OutputKind, ParamKind, Signature};

use reply::Outcome;

// ── Meta ──────────────────────────────────────────────────────────────────────

/// A Rust type seen by the binder.
///
/// `schema` is the type's JSON Schema as it appears on the wire: renamed
/// fields, required vs optional. Documentation generators read it together
/// with `binding`.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeInfo {
    pub name: &'static str,
    pub id: TypeId,
    pub schema: Schema,
    /// Field binding rules. Only set for structured inputs.
    pub binding: Option<Binding>,
}

impl TypeInfo {
    pub fn of<T: JsonSchema + 'static>() -> Self {
        Self {
            name: type_name::<T>(),
            id: TypeId::of::<T>(),
            schema: schema_for!(T),
            binding: None,
        }
    }

    pub fn input<T: Input>() -> Self {
        Self { binding: Some(T::binding()), ..Self::of::<T>() }
    }

    /// Top-level property names as they appear on the wire.
    pub fn fields(&self) -> Vec<&str> {
        self.schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether the wire field `name` must be present.
    pub fn is_required(&self, name: &str) -> bool {
        self.schema
            .get("required")
            .and_then(Value::as_array)
            .is_some_and(|req| req.iter().any(|r| r == name))
    }
}

/// Identifies the bound function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerRef {
    /// Fully-qualified name, e.g. `my_service::users::create`.
    pub name: &'static str,
    pub type_id: TypeId,
}

/// What the binder learned about a handler. Immutable once produced.
#[derive(Clone, Debug)]
pub struct Meta {
    pub input: Option<TypeInfo>,
    pub output: Option<TypeInfo>,
    pub handler: HandlerRef,
    /// The handler takes a [`ResponseWriter`] and writes its own response.
    pub writer_intercepted: bool,
}

// ── Binder ────────────────────────────────────────────────────────────────────

/// Binds handlers against one negotiator and one error renderer.
///
/// Cloning is cheap; clones share configuration.
#[derive(Clone)]
pub struct Binder {
    negotiator: Arc<Negotiator>,
    renderer: Arc<dyn ErrorRenderer>,
}

impl Binder {
    /// JSON and XML responses, RFC 7807 problem errors.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> BinderBuilder {
        BinderBuilder { negotiator: None, renderer: None }
    }

    pub fn negotiator(&self) -> &Negotiator { &self.negotiator }

    pub fn renderer(&self) -> &dyn ErrorRenderer { &*self.renderer }

    /// Validates `handler` and compiles its request pipeline.
    pub fn bind<H, Args>(&self, handler: H) -> Result<(BoundHandler, Meta), BindError>
    where
        H: Handler<Args>,
        Args: 'static,
    {
        let plan = H::plan()?;
        let signature = H::signature();
        signature.validate()?;

        let meta = Meta {
            input: H::input(),
            output: <H::Reply as Reply>::describe(),
            handler: HandlerRef { name: type_name::<H>(), type_id: TypeId::of::<H>() },
            writer_intercepted: signature.controls_writer(),
        };
        debug!(
            handler = meta.handler.name,
            input = meta.input.as_ref().map(|t| t.name),
            output = meta.output.as_ref().map(|t| t.name),
            writer = meta.writer_intercepted,
            "bound handler"
        );

        let pipeline = Pipeline {
            handler,
            plan,
            binder: self.clone(),
            _args: PhantomData::<fn() -> Args>,
        };
        Ok((BoundHandler { inner: Arc::new(pipeline) }, meta))
    }

    /// Renders `err` as the response, discarding anything written before.
    pub(crate) fn fail(&self, err: &(dyn StdError + 'static), req: &Request, w: &ResponseWriter) {
        w.reset();
        self.renderer.render(err, req, w, &self.negotiator);
    }
}

impl Default for Binder {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("supported", &self.negotiator.supported())
            .field("style", &self.negotiator.style())
            .finish_non_exhaustive()
    }
}

/// Binds `handler` with a shared default [`Binder`].
pub fn bind<H, Args>(handler: H) -> Result<(BoundHandler, Meta), BindError>
where
    H: Handler<Args>,
    Args: 'static,
{
    static DEFAULT: LazyLock<Binder> = LazyLock::new(Binder::new);
    DEFAULT.bind(handler)
}

/// Fluent builder for [`Binder`]. Obtain via [`Binder::builder`].
pub struct BinderBuilder {
    negotiator: Option<Negotiator>,
    renderer: Option<Arc<dyn ErrorRenderer>>,
}

impl BinderBuilder {
    pub fn negotiator(mut self, negotiator: Negotiator) -> Self {
        self.negotiator = Some(negotiator);
        self
    }

    pub fn renderer(mut self, renderer: impl ErrorRenderer) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn build(self) -> Binder {
        Binder {
            negotiator: Arc::new(self.negotiator.unwrap_or_default()),
            renderer: self.renderer.unwrap_or_else(|| Arc::new(ProblemRenderer)),
        }
    }
}

// ── Bound handlers ────────────────────────────────────────────────────────────

/// A validated handler with its compiled pipeline. Cheap to clone.
#[derive(Clone)]
pub struct BoundHandler {
    inner: BoxedHandler,
}

impl BoundHandler {
    /// Serves one request. Never fails: every error becomes a response.
    pub fn call(&self, req: Request) -> impl Future<Output = http::Response<Full<Bytes>>> + Send + 'static {
        self.inner.call(req)
    }
}

impl fmt::Debug for BoundHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundHandler").finish_non_exhaustive()
    }
}

struct Pipeline<H, Args>
where
    H: Handler<Args>,
{
    handler: H,
    plan: H::Plan,
    binder: Binder,
    _args: PhantomData<fn() -> Args>,
}

impl<H, Args> ErasedHandler for Pipeline<H, Args>
where
    H: Handler<Args>,
    Args: 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let w = ResponseWriter::new();
        let started = self.handler.invoke(&self.plan, &req, &w);
        let binder = self.binder.clone();

        Box::pin(async move {
            let outcome = match started {
                Ok(fut) => fut.await.into_outcome(),
                Err(err) => Outcome::Failed(err),
            };
            produce(&binder, &req, &w, outcome);
            w.finish()
        })
    }
}

fn produce(binder: &Binder, req: &Request, w: &ResponseWriter, outcome: Outcome) {
    let data = match outcome {
        Outcome::Done => return,
        Outcome::Failed(err) => return binder.fail(&*err, req, w),
        Outcome::Empty => json!({}),
        Outcome::Value(Ok(value)) => value,
        Outcome::Value(Err(err)) => return binder.fail(&late_failure(err), req, w),
    };

    if let Err(err) = binder.negotiator().marshal(req, w, data, None) {
        if err.is_negotiation() {
            binder.fail(&ERR_NOT_ACCEPTABLE.wrap(err), req, w);
        } else {
            binder.fail(&late_failure(err), req, w);
        }
    }
}

fn late_failure(err: impl StdError + Send + Sync + 'static) -> Wrapped {
    Wrapped::new(err, "the call succeeded, but failed to marshal the response")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use http_body_util::BodyExt;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use super::*;
    use crate::errors::{BoxError, Coder};

    #[derive(Deserialize, JsonSchema)]
    struct Greet {
        name: String,
    }

    impl Input for Greet {}

    #[derive(Serialize, JsonSchema)]
    struct Greeting {
        message: String,
    }

    async fn greet(In(g): In<Greet>) -> Result<Greeting, BoxError> {
        Ok(Greeting { message: format!("hi {}", g.name) })
    }

    async fn touch(_: Request) -> Result<(), BoxError> {
        Ok(())
    }

    async fn raw(w: ResponseWriter) {
        w.set_status(http::StatusCode::ACCEPTED);
        let _ = w.write_body(b"raw");
    }

    fn post(body: &'static str, accept: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method("POST").uri("/");
        if let Some(accept) = accept {
            builder = builder.header("accept", accept);
        }
        Request::from_http(builder.body(Bytes::from_static(body.as_bytes())).unwrap(), HashMap::new())
    }

    async fn run(handler: &BoundHandler, req: Request) -> (http::StatusCode, String) {
        let res = handler.call(req).await;
        let status = res.status();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn value_is_enveloped() {
        let (h, meta) = bind(greet).unwrap();
        assert!(meta.input.as_ref().unwrap().name.ends_with("Greet"));
        assert!(meta.output.as_ref().unwrap().name.ends_with("Greeting"));
        assert!(meta.handler.name.ends_with("greet"));

        let (status, body) = run(&h, post(r#"{"name":"x"}"#, None)).await;
        assert_eq!(status, 200);
        let doc: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(doc, json!({"data": {"message": "hi x"}, "error": null, "success": true}));
    }

    #[tokio::test]
    async fn unit_success_is_empty_object() {
        let (h, meta) = bind(touch).unwrap();
        assert!(meta.output.is_none());
        let (status, body) = run(&h, post("", None)).await;
        assert_eq!(status, 200);
        assert!(body.contains(r#""data":{}"#), "{body}");
    }

    #[tokio::test]
    async fn writer_output_is_untouched() {
        let (h, meta) = bind(raw).unwrap();
        assert!(meta.writer_intercepted);
        assert_eq!(run(&h, post("", None)).await, (http::StatusCode::ACCEPTED, "raw".to_owned()));
    }

    #[tokio::test]
    async fn coded_error_sets_status() {
        static GONE: LazyLock<Coder> =
            LazyLock::new(|| Coder::new("GONE").with_http_code(410).with_message("it left"));
        let (h, _) = bind(|| async { Err::<(), _>(GONE.wrap(std::fmt::Error)) }).unwrap();

        let (status, body) = run(&h, post("", None)).await;
        assert_eq!(status, 410);
        assert!(body.contains(r#""type":"GONE""#), "{body}");
        assert!(body.contains(r#""title":"it left""#), "{body}");
    }

    #[tokio::test]
    async fn malformed_input_is_400() {
        let (h, _) = bind(greet).unwrap();
        let (status, body) = run(&h, post("{", None)).await;
        assert_eq!(status, 400);
        assert!(body.contains("BAD_REQUEST"), "{body}");
    }

    #[tokio::test]
    async fn unacceptable_type_is_406_in_default_format() {
        let (h, _) = bind(greet).unwrap();
        let (status, body) = run(&h, post(r#"{"name":"x"}"#, Some("text/csv"))).await;
        assert_eq!(status, 406);
        let doc: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(doc["error"]["type"], "NOT_ACCEPTABLE");
    }

    #[derive(Debug, JsonSchema)]
    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("cannot serialize"))
        }
    }

    #[tokio::test]
    async fn marshal_failure_is_rendered() {
        let (h, _) = bind(|| async { Ok::<_, BoxError>(Unserializable) }).unwrap();
        let (status, body) = run(&h, post("", None)).await;
        assert_eq!(status, 500);
        assert!(body.contains("failed to marshal the response"), "{body}");
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Signup {
        #[serde(rename = "Email")]
        email: String,
        nickname: Option<String>,
    }

    impl Input for Signup {}

    #[test]
    fn meta_describes_json_input_and_output_fields() {
        let signup = |_: In<Signup>| async { Ok::<_, BoxError>(Greeting { message: String::new() }) };
        let (_, meta) = bind(signup).unwrap();

        let input = meta.input.unwrap();
        assert_eq!(input.binding, Some(Binding::Json));
        let mut fields = input.fields();
        fields.sort();
        assert_eq!(fields, ["Email", "nickname"]);
        assert!(input.is_required("Email"));
        assert!(!input.is_required("nickname"));

        let output = meta.output.unwrap();
        assert_eq!(output.binding, None);
        assert_eq!(output.fields(), ["message"]);
        assert!(output.is_required("message"));
    }

    #[test]
    fn rejected_shapes() {
        let err = bind(|_: Request| async {}).unwrap_err();
        assert_eq!(err, BindError::HandlerMustSignalCompletion);

        let err = bind(|_: ResponseWriter| async { Ok::<(), BoxError>(()) }).unwrap_err();
        assert_eq!(err, BindError::AmbiguousResponseOwnership);

        let err = bind(|_: In<Greet>, _: In<Greet>| async { Ok::<(), BoxError>(()) }).unwrap_err();
        assert_eq!(err, BindError::MultipleInputTypes(2));
    }
}
