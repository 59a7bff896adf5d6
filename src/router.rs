//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. Handlers are bound as
//! they are registered; a handler that cannot be bound is recorded and
//! stops [`Server::serve`](crate::Server::serve) from starting.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::LazyLock;

use bytes::Bytes;
use http::Method;
use http_body_util::Full;
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::bind::{Binder, BoundHandler, Meta};
use crate::error::Error;
use crate::errors::Coder;
use crate::handler::Handler;
use crate::request::Request;
use crate::response::ResponseWriter;

/// Rendered when no route matches the request.
pub static ERR_ROUTE_NOT_FOUND: LazyLock<Coder> = LazyLock::new(|| {
    Coder::new("ROUTE_NOT_FOUND")
        .with_http_code(404)
        .with_message("no route matches the request")
});

#[derive(Debug, thiserror::Error)]
#[error("no route for {method} {path}")]
struct NoRoute {
    method: Method,
    path: String,
}

/// A registered route and what the binder learned about its handler.
#[derive(Clone, Debug)]
pub struct HandlerDesc {
    pub method: Method,
    pub path: String,
    pub meta: Meta,
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Each [`Router::on`] call returns `self` so registrations chain naturally.
pub struct Router {
    binder: Binder,
    routes: HashMap<Method, MatchitRouter<BoundHandler>>,
    handlers: Vec<HandlerDesc>,
    error: Option<Error>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_binder(Binder::new())
    }

    /// A router binding every handler with `binder`.
    pub fn with_binder(binder: Binder) -> Self {
        Self {
            binder,
            routes: HashMap::new(),
            handlers: Vec::new(),
            error: None,
        }
    }

    /// Binds `handler` and registers it for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax and are available to
    /// [`Field::path`](crate::Field::path) bindings and [`Request::param`]:
    ///
    /// ```rust
    /// # use rivet::errors::BoxError;
    /// # use rivet::{Request, Router};
    /// # async fn get_user(_: Request) -> Result<String, BoxError> { Ok(String::new()) }
    /// # async fn delete_user(_: Request) -> Result<(), BoxError> { Ok(()) }
    /// let router = Router::new()
    ///     .on(http::Method::GET,    "/users/{id}", get_user)
    ///     .on(http::Method::DELETE, "/users/{id}", delete_user);
    /// assert!(router.check().is_ok());
    /// assert_eq!(router.handlers().len(), 2);
    /// ```
    ///
    /// Only the first failure is kept; later registrations are skipped.
    pub fn on<H, Args>(mut self, method: Method, path: &str, handler: H) -> Self
    where
        H: Handler<Args>,
        Args: 'static,
    {
        if self.error.is_some() {
            return self;
        }

        let (bound, meta) = match self.binder.bind(handler) {
            Ok(bound) => bound,
            Err(source) => {
                self.error = Some(Error::Bind { method, path: path.to_owned(), source });
                return self;
            }
        };

        if let Err(source) = self.routes.entry(method.clone()).or_default().insert(path, bound) {
            self.error = Some(Error::Route { path: path.to_owned(), source });
            return self;
        }

        self.handlers.push(HandlerDesc { method, path: path.to_owned(), meta });
        self
    }

    /// Every successfully registered route, in registration order.
    pub fn handlers(&self) -> &[HandlerDesc] { &self.handlers }

    /// The first registration failure, if any.
    pub fn check(&self) -> Result<(), &Error> {
        self.error.as_ref().map_or(Ok(()), Err)
    }

    pub fn binder(&self) -> &Binder { &self.binder }

    pub(crate) fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    /// Routes and serves one request whose body has been collected.
    pub async fn handle(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        match self.lookup(req.method(), req.uri().path()) {
            Some((handler, params)) => handler.call(Request::from_http(req, params)).await,
            None => {
                debug!(method = %req.method(), path = req.uri().path(), "route not found");
                let miss = NoRoute { method: req.method().clone(), path: req.uri().path().to_owned() };
                self.reject(req, &ERR_ROUTE_NOT_FOUND.wrap(miss))
            }
        }
    }

    /// Answers `req` with `err` rendered as a problem, without routing it.
    pub(crate) fn reject(
        &self,
        req: http::Request<Bytes>,
        err: &(dyn StdError + 'static),
    ) -> http::Response<Full<Bytes>> {
        let req = Request::from_http(req, HashMap::new());
        let w = ResponseWriter::new();
        self.binder.fail(err, &req, &w);
        w.finish()
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoundHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = matched.value.clone();
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
