//! # rivet
//!
//! Bind plain async functions to HTTP. Write the business function, rivet
//! does the plumbing around it.
//!
//! ## The contract
//!
//! A handler is an `async fn` with up to three parameters, each one of:
//!
//! - [`Request`]: the in-flight request, body already buffered;
//! - [`In<T>`]: a structured input decoded from the request, at most one;
//! - [`ResponseWriter`]: the handler writes its own response.
//!
//! It returns `Result<T, E>` (a value to marshal), `Result<(), E>` (an empty
//! success), or `()` when it took the writer. Everything else is rejected
//! when the handler is bound, before the server starts, never per request.
//!
//! What rivet does around the call:
//!
//! - **Decoding**: JSON bodies, or per-field path/query/header bindings,
//!   with client mistakes reported as `400 BAD_REQUEST`
//! - **Negotiation**: JSON or XML per the `Accept` header, envelope or direct
//!   documents
//! - **Errors**: [`errors::Coder`] templates carry the status, type tag and
//!   message; [`errors::Bag`] annotations become problem `extensions`
//! - **Serving**: radix-tree routing, HTTP/1.1 and HTTP/2, graceful shutdown
//!   that drains connections and then runs the [`closer`]
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::LazyLock;
//!
//! use rivet::errors::{BoxError, Coder};
//! use rivet::{Binding, Field, FieldKind, In, Input, Router, Server};
//!
//! static USER_NOT_FOUND: LazyLock<Coder> = LazyLock::new(|| {
//!     Coder::new("USER_NOT_FOUND").with_http_code(404).with_message("no such user")
//! });
//!
//! #[derive(serde::Deserialize, schemars::JsonSchema)]
//! struct GetUser {
//!     id: u64,
//! }
//!
//! impl Input for GetUser {
//!     fn binding() -> Binding {
//!         Binding::Fields(vec![Field::path("id").kind(FieldKind::Integer)])
//!     }
//! }
//!
//! #[derive(serde::Serialize, schemars::JsonSchema)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! async fn get_user(In(req): In<GetUser>) -> Result<User, BoxError> {
//!     if req.id != 1 {
//!         return Err(USER_NOT_FOUND.wrap(format!("user {} is not in the table", req.id)).into());
//!     }
//!     Ok(User { id: 1, name: "ada".into() })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rivet::Error> {
//!     let app = Router::new().on(http::Method::GET, "/users/{id}", get_user);
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//! ```

pub mod bind;
pub mod closer;
mod error;
pub mod errors;
mod handler;
pub mod negotiate;
pub mod problem;
mod request;
mod response;
mod router;
mod server;

pub use bind::{
    bind, Binder, BinderBuilder, Binding, BoundHandler, Field, FieldError, FieldKind, HandlerRef,
    In, Input, Location, Meta, OutputKind, Param, ParamKind, Reply, Signature, TypeInfo,
};
pub use error::{BindError, Error};
pub use handler::Handler;
pub use request::Request;
pub use response::ResponseWriter;
pub use router::{HandlerDesc, Router, ERR_ROUTE_NOT_FOUND};
pub use server::Server;
