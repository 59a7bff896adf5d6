//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! A router holds handlers of many different types, so each one is compiled
//! into a pipeline and hidden behind a trait object (`dyn ErasedHandler`).
//!
//! ```text
//! async fn create(In(user): In<NewUser>) -> Result<User, BoxError>   ← user writes this
//!        ↓ binder.bind(create)
//! Handler<(In<NewUser>,)>                      ← macro impl for arity 1
//!        ↓ signature validated, input plan compiled
//! Arc::new(Pipeline { handler, plan, .. })     ← stored as BoxedHandler
//!        ↓
//! handler.call(req)  at request time           ← one vtable dispatch
//!        ↓
//! decode → invoke → classify → marshal         ← BoxFuture
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;

use crate::bind::{Param, Reply, Signature, TypeInfo};
use crate::error::BindError;
use crate::errors::BoxError;
use crate::request::Request;
use crate::response::ResponseWriter;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a finished response.
pub(crate) type BoxFuture =
    Pin<Box<dyn Future<Output = http::Response<Full<Bytes>>> + Send + 'static>>;

/// Internal dispatch interface, implemented by compiled pipelines.
pub(crate) trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
pub(crate) type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every function a [`Binder`](crate::Binder) accepts.
///
/// You never implement this yourself. It is satisfied by any `async fn` (or
/// closure returning a future) taking up to three [`Param`]s and returning a
/// [`Reply`]:
///
/// ```text
/// async fn name() -> Result<(), E>
/// async fn name(req: Request, In(input): In<T>) -> Result<V, E>
/// async fn name(w: ResponseWriter, req: Request)
/// ```
///
/// `Args` is the tuple of parameter types; it only exists so that one
/// function type can implement the trait once per arity.
pub trait Handler<Args>: private::Sealed<Args> + Send + Sync + 'static {
    #[doc(hidden)]
    type Reply: Reply;
    #[doc(hidden)]
    type Future: Future<Output = Self::Reply> + Send + 'static;
    #[doc(hidden)]
    type Plan: Send + Sync + 'static;

    /// The parameter and output kinds, for validation.
    fn signature() -> Signature;

    /// The structured input type, if the handler takes one.
    fn input() -> Option<TypeInfo>;

    #[doc(hidden)]
    fn plan() -> Result<Self::Plan, BindError>;

    /// Extracts every parameter, in order, and starts the call.
    #[doc(hidden)]
    fn invoke(&self, plan: &Self::Plan, req: &Request, w: &ResponseWriter)
        -> Result<Self::Future, BoxError>;
}

mod private {
    pub trait Sealed<Args> {}
}

// ── Arity implementations ─────────────────────────────────────────────────────

macro_rules! impl_handler {
    ($($ty:ident $plan:ident),*) => {
        impl<F, Fut, R, $($ty,)*> private::Sealed<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: Reply,
            $($ty: Param,)*
        {
        }

        impl<F, Fut, R, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: Reply,
            $($ty: Param,)*
        {
            type Reply = R;
            type Future = Fut;
            type Plan = ($($ty::Plan,)*);

            fn signature() -> Signature {
                Signature::new(vec![$($ty::KIND),*], R::outputs())
            }

            fn input() -> Option<TypeInfo> {
                None$(.or_else($ty::describe))*
            }

            fn plan() -> Result<Self::Plan, BindError> {
                Ok(($($ty::plan()?,)*))
            }

            #[allow(non_snake_case, unused_variables)]
            fn invoke(&self, plan: &Self::Plan, req: &Request, w: &ResponseWriter)
                -> Result<Fut, BoxError>
            {
                let ($($plan,)*) = plan;
                $(let $ty = $ty::extract($plan, req, w)?;)*
                Ok((self)($($ty),*))
            }
        }
    };
}

impl_handler!();
impl_handler!(A1 p1);
impl_handler!(A1 p1, A2 p2);
impl_handler!(A1 p1, A2 p2, A3 p3);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::{In, Input, OutputKind, ParamKind};

    #[derive(serde::Deserialize, schemars::JsonSchema)]
    struct Ping {
        #[allow(dead_code)]
        name: String,
    }

    impl Input for Ping {}

    fn signature_of<H: Handler<Args>, Args>(_: &H) -> Signature {
        H::signature()
    }

    async fn none() -> Result<(), BoxError> { Ok(()) }
    async fn value(_: Request, _: In<Ping>) -> Result<u32, BoxError> { Ok(1) }
    async fn writer(_: Request, _: ResponseWriter, _: In<Ping>) {}

    #[test]
    fn signatures_follow_types() {
        assert_eq!(signature_of(&none), Signature::new(vec![], vec![OutputKind::Error]));
        assert_eq!(
            signature_of(&value),
            Signature::new(
                vec![ParamKind::Request, ParamKind::Input],
                vec![OutputKind::Value, OutputKind::Error],
            )
        );
        assert_eq!(
            signature_of(&writer),
            Signature::new(vec![ParamKind::Request, ParamKind::Writer, ParamKind::Input], vec![])
        );
    }

    #[test]
    fn input_is_described() {
        fn input_of<H: Handler<Args>, Args>(_: &H) -> Option<TypeInfo> {
            H::input()
        }
        assert!(input_of(&none).is_none());
        let info = input_of(&value).unwrap();
        assert!(info.name.ends_with("Ping"));
    }
}
