use crate::error::BindError;
use crate::errors::BoxError;
use crate::request::Request;
use crate::response::ResponseWriter;

use super::input::{In, Input, InputPlan};
use super::signature::ParamKind;
use super::TypeInfo;

/// A type a handler may take as a parameter.
///
/// Sealed: the only parameter types are [`Request`], [`ResponseWriter`] and
/// [`In<T>`].
pub trait Param: private::Sealed + Send + Sized + 'static {
    const KIND: ParamKind;

    #[doc(hidden)]
    type Plan: Send + Sync + 'static;

    /// Prepares everything extraction needs. Runs once, at bind time.
    #[doc(hidden)]
    fn plan() -> Result<Self::Plan, BindError>;

    /// Describes a structured input for [`Meta`](crate::Meta).
    #[doc(hidden)]
    fn describe() -> Option<TypeInfo> {
        None
    }

    #[doc(hidden)]
    fn extract(plan: &Self::Plan, req: &Request, w: &ResponseWriter) -> Result<Self, BoxError>;
}

mod private {
    pub trait Sealed {}
}

impl private::Sealed for Request {}

impl Param for Request {
    const KIND: ParamKind = ParamKind::Request;
    type Plan = ();

    fn plan() -> Result<(), BindError> { Ok(()) }

    fn extract(_: &(), req: &Request, _: &ResponseWriter) -> Result<Self, BoxError> {
        Ok(req.clone())
    }
}

impl private::Sealed for ResponseWriter {}

impl Param for ResponseWriter {
    const KIND: ParamKind = ParamKind::Writer;
    type Plan = ();

    fn plan() -> Result<(), BindError> { Ok(()) }

    fn extract(_: &(), _: &Request, w: &ResponseWriter) -> Result<Self, BoxError> {
        Ok(w.clone())
    }
}

impl<T: Input> private::Sealed for In<T> {}

impl<T: Input> Param for In<T> {
    const KIND: ParamKind = ParamKind::Input;
    type Plan = InputPlan;

    fn plan() -> Result<InputPlan, BindError> {
        InputPlan::compile::<T>()
    }

    fn describe() -> Option<TypeInfo> {
        Some(TypeInfo::input::<T>())
    }

    fn extract(plan: &InputPlan, req: &Request, _: &ResponseWriter) -> Result<Self, BoxError> {
        plan.decode::<T>(req).map(In)
    }
}
