use std::any::TypeId;

use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value;

use crate::errors::BoxError;

use super::signature::OutputKind;
use super::TypeInfo;

/// What a handler's return value means to the pipeline.
#[doc(hidden)]
#[derive(Debug)]
pub enum Outcome {
    /// The handler wrote its own response.
    Done,
    /// Success without a value.
    Empty,
    /// Success with a value, already converted for marshaling.
    Value(Result<Value, serde_json::Error>),
    Failed(BoxError),
}

/// A type a handler may return: `()`, `Result<(), E>` or `Result<T, E>`.
pub trait Reply: private::Sealed + Send + 'static {
    #[doc(hidden)]
    fn outputs() -> Vec<OutputKind>;

    #[doc(hidden)]
    fn describe() -> Option<TypeInfo>;

    #[doc(hidden)]
    fn into_outcome(self) -> Outcome;
}

mod private {
    pub trait Sealed {}
}

impl private::Sealed for () {}

impl Reply for () {
    fn outputs() -> Vec<OutputKind> { Vec::new() }

    fn describe() -> Option<TypeInfo> { None }

    fn into_outcome(self) -> Outcome { Outcome::Done }
}

impl<T, E> private::Sealed for Result<T, E> {}

impl<T, E> Reply for Result<T, E>
where
    T: Serialize + JsonSchema + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn outputs() -> Vec<OutputKind> {
        if is_unit::<T>() {
            vec![OutputKind::Error]
        } else {
            vec![OutputKind::Value, OutputKind::Error]
        }
    }

    fn describe() -> Option<TypeInfo> {
        (!is_unit::<T>()).then(TypeInfo::of::<T>)
    }

    fn into_outcome(self) -> Outcome {
        match self {
            Ok(_) if is_unit::<T>() => Outcome::Empty,
            Ok(value) => Outcome::Value(serde_json::to_value(&value)),
            Err(err) => Outcome::Failed(err.into()),
        }
    }
}

fn is_unit<T: 'static>() -> bool {
    TypeId::of::<T>() == TypeId::of::<()>()
}
