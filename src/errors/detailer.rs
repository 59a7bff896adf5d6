use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;

use super::bag::{self, Bag, Key};
use super::{BoxError, Coder};

/// A [`Coder`] whose errors also carry a typed detail value.
///
/// The detail is stored as a [`Bag`] keyed by `T`'s type name, so it shows
/// up in problem-detail extensions and can be read back with
/// [`details`](Self::details).
///
/// ```rust
/// use rivet::errors::CoderDetailer;
///
/// #[derive(Debug, serde::Serialize)]
/// struct Quota { limit: u32 }
///
/// let over = CoderDetailer::<Quota>::new("QUOTA").with_http_code(429);
/// let err: rivet::errors::BoxError = over.wrap(std::io::Error::other("rejected"), Quota { limit: 5 }).into();
/// assert_eq!(over.details(&*err).map(|q| q.limit), Some(5));
/// ```
pub struct CoderDetailer<T> {
    coder: Coder,
    _details: PhantomData<fn() -> T>,
}

impl<T> CoderDetailer<T>
where
    T: Serialize + fmt::Debug + Send + Sync + 'static,
{
    pub const fn new(kind: &'static str) -> Self {
        Self::from_coder(Coder::new(kind))
    }

    pub const fn from_coder(coder: Coder) -> Self {
        Self { coder, _details: PhantomData }
    }

    pub fn with_type(&self, kind: impl Into<Cow<'static, str>>) -> Self {
        Self::from_coder(self.coder.with_type(kind))
    }

    pub fn with_message(&self, message: impl Into<Cow<'static, str>>) -> Self {
        Self::from_coder(self.coder.with_message(message))
    }

    pub fn with_message_fmt(&self, args: fmt::Arguments<'_>) -> Self {
        Self::from_coder(self.coder.with_message_fmt(args))
    }

    pub fn with_http_code(&self, http_code: u16) -> Self {
        Self::from_coder(self.coder.with_http_code(http_code))
    }

    pub fn coder(&self) -> &Coder { &self.coder }

    /// Wraps `cause` with the template, then attaches `details`.
    pub fn wrap(&self, cause: impl Into<BoxError>, details: T) -> Bag {
        Bag::new(self.coder.wrap(cause), Self::key(), details)
    }

    /// Reads back the outermost detail of type `T` from `err`'s chain.
    pub fn details<'a>(&self, err: &'a (dyn StdError + 'static)) -> Option<&'a T> {
        bag::get(err, Self::key())
    }

    fn key() -> Key<T> {
        Key::new(std::any::type_name::<T>())
    }
}

impl<T> Clone for CoderDetailer<T> {
    fn clone(&self) -> Self {
        Self { coder: self.coder.clone(), _details: PhantomData }
    }
}

impl<T> fmt::Debug for CoderDetailer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoderDetailer")
            .field("coder", &self.coder)
            .field("details", &std::any::type_name::<T>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::code;

    #[derive(Debug, Serialize, PartialEq)]
    struct Conflict {
        existing_id: u64,
    }

    #[test]
    fn wrap_attaches_code_and_details() {
        let dup = CoderDetailer::<Conflict>::new("DUPLICATE")
            .with_http_code(409)
            .with_message("already exists");
        let err: BoxError = dup.wrap(std::io::Error::other("unique violation"), Conflict { existing_id: 9 }).into();

        assert_eq!(dup.details(&*err), Some(&Conflict { existing_id: 9 }));
        let coded = code(&*err).unwrap();
        assert_eq!(coded.http_code(), 409);
        assert_eq!(coded.message(), "already exists");
        assert_eq!(err.to_string(), "unique violation");
    }

    #[test]
    fn details_missing_on_plain_error() {
        let dup = CoderDetailer::<Conflict>::new("DUPLICATE");
        let err: BoxError = std::io::Error::other("x").into();
        assert!(dup.details(&*err).is_none());
    }

    #[test]
    fn details_are_listed_as_pairs() {
        let dup = CoderDetailer::<Conflict>::new("DUPLICATE");
        let err: BoxError = dup.wrap(std::io::Error::other("x"), Conflict { existing_id: 1 }).into();
        let pairs = bag::list_pairs(&*err);
        assert_eq!(pairs[std::any::type_name::<Conflict>()], serde_json::json!({ "existing_id": 1 }));
    }
}
