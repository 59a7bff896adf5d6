//! Key/value annotations carried on an error's cause chain.
//!
//! A [`Bag`] wraps a cause and adds one typed key/value pair. Wrapping the
//! same chain several times stacks pairs like an inverted request context:
//! the innermost code attaches first, outer layers attach later.
//!
//! ```rust
//! use rivet::errors::bag::{self, Key};
//! use rivet::errors::ResultExt;
//!
//! const USER_ID: Key<u64> = Key::new("user_id");
//!
//! let res: Result<(), _> = Err(std::io::Error::other("disk full")).with_bag(USER_ID, 42);
//! let err = res.unwrap_err();
//! assert_eq!(bag::get(&*err, USER_ID), Some(&42));
//! ```

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::{chain, BoxError};

// ── Keys ──────────────────────────────────────────────────────────────────────

/// A typed bag key.
///
/// The name is what shows up in problem-detail extensions; the type
/// parameter pins the value type so lookups never need a cast at the call
/// site. Two keys with the same name but different value types never match.
pub struct Key<V> {
    name: &'static str,
    _value: PhantomData<fn() -> V>,
}

impl<V> Key<V> {
    pub const fn new(name: &'static str) -> Self {
        Self { name, _value: PhantomData }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<V> Clone for Key<V> {
    fn clone(&self) -> Self { *self }
}

impl<V> Copy for Key<V> {}

impl<V> fmt::Debug for Key<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Key").field(&self.name).finish()
    }
}

// ── Values ────────────────────────────────────────────────────────────────────

/// Type-erased view of a bag value.
///
/// Lets the chain be listed without knowing every value type, while typed
/// lookups still downcast back to the concrete value.
pub trait BagValue: fmt::Debug + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn to_json(&self) -> Value;
}

impl<T> BagValue for T
where
    T: Serialize + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any { self }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::String(format!("{self:?}")))
    }
}

// ── Bag ───────────────────────────────────────────────────────────────────────

/// One key/value pair plus the error it annotates.
///
/// `Display` is the cause's text and `source()` is the cause, so a bag is
/// invisible to anything that only prints or walks the chain.
pub struct Bag {
    key: &'static str,
    value: Arc<dyn BagValue>,
    cause: BoxError,
}

impl Bag {
    pub fn new<V>(cause: impl Into<BoxError>, key: Key<V>, value: V) -> Self
    where
        V: Serialize + fmt::Debug + Send + Sync + 'static,
    {
        Self { key: key.name, value: Arc::new(value), cause: cause.into() }
    }

    pub fn key(&self) -> &'static str { self.key }

    pub fn value(&self) -> &dyn BagValue { &*self.value }

    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) { &*self.cause }

    pub fn into_cause(self) -> BoxError { self.cause }

    fn lookup<V: 'static>(&self, key: Key<V>) -> Option<&V> {
        if self.key != key.name {
            return None;
        }
        self.value.as_any().downcast_ref::<V>()
    }
}

impl fmt::Debug for Bag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bag")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("cause", &self.cause)
            .finish()
    }
}

impl fmt::Display for Bag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.cause, f)
    }
}

impl StdError for Bag {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.cause)
    }
}

// ── Lookups ───────────────────────────────────────────────────────────────────

/// Returns the most recently attached value for `key`, searching the whole
/// chain from the outside in.
pub fn get<'a, V: 'static>(err: &'a (dyn StdError + 'static), key: Key<V>) -> Option<&'a V> {
    chain(err)
        .filter_map(|e| e.downcast_ref::<Bag>())
        .find_map(|bag| bag.lookup(key))
}

/// Returns every value attached for `key`, oldest first.
pub fn get_all<'a, V: 'static>(err: &'a (dyn StdError + 'static), key: Key<V>) -> Vec<&'a V> {
    let mut found: Vec<&V> = chain(err)
        .filter_map(|e| e.downcast_ref::<Bag>())
        .filter_map(|bag| bag.lookup(key))
        .collect();
    found.reverse();
    found
}

/// Lists every pair on the chain, one entry per key.
///
/// A key attached once maps to its value; a key attached several times maps
/// to an array of its values, oldest first. This walks the full chain.
pub fn list_pairs(err: &(dyn StdError + 'static)) -> Map<String, Value> {
    let mut bags: Vec<&Bag> = chain(err).filter_map(|e| e.downcast_ref::<Bag>()).collect();
    bags.reverse();

    let mut grouped: Vec<(&'static str, Vec<Value>)> = Vec::new();
    for bag in bags {
        let value = bag.value.to_json();
        match grouped.iter_mut().find(|(key, _)| *key == bag.key) {
            Some((_, values)) => values.push(value),
            None => grouped.push((bag.key, vec![value])),
        }
    }

    grouped
        .into_iter()
        .map(|(key, mut values)| {
            let value = if values.len() == 1 { values.remove(0) } else { Value::Array(values) };
            (key.to_owned(), value)
        })
        .collect()
}
