//! Provide a [`Context`] for resolvers and trace hooks.
//!
//! Each query of a run gets its own [`Context`], and a multiplex run has one more that is
//! shared by all of its queries. JSON entries are stored in a `DashMap`, anything else
//! (data loaders, caches, handles) goes in the typed [`Extensions`].

use std::sync::Arc;

use dashmap::DashMap;
use derivative::Derivative;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::BoxError;
use crate::json_ext::Value;

pub(crate) type Entries = Arc<DashMap<String, Value>>;

/// A map of values keyed by their type.
///
/// Store expensive values behind an `Arc` so clones stay cheap.
#[derive(Clone, Default)]
pub struct Extensions {
    inner: http::Extensions,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value`, returning the previous value of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.inner.insert(value)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.inner.get::<T>()
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.inner.get_mut::<T>()
    }

    /// Runs `f` on the value of type `T`, starting from `T::default()` when it is absent.
    pub fn update_or_default<T, R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Default + Clone + Send + Sync + 'static,
    {
        if let Some(value) = self.inner.get_mut::<T>() {
            return f(value);
        }
        let mut value = T::default();
        let result = f(&mut value);
        self.inner.insert(value);
        result
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.inner.remove::<T>()
    }

    pub fn contains_key<T: Send + Sync + 'static>(&self) -> bool {
        self.inner.get::<T>().is_some()
    }
}

/// Key-value store handed to resolvers and hooks.
///
/// Cloning a context is cheap and yields a handle on the same data.
#[derive(Clone, Derivative, Default)]
#[derivative(Debug)]
pub struct Context {
    entries: Entries,
    #[derivative(Debug = "ignore")]
    extensions: Arc<Mutex<Extensions>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored at `key`, deserialized to `V`.
    pub fn get<K, V>(&self, key: K) -> Result<Option<V>, BoxError>
    where
        K: Into<String>,
        V: for<'de> serde::Deserialize<'de>,
    {
        self.entries
            .get(&key.into())
            .map(|v| serde_json_bytes::from_value(v.value().clone()))
            .transpose()
            .map_err(|e| e.into())
    }

    /// Stores `value` at `key` and returns the previous value, if any.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<Option<V>, BoxError>
    where
        K: Into<String>,
        V: for<'de> serde::Deserialize<'de> + Serialize,
    {
        match serde_json_bytes::to_value(value) {
            Ok(value) => self
                .entries
                .insert(key.into(), value)
                .map(|v| serde_json_bytes::from_value(v))
                .transpose()
                .map_err(|e| e.into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Updates the value at `key`, inserting `default()` first when it is absent.
    pub fn upsert<K, V>(
        &self,
        key: K,
        upsert: impl Fn(V) -> V,
        default: impl Fn() -> V,
    ) -> Result<(), BoxError>
    where
        K: Into<String>,
        V: for<'de> serde::Deserialize<'de> + Serialize,
    {
        let key = key.into();
        self.entries
            .entry(key.clone())
            .or_try_insert_with(|| serde_json_bytes::to_value((default)()))?;
        let mut result = Ok(());
        self.entries
            .alter(&key, |_, v| match serde_json_bytes::from_value(v.clone()) {
                Ok(value) => match serde_json_bytes::to_value((upsert)(value)) {
                    Ok(value) => value,
                    Err(e) => {
                        result = Err(e);
                        v
                    }
                },
                Err(e) => {
                    result = Err(e);
                    v
                }
            });
        result.map_err(|e| e.into())
    }

    pub fn contains_key<K: Into<String>>(&self, key: K) -> bool {
        self.entries.contains_key(&key.into())
    }

    /// Runs `func` with the typed extensions locked.
    pub fn with_extensions<T>(&self, func: impl FnOnce(&mut Extensions) -> T) -> T {
        let mut guard = self.extensions.lock();
        func(&mut guard)
    }

    /// Returns a clone of the extension of type `T`.
    ///
    /// Store expensive values behind an `Arc` so this stays cheap.
    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.extensions.lock().get::<T>().cloned()
    }
}
