//! Deferred values and the machinery that settles them.
//!
//! A field implementation may hand back a [`LazyValue`] instead of a finished value. The
//! executor does not force it right away: every lazy value produced at a given selection
//! depth is queued first, and the whole batch is settled afterwards, lowest depth first.
//! Data loaders can use the gap between "requested" and "forced" to coalesce lookups.

use std::any::Any;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use displaydoc::Display;
use thiserror::Error;

use crate::error::ExecutionError;
use crate::error::RaisedError;
use crate::error::ResolveError;
use crate::json_ext::Value;

/// Error kind raised for external lazy values nobody knows how to settle.
pub const UNREGISTERED_LAZY: &str = "UnregisteredLazy";

type Deferred<T> = Box<dyn FnOnce() -> Result<LazyValue<T>, ResolveError>>;

/// A value that is either computed already or still has to be computed.
///
/// Deferred values may produce further deferred values; settling unwraps them in a loop,
/// never recursively.
pub enum LazyValue<T> {
    Ready(T),
    Deferred(Deferred<T>),
}

impl<T> LazyValue<T> {
    pub fn ready(value: T) -> Self {
        LazyValue::Ready(value)
    }

    pub fn deferred<F>(compute: F) -> Self
    where
        F: FnOnce() -> Result<LazyValue<T>, ResolveError> + 'static,
    {
        LazyValue::Deferred(Box::new(compute))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LazyValue::Ready(_))
    }

    /// Transforms the final value once it is available.
    pub fn map<U, F>(self, f: F) -> LazyValue<U>
    where
        T: 'static,
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        match self {
            LazyValue::Ready(value) => LazyValue::Ready(f(value)),
            LazyValue::Deferred(compute) => LazyValue::deferred(move || {
                let value = LazyValue::Deferred(compute).flatten()?;
                Ok(LazyValue::Ready(f(value)))
            }),
        }
    }

    /// Unwraps the chain until a final value comes out.
    pub fn flatten(self) -> Result<T, ResolveError> {
        match self.flatten_bounded(usize::MAX) {
            Ok(value) => Ok(value),
            Err(SettleError::Failed(error)) => Err(error),
            Err(error @ SettleError::TooLong(_)) => {
                Err(ExecutionError::new(error.to_string()).into())
            }
        }
    }

    pub(crate) fn flatten_bounded(self, max_steps: usize) -> Result<T, SettleError> {
        let mut current = self;
        let mut steps = 0;
        loop {
            match current {
                LazyValue::Ready(value) => return Ok(value),
                LazyValue::Deferred(compute) => {
                    if steps == max_steps {
                        return Err(SettleError::TooLong(max_steps));
                    }
                    steps += 1;
                    current = compute().map_err(SettleError::Failed)?;
                }
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LazyValue::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            LazyValue::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl<T> From<T> for LazyValue<T> {
    fn from(value: T) -> Self {
        LazyValue::Ready(value)
    }
}

/// Settles `values` level by level, every value taking its next step before any value
/// takes the one after.
///
/// Results are in input order. A failing value does not stop the others.
pub fn schedule_batch<T>(values: Vec<LazyValue<T>>) -> Vec<Result<T, ResolveError>> {
    let mut settled: Vec<Option<Result<T, ResolveError>>> = Vec::with_capacity(values.len());
    let mut pending = Vec::new();
    for (index, value) in values.into_iter().enumerate() {
        match value {
            LazyValue::Ready(value) => settled.push(Some(Ok(value))),
            LazyValue::Deferred(compute) => {
                settled.push(None);
                pending.push((index, compute));
            }
        }
    }
    while !pending.is_empty() {
        let mut next = Vec::new();
        for (index, compute) in pending {
            match compute() {
                Ok(LazyValue::Deferred(compute)) => next.push((index, compute)),
                Ok(LazyValue::Ready(value)) => settled[index] = Some(Ok(value)),
                Err(error) => settled[index] = Some(Err(error)),
            }
        }
        pending = next;
    }
    settled.into_iter().flatten().collect()
}

/// Why a lazy value could not be settled.
#[derive(Debug, Error, Display)]
pub(crate) enum SettleError {
    /// lazy value did not settle after {0} steps
    TooLong(usize),
    /// {0}
    Failed(ResolveError),
}

impl From<SettleError> for ResolveError {
    fn from(error: SettleError) -> Self {
        match error {
            SettleError::Failed(error) => error,
            error @ SettleError::TooLong(_) => ExecutionError::new(error.to_string()).into(),
        }
    }
}

/// A deferred value owned by a host library, settled by a hook registered for its type.
pub struct ExternalLazy {
    type_id: TypeId,
    type_name: &'static str,
    value: Box<dyn Any>,
}

impl ExternalLazy {
    pub fn new<T: 'static>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value: Box::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ExternalLazy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExternalLazy<{}>", self.type_name)
    }
}

/// What a field implementation returns.
pub enum FieldValue {
    /// A finished value: a leaf, an object, `null`, or a list of those
    Value(Value),
    /// A list whose items still need completing
    List(Vec<FieldValue>),
    /// A list produced by an iteration that may fail as a whole
    Items(Box<dyn Iterator<Item = Result<FieldValue, ResolveError>>>),
    /// A value tagged with its concrete object type, for interface and union positions
    Typed {
        type_name: String,
        value: Box<FieldValue>,
    },
    Lazy(LazyValue<FieldValue>),
    External(ExternalLazy),
}

impl FieldValue {
    pub fn null() -> Self {
        FieldValue::Value(Value::Null)
    }

    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FieldValue>,
    {
        FieldValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Result<FieldValue, ResolveError>>,
        I::IntoIter: 'static,
    {
        FieldValue::Items(Box::new(items.into_iter()))
    }

    pub fn typed(type_name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        FieldValue::Typed {
            type_name: type_name.into(),
            value: Box::new(value.into()),
        }
    }

    pub fn lazy<F>(compute: F) -> Self
    where
        F: FnOnce() -> Result<FieldValue, ResolveError> + 'static,
    {
        FieldValue::Lazy(LazyValue::deferred(move || compute().map(LazyValue::Ready)))
    }

    pub fn external<T: 'static>(value: T) -> Self {
        FieldValue::External(ExternalLazy::new(value))
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, FieldValue::Lazy(_) | FieldValue::External(_))
    }

    /// Unwraps lazy layers until a non-lazy value comes out.
    ///
    /// Every invoked deferral and every sync hook call counts as one step.
    pub(crate) fn settle(self, sync: &LazySync, max_steps: usize) -> Result<FieldValue, SettleError> {
        let mut current = self;
        let mut steps = 0;
        loop {
            current = match current {
                FieldValue::Lazy(LazyValue::Ready(value)) => value,
                FieldValue::Lazy(LazyValue::Deferred(compute)) => {
                    if steps == max_steps {
                        return Err(SettleError::TooLong(max_steps));
                    }
                    steps += 1;
                    FieldValue::Lazy(compute().map_err(SettleError::Failed)?)
                }
                FieldValue::External(external) => {
                    if steps == max_steps {
                        return Err(SettleError::TooLong(max_steps));
                    }
                    steps += 1;
                    sync.sync(external).map_err(SettleError::Failed)?
                }
                settled => return Ok(settled),
            };
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            FieldValue::List(items) => f.debug_tuple("List").field(items).finish(),
            FieldValue::Items(_) => f.write_str("Items(..)"),
            FieldValue::Typed { type_name, value } => f
                .debug_struct("Typed")
                .field("type_name", type_name)
                .field("value", value)
                .finish(),
            FieldValue::Lazy(lazy) => f.debug_tuple("Lazy").field(lazy).finish(),
            FieldValue::External(external) => external.fmt(f),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

impl From<LazyValue<FieldValue>> for FieldValue {
    fn from(value: LazyValue<FieldValue>) -> Self {
        FieldValue::Lazy(value)
    }
}

impl From<ExternalLazy> for FieldValue {
    fn from(value: ExternalLazy) -> Self {
        FieldValue::External(value)
    }
}

type SyncFn = Arc<dyn Fn(Box<dyn Any>) -> Result<FieldValue, ResolveError> + Send + Sync>;

/// Sync hooks for external lazy types, keyed by exact type.
#[derive(Clone, Default)]
pub(crate) struct LazySync {
    hooks: HashMap<TypeId, SyncFn>,
}

impl LazySync {
    pub(crate) fn register<T, F>(&mut self, hook: F)
    where
        T: 'static,
        F: Fn(T) -> Result<FieldValue, ResolveError> + Send + Sync + 'static,
    {
        let hook: SyncFn = Arc::new(move |value: Box<dyn Any>| match value.downcast::<T>() {
            Ok(value) => hook(*value),
            Err(_) => Err(RaisedError::new(
                UNREGISTERED_LAZY,
                format!(
                    "sync hook for {} received another type",
                    std::any::type_name::<T>()
                ),
            )
            .into()),
        });
        self.hooks.insert(TypeId::of::<T>(), hook);
    }

    pub(crate) fn sync(&self, external: ExternalLazy) -> Result<FieldValue, ResolveError> {
        match self.hooks.get(&external.type_id) {
            Some(hook) => hook(external.value),
            None => Err(RaisedError::new(
                UNREGISTERED_LAZY,
                format!("no sync hook registered for {}", external.type_name),
            )
            .into()),
        }
    }
}

impl fmt::Debug for LazySync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySync")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Pending lazy work, bucketed by selection depth.
#[derive(Debug)]
pub(crate) struct LazyQueue<T> {
    buckets: BTreeMap<usize, Vec<T>>,
}

impl<T> Default for LazyQueue<T> {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
        }
    }
}

impl<T> LazyQueue<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, depth: usize, item: T) {
        self.buckets.entry(depth).or_default().push(item);
    }

    /// Takes every item of the lowest depth, in insertion order.
    pub(crate) fn pop_batch(&mut self) -> Option<(usize, Vec<T>)> {
        self.buckets.pop_first()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use serde_json_bytes::json;

    use super::*;

    fn chain(depth: usize, calls: Rc<Cell<usize>>) -> LazyValue<usize> {
        let mut lazy = LazyValue::Ready(depth);
        for _ in 0..depth {
            let calls = calls.clone();
            lazy = LazyValue::deferred(move || {
                calls.set(calls.get() + 1);
                Ok(lazy)
            });
        }
        lazy
    }

    #[test]
    fn flattening_takes_one_step_per_link() {
        let calls = Rc::new(Cell::new(0));
        assert_eq!(chain(5, calls.clone()).flatten().unwrap(), 5);
        assert_eq!(calls.get(), 5);
    }

    #[test]
    fn long_chains_do_not_recurse() {
        let calls = Rc::new(Cell::new(0));
        assert_eq!(chain(200_000, calls.clone()).flatten().unwrap(), 200_000);
        assert_eq!(calls.get(), 200_000);
    }

    #[test]
    fn bounded_flattening_stops() {
        let calls = Rc::new(Cell::new(0));
        let error = chain(10, calls.clone()).flatten_bounded(3).unwrap_err();
        assert_eq!(error.to_string(), "lazy value did not settle after 3 steps");
        assert_eq!(calls.get(), 3);
        assert_eq!(chain(3, calls).flatten_bounded(3).unwrap(), 3);
    }

    #[test]
    fn map_applies_after_settling() {
        let lazy = LazyValue::deferred(|| Ok(LazyValue::Ready(20))).map(|n| n + 1);
        assert!(!lazy.is_ready());
        assert_eq!(lazy.flatten().unwrap(), 21);
    }

    #[test]
    fn errors_stop_the_chain() {
        let lazy: LazyValue<i32> =
            LazyValue::deferred(|| Err(ExecutionError::new("lookup failed").into()));
        assert_eq!(lazy.flatten().unwrap_err().message(), "lookup failed");
    }

    #[test]
    fn batches_advance_one_level_at_a_time() {
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));
        let step = |name: &'static str, level: usize, next: LazyValue<&'static str>| {
            let log = log.clone();
            LazyValue::deferred(move || {
                log.borrow_mut().push(format!("{name}{level}"));
                Ok(next)
            })
        };
        let a = step("a", 1, step("a", 2, LazyValue::Ready("a")));
        let b = step("b", 1, LazyValue::Ready("b"));
        let c = step("c", 1, LazyValue::deferred(|| Err(ExecutionError::new("c failed").into())));

        let results = schedule_batch(vec![a, LazyValue::Ready("ready"), b, c]);

        assert_eq!(*log.borrow(), ["a1", "b1", "c1", "a2"]);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap(), &"a");
        assert_eq!(results[1].as_ref().unwrap(), &"ready");
        assert_eq!(results[2].as_ref().unwrap(), &"b");
        assert_eq!(results[3].as_ref().unwrap_err().message(), "c failed");
    }

    struct Promise(i64);

    #[test]
    fn settle_runs_sync_hooks_at_any_nesting() {
        let mut sync = LazySync::default();
        sync.register(|promise: Promise| Ok(json!(promise.0 - 1000).into()));

        let value = FieldValue::lazy(|| Ok(FieldValue::external(Promise(1003))));
        match value.settle(&sync, 10).unwrap() {
            FieldValue::Value(value) => assert_eq!(value, json!(3)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unregistered_external_values_are_raised() {
        let sync = LazySync::default();
        let error = FieldValue::external(Promise(1)).settle(&sync, 10).unwrap_err();
        match ResolveError::from(error) {
            ResolveError::Raised(error) => assert_eq!(error.kind, UNREGISTERED_LAZY),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn queue_drains_lowest_depth_first() {
        let mut queue = LazyQueue::new();
        queue.push(2, "c");
        queue.push(1, "a");
        queue.push(1, "b");
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop_batch(), Some((1, vec!["a", "b"])));
        queue.push(1, "d");
        assert_eq!(queue.pop_batch(), Some((1, vec!["d"])));
        assert_eq!(queue.pop_batch(), Some((2, vec!["c"])));
        assert!(queue.is_empty());
    }
}
