//! Hooks wrapping every step of execution.
//!
//! Hooks are registered in a fixed order when the executor is built. Hook 0 is the
//! outermost layer: its `before_*` phases run first and its `after_*` phases run last.
//! Every hook whose `before_*` phase succeeded gets its `after_*` phase, whatever happens
//! further in.
//!
//! Besides the phase pairs, a hook can wrap the services that run a query, resolve a
//! field, settle a lazy field value and authorize a value. The wrappers are composed once,
//! at construction.

use std::fmt;
use std::sync::Arc;

use tracing::Span;

use crate::context::Context;
use crate::error::BoxError;
use crate::error::ExecutionAbort;
use crate::error::ResolveError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::lazy::FieldValue;
use crate::lazy::LazySync;
use crate::lazy::LazyValue;
use crate::resolvers::Authorizer;
use crate::resolvers::FieldResolver;
use crate::resolvers::ResolveInfo;
use crate::resolvers::default_resolver;
use crate::response::ExecutionResult;

macro_rules! service {
    ($(#[$meta:meta])* $name:ident, $request:ident, $response:ty) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            inner: Arc<dyn for<'a> Fn($request<'a>) -> $response + Send + Sync>,
        }

        impl $name {
            pub fn new<F>(f: F) -> Self
            where
                F: for<'a> Fn($request<'a>) -> $response + Send + Sync + 'static,
            {
                Self { inner: Arc::new(f) }
            }

            pub fn call(&self, request: $request<'_>) -> $response {
                (self.inner)(request)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(stringify!($name))
            }
        }
    };
}

service!(
    /// Runs one query of a multiplex run.
    QueryService,
    QueryRequest,
    Result<QueryOutcome, ExecutionAbort>
);
service!(
    /// Invokes a field implementation.
    FieldService,
    FieldRequest,
    Result<FieldValue, ResolveError>
);
service!(
    /// Settles a lazy value returned by a field implementation.
    LazyService,
    LazyRequest,
    Result<FieldValue, ResolveError>
);
service!(
    /// Asks an authorizer about a value.
    AuthorizeService,
    AuthorizeRequest,
    Result<LazyValue<bool>, ResolveError>
);

pub(crate) trait StartQuery {
    fn start(&mut self) -> Result<QueryOutcome, ExecutionAbort>;
}

pub struct QueryRequest<'a> {
    /// Position of the query in the multiplex run.
    pub index: usize,
    pub query: &'a str,
    pub operation_name: Option<&'a str>,
    pub variables: &'a Object,
    pub context: &'a Context,
    pub shared: &'a Context,
    pub(crate) start: &'a mut (dyn StartQuery + 'a),
}

impl fmt::Debug for QueryRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRequest")
            .field("index", &self.index)
            .field("query", &self.query)
            .field("operation_name", &self.operation_name)
            .finish_non_exhaustive()
    }
}

/// What the query service reports back.
#[derive(Debug)]
pub enum QueryOutcome {
    /// Resolution started. The result is assembled once the shared lazy queue is drained.
    Pending,
    /// The query is finished already, without resolving anything further.
    Complete(ExecutionResult),
}

pub struct FieldRequest<'a> {
    pub info: &'a ResolveInfo<'a>,
    pub(crate) resolver: Option<&'a FieldResolver>,
}

impl fmt::Debug for FieldRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRequest")
            .field("info", &self.info)
            .field("default_resolver", &self.resolver.is_none())
            .finish()
    }
}

pub struct LazyRequest<'a> {
    pub value: FieldValue,
    pub owner_type: &'a str,
    pub field_name: &'a str,
    pub path: &'a Path,
    pub context: &'a Context,
    pub(crate) sync: &'a LazySync,
    pub(crate) max_steps: usize,
}

impl fmt::Debug for LazyRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRequest")
            .field("value", &self.value)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// What is being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizeTarget<'a> {
    /// A field, before it resolves. The value is its parent object.
    Field {
        owner_type: &'a str,
        field_name: &'a str,
    },
    /// A value completing as an object type.
    Type { type_name: &'a str },
}

pub struct AuthorizeRequest<'a> {
    pub target: AuthorizeTarget<'a>,
    pub value: &'a Value,
    pub path: &'a Path,
    pub context: &'a Context,
    pub(crate) authorizer: &'a Authorizer,
}

impl fmt::Debug for AuthorizeRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizeRequest")
            .field("target", &self.target)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct MultiplexInfo<'a> {
    pub query_count: usize,
    pub shared: &'a Context,
}

#[derive(Debug, Clone)]
pub struct QueryInfo<'a> {
    pub index: usize,
    pub query: &'a str,
    pub operation_name: Option<&'a str>,
    pub context: &'a Context,
    pub shared: &'a Context,
}

/// An instrumentation layer.
///
/// Every method has a pass-through default.
pub trait TraceHook: Send + Sync + 'static {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Runs once per multiplex run, before any query starts.
    fn before_multiplex(&self, _info: &MultiplexInfo<'_>) -> Result<(), BoxError> {
        Ok(())
    }

    fn after_multiplex(&self, _info: &MultiplexInfo<'_>) -> Result<(), BoxError> {
        Ok(())
    }

    fn before_query(&self, _info: &QueryInfo<'_>) -> Result<(), BoxError> {
        Ok(())
    }

    /// Runs after every query of the run is complete, including its lazy values.
    fn after_query(&self, _info: &QueryInfo<'_>) -> Result<(), BoxError> {
        Ok(())
    }

    fn execute_query(&self, service: QueryService) -> QueryService {
        service
    }

    fn execute_field(&self, service: FieldService) -> FieldService {
        service
    }

    fn execute_field_lazy(&self, service: LazyService) -> LazyService {
        service
    }

    fn authorized(&self, service: AuthorizeService) -> AuthorizeService {
        service
    }

    /// Replaces the result of a query that aborted.
    ///
    /// Returning `Some` keeps the abort from failing the whole multiplex run.
    fn isolate_query_abort(
        &self,
        _info: &QueryInfo<'_>,
        _abort: &ExecutionAbort,
    ) -> Option<ExecutionResult> {
        None
    }
}

#[derive(Clone, Copy)]
pub(crate) enum Scope<'a> {
    Multiplex(&'a MultiplexInfo<'a>),
    Query(&'a QueryInfo<'a>),
}

impl Scope<'_> {
    fn before(&self, hook: &dyn TraceHook) -> Result<(), BoxError> {
        match self {
            Scope::Multiplex(info) => hook.before_multiplex(info),
            Scope::Query(info) => hook.before_query(info),
        }
    }

    fn after(&self, hook: &dyn TraceHook) -> Result<(), BoxError> {
        match self {
            Scope::Multiplex(info) => hook.after_multiplex(info),
            Scope::Query(info) => hook.after_query(info),
        }
    }

    fn before_name(&self) -> &'static str {
        match self {
            Scope::Multiplex(_) => "before_multiplex",
            Scope::Query(_) => "before_query",
        }
    }

    fn after_name(&self) -> &'static str {
        match self {
            Scope::Multiplex(_) => "after_multiplex",
            Scope::Query(_) => "after_query",
        }
    }

    fn span(&self, before: bool, hook: &dyn TraceHook) -> Span {
        match (self, before) {
            (Scope::Multiplex(_), true) => tracing::trace_span!("before_multiplex", hook = hook.name()),
            (Scope::Multiplex(_), false) => tracing::trace_span!("after_multiplex", hook = hook.name()),
            (Scope::Query(_), true) => tracing::trace_span!("before_query", hook = hook.name()),
            (Scope::Query(_), false) => tracing::trace_span!("after_query", hook = hook.name()),
        }
    }
}

/// The registered hooks and the services they wrap.
pub(crate) struct TraceChain {
    hooks: Vec<Arc<dyn TraceHook>>,
    pub(crate) query: QueryService,
    pub(crate) field: FieldService,
    pub(crate) lazy: LazyService,
    pub(crate) authorize: AuthorizeService,
}

impl TraceChain {
    pub(crate) fn new(hooks: Vec<Arc<dyn TraceHook>>) -> Self {
        let query = hooks.iter().rev().fold(
            QueryService::new(|request| request.start.start()),
            |acc, hook| hook.execute_query(acc),
        );
        let field = hooks.iter().rev().fold(
            FieldService::new(|request| match request.resolver {
                Some(resolver) => resolver(request.info),
                None => default_resolver(request.info),
            }),
            |acc, hook| hook.execute_field(acc),
        );
        let lazy = hooks.iter().rev().fold(
            LazyService::new(|request| {
                request
                    .value
                    .settle(request.sync, request.max_steps)
                    .map_err(ResolveError::from)
            }),
            |acc, hook| hook.execute_field_lazy(acc),
        );
        let authorize = hooks.iter().rev().fold(
            AuthorizeService::new(|request| (request.authorizer)(request.value, request.context)),
            |acc, hook| hook.authorized(acc),
        );
        Self {
            hooks,
            query,
            field,
            lazy,
            authorize,
        }
    }

    /// Runs the `before` phase of every hook, outermost first.
    ///
    /// When a hook fails, the hooks that already began are unwound before the error is
    /// returned.
    pub(crate) fn begin(&self, scope: Scope<'_>) -> Result<(), ExecutionAbort> {
        for (index, hook) in self.hooks.iter().enumerate() {
            let phase = scope.before_name();
            let result = scope
                .span(true, hook.as_ref())
                .in_scope(|| scope.before(hook.as_ref()));
            if let Err(error) = result {
                let abort = ExecutionAbort::hook(hook.name(), phase, error);
                tracing::debug!(%abort, "trace hook failed, unwinding {} hook(s)", index);
                if let Err(teardown) = self.unwind(index, scope) {
                    tracing::debug!(%teardown, "teardown error swallowed");
                }
                return Err(abort);
            }
        }
        Ok(())
    }

    /// Runs the `after` phase of every hook, innermost first.
    pub(crate) fn end(&self, scope: Scope<'_>) -> Result<(), ExecutionAbort> {
        self.unwind(self.hooks.len(), scope)
    }

    /// Runs the `after` phase of the first `began` hooks in reverse order.
    ///
    /// Every teardown runs. The first failure is returned, later ones are logged.
    fn unwind(&self, began: usize, scope: Scope<'_>) -> Result<(), ExecutionAbort> {
        let mut first = None;
        for hook in self.hooks[..began].iter().rev() {
            let phase = scope.after_name();
            let result = scope
                .span(false, hook.as_ref())
                .in_scope(|| scope.after(hook.as_ref()));
            if let Err(error) = result {
                let abort = ExecutionAbort::hook(hook.name(), phase, error);
                if first.is_none() {
                    first = Some(abort);
                } else {
                    tracing::debug!(%abort, "teardown error swallowed");
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    pub(crate) fn isolate(
        &self,
        info: &QueryInfo<'_>,
        abort: &ExecutionAbort,
    ) -> Option<ExecutionResult> {
        self.hooks
            .iter()
            .find_map(|hook| hook.isolate_query_abort(info, abort))
    }
}

impl fmt::Debug for TraceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|hook| hook.name()))
            .finish()
    }
}
