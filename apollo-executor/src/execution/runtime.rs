//! Resolution of one query: runs fields, completes their values against the declared
//! types and records field errors.
//!
//! Work that cannot finish right away (lazy values, deferred authorization, deferred type
//! resolution) is parked in the lazy queue as a [`Continuation`] keyed by the field depth
//! of its path, and picked up again through [`Runtime::resume`].

use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;

use super::Engine;
use super::result::ResultTree;
use super::result::SlotKey;
use super::result::Target;
use super::stack::ResolutionStack;
use crate::context::Context;
use crate::error::ExecutionAbort;
use crate::error::ExecutionError;
use crate::error::FieldError;
use crate::error::Location;
use crate::error::ResolveError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::lazy::FieldValue;
use crate::lazy::LazyQueue;
use crate::lazy::LazyValue;
use crate::lookahead::Lookahead;
use crate::resolvers::Authorizer;
use crate::resolvers::Extra;
use crate::resolvers::HandlerInfo;
use crate::resolvers::ResolveInfo;
use crate::response::ExecutionResult;
use crate::spec::FieldType;
use crate::spec::InvalidValue;
use crate::spec::OperationKind;
use crate::spec::SelectionNode;
use crate::spec::SelectionTree;
use crate::spec::TYPENAME;
use crate::spec::TypeKind;
use crate::spec::coerce_builtin_scalar;
use crate::trace::AuthorizeRequest;
use crate::trace::AuthorizeTarget;
use crate::trace::FieldRequest;
use crate::trace::LazyRequest;

/// A field of an object value, with everything its resolver gets to see.
#[derive(Debug)]
pub(crate) struct FieldScope {
    /// The concrete object type the field is resolved on
    pub(crate) owner_type: String,
    /// The type the selection was made on, an interface for example
    pub(crate) declared_on: String,
    pub(crate) field_name: String,
    /// Arguments with schema defaults filled in
    pub(crate) arguments: Object,
    /// Every selection merged under the field's response key
    pub(crate) nodes: Vec<Arc<SelectionNode>>,
    pub(crate) object: Arc<Value>,
    pub(crate) grandparent: Option<Arc<Value>>,
}

/// A position in the result that a value of a field completes into.
///
/// For list items, `ty` and `path` are the item's.
#[derive(Debug, Clone)]
pub(crate) struct Site {
    field: Arc<FieldScope>,
    ty: FieldType,
    path: Path,
    target: Target,
}

/// An object value about to run its selections.
#[derive(Debug)]
pub(crate) struct ObjectScope {
    type_name: String,
    value: Arc<Value>,
    /// The object the field producing this value was resolved on
    parent: Option<Arc<Value>>,
    path: Path,
    selections: Vec<Arc<SelectionNode>>,
    /// Root fields of mutations run one after the other, lazy values included
    serial: bool,
}

/// Parked work.
#[derive(Debug)]
pub(crate) enum Continuation {
    Settle {
        site: Site,
        value: FieldValue,
        type_hint: Option<String>,
    },
    ResolveField {
        site: Site,
        decision: LazyValue<bool>,
    },
    CompleteObject {
        scope: ObjectScope,
        site: Option<Site>,
        decision: LazyValue<bool>,
    },
    ResolveType {
        site: Site,
        abstract_type: String,
        value: Value,
        type_name: LazyValue<String>,
    },
}

#[derive(Debug)]
pub(crate) struct Pending {
    /// Index of the query in its multiplex run
    pub(crate) query: usize,
    pub(crate) step: Continuation,
}

/// The state of one query while it resolves.
#[derive(Debug)]
pub(crate) struct QueryRun {
    tree: Arc<SelectionTree>,
    root_value: Arc<Value>,
    context: Context,
    result: ResultTree,
    errors: Vec<FieldError>,
    stack: ResolutionStack,
}

impl QueryRun {
    pub(crate) fn new(tree: Arc<SelectionTree>, root_value: Value, context: Context) -> Self {
        Self {
            tree,
            root_value: Arc::new(root_value),
            context,
            result: ResultTree::new(),
            errors: Vec::new(),
            stack: ResolutionStack::default(),
        }
    }

    pub(crate) fn finish(self) -> Result<ExecutionResult, ExecutionAbort> {
        if let Some(innermost) = self.stack.current() {
            failfast_error!(
                "{} resolution frame(s) left at the end of the run, innermost at '{}'",
                self.stack.len(),
                innermost.path
            );
            return Err(ExecutionAbort::UnbalancedContext {
                depth: self.stack.len(),
            });
        }
        Ok(ExecutionResult {
            errors: self.errors,
            data: Some(self.result.into_data()),
        })
    }
}

fn locations(nodes: &[Arc<SelectionNode>]) -> Vec<Location> {
    nodes
        .iter()
        .flat_map(|node| node.origins.iter().copied())
        .unique()
        .collect()
}

pub(crate) struct Runtime<'a> {
    pub(crate) engine: &'a Engine,
    pub(crate) shared: &'a Context,
    pub(crate) queue: &'a mut LazyQueue<Pending>,
    pub(crate) run: &'a mut QueryRun,
    pub(crate) query: usize,
}

impl Runtime<'_> {
    /// Resolves everything that can be resolved without settling lazy values.
    pub(crate) fn execute_operation(&mut self) -> Result<(), ExecutionAbort> {
        let tree = self.run.tree.clone();
        let scope = ObjectScope {
            type_name: tree.root_type.clone(),
            value: self.run.root_value.clone(),
            parent: None,
            path: Path::empty(),
            selections: tree.selections.clone(),
            serial: tree.operation_kind == OperationKind::Mutation,
        };
        self.complete_object(scope, None)
    }

    /// Picks up parked work.
    pub(crate) fn resume(&mut self, step: Continuation) -> Result<(), ExecutionAbort> {
        match step {
            Continuation::Settle {
                site,
                value,
                type_hint,
            } => {
                let (path, field) = (site.path.clone(), site.field.clone());
                self.within(path, field, move |runtime| {
                    runtime.settle(site, value, type_hint)
                })
            }
            Continuation::ResolveField { site, decision } => {
                let (path, field) = (site.path.clone(), site.field.clone());
                self.within(path, field, move |runtime| {
                    runtime.decide_field(site, decision)
                })
            }
            Continuation::CompleteObject {
                scope,
                site,
                decision,
            } => match site
                .as_ref()
                .map(|site| (site.path.clone(), site.field.clone()))
            {
                Some((path, field)) => self.within(path, field, move |runtime| {
                    runtime.decide_object(scope, site, decision)
                }),
                None => self.decide_object(scope, site, decision),
            },
            Continuation::ResolveType {
                site,
                abstract_type,
                value,
                type_name,
            } => {
                let (path, field) = (site.path.clone(), site.field.clone());
                self.within(path, field, move |runtime| {
                    let max_steps = runtime.engine.configuration.lazy.max_chain_length;
                    match type_name.flatten_bounded(max_steps) {
                        Ok(type_name) => {
                            runtime.complete_concrete(site, &abstract_type, type_name, value)
                        }
                        Err(error) => runtime.fail(site, error.into()),
                    }
                })
            }
        }
    }

    /// Runs the queue down to empty, for work that must finish before anything else runs.
    fn drain(&mut self) -> Result<(), ExecutionAbort> {
        while let Some((depth, batch)) = self.queue.pop_batch() {
            tracing::trace!(depth, size = batch.len(), "settling serial lazy batch");
            for pending in batch {
                self.resume(pending.step)?;
            }
        }
        Ok(())
    }

    fn defer(&mut self, depth: usize, step: Continuation) {
        self.queue.push(
            depth,
            Pending {
                query: self.query,
                step,
            },
        );
    }

    /// Runs `f` with `field` pushed on the resolution stack.
    fn within<T>(
        &mut self,
        path: Path,
        field: Arc<FieldScope>,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        self.run.stack.push(path, field);
        let outcome = f(self);
        self.run.stack.pop();
        outcome
    }

    fn authorize(
        &self,
        target: AuthorizeTarget<'_>,
        value: &Value,
        path: &Path,
        authorizer: &Authorizer,
    ) -> Result<LazyValue<bool>, ResolveError> {
        self.engine.chain.authorize.call(AuthorizeRequest {
            target,
            value,
            path,
            context: &self.run.context,
            authorizer,
        })
    }

    fn complete_object(
        &mut self,
        scope: ObjectScope,
        site: Option<Site>,
    ) -> Result<(), ExecutionAbort> {
        let engine = self.engine;
        if let Some(authorizer) = engine.resolvers.type_authorizer(&scope.type_name) {
            let decision = self.authorize(
                AuthorizeTarget::Type {
                    type_name: &scope.type_name,
                },
                &scope.value,
                &scope.path,
                authorizer,
            );
            match decision {
                Ok(LazyValue::Ready(true)) => {}
                Ok(LazyValue::Ready(false)) => {
                    self.unauthorized(site.as_ref());
                    return Ok(());
                }
                Ok(decision) => {
                    let depth = scope.path.field_depth();
                    self.defer(
                        depth,
                        Continuation::CompleteObject {
                            scope,
                            site,
                            decision,
                        },
                    );
                    return Ok(());
                }
                Err(error) => {
                    self.authorization_failed(site.as_ref(), error);
                    return Ok(());
                }
            }
        }
        self.execute_selections(scope, site)
    }

    fn decide_object(
        &mut self,
        scope: ObjectScope,
        site: Option<Site>,
        decision: LazyValue<bool>,
    ) -> Result<(), ExecutionAbort> {
        let target = site.as_ref().map_or(Target::Root, |site| site.target.clone());
        if !self.run.result.is_live(&target) {
            return Ok(());
        }
        match decision.flatten_bounded(self.engine.configuration.lazy.max_chain_length) {
            Ok(true) => self.execute_selections(scope, site),
            Ok(false) => {
                self.unauthorized(site.as_ref());
                Ok(())
            }
            Err(error) => {
                self.authorization_failed(site.as_ref(), error.into());
                Ok(())
            }
        }
    }

    fn execute_selections(
        &mut self,
        scope: ObjectScope,
        site: Option<Site>,
    ) -> Result<(), ExecutionAbort> {
        let engine = self.engine;
        let target = site.map_or(Target::Root, |site| site.target);

        // One entry per response key, in document order.
        let mut fields: IndexMap<String, Vec<Arc<SelectionNode>>> = IndexMap::new();
        for node in &scope.selections {
            if engine.schema.applies_to(&node.owner_type, &scope.type_name) {
                fields
                    .entry(node.response_key().to_string())
                    .or_default()
                    .push(node.clone());
            }
        }
        let keys = fields.iter().map(|(key, nodes)| {
            let non_null = nodes
                .first()
                .is_some_and(|node| node.field_type.is_non_null());
            (key.clone(), non_null)
        });
        let Some(object) = self.run.result.object(&target, keys) else {
            return Ok(());
        };

        let scope = Arc::new(scope);
        for (key, nodes) in fields {
            let target = Target::Slot {
                node: object,
                key: SlotKey::Key(key.clone()),
            };
            if scope.serial {
                let mut queue = LazyQueue::new();
                let mut runtime = Runtime {
                    engine,
                    shared: self.shared,
                    queue: &mut queue,
                    run: &mut *self.run,
                    query: self.query,
                };
                runtime.execute_field(&scope, key, nodes, target)?;
                runtime.drain()?;
            } else {
                self.execute_field(&scope, key, nodes, target)?;
            }
        }
        Ok(())
    }

    fn execute_field(
        &mut self,
        scope: &Arc<ObjectScope>,
        key: String,
        nodes: Vec<Arc<SelectionNode>>,
        target: Target,
    ) -> Result<(), ExecutionAbort> {
        let Some(first) = nodes.first().cloned() else {
            return Ok(());
        };
        if first.field_name == TYPENAME {
            self.run
                .result
                .set(&target, Value::String(scope.type_name.as_str().into()));
            return Ok(());
        }

        let mut arguments = first.arguments.clone();
        for (name, value) in self
            .engine
            .schema
            .argument_defaults(&first.owner_type, &first.field_name)
        {
            if !arguments.contains_key(name.as_str()) {
                arguments.insert(name, value);
            }
        }

        let field = Arc::new(FieldScope {
            owner_type: scope.type_name.clone(),
            declared_on: first.owner_type.clone(),
            field_name: first.field_name.clone(),
            arguments,
            nodes,
            object: scope.value.clone(),
            grandparent: scope.parent.clone(),
        });
        let site = Site {
            field: field.clone(),
            ty: first.field_type.clone(),
            path: scope.path.join(key.as_str()),
            target,
        };
        self.within(site.path.clone(), field, move |runtime| {
            runtime.resolve_field(site)
        })
    }

    fn resolve_field(&mut self, site: Site) -> Result<(), ExecutionAbort> {
        let engine = self.engine;
        let field = site.field.clone();
        let authorizer = engine
            .resolvers
            .field_for(
                &engine.schema,
                &field.owner_type,
                &field.declared_on,
                &field.field_name,
            )
            .and_then(|definition| definition.authorizer.as_ref());
        if let Some(authorizer) = authorizer {
            let decision = self.authorize(
                AuthorizeTarget::Field {
                    owner_type: &field.owner_type,
                    field_name: &field.field_name,
                },
                &field.object,
                &site.path,
                authorizer,
            );
            match decision {
                Ok(LazyValue::Ready(true)) => {}
                Ok(LazyValue::Ready(false)) => {
                    self.null_at(&site);
                    return Ok(());
                }
                Ok(decision) => {
                    let depth = site.path.field_depth();
                    self.defer(depth, Continuation::ResolveField { site, decision });
                    return Ok(());
                }
                Err(error) => {
                    self.authorization_failed(Some(&site), error);
                    return Ok(());
                }
            }
        }
        self.invoke(site)
    }

    fn decide_field(
        &mut self,
        site: Site,
        decision: LazyValue<bool>,
    ) -> Result<(), ExecutionAbort> {
        if !self.run.result.is_live(&site.target) {
            return Ok(());
        }
        match decision.flatten_bounded(self.engine.configuration.lazy.max_chain_length) {
            Ok(true) => self.invoke(site),
            Ok(false) => {
                self.null_at(&site);
                Ok(())
            }
            Err(error) => {
                self.authorization_failed(Some(&site), error.into());
                Ok(())
            }
        }
    }

    /// Calls the field's implementation through the field service and completes the result.
    fn invoke(&mut self, site: Site) -> Result<(), ExecutionAbort> {
        let engine = self.engine;
        let field = site.field.clone();
        let definition = engine.resolvers.field_for(
            &engine.schema,
            &field.owner_type,
            &field.declared_on,
            &field.field_name,
        );
        let wants = |extra| definition.is_some_and(|definition| definition.wants(extra));

        let resolved = {
            let info = ResolveInfo {
                owner_type: &field.owner_type,
                field_name: &field.field_name,
                parent: &field.object,
                grandparent: if wants(Extra::Parent) {
                    field.grandparent.as_deref()
                } else {
                    None
                },
                arguments: &field.arguments,
                path: &site.path,
                nodes: &field.nodes,
                context: &self.run.context,
                shared: self.shared,
                lookahead: wants(Extra::Lookahead)
                    .then(|| Lookahead::for_field(&engine.schema, field.nodes.clone())),
                ast_nodes: wants(Extra::AstNodes).then(|| locations(&field.nodes)),
            };
            engine.chain.field.call(FieldRequest {
                info: &info,
                resolver: definition.and_then(|definition| definition.resolver.as_ref()),
            })
        };
        match resolved {
            Ok(value) => self.complete(site, value, None),
            Err(error) => self.fail(site, error),
        }
    }

    fn settle(
        &mut self,
        site: Site,
        value: FieldValue,
        type_hint: Option<String>,
    ) -> Result<(), ExecutionAbort> {
        if !self.run.result.is_live(&site.target) {
            return Ok(());
        }
        let engine = self.engine;
        let field = site.field.clone();
        let settled = engine.chain.lazy.call(LazyRequest {
            value,
            owner_type: &field.owner_type,
            field_name: &field.field_name,
            path: &site.path,
            context: &self.run.context,
            sync: &engine.resolvers.sync,
            max_steps: engine.configuration.lazy.max_chain_length,
        });
        match settled {
            Ok(value) => self.complete(site, value, type_hint),
            Err(error) => self.fail(site, error),
        }
    }

    /// Completes `value` against the type expected at `site`.
    fn complete(
        &mut self,
        site: Site,
        value: FieldValue,
        type_hint: Option<String>,
    ) -> Result<(), ExecutionAbort> {
        if !self.run.result.is_live(&site.target) {
            return Ok(());
        }
        match value {
            value @ (FieldValue::Lazy(_) | FieldValue::External(_)) => {
                let depth = site.path.field_depth();
                self.defer(
                    depth,
                    Continuation::Settle {
                        site,
                        value,
                        type_hint,
                    },
                );
                Ok(())
            }
            FieldValue::Typed { type_name, value } => self.complete(site, *value, Some(type_name)),
            // The first failing item fails the whole list.
            FieldValue::Items(items) => match items.collect::<Result<Vec<_>, _>>() {
                Ok(items) => self.complete_list(site, items),
                Err(error) => self.fail(site, error),
            },
            FieldValue::List(items) => self.complete_list(site, items),
            FieldValue::Value(Value::Null) => {
                self.null_at(&site);
                Ok(())
            }
            FieldValue::Value(Value::Array(items))
                if matches!(site.ty.nullable(), FieldType::List(_)) =>
            {
                self.complete_list(site, items.into_iter().map(FieldValue::Value).collect())
            }
            FieldValue::Value(value) => self.complete_named(site, value, type_hint),
        }
    }

    fn complete_list(&mut self, site: Site, items: Vec<FieldValue>) -> Result<(), ExecutionAbort> {
        let item_type = match site.ty.nullable() {
            FieldType::List(item_type) => item_type.as_ref().clone(),
            _ => {
                let message = format!(
                    "Expected a single value for field {}.{} of type {}, got a list",
                    site.field.owner_type, site.field.field_name, site.ty
                );
                self.error_at(&site, ExecutionError::new(message));
                return Ok(());
            }
        };
        let Some(list) = self
            .run
            .result
            .list(&site.target, items.len(), item_type.is_non_null())
        else {
            return Ok(());
        };
        for (index, item) in items.into_iter().enumerate() {
            let item_site = Site {
                field: site.field.clone(),
                ty: item_type.clone(),
                path: site.path.join(index),
                target: Target::Slot {
                    node: list,
                    key: SlotKey::Index(index),
                },
            };
            self.complete(item_site, item, None)?;
        }
        Ok(())
    }

    fn complete_named(
        &mut self,
        site: Site,
        value: Value,
        type_hint: Option<String>,
    ) -> Result<(), ExecutionAbort> {
        let type_name = match site.ty.nullable() {
            FieldType::List(_) => {
                let message = format!(
                    "Expected a list for field {}.{} of type {}, got {}",
                    site.field.owner_type,
                    site.field.field_name,
                    site.ty,
                    value.describe()
                );
                self.error_at(&site, ExecutionError::new(message));
                return Ok(());
            }
            other => other.inner_type_name().to_string(),
        };
        let engine = self.engine;
        let schema = &engine.schema;
        match schema.kind(&type_name) {
            Some(TypeKind::Scalar) => {
                match coerce_builtin_scalar(&type_name, &value) {
                    // Custom scalars are passed through as they are.
                    None => self.run.result.set(&site.target, value),
                    Some(Ok(coerced)) => self.run.result.set(&site.target, coerced),
                    Some(Err(InvalidValue)) => {
                        let message =
                            format!("{type_name} cannot represent value: {}", value.describe());
                        self.error_at(&site, ExecutionError::new(message));
                    }
                }
                Ok(())
            }
            Some(TypeKind::Enum) => {
                match value.as_str() {
                    Some(name) if schema.enum_has_value(&type_name, name) => {
                        self.run.result.set(&site.target, value)
                    }
                    _ => {
                        let message = format!(
                            "Enum \"{type_name}\" cannot represent value: {}",
                            value.describe()
                        );
                        self.error_at(&site, ExecutionError::new(message));
                    }
                }
                Ok(())
            }
            Some(TypeKind::Object) => self.complete_object_value(site, type_name, value),
            Some(TypeKind::Abstract) => self.complete_abstract(site, type_name, value, type_hint),
            None => {
                failfast_error!("type {} is missing from the schema", type_name);
                self.error_at(
                    &site,
                    ExecutionError::new(format!("Unknown type {type_name}")),
                );
                Ok(())
            }
        }
    }

    fn complete_abstract(
        &mut self,
        site: Site,
        abstract_type: String,
        value: Value,
        type_hint: Option<String>,
    ) -> Result<(), ExecutionAbort> {
        if let Some(type_name) = type_hint {
            return self.complete_concrete(site, &abstract_type, type_name, value);
        }
        let engine = self.engine;
        if let Some(resolver) = engine.resolvers.type_resolver(&abstract_type) {
            return match resolver(&value, &self.run.context) {
                Ok(LazyValue::Ready(type_name)) => {
                    self.complete_concrete(site, &abstract_type, type_name, value)
                }
                Ok(type_name) => {
                    let depth = site.path.field_depth();
                    self.defer(
                        depth,
                        Continuation::ResolveType {
                            site,
                            abstract_type,
                            value,
                            type_name,
                        },
                    );
                    Ok(())
                }
                Err(error) => self.fail(site, error),
            };
        }
        match value.get_key(TYPENAME).and_then(Value::as_str) {
            Some(type_name) => {
                let type_name = type_name.to_string();
                self.complete_concrete(site, &abstract_type, type_name, value)
            }
            None => {
                let message = format!(
                    "Abstract type {abstract_type} must resolve to an object type at runtime for field {}.{}",
                    site.field.owner_type, site.field.field_name
                );
                self.error_at(&site, ExecutionError::new(message));
                Ok(())
            }
        }
    }

    fn complete_concrete(
        &mut self,
        site: Site,
        abstract_type: &str,
        type_name: String,
        value: Value,
    ) -> Result<(), ExecutionAbort> {
        let schema = &self.engine.schema;
        let possible = schema.kind(&type_name) == Some(TypeKind::Object)
            && schema.is_subtype(abstract_type, &type_name);
        if possible {
            self.complete_object_value(site, type_name, value)
        } else {
            let message = format!("{type_name} is not a possible type for {abstract_type}");
            self.error_at(&site, ExecutionError::new(message));
            Ok(())
        }
    }

    fn complete_object_value(
        &mut self,
        site: Site,
        type_name: String,
        value: Value,
    ) -> Result<(), ExecutionAbort> {
        let selections = site
            .field
            .nodes
            .iter()
            .flat_map(|node| node.selections.iter().cloned())
            .collect();
        let scope = ObjectScope {
            type_name,
            value: Arc::new(value),
            parent: Some(site.field.object.clone()),
            path: site.path.clone(),
            selections,
            serial: false,
        };
        self.complete_object(scope, Some(site))
    }

    /// Recovers from a resolver error, or hands a raised error to its handler.
    ///
    /// A raised error nobody handles aborts the query.
    fn fail(&mut self, site: Site, error: ResolveError) -> Result<(), ExecutionAbort> {
        let raised = match error {
            ResolveError::Execution(error) => {
                self.error_at(&site, error);
                return Ok(());
            }
            ResolveError::Raised(raised) => raised,
        };
        let engine = self.engine;
        let Some(handler) = engine.resolvers.handler_for(&raised.kind) else {
            return Err(ExecutionAbort::unhandled(raised, site.path));
        };
        tracing::debug!(kind = %raised.kind, path = %site.path, "handling raised error");
        let handled = {
            let field = self
                .run
                .stack
                .current()
                .map_or(&site.field, |frame| &frame.field);
            handler(
                &raised,
                &HandlerInfo {
                    owner_type: &field.owner_type,
                    field_name: &field.field_name,
                    arguments: &field.arguments,
                    path: &site.path,
                    context: &self.run.context,
                },
            )
        };
        match handled {
            Ok(value) => self.complete(site, value, None),
            Err(ResolveError::Execution(error)) => {
                self.error_at(&site, error);
                Ok(())
            }
            Err(ResolveError::Raised(raised)) => Err(ExecutionAbort::unhandled(raised, site.path)),
        }
    }

    fn authorization_failed(&mut self, site: Option<&Site>, error: ResolveError) {
        match (error, site) {
            (ResolveError::Execution(error), Some(site)) => self.error_at(site, error),
            (ResolveError::Execution(error), None) => {
                self.run.errors.push(
                    FieldError::builder()
                        .message(error.message)
                        .extensions(error.extensions)
                        .build(),
                );
                self.run.result.set_null(&Target::Root);
            }
            (ResolveError::Raised(error), site) => {
                tracing::debug!(%error, "authorizer raised, value treated as unauthorized");
                self.unauthorized(site);
            }
        }
    }

    fn unauthorized(&mut self, site: Option<&Site>) {
        match site {
            Some(site) => self.null_at(site),
            None => self.run.result.set_null(&Target::Root),
        }
    }

    /// Nulls the value at `site` and records `error` as the one error for it.
    fn error_at(&mut self, site: &Site, error: ExecutionError) {
        if !self.run.result.is_live(&site.target) {
            return;
        }
        self.run.errors.push(FieldError::from_execution_error(
            error,
            site.path.clone(),
            locations(&site.field.nodes),
        ));
        self.run.result.set_null(&site.target);
    }

    /// Nulls the value at `site`, recording an error when the position is non-null.
    fn null_at(&mut self, site: &Site) {
        if !self.run.result.is_live(&site.target) {
            return;
        }
        if site.ty.is_non_null() {
            let message = match site.target.index() {
                Some(index) => format!(
                    "Cannot return null for non-nullable array element of type {} at index {index}",
                    site.ty.nullable()
                ),
                None => format!(
                    "Cannot return null for non-nullable field {}.{}",
                    site.field.owner_type, site.field.field_name
                ),
            };
            self.run.errors.push(
                FieldError::builder()
                    .message(message)
                    .locations(locations(&site.field.nodes))
                    .path(site.path.clone())
                    .build(),
            );
        }
        self.run.result.set_null(&site.target);
    }
}
