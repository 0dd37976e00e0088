//! Host-provided behavior: field implementations, authorizers, type resolvers, error
//! handlers and sync hooks.
//!
//! The registry is filled once, before the [`Executor`](crate::Executor) is built, and is
//! read-only afterwards.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Location;
use crate::error::RaisedError;
use crate::error::ResolveError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::lazy::FieldValue;
use crate::lazy::LazySync;
use crate::lazy::LazyValue;
use crate::lookahead::Lookahead;
use crate::spec::Schema;
use crate::spec::SelectionNode;

pub(crate) type FieldResolver =
    Arc<dyn Fn(&ResolveInfo<'_>) -> Result<FieldValue, ResolveError> + Send + Sync>;
pub(crate) type Authorizer =
    Arc<dyn Fn(&Value, &Context) -> Result<LazyValue<bool>, ResolveError> + Send + Sync>;
pub(crate) type TypeResolver =
    Arc<dyn Fn(&Value, &Context) -> Result<LazyValue<String>, ResolveError> + Send + Sync>;
pub(crate) type ErrorHandler =
    Arc<dyn Fn(&RaisedError, &HandlerInfo<'_>) -> Result<FieldValue, ResolveError> + Send + Sync>;

/// Values a field implementation can ask to have injected into its [`ResolveInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extra {
    /// The lookahead below the field
    Lookahead,
    /// The value of the parent object's own parent
    Parent,
    /// Source locations of every occurrence of the field
    AstNodes,
}

/// Everything known about the field being resolved.
#[derive(Clone)]
pub struct ResolveInfo<'a> {
    pub(crate) owner_type: &'a str,
    pub(crate) field_name: &'a str,
    pub(crate) parent: &'a Value,
    pub(crate) grandparent: Option<&'a Value>,
    pub(crate) arguments: &'a Object,
    pub(crate) path: &'a Path,
    pub(crate) nodes: &'a [Arc<SelectionNode>],
    pub(crate) context: &'a Context,
    pub(crate) shared: &'a Context,
    pub(crate) lookahead: Option<Lookahead>,
    pub(crate) ast_nodes: Option<Vec<Location>>,
}

impl<'a> ResolveInfo<'a> {
    /// The concrete object type the field is resolved on.
    pub fn owner_type(&self) -> &'a str {
        self.owner_type
    }

    pub fn field_name(&self) -> &'a str {
        self.field_name
    }

    /// The value of the object the field belongs to.
    pub fn parent(&self) -> &'a Value {
        self.parent
    }

    pub fn arguments(&self) -> &'a Object {
        self.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&'a Value> {
        self.arguments.get(name)
    }

    pub fn path(&self) -> &'a Path {
        self.path
    }

    /// The merged selection nodes this field executes for.
    pub fn nodes(&self) -> &'a [Arc<SelectionNode>] {
        self.nodes
    }

    /// The per-query context.
    pub fn context(&self) -> &'a Context {
        self.context
    }

    /// The context shared by every query of a multiplex run.
    pub fn shared(&self) -> &'a Context {
        self.shared
    }

    /// Set when the field declares [`Extra::Lookahead`].
    pub fn lookahead(&self) -> Option<&Lookahead> {
        self.lookahead.as_ref()
    }

    /// Set when the field declares [`Extra::Parent`] and the parent object has a parent.
    pub fn grandparent(&self) -> Option<&'a Value> {
        self.grandparent
    }

    /// Set when the field declares [`Extra::AstNodes`].
    pub fn ast_nodes(&self) -> Option<&[Location]> {
        self.ast_nodes.as_deref()
    }
}

impl fmt::Debug for ResolveInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveInfo")
            .field("owner_type", &self.owner_type)
            .field("field_name", &self.field_name)
            .field("path", &self.path)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

/// What an error handler knows about the failing field.
#[derive(Debug, Clone)]
pub struct HandlerInfo<'a> {
    pub owner_type: &'a str,
    pub field_name: &'a str,
    pub arguments: &'a Object,
    pub path: &'a Path,
    pub context: &'a Context,
}

/// The implementation of one field.
#[derive(Clone, Default)]
pub struct FieldDefinition {
    pub(crate) resolver: Option<FieldResolver>,
    pub(crate) authorizer: Option<Authorizer>,
    pub(crate) extras: Vec<Extra>,
}

impl FieldDefinition {
    pub fn new<F>(resolver: F) -> Self
    where
        F: Fn(&ResolveInfo<'_>) -> Result<FieldValue, ResolveError> + Send + Sync + 'static,
    {
        Self {
            resolver: Some(Arc::new(resolver)),
            ..Default::default()
        }
    }

    /// A field read from its parent object, under the field's name.
    pub fn from_parent() -> Self {
        Self::default()
    }

    /// Consulted before the field resolves. The field is null when it says no.
    pub fn authorize<F>(mut self, authorizer: F) -> Self
    where
        F: Fn(&Value, &Context) -> Result<LazyValue<bool>, ResolveError> + Send + Sync + 'static,
    {
        self.authorizer = Some(Arc::new(authorizer));
        self
    }

    pub fn extra(mut self, extra: Extra) -> Self {
        if !self.extras.contains(&extra) {
            self.extras.push(extra);
        }
        self
    }

    pub(crate) fn wants(&self, extra: Extra) -> bool {
        self.extras.contains(&extra)
    }
}

impl fmt::Debug for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("resolver", &self.resolver.is_some())
            .field("authorizer", &self.authorizer.is_some())
            .field("extras", &self.extras)
            .finish()
    }
}

/// Reads `field_name` from the parent object.
pub(crate) fn default_resolver(info: &ResolveInfo<'_>) -> Result<FieldValue, ResolveError> {
    Ok(info
        .parent
        .get_key(info.field_name)
        .cloned()
        .unwrap_or(Value::Null)
        .into())
}

/// Registry of everything the executor calls back into.
#[derive(Clone, Default)]
pub struct Resolvers {
    fields: HashMap<String, HashMap<String, FieldDefinition>>,
    type_authorizers: HashMap<String, Authorizer>,
    type_resolvers: HashMap<String, TypeResolver>,
    error_kinds: HashMap<String, String>,
    handlers: HashMap<String, ErrorHandler>,
    pub(crate) sync: LazySync,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the implementation of `owner.name`.
    ///
    /// `owner` may be an object type or an interface; implementations registered on an
    /// object type take precedence.
    pub fn field<F>(self, owner: &str, name: &str, resolver: F) -> Self
    where
        F: Fn(&ResolveInfo<'_>) -> Result<FieldValue, ResolveError> + Send + Sync + 'static,
    {
        self.field_definition(owner, name, FieldDefinition::new(resolver))
    }

    pub fn field_definition(mut self, owner: &str, name: &str, definition: FieldDefinition) -> Self {
        self.fields
            .entry(owner.to_string())
            .or_default()
            .insert(name.to_string(), definition);
        self
    }

    /// Consulted every time a value completes as `type_name`, the root value included.
    pub fn authorize_type<F>(mut self, type_name: &str, authorizer: F) -> Self
    where
        F: Fn(&Value, &Context) -> Result<LazyValue<bool>, ResolveError> + Send + Sync + 'static,
    {
        self.type_authorizers
            .insert(type_name.to_string(), Arc::new(authorizer));
        self
    }

    /// Picks the concrete object type for values at `abstract_type` positions.
    pub fn resolve_type<F>(mut self, abstract_type: &str, resolver: F) -> Self
    where
        F: Fn(&Value, &Context) -> Result<LazyValue<String>, ResolveError> + Send + Sync + 'static,
    {
        self.type_resolvers
            .insert(abstract_type.to_string(), Arc::new(resolver));
        self
    }

    /// Declares `parent` as the parent kind of `kind` for handler lookup.
    pub fn error_kind(mut self, kind: &str, parent: &str) -> Self {
        self.error_kinds.insert(kind.to_string(), parent.to_string());
        self
    }

    /// Handles raised errors of `kind` and of every kind declared below it.
    ///
    /// Registering a second handler for the same kind replaces the first.
    pub fn rescue_from<F>(mut self, kind: &str, handler: F) -> Self
    where
        F: Fn(&RaisedError, &HandlerInfo<'_>) -> Result<FieldValue, ResolveError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(kind.to_string(), Arc::new(handler));
        self
    }

    /// Settles external lazy values of type `T`.
    pub fn sync_lazy<T, F>(mut self, hook: F) -> Self
    where
        T: 'static,
        F: Fn(T) -> Result<FieldValue, ResolveError> + Send + Sync + 'static,
    {
        self.sync.register::<T, F>(hook);
        self
    }

    /// The implementation of `name` on values of `object_type`.
    ///
    /// Looks at the object type first, then at the type the selection was made on, then at
    /// every interface the object type implements.
    pub(crate) fn field_for(
        &self,
        schema: &Schema,
        object_type: &str,
        declared_on: &str,
        name: &str,
    ) -> Option<&FieldDefinition> {
        let on = |owner: &str| self.fields.get(owner).and_then(|fields| fields.get(name));
        on(object_type)
            .or_else(|| on(declared_on))
            .or_else(|| schema.interfaces(object_type).into_iter().find_map(on))
    }

    pub(crate) fn type_authorizer(&self, type_name: &str) -> Option<&Authorizer> {
        self.type_authorizers.get(type_name)
    }

    pub(crate) fn type_resolver(&self, abstract_type: &str) -> Option<&TypeResolver> {
        self.type_resolvers.get(abstract_type)
    }

    /// The handler for `kind`, walking declared parent kinds from most to least specific.
    pub(crate) fn handler_for(&self, kind: &str) -> Option<&ErrorHandler> {
        let mut seen = HashSet::new();
        let mut current = Some(kind);
        while let Some(kind) = current {
            if !seen.insert(kind) {
                failfast_debug!("error kind hierarchy has a cycle through {}", kind);
                return None;
            }
            if let Some(handler) = self.handlers.get(kind) {
                return Some(handler);
            }
            current = self.error_kinds.get(kind).map(String::as_str);
        }
        None
    }
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolvers")
            .field("fields", &self.fields)
            .field("type_authorizers", &self.type_authorizers.keys())
            .field("type_resolvers", &self.type_resolvers.keys())
            .field("error_kinds", &self.error_kinds)
            .field("handlers", &self.handlers.keys())
            .field("sync", &self.sync)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::ExecutionError;

    fn call(handler: &ErrorHandler) -> String {
        let context = Context::new();
        let info = HandlerInfo {
            owner_type: "Query",
            field_name: "f1",
            arguments: &Object::new(),
            path: &Path::from("f1"),
            context: &context,
        };
        match handler(&RaisedError::new("Any", "x"), &info) {
            Ok(FieldValue::Value(value)) => value.as_str().unwrap_or_default().to_string(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn handlers_resolve_most_specific_kind_first() {
        let resolvers = Resolvers::new()
            .error_kind("ArgumentError", "StandardError")
            .error_kind("RangeError", "ArgumentError")
            .rescue_from("StandardError", |_, _| Ok(json!("standard").into()))
            .rescue_from("ArgumentError", |_, _| Ok(json!("argument").into()));

        assert_eq!(call(resolvers.handler_for("RangeError").unwrap()), "argument");
        assert_eq!(call(resolvers.handler_for("ArgumentError").unwrap()), "argument");
        assert_eq!(call(resolvers.handler_for("StandardError").unwrap()), "standard");
        assert!(resolvers.handler_for("Timeout").is_none());
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let resolvers = Resolvers::new()
            .rescue_from("Boom", |_, _| Ok(json!("first").into()))
            .rescue_from("Boom", |_, _| Ok(json!("second").into()));
        assert_eq!(call(resolvers.handler_for("Boom").unwrap()), "second");
    }

    #[test]
    fn cyclic_hierarchy_terminates() {
        let resolvers = Resolvers::new()
            .error_kind("A", "B")
            .error_kind("B", "A")
            .rescue_from("C", |_, _| Err(ExecutionError::new("c").into()));
        assert!(resolvers.handler_for("A").is_none());
    }

    #[test]
    fn object_type_fields_take_precedence_over_interface_fields() {
        let schema = Schema::parse(
            r#"
            type Query { node: Node post: Post }
            interface Node { id: ID! }
            type User implements Node { id: ID! }
            type Post implements Node { id: ID! }
            type Tag { id: ID! }
            "#,
        )
        .unwrap();
        let resolvers = Resolvers::new()
            .field("Node", "id", |_| Ok(json!("node").into()))
            .field("User", "id", |_| Ok(json!("user").into()));
        let resolve = |object_type: &str, declared_on: &str| {
            let definition = resolvers.field_for(&schema, object_type, declared_on, "id")?;
            let parent = Value::Null;
            let context = Context::new();
            let info = ResolveInfo {
                owner_type: object_type,
                field_name: "id",
                parent: &parent,
                grandparent: None,
                arguments: &Object::new(),
                path: &Path::from("id"),
                nodes: &[],
                context: &context,
                shared: &context,
                lookahead: None,
                ast_nodes: None,
            };
            match (definition.resolver.as_ref()?)(&info) {
                Ok(FieldValue::Value(value)) => value.as_str().map(str::to_string),
                _ => None,
            }
        };
        assert_eq!(resolve("User", "Node").as_deref(), Some("user"));
        assert_eq!(resolve("Post", "Node").as_deref(), Some("node"));
        // Selected on the object type itself, the interface implementation still applies.
        assert_eq!(resolve("Post", "Post").as_deref(), Some("node"));
        assert_eq!(resolve("Tag", "Tag"), None);
    }

    #[test]
    fn default_resolver_reads_parent_keys() {
        let context = Context::new();
        let parent = json!({ "name": "Ada" });
        let info = ResolveInfo {
            owner_type: "User",
            field_name: "name",
            parent: &parent,
            grandparent: None,
            arguments: &Object::new(),
            path: &Path::from("me/name"),
            nodes: &[],
            context: &context,
            shared: &context,
            lookahead: None,
            ast_nodes: None,
        };
        match default_resolver(&info).unwrap() {
            FieldValue::Value(value) => assert_eq!(value, json!("Ada")),
            other => panic!("unexpected {other:?}"),
        }
        let info = ResolveInfo {
            field_name: "missing",
            ..info
        };
        match default_resolver(&info).unwrap() {
            FieldValue::Value(value) => assert_eq!(value, Value::Null),
            other => panic!("unexpected {other:?}"),
        }
    }
}
