use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;

use crate::context::Context;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// One query of a multiplex run.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Request {
    /// The GraphQL document.
    pub query: String,

    /// The operation to run, required when the document holds several.
    pub operation_name: Option<String>,

    /// The values of the operation's variables.
    pub variables: Object,

    /// The object root fields are resolved on. Defaults to an empty object.
    pub root_value: Value,

    /// The context handed to every resolver of this query.
    pub context: Context,
}

#[buildstructor::buildstructor]
impl Request {
    /// Returns a builder that builds a [`Request`] from its components.
    ///
    /// Builder methods:
    ///
    /// * `.query(impl Into<`[`String`]`>)`
    ///   Required.
    ///
    /// * `.operation_name(impl Into<`[`String`]`>)`
    ///   Optional.
    ///
    /// * `.variables(...)` or `.variable(impl Into<`[`ByteString`]`>, impl Into<`[`Value`]`>)`
    ///   Optional.
    ///
    /// * `.root_value(impl Into<`[`Value`]`>)`
    ///   Optional.
    ///
    /// * `.context(`[`Context`]`)`
    ///   Optional.
    #[builder(visibility = "pub")]
    fn new(
        query: String,
        operation_name: Option<String>,
        // Skip the `Object` type alias in order to use buildstructor’s map special-casing
        variables: JsonMap<ByteString, Value>,
        root_value: Option<Value>,
        context: Option<Context>,
    ) -> Self {
        Self {
            query,
            operation_name,
            variables,
            root_value: root_value.unwrap_or_else(|| Value::Object(Object::new())),
            context: context.unwrap_or_default(),
        }
    }
}
