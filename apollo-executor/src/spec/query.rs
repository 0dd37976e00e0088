//! Preparation of a GraphQL request for execution.

use std::fmt;
use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::ast;
use apollo_compiler::validation::DiagnosticList;
use apollo_compiler::validation::Valid;
use derivative::Derivative;
use serde::Serialize;

use crate::Configuration;
use crate::error::FieldError;
use crate::error::Location;
use crate::json_ext::Object;
use crate::lookahead::Lookahead;
use crate::spec::Schema;
use crate::spec::SpecError;
use crate::spec::selection::TreeBuilder;
use crate::spec::selection::json_value;
use crate::spec::SelectionTree;

/// The kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ast::OperationType> for OperationKind {
    fn from(operation_type: ast::OperationType) -> Self {
        match operation_type {
            ast::OperationType::Query => OperationKind::Query,
            ast::OperationType::Mutation => OperationKind::Mutation,
            ast::OperationType::Subscription => OperationKind::Subscription,
        }
    }
}

/// A request whose operation has been selected, validated and turned into a selection tree.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct PreparedQuery {
    tree: Arc<SelectionTree>,
    /// Request variables with the operation's defaults filled in.
    variables: Object,
    #[derivative(Debug = "ignore")]
    schema: Schema,
}

impl PreparedQuery {
    #[tracing::instrument(skip_all, level = "trace")]
    pub(crate) fn parse(
        schema: &Schema,
        query: &str,
        operation_name: Option<&str>,
        variables: &Object,
        configuration: &Configuration,
    ) -> Result<Self, SpecError> {
        let document = if configuration.validation.enabled {
            ExecutableDocument::parse_and_validate(schema.definitions(), query, "query.graphql")
                .map_err(|errors| SpecError::ValidationError(field_errors(&errors.errors)))?
        } else {
            Valid::assume_valid(
                ExecutableDocument::parse(schema.definitions(), query, "query.graphql")
                    .map_err(|errors| SpecError::ParsingError(errors.errors.to_string()))?,
            )
        };

        let operation = document
            .operations
            .get(operation_name)
            .map_err(|_| match operation_name {
                Some(name) => SpecError::UnknownOperation(name.to_string()),
                None if document.operations.is_empty() => {
                    SpecError::UnknownOperation(String::new())
                }
                None => SpecError::AmbiguousOperation,
            })?;

        let kind = OperationKind::from(operation.operation_type);
        if kind == OperationKind::Subscription {
            return Err(SpecError::SubscriptionNotSupported);
        }

        let mut variables = variables.clone();
        for definition in &operation.variables {
            if variables.contains_key(definition.name.as_str()) {
                continue;
            }
            if let Some(default) = &definition.default_value {
                let value = json_value(default, &Object::new());
                variables.insert(definition.name.as_str(), value);
            }
        }

        let tree = TreeBuilder::new(
            &document,
            &variables,
            configuration.execution.recursion_limit,
        )
        .build(kind, &operation.selection_set)?;

        Ok(Self {
            tree: Arc::new(tree),
            variables,
            schema: schema.clone(),
        })
    }

    pub fn tree(&self) -> &Arc<SelectionTree> {
        &self.tree
    }

    pub fn operation_kind(&self) -> OperationKind {
        self.tree.operation_kind
    }

    /// The variables the selection tree was built with.
    pub fn variables(&self) -> &Object {
        &self.variables
    }

    /// A lookahead over the operation's root selections.
    pub fn lookahead(&self) -> Lookahead {
        Lookahead::root(self.schema.clone(), self.tree.clone())
    }
}

fn field_errors(errors: &DiagnosticList) -> Vec<FieldError> {
    errors
        .iter()
        .map(|diagnostic| diagnostic.unstable_to_json_compat())
        .map(|error| {
            FieldError::builder()
                .message(error.message)
                .locations(
                    error
                        .locations
                        .iter()
                        .map(|location| Location {
                            line: location.line as u32,
                            column: location.column as u32,
                        })
                        .collect::<Vec<_>>(),
                )
                .build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    const SDL: &str = r#"
        type Query { greeting(name: String): String me: User }
        type Mutation { rename(name: String!): User }
        type Subscription { ticks: Int }
        type User { name: String }
    "#;

    fn prepare(query: &str, operation_name: Option<&str>) -> Result<PreparedQuery, SpecError> {
        prepare_with(query, operation_name, json!({}), &Configuration::default())
    }

    fn prepare_with(
        query: &str,
        operation_name: Option<&str>,
        variables: serde_json_bytes::Value,
        configuration: &Configuration,
    ) -> Result<PreparedQuery, SpecError> {
        let schema = Schema::parse(SDL).unwrap();
        let variables = variables.as_object().cloned().unwrap_or_default();
        PreparedQuery::parse(&schema, query, operation_name, &variables, configuration)
    }

    #[test]
    fn selects_named_operation() {
        let prepared = prepare(
            "query A { greeting } mutation B { rename(name: \"x\") { name } }",
            Some("B"),
        )
        .unwrap();
        assert_eq!(prepared.operation_kind(), OperationKind::Mutation);
        assert_eq!(prepared.tree().root_type(), "Mutation");
    }

    #[test]
    fn operation_selection_errors() {
        assert_eq!(
            prepare("query A { greeting }", Some("C")).unwrap_err(),
            SpecError::UnknownOperation("C".to_string())
        );
        assert_eq!(
            prepare("query A { greeting } query B { me { name } }", None).unwrap_err(),
            SpecError::AmbiguousOperation
        );
    }

    #[test]
    fn subscriptions_are_rejected() {
        assert_eq!(
            prepare("subscription { ticks }", None).unwrap_err(),
            SpecError::SubscriptionNotSupported
        );
    }

    #[test]
    fn validation_errors_carry_locations() {
        let error = prepare("{ greeting unknownField }", None).unwrap_err();
        let SpecError::ValidationError(errors) = error else {
            panic!("expected a validation error, got {error:?}");
        };
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("unknownField"));
        assert_eq!(errors[0].locations, vec![Location { line: 1, column: 12 }]);
    }

    #[test]
    fn disabled_validation_only_parses() {
        let configuration: Configuration = "validation:\n  enabled: false\n".parse().unwrap();
        // An argument of the wrong type only fails validation.
        assert!(matches!(
            prepare("{ greeting(name: 1) }", None),
            Err(SpecError::ValidationError(_))
        ));
        assert!(prepare_with("{ greeting(name: 1) }", None, json!({}), &configuration).is_ok());
        assert!(matches!(
            prepare_with("{ greeting", None, json!({}), &configuration),
            Err(SpecError::ParsingError(_))
        ));
    }

    #[test]
    fn variable_defaults_are_merged() {
        let prepared = prepare_with(
            "query($name: String = \"world\", $other: String = \"x\") { greeting(name: $name) }",
            None,
            json!({ "other": "given" }),
            &Configuration::default(),
        )
        .unwrap();
        assert_eq!(
            serde_json_bytes::Value::Object(prepared.variables().clone()),
            json!({ "other": "given", "name": "world" })
        );
        assert_eq!(
            prepared.tree().selections()[0].arguments().get("name"),
            Some(&json!("world"))
        );
    }
}
