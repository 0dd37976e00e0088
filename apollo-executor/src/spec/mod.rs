//! Selection tree construction from GraphQL documents, with the schema knowledge execution needs.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod field_type;
mod query;
mod schema;
mod selection;

use displaydoc::Display;
pub use field_type::FieldType;
pub(crate) use field_type::InvalidValue;
pub(crate) use field_type::coerce_builtin_scalar;
pub use query::OperationKind;
pub use query::PreparedQuery;
pub use schema::Schema;
pub(crate) use schema::TypeKind;
pub use selection::SelectionNode;
pub use selection::SelectionTree;
pub(crate) use selection::insert_merged;
use thiserror::Error;

use crate::error::FieldError;

pub(crate) const TYPENAME: &str = "__typename";

/// GraphQL document errors.
#[derive(Error, Debug, Display, Clone, PartialEq)]
#[non_exhaustive]
pub enum SpecError {
    /// selection processing recursion limit({0}) exceeded
    RecursionLimitExceeded(usize),
    /// parsing error: {0}
    ParsingError(String),
    /// validation error
    ValidationError(Vec<FieldError>),
    /// Unknown operation named "{0}"
    UnknownOperation(String),
    /// Must provide operation name if query contains multiple operations.
    AmbiguousOperation,
    /// Variable "${0}" used in a @skip or @include condition was not provided
    MissingConditionVariable(String),
    /// Unknown fragment "{0}"
    UnknownFragment(String),
    /// subscription operation is not supported
    SubscriptionNotSupported,
}

impl SpecError {
    pub(crate) const fn extension_code(&self) -> &'static str {
        match self {
            SpecError::RecursionLimitExceeded(_) => "RECURSION_LIMIT_EXCEEDED",
            SpecError::ParsingError(_) => "GRAPHQL_PARSE_FAILED",
            SpecError::ValidationError(_)
            | SpecError::UnknownOperation(_)
            | SpecError::AmbiguousOperation
            | SpecError::MissingConditionVariable(_)
            | SpecError::UnknownFragment(_) => "GRAPHQL_VALIDATION_FAILED",
            SpecError::SubscriptionNotSupported => "SUBSCRIPTION_NOT_SUPPORTED",
        }
    }

    /// Converts the error into the errors of an errors-only result.
    pub fn into_field_errors(self) -> Vec<FieldError> {
        let code = self.extension_code();
        match self {
            SpecError::ValidationError(errors) => errors
                .into_iter()
                .map(|mut error| {
                    if !error.extensions.contains_key("code") {
                        error.extensions.insert("code", code.into());
                    }
                    error
                })
                .collect(),
            other => vec![
                FieldError::builder()
                    .message(other.to_string())
                    .extension("code", code)
                    .build(),
            ],
        }
    }
}
