use serde::Deserialize;
use serde::Serialize;

use crate::error::FieldError;
use crate::json_ext::Value;

/// The result of executing one query.
///
/// Serializes as `{"errors": [...], "data": ...}`, errors first. `errors` is left out
/// when empty, and `data` is left out for results that never started resolving.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ExecutionResult {
    /// The errors encountered, in discovery order.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<FieldError>,

    /// The result data. `Some(Value::Null)` when null propagated up to the root.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
}

#[buildstructor::buildstructor]
impl ExecutionResult {
    /// Returns a builder that builds an [`ExecutionResult`] from its components.
    #[builder(visibility = "pub")]
    fn new(errors: Vec<FieldError>, data: Option<Value>) -> Self {
        Self { errors, data }
    }

    /// A result for a query that failed before anything was resolved.
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        Self { errors, data: None }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}
