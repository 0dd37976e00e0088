//! Error types.
//!
//! Errors fall in three groups:
//!
//! * [`FieldError`] is the wire shape found in the `errors` list of an [`ExecutionResult`].
//! * [`ResolveError`] is what host code returns from resolvers, authorizers and handlers.
//!   Its [`ExecutionError`] variant is recovered at the field that raised it, its
//!   [`RaisedError`] variant is not.
//! * [`ExecutionAbort`] is what escapes a run when a query cannot be completed at all.
//!
//! [`ExecutionResult`]: crate::ExecutionResult

use std::fmt;

use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;
use thiserror::Error;

use crate::json_ext::Object;
use crate::json_ext::Path;

/// Error type used by trace hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A location in the GraphQL document of the originating request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors)
/// as found in the `errors` field of an [`ExecutionResult`](crate::ExecutionResult).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct FieldError {
    /// The error message.
    pub message: String,

    /// The locations of the error in the GraphQL document of the originating request.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub locations: Vec<Location>,

    /// If this is a field error, the JSON path to that field in the result data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,

    /// The optional GraphQL extensions for this error.
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl FieldError {
    /// Returns a builder that builds a [`FieldError`] from its components.
    ///
    /// Builder methods:
    ///
    /// * `.message(impl Into<`[`String`]`>)`
    ///   Required.
    ///
    /// * `.locations(impl Into<`[`Vec`]`<`[`Location`]`>>)` or `.location(impl Into<`[`Location`]`>)`
    ///   Optional.
    ///
    /// * `.path(impl Into<`[`Path`]`>)`
    ///   Optional.
    ///
    /// * `.extensions(...)` or `.extension(impl Into<`[`ByteString`]`>, impl Into<`[`Value`]`>)`
    ///   Optional.
    #[builder(visibility = "pub")]
    fn new(
        message: String,
        locations: Vec<Location>,
        path: Option<Path>,
        // Skip the `Object` type alias in order to use buildstructor’s map special-casing
        extensions: JsonMap<ByteString, Value>,
    ) -> Self {
        Self {
            message,
            locations,
            path,
            extensions,
        }
    }
}

impl FieldError {
    pub(crate) fn from_execution_error(
        error: ExecutionError,
        path: Path,
        locations: Vec<Location>,
    ) -> Self {
        FieldError::builder()
            .message(error.message)
            .locations(locations)
            .path(path)
            .extensions(error.extensions)
            .build()
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} (at {path})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// A recognized execution error.
///
/// Returning one from a resolver nulls the field, records exactly one [`FieldError`] at its
/// path, and lets null propagation take over from there.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
    pub extensions: Object,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: Object::new(),
        }
    }

    pub fn with_extension(mut self, key: impl Into<ByteString>, value: impl Into<Value>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }
}

/// Any other error raised by host code.
///
/// It is not caught by the resolver. A handler registered for its `kind` (or one of the
/// kind's declared ancestors) gets a chance to convert it, otherwise the query aborts.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RaisedError {
    pub kind: String,
    pub message: String,
}

impl RaisedError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Error returned by resolvers, authorizers, type resolvers and error handlers.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Raised(#[from] RaisedError),
}

impl ResolveError {
    pub fn message(&self) -> &str {
        match self {
            ResolveError::Execution(error) => &error.message,
            ResolveError::Raised(error) => &error.message,
        }
    }
}

/// An error that aborts a query, and with it the multiplex run it belongs to.
#[derive(Error, Debug, Display, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExecutionAbort {
    /// unhandled {kind} error at '{path}': {message}
    Unhandled {
        kind: String,
        message: String,
        path: Path,
    },
    /// trace hook '{hook}' failed in {phase}: {message}
    Hook {
        hook: String,
        phase: String,
        message: String,
    },
    /// resolution context was not unwound: {depth} frame(s) left at the end of the run
    UnbalancedContext { depth: usize },
}

impl ExecutionAbort {
    pub fn hook(hook: &str, phase: &str, error: BoxError) -> Self {
        ExecutionAbort::Hook {
            hook: hook.to_string(),
            phase: phase.to_string(),
            message: error.to_string(),
        }
    }

    pub(crate) fn unhandled(error: RaisedError, path: Path) -> Self {
        ExecutionAbort::Unhandled {
            kind: error.kind,
            message: error.message,
            path,
        }
    }
}
