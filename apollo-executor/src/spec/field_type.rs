use std::fmt;

use apollo_compiler::ast;
use serde_json_bytes::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InvalidValue;

/// The declared output type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Named type {0}
    Named(String),
    /// List type {0}
    List(Box<FieldType>),
    /// Non null type {0}
    NonNull(Box<FieldType>),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Named(ty) => write!(f, "{ty}"),
            FieldType::List(ty) => write!(f, "[{ty}]"),
            FieldType::NonNull(ty) => write!(f, "{ty}!"),
        }
    }
}

impl FieldType {
    /// return the name of the type on which selections happen
    ///
    /// Example if we get the field `list: [User!]!`, it will return "User"
    pub fn inner_type_name(&self) -> &str {
        match self {
            FieldType::Named(name) => name.as_str(),
            FieldType::List(inner) | FieldType::NonNull(inner) => inner.inner_type_name(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, FieldType::NonNull(_))
    }

    /// Strips a non-null wrapper, if any.
    pub(crate) fn nullable(&self) -> &FieldType {
        match self {
            FieldType::NonNull(inner) => inner,
            other => other,
        }
    }
}

impl From<&ast::Type> for FieldType {
    // Spec: https://spec.graphql.org/draft/#sec-Type-References
    fn from(ty: &ast::Type) -> Self {
        match ty {
            ast::Type::Named(name) => FieldType::Named(name.as_str().to_string()),
            ast::Type::NonNullNamed(name) => {
                FieldType::NonNull(Box::new(FieldType::Named(name.as_str().to_string())))
            }
            ast::Type::List(inner) => FieldType::List(Box::new(inner.as_ref().into())),
            ast::Type::NonNullList(inner) => FieldType::NonNull(Box::new(FieldType::List(
                Box::new(inner.as_ref().into()),
            ))),
        }
    }
}

/// Applies result coercion for built-in scalars.
///
/// Returns `None` when `name` is not a built-in scalar.
// Primitives are taken from scalars: https://spec.graphql.org/draft/#sec-Scalars
pub(crate) fn coerce_builtin_scalar(
    name: &str,
    value: &Value,
) -> Option<Result<Value, InvalidValue>> {
    let coerced = match (name, value) {
        ("String", Value::String(_)) => Ok(value.clone()),
        // Spec: https://spec.graphql.org/June2018/#sec-Int
        ("Int", Value::Number(number)) => number
            .as_i64()
            .and_then(|x| i32::try_from(x).ok())
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .and_then(|f| i32::try_from(f as i64).ok())
            })
            .map(Value::from)
            .ok_or(InvalidValue),
        // Spec: https://spec.graphql.org/draft/#sec-Float
        ("Float", Value::Number(number)) => number
            .as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or(InvalidValue),
        ("Boolean", Value::Bool(_)) => Ok(value.clone()),
        // "The ID scalar type represents a unique identifier, often used to refetch an object
        // or as the key for a cache. The ID type is serialized in the same way as a String"
        ("ID", Value::String(_)) => Ok(value.clone()),
        ("ID", Value::Number(number)) if number.is_i64() || number.is_u64() => {
            Ok(Value::String(number.to_string().into()))
        }
        ("String" | "Int" | "Float" | "Boolean" | "ID", _) => Err(InvalidValue),
        _ => return None,
    };
    Some(coerced)
}
