//! GraphQL schema.

use std::sync::Arc;

use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use derivative::Derivative;

use super::selection::json_value;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// How values of a named type complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeKind {
    Scalar,
    Enum,
    Object,
    /// Interfaces and unions
    Abstract,
}

/// A validated schema, cheap to clone.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Schema {
    #[derivative(Debug = "ignore")]
    definitions: Arc<Valid<apollo_compiler::Schema>>,
}

impl Schema {
    pub fn new(definitions: Arc<Valid<apollo_compiler::Schema>>) -> Self {
        Self { definitions }
    }

    /// Parses and validates a schema from SDL.
    pub fn parse(sdl: &str) -> Result<Self, super::SpecError> {
        apollo_compiler::Schema::parse_and_validate(sdl, "schema.graphql")
            .map(|schema| Self::new(Arc::new(schema)))
            .map_err(|errors| super::SpecError::ParsingError(errors.errors.to_string()))
    }

    pub fn definitions(&self) -> &Valid<apollo_compiler::Schema> {
        &self.definitions
    }

    pub(crate) fn kind(&self, type_name: &str) -> Option<TypeKind> {
        Some(match self.definitions.types.get(type_name)? {
            ExtendedType::Scalar(_) => TypeKind::Scalar,
            ExtendedType::Enum(_) => TypeKind::Enum,
            ExtendedType::Object(_) => TypeKind::Object,
            ExtendedType::Interface(_) | ExtendedType::Union(_) => TypeKind::Abstract,
            ExtendedType::InputObject(_) => return None,
        })
    }

    pub(crate) fn is_subtype(&self, abstract_type: &str, maybe_subtype: &str) -> bool {
        self.definitions.is_subtype(abstract_type, maybe_subtype)
    }

    /// Whether selections declared on `owner_type` apply to values of `concrete_type`.
    pub(crate) fn applies_to(&self, owner_type: &str, concrete_type: &str) -> bool {
        owner_type == concrete_type || self.is_subtype(owner_type, concrete_type)
    }

    pub(crate) fn enum_has_value(&self, enum_name: &str, value: &str) -> bool {
        self.definitions
            .get_enum(enum_name)
            .map(|definition| definition.values.contains_key(value))
            .unwrap_or(false)
    }

    /// Default values declared for the arguments of `type_name.field_name`.
    pub(crate) fn argument_defaults(&self, type_name: &str, field_name: &str) -> Vec<(String, Value)> {
        let Ok(field) = self.definitions.type_field(type_name, field_name) else {
            return Vec::new();
        };
        field
            .arguments
            .iter()
            .filter_map(|argument| {
                let default = argument.default_value.as_ref()?;
                Some((argument.name.to_string(), json_value(default, &Object::new())))
            })
            .collect()
    }

    /// Interfaces implemented by the object type `type_name`, in declaration order.
    pub(crate) fn interfaces(&self, type_name: &str) -> Vec<&str> {
        self.definitions
            .get_object(type_name)
            .map(|object| {
                object
                    .implements_interfaces
                    .iter()
                    .map(|name| name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}
