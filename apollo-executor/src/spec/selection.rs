use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Node;
use apollo_compiler::executable;

use crate::error::Location;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::FieldType;
use crate::spec::OperationKind;
use crate::spec::SpecError;

/// One requested field, after fragments are inlined and `@skip`/`@include` are applied.
///
/// Occurrences of the same field name, owner type and alias are merged into a single node
/// whose sub-selections are the union of theirs. The same field requested on different
/// owner types (interface or union branches) stays in distinct nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionNode {
    pub(crate) owner_type: String,
    pub(crate) field_name: String,
    pub(crate) alias: Option<String>,
    pub(crate) arguments: Object,
    pub(crate) field_type: FieldType,
    pub(crate) selections: Vec<Arc<SelectionNode>>,
    pub(crate) origins: Vec<Location>,
}

impl SelectionNode {
    /// The key this field is written under in the result.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field_name)
    }

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn arguments(&self) -> &Object {
        &self.arguments
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn selections(&self) -> &[Arc<SelectionNode>] {
        &self.selections
    }

    /// Source locations of every merged occurrence.
    pub fn origins(&self) -> &[Location] {
        &self.origins
    }

    fn merges_with(&self, other: &SelectionNode) -> bool {
        self.owner_type == other.owner_type
            && self.field_name == other.field_name
            && self.alias == other.alias
    }
}

/// The directive-filtered selections of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionTree {
    pub(crate) operation_kind: OperationKind,
    pub(crate) root_type: String,
    pub(crate) selections: Vec<Arc<SelectionNode>>,
}

impl SelectionTree {
    pub fn operation_kind(&self) -> OperationKind {
        self.operation_kind
    }

    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    pub fn selections(&self) -> &[Arc<SelectionNode>] {
        &self.selections
    }
}

/// Adds `node` to `selections`, merging it into an existing node when possible.
pub(crate) fn insert_merged(selections: &mut Vec<Arc<SelectionNode>>, node: SelectionNode) {
    match selections
        .iter_mut()
        .find(|existing| existing.merges_with(&node))
    {
        Some(existing) => {
            let existing = Arc::make_mut(existing);
            existing.origins.extend(node.origins);
            for child in node.selections {
                insert_merged(&mut existing.selections, Arc::unwrap_or_clone(child));
            }
        }
        None => selections.push(Arc::new(node)),
    }
}

pub(crate) struct TreeBuilder<'a> {
    document: &'a ExecutableDocument,
    variables: &'a Object,
    recursion_limit: usize,
}

impl<'a> TreeBuilder<'a> {
    pub(crate) fn new(
        document: &'a ExecutableDocument,
        variables: &'a Object,
        recursion_limit: usize,
    ) -> Self {
        Self {
            document,
            variables,
            recursion_limit,
        }
    }

    #[tracing::instrument(skip_all, level = "trace")]
    pub(crate) fn build(
        &self,
        operation_kind: OperationKind,
        selection_set: &executable::SelectionSet,
    ) -> Result<SelectionTree, SpecError> {
        let mut selections = Vec::new();
        self.collect(selection_set, &mut selections, 0)?;
        Ok(SelectionTree {
            operation_kind,
            root_type: selection_set.ty.as_str().to_string(),
            selections,
        })
    }

    fn collect(
        &self,
        selection_set: &executable::SelectionSet,
        into: &mut Vec<Arc<SelectionNode>>,
        count: usize,
    ) -> Result<(), SpecError> {
        if count > self.recursion_limit {
            tracing::error!(
                "selection processing recursion limit({}) exceeded",
                self.recursion_limit
            );
            return Err(SpecError::RecursionLimitExceeded(self.recursion_limit));
        }
        let owner_type = selection_set.ty.as_str();
        for selection in &selection_set.selections {
            match selection {
                // Spec: https://spec.graphql.org/draft/#Field
                executable::Selection::Field(field) => {
                    if IncludeSkip::parse(&field.directives).should_skip(self.variables)? {
                        continue;
                    }
                    let mut node = SelectionNode {
                        owner_type: owner_type.to_string(),
                        field_name: field.name.as_str().to_string(),
                        alias: field.alias.as_ref().map(|alias| alias.as_str().to_string()),
                        arguments: self.arguments(&field.arguments),
                        field_type: FieldType::from(field.ty()),
                        selections: Vec::new(),
                        origins: self.location(field).into_iter().collect(),
                    };
                    self.collect(&field.selection_set, &mut node.selections, count + 1)?;
                    insert_merged(into, node);
                }
                // Spec: https://spec.graphql.org/draft/#InlineFragment
                executable::Selection::InlineFragment(inline_fragment) => {
                    if IncludeSkip::parse(&inline_fragment.directives)
                        .should_skip(self.variables)?
                    {
                        continue;
                    }
                    self.collect(&inline_fragment.selection_set, into, count + 1)?;
                }
                // Spec: https://spec.graphql.org/draft/#FragmentSpread
                executable::Selection::FragmentSpread(fragment_spread) => {
                    if IncludeSkip::parse(&fragment_spread.directives)
                        .should_skip(self.variables)?
                    {
                        continue;
                    }
                    let name = fragment_spread.fragment_name.as_str();
                    let fragment = self
                        .document
                        .fragments
                        .get(name)
                        .ok_or_else(|| SpecError::UnknownFragment(name.to_string()))?;
                    self.collect(&fragment.selection_set, into, count + 1)?;
                }
            }
        }
        Ok(())
    }

    fn location<T>(&self, node: &Node<T>) -> Option<Location> {
        node.line_column_range(&self.document.sources)
            .map(|range| Location {
                line: range.start.line as u32,
                column: range.start.column as u32,
            })
    }

    /// Literal argument values, with variables substituted.
    ///
    /// Arguments bound to a variable that was not provided are left out.
    fn arguments(&self, arguments: &[Node<executable::Argument>]) -> Object {
        arguments
            .iter()
            .filter_map(|argument| {
                let value = match argument.value.as_ref() {
                    executable::Value::Variable(name) => {
                        self.variables.get(name.as_str())?.clone()
                    }
                    other => json_value(other, self.variables),
                };
                Some((argument.name.as_str().into(), value))
            })
            .collect()
    }
}

/// Converts a document value to JSON, substituting variables.
pub(crate) fn json_value(value: &executable::Value, variables: &Object) -> Value {
    match value {
        executable::Value::Null => Value::Null,
        executable::Value::Enum(name) => Value::String(name.as_str().into()),
        executable::Value::Variable(name) => {
            variables.get(name.as_str()).cloned().unwrap_or(Value::Null)
        }
        executable::Value::String(s) => Value::String(s.as_str().into()),
        executable::Value::Float(f) => number(f.as_str()),
        executable::Value::Int(i) => match i.as_str().parse::<i64>() {
            Ok(int) => Value::from(int),
            Err(_) => number(i.as_str()),
        },
        executable::Value::Boolean(b) => Value::Bool(*b),
        executable::Value::List(items) => Value::Array(
            items
                .iter()
                .map(|item| json_value(item, variables))
                .collect(),
        ),
        executable::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.as_str().into(), json_value(value, variables)))
                .collect(),
        ),
    }
}

fn number(text: &str) -> Value {
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct IncludeSkip {
    include: Condition,
    skip: Condition,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Condition {
    Yes,
    No,
    Variable(String),
}

impl IncludeSkip {
    pub(crate) fn parse(directives: &executable::DirectiveList) -> Self {
        let mut include = None;
        let mut skip = None;
        for directive in &directives.0 {
            if include.is_none() && directive.name == "include" {
                include = Condition::parse(directive)
            }
            if skip.is_none() && directive.name == "skip" {
                skip = Condition::parse(directive)
            }
        }
        Self {
            include: include.unwrap_or(Condition::Yes),
            skip: skip.unwrap_or(Condition::No),
        }
    }

    pub(crate) fn should_skip(&self, variables: &Object) -> Result<bool, SpecError> {
        Ok(self.skip.eval(variables)? || !self.include.eval(variables)?)
    }
}

impl Condition {
    pub(crate) fn parse(directive: &executable::Directive) -> Option<Self> {
        match directive.specified_argument_by_name("if")?.as_ref() {
            executable::Value::Boolean(true) => Some(Condition::Yes),
            executable::Value::Boolean(false) => Some(Condition::No),
            executable::Value::Variable(variable) => {
                Some(Condition::Variable(variable.as_str().to_owned()))
            }
            _ => None,
        }
    }

    pub(crate) fn eval(&self, variables: &Object) -> Result<bool, SpecError> {
        match self {
            Condition::Yes => Ok(true),
            Condition::No => Ok(false),
            Condition::Variable(variable_name) => variables
                .get(variable_name.as_str())
                .and_then(|v| v.as_bool())
                .ok_or_else(|| SpecError::MissingConditionVariable(variable_name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::Schema;
    use serde_json_bytes::json;

    use super::*;

    const SDL: &str = r#"
        type Query {
          hero(episode: Int): Character
          search(text: String, limit: Int): [Character]
        }
        interface Character { name: String friends: [Character] }
        type Human implements Character { name: String friends: [Character] height: Float }
        type Droid implements Character { name: String friends: [Character] primaryFunction: String }
    "#;

    fn tree(query: &str, variables: serde_json_bytes::Value) -> SelectionTree {
        let schema = Schema::parse_and_validate(SDL, "schema.graphql").unwrap();
        let document =
            ExecutableDocument::parse_and_validate(&schema, query, "query.graphql").unwrap();
        let operation = document.operations.get(None).unwrap();
        let variables = variables.as_object().cloned().unwrap_or_default();
        TreeBuilder::new(&document, &variables, 512)
            .build(OperationKind::Query, &operation.selection_set)
            .unwrap()
    }

    #[test]
    fn fragment_spreads_merge_on_same_owner_type() {
        let tree = tree(
            r#"
            query {
              hero { ...A ...B }
            }
            fragment A on Character { name friends { name } }
            fragment B on Character { name friends { friends { name } } }
            "#,
            json!({}),
        );
        assert_eq!(tree.root_type(), "Query");
        let hero = &tree.selections()[0];
        let keys: Vec<_> = hero.selections().iter().map(|s| s.response_key()).collect();
        assert_eq!(keys, vec!["name", "friends"]);
        let name = &hero.selections()[0];
        assert_eq!(name.origins().len(), 2);
        let friends = &hero.selections()[1];
        let keys: Vec<_> = friends
            .selections()
            .iter()
            .map(|s| s.response_key())
            .collect();
        assert_eq!(keys, vec!["name", "friends"]);
    }

    #[test]
    fn branches_on_different_types_stay_distinct() {
        let tree = tree(
            r#"
            query {
              hero {
                ... on Human { name height }
                ... on Droid { name primaryFunction }
              }
            }
            "#,
            json!({}),
        );
        let hero = &tree.selections()[0];
        let fields: Vec<_> = hero
            .selections()
            .iter()
            .map(|s| (s.owner_type(), s.field_name()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("Human", "name"),
                ("Human", "height"),
                ("Droid", "name"),
                ("Droid", "primaryFunction"),
            ]
        );
    }

    #[test]
    fn skip_and_include_use_resolved_variables() {
        let tree = tree(
            r#"
            query($withName: Boolean!, $skipFriends: Boolean!) {
              hero {
                name @include(if: $withName)
                friends @skip(if: $skipFriends) { name }
                ... @skip(if: true) { __typename }
              }
            }
            "#,
            json!({ "withName": false, "skipFriends": false }),
        );
        let hero = &tree.selections()[0];
        let keys: Vec<_> = hero.selections().iter().map(|s| s.response_key()).collect();
        assert_eq!(keys, vec!["friends"]);
    }

    #[test]
    fn arguments_resolve_literals_and_variables() {
        let tree = tree(
            r#"
            query($text: String, $missing: String) {
              first: search(text: $text, limit: 2) { name }
              second: search(text: "r2") { name }
              third: search(text: $missing) { name }
            }
            "#,
            json!({ "text": "luke" }),
        );
        let arguments: Vec<_> = tree.selections().iter().map(|s| s.arguments()).collect();
        assert_eq!(
            serde_json_bytes::to_value(arguments).unwrap(),
            json!([{ "text": "luke", "limit": 2 }, { "text": "r2" }, {}])
        );
        assert_eq!(tree.selections()[0].alias(), Some("first"));
        assert_eq!(tree.selections()[0].field_type().to_string(), "[Character]");
    }

    #[test]
    fn missing_condition_variable_is_an_error() {
        let condition = Condition::Variable("flag".to_string());
        assert_eq!(
            condition.eval(&Object::new()),
            Err(SpecError::MissingConditionVariable("flag".to_string()))
        );
    }
}
