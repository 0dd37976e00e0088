//! Read-only view of the selections below a field.
//!
//! A [`Lookahead`] is built from the selection tree of a prepared operation, so fields
//! skipped by `@skip`/`@include` are already gone. Lookups never fail: a miss returns
//! [`Lookahead::null`], which answers `false`/empty to everything and can be chained.

use std::sync::Arc;

use derivative::Derivative;

use crate::error::Location;
use crate::json_ext::Object;
use crate::spec::FieldType;
use crate::spec::Schema;
use crate::spec::SelectionNode;
use crate::spec::SelectionTree;
use crate::spec::insert_merged;

#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Lookahead {
    #[derivative(Debug = "ignore")]
    schema: Option<Schema>,
    selected_type: Option<String>,
    nodes: Vec<Arc<SelectionNode>>,
    children: Vec<Arc<SelectionNode>>,
    arguments: Object,
}

impl Lookahead {
    /// The lookahead of something that is not selected.
    pub fn null() -> Self {
        Self {
            schema: None,
            selected_type: None,
            nodes: Vec::new(),
            children: Vec::new(),
            arguments: Object::new(),
        }
    }

    pub(crate) fn root(schema: Schema, tree: Arc<SelectionTree>) -> Self {
        Self {
            schema: Some(schema),
            selected_type: Some(tree.root_type.clone()),
            nodes: Vec::new(),
            children: tree.selections.clone(),
            arguments: Object::new(),
        }
    }

    /// Merges `nodes` into one lookahead whose children are the union of theirs.
    pub(crate) fn for_field(schema: &Schema, nodes: Vec<Arc<SelectionNode>>) -> Self {
        let Some(first) = nodes.first() else {
            return Self::null();
        };
        let mut children = Vec::new();
        for node in &nodes {
            for child in node.selections() {
                insert_merged(&mut children, SelectionNode::clone(child));
            }
        }
        Self {
            schema: Some(schema.clone()),
            selected_type: Some(first.field_type.inner_type_name().to_string()),
            arguments: first.arguments.clone(),
            nodes,
            children,
        }
    }

    pub fn is_null(&self) -> bool {
        self.schema.is_none()
    }

    pub fn is_selected(&self) -> bool {
        !self.is_null()
    }

    /// Whether `field_name` is requested directly below this position.
    ///
    /// `arguments` must equal the requested arguments exactly when given, and
    /// `selected_type` restricts the lookup to selections that apply to that type.
    pub fn selects(
        &self,
        field_name: &str,
        arguments: Option<&Object>,
        selected_type: Option<&str>,
    ) -> bool {
        self.selection_with(field_name, arguments, selected_type)
            .is_selected()
    }

    pub fn selects_alias(&self, alias: &str) -> bool {
        self.alias_selection(alias, None).is_selected()
    }

    /// Every occurrence of `field_name`, merged, looked up by field name and never by alias.
    pub fn selection(&self, field_name: &str) -> Lookahead {
        self.selection_with(field_name, None, None)
    }

    pub fn selection_with(
        &self,
        field_name: &str,
        arguments: Option<&Object>,
        selected_type: Option<&str>,
    ) -> Lookahead {
        let Some(schema) = &self.schema else {
            return Self::null();
        };
        let matches = self
            .children
            .iter()
            .filter(|child| child.field_name == field_name)
            .filter(|child| applies(schema, child, selected_type))
            .filter(|child| arguments.is_none_or(|arguments| &child.arguments == arguments))
            .cloned()
            .collect();
        Self::for_field(schema, matches)
    }

    /// The selection written under `alias` in the document.
    ///
    /// Null unless exactly one set of arguments is requested under that alias, after
    /// filtering by `arguments` when given.
    pub fn alias_selection(&self, alias: &str, arguments: Option<&Object>) -> Lookahead {
        let Some(schema) = &self.schema else {
            return Self::null();
        };
        let matches: Vec<_> = self
            .children
            .iter()
            .filter(|child| child.alias.as_deref() == Some(alias))
            .filter(|child| arguments.is_none_or(|arguments| &child.arguments == arguments))
            .cloned()
            .collect();
        let Some(first) = matches.first() else {
            return Self::null();
        };
        if matches
            .iter()
            .any(|child| child.arguments != first.arguments)
        {
            return Self::null();
        }
        Self::for_field(schema, matches)
    }

    /// The distinct selections directly below this position.
    pub fn selections(&self) -> Vec<Lookahead> {
        let Some(schema) = &self.schema else {
            return Vec::new();
        };
        self.children
            .iter()
            .map(|child| Self::for_field(schema, vec![child.clone()]))
            .collect()
    }

    /// The field name, `None` for the root and the null lookahead.
    pub fn name(&self) -> Option<&str> {
        self.nodes.first().map(|node| node.field_name())
    }

    pub fn alias(&self) -> Option<&str> {
        self.nodes.first().and_then(|node| node.alias())
    }

    pub fn arguments(&self) -> &Object {
        &self.arguments
    }

    pub fn field_type(&self) -> Option<&FieldType> {
        self.nodes.first().map(|node| node.field_type())
    }

    pub fn owner_type(&self) -> Option<&str> {
        self.nodes.first().map(|node| node.owner_type())
    }

    /// The named type selections below this position apply to.
    pub fn selected_type(&self) -> Option<&str> {
        self.selected_type.as_deref()
    }

    pub fn ast_nodes(&self) -> Vec<Location> {
        self.nodes
            .iter()
            .flat_map(|node| node.origins().iter().copied())
            .collect()
    }
}

impl Default for Lookahead {
    fn default() -> Self {
        Self::null()
    }
}

fn applies(schema: &Schema, node: &SelectionNode, selected_type: Option<&str>) -> bool {
    match selected_type {
        Some(selected_type) => schema.applies_to(&node.owner_type, selected_type),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::Configuration;
    use crate::spec::PreparedQuery;

    const SDL: &str = r#"
        type Query {
          findBirdSpecies(byName: String): BirdSpecies
          node(id: ID): Node
          species(id: ID): Species
        }
        interface Node { id: ID! }
        type BirdGenus implements Node { id: ID! name: String! latinName: String! }
        type BirdSpecies implements Node {
          id: ID!
          name: String!
          isWaterfowl: Boolean!
          similarSpecies: [BirdSpecies!]!
          genus: BirdGenus!
        }
        type PlantSpecies implements Node { id: ID! name: String! isEdible: Boolean! }
        union Species = BirdSpecies | PlantSpecies
    "#;

    fn lookahead(query: &str, variables: serde_json_bytes::Value) -> Lookahead {
        let schema = Schema::parse(SDL).unwrap();
        let variables = variables.as_object().cloned().unwrap_or_default();
        PreparedQuery::parse(&schema, query, None, &variables, &Configuration::default())
            .unwrap()
            .lookahead()
    }

    fn names(lookahead: &Lookahead) -> Vec<String> {
        lookahead
            .selections()
            .iter()
            .filter_map(|selection| selection.name().map(str::to_string))
            .collect()
    }

    fn object(value: serde_json_bytes::Value) -> Object {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn detects_fields_by_name() {
        let root = lookahead(
            r#"
            query($name: String!) {
              findBirdSpecies(byName: $name) {
                name
                similarSpecies { likesWater: isWaterfowl }
              }
              t: __typename
            }
            "#,
            json!({ "name": "Cardinal" }),
        );
        assert!(root.selects("__typename", None, None));
        let species = root.selection("findBirdSpecies");
        assert!(species.selects("similarSpecies", None, None));
        assert!(!species.selects("isWaterfowl", None, None));
        assert!(species
            .selection("similarSpecies")
            .selection("isWaterfowl")
            .is_selected());
        assert!(!species.selection("similarSpecies").selection("name").is_selected());
        assert!(!species.selection("likesWater").is_selected());
        assert_eq!(species.selected_type(), Some("BirdSpecies"));
    }

    #[test]
    fn merges_fragments_and_branches_on_the_same_type() {
        let root = lookahead(
            r#"
            {
              findBirdSpecies(byName: "Cardinal") { similarSpecies { __typename } }
              ...F
              ... { findBirdSpecies(byName: "Cardinal") { similarSpecies { isWaterfowl } } }
            }
            fragment F on Query {
              findBirdSpecies(byName: "Cardinal") { similarSpecies { name } }
            }
            "#,
            json!({}),
        );
        let merged = root.selection("findBirdSpecies").selection("similarSpecies");
        assert!(merged.selects("__typename", None, None));
        assert!(merged.selects("isWaterfowl", None, None));
        assert!(merged.selects("name", None, None));
        assert_eq!(merged.ast_nodes().len(), 3);
    }

    #[test]
    fn union_branches_stay_apart() {
        let species = lookahead(
            r#"
            {
              species(id: "Cardinal") {
                ... on BirdSpecies { name isWaterfowl }
                ... on PlantSpecies { name isEdible }
              }
            }
            "#,
            json!({}),
        )
        .selection("species");

        assert!(species.selects("name", None, None));
        assert_eq!(names(&species), ["name", "isWaterfowl", "name", "isEdible"]);
        assert!(species.selects("name", None, Some("BirdSpecies")));
        assert!(species.selects("name", None, Some("PlantSpecies")));
        assert!(species.selects("isWaterfowl", None, Some("BirdSpecies")));
        assert!(!species.selects("isWaterfowl", None, Some("PlantSpecies")));
        assert!(!species.selects("isEdible", None, Some("BirdSpecies")));
        assert!(species.selects("isEdible", None, Some("PlantSpecies")));

        let bird_name = species.selection_with("name", None, Some("BirdSpecies"));
        assert_eq!(bird_name.owner_type(), Some("BirdSpecies"));
        assert_eq!(bird_name.ast_nodes().len(), 1);
    }

    #[test]
    fn interface_positions_list_every_branch() {
        let node = lookahead(
            r#"
            {
              node(id: "Cardinal") {
                id
                ... on BirdSpecies { name }
                ...Other
              }
            }
            fragment Other on BirdGenus { latinName }
            "#,
            json!({}),
        )
        .selection("node");
        assert_eq!(names(&node), ["id", "name", "latinName"]);
        // Fields declared on the interface apply to every implementation.
        assert!(node.selects("id", None, Some("BirdGenus")));
        assert!(!node.selects("name", None, Some("BirdGenus")));
    }

    #[test]
    fn arguments_must_match_exactly() {
        let root = lookahead(
            r#"{ findBirdSpecies(byName: "Great Blue Heron") { isWaterfowl } __typename }"#,
            json!({}),
        );
        let heron = object(json!({ "byName": "Great Blue Heron" }));
        assert!(root.selects("findBirdSpecies", Some(&heron), None));
        assert!(!root.selects(
            "findBirdSpecies",
            Some(&object(json!({ "byName": "Chickadee" }))),
            None
        ));
        assert!(!root.selects(
            "findBirdSpecies",
            Some(&object(json!({ "byName": "Great Blue Heron", "other": "Nonsense" }))),
            None
        ));
        assert!(!root.selects("findBirdSpecies", Some(&Object::new()), None));
        assert!(root.selects("__typename", Some(&Object::new()), None));
    }

    #[test]
    fn alias_selection_keeps_aliases_apart() {
        let root = lookahead(
            r#"
            {
              gull: findBirdSpecies(byName: "Laughing Gull") { name }
              tanager: findBirdSpecies(byName: "Scarlet Tanager") { isWaterfowl }
            }
            "#,
            json!({}),
        );
        let gull = root.alias_selection("gull", None);
        assert_eq!(gull.alias(), Some("gull"));
        assert_eq!(gull.arguments(), &object(json!({ "byName": "Laughing Gull" })));
        assert_eq!(names(&gull), ["name"]);
        assert_eq!(names(&root.alias_selection("tanager", None)), ["isWaterfowl"]);

        assert!(root.selection("gull").is_null());
        assert!(root.alias_selection("findBirdSpecies", None).is_null());
        assert!(root.selects_alias("gull"));
        assert!(!root.selects_alias("findBirdSpecies"));
    }

    #[test]
    fn alias_selection_filters_by_arguments() {
        let root = lookahead(
            r#"
            {
              egret: findBirdSpecies(byName: "Great Egret") { isWaterfowl }
              otherEgret: findBirdSpecies(byName: "Great Egret") { name }
              findBirdSpecies(byName: "Great Egret") { __typename }
            }
            "#,
            json!({}),
        );
        assert_eq!(names(&root.alias_selection("egret", None)), ["isWaterfowl"]);
        assert_eq!(names(&root.alias_selection("otherEgret", None)), ["name"]);
        let egret = object(json!({ "byName": "Great Egret" }));
        assert_eq!(
            names(&root.alias_selection("egret", Some(&egret))),
            ["isWaterfowl"]
        );
        assert!(root.alias_selection("egret", Some(&Object::new())).is_null());
        assert!(root
            .alias_selection("egret", Some(&object(json!({ "byName": "Macaw" }))))
            .is_null());
    }

    #[test]
    fn null_lookahead_is_chainable() {
        let root = lookahead(r#"{ findBirdSpecies(byName: "Cardinal") { name } }"#, json!({}));
        let missing = root.selection("node").selection("id").alias_selection("x", None);
        assert!(missing.is_null());
        assert!(missing.selections().is_empty());
        assert!(!missing.selects("id", None, None));
        assert_eq!(missing.name(), None);
        assert!(missing.arguments().is_empty());
    }

    #[test]
    fn skipped_fields_are_not_reported() {
        let species = lookahead(
            r#"
            query($withGenus: Boolean!) {
              findBirdSpecies(byName: "Cardinal") {
                name @skip(if: true)
                genus @include(if: $withGenus) { latinName }
                isWaterfowl
              }
            }
            "#,
            json!({ "withGenus": false }),
        )
        .selection("findBirdSpecies");
        assert_eq!(names(&species), ["isWaterfowl"]);
    }
}
