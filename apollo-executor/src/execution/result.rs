//! The result document of one query, built incrementally.
//!
//! Every object and list is a node of an arena. Slots are reserved in document order
//! before any of them is filled, so the output keeps that order whatever the order of
//! completion. Writing `null` into a non-null slot discards the node holding the slot and
//! writes `null` into the node's own slot in its parent, repeating until a nullable slot
//! or the root is reached.

use indexmap::IndexMap;

use crate::json_ext::Object;
use crate::json_ext::Value;

pub(crate) type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SlotKey {
    Key(String),
    Index(usize),
}

/// Where a value goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    /// The `data` member itself
    Root,
    Slot { node: NodeId, key: SlotKey },
}

impl Target {
    pub(crate) fn index(&self) -> Option<usize> {
        match self {
            Target::Slot {
                key: SlotKey::Index(index),
                ..
            } => Some(*index),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Slot {
    Pending,
    Value(Value),
    Node(NodeId),
}

#[derive(Debug)]
struct Entry {
    slot: Slot,
    non_null: bool,
}

impl Entry {
    fn pending(non_null: bool) -> Self {
        Self {
            slot: Slot::Pending,
            non_null,
        }
    }
}

#[derive(Debug)]
enum Shape {
    Object(IndexMap<String, Entry>),
    List(Vec<Entry>),
}

#[derive(Debug)]
struct Node {
    shape: Shape,
    parent: Target,
    discarded: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ResultTree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    root_null: bool,
}

impl ResultTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Creates an object at `at` with the given keys reserved, in order.
    ///
    /// Returns `None` when `at` was discarded.
    pub(crate) fn object<I>(&mut self, at: &Target, keys: I) -> Option<NodeId>
    where
        I: IntoIterator<Item = (String, bool)>,
    {
        let shape = Shape::Object(
            keys.into_iter()
                .map(|(key, non_null)| (key, Entry::pending(non_null)))
                .collect(),
        );
        self.attach(at, shape)
    }

    /// Creates a list of `len` pending items at `at`.
    pub(crate) fn list(&mut self, at: &Target, len: usize, items_non_null: bool) -> Option<NodeId> {
        let shape = Shape::List((0..len).map(|_| Entry::pending(items_non_null)).collect());
        self.attach(at, shape)
    }

    fn attach(&mut self, at: &Target, shape: Shape) -> Option<NodeId> {
        if !self.is_live(at) {
            return None;
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            shape,
            parent: at.clone(),
            discarded: false,
        });
        match at {
            Target::Root => self.root = Some(id),
            Target::Slot { .. } => {
                let entry = self.entry_mut(at)?;
                entry.slot = Slot::Node(id);
            }
        }
        Some(id)
    }

    /// Writes a leaf value. `null` goes through [`ResultTree::set_null`].
    pub(crate) fn set(&mut self, at: &Target, value: Value) {
        if value.is_null() {
            return self.set_null(at);
        }
        if !self.is_live(at) {
            return;
        }
        match at {
            Target::Root => {
                failfast_debug!("leaf value written at the root of the result");
            }
            Target::Slot { .. } => {
                if let Some(entry) = self.entry_mut(at) {
                    entry.slot = Slot::Value(value);
                }
            }
        }
    }

    /// Writes `null` at `at`, discarding enclosing nodes up to the first nullable slot.
    pub(crate) fn set_null(&mut self, at: &Target) {
        let mut at = at.clone();
        loop {
            if !self.is_live(&at) {
                return;
            }
            let node = match &at {
                Target::Root => {
                    self.root_null = true;
                    return;
                }
                Target::Slot { node, .. } => *node,
            };
            let Some(entry) = self.entry_mut(&at) else {
                return;
            };
            if !entry.non_null {
                entry.slot = Slot::Value(Value::Null);
                return;
            }
            self.nodes[node].discarded = true;
            at = self.nodes[node].parent.clone();
        }
    }

    /// Whether a value written at `at` would end up in the result.
    pub(crate) fn is_live(&self, at: &Target) -> bool {
        let mut current = at;
        loop {
            match current {
                Target::Root => return !self.root_null,
                Target::Slot { node, .. } => match self.nodes.get(*node) {
                    Some(node) if !node.discarded => current = &node.parent,
                    _ => return false,
                },
            }
        }
    }

    fn entry_mut(&mut self, at: &Target) -> Option<&mut Entry> {
        let Target::Slot { node, key } = at else {
            return None;
        };
        let entry = match (&mut self.nodes.get_mut(*node)?.shape, key) {
            (Shape::Object(entries), SlotKey::Key(key)) => entries.get_mut(key),
            (Shape::List(entries), SlotKey::Index(index)) => entries.get_mut(*index),
            _ => None,
        };
        if entry.is_none() {
            failfast_error!("no result slot reserved at {:?}", at);
        }
        entry
    }

    /// Renders the `data` member. Slots that were never filled render as `null`.
    pub(crate) fn into_data(self) -> Value {
        match self.root {
            Some(root) if !self.root_null => self.render(root),
            _ => Value::Null,
        }
    }

    fn render(&self, id: NodeId) -> Value {
        let render_slot = |slot: &Slot| match slot {
            Slot::Pending => Value::Null,
            Slot::Value(value) => value.clone(),
            Slot::Node(child) => self.render(*child),
        };
        match &self.nodes[id].shape {
            Shape::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, entry)| (key.as_str().into(), render_slot(&entry.slot)))
                    .collect::<Object>(),
            ),
            Shape::List(entries) => {
                Value::Array(entries.iter().map(|entry| render_slot(&entry.slot)).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    fn key(node: NodeId, key: &str) -> Target {
        Target::Slot {
            node,
            key: SlotKey::Key(key.to_string()),
        }
    }

    fn index(node: NodeId, index: usize) -> Target {
        Target::Slot {
            node,
            key: SlotKey::Index(index),
        }
    }

    fn keys(keys: &[(&str, bool)]) -> Vec<(String, bool)> {
        keys.iter()
            .map(|(key, non_null)| (key.to_string(), *non_null))
            .collect()
    }

    #[test]
    fn keeps_reservation_order() {
        let mut tree = ResultTree::new();
        let root = tree.object(&Target::Root, keys(&[("b", false), ("a", false)])).unwrap();
        tree.set(&key(root, "a"), json!(1));
        tree.set(&key(root, "b"), json!(2));
        assert_eq!(
            serde_json::to_string(&tree.into_data()).unwrap(),
            r#"{"b":2,"a":1}"#
        );
    }

    #[test]
    fn null_stops_at_the_nearest_nullable_slot() {
        // { user (nullable) { profile (non-null) { name (non-null) } sibling } other }
        let mut tree = ResultTree::new();
        let root = tree.object(&Target::Root, keys(&[("user", false), ("other", false)])).unwrap();
        let user = tree
            .object(&key(root, "user"), keys(&[("profile", true), ("sibling", false)]))
            .unwrap();
        tree.set(&key(user, "sibling"), json!("kept?"));
        let profile = tree.object(&key(user, "profile"), keys(&[("name", true)])).unwrap();
        tree.set(&key(root, "other"), json!(true));

        tree.set_null(&key(profile, "name"));
        assert!(!tree.is_live(&key(user, "sibling")));
        assert!(tree.is_live(&key(root, "other")));

        assert_eq!(tree.into_data(), json!({ "user": null, "other": true }));
    }

    #[test]
    fn non_null_list_items_null_the_list() {
        let mut tree = ResultTree::new();
        let root = tree.object(&Target::Root, keys(&[("items", false)])).unwrap();
        let list = tree.list(&key(root, "items"), 3, true).unwrap();
        tree.set(&index(list, 0), json!(1));
        tree.set_null(&index(list, 1));
        tree.set(&index(list, 2), json!(3));
        assert_eq!(tree.into_data(), json!({ "items": null }));
    }

    #[test]
    fn nullable_list_items_stay_in_place() {
        let mut tree = ResultTree::new();
        let root = tree.object(&Target::Root, keys(&[("items", true)])).unwrap();
        let list = tree.list(&key(root, "items"), 2, false).unwrap();
        tree.set_null(&index(list, 0));
        tree.set(&index(list, 1), json!("b"));
        assert_eq!(tree.into_data(), json!({ "items": [null, "b"] }));
    }

    #[test]
    fn propagation_can_reach_the_root() {
        let mut tree = ResultTree::new();
        let root = tree.object(&Target::Root, keys(&[("a", true), ("b", false)])).unwrap();
        tree.set(&key(root, "b"), json!(1));
        tree.set_null(&key(root, "a"));
        assert!(!tree.is_live(&Target::Root));
        assert!(tree.object(&key(root, "b"), Vec::new()).is_none());
        assert_eq!(tree.into_data(), Value::Null);
    }

    #[test]
    fn pending_slots_render_as_null() {
        let mut tree = ResultTree::new();
        tree.object(&Target::Root, keys(&[("later", true)])).unwrap();
        assert_eq!(tree.into_data(), json!({ "later": null }));
    }
}
