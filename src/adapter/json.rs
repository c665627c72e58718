// Plain mapping/sequence data via serde_json. Object members become
// element nodes named by their key, array items become unnamed element
// nodes, scalar leaves become text nodes. Wrappers are built during
// traversal and carry their path, which doubles as the order key.

use std::rc::Rc;

use serde_json::Value;

use crate::model::{Node, NodeKind, NodeModel, CHILD_SEG};

#[derive(Debug, Clone)]
pub struct JsonNode<'d> {
    value: &'d Value,
    name: String,
    parent: Option<Rc<JsonNode<'d>>>,
    key: Vec<u64>,
}

/// Wrap a borrowed JSON value as the document root.
pub fn wrap(value: &Value) -> Node<'_> {
    Node::new(JsonNode {
        value,
        name: String::new(),
        parent: None,
        key: Vec::new(),
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Object(_) | Value::Array(_) => None,
    }
}

fn collect_text(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            for member in map.values() {
                collect_text(member, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_text(item, out);
            }
        }
        scalar => out.push_str(&scalar_string(scalar).expect("scalar")),
    }
}

impl<'d> JsonNode<'d> {
    fn child(&self, value: &'d Value, name: &str, slot: usize) -> Node<'d> {
        let mut key = self.key.clone();
        key.push(CHILD_SEG + slot as u64);

        Node::new(JsonNode {
            value,
            name: name.to_string(),
            parent: Some(Rc::new(self.clone())),
            key,
        })
    }
}

impl<'d> NodeModel<'d> for JsonNode<'d> {
    fn kind(&self) -> NodeKind {
        if self.parent.is_none() {
            return NodeKind::Document;
        }

        match self.value {
            Value::Object(_) | Value::Array(_) => NodeKind::Element,
            _ => NodeKind::Text,
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn string_value(&self) -> String {
        let mut out = String::new();
        collect_text(self.value, &mut out);
        out
    }

    fn children(&self) -> Box<dyn Iterator<Item = Node<'d>> + 'd> {
        let children: Vec<Node<'d>> = match self.value {
            Value::Object(map) => map
                .iter()
                .enumerate()
                .map(|(slot, (name, value))| self.child(value, name, slot))
                .collect(),

            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(slot, value)| self.child(value, "", slot))
                .collect(),

            _ => Vec::new(),
        };

        Box::new(children.into_iter())
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Node<'d>> + 'd> {
        Box::new(std::iter::empty())
    }

    fn parent(&self) -> Option<Node<'d>> {
        self.parent
            .as_ref()
            .map(|parent| Node::new(parent.as_ref().clone()))
    }

    fn order_key(&self) -> Vec<u64> {
        self.key.clone()
    }
}

impl<'d> From<&'d Value> for Node<'d> {
    fn from(value: &'d Value) -> Node<'d> {
        wrap(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn members_become_named_children() {
        let data = json!({"name": "John", "age": 30});
        let root = wrap(&data);

        assert_eq!(root.kind(), NodeKind::Document);

        let children: Vec<_> = root.children().collect();
        let names: Vec<_> = children.iter().map(|c| c.name()).collect();

        assert_eq!(names, vec!["age".to_string(), "name".to_string()]);
        assert_eq!(children[0].kind(), NodeKind::Text);
        assert_eq!(children[0].string_value(), "30");
        assert!(children[0].parent().unwrap().identity_eq(&root));
    }

    #[test]
    fn arrays_become_unnamed_children() {
        let data = json!({"pets": [{"type": "dog"}, {"type": "cat"}]});
        let root = wrap(&data);

        let pets = root.children().next().unwrap();
        assert_eq!(pets.name(), "pets");
        assert_eq!(pets.kind(), NodeKind::Element);

        let items: Vec<_> = pets.children().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].string_value(), "dog");
        assert!(items[0].order_key() < items[1].order_key());
        assert!(items[1].root().identity_eq(&root));
    }
}
