// XML documents via roxmltree. The document borrow is the `'d` of the
// whole evaluation; attribute nodes are addressed as (element, slot).

use crate::model::{Node, NodeKind, NodeModel, CHILD_SEG};

#[derive(Debug, Clone)]
pub struct XmlNode<'d> {
    node: roxmltree::Node<'d, 'd>,
    attr: Option<usize>,
}

/// Wrap the document node.
pub fn wrap_document<'a, 'input: 'a>(doc: &'a roxmltree::Document<'input>) -> Node<'a> {
    wrap_node(doc.root())
}

/// Wrap any element, text, comment or processing-instruction node.
pub fn wrap_node<'a, 'input: 'a>(node: roxmltree::Node<'a, 'input>) -> Node<'a> {
    // `Node` is covariant in its input lifetime.
    let node: roxmltree::Node<'a, 'a> = node;

    Node::new(XmlNode { node, attr: None })
}

impl<'d> NodeModel<'d> for XmlNode<'d> {
    fn kind(&self) -> NodeKind {
        if self.attr.is_some() {
            return NodeKind::Attribute;
        }

        match self.node.node_type() {
            roxmltree::NodeType::Root => NodeKind::Document,
            roxmltree::NodeType::Element => NodeKind::Element,
            roxmltree::NodeType::PI => NodeKind::ProcessingInstruction,
            roxmltree::NodeType::Comment => NodeKind::Comment,
            roxmltree::NodeType::Text => NodeKind::Text,
        }
    }

    fn name(&self) -> String {
        if let Some(slot) = self.attr {
            return self
                .node
                .attributes()
                .nth(slot)
                .map(|a| a.name().to_string())
                .unwrap_or_default();
        }

        if self.node.is_element() {
            self.node.tag_name().name().to_string()
        } else {
            String::new()
        }
    }

    fn string_value(&self) -> String {
        if let Some(slot) = self.attr {
            return self
                .node
                .attributes()
                .nth(slot)
                .map(|a| a.value().to_string())
                .unwrap_or_default();
        }

        match self.node.node_type() {
            roxmltree::NodeType::Root | roxmltree::NodeType::Element => self
                .node
                .descendants()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect(),

            roxmltree::NodeType::Text | roxmltree::NodeType::Comment => {
                self.node.text().unwrap_or_default().to_string()
            }

            roxmltree::NodeType::PI => self
                .node
                .pi()
                .and_then(|pi| pi.value)
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = Node<'d>> + 'd> {
        if self.attr.is_some() {
            return Box::new(std::iter::empty());
        }

        Box::new(self.node.children().map(wrap_node))
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Node<'d>> + 'd> {
        if self.attr.is_some() || !self.node.is_element() {
            return Box::new(std::iter::empty());
        }

        let node = self.node;
        let count = node.attributes().count();

        Box::new((0..count).map(move |slot| Node::new(XmlNode { node, attr: Some(slot) })))
    }

    fn parent(&self) -> Option<Node<'d>> {
        if self.attr.is_some() {
            return Some(wrap_node(self.node));
        }

        self.node.parent().map(wrap_node)
    }

    fn order_key(&self) -> Vec<u64> {
        let mut key = Vec::new();
        let mut current = self.node;

        while let Some(parent) = current.parent() {
            let slot = parent
                .children()
                .position(|c| c == current)
                .expect("node is a child of its parent");

            key.push(CHILD_SEG + slot as u64);
            current = parent;
        }

        key.reverse();

        if let Some(slot) = self.attr {
            key.push(slot as u64);
        }

        key
    }
}

impl<'a, 'input: 'a> From<&'a roxmltree::Document<'input>> for Node<'a> {
    fn from(doc: &'a roxmltree::Document<'input>) -> Node<'a> {
        wrap_document(doc)
    }
}

impl<'a, 'input: 'a> From<roxmltree::Node<'a, 'input>> for Node<'a> {
    fn from(node: roxmltree::Node<'a, 'input>) -> Node<'a> {
        wrap_node(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "<root a=\"1\" b=\"2\"><x>alpha</x><!--note--><y>beta</y></root>";

    #[test]
    fn kinds_names_and_string_values() {
        let doc = roxmltree::Document::parse(DOC).unwrap();
        let document = wrap_document(&doc);

        assert_eq!(document.kind(), NodeKind::Document);
        assert_eq!(document.string_value(), "alphabeta");

        let root = document.children().next().unwrap();
        assert_eq!(root.kind(), NodeKind::Element);
        assert_eq!(root.name(), "root");

        let kinds: Vec<_> = root.children().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Element, NodeKind::Comment, NodeKind::Element]
        );

        let attrs: Vec<_> = root.attributes().map(|a| (a.name(), a.string_value())).collect();
        assert_eq!(
            attrs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );

        let x = root.children().next().unwrap();
        assert_eq!(x.string_value(), "alpha");
        assert_eq!(x.children().next().unwrap().kind(), NodeKind::Text);
    }

    #[test]
    fn order_keys_follow_document_order() {
        let doc = roxmltree::Document::parse(DOC).unwrap();
        let document = wrap_document(&doc);

        let root = document.children().next().unwrap();
        let children: Vec<_> = root.children().collect();
        let attrs: Vec<_> = root.attributes().collect();

        // document < root < @a < @b < x < comment < y
        let mut keys = vec![
            document.order_key(),
            root.order_key(),
            attrs[0].order_key(),
            attrs[1].order_key(),
        ];
        keys.extend(children.iter().map(|c| c.order_key()));

        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        assert!(children[0].identity_eq(&root.children().next().unwrap()));
        assert!(!children[0].identity_eq(&children[2]));
    }

    #[test]
    fn parents_walk_back_to_the_document() {
        let doc = roxmltree::Document::parse(DOC).unwrap();
        let document = wrap_document(&doc);
        let root = document.children().next().unwrap();

        let attr = root.attributes().next().unwrap();
        assert!(attr.parent().unwrap().identity_eq(&root));

        let x = root.children().next().unwrap();
        assert!(x.parent().unwrap().identity_eq(&root));
        assert!(x.root().identity_eq(&document));
        assert!(x.parent().unwrap().parent().unwrap().identity_eq(&document));
        assert!(document.parent().is_none());
    }
}
