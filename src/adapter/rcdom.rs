// HTML documents via html5ever's rcdom. Handles are reference counted,
// so the wrapped nodes are `'static`; attributes are addressed as
// (element handle, slot).

use std::fmt;
use std::io;

use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::model::{Node, NodeKind, NodeModel, CHILD_SEG};

#[derive(Clone)]
pub struct DomNode {
    handle: Handle,
    attr: Option<usize>,
}

/// Wrap an rcdom handle.
pub fn wrap(handle: &Handle) -> Node<'static> {
    Node::new(DomNode {
        handle: handle.clone(),
        attr: None,
    })
}

/// Parse an HTML document and wrap its document node.
pub fn parse_html<R: io::Read>(data: &mut R) -> io::Result<Node<'static>> {
    let dom: RcDom = html5ever::parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(data)?;

    Ok(wrap(&dom.document))
}

fn parent_handle(handle: &Handle) -> Option<Handle> {
    // The parent link lives in a Cell; take it out, upgrade, put it back.
    let weak = handle.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    handle.parent.set(weak);

    parent
}

fn element_text(handle: &Handle, out: &mut String) {
    for child in handle.children.borrow().iter() {
        match &child.data {
            NodeData::Text { contents } => out.push_str(&contents.borrow()),
            NodeData::Element { .. } => element_text(child, out),
            _ => {}
        }
    }
}

impl NodeModel<'static> for DomNode {
    fn kind(&self) -> NodeKind {
        if self.attr.is_some() {
            return NodeKind::Attribute;
        }

        match &self.handle.data {
            NodeData::Document => NodeKind::Document,
            NodeData::Element { .. } => NodeKind::Element,
            NodeData::Text { .. } => NodeKind::Text,
            NodeData::ProcessingInstruction { .. } => NodeKind::ProcessingInstruction,
            // Doctype nodes have no kind in this data model; they are
            // also skipped from children().
            NodeData::Comment { .. } | NodeData::Doctype { .. } => NodeKind::Comment,
        }
    }

    fn name(&self) -> String {
        if let Some(slot) = self.attr {
            if let NodeData::Element { attrs, .. } = &self.handle.data {
                return attrs
                    .borrow()
                    .get(slot)
                    .map(|a| a.name.local.to_string())
                    .unwrap_or_default();
            }

            return String::new();
        }

        match &self.handle.data {
            NodeData::Element { name, .. } => name.local.to_string(),
            NodeData::ProcessingInstruction { target, .. } => target.to_string(),
            _ => String::new(),
        }
    }

    fn string_value(&self) -> String {
        if let Some(slot) = self.attr {
            if let NodeData::Element { attrs, .. } = &self.handle.data {
                return attrs
                    .borrow()
                    .get(slot)
                    .map(|a| a.value.to_string())
                    .unwrap_or_default();
            }

            return String::new();
        }

        match &self.handle.data {
            NodeData::Text { contents } => contents.borrow().to_string(),
            NodeData::Comment { contents } => contents.to_string(),
            NodeData::ProcessingInstruction { contents, .. } => contents.to_string(),
            NodeData::Document | NodeData::Element { .. } => {
                let mut out = String::new();
                element_text(&self.handle, &mut out);
                out
            }
            NodeData::Doctype { .. } => String::new(),
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = Node<'static>> + 'static> {
        if self.attr.is_some() {
            return Box::new(std::iter::empty());
        }

        let children: Vec<Node<'static>> = self
            .handle
            .children
            .borrow()
            .iter()
            .filter(|c| !matches!(c.data, NodeData::Doctype { .. }))
            .map(wrap)
            .collect();

        Box::new(children.into_iter())
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Node<'static>> + 'static> {
        if self.attr.is_some() {
            return Box::new(std::iter::empty());
        }

        let NodeData::Element { attrs, .. } = &self.handle.data else {
            return Box::new(std::iter::empty());
        };

        let handle = self.handle.clone();
        let count = attrs.borrow().len();

        Box::new((0..count).map(move |slot| {
            Node::new(DomNode {
                handle: handle.clone(),
                attr: Some(slot),
            })
        }))
    }

    fn parent(&self) -> Option<Node<'static>> {
        if self.attr.is_some() {
            return Some(wrap(&self.handle));
        }

        parent_handle(&self.handle).map(|parent| wrap(&parent))
    }

    fn order_key(&self) -> Vec<u64> {
        let mut key = Vec::new();
        let mut current = self.handle.clone();

        while let Some(parent) = parent_handle(&current) {
            let slot = parent
                .children
                .borrow()
                .iter()
                .position(|c| Handle::ptr_eq(c, &current))
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

impl fmt::Debug for DomNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomNode")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

impl From<&Handle> for Node<'static> {
    fn from(handle: &Handle) -> Node<'static> {
        wrap(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str =
        "<html><head><title>t</title></head><body><ul id=\"list\"><li>A</li><li>B</li></ul></body></html>";

    fn document() -> Node<'static> {
        parse_html(&mut HTML.as_bytes()).unwrap()
    }

    fn child_element(node: &Node<'static>, name: &str) -> Node<'static> {
        node.children()
            .find(|c| c.kind() == NodeKind::Element && c.name() == name)
            .unwrap_or_else(|| panic!("no <{name}> child"))
    }

    #[test]
    fn html_documents_wrap_into_the_model() {
        let document = document();
        assert_eq!(document.kind(), NodeKind::Document);

        let html = child_element(&document, "html");
        let body = child_element(&html, "body");
        let ul = child_element(&body, "ul");

        let items: Vec<_> = ul
            .children()
            .filter(|c| c.kind() == NodeKind::Element)
            .map(|c| c.string_value())
            .collect();

        assert_eq!(items, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(ul.string_value(), "AB");

        let id = ul.attributes().next().unwrap();
        assert_eq!(id.name(), "id");
        assert_eq!(id.string_value(), "list");
        assert!(id.parent().unwrap().identity_eq(&ul));
    }

    #[test]
    fn order_keys_and_identity() {
        let document = document();
        let html = child_element(&document, "html");
        let body = child_element(&html, "body");
        let ul = child_element(&body, "ul");

        let items: Vec<_> = ul
            .children()
            .filter(|c| c.kind() == NodeKind::Element)
            .collect();

        assert!(items[0].order_key() < items[1].order_key());
        assert!(ul.order_key() < items[0].order_key());
        assert!(items[0].identity_eq(&child_element(&ul, "li")));
        assert!(items[1].root().identity_eq(&document));
    }
}
