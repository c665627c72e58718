use std::fmt;

use crate::model::{Node, NodeKind};

/// An atomic value: the non-node half of the item space.
#[derive(Debug, Clone, PartialEq)]
pub enum Atomic {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Str(String),
}

impl Atomic {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Atomic::Integer(_) | Atomic::Double(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Atomic::Integer(v) => Some(*v as f64),
            Atomic::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Atomic::Boolean(_) => "boolean",
            Atomic::Integer(_) => "integer",
            Atomic::Double(_) => "double",
            Atomic::Str(_) => "string",
        }
    }
}

impl fmt::Display for Atomic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atomic::Boolean(v) => write!(f, "{v}"),
            Atomic::Integer(v) => write!(f, "{v}"),
            Atomic::Double(v) => {
                if v.is_nan() {
                    f.write_str("NaN")
                } else {
                    write!(f, "{v}")
                }
            }
            Atomic::Str(v) => f.write_str(v),
        }
    }
}

impl From<bool> for Atomic {
    fn from(value: bool) -> Self {
        Atomic::Boolean(value)
    }
}

impl From<i64> for Atomic {
    fn from(value: i64) -> Self {
        Atomic::Integer(value)
    }
}

impl From<f64> for Atomic {
    fn from(value: f64) -> Self {
        Atomic::Double(value)
    }
}

impl From<String> for Atomic {
    fn from(value: String) -> Self {
        Atomic::Str(value)
    }
}

impl From<&str> for Atomic {
    fn from(value: &str) -> Self {
        Atomic::Str(value.to_string())
    }
}

/// One item of a sequence: a node handle or an atomic value.
#[derive(Debug, Clone)]
pub enum Item<'d> {
    Node(Node<'d>),
    Atomic(Atomic),
}

impl<'d> Item<'d> {
    /// Nominal definition: an item is a node iff it was produced by a
    /// node-model adapter.
    pub fn is_node(&self) -> bool {
        matches!(self, Item::Node(_))
    }

    pub fn as_node(&self) -> Option<&Node<'d>> {
        match self {
            Item::Node(node) => Some(node),
            Item::Atomic(_) => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&Atomic> {
        match self {
            Item::Atomic(atomic) => Some(atomic),
            Item::Node(_) => None,
        }
    }

    /// Atomization. Nodes carry untyped string values; the `bool` flags
    /// an untyped result so comparisons can cast it.
    pub fn atomized(&self) -> (Atomic, bool) {
        match self {
            Item::Node(node) => (Atomic::Str(node.string_value()), true),
            Item::Atomic(atomic) => (atomic.clone(), false),
        }
    }

    pub fn string_value(&self) -> String {
        match self {
            Item::Node(node) => node.string_value(),
            Item::Atomic(atomic) => atomic.to_string(),
        }
    }

    /// Name of the underlying node, if any.
    pub fn name(&self) -> Option<String> {
        self.as_node().map(|n| n.name())
    }

    /// The embedding-surface unwrap: attribute and text nodes become
    /// their string value, every other item is returned as-is.
    pub fn unwrapped(self) -> Item<'d> {
        if let Item::Node(node) = &self {
            if matches!(node.kind(), NodeKind::Attribute | NodeKind::Text) {
                return Item::Atomic(Atomic::Str(node.string_value()));
            }
        }

        self
    }
}

impl<'d> PartialEq for Item<'d> {
    fn eq(&self, other: &Item<'d>) -> bool {
        match (self, other) {
            (Item::Node(a), Item::Node(b)) => a.identity_eq(b),
            (Item::Atomic(a), Item::Atomic(b)) => a == b,
            _ => false,
        }
    }
}

impl<'d> From<Atomic> for Item<'d> {
    fn from(value: Atomic) -> Self {
        Item::Atomic(value)
    }
}

impl<'d> From<Node<'d>> for Item<'d> {
    fn from(value: Node<'d>) -> Self {
        Item::Node(value)
    }
}
