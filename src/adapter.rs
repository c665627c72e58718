//! Tree-model adapters. Each adapter wraps a host tree type behind the
//! [`NodeModel`](crate::model::NodeModel) capability set; the evaluator
//! never sees the underlying representation. Registration is a `From`
//! conversion into [`Node`](crate::model::Node) per host type.

pub mod json;
pub mod rcdom;
pub mod xml;
