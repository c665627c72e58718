//! An XPath 3.1 subset engine over pluggable tree models.
//!
//! A query runs through three stages: the [`Lexer`] tokenises the
//! surface syntax, the [`parser`] builds an [`Expr`] tree respecting the
//! XPath operator precedences, and [`evaluate`] walks that tree against
//! a [`DynamicContext`], producing a lazy sequence of items.
//!
//! Data enters through a tree-model adapter (see [`adapter`]): XML via
//! `roxmltree`, HTML via `html5ever`'s rcdom, and plain mapping data via
//! `serde_json`. Anything convertible into a [`Node`] can be queried.
//!
//! ```
//! let doc = roxmltree::Document::parse(r#"<data asd="dsa"><country name="Liechtenstein"/></data>"#).unwrap();
//!
//! let items = treepath::query(doc.root_element(), "@asd").unwrap();
//! assert_eq!(items[0].string_value(), "dsa");
//!
//! let names = treepath::query(doc.root_element(), "country/@name").unwrap();
//! assert_eq!(names[0].string_value(), "Liechtenstein");
//! ```

use std::rc::Rc;

use tracing::debug;

pub mod adapter;
pub mod ast;
pub mod context;
pub mod error;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod sequence;
pub mod tokens;
pub mod value;

pub use ast::{Expr, NodeTest};
pub use context::{DynamicContext, Function, StaticContext};
pub use error::{Error, ErrorCode, Result};
pub use eval::evaluate;
pub use lexer::Lexer;
pub use model::{Node, NodeKind, NodeModel};
pub use parser::parse;
pub use sequence::Sequence;
pub use tokens::{Axis, Token, TokenKind};
pub use value::{Atomic, Item};

/// Knobs of the one-shot [`query_with`] entry point.
pub struct QueryOptions<'d> {
    /// Pass returned attribute and text nodes through the adapter's
    /// unwrap, yielding their string values. On by default.
    pub unwrap_nodes: bool,
    /// Variable and function bindings; the built-in function library is
    /// used when absent.
    pub statics: Option<Rc<StaticContext<'d>>>,
}

impl<'d> Default for QueryOptions<'d> {
    fn default() -> Self {
        QueryOptions {
            unwrap_nodes: true,
            statics: None,
        }
    }
}

/// Evaluate a query against a root datum. Result order is evaluation
/// order; errors abort the whole query.
pub fn query<'d, T: Into<Node<'d>>>(data: T, text: &str) -> Result<Vec<Item<'d>>> {
    query_with(data, text, QueryOptions::default())
}

pub fn query_with<'d, T: Into<Node<'d>>>(
    data: T,
    text: &str,
    options: QueryOptions<'d>,
) -> Result<Vec<Item<'d>>> {
    let expr = parser::parse(text)?;

    debug!(query = text, ast = %expr, "evaluating");

    let statics = options
        .statics
        .unwrap_or_else(|| Rc::new(StaticContext::default()));

    let ctx = DynamicContext::new(Item::Node(data.into()), statics);
    let seq = eval::evaluate(&expr, &ctx)?;

    let mut out = Vec::new();

    for result in seq {
        let item = result?.item;

        out.push(if options.unwrap_nodes {
            item.unwrapped()
        } else {
            item
        });
    }

    Ok(out)
}
