use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Result;
use crate::value::Item;

/// A built-in or host-registered function. Arguments arrive as
/// materialised sequences; the returned items become the call's result
/// sequence.
pub type FunctionImpl = for<'d> fn(&DynamicContext<'d>, &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>>;

/// Descriptor of one static function: the arity window and the
/// implementation. The call site checks the window and reports XPST0017
/// on a mismatch.
#[derive(Debug, Clone, Copy)]
pub struct Function {
    pub min_args: usize,
    pub max_args: usize,
    pub run: FunctionImpl,
}

/// Variable and function bindings. Read-only during evaluation; a host
/// may extend it before running a query.
#[derive(Debug, Clone)]
pub struct StaticContext<'d> {
    pub variables: HashMap<String, Vec<Item<'d>>>,
    pub functions: HashMap<String, Function>,
}

impl<'d> Default for StaticContext<'d> {
    fn default() -> Self {
        StaticContext {
            variables: HashMap::new(),
            functions: crate::functions::builtins(),
        }
    }
}

impl<'d> StaticContext<'d> {
    pub fn bind_variable(&mut self, name: impl Into<String>, value: Vec<Item<'d>>) {
        self.variables.insert(name.into(), value);
    }

    pub fn register_function(&mut self, name: impl Into<String>, function: Function) {
        self.functions.insert(name.into(), function);
    }
}

/// The per-item evaluation state. Contexts are never mutated; every
/// sequence transformation derives new contexts with recomputed
/// position and size.
#[derive(Debug, Clone)]
pub struct DynamicContext<'d> {
    /// The context item: a node or an atomic value.
    pub item: Item<'d>,
    /// 1-based index within the enclosing sequence.
    pub position: usize,
    /// Length of the enclosing sequence; `None` while streaming.
    pub size: Option<usize>,
    /// The name under which this item was reached, if any.
    pub name: Option<String>,
    pub statics: Rc<StaticContext<'d>>,
}

impl<'d> DynamicContext<'d> {
    pub fn new(item: Item<'d>, statics: Rc<StaticContext<'d>>) -> DynamicContext<'d> {
        DynamicContext {
            item,
            position: 1,
            size: Some(1),
            name: None,
            statics,
        }
    }

    /// Derive a context for another item, keeping the static bindings.
    pub fn with_item(
        &self,
        item: Item<'d>,
        position: usize,
        size: Option<usize>,
    ) -> DynamicContext<'d> {
        let name = item.name();

        DynamicContext {
            item,
            position,
            size,
            name,
            statics: Rc::clone(&self.statics),
        }
    }
}
