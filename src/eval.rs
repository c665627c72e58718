use std::collections::HashSet;
use std::rc::Rc;

use tracing::trace;

use crate::ast::{
    AdditiveOp, CompareOp, Expr, MultiplicativeOp, NodeTest, Postfix, Predicate, Relation, SetOp,
    Sign,
};
use crate::context::DynamicContext;
use crate::error::{Error, ErrorCode, Result};
use crate::model::{key_is_prefix, Node};
use crate::sequence::{effective_boolean, rescope, rescope_streaming, Sequence};
use crate::tokens::Axis;
use crate::value::{Atomic, Item};

/// Evaluate one AST node against a dynamic context, producing a lazy
/// sequence. The evaluator keeps no state of its own; only the context
/// advances.
pub fn evaluate<'d>(expr: &Rc<Expr>, ctx: &DynamicContext<'d>) -> Result<Sequence<'d>> {
    match expr.as_ref() {
        Expr::Expressions(items) if items.is_empty() => Ok(Sequence::empty()),

        Expr::Expressions(items) => {
            let concat = ConcatExprs {
                exprs: items.clone().into_iter(),
                ctx: ctx.clone(),
                current: None,
                done: false,
            };

            Ok(rescope_streaming(Sequence::from_iter(concat)))
        }

        Expr::Or(items) => {
            for item in items {
                if effective_boolean(evaluate(item, ctx)?)? {
                    return Ok(singleton(ctx, Atomic::Boolean(true)));
                }
            }

            Ok(singleton(ctx, Atomic::Boolean(false)))
        }

        Expr::And(items) => {
            for item in items {
                if !effective_boolean(evaluate(item, ctx)?)? {
                    return Ok(singleton(ctx, Atomic::Boolean(false)));
                }
            }

            Ok(singleton(ctx, Atomic::Boolean(true)))
        }

        Expr::Compare { lhs, op, rhs } => eval_compare(lhs, *op, rhs, ctx),

        Expr::Additive { lhs, op, rhs } => eval_additive(lhs, *op, rhs, ctx),

        Expr::Multiplicative { lhs, op, rhs } => eval_multiplicative(lhs, *op, rhs, ctx),

        Expr::Union { lhs, rhs } => eval_set(lhs, rhs, ctx, SetKind::Union),

        Expr::Intersect { lhs, op, rhs } => {
            let kind = match op {
                SetOp::Intersect => SetKind::Intersect,
                SetOp::Except => SetKind::Except,
            };

            eval_set(lhs, rhs, ctx, kind)
        }

        Expr::Unary { sign, expr } => eval_unary(*sign, expr, ctx),

        Expr::Path { lhs, rhs } => {
            // The left side is materialised in full: the right side may be
            // re-entered once per item.
            let inputs = rescope(evaluate(lhs, ctx)?.materialize()?);

            let flat = FlatEval {
                expr: Rc::clone(rhs),
                inputs: inputs.into_iter(),
                current: None,
                done: false,
            };

            Ok(rescope_streaming(Sequence::from_iter(flat)))
        }

        Expr::Root(inner) => {
            let Item::Node(node) = &ctx.item else {
                return Err(Error::eval(
                    ErrorCode::XPTY0020,
                    "a rooted path requires a node context item",
                ));
            };

            let root_ctx = ctx.with_item(Item::Node(node.root()), 1, Some(1));

            match inner {
                Some(expr) => evaluate(expr, &root_ctx),
                None => Ok(Sequence::once(root_ctx)),
            }
        }

        Expr::AxisStep {
            axis,
            test,
            predicates,
        } => eval_axis_step(*axis, test, predicates, ctx),

        Expr::Postfix { primary, postfixes } => {
            let mut contexts = rescope(evaluate(primary, ctx)?.materialize()?);

            for postfix in postfixes {
                match postfix {
                    Postfix::Predicate(Predicate(pred)) => {
                        contexts = apply_predicate(contexts, pred)?;
                    }
                    Postfix::ArgumentList(_) => {
                        return Err(Error::eval(
                            ErrorCode::XPTY0004,
                            "value is not a function and cannot be applied",
                        ));
                    }
                }
            }

            Ok(Sequence::from_contexts(contexts))
        }

        Expr::FunctionCall { name, args } => eval_function_call(name, args, ctx),

        Expr::Literal(atomic) => Ok(singleton(ctx, atomic.clone())),

        Expr::ContextItem => Ok(Sequence::once(ctx.clone())),

        Expr::VarRef(name) => {
            let Some(items) = ctx.statics.variables.get(name).cloned() else {
                return Err(Error::eval(
                    ErrorCode::XPST0008,
                    format!("unknown variable ${name}"),
                ));
            };

            Ok(scoped_items(ctx, items))
        }
    }
}

fn singleton<'d>(ctx: &DynamicContext<'d>, atomic: Atomic) -> Sequence<'d> {
    Sequence::once(ctx.with_item(Item::Atomic(atomic), 1, Some(1)))
}

/// Rescope a materialised item list into a sequence of fresh contexts.
fn scoped_items<'d>(ctx: &DynamicContext<'d>, items: Vec<Item<'d>>) -> Sequence<'d> {
    let contexts = items
        .into_iter()
        .map(|item| ctx.with_item(item, 0, None))
        .collect();

    Sequence::from_contexts(rescope(contexts))
}

/// Evaluate one expression against each input context in order.
struct FlatEval<'d> {
    expr: Rc<Expr>,
    inputs: std::vec::IntoIter<DynamicContext<'d>>,
    current: Option<Sequence<'d>>,
    done: bool,
}

impl<'d> Iterator for FlatEval<'d> {
    type Item = Result<DynamicContext<'d>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if let Some(current) = &mut self.current {
                match current.next() {
                    Some(Ok(ctx)) => return Some(Ok(ctx)),
                    Some(Err(error)) => {
                        self.done = true;
                        return Some(Err(error));
                    }
                    None => self.current = None,
                }
            }

            let input = self.inputs.next()?;

            match evaluate(&self.expr, &input) {
                Ok(seq) => self.current = Some(seq),
                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

/// Concatenate the results of a comma sequence, left to right.
struct ConcatExprs<'d> {
    exprs: std::vec::IntoIter<Rc<Expr>>,
    ctx: DynamicContext<'d>,
    current: Option<Sequence<'d>>,
    done: bool,
}

impl<'d> Iterator for ConcatExprs<'d> {
    type Item = Result<DynamicContext<'d>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if let Some(current) = &mut self.current {
                match current.next() {
                    Some(Ok(ctx)) => return Some(Ok(ctx)),
                    Some(Err(error)) => {
                        self.done = true;
                        return Some(Err(error));
                    }
                    None => self.current = None,
                }
            }

            let expr = self.exprs.next()?;

            match evaluate(&expr, &self.ctx) {
                Ok(seq) => self.current = Some(seq),
                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

// Axis steps

fn eval_axis_step<'d>(
    axis: Axis,
    test: &NodeTest,
    predicates: &[Predicate],
    ctx: &DynamicContext<'d>,
) -> Result<Sequence<'d>> {
    let node = match &ctx.item {
        Item::Node(node) => node.clone(),
        Item::Atomic(atomic) => {
            return Err(Error::eval(
                ErrorCode::XPTY0020,
                format!("axis step on a {} value", atomic.type_name()),
            ));
        }
    };

    let candidates = axis_nodes(axis, &node)?;

    let contexts: Vec<_> = candidates
        .into_iter()
        .filter(|candidate| node_test_matches(test, candidate))
        .map(|candidate| ctx.with_item(Item::Node(candidate), 0, None))
        .collect();

    let mut contexts = rescope(contexts);

    trace!(axis = %axis, count = contexts.len(), "axis step");

    for Predicate(pred) in predicates {
        contexts = apply_predicate(contexts, pred)?;
    }

    Ok(Sequence::from_contexts(contexts))
}

/// Enumerate the candidate nodes of one axis, in document order.
fn axis_nodes<'d>(axis: Axis, node: &Node<'d>) -> Result<Vec<Node<'d>>> {
    Ok(match axis {
        Axis::Child => node.children().collect(),

        Axis::Attribute => node.attributes().collect(),

        Axis::SelfAxis => vec![node.clone()],

        Axis::Descendant => node.descendants().collect(),

        Axis::DescendantOrSelf => std::iter::once(node.clone())
            .chain(node.descendants())
            .collect(),

        Axis::Parent => node.parent().into_iter().collect(),

        Axis::Ancestor => {
            let mut ancestors = Vec::new();
            let mut current = node.parent();

            while let Some(parent) = current {
                current = parent.parent();
                ancestors.push(parent);
            }

            ancestors.reverse();
            ancestors
        }

        Axis::AncestorOrSelf => {
            let mut nodes = axis_nodes(Axis::Ancestor, node)?;
            nodes.push(node.clone());
            nodes
        }

        Axis::FollowingSibling => siblings_of(node, |index, own| index > own),

        Axis::PrecedingSibling => siblings_of(node, |index, own| index < own),

        Axis::Following => {
            let own_key = node.order_key();
            let root = node.root();

            std::iter::once(root.clone())
                .chain(root.descendants())
                .filter(|candidate| {
                    let key = candidate.order_key();
                    key > own_key && !key_is_prefix(&own_key, &key)
                })
                .collect()
        }

        Axis::Preceding => {
            let own_key = node.order_key();
            let root = node.root();

            std::iter::once(root.clone())
                .chain(root.descendants())
                .filter(|candidate| {
                    let key = candidate.order_key();
                    key < own_key && !key_is_prefix(&key, &own_key)
                })
                .collect()
        }

        Axis::Namespace => {
            return Err(Error::eval(
                ErrorCode::XPST0010,
                "the namespace axis is not supported",
            ));
        }
    })
}

fn siblings_of<'d>(node: &Node<'d>, keep: fn(usize, usize) -> bool) -> Vec<Node<'d>> {
    let Some(parent) = node.parent() else {
        return Vec::new();
    };

    let siblings: Vec<_> = parent.children().collect();

    let Some(own_index) = siblings.iter().position(|s| s.identity_eq(node)) else {
        // Attribute nodes are not children of their parent.
        return Vec::new();
    };

    siblings
        .into_iter()
        .enumerate()
        .filter(|(index, _)| keep(*index, own_index))
        .map(|(_, sibling)| sibling)
        .collect()
}

fn node_test_matches(test: &NodeTest, node: &Node<'_>) -> bool {
    match test {
        NodeTest::Name(name) => name == "*" || node.name() == *name,
        NodeTest::AnyKind => true,
        NodeTest::Text => node.is_text(),
        NodeTest::Element(name) => node.is_element() && kind_name_matches(name, node),
        NodeTest::Attribute(name) => node.is_attribute() && kind_name_matches(name, node),
    }
}

fn kind_name_matches(name: &Option<String>, node: &Node<'_>) -> bool {
    match name.as_deref() {
        None | Some("*") => true,
        Some(name) => node.name() == name,
    }
}

// Predicates

fn apply_predicate<'d>(
    contexts: Vec<DynamicContext<'d>>,
    pred: &Rc<Expr>,
) -> Result<Vec<DynamicContext<'d>>> {
    let mut kept = Vec::new();

    for ctx in contexts {
        if predicate_matches(pred, &ctx)? {
            kept.push(ctx);
        }
    }

    Ok(rescope(kept))
}

fn predicate_matches<'d>(pred: &Rc<Expr>, ctx: &DynamicContext<'d>) -> Result<bool> {
    let (seq, single) = evaluate(pred, ctx)?.peek_one()?;

    if let Some(first) = single {
        if let Item::Atomic(atomic) = &first.item {
            // A single numeric is a positional predicate. Non-integer
            // numerics match no position; that filters everything out
            // without raising an error.
            match atomic {
                Atomic::Integer(v) => return Ok(*v == ctx.position as i64),
                Atomic::Double(v) => return Ok(*v == ctx.position as f64),
                _ => {}
            }
        }
    }

    effective_boolean(seq)
}

// Comparisons

fn eval_compare<'d>(
    lhs: &Rc<Expr>,
    op: CompareOp,
    rhs: &Rc<Expr>,
    ctx: &DynamicContext<'d>,
) -> Result<Sequence<'d>> {
    let left = evaluate(lhs, ctx)?.materialize_items()?;
    let right = evaluate(rhs, ctx)?.materialize_items()?;

    let result = match op {
        CompareOp::Is => {
            let a = single_node(&left)?;
            let b = single_node(&right)?;

            a.identity_eq(b)
        }

        _ if op.is_general() => {
            // Existential: true iff some pair satisfies the comparison.
            let relation = op.relation().expect("general comparison relation");
            let mut found = false;

            'pairs: for a in &left {
                for b in &right {
                    if general_pair_matches(a.atomized(), b.atomized(), relation)? {
                        found = true;
                        break 'pairs;
                    }
                }
            }

            found
        }

        _ => {
            let relation = op.relation().expect("value comparison relation");
            let (a, _) = exactly_one(&left, op.symbol())?.atomized();
            let (b, _) = exactly_one(&right, op.symbol())?.atomized();

            compare_atomics(&a, &b, relation)?
        }
    };

    Ok(singleton(ctx, Atomic::Boolean(result)))
}

fn exactly_one<'a, 'd>(items: &'a [Item<'d>], what: &str) -> Result<&'a Item<'d>> {
    match items {
        [single] => Ok(single),
        _ => Err(Error::eval(
            ErrorCode::XPTY0004,
            format!(
                "operand of `{what}` must be a single item, got a sequence of {}",
                items.len()
            ),
        )),
    }
}

fn single_node<'a, 'd>(items: &'a [Item<'d>]) -> Result<&'a Node<'d>> {
    exactly_one(items, "is")?.as_node().ok_or_else(|| {
        Error::eval(ErrorCode::XPTY0004, "operand of `is` must be a node")
    })
}

fn general_pair_matches(
    left: (Atomic, bool),
    right: (Atomic, bool),
    relation: Relation,
) -> Result<bool> {
    // Untyped node values cast towards the typed operand.
    let (a, b) = match (left, right) {
        ((a, true), (b, false)) => (cast_untyped(a, &b)?, b),
        ((a, false), (b, true)) => {
            let cast = cast_untyped(b, &a)?;
            (a, cast)
        }
        ((a, _), (b, _)) => (a, b),
    };

    compare_atomics(&a, &b, relation)
}

fn cast_untyped(untyped: Atomic, target: &Atomic) -> Result<Atomic> {
    let Atomic::Str(text) = &untyped else {
        return Ok(untyped);
    };

    match target {
        Atomic::Integer(_) | Atomic::Double(_) => {
            text.trim().parse::<f64>().map(Atomic::Double).map_err(|_| {
                Error::eval(
                    ErrorCode::FOCA0002,
                    format!("cannot cast \"{text}\" to a number"),
                )
            })
        }
        Atomic::Str(_) => Ok(untyped),
        Atomic::Boolean(_) => Err(Error::eval(
            ErrorCode::XPTY0004,
            "cannot compare an untyped value to a boolean",
        )),
    }
}

fn compare_atomics(a: &Atomic, b: &Atomic, relation: Relation) -> Result<bool> {
    use std::cmp::Ordering;

    let ordering: Option<Ordering> = match (a, b) {
        (Atomic::Integer(x), Atomic::Integer(y)) => Some(x.cmp(y)),

        _ if a.is_numeric() && b.is_numeric() => {
            let x = a.as_f64().expect("numeric");
            let y = b.as_f64().expect("numeric");

            // NaN compares false under everything except `ne`.
            x.partial_cmp(&y)
        }

        (Atomic::Str(x), Atomic::Str(y)) => Some(x.cmp(y)),
        (Atomic::Boolean(x), Atomic::Boolean(y)) => Some(x.cmp(y)),

        _ => {
            return Err(Error::eval(
                ErrorCode::XPTY0004,
                format!("cannot compare {} to {}", a.type_name(), b.type_name()),
            ));
        }
    };

    Ok(match ordering {
        Some(ordering) => match relation {
            Relation::Eq => ordering == Ordering::Equal,
            Relation::Ne => ordering != Ordering::Equal,
            Relation::Lt => ordering == Ordering::Less,
            Relation::Le => ordering != Ordering::Greater,
            Relation::Gt => ordering == Ordering::Greater,
            Relation::Ge => ordering != Ordering::Less,
        },
        None => relation == Relation::Ne,
    })
}

// Arithmetic

/// Reduce an operand to a single numeric, or `None` for the empty
/// sequence (arithmetic on an empty operand yields an empty result).
fn numeric_operand<'d>(expr: &Rc<Expr>, ctx: &DynamicContext<'d>) -> Result<Option<Atomic>> {
    let items = evaluate(expr, ctx)?.materialize_items()?;

    match items.as_slice() {
        [] => Ok(None),

        [item] => {
            let (atomic, untyped) = item.atomized();

            if untyped {
                let Atomic::Str(text) = &atomic else {
                    unreachable!("untyped values are strings")
                };

                return text
                    .trim()
                    .parse::<f64>()
                    .map(|v| Some(Atomic::Double(v)))
                    .map_err(|_| {
                        Error::eval(
                            ErrorCode::FOCA0002,
                            format!("cannot cast \"{text}\" to a number"),
                        )
                    });
            }

            if atomic.is_numeric() {
                Ok(Some(atomic))
            } else {
                Err(Error::eval(
                    ErrorCode::XPTY0004,
                    format!("arithmetic on a {} operand", atomic.type_name()),
                ))
            }
        }

        items => Err(Error::eval(
            ErrorCode::XPTY0004,
            format!(
                "arithmetic operand must be a single numeric, got a sequence of {}",
                items.len()
            ),
        )),
    }
}

fn eval_additive<'d>(
    lhs: &Rc<Expr>,
    op: AdditiveOp,
    rhs: &Rc<Expr>,
    ctx: &DynamicContext<'d>,
) -> Result<Sequence<'d>> {
    let left = numeric_operand(lhs, ctx);
    let right = numeric_operand(rhs, ctx);

    // An empty operand yields an empty result before the other side is
    // checked.
    if matches!(left, Ok(None)) || matches!(right, Ok(None)) {
        return Ok(Sequence::empty());
    }

    let a = left?.expect("non-empty operand");
    let b = right?.expect("non-empty operand");

    let result = match (&a, &b) {
        (Atomic::Integer(x), Atomic::Integer(y)) => {
            let value = match op {
                AdditiveOp::Add => x.checked_add(*y),
                AdditiveOp::Subtract => x.checked_sub(*y),
            };

            Atomic::Integer(value.ok_or_else(integer_overflow)?)
        }

        _ => {
            let x = a.as_f64().expect("numeric");
            let y = b.as_f64().expect("numeric");

            Atomic::Double(match op {
                AdditiveOp::Add => x + y,
                AdditiveOp::Subtract => x - y,
            })
        }
    };

    Ok(singleton(ctx, result))
}

fn eval_multiplicative<'d>(
    lhs: &Rc<Expr>,
    op: MultiplicativeOp,
    rhs: &Rc<Expr>,
    ctx: &DynamicContext<'d>,
) -> Result<Sequence<'d>> {
    let left = numeric_operand(lhs, ctx);
    let right = numeric_operand(rhs, ctx);

    // An empty operand yields an empty result before the other side is
    // checked.
    if matches!(left, Ok(None)) || matches!(right, Ok(None)) {
        return Ok(Sequence::empty());
    }

    let a = left?.expect("non-empty operand");
    let b = right?.expect("non-empty operand");

    let result = match op {
        MultiplicativeOp::Multiply => match (&a, &b) {
            (Atomic::Integer(x), Atomic::Integer(y)) => {
                Atomic::Integer(x.checked_mul(*y).ok_or_else(integer_overflow)?)
            }
            _ => Atomic::Double(a.as_f64().expect("numeric") * b.as_f64().expect("numeric")),
        },

        // True division. Dividing integers by zero is an error; doubles
        // follow IEEE and produce infinities or NaN.
        MultiplicativeOp::Divide => match (&a, &b) {
            (Atomic::Integer(_), Atomic::Integer(0)) => return Err(division_by_zero()),
            _ => Atomic::Double(a.as_f64().expect("numeric") / b.as_f64().expect("numeric")),
        },

        MultiplicativeOp::IntegerDivide => match (&a, &b) {
            (Atomic::Integer(_), Atomic::Integer(0)) => return Err(division_by_zero()),
            (Atomic::Integer(x), Atomic::Integer(y)) => {
                Atomic::Integer(x.checked_div(*y).ok_or_else(integer_overflow)?)
            }
            _ => {
                let x = a.as_f64().expect("numeric");
                let y = b.as_f64().expect("numeric");

                if y == 0.0 {
                    return Err(division_by_zero());
                }

                if !x.is_finite() {
                    return Err(Error::eval(
                        ErrorCode::FOAR0002,
                        "idiv with a non-finite dividend",
                    ));
                }

                let truncated = (x / y).trunc();

                if truncated < i64::MIN as f64 || truncated > i64::MAX as f64 {
                    return Err(integer_overflow());
                }

                Atomic::Integer(truncated as i64)
            }
        },

        // Remainder carries the sign of the dividend. A zero double
        // divisor yields NaN rather than an error.
        MultiplicativeOp::Modulus => match (&a, &b) {
            (Atomic::Integer(_), Atomic::Integer(0)) => return Err(division_by_zero()),
            (Atomic::Integer(x), Atomic::Integer(y)) => {
                Atomic::Integer(x.checked_rem(*y).ok_or_else(integer_overflow)?)
            }
            _ => Atomic::Double(a.as_f64().expect("numeric") % b.as_f64().expect("numeric")),
        },
    };

    Ok(singleton(ctx, result))
}

fn eval_unary<'d>(sign: Sign, expr: &Rc<Expr>, ctx: &DynamicContext<'d>) -> Result<Sequence<'d>> {
    let Some(operand) = numeric_operand(expr, ctx)? else {
        return Ok(Sequence::empty());
    };

    let result = match sign {
        Sign::Plus => operand,
        Sign::Minus => match operand {
            Atomic::Integer(v) => Atomic::Integer(v.checked_neg().ok_or_else(integer_overflow)?),
            Atomic::Double(v) => Atomic::Double(-v),
            _ => unreachable!("numeric operand"),
        },
    };

    Ok(singleton(ctx, result))
}

fn division_by_zero() -> Error {
    Error::eval(ErrorCode::FOAR0001, "division by zero")
}

fn integer_overflow() -> Error {
    Error::eval(ErrorCode::FOAR0002, "integer overflow")
}

// Set operations

#[derive(Debug, Clone, Copy)]
enum SetKind {
    Union,
    Intersect,
    Except,
}

impl SetKind {
    fn keyword(self) -> &'static str {
        match self {
            SetKind::Union => "union",
            SetKind::Intersect => "intersect",
            SetKind::Except => "except",
        }
    }
}

fn eval_set<'d>(
    lhs: &Rc<Expr>,
    rhs: &Rc<Expr>,
    ctx: &DynamicContext<'d>,
    kind: SetKind,
) -> Result<Sequence<'d>> {
    let left = node_sequence(evaluate(lhs, ctx)?, kind)?;
    let right = node_sequence(evaluate(rhs, ctx)?, kind)?;

    let merged: Vec<Node<'d>> = match kind {
        SetKind::Union => left.into_iter().chain(right).collect(),

        SetKind::Intersect => {
            let keys: HashSet<Vec<u64>> = right.iter().map(|n| n.order_key()).collect();

            left.into_iter()
                .filter(|n| keys.contains(&n.order_key()))
                .collect()
        }

        SetKind::Except => {
            let keys: HashSet<Vec<u64>> = right.iter().map(|n| n.order_key()).collect();

            left.into_iter()
                .filter(|n| !keys.contains(&n.order_key()))
                .collect()
        }
    };

    // Document order, duplicates removed by node identity.
    let mut keyed: Vec<(Vec<u64>, Node<'d>)> =
        merged.into_iter().map(|n| (n.order_key(), n)).collect();

    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|a, b| a.0 == b.0);

    Ok(scoped_items(
        ctx,
        keyed.into_iter().map(|(_, n)| Item::Node(n)).collect(),
    ))
}

fn node_sequence<'d>(seq: Sequence<'d>, kind: SetKind) -> Result<Vec<Node<'d>>> {
    seq.materialize_items()?
        .into_iter()
        .map(|item| match item {
            Item::Node(node) => Ok(node),
            Item::Atomic(atomic) => Err(Error::eval(
                ErrorCode::XPTY0004,
                format!(
                    "operand of `{}` contains a {} value",
                    kind.keyword(),
                    atomic.type_name()
                ),
            )),
        })
        .collect()
}

// Function calls

fn eval_function_call<'d>(
    name: &str,
    args: &[Rc<Expr>],
    ctx: &DynamicContext<'d>,
) -> Result<Sequence<'d>> {
    let Some(function) = ctx.statics.functions.get(name).copied() else {
        return Err(Error::eval(
            ErrorCode::XPST0017,
            format!("unknown function {name}()"),
        ));
    };

    if args.len() < function.min_args || args.len() > function.max_args {
        return Err(Error::eval(
            ErrorCode::XPST0017,
            format!("{name}() does not accept {} arguments", args.len()),
        ));
    }

    let mut arguments = Vec::with_capacity(args.len());

    for arg in args {
        arguments.push(evaluate(arg, ctx)?.materialize_items()?);
    }

    let items = (function.run)(ctx, &arguments)?;

    Ok(scoped_items(ctx, items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use crate::parser::parse;

    fn run(query: &str) -> Result<Vec<Item<'static>>> {
        let expr = parse(query)?;
        let ctx = DynamicContext::new(
            Item::Atomic(Atomic::Integer(0)),
            Rc::new(StaticContext::default()),
        );

        evaluate(&expr, &ctx)?.materialize_items()
    }

    fn run_one(query: &str) -> Atomic {
        let items = run(query).unwrap_or_else(|e| panic!("query {query:?} failed: {e}"));

        assert_eq!(items.len(), 1, "query {query:?} returned {items:?}");
        items[0].as_atomic().expect("atomic result").clone()
    }

    #[test]
    fn literals() {
        assert_eq!(run_one("2"), Atomic::Integer(2));
        assert_eq!(run_one("2.5"), Atomic::Double(2.5));
        assert_eq!(run_one("'abc'"), Atomic::Str("abc".to_string()));
    }

    #[test]
    fn value_comparisons() {
        assert_eq!(run_one("2 eq 2"), Atomic::Boolean(true));
        assert_eq!(run_one("2 eq 3"), Atomic::Boolean(false));
        assert_eq!(run_one("'2' eq '2'"), Atomic::Boolean(true));
        assert_eq!(run_one("'2' eq '3'"), Atomic::Boolean(false));
        assert_eq!(run_one("2 lt 3"), Atomic::Boolean(true));
        assert_eq!(run_one("2 le 2"), Atomic::Boolean(true));
        assert_eq!(run_one("3 gt 2"), Atomic::Boolean(true));
        assert_eq!(run_one("2 ne 3"), Atomic::Boolean(true));
        assert_eq!(run_one("2 eq 2.0"), Atomic::Boolean(true));
    }

    #[test]
    fn value_comparison_type_mismatch() {
        let err = run("'2' eq 2").unwrap_err();
        assert_eq!(err.code(), ErrorCode::XPTY0004);

        let err = run("(1, 2) eq 1").unwrap_err();
        assert_eq!(err.code(), ErrorCode::XPTY0004);
    }

    #[test]
    fn general_comparisons_are_existential() {
        assert_eq!(run_one("(1, 2, 3) = 2"), Atomic::Boolean(true));
        assert_eq!(run_one("(1, 2, 3) = 5"), Atomic::Boolean(false));
        assert_eq!(run_one("(1, 2) < (2, 0)"), Atomic::Boolean(true));
        assert_eq!(run_one("() = 1"), Atomic::Boolean(false));
        assert_eq!(run_one("2 == 2"), Atomic::Boolean(true));
    }

    #[test]
    fn logical_operators() {
        assert_eq!(run_one("1 eq 1 and 2 eq 2"), Atomic::Boolean(true));
        assert_eq!(run_one("1 eq 2 or 2 eq 2"), Atomic::Boolean(true));
        assert_eq!(run_one("1 eq 2 and 2 eq 2"), Atomic::Boolean(false));
        // short circuit: the right side would be a type error
        assert_eq!(run_one("1 eq 1 or ('a' eq 1)"), Atomic::Boolean(true));
    }

    #[test]
    fn arithmetic() {
        assert_eq!(run_one("1 + 2"), Atomic::Integer(3));
        assert_eq!(run_one("5 - 7"), Atomic::Integer(-2));
        assert_eq!(run_one("3 * 4"), Atomic::Integer(12));
        assert_eq!(run_one("5 div 2"), Atomic::Double(2.5));
        assert_eq!(run_one("7 idiv 2"), Atomic::Integer(3));
        assert_eq!(run_one("-7 idiv 2"), Atomic::Integer(-3));
        assert_eq!(run_one("7 mod 2"), Atomic::Integer(1));
        assert_eq!(run_one("-7 mod 2"), Atomic::Integer(-1));
        assert_eq!(run_one("7.5 mod 2"), Atomic::Double(1.5));
        assert_eq!(run_one("1 + 2 * 3"), Atomic::Integer(7));
        assert_eq!(run_one("-(2)"), Atomic::Integer(-2));
        assert_eq!(run_one("1.5 + 1"), Atomic::Double(2.5));
    }

    #[test]
    fn arithmetic_on_empty_is_empty() {
        assert_eq!(run("() + 1").unwrap(), Vec::new());
        assert_eq!(run("-()").unwrap(), Vec::new());

        // the empty sequence wins even when the other side would not
        // reduce to a numeric
        assert_eq!(run("() + 'a'").unwrap(), Vec::new());
        assert_eq!(run("'a' * ()").unwrap(), Vec::new());
        assert_eq!(run("() div 0").unwrap(), Vec::new());
    }

    #[test]
    fn division_by_zero_codes() {
        assert_eq!(run("1 div 0").unwrap_err().code(), ErrorCode::FOAR0001);
        assert_eq!(run("1 idiv 0").unwrap_err().code(), ErrorCode::FOAR0001);
        assert_eq!(run("1 mod 0").unwrap_err().code(), ErrorCode::FOAR0001);

        // doubles follow IEEE
        assert_eq!(run_one("1.0 div 0"), Atomic::Double(f64::INFINITY));
        let Atomic::Double(nan) = run_one("1.0 mod 0") else {
            panic!("expected a double");
        };
        assert!(nan.is_nan());
    }

    #[test]
    fn comma_sequences_concatenate() {
        assert_eq!(
            run("1, 2, 3").unwrap(),
            vec![
                Item::Atomic(Atomic::Integer(1)),
                Item::Atomic(Atomic::Integer(2)),
                Item::Atomic(Atomic::Integer(3)),
            ]
        );
        assert_eq!(run("()").unwrap(), Vec::new());
    }

    #[test]
    fn unknown_names_are_static_errors() {
        assert_eq!(run("$nope").unwrap_err().code(), ErrorCode::XPST0008);
        assert_eq!(run("nope()").unwrap_err().code(), ErrorCode::XPST0017);
        assert_eq!(run("position(1)").unwrap_err().code(), ErrorCode::XPST0017);
    }

    #[test]
    fn variables_resolve_from_the_static_context() {
        let mut statics = StaticContext::default();
        statics.bind_variable("x", vec![Item::Atomic(Atomic::Integer(41))]);

        let ctx = DynamicContext::new(Item::Atomic(Atomic::Integer(0)), Rc::new(statics));
        let items = evaluate(&parse("$x + 1").unwrap(), &ctx)
            .unwrap()
            .materialize_items()
            .unwrap();

        assert_eq!(items, vec![Item::Atomic(Atomic::Integer(42))]);
    }

    #[test]
    fn axis_step_on_an_atomic_is_a_type_error() {
        assert_eq!(run("child::a").unwrap_err().code(), ErrorCode::XPTY0020);
        assert_eq!(run("2/a").unwrap_err().code(), ErrorCode::XPTY0020);
    }
}
