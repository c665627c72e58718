use std::fmt;
use std::rc::Rc;

use crate::tokens::Axis;
use crate::value::Atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// 'eq'
    ValueEq,
    /// 'ne'
    ValueNe,
    /// 'lt'
    ValueLt,
    /// 'le'
    ValueLe,
    /// 'gt'
    ValueGt,
    /// 'ge'
    ValueGe,
    /// '=' / '=='
    GeneralEq,
    /// '!='
    GeneralNe,
    /// '<'
    GeneralLt,
    /// '<='
    GeneralLe,
    /// '>'
    GeneralGt,
    /// '>='
    GeneralGe,
    /// 'is'
    Is,
}

/// The ordering relation behind a comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn is_general(self) -> bool {
        matches!(
            self,
            CompareOp::GeneralEq
                | CompareOp::GeneralNe
                | CompareOp::GeneralLt
                | CompareOp::GeneralLe
                | CompareOp::GeneralGt
                | CompareOp::GeneralGe
        )
    }

    pub fn relation(self) -> Option<Relation> {
        match self {
            CompareOp::ValueEq | CompareOp::GeneralEq => Some(Relation::Eq),
            CompareOp::ValueNe | CompareOp::GeneralNe => Some(Relation::Ne),
            CompareOp::ValueLt | CompareOp::GeneralLt => Some(Relation::Lt),
            CompareOp::ValueLe | CompareOp::GeneralLe => Some(Relation::Le),
            CompareOp::ValueGt | CompareOp::GeneralGt => Some(Relation::Gt),
            CompareOp::ValueGe | CompareOp::GeneralGe => Some(Relation::Ge),
            CompareOp::Is => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::ValueEq => "eq",
            CompareOp::ValueNe => "ne",
            CompareOp::ValueLt => "lt",
            CompareOp::ValueLe => "le",
            CompareOp::ValueGt => "gt",
            CompareOp::ValueGe => "ge",
            CompareOp::GeneralEq => "=",
            CompareOp::GeneralNe => "!=",
            CompareOp::GeneralLt => "<",
            CompareOp::GeneralLe => "<=",
            CompareOp::GeneralGt => ">",
            CompareOp::GeneralGe => ">=",
            CompareOp::Is => "is",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditiveOp {
    Add,
    Subtract,
}

impl AdditiveOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AdditiveOp::Add => "+",
            AdditiveOp::Subtract => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplicativeOp {
    Multiply,
    Divide,
    IntegerDivide,
    Modulus,
}

impl MultiplicativeOp {
    pub fn symbol(self) -> &'static str {
        match self {
            MultiplicativeOp::Multiply => "*",
            MultiplicativeOp::Divide => "div",
            MultiplicativeOp::IntegerDivide => "idiv",
            MultiplicativeOp::Modulus => "mod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Intersect,
    Except,
}

impl SetOp {
    pub fn symbol(self) -> &'static str {
        match self {
            SetOp::Intersect => "intersect",
            SetOp::Except => "except",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

/// A node test selects candidate nodes by kind and/or name.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// `name` or `*`
    Name(String),
    /// `node()`
    AnyKind,
    /// `text()`
    Text,
    /// `element()`, `element(*)`, `element(name)`
    Element(Option<String>),
    /// `attribute()`, `attribute(*)`, `attribute(name)`
    Attribute(Option<String>),
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::Name(name) => f.write_str(name),
            NodeTest::AnyKind => f.write_str("node()"),
            NodeTest::Text => f.write_str("text()"),
            NodeTest::Element(None) => f.write_str("element()"),
            NodeTest::Element(Some(name)) => write!(f, "element({name})"),
            NodeTest::Attribute(None) => f.write_str("attribute()"),
            NodeTest::Attribute(Some(name)) => write!(f, "attribute({name})"),
        }
    }
}

/// A bracketed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate(pub Rc<Expr>);

/// Postfix applied to a primary expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Postfix {
    Predicate(Predicate),
    ArgumentList(Vec<Rc<Expr>>),
}

/// The abstract syntax of a query. Children are `Rc`-shared so the
/// evaluator can hold sub-expressions across lazy sequence frames; the
/// tree is immutable after parsing and reusable across evaluations.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Comma sequence; concatenates the results of its operands.
    Expressions(Vec<Rc<Expr>>),
    /// N-ary `or`, flattened.
    Or(Vec<Rc<Expr>>),
    /// N-ary `and`, flattened.
    And(Vec<Rc<Expr>>),
    Compare {
        lhs: Rc<Expr>,
        op: CompareOp,
        rhs: Rc<Expr>,
    },
    Additive {
        lhs: Rc<Expr>,
        op: AdditiveOp,
        rhs: Rc<Expr>,
    },
    Multiplicative {
        lhs: Rc<Expr>,
        op: MultiplicativeOp,
        rhs: Rc<Expr>,
    },
    Union {
        lhs: Rc<Expr>,
        rhs: Rc<Expr>,
    },
    Intersect {
        lhs: Rc<Expr>,
        op: SetOp,
        rhs: Rc<Expr>,
    },
    Unary {
        sign: Sign,
        expr: Rc<Expr>,
    },
    /// The `/` composition. `a//b` is desugared at parse time into
    /// `a/descendant-or-self::node()/b`.
    Path {
        lhs: Rc<Expr>,
        rhs: Rc<Expr>,
    },
    /// A leading `/` or `//`: evaluate from the document root.
    Root(Option<Rc<Expr>>),
    AxisStep {
        axis: Axis,
        test: NodeTest,
        predicates: Vec<Predicate>,
    },
    Postfix {
        primary: Rc<Expr>,
        postfixes: Vec<Postfix>,
    },
    FunctionCall {
        name: String,
        args: Vec<Rc<Expr>>,
    },
    Literal(Atomic),
    /// The `.` leaf: the current context item.
    ContextItem,
    VarRef(String),
}

impl Expr {
    /// True when the node renders without surrounding parentheses.
    fn is_primary(&self) -> bool {
        matches!(
            self,
            Expr::AxisStep { .. }
                | Expr::Postfix { .. }
                | Expr::FunctionCall { .. }
                | Expr::Literal(_)
                | Expr::ContextItem
                | Expr::VarRef(_)
                | Expr::Root(_)
                | Expr::Path { .. }
        )
    }
}

struct Operand<'a>(&'a Expr);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_primary() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "({})", self.0)
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Rc<Expr>], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", Operand(item))?;
    }

    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Expressions(items) if items.is_empty() => f.write_str("()"),
            Expr::Expressions(items) => write_joined(f, items, ", "),
            Expr::Or(items) => write_joined(f, items, " or "),
            Expr::And(items) => write_joined(f, items, " and "),

            Expr::Compare { lhs, op, rhs } => {
                write!(f, "{} {} {}", Operand(lhs), op.symbol(), Operand(rhs))
            }

            Expr::Additive { lhs, op, rhs } => {
                write!(f, "{} {} {}", Operand(lhs), op.symbol(), Operand(rhs))
            }

            Expr::Multiplicative { lhs, op, rhs } => {
                write!(f, "{} {} {}", Operand(lhs), op.symbol(), Operand(rhs))
            }

            Expr::Union { lhs, rhs } => write!(f, "{} | {}", Operand(lhs), Operand(rhs)),

            Expr::Intersect { lhs, op, rhs } => {
                write!(f, "{} {} {}", Operand(lhs), op.symbol(), Operand(rhs))
            }

            Expr::Unary { sign, expr } => {
                let sign = match sign {
                    Sign::Plus => '+',
                    Sign::Minus => '-',
                };

                write!(f, "{sign}{}", Operand(expr))
            }

            Expr::Path { lhs, rhs } => write!(f, "{}/{}", Operand(lhs), Operand(rhs)),

            Expr::Root(None) => f.write_str("/"),
            Expr::Root(Some(expr)) => write!(f, "/{}", Operand(expr)),

            Expr::AxisStep {
                axis,
                test,
                predicates,
            } => {
                write!(f, "{axis}::{test}")?;

                for Predicate(pred) in predicates {
                    write!(f, "[{pred}]")?;
                }

                Ok(())
            }

            Expr::Postfix { primary, postfixes } => {
                write!(f, "{}", Operand(primary))?;

                for postfix in postfixes {
                    match postfix {
                        Postfix::Predicate(Predicate(pred)) => write!(f, "[{pred}]")?,
                        Postfix::ArgumentList(args) => {
                            f.write_str("(")?;
                            write_joined(f, args, ", ")?;
                            f.write_str(")")?;
                        }
                    }
                }

                Ok(())
            }

            Expr::FunctionCall { name, args } => {
                write!(f, "{name}(")?;
                write_joined(f, args, ", ")?;
                f.write_str(")")
            }

            Expr::Literal(Atomic::Str(value)) => write!(f, "'{value}'"),
            Expr::Literal(atomic) => write!(f, "{atomic}"),

            Expr::ContextItem => f.write_str("."),
            Expr::VarRef(name) => write!(f, "${name}"),
        }
    }
}
