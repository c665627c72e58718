use std::collections::VecDeque;
use std::rc::Rc;

use tracing::debug;

use crate::ast::{
    AdditiveOp, CompareOp, Expr, MultiplicativeOp, NodeTest, Postfix, Predicate, SetOp, Sign,
};
use crate::error::{Error, Result};
use crate::lexer::Lexer;
use crate::tokens::{Axis, Token, TokenKind};

/// Parse a query into its abstract syntax tree.
pub fn parse(input: &str) -> Result<Rc<Expr>> {
    Parser::new(Lexer::new(input)).parse()
}

/// Precedence-stratified recursive descent over the token stream, with a
/// two-token lookahead buffer (a name followed by `(` is a function call).
pub struct Parser<'s> {
    lexer: Lexer<'s>,
    lookahead: VecDeque<Token>,
}

impl<'s> Parser<'s> {
    pub fn new(lexer: Lexer<'s>) -> Parser<'s> {
        Parser {
            lexer,
            lookahead: VecDeque::new(),
        }
    }

    pub fn parse(mut self) -> Result<Rc<Expr>> {
        let expr = self.parse_expr()?;

        if let Some(token) = self.peek()? {
            return Err(unexpected(token));
        }

        debug!(ast = %expr, "parsed query");

        Ok(expr)
    }

    // Token plumbing

    fn fill(&mut self, n: usize) -> Result<()> {
        while self.lookahead.len() < n {
            match self.lexer.next_token()? {
                Some(token) => self.lookahead.push_back(token),
                None => break,
            }
        }

        Ok(())
    }

    fn peek(&mut self) -> Result<Option<&Token>> {
        self.fill(1)?;
        Ok(self.lookahead.front())
    }

    fn peek_kind(&mut self) -> Result<Option<TokenKind>> {
        Ok(self.peek()?.map(|t| t.kind.clone()))
    }

    fn peek2_kind(&mut self) -> Result<Option<TokenKind>> {
        self.fill(2)?;
        Ok(self.lookahead.get(1).map(|t| t.kind.clone()))
    }

    fn bump(&mut self) -> Result<Token> {
        self.fill(1)?;

        self.lookahead
            .pop_front()
            .ok_or_else(|| Error::parse(self.lexer.offset(), "unexpected end of input"))
    }

    fn eat(&mut self, kind: &TokenKind) -> Result<bool> {
        if self.peek()?.map(|t| &t.kind) == Some(kind) {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        let token = self.bump()?;

        if token.kind == kind {
            Ok(token)
        } else {
            Err(Error::parse(
                token.offset,
                format!("expected {kind:?}, found `{}`", token.lexeme),
            ))
        }
    }

    // Expr := ExprSingle ("," ExprSingle)*
    fn parse_expr(&mut self) -> Result<Rc<Expr>> {
        let mut items = vec![self.parse_expr_single()?];

        while self.eat(&TokenKind::Comma)? {
            items.push(self.parse_expr_single()?);
        }

        Ok(collapse(items, Expr::Expressions))
    }

    fn parse_expr_single(&mut self) -> Result<Rc<Expr>> {
        self.parse_or()
    }

    // OrExpr := AndExpr ("or" AndExpr)*
    fn parse_or(&mut self) -> Result<Rc<Expr>> {
        let mut items = vec![self.parse_and()?];

        while self.eat(&TokenKind::Or)? {
            items.push(self.parse_and()?);
        }

        Ok(collapse(items, Expr::Or))
    }

    // AndExpr := Compare ("and" Compare)*
    fn parse_and(&mut self) -> Result<Rc<Expr>> {
        let mut items = vec![self.parse_comparison()?];

        while self.eat(&TokenKind::And)? {
            items.push(self.parse_comparison()?);
        }

        Ok(collapse(items, Expr::And))
    }

    // Compare := Additive ((ValueComp|GeneralComp|NodeComp) Additive)?
    //
    // Comparison operators do not associate.
    fn parse_comparison(&mut self) -> Result<Rc<Expr>> {
        let lhs = self.parse_additive()?;

        let Some(op) = self.peek_kind()?.as_ref().and_then(comparison_op) else {
            return Ok(lhs);
        };

        self.bump()?;
        let rhs = self.parse_additive()?;

        if let Some(token) = self.peek()? {
            if comparison_op(&token.kind).is_some() {
                return Err(Error::parse(
                    token.offset,
                    format!("comparison operators do not associate: `{}`", token.lexeme),
                ));
            }
        }

        Ok(Rc::new(Expr::Compare { lhs, op, rhs }))
    }

    // Additive := Multiplicative (("+"|"-") Multiplicative)*
    fn parse_additive(&mut self) -> Result<Rc<Expr>> {
        let mut lhs = self.parse_multiplicative()?;

        loop {
            let op = match self.peek_kind()? {
                Some(TokenKind::Plus) => AdditiveOp::Add,
                Some(TokenKind::Minus) => AdditiveOp::Subtract,
                _ => break,
            };

            self.bump()?;
            let rhs = self.parse_multiplicative()?;
            lhs = Rc::new(Expr::Additive { lhs, op, rhs });
        }

        Ok(lhs)
    }

    // Multiplicative := Union (("*"|"div"|"idiv"|"mod") Union)*
    fn parse_multiplicative(&mut self) -> Result<Rc<Expr>> {
        let mut lhs = self.parse_union()?;

        loop {
            let op = match self.peek_kind()? {
                Some(TokenKind::Star) => MultiplicativeOp::Multiply,
                Some(TokenKind::Div) => MultiplicativeOp::Divide,
                Some(TokenKind::IntegerDiv) => MultiplicativeOp::IntegerDivide,
                Some(TokenKind::Mod) => MultiplicativeOp::Modulus,
                _ => break,
            };

            self.bump()?;
            let rhs = self.parse_union()?;
            lhs = Rc::new(Expr::Multiplicative { lhs, op, rhs });
        }

        Ok(lhs)
    }

    // Union := Intersect (("union"|"|") Intersect)*
    fn parse_union(&mut self) -> Result<Rc<Expr>> {
        let mut lhs = self.parse_intersect()?;

        while matches!(
            self.peek_kind()?,
            Some(TokenKind::Union) | Some(TokenKind::Pipe)
        ) {
            self.bump()?;
            let rhs = self.parse_intersect()?;
            lhs = Rc::new(Expr::Union { lhs, rhs });
        }

        Ok(lhs)
    }

    // Intersect := Unary (("intersect"|"except") Unary)*
    fn parse_intersect(&mut self) -> Result<Rc<Expr>> {
        let mut lhs = self.parse_unary()?;

        loop {
            let op = match self.peek_kind()? {
                Some(TokenKind::Intersect) => SetOp::Intersect,
                Some(TokenKind::Except) => SetOp::Except,
                _ => break,
            };

            self.bump()?;
            let rhs = self.parse_unary()?;
            lhs = Rc::new(Expr::Intersect { lhs, op, rhs });
        }

        Ok(lhs)
    }

    // Unary := ("+"|"-")* ValueExpr
    fn parse_unary(&mut self) -> Result<Rc<Expr>> {
        let mut signs = Vec::new();

        loop {
            match self.peek_kind()? {
                Some(TokenKind::Plus) => signs.push(Sign::Plus),
                Some(TokenKind::Minus) => signs.push(Sign::Minus),
                _ => break,
            }

            self.bump()?;
        }

        let mut expr = self.parse_value_expr()?;

        for sign in signs.into_iter().rev() {
            expr = Rc::new(Expr::Unary { sign, expr });
        }

        Ok(expr)
    }

    // ValueExpr := "/" RelativePath? | "//" RelativePath | RelativePath
    fn parse_value_expr(&mut self) -> Result<Rc<Expr>> {
        if self.eat(&TokenKind::Slash)? {
            let starts_path = self
                .peek_kind()?
                .map(|k| starts_step(&k))
                .unwrap_or(false);

            if starts_path {
                let path = self.parse_relative_path(None)?;
                return Ok(Rc::new(Expr::Root(Some(path))));
            }

            return Ok(Rc::new(Expr::Root(None)));
        }

        if self.eat(&TokenKind::DoubleSlash)? {
            let path = self.parse_relative_path(Some(descendant_or_self_step()))?;
            return Ok(Rc::new(Expr::Root(Some(path))));
        }

        self.parse_relative_path(None)
    }

    // RelativePath := StepExpr (("/"|"//") StepExpr)*
    fn parse_relative_path(&mut self, start: Option<Rc<Expr>>) -> Result<Rc<Expr>> {
        let first = self.parse_step_expr()?;

        let mut expr = match start {
            Some(lhs) => Rc::new(Expr::Path { lhs, rhs: first }),
            None => first,
        };

        loop {
            if self.eat(&TokenKind::Slash)? {
                let rhs = self.parse_step_expr()?;
                expr = Rc::new(Expr::Path { lhs: expr, rhs });
            } else if self.eat(&TokenKind::DoubleSlash)? {
                let lhs = Rc::new(Expr::Path {
                    lhs: expr,
                    rhs: descendant_or_self_step(),
                });
                let rhs = self.parse_step_expr()?;
                expr = Rc::new(Expr::Path { lhs, rhs });
            } else {
                break;
            }
        }

        Ok(expr)
    }

    // StepExpr := PostfixExpr | AxisStep
    fn parse_step_expr(&mut self) -> Result<Rc<Expr>> {
        let Some(kind) = self.peek_kind()? else {
            return Err(Error::parse(self.lexer.offset(), "unexpected end of input"));
        };

        match kind {
            // ForwardAxis "::" NodeTest | ReverseAxis "::" NodeTest
            TokenKind::AxisWord(axis) => {
                self.bump()?;
                self.expect(TokenKind::ColonColon)?;
                let test = self.parse_node_test()?;
                self.parse_axis_step(axis, test)
            }

            // '@' NodeTest, abbreviation for attribute::NodeTest
            TokenKind::At => {
                self.bump()?;
                let test = self.parse_node_test()?;
                self.parse_axis_step(Axis::Attribute, test)
            }

            // '..', abbreviation for parent::node()
            TokenKind::DotDot => {
                self.bump()?;
                self.parse_axis_step(Axis::Parent, NodeTest::AnyKind)
            }

            // Unprefixed node tests walk the child axis, except an
            // attribute test which implies the attribute axis.
            TokenKind::Star => {
                self.bump()?;
                self.parse_axis_step(Axis::Child, NodeTest::Name("*".to_string()))
            }

            TokenKind::KindNode | TokenKind::KindText | TokenKind::KindElement => {
                let test = self.parse_node_test()?;
                self.parse_axis_step(Axis::Child, test)
            }

            TokenKind::KindAttribute => {
                let test = self.parse_node_test()?;
                self.parse_axis_step(Axis::Attribute, test)
            }

            TokenKind::Name(_) => {
                if self.peek2_kind()? == Some(TokenKind::LeftParen) {
                    self.parse_postfix_expr()
                } else {
                    let test = self.parse_node_test()?;
                    self.parse_axis_step(Axis::Child, test)
                }
            }

            TokenKind::Str(_)
            | TokenKind::Integer(_)
            | TokenKind::Double(_)
            | TokenKind::Dollar
            | TokenKind::Dot
            | TokenKind::LeftParen => self.parse_postfix_expr(),

            _ => Err(unexpected(self.peek()?.expect("peeked"))),
        }
    }

    // AxisStep := (ForwardStep|ReverseStep) Predicate*
    fn parse_axis_step(&mut self, axis: Axis, test: NodeTest) -> Result<Rc<Expr>> {
        let predicates = self.parse_predicates()?;

        Ok(Rc::new(Expr::AxisStep {
            axis,
            test,
            predicates,
        }))
    }

    fn parse_predicates(&mut self) -> Result<Vec<Predicate>> {
        let mut predicates = Vec::new();

        while self.eat(&TokenKind::LeftBracket)? {
            let expr = self.parse_expr()?;
            self.expect(TokenKind::RightBracket)?;
            predicates.push(Predicate(expr));
        }

        Ok(predicates)
    }

    // NodeTest := KindTest | NameTest
    fn parse_node_test(&mut self) -> Result<NodeTest> {
        let token = self.bump()?;

        match token.kind {
            TokenKind::Name(name) => Ok(NodeTest::Name(name)),
            TokenKind::Star => Ok(NodeTest::Name("*".to_string())),

            TokenKind::KindNode => {
                self.expect(TokenKind::LeftParen)?;
                self.expect(TokenKind::RightParen)?;
                Ok(NodeTest::AnyKind)
            }

            TokenKind::KindText => {
                self.expect(TokenKind::LeftParen)?;
                self.expect(TokenKind::RightParen)?;
                Ok(NodeTest::Text)
            }

            TokenKind::KindElement => {
                let name = self.parse_kind_test_argument()?;
                Ok(NodeTest::Element(name))
            }

            TokenKind::KindAttribute => {
                let name = self.parse_kind_test_argument()?;
                Ok(NodeTest::Attribute(name))
            }

            _ => Err(Error::parse(
                token.offset,
                format!("expected a node test, found `{}`", token.lexeme),
            )),
        }
    }

    // "(" (Name | "*")? ")"
    fn parse_kind_test_argument(&mut self) -> Result<Option<String>> {
        self.expect(TokenKind::LeftParen)?;

        let name = match self.peek_kind()? {
            Some(TokenKind::Name(name)) => {
                self.bump()?;
                Some(name)
            }
            Some(TokenKind::Star) => {
                self.bump()?;
                Some("*".to_string())
            }
            _ => None,
        };

        self.expect(TokenKind::RightParen)?;

        Ok(name)
    }

    // PostfixExpr := PrimaryExpr (Predicate | ArgumentList)*
    fn parse_postfix_expr(&mut self) -> Result<Rc<Expr>> {
        let primary = self.parse_primary()?;
        let mut postfixes = Vec::new();

        loop {
            if self.eat(&TokenKind::LeftBracket)? {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RightBracket)?;
                postfixes.push(Postfix::Predicate(Predicate(expr)));
            } else if self.peek_kind()? == Some(TokenKind::LeftParen) {
                postfixes.push(Postfix::ArgumentList(self.parse_argument_list()?));
            } else {
                break;
            }
        }

        if postfixes.is_empty() {
            Ok(primary)
        } else {
            Ok(Rc::new(Expr::Postfix { primary, postfixes }))
        }
    }

    // PrimaryExpr := Literal | VarRef | "(" Expr? ")" | "." | FunctionCall
    fn parse_primary(&mut self) -> Result<Rc<Expr>> {
        let Some(kind) = self.peek_kind()? else {
            return Err(Error::parse(self.lexer.offset(), "unexpected end of input"));
        };

        match kind {
            TokenKind::Str(value) => {
                self.bump()?;
                Ok(Rc::new(Expr::Literal(value.into())))
            }

            TokenKind::Integer(value) => {
                self.bump()?;
                Ok(Rc::new(Expr::Literal(value.into())))
            }

            TokenKind::Double(value) => {
                self.bump()?;
                Ok(Rc::new(Expr::Literal(value.into())))
            }

            TokenKind::Dollar => {
                self.bump()?;
                let token = self.bump()?;

                match token.kind {
                    TokenKind::Name(name) => Ok(Rc::new(Expr::VarRef(name))),
                    _ => Err(Error::parse(
                        token.offset,
                        format!("expected a variable name, found `{}`", token.lexeme),
                    )),
                }
            }

            TokenKind::Dot => {
                self.bump()?;
                Ok(Rc::new(Expr::ContextItem))
            }

            // Parentheses order the tree and do not survive in it.
            TokenKind::LeftParen => {
                self.bump()?;

                if self.eat(&TokenKind::RightParen)? {
                    return Ok(Rc::new(Expr::Expressions(Vec::new())));
                }

                let inner = self.parse_expr()?;
                self.expect(TokenKind::RightParen)?;
                Ok(inner)
            }

            TokenKind::Name(name) => {
                self.bump()?;
                let args = self.parse_argument_list()?;
                Ok(Rc::new(Expr::FunctionCall { name, args }))
            }

            _ => Err(unexpected(self.peek()?.expect("peeked"))),
        }
    }

    // ArgumentList := "(" (ExprSingle ("," ExprSingle)*)? ")"
    fn parse_argument_list(&mut self) -> Result<Vec<Rc<Expr>>> {
        self.expect(TokenKind::LeftParen)?;

        let mut args = Vec::new();

        if self.peek_kind()? != Some(TokenKind::RightParen) {
            args.push(self.parse_expr_single()?);

            while self.eat(&TokenKind::Comma)? {
                args.push(self.parse_expr_single()?);
            }
        }

        self.expect(TokenKind::RightParen)?;

        Ok(args)
    }
}

fn collapse(mut items: Vec<Rc<Expr>>, wrap: fn(Vec<Rc<Expr>>) -> Expr) -> Rc<Expr> {
    if items.len() == 1 {
        items.pop().expect("one item")
    } else {
        Rc::new(wrap(items))
    }
}

fn unexpected(token: &Token) -> Error {
    Error::parse(token.offset, format!("unexpected token `{}`", token.lexeme))
}

fn comparison_op(kind: &TokenKind) -> Option<CompareOp> {
    Some(match kind {
        TokenKind::ValueEq => CompareOp::ValueEq,
        TokenKind::ValueNe => CompareOp::ValueNe,
        TokenKind::ValueLt => CompareOp::ValueLt,
        TokenKind::ValueLe => CompareOp::ValueLe,
        TokenKind::ValueGt => CompareOp::ValueGt,
        TokenKind::ValueGe => CompareOp::ValueGe,
        TokenKind::GeneralEq => CompareOp::GeneralEq,
        TokenKind::GeneralNe => CompareOp::GeneralNe,
        TokenKind::GeneralLt => CompareOp::GeneralLt,
        TokenKind::GeneralLe => CompareOp::GeneralLe,
        TokenKind::GeneralGt => CompareOp::GeneralGt,
        TokenKind::GeneralGe => CompareOp::GeneralGe,
        TokenKind::Is => CompareOp::Is,
        _ => return None,
    })
}

fn starts_step(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Name(_)
            | TokenKind::Star
            | TokenKind::At
            | TokenKind::Dot
            | TokenKind::DotDot
            | TokenKind::AxisWord(_)
            | TokenKind::KindElement
            | TokenKind::KindAttribute
            | TokenKind::KindNode
            | TokenKind::KindText
            | TokenKind::Str(_)
            | TokenKind::Integer(_)
            | TokenKind::Double(_)
            | TokenKind::Dollar
            | TokenKind::LeftParen
    )
}

/// The step `descendant-or-self::node()` inserted by `//` desugaring.
fn descendant_or_self_step() -> Rc<Expr> {
    Rc::new(Expr::AxisStep {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::AnyKind,
        predicates: Vec::new(),
    })
}
