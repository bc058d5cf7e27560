//! Recursive-descent parser for the expression grammar.
//!
//! Precedence, loosest first:
//!
//! ```text
//! OR
//! AND
//! NOT
//! = <> < <= > >=  IN  LIKE  IS
//! + -
//! * / %
//! unary - +
//! primary
//! ```

use crate::ast::{AggregateFunc, AggregateScope, BinaryOp, Expr, Function, UnaryOp};
use crate::lexer::{tokenize, Token, TokenKind};
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use tabula_core::{Error, Result, Value};

/// Parses expression text into an AST.
///
/// Empty or whitespace-only text is rejected; callers treat an empty
/// filter as "no filter" before parsing.
pub fn parse(text: &str) -> Result<Expr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    if parser.at(&TokenKind::Eof) {
        return Err(Error::syntax(0, "Expression is empty"));
    }
    let expr = parser.expr()?;
    if !parser.at(&TokenKind::Eof) {
        let t = parser.peek();
        return Err(Error::syntax(
            t.position,
            format!("Unexpected token {:?}", t.kind),
        ));
    }
    Ok(expr)
}

pub(crate) struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) pos: usize,
}

impl Parser {
    pub(crate) fn peek(&self) -> &Token {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        let i = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[i].kind
    }

    pub(crate) fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            let t = self.peek();
            Err(Error::syntax(
                t.position,
                format!("Expected {} but found {:?}", what, t.kind),
            ))
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr> {
        let mut left = self.and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut left = self.not()?;
        while self.eat(&TokenKind::And) {
            let right = self.not()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Not) {
            let inner = self.not()?;
            return Ok(Expr::unary(UnaryOp::Not, inner));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.additive()?;
        let op = match self.peek().kind {
            TokenKind::Eq => Some(BinaryOp::Eq),
            TokenKind::NotEq => Some(BinaryOp::NotEq),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::LtEq => Some(BinaryOp::LtEq),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::GtEq => Some(BinaryOp::GtEq),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.additive()?;
            return Ok(Expr::binary(op, left, right));
        }

        let negated = matches!(self.peek().kind, TokenKind::Not)
            && matches!(self.peek_kind_at(1), TokenKind::In | TokenKind::Like);
        if negated {
            self.advance();
        }
        if self.eat(&TokenKind::In) {
            return self.in_list(left, negated);
        }
        if self.eat(&TokenKind::Like) {
            let pattern = self.additive()?;
            return Ok(Expr::Like {
                expr: Box::new(left),
                pattern: Box::new(pattern),
                negated,
            });
        }
        if self.eat(&TokenKind::Is) {
            let negated = self.eat(&TokenKind::Not);
            self.expect(TokenKind::Null, "NULL")?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }
        Ok(left)
    }

    fn in_list(&mut self, left: Expr, negated: bool) -> Result<Expr> {
        self.expect(TokenKind::LParen, "'(' after IN")?;
        let mut list = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                list.push(self.additive()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        if list.is_empty() {
            let t = self.peek();
            return Err(Error::syntax(t.position, "IN list cannot be empty"));
        }
        self.expect(TokenKind::RParen, "')' closing IN list")?;
        Ok(Expr::In {
            expr: Box::new(left),
            list,
            negated,
        })
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Minus) {
            let inner = self.unary()?;
            // fold negative literals so "-5" stays a literal
            return Ok(match inner {
                Expr::Literal(Value::Int32(i)) => Expr::Literal(Value::Int32(-i)),
                Expr::Literal(Value::Int64(i)) => Expr::Literal(int_literal(-(i as i128))),
                Expr::Literal(Value::Float64(f)) => Expr::Literal(Value::Float64(-f)),
                other => Expr::unary(UnaryOp::Neg, other),
            });
        }
        if self.eat(&TokenKind::Plus) {
            let inner = self.unary()?;
            return Ok(Expr::unary(UnaryOp::Plus, inner));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Integer(i) => Ok(Expr::Literal(int_literal(i as i128))),
            TokenKind::Float(f) => Ok(Expr::Literal(Value::Float64(f))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::Date(ms) => Ok(Expr::Literal(Value::DateTime(ms))),
            TokenKind::True => Ok(Expr::Literal(Value::Boolean(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Boolean(false))),
            TokenKind::Null => Ok(Expr::Literal(Value::Null)),
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident { name, quoted: true } => Ok(Expr::Column(name)),
            TokenKind::Ident { name, quoted: false } => self.identifier(name, token.position),
            other => Err(Error::syntax(
                token.position,
                format!("Unexpected token {:?}", other),
            )),
        }
    }

    fn identifier(&mut self, name: String, position: usize) -> Result<Expr> {
        if name.eq_ignore_ascii_case("parent") && matches!(self.peek().kind, TokenKind::Dot | TokenKind::LParen) {
            let relation = self.relation_qualifier()?;
            let column = self.dotted_column()?;
            return Ok(Expr::Parent { relation, column });
        }
        if name.eq_ignore_ascii_case("child") {
            return Err(Error::syntax(
                position,
                "Child references are only valid inside an aggregate",
            ));
        }
        if !self.at(&TokenKind::LParen) {
            return Ok(Expr::Column(name));
        }
        if let Some(func) = AggregateFunc::from_name(&name) {
            self.advance();
            let (scope, column) = self.aggregate_argument()?;
            self.expect(TokenKind::RParen, "')' closing aggregate")?;
            return Ok(Expr::Aggregate {
                func,
                scope,
                column,
            });
        }
        let func = Function::from_name(&name)
            .ok_or_else(|| Error::syntax(position, format!("Undefined function '{}'", name)))?;
        self.advance();
        let mut args = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                args.push(self.expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' closing function call")?;
        Ok(Expr::Function { func, args })
    }

    /// Parses the optional `(relation)` after `Parent` or `Child`.
    fn relation_qualifier(&mut self) -> Result<Option<String>> {
        if !self.eat(&TokenKind::LParen) {
            return Ok(None);
        }
        let t = self.advance();
        let name = match t.kind {
            TokenKind::Ident { name, .. } => name,
            other => {
                return Err(Error::syntax(
                    t.position,
                    format!("Expected relation name but found {:?}", other),
                ))
            }
        };
        self.expect(TokenKind::RParen, "')' after relation name")?;
        Ok(Some(name))
    }

    fn dotted_column(&mut self) -> Result<String> {
        self.expect(TokenKind::Dot, "'.'")?;
        let t = self.advance();
        match t.kind {
            TokenKind::Ident { name, .. } => Ok(name),
            other => Err(Error::syntax(
                t.position,
                format!("Expected column name but found {:?}", other),
            )),
        }
    }

    fn aggregate_argument(&mut self) -> Result<(AggregateScope, String)> {
        let t = self.advance();
        match t.kind {
            TokenKind::Ident { name, quoted: false }
                if name.eq_ignore_ascii_case("child")
                    && matches!(self.peek().kind, TokenKind::Dot | TokenKind::LParen) =>
            {
                let relation = self.relation_qualifier()?;
                let column = self.dotted_column()?;
                Ok((AggregateScope::Child(relation), column))
            }
            TokenKind::Ident { name, .. } => Ok((AggregateScope::Local, name)),
            other => Err(Error::syntax(
                t.position,
                format!("Aggregate argument must be a column reference, found {:?}", other),
            )),
        }
    }
}

fn int_literal(i: i128) -> Value {
    match i32::try_from(i) {
        Ok(v) => Value::Int32(v),
        Err(_) => match i64::try_from(i) {
            Ok(v) => Value::Int64(v),
            Err(_) => Value::Float64(i as f64),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_precedence() {
        let e = parse("a + b * 2 > 10 AND NOT c OR d").unwrap();
        match e {
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                ..
            } => match *left {
                Expr::Binary {
                    op: BinaryOp::And,
                    left,
                    right,
                } => {
                    assert!(matches!(*left, Expr::Binary { op: BinaryOp::Gt, .. }));
                    assert!(matches!(*right, Expr::Unary { op: UnaryOp::Not, .. }));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_in_and_not_in() {
        let e = parse("x NOT IN (1, 2, 'a')").unwrap();
        match e {
            Expr::In { list, negated, .. } => {
                assert!(negated);
                assert_eq!(list.len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse("x IN ()").is_err());
    }

    #[test]
    fn test_like_and_is_null() {
        assert!(matches!(
            parse("name NOT LIKE 'A%'").unwrap(),
            Expr::Like { negated: true, .. }
        ));
        assert!(matches!(
            parse("name IS NOT NULL").unwrap(),
            Expr::IsNull { negated: true, .. }
        ));
        assert!(parse("name IS 5").is_err());
    }

    #[test]
    fn test_aggregates_and_parent() {
        assert_eq!(
            parse("Sum(Child(rel).amount)").unwrap(),
            Expr::Aggregate {
                func: AggregateFunc::Sum,
                scope: AggregateScope::Child(Some("rel".into())),
                column: "amount".into(),
            }
        );
        assert_eq!(
            parse("count(child.id)").unwrap(),
            Expr::Aggregate {
                func: AggregateFunc::Count,
                scope: AggregateScope::Child(None),
                column: "id".into(),
            }
        );
        assert_eq!(
            parse("Max(price)").unwrap(),
            Expr::Aggregate {
                func: AggregateFunc::Max,
                scope: AggregateScope::Local,
                column: "price".into(),
            }
        );
        assert_eq!(
            parse("Parent(r1).[Unit Price]").unwrap(),
            Expr::Parent {
                relation: Some("r1".into()),
                column: "Unit Price".into(),
            }
        );
    }

    #[test]
    fn test_reserved_names_as_columns() {
        assert_eq!(parse("[Parent]").unwrap(), Expr::column("Parent"));
        assert_eq!(parse("Parent").unwrap(), Expr::column("Parent"));
        assert_eq!(parse("[sum]").unwrap(), Expr::column("sum"));
    }

    #[test]
    fn test_functions() {
        match parse("IIF(a > 1, 'big', 'small')").unwrap() {
            Expr::Function { func, args } => {
                assert_eq!(func, Function::Iif);
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse("Frobnicate(a)"),
            Err(Error::Syntax { position: 0, .. })
        ));
    }

    #[test]
    fn test_negative_literal_folding() {
        assert_eq!(parse("-5").unwrap(), Expr::literal(-5i32));
        assert_eq!(parse("-2147483648").unwrap(), Expr::literal(i32::MIN));
        assert_eq!(parse("3000000000").unwrap(), Expr::literal(3_000_000_000i64));
        assert!(matches!(
            parse("-a").unwrap(),
            Expr::Unary { op: UnaryOp::Neg, .. }
        ));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("").is_err());
        assert!(parse("a +").is_err());
        assert!(parse("(a").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("Child.x").is_err());
        let errs = vec!["a = ", "AND b", "Sum(1)"];
        for text in errs {
            assert!(parse(text).is_err(), "{}", text);
        }
    }
}
