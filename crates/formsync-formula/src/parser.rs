//! Recursive-descent formula parser
//!
//! Precedence, loosest first: ternary, `||`, `&&`, equality, comparison,
//! additive, multiplicative, unary, primary. A body may be written as a
//! statement (`return a * b;`); the keyword and the semicolon are accepted
//! and ignored.

use thiserror::Error;

use crate::ast::{BinaryOp, Builtin, Expr, UnaryOp};
use crate::token::{tokenize, Span, Token, TokenKind};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at offset {}", .span.start)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

/// Parse formula source into an expression tree
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens, source.len()).parse_formula()
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    end: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, end: usize) -> Self {
        Parser {
            tokens,
            index: 0,
            end,
        }
    }

    fn parse_formula(mut self) -> Result<Expr, ParseError> {
        if matches!(self.peek_kind(), Some(TokenKind::Ident(kw)) if kw == "return") {
            self.index += 1;
        }
        if self.peek().is_none() {
            return Err(ParseError {
                message: "Empty formula".to_string(),
                span: Span::new(0, self.end),
            });
        }

        let expr = self.parse_expr()?;

        while self.consume(&TokenKind::Semicolon) {}
        if let Some(token) = self.peek() {
            return Err(ParseError {
                message: "Unexpected trailing tokens".to_string(),
                span: token.span,
            });
        }
        Ok(expr)
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let node = self.parse_or()?;
        if !self.consume(&TokenKind::Question) {
            return Ok(node);
        }
        let span = self.prev_span();
        let then_expr = self.parse_expr()?;
        if !self.consume(&TokenKind::Colon) {
            return Err(ParseError {
                message: "Missing ':' in conditional expression".to_string(),
                span: self.current_span(),
            });
        }
        let else_expr = self.parse_expr()?;
        Ok(Expr::Ternary {
            cond: Box::new(node),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
            span,
        })
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.parse_and()?;
        while self.consume(&TokenKind::OrOr) {
            let span = self.prev_span();
            let right = self.parse_and()?;
            node = binary(BinaryOp::Or, node, right, span);
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.parse_equality()?;
        while self.consume(&TokenKind::AndAnd) {
            let span = self.prev_span();
            let right = self.parse_equality()?;
            node = binary(BinaryOp::And, node, right, span);
        }
        Ok(node)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.parse_compare()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Eq) => BinaryOp::Eq,
                Some(TokenKind::Ne) => BinaryOp::Ne,
                Some(TokenKind::StrictEq) => BinaryOp::StrictEq,
                Some(TokenKind::StrictNe) => BinaryOp::StrictNe,
                _ => break,
            };
            self.index += 1;
            let span = self.prev_span();
            let right = self.parse_compare()?;
            node = binary(op, node, right, span);
        }
        Ok(node)
    }

    fn parse_compare(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.parse_sum()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Lt) => BinaryOp::Lt,
                Some(TokenKind::Le) => BinaryOp::Le,
                Some(TokenKind::Gt) => BinaryOp::Gt,
                Some(TokenKind::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.index += 1;
            let span = self.prev_span();
            let right = self.parse_sum()?;
            node = binary(op, node, right, span);
        }
        Ok(node)
    }

    fn parse_sum(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.parse_product()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.index += 1;
            let span = self.prev_span();
            let right = self.parse_product()?;
            node = binary(op, node, right, span);
        }
        Ok(node)
    }

    fn parse_product(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.index += 1;
            let span = self.prev_span();
            let right = self.parse_unary()?;
            node = binary(op, node, right, span);
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => UnaryOp::Neg,
            Some(TokenKind::Plus) => UnaryOp::Plus,
            Some(TokenKind::Bang) => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        self.index += 1;
        let span = self.prev_span();
        let expr = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
            span,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let Some(token) = self.tokens.get(self.index).cloned() else {
            return Err(ParseError {
                message: "Unexpected end of formula".to_string(),
                span: Span::new(self.end, self.end),
            });
        };
        self.index += 1;
        let span = token.span;

        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n, span)),
            TokenKind::Str(s) => Ok(Expr::Str(s, span)),
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                if !self.consume(&TokenKind::RParen) {
                    return Err(ParseError {
                        message: "Missing ')'".to_string(),
                        span: self.current_span(),
                    });
                }
                Ok(expr)
            }
            TokenKind::Ident(name) => self.parse_ident(name, span),
            other => Err(ParseError {
                message: format!("Unexpected token {:?}", other),
                span,
            }),
        }
    }

    fn parse_ident(&mut self, name: String, span: Span) -> Result<Expr, ParseError> {
        match name.as_str() {
            "true" => return Ok(Expr::Bool(true, span)),
            "false" => return Ok(Expr::Bool(false, span)),
            "null" | "undefined" => return Ok(Expr::Null(span)),
            _ => {}
        }

        let func_name = if name == "Math" {
            if !self.consume(&TokenKind::Dot) {
                return Err(ParseError {
                    message: "Expected '.' after Math".to_string(),
                    span: self.current_span(),
                });
            }
            match self.peek_kind() {
                Some(TokenKind::Ident(member)) => {
                    let member = member.clone();
                    self.index += 1;
                    Some(member)
                }
                _ => {
                    return Err(ParseError {
                        message: "Expected function name after 'Math.'".to_string(),
                        span: self.current_span(),
                    })
                }
            }
        } else if matches!(self.peek_kind(), Some(TokenKind::LParen)) {
            Some(name.clone())
        } else {
            None
        };

        let Some(func_name) = func_name else {
            if matches!(self.peek_kind(), Some(TokenKind::Dot)) {
                return Err(ParseError {
                    message: format!("Member access on '{}' is not allowed", name),
                    span: self.current_span(),
                });
            }
            return Ok(Expr::Field(name, span));
        };

        let func = Builtin::from_name(&func_name).ok_or_else(|| ParseError {
            message: format!("Unknown function '{}'", func_name),
            span,
        })?;
        let args = self.parse_args()?;
        Ok(Expr::Call { func, args, span })
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        if !self.consume(&TokenKind::LParen) {
            return Err(ParseError {
                message: "Expected '(' after function name".to_string(),
                span: self.current_span(),
            });
        }
        let mut args = Vec::new();
        if self.consume(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.consume(&TokenKind::Comma) {
                continue;
            }
            if self.consume(&TokenKind::RParen) {
                return Ok(args);
            }
            return Err(ParseError {
                message: "Expected ',' or ')' in argument list".to_string(),
                span: self.current_span(),
            });
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn prev_span(&self) -> Span {
        self.index
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn current_span(&self) -> Span {
        self.peek()
            .map(|t| t.span)
            .unwrap_or(Span::new(self.end, self.end))
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr, span: Span) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> String {
        name.to_string()
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse("a + b * 2").unwrap();
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_parse_statement_form() {
        let expr = parse("return amount * 0.01;").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Mul, .. }));
        assert_eq!(expr.field_refs().into_iter().collect::<Vec<_>>(), vec![field("amount")]);
    }

    #[test]
    fn test_parse_ternary_and_logic() {
        let expr = parse("kind === 'rcf' && fee > 0 ? fee : 0").unwrap();
        let Expr::Ternary { cond, .. } = expr else {
            panic!("expected ternary");
        };
        assert!(matches!(*cond, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn test_parse_calls() {
        let expr = parse("Math.round(amount * rate / 100, 2) + max(a, b, c)").unwrap();
        let refs: Vec<_> = expr.field_refs().into_iter().collect();
        assert_eq!(refs, vec![field("a"), field("amount"), field("b"), field("c"), field("rate")]);

        let Expr::Binary { left, right, .. } = expr else {
            panic!("expected binary");
        };
        assert!(matches!(*left, Expr::Call { func: Builtin::Round, ref args, .. } if args.len() == 2));
        assert!(matches!(*right, Expr::Call { func: Builtin::Max, ref args, .. } if args.len() == 3));
    }

    #[test]
    fn test_parse_literals() {
        assert!(matches!(parse("true").unwrap(), Expr::Bool(true, _)));
        assert!(matches!(parse("null").unwrap(), Expr::Null(_)));
        assert!(matches!(parse("-(1)").unwrap(), Expr::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("a +").is_err());
        assert!(parse("(a + b").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("cond ? 1").is_err());
        assert!(parse("system('rm')").is_err());
        assert!(parse("window.location").is_err());
        assert!(parse("Math.PI").is_err());
    }

    #[test]
    fn test_parse_error_span() {
        let err = parse("a + )").unwrap_err();
        assert_eq!(err.span, Span::new(4, 5));
    }
}
