#![forbid(unsafe_code)]

use std::mem;

use fixc_ast::{
    span_between, BinOp, Binding, Builtin, DeclKind, Expr, ExprKind, Ident, Program, Span, Spanned,
    TopDecl,
};
use fixc_lex::{Token, TokenKind};

use crate::error::ParseError;

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, idx: 0 }
    }

    /// Parses `(input|param|let)* return <expr>;` followed by end of input.
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut decls = Vec::new();
        let mut bindings = Vec::new();

        loop {
            match self.peek_kind() {
                Some(TokenKind::KwInput) => decls.push(self.parse_decl(DeclKind::Input)?),
                Some(TokenKind::KwParam) => decls.push(self.parse_decl(DeclKind::Param)?),
                Some(TokenKind::KwLet) => bindings.push(self.parse_binding()?),
                Some(TokenKind::KwReturn) => break,
                Some(TokenKind::Eof) | None => {
                    return Err(ParseError::MissingReturn {
                        span: self.peek_span().unwrap_or_else(|| span_between(0, 0)),
                    });
                }
                Some(other) => {
                    return Err(ParseError::unexpected(
                        "'input', 'param', 'let' or 'return'",
                        other.describe(),
                        self.peek_span().unwrap_or_else(|| span_between(0, 0)),
                    ));
                }
            }
        }

        self.expect(TokenKind::KwReturn)?;
        let result = self.parse_expr()?;
        self.expect(TokenKind::Semi)?;
        self.expect_eof(|span| ParseError::AfterReturn { span })?;

        Ok(Program {
            decls,
            bindings,
            result,
        })
    }

    fn parse_decl(&mut self, kind: DeclKind) -> Result<TopDecl, ParseError> {
        let kw = self.expect_any()?;
        let name = self.expect_ident()?;
        let mut shape = Vec::new();
        while self.at(TokenKind::LBracket) {
            self.next();
            let tok = self.expect_any()?;
            match tok.kind {
                TokenKind::Int(n) if n > 0 => shape.push(n as usize),
                TokenKind::Int(value) => {
                    return Err(ParseError::BadDimension {
                        value,
                        span: tok.span,
                    });
                }
                other => {
                    return Err(ParseError::unexpected("dimension", other.describe(), tok.span));
                }
            }
            self.expect(TokenKind::RBracket)?;
        }
        let semi = self.expect(TokenKind::Semi)?;
        Ok(TopDecl {
            span: join(kw.span, semi.span),
            kind,
            name,
            shape,
        })
    }

    fn parse_binding(&mut self) -> Result<Binding, ParseError> {
        let kw = self.expect(TokenKind::KwLet)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Eq)?;
        let value = self.parse_expr()?;
        let semi = self.expect(TokenKind::Semi)?;
        Ok(Binding {
            span: join(kw.span, semi.span),
            name,
            value,
        })
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_add_expr()
    }

    pub fn parse_expr_eof(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr()?;
        self.expect_eof(|span| ParseError::TrailingInput { span })?;
        Ok(expr)
    }

    fn parse_add_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_mul_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.next();
            let right = self.parse_mul_expr()?;
            let span = join(left.span, right.span);
            left = Expr {
                span,
                kind: ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_mul_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::ElemStar) => BinOp::MulElem,
                _ => break,
            };
            self.next();
            let right = self.parse_unary_expr()?;
            let span = join(left.span, right.span);
            left = Expr {
                span,
                kind: ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, ParseError> {
        if self.at(TokenKind::Minus) {
            let minus = self.expect_any()?;
            let inner = self.parse_unary_expr()?;
            // Fold negative literals so `-0.5` stays a constant.
            if let ExprKind::Float(v) = inner.kind {
                return Ok(Expr {
                    span: join(minus.span, inner.span),
                    kind: ExprKind::Float(-v),
                });
            }
            return Ok(Expr {
                span: join(minus.span, inner.span),
                kind: ExprKind::Neg(Box::new(inner)),
            });
        }
        self.parse_primary_expr()
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        let tok = self.expect_any()?;
        match tok.kind {
            TokenKind::Float(v) => Ok(Expr {
                span: tok.span,
                kind: ExprKind::Float(v),
            }),
            TokenKind::Int(n) => Ok(Expr {
                span: tok.span,
                kind: ExprKind::Float(n as f64),
            }),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                let rp = self.expect(TokenKind::RParen)?;
                Ok(Expr {
                    span: join(tok.span, rp.span),
                    kind: inner.kind,
                })
            }
            TokenKind::Ident(name) => {
                if !self.at(TokenKind::LParen) {
                    return Ok(Expr {
                        span: tok.span,
                        kind: ExprKind::Ident(name),
                    });
                }
                let Some(func) = Builtin::from_name(&name) else {
                    return Err(ParseError::UnknownFunction {
                        name,
                        span: tok.span,
                    });
                };
                self.expect(TokenKind::LParen)?;
                let args = self.parse_args()?;
                let rp = self.expect(TokenKind::RParen)?;
                Ok(Expr {
                    span: join(tok.span, rp.span),
                    kind: ExprKind::Call {
                        func: Spanned::new(tok.span, func),
                        args,
                    },
                })
            }
            other => Err(ParseError::unexpected("expression", other.describe(), tok.span)),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.at(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.at(TokenKind::Comma) {
                self.next();
                continue;
            }
            break;
        }
        Ok(args)
    }

    fn expect_eof(&mut self, error: impl FnOnce(Span) -> ParseError) -> Result<(), ParseError> {
        if self.at(TokenKind::Eof) {
            Ok(())
        } else {
            Err(error(self.peek_span().unwrap_or_else(|| span_between(0, 0))))
        }
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let tok = self.expect_any()?;
        match tok.kind {
            TokenKind::Ident(name) => Ok(Ident {
                span: tok.span,
                node: name,
            }),
            other => Err(ParseError::unexpected("identifier", other.describe(), tok.span)),
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        let tok = self.expect_any()?;
        if mem::discriminant(&tok.kind) == mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(ParseError::unexpected(
                expected.describe(),
                tok.kind.describe(),
                tok.span,
            ))
        }
    }

    fn expect_any(&mut self) -> Result<Token, ParseError> {
        self.next().ok_or_else(|| ParseError::EndOfInput {
            span: span_between(0, 0),
        })
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind()
            .is_some_and(|k| mem::discriminant(k) == mem::discriminant(&kind))
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.idx)?.clone();
        self.idx += 1;
        Some(tok)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.idx).map(|t| &t.kind)
    }

    fn peek_span(&self) -> Option<Span> {
        self.tokens.get(self.idx).map(|t| t.span)
    }
}

fn join(a: Span, b: Span) -> Span {
    let a0: usize = a.offset();
    let b0: usize = b.offset();
    let b1 = b0 + b.len();
    if b0 >= a0 {
        span_between(a0, b1.max(a0 + a.len()))
    } else {
        let a1 = a0 + a.len();
        span_between(b0, a1)
    }
}
