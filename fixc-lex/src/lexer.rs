#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use fixc_ast::{span_between, Span};
use logos::Logos;
use miette::Diagnostic;
use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Diagnostic)]
#[error("lex error: {message}")]
#[diagnostic(code(fixc::lex))]
#[allow(unused_assignments)]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\f\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"#[^\n]*")]
enum RawToken {
    #[token("input")]
    KwInput,
    #[token("param")]
    KwParam,
    #[token("let")]
    KwLet,
    #[token("return")]
    KwReturn,

    #[token("<*>")]
    ElemStar,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("=")]
    Eq,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(Option<f64>),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    Int(Option<u64>),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

pub struct Lexer<'a> {
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src }
    }

    pub fn lex(&self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        let mut lex = RawToken::lexer(self.src);

        while let Some(raw) = lex.next() {
            let range = lex.span();
            let span = span_between(range.start, range.end);

            let kind = match raw {
                Ok(RawToken::KwInput) => TokenKind::KwInput,
                Ok(RawToken::KwParam) => TokenKind::KwParam,
                Ok(RawToken::KwLet) => TokenKind::KwLet,
                Ok(RawToken::KwReturn) => TokenKind::KwReturn,

                Ok(RawToken::ElemStar) => TokenKind::ElemStar,
                Ok(RawToken::Plus) => TokenKind::Plus,
                Ok(RawToken::Minus) => TokenKind::Minus,
                Ok(RawToken::Star) => TokenKind::Star,
                Ok(RawToken::Eq) => TokenKind::Eq,
                Ok(RawToken::Semi) => TokenKind::Semi,
                Ok(RawToken::Comma) => TokenKind::Comma,

                Ok(RawToken::LParen) => TokenKind::LParen,
                Ok(RawToken::RParen) => TokenKind::RParen,
                Ok(RawToken::LBracket) => TokenKind::LBracket,
                Ok(RawToken::RBracket) => TokenKind::RBracket,

                Ok(RawToken::Ident(s)) => TokenKind::Ident(s),
                Ok(RawToken::Int(Some(n))) => TokenKind::Int(n),
                Ok(RawToken::Int(None)) => {
                    return Err(LexError {
                        message: format!("integer literal '{}' is out of range", lex.slice()),
                        span,
                    });
                }
                Ok(RawToken::Float(Some(v))) if v.is_finite() => TokenKind::Float(v),
                Ok(RawToken::Float(_)) => {
                    return Err(LexError {
                        message: format!("invalid number literal '{}'", lex.slice()),
                        span,
                    });
                }
                Err(()) => {
                    return Err(LexError {
                        message: format!("unexpected character(s) '{}'", lex.slice()),
                        span,
                    });
                }
            };

            tokens.push(Token { kind, span });
        }

        let end = self.src.len();
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: span_between(end, end),
        });
        Ok(tokens)
    }
}
