#![forbid(unsafe_code)]

use fixc_ast::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwInput,
    KwParam,
    KwLet,
    KwReturn,

    // Operators / punctuation
    Plus,
    Minus,
    Star,
    ElemStar,
    Eq,
    Semi,
    Comma,

    LParen,
    RParen,
    LBracket,
    RBracket,

    Eof,

    // Literals / identifiers
    Ident(String),
    Int(u64),
    Float(f64),
}

impl TokenKind {
    /// Short human-readable name used in parse diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::KwInput => "'input'".to_string(),
            TokenKind::KwParam => "'param'".to_string(),
            TokenKind::KwLet => "'let'".to_string(),
            TokenKind::KwReturn => "'return'".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::ElemStar => "'<*>'".to_string(),
            TokenKind::Eq => "'='".to_string(),
            TokenKind::Semi => "';'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Ident(name) => format!("identifier '{name}'"),
            TokenKind::Int(n) => format!("integer {n}"),
            TokenKind::Float(v) => format!("number {v}"),
        }
    }
}
