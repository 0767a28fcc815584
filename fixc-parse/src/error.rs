#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use fixc_ast::Span;
use miette::Diagnostic;
use thiserror::Error;

/// Syntax errors in a `.fx` program. Each variant labels the token it
/// stopped at.
#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum ParseError {
    #[error("parse error: expected {expected}, found {found}")]
    #[diagnostic(code(fixc::parse::unexpected))]
    Unexpected {
        expected: String,
        found: String,
        #[label("here")]
        span: Span,
    },

    #[error("parse error: program has no 'return' statement")]
    #[diagnostic(
        code(fixc::parse::missing_return),
        help("finish the program with `return <expr>;`")
    )]
    MissingReturn {
        #[label("program ends here")]
        span: Span,
    },

    #[error("parse error: 'return' must be the last statement")]
    #[diagnostic(
        code(fixc::parse::after_return),
        help("move this statement above the `return`")
    )]
    AfterReturn {
        #[label]
        span: Span,
    },

    #[error("parse error: unexpected trailing input after expression")]
    #[diagnostic(code(fixc::parse::trailing))]
    TrailingInput {
        #[label]
        span: Span,
    },

    #[error("parse error: tensor dimensions must be positive, found {value}")]
    #[diagnostic(code(fixc::parse::dimension))]
    BadDimension {
        value: u64,
        #[label]
        span: Span,
    },

    #[error("parse error: unknown function '{name}'")]
    #[diagnostic(
        code(fixc::parse::unknown_function),
        help("available functions: exp, tanh, sigmoid, relu, argmax, sgn, transpose")
    )]
    UnknownFunction {
        name: String,
        #[label]
        span: Span,
    },

    #[error("parse error: unexpected end of input")]
    #[diagnostic(code(fixc::parse::eof))]
    EndOfInput {
        #[label]
        span: Span,
    },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::Unexpected { span, .. }
            | ParseError::MissingReturn { span }
            | ParseError::AfterReturn { span }
            | ParseError::TrailingInput { span }
            | ParseError::BadDimension { span, .. }
            | ParseError::UnknownFunction { span, .. }
            | ParseError::EndOfInput { span } => *span,
        }
    }

    pub(crate) fn unexpected(expected: impl Into<String>, found: String, span: Span) -> Self {
        ParseError::Unexpected {
            expected: expected.into(),
            found,
            span,
        }
    }
}
