#![forbid(unsafe_code)]

mod lexer;
mod token;

pub use lexer::{LexError, Lexer};
pub use token::{Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_declaration_with_shape() {
        assert_eq!(
            kinds("input X[16][1];"),
            vec![
                TokenKind::KwInput,
                TokenKind::Ident("X".to_string()),
                TokenKind::LBracket,
                TokenKind::Int(16),
                TokenKind::RBracket,
                TokenKind::LBracket,
                TokenKind::Int(1),
                TokenKind::RBracket,
                TokenKind::Semi,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_elementwise_product_is_one_token() {
        let k = kinds("a <*> b * c");
        assert_eq!(k[1], TokenKind::ElemStar);
        assert_eq!(k[3], TokenKind::Star);
    }

    #[test]
    fn lex_float_forms() {
        let floats: Vec<f64> = kinds("0.5 2. 1e-3 3.25E2")
            .into_iter()
            .filter_map(|k| match k {
                TokenKind::Float(v) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(floats, vec![0.5, 2.0, 1e-3, 325.0]);
    }

    #[test]
    fn lex_skips_both_comment_styles() {
        let k = kinds("let a = b; // trailing\n# whole line\nreturn a;");
        assert_eq!(
            k.iter().filter(|k| matches!(k, TokenKind::Semi)).count(),
            2
        );
        assert!(!k.iter().any(|k| matches!(k, TokenKind::Ident(s) if s == "trailing")));
    }

    #[test]
    fn lex_rejects_unknown_character() {
        let err = Lexer::new("let a = b / c;").lex().unwrap_err();
        assert!(err.message.contains("unexpected character"));
        let offset: usize = err.span.offset();
        assert_eq!(offset, 10);
    }

    #[test]
    fn lex_span_points_at_token() {
        let tokens = Lexer::new("let  weight = 1;").lex().unwrap();
        let ident = &tokens[1];
        assert_eq!(ident.kind, TokenKind::Ident("weight".to_string()));
        let offset: usize = ident.span.offset();
        assert_eq!((offset, ident.span.len()), (5, 6));
    }
}
