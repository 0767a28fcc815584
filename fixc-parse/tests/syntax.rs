use fixc_ast::{BinOp, Builtin, DeclKind, ExprKind};
use fixc_lex::Lexer;
use fixc_parse::{parse_expr, parse_source, ParseError, Parser};
use miette::Diagnostic;

const LINEAR: &str = r#"
input X[16][1];
param Z[4][16];
param W[2][4];
let xp = Z * X;   // projection
let s = W * xp;
return argmax(s);
"#;

#[test]
fn linear_classifier_parses() {
    let program = parse_source(LINEAR).expect("linear classifier should parse");
    assert_eq!(program.decls.len(), 3);
    assert_eq!(program.decls[0].kind, DeclKind::Input);
    assert_eq!(program.decls[0].shape, vec![16, 1]);
    assert_eq!(program.decls[2].name.node, "W");
    assert_eq!(program.bindings.len(), 2);
    assert!(matches!(
        &program.result.kind,
        ExprKind::Call { func, args } if func.node == Builtin::ArgMax && args.len() == 1
    ));
}

#[test]
fn elementwise_binds_like_matmul() {
    let expr = parse_expr("a + b <*> c * d").expect("expression should parse");
    let ExprKind::Binary { op, right, .. } = expr.kind else {
        panic!("expected binary");
    };
    assert_eq!(op, BinOp::Add);
    let ExprKind::Binary { op: inner, left, .. } = right.kind else {
        panic!("expected product on the right");
    };
    // Left associative: (b <*> c) * d.
    assert_eq!(inner, BinOp::Mul);
    assert!(matches!(left.kind, ExprKind::Binary { op: BinOp::MulElem, .. }));
}

#[test]
fn negative_literals_fold() {
    let expr = parse_expr("-0.25").expect("literal should parse");
    assert_eq!(expr.kind, ExprKind::Float(-0.25));
    let expr = parse_expr("-x").expect("negation should parse");
    assert!(matches!(expr.kind, ExprKind::Neg(_)));
}

#[test]
fn scalar_param_has_empty_shape() {
    let program = parse_source("input X[2]; param g; return g * X;").expect("should parse");
    assert!(program.decls[1].shape.is_empty());
}

#[test]
fn unknown_function_is_rejected() {
    let err = parse_source("input X[2]; return softmax(X);").expect_err("expected parse error");
    let msg = err.to_string();
    assert!(msg.contains("unknown function 'softmax'"), "unexpected error message: {msg}");
}

#[test]
fn missing_return_is_rejected() {
    let err = parse_source("input X[2];\nlet a = X;\n").expect_err("expected parse error");
    assert!(err.to_string().contains("no 'return'"));
}

#[test]
fn statements_after_return_are_rejected() {
    let err = parse_source("input X[2]; return X; let y = X;").expect_err("expected parse error");
    assert!(err.to_string().contains("last statement"));
}

#[test]
fn zero_dimension_is_rejected() {
    let err = parse_source("input X[0]; return X;").expect_err("expected parse error");
    assert!(err.to_string().contains("positive"));
}

#[test]
fn missing_semicolon_reports_found_token() {
    let err = parse_source("input X[2]\nreturn X;").expect_err("expected parse error");
    let msg = err.to_string();
    assert!(msg.contains("expected ';'"), "unexpected error message: {msg}");
    assert!(msg.contains("'return'"), "unexpected error message: {msg}");
}

fn parse_err(src: &str) -> ParseError {
    let tokens = Lexer::new(src).lex().expect("source should lex");
    Parser::new(&tokens)
        .parse_program()
        .expect_err("expected parse error")
}

#[test]
fn errors_carry_structured_variants() {
    match parse_err("input X[2]; return softmax(X);") {
        ParseError::UnknownFunction { name, span } => {
            assert_eq!(name, "softmax");
            assert_eq!(span.offset(), 19);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(matches!(
        parse_err("input X[0]; return X;"),
        ParseError::BadDimension { value: 0, .. }
    ));
    assert!(matches!(
        parse_err("input X[2]; return X; let y = X;"),
        ParseError::AfterReturn { .. }
    ));
    match parse_err("input X[2]\nreturn X;") {
        ParseError::Unexpected { expected, found, .. } => {
            assert_eq!(expected, "';'");
            assert_eq!(found, "'return'");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn unknown_function_diagnostic_lists_builtins() {
    let err = parse_err("input X[2]; return softmax(X);");
    let code = err.code().map(|c| c.to_string());
    assert_eq!(code.as_deref(), Some("fixc::parse::unknown_function"));
    let help = err.help().map(|h| h.to_string()).unwrap_or_default();
    assert!(help.contains("sigmoid"), "{help}");
}
