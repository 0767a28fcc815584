use fixc_core::Checker;
use fixc_ir::{TensorType, Type};

fn check(src: &str) -> Result<fixc_core::TypeEnv, fixc_core::ShapeError> {
    let program = fixc_parse::parse_source(src).expect("parse");
    Checker::new().check_program(&program)
}

fn check_err(src: &str) -> String {
    check(src).expect_err("expected shape error").message
}

#[test]
fn linear_classifier_types() {
    let env = check(
        "input X[16][1]; param Z[4][16]; param W[2][4];\n\
         let xp = Z * X; let s = W * xp; return argmax(s);",
    )
    .expect("sema");
    assert_eq!(env.get("xp"), Some(&Type::Tensor(TensorType::matrix(4, 1))));
    assert_eq!(env.get("s"), Some(&Type::Tensor(TensorType::matrix(2, 1))));
    assert_eq!(env.result(), Some(&Type::Int));
    let names: Vec<&str> = env.iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["X", "Z", "W", "xp", "s"]);
}

#[test]
fn matmul_inner_dimension_mismatch() {
    let msg = check_err("input X[3][1]; param Z[4][16]; return Z * X;");
    assert!(msg.contains("inner dimensions differ"), "{msg}");
}

#[test]
fn matmul_needs_matrices() {
    let msg = check_err("input X[3]; param Z[4][3]; return Z * X;");
    assert!(msg.contains("rank-2"), "{msg}");
}

#[test]
fn scalar_times_tensor_keeps_shape() {
    let env = check("input X[3][2]; param g; return g * X;").expect("sema");
    assert_eq!(env.result(), Some(&Type::Tensor(TensorType::matrix(3, 2))));
}

#[test]
fn all_ones_operand_broadcasts() {
    let env = check("input X[3][2]; param b[1][1]; return X + b;").expect("sema");
    assert_eq!(env.result(), Some(&Type::Tensor(TensorType::matrix(3, 2))));
}

#[test]
fn elementwise_shape_mismatch() {
    let msg = check_err("input X[3][2]; param b[2][3]; return X <*> b;");
    assert!(msg.contains("incompatible shapes [3][2] and [2][3]"), "{msg}");
}

#[test]
fn class_index_is_not_arithmetic() {
    let msg = check_err("input X[3]; let c = argmax(X); return c + X;");
    assert!(msg.contains("int"), "{msg}");
}

#[test]
fn sgn_needs_scalar() {
    let msg = check_err("input X[3][1]; return sgn(X);");
    assert!(msg.contains("expects a scalar"), "{msg}");
    check("input X[1][1]; return sgn(X);").expect("single element is fine");
}

#[test]
fn transpose_swaps_dimensions() {
    let env = check("input X[3][2]; return transpose(X);").expect("sema");
    assert_eq!(env.result(), Some(&Type::Tensor(TensorType::matrix(2, 3))));
}

#[test]
fn wrong_arity_is_rejected() {
    let msg = check_err("input X[3]; return exp(X, X);");
    assert!(msg.contains("takes 1 argument"), "{msg}");
}

#[test]
fn unknown_and_rebound_names() {
    let msg = check_err("input X[3]; return Y;");
    assert!(msg.contains("unknown identifier 'Y'"), "{msg}");
    let msg = check_err("input X[3]; let X = X; return X;");
    assert!(msg.contains("already defined"), "{msg}");
}

#[test]
fn compiler_names_are_reserved() {
    let msg = check_err("input X[3]; let tmp1 = X; return tmp1;");
    assert!(msg.contains("reserved"), "{msg}");
    let msg = check_err("input X[3]; let a_real = X; return a_real;");
    assert!(msg.contains("reserved"), "{msg}");
}

#[test]
fn exactly_one_input() {
    let msg = check_err("param Z[2]; return Z;");
    assert!(msg.contains("no 'input'"), "{msg}");
    let msg = check_err("input X[2]; input Y[2]; return X;");
    assert!(msg.contains("only one"), "{msg}");
}

#[test]
fn error_span_points_at_operator_expression() {
    let src = "input X[3][1]; param Z[4][16]; return Z * X;";
    let err = check(src).expect_err("expected shape error");
    let start: usize = err.span.offset();
    assert_eq!(&src[start..start + err.span.len()], "Z * X");
}
