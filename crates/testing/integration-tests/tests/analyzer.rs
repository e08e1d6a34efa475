//! Analyzer behaviour on whole programs

use sr_sema::{SemanticErrorKind, analyze};

fn errors(source: &str) -> Vec<SemanticErrorKind> {
    let tree = sr_parser::parse_source(source).unwrap();
    analyze(&tree, source)
        .errors
        .into_iter()
        .map(|error| error.kind)
        .collect()
}

#[test]
fn test_clean_program_has_no_errors() {
    let source = "\
class Point:
    x: int
    y: int

fn norm(p: int, q: int) -> int:
    total = p * p + q * q
    return total

n = norm(3, 4)
while n > 0:
    n -= 1
";
    assert_eq!(errors(source), Vec::new());
}

#[test]
fn test_every_error_is_collected() {
    let source = "a = b\nc = d + e\nfn f(x, x):\n    pass\n";
    let kinds = errors(source);
    assert_eq!(kinds.len(), 4);
    let undefined: Vec<&str> = kinds
        .iter()
        .filter_map(|kind| match kind {
            SemanticErrorKind::UndefinedIdentifier { name, .. } => Some(name.as_str()),
            SemanticErrorKind::DuplicateSymbol { .. } => None,
        })
        .collect();
    assert_eq!(undefined, vec!["b", "d", "e"]);
}

#[test]
fn test_locals_do_not_leak_out_of_functions() {
    let source = "fn f() -> int:\n    inner = 1\n    return inner\ny = inner\n";
    assert!(matches!(
        errors(source).as_slice(),
        [SemanticErrorKind::UndefinedIdentifier { name, .. }] if name == "inner"
    ));
}

#[test]
fn test_builtins_resolve() {
    assert_eq!(errors("t = True\nf = False\nn = None\n"), Vec::new());
}
