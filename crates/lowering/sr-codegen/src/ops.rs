//! Operator tables and constant folding

use sr_ssa::{BinaryOp, Constant, FloatPredicate, IntPredicate};

/// Integer instruction and temporary tag for a binary operator
pub(crate) fn int_arithmetic(operator: &str) -> Option<(BinaryOp, &'static str)> {
    let entry = match operator {
        "+" => (BinaryOp::Add, "add"),
        "-" => (BinaryOp::Sub, "sub"),
        "*" => (BinaryOp::Mul, "mul"),
        "@" => (BinaryOp::Mul, "mat"),
        "/" => (BinaryOp::SDiv, "div"),
        "//" => (BinaryOp::SDiv, "flrdiv"),
        "%" => (BinaryOp::SRem, "mod"),
        "|" => (BinaryOp::Or, "bor"),
        "^" => (BinaryOp::Xor, "bxor"),
        "&" => (BinaryOp::And, "band"),
        "<<" => (BinaryOp::Shl, "shl"),
        ">>" => (BinaryOp::AShr, "ashr"),
        _ => return None,
    };
    Some(entry)
}

/// Float instruction and temporary tag for a binary operator
pub(crate) fn float_arithmetic(operator: &str) -> Option<(BinaryOp, &'static str)> {
    let entry = match operator {
        "+" => (BinaryOp::FAdd, "add"),
        "-" => (BinaryOp::FSub, "sub"),
        "*" => (BinaryOp::FMul, "mul"),
        "@" => (BinaryOp::FMul, "mat"),
        "/" => (BinaryOp::FDiv, "div"),
        "//" => (BinaryOp::FDiv, "flrdiv"),
        "%" => (BinaryOp::FRem, "mod"),
        _ => return None,
    };
    Some(entry)
}

/// Signed integer predicate for a comparison operator
pub(crate) fn int_predicate(operator: &str) -> Option<IntPredicate> {
    let predicate = match operator {
        "<" => IntPredicate::Slt,
        ">" => IntPredicate::Sgt,
        "<=" => IntPredicate::Sle,
        ">=" => IntPredicate::Sge,
        "==" => IntPredicate::Eq,
        "!=" => IntPredicate::Ne,
        _ => return None,
    };
    Some(predicate)
}

/// Ordered float predicate for a comparison operator
pub(crate) fn float_predicate(operator: &str) -> Option<FloatPredicate> {
    let predicate = match operator {
        "<" => FloatPredicate::Olt,
        ">" => FloatPredicate::Ogt,
        "<=" => FloatPredicate::Ole,
        ">=" => FloatPredicate::Oge,
        "==" => FloatPredicate::Oeq,
        "!=" => FloatPredicate::One,
        _ => return None,
    };
    Some(predicate)
}

/// Pointer comparisons only test identity
pub(crate) fn pointer_predicate(operator: &str) -> Option<IntPredicate> {
    match operator {
        "==" => Some(IntPredicate::Eq),
        "!=" => Some(IntPredicate::Ne),
        _ => None,
    }
}

/// Binary operator of an augmented assignment, `+=` → `+`
pub(crate) fn augmented_operator(operator: &str) -> &str {
    operator.strip_suffix('=').unwrap_or(operator)
}

/// Evaluates `lhs op rhs` at compile time.
///
/// Division, remainder and shifts are left to the instruction so their
/// runtime behaviour stays the only behaviour.
pub(crate) fn fold_binary(op: BinaryOp, lhs: &Constant, rhs: &Constant) -> Option<Constant> {
    match (lhs, rhs) {
        (
            Constant::Int { bits, value: left },
            Constant::Int {
                bits: right_bits,
                value: right,
            },
        ) if bits == right_bits => {
            let value = match op {
                BinaryOp::Add => left.wrapping_add(*right),
                BinaryOp::Sub => left.wrapping_sub(*right),
                BinaryOp::Mul => left.wrapping_mul(*right),
                BinaryOp::And => left & right,
                BinaryOp::Or => left | right,
                BinaryOp::Xor => left ^ right,
                _ => return None,
            };
            Some(Constant::int(*bits, value))
        }
        (Constant::Float(left), Constant::Float(right)) => {
            let (left, right) = (*left as f32, *right as f32);
            let value = match op {
                BinaryOp::FAdd => left + right,
                BinaryOp::FSub => left - right,
                BinaryOp::FMul => left * right,
                _ => return None,
            };
            Some(Constant::float(f64::from(value)))
        }
        _ => None,
    }
}

/// Typed constant for a numeric literal; decimals become `float`, integers
/// `i32`. `None` when the text is malformed or out of range.
pub(crate) fn parse_number(text: &str) -> Option<Constant> {
    let digits: String = text.chars().filter(|ch| *ch != '_').collect();
    if digits.contains(['.', 'e', 'E']) {
        let value: f64 = digits.parse().ok()?;
        return Some(Constant::float(value));
    }
    let value: i32 = digits.parse().ok()?;
    Some(Constant::int(32, i64::from(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_tables() {
        assert_eq!(int_arithmetic("//"), Some((BinaryOp::SDiv, "flrdiv")));
        assert_eq!(int_arithmetic("**"), None);
        assert_eq!(float_arithmetic("%"), Some((BinaryOp::FRem, "mod")));
        assert_eq!(float_arithmetic("&"), None);
        assert_eq!(int_predicate("<="), Some(IntPredicate::Sle));
        assert_eq!(float_predicate("!="), Some(FloatPredicate::One));
        assert_eq!(int_predicate("is"), None);
        assert_eq!(pointer_predicate("<"), None);
        assert_eq!(augmented_operator("//="), "//");
    }

    #[test]
    fn test_folding_wraps_to_width() {
        let max = Constant::int(32, i64::from(i32::MAX));
        let one = Constant::int(32, 1);
        assert_eq!(
            fold_binary(BinaryOp::Add, &max, &one),
            Some(Constant::int(32, i64::from(i32::MIN)))
        );
        assert_eq!(fold_binary(BinaryOp::SDiv, &max, &one), None);
        assert_eq!(
            fold_binary(BinaryOp::Add, &Constant::bool(true), &one),
            None
        );
    }

    #[test]
    fn test_float_folding() {
        let half = Constant::float(0.5);
        assert_eq!(
            fold_binary(BinaryOp::FMul, &half, &Constant::float(4.0)),
            Some(Constant::float(2.0))
        );
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(parse_number("1_000"), Some(Constant::int(32, 1000)));
        assert_eq!(parse_number("2.5"), Some(Constant::float(2.5)));
        assert_eq!(parse_number("1e3"), Some(Constant::float(1000.0)));
        assert_eq!(parse_number("99999999999"), None);
        assert_eq!(
            parse_number("-2147483648"),
            Some(Constant::int(32, i64::from(i32::MIN)))
        );
        assert_eq!(parse_number("2147483648"), None);
    }
}
