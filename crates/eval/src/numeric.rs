//! Arithmetic on runtime values using `rust_decimal`.
//!
//! Integer operations are checked and fail on overflow instead of
//! wrapping. Mixed integer/decimal operations promote to Decimal.
//! Division always yields a Decimal. Rounding uses
//! `RoundingStrategy::MidpointNearestEven`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use sift_core::ast::BinaryOp;

use crate::error::{Fault, FaultResult};
use crate::value::Value;

fn overflow(what: &str) -> Fault {
    Fault::Arithmetic(format!("{} overflow", what))
}

fn operand_error(op: BinaryOp, left: &Value, right: &Value) -> Fault {
    Fault::Type(format!(
        "unsupported operand types for {}: {} and {}",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

/// Evaluate `+ - * / %`.
pub fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> FaultResult<Value> {
    match (op, left, right) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{}{}", a, b))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            return Ok(Value::list(items));
        }
        _ => {}
    }

    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        return match op {
            BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(|| overflow("integer addition")),
            BinaryOp::Sub => a
                .checked_sub(b)
                .map(Value::Int)
                .ok_or_else(|| overflow("integer subtraction")),
            BinaryOp::Mul => a
                .checked_mul(b)
                .map(Value::Int)
                .ok_or_else(|| overflow("integer multiplication")),
            BinaryOp::Div => divide(Decimal::from(a), Decimal::from(b)),
            BinaryOp::Rem => {
                if b == 0 {
                    return Err(Fault::Arithmetic("modulo by zero".to_string()));
                }
                a.checked_rem_euclid(b)
                    .map(Value::Int)
                    .ok_or_else(|| overflow("integer modulo"))
            }
            _ => Err(operand_error(op, left, right)),
        };
    }

    let (Some(a), Some(b)) = (left.as_decimal(), right.as_decimal()) else {
        return Err(operand_error(op, left, right));
    };
    match op {
        BinaryOp::Add => a.checked_add(b).map(Value::Decimal).ok_or_else(|| overflow("decimal addition")),
        BinaryOp::Sub => a
            .checked_sub(b)
            .map(Value::Decimal)
            .ok_or_else(|| overflow("decimal subtraction")),
        BinaryOp::Mul => a
            .checked_mul(b)
            .map(Value::Decimal)
            .ok_or_else(|| overflow("decimal multiplication")),
        BinaryOp::Div => divide(a, b),
        BinaryOp::Rem => {
            if b.is_zero() {
                return Err(Fault::Arithmetic("modulo by zero".to_string()));
            }
            a.checked_rem(b).map(Value::Decimal).ok_or_else(|| overflow("decimal modulo"))
        }
        _ => Err(operand_error(op, left, right)),
    }
}

fn divide(a: Decimal, b: Decimal) -> FaultResult<Value> {
    if b.is_zero() {
        return Err(Fault::Arithmetic("division by zero".to_string()));
    }
    a.checked_div(b)
        .map(|d| Value::Decimal(d.normalize()))
        .ok_or_else(|| overflow("division"))
}

pub fn negate(value: &Value) -> FaultResult<Value> {
    match value {
        Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(|| overflow("integer negation")),
        Value::Decimal(d) => Ok(Value::Decimal(-*d)),
        other => Err(Fault::Type(format!("cannot negate {}", other.type_name()))),
    }
}

pub fn abs(value: &Value) -> FaultResult<Value> {
    match value {
        Value::Int(n) => n.checked_abs().map(Value::Int).ok_or_else(|| overflow("integer abs")),
        Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
        other => Err(Fault::Type(format!("abs() needs a number, got {}", other.type_name()))),
    }
}

/// `round(x)` yields an integer; `round(x, places)` a decimal.
pub fn round(value: &Value, places: Option<i64>) -> FaultResult<Value> {
    let Some(d) = value.as_decimal() else {
        return Err(Fault::Type(format!("round() needs a number, got {}", value.type_name())));
    };
    match places {
        None => {
            let rounded = d.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
            rounded
                .to_i64()
                .map(Value::Int)
                .ok_or_else(|| overflow("round"))
        }
        Some(p) => {
            let p = u32::try_from(p)
                .map_err(|_| Fault::Type("round() places must not be negative".to_string()))?;
            Ok(Value::Decimal(
                d.round_dp_with_strategy(p, RoundingStrategy::MidpointNearestEven),
            ))
        }
    }
}

/// Sum of the non-null values; every other value must be numeric. Stays an
/// integer while all inputs are integers.
pub fn sum<'a>(values: impl IntoIterator<Item = &'a Value>) -> FaultResult<Value> {
    let mut total = Value::Int(0);
    for v in values {
        if v.is_null() {
            continue;
        }
        if v.as_decimal().is_none() {
            return Err(Fault::Type(format!("cannot sum a {}", v.type_name())));
        }
        total = arithmetic(BinaryOp::Add, &total, v)?;
    }
    Ok(total)
}

/// Mean of the non-null values, or null when there are none.
pub fn mean<'a>(values: impl IntoIterator<Item = &'a Value>) -> FaultResult<Value> {
    let mut total = Decimal::ZERO;
    let mut count = 0i64;
    for v in values {
        if v.is_null() {
            continue;
        }
        let d = v
            .as_decimal()
            .ok_or_else(|| Fault::Type(format!("cannot average a {}", v.type_name())))?;
        total = total.checked_add(d).ok_or_else(|| overflow("mean"))?;
        count += 1;
    }
    if count == 0 {
        return Ok(Value::Null);
    }
    divide(total, Decimal::from(count))
}

/// Smallest (or largest) non-null value. Null when there are none.
pub fn extreme<'a>(values: impl IntoIterator<Item = &'a Value>, largest: bool) -> FaultResult<Value> {
    let mut best: Option<&Value> = None;
    for v in values {
        if v.is_null() {
            continue;
        }
        best = match best {
            None => Some(v),
            Some(b) => {
                let ord = v.compare(b)?;
                if (largest && ord.is_gt()) || (!largest && ord.is_lt()) {
                    Some(v)
                } else {
                    Some(b)
                }
            }
        };
    }
    Ok(best.cloned().unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Value {
        Value::Decimal(Decimal::from_str(s).expect("decimal"))
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let err = arithmetic(BinaryOp::Mul, &Value::Int(i64::MAX), &Value::Int(2)).unwrap_err();
        assert!(matches!(err, Fault::Arithmetic(_)));
        assert!(negate(&Value::Int(i64::MIN)).is_err());
    }

    #[test]
    fn division_is_exact_decimal() {
        let v = arithmetic(BinaryOp::Div, &Value::Int(7), &Value::Int(2)).expect("div");
        assert!(v.equals(&dec("3.5")));
        let v = arithmetic(BinaryOp::Div, &Value::Int(6), &Value::Int(3)).expect("div");
        assert_eq!(v.to_string(), "2");
        assert!(arithmetic(BinaryOp::Div, &Value::Int(1), &Value::Int(0)).is_err());
    }

    #[test]
    fn mixed_operands_promote() {
        let v = arithmetic(BinaryOp::Add, &Value::Int(1), &dec("0.10")).expect("add");
        assert_eq!(v.to_string(), "1.1");
        let v = arithmetic(BinaryOp::Add, &dec("0.1"), &dec("0.2")).expect("add");
        assert!(v.equals(&dec("0.3")));
    }

    #[test]
    fn strings_and_lists_concatenate() {
        let v = arithmetic(BinaryOp::Add, &Value::str("a"), &Value::str("b")).expect("add");
        assert_eq!(v.to_string(), "ab");
        assert!(arithmetic(BinaryOp::Add, &Value::str("a"), &Value::Int(1)).is_err());
    }

    #[test]
    fn rounding_is_bankers() {
        assert!(round(&dec("2.5"), None).expect("round").equals(&Value::Int(2)));
        assert!(round(&dec("3.5"), None).expect("round").equals(&Value::Int(4)));
        assert_eq!(round(&dec("1.005"), Some(2)).expect("round").to_string(), "1");
    }

    #[test]
    fn aggregates_skip_nulls() {
        let values = [Value::Int(1), Value::Null, dec("2.5")];
        assert_eq!(sum(&values).expect("sum").to_string(), "3.5");
        assert_eq!(mean(&values).expect("mean").to_string(), "1.75");
        assert_eq!(extreme(&values, true).expect("max").to_string(), "2.5");
        assert!(mean(&[Value::Null]).expect("mean").is_null());
        assert!(sum(&[Value::str("x")]).is_err());
    }
}
