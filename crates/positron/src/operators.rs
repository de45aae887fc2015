//! Binary operator semantics, kept out of the dispatch loop.
//!
//! Arithmetic and ordering are defined for numbers only; anything else is
//! a type error rather than a silent fall-through. Equality never errors,
//! but it has the same number-only dispatch: a pairing that is not two
//! numbers is unequal, no matter what it is.

use crate::bytecode::Op;
use crate::error::RuntimeError;
use crate::value::{Heap, Value};

/// Apply an arithmetic or ordering operator to `a op b`.
pub fn binary(heap: &Heap, op: Op, a: Value, b: Value) -> Result<Value, RuntimeError> {
    let (x, y) = match (a, b) {
        (Value::Number(x), Value::Number(y)) => (x, y),
        (Value::Number(_), other) | (other, _) => {
            return Err(RuntimeError::Type {
                expected: "number",
                got: other.type_name(heap),
            });
        }
    };
    let result = match op {
        Op::Add => Value::Number(x + y),
        Op::Sub => Value::Number(x - y),
        Op::Mul => Value::Number(x * y),
        Op::Div => {
            if y == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Number(x / y)
        }
        Op::Lt => Value::Bool(x < y),
        Op::Gt => Value::Bool(x > y),
        Op::Lte => Value::Bool(x <= y),
        Op::Gte => Value::Bool(x >= y),
        _ => unreachable!("not a binary operator: {:?}", op),
    };
    Ok(result)
}

/// Equality: only numbers compare by value. Every other pairing is
/// unequal, identical heap references and same-variant values included.
pub fn equals(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        _ => false,
    }
}
