use crate::compiler::lower::BinaryOperator;
use crate::error::{EvalError, EvalResult};
use crate::parser::UnaryOperator;
use crate::value::Value;
use std::cmp::Ordering;
use std::rc::Rc;

/// Outcome of inspecting an operand before applying an operator.
pub(crate) enum Operand<'a> {
    Ready(&'a Value),
    Pending,
}

/// Errors propagate out of operators, pending operands make the whole operation pending.
pub(crate) fn check(value: &Value) -> EvalResult<Operand<'_>> {
    match value {
        Value::Error(error) => Err((**error).clone()),
        Value::Pending => Ok(Operand::Pending),
        value => Ok(Operand::Ready(value)),
    }
}

pub(crate) fn binary(operator: BinaryOperator, operand_a: &Value, operand_b: &Value) -> EvalResult<Value> {
    let (Operand::Ready(a), Operand::Ready(b)) = (check(operand_a)?, check(operand_b)?) else {
        return Ok(Value::Pending);
    };
    match operator {
        BinaryOperator::Equal => Ok(Value::Bool(a.equals(b))),
        BinaryOperator::NotEqual => Ok(Value::Bool(!a.equals(b))),
        BinaryOperator::Add => match (a, b) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::Text(_), _) | (_, Value::Text(_)) => Ok(Value::text(format!("{a}{b}"))),
            _ => Err(mismatch(operator, a, b)),
        },
        BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Remainder => {
            let (Value::Number(x), Value::Number(y)) = (a, b) else {
                return Err(mismatch(operator, a, b));
            };
            Ok(Value::Number(match operator {
                BinaryOperator::Subtract => x - y,
                BinaryOperator::Multiply => x * y,
                BinaryOperator::Divide => x / y,
                _ => x % y,
            }))
        }
        BinaryOperator::Greater
        | BinaryOperator::GreaterOrEqual
        | BinaryOperator::Less
        | BinaryOperator::LessOrEqual => {
            let ordering = match (a, b) {
                (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
                (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
                _ => return Err(mismatch(operator, a, b)),
            };
            // NaN compares false with everything
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match operator {
                BinaryOperator::Greater => ordering == Ordering::Greater,
                BinaryOperator::GreaterOrEqual => ordering != Ordering::Less,
                BinaryOperator::Less => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }))
        }
    }
}

fn mismatch(operator: BinaryOperator, a: &Value, b: &Value) -> EvalError {
    EvalError::type_error(format!(
        "cannot apply '{}' to {} and {}",
        operator.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

pub(crate) fn unary(operator: UnaryOperator, operand: &Value) -> EvalResult<Value> {
    let Operand::Ready(value) = check(operand)? else {
        return Ok(Value::Pending);
    };
    match (operator, value) {
        (UnaryOperator::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOperator::Negate, Value::Number(number)) => Ok(Value::Number(-number)),
        (UnaryOperator::Negate, value) => Err(EvalError::type_error(format!(
            "cannot negate {}",
            value.type_name()
        ))),
    }
}

pub(crate) fn member(object: &Value, property: &str) -> EvalResult<Value> {
    let Operand::Ready(object) = check(object)? else {
        return Ok(Value::Pending);
    };
    match object {
        Value::Record(fields) => Ok(fields.get(property).cloned().unwrap_or_default()),
        Value::List(items) if property == "length" => Ok(Value::Number(items.len() as f64)),
        Value::Text(text) if property == "length" => {
            Ok(Value::Number(text.chars().count() as f64))
        }
        Value::Undefined | Value::Null => Err(EvalError::type_error(format!(
            "cannot read property '{property}' of {}",
            object.type_name()
        ))),
        _ => Ok(Value::Undefined),
    }
}

pub(crate) fn index(object: &Value, index: &Value) -> EvalResult<Value> {
    let (Operand::Ready(object), Operand::Ready(index)) = (check(object)?, check(index)?) else {
        return Ok(Value::Pending);
    };
    match (object, index) {
        (Value::List(items), Value::Number(position)) => {
            Ok(list_position(items, *position).cloned().unwrap_or_default())
        }
        (Value::Text(text), Value::Number(position)) => Ok(position_index(*position)
            .and_then(|position| text.chars().nth(position))
            .map(|character| Value::text(character.to_string()))
            .unwrap_or_default()),
        (Value::Record(fields), Value::Text(key)) => {
            Ok(fields.get(&**key).cloned().unwrap_or_default())
        }
        (object, Value::Text(key)) => member(object, key),
        (Value::Undefined | Value::Null, _) => Err(EvalError::type_error(format!(
            "cannot index {}",
            object.type_name()
        ))),
        _ => Ok(Value::Undefined),
    }
}

fn position_index(position: f64) -> Option<usize> {
    (position >= 0.0 && position.fract() == 0.0).then_some(position as usize)
}

fn list_position(items: &Rc<Vec<Value>>, position: f64) -> Option<&Value> {
    items.get(position_index(position)?)
}
