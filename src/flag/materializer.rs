use serde_json::Value;

use crate::syntax::{Expr, Literal, Provenance};

use super::{FlagSpec, FlagType, TypeCoercionError};

/// Build the object a flag accessor call evaluates to when the flag is
/// fixed to the value of `flag`:
///
/// ```python
/// {'key': ..., 'value': ..., 'defaultValue': ..., 'isDefaulted': True}
/// ```
///
/// `value` and `defaultValue` are equal but independent nodes.
pub fn materialize(flag: &FlagSpec) -> Result<Expr, TypeCoercionError> {
    let value = coerce(flag)?;
    Ok(Expr::Dict {
        entries: vec![
            (field("key"), Expr::synthetic(Literal::Str(flag.key.clone()))),
            (field("value"), value.clone()),
            (field("defaultValue"), value),
            (field("isDefaulted"), Expr::synthetic(Literal::Bool(true))),
        ],
        provenance: Provenance::Synthetic,
    })
}

fn field(name: &str) -> Expr {
    Expr::synthetic(Literal::Str(name.to_string()))
}

fn coerce(flag: &FlagSpec) -> Result<Expr, TypeCoercionError> {
    match flag.flag_type {
        FlagType::String => Ok(Expr::synthetic(Literal::Str(flag.value.clone()))),
        FlagType::Boolean => Ok(Expr::synthetic(Literal::Bool(
            !flag.value.eq_ignore_ascii_case("false"),
        ))),
        FlagType::Number => match parse_number(&flag.value) {
            Some(number) if number.is_finite() => Ok(Expr::synthetic(Literal::Float(number))),
            _ => Err(TypeCoercionError::InvalidNumber {
                key: flag.key.clone(),
                value: flag.value.clone(),
            }),
        },
        FlagType::Json => {
            let json: Value = serde_json::from_str(&flag.value).map_err(|source| {
                TypeCoercionError::InvalidJson {
                    key: flag.key.clone(),
                    source,
                }
            })?;
            Ok(from_json(json))
        }
    }
}

/// Parse a number the way Python's `float()` does, including `_` between
/// two digits.
fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    let bytes = text.as_bytes();
    let separators_ok = bytes.iter().enumerate().all(|(i, byte)| {
        *byte != b'_'
            || (i > 0
                && bytes[i - 1].is_ascii_digit()
                && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
    });
    if !separators_ok {
        return None;
    }
    text.replace('_', "").parse::<f64>().ok()
}

fn from_json(json: Value) -> Expr {
    match json {
        Value::Null => Expr::synthetic(Literal::None),
        Value::Bool(b) => Expr::synthetic(Literal::Bool(b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Expr::synthetic(Literal::Int(i)),
            None => Expr::synthetic(Literal::Float(n.as_f64().unwrap_or(f64::NAN))),
        },
        Value::String(s) => Expr::synthetic(Literal::Str(s)),
        Value::Array(items) => Expr::List(items.into_iter().map(from_json).collect()),
        Value::Object(map) => Expr::Dict {
            entries: map
                .into_iter()
                .map(|(k, v)| (Expr::synthetic(Literal::Str(k)), from_json(v)))
                .collect(),
            provenance: Provenance::Synthetic,
        },
    }
}
