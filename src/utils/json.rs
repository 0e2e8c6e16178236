use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Reads a flag sent as a boolean, `0`/`1`, or either of those as a string.
/// Absent and `null` mean `false`.
pub fn classify_flag(optional_value: Option<&Value>) -> Result<bool, String> {
    match optional_value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(Value::Number(number)) => match number.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(format!("expected 0 or 1, got {number}")),
        },
        Some(Value::String(s)) => match s.trim() {
            "" | "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(format!("expected boolean flag, got \"{other}\"")),
        },
        Some(other) => Err(format!("expected boolean flag, got {other}")),
    }
}

pub fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    classify_flag(value.as_ref()).map_err(serde::de::Error::custom)
}

/// Integer sent either as a JSON number or as a numeric string.
pub fn as_integer(optional_value: Option<&Value>) -> Option<i64> {
    match optional_value? {
        Value::Number(number) => number.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
