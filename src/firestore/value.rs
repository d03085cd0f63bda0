//! Conversion between plain JSON and Firestore's typed value encoding.
//!
//! Firestore wraps every value in a single-key object naming its type
//! (`{"stringValue": "x"}`, `{"integerValue": "42"}`, ...). Integers travel
//! as decimal strings. Types with no plain-JSON counterpart (timestamps,
//! references, bytes) decode to their string form.

use serde_json::{Map, Number, Value, json};

use super::FirestoreError;

/// Encode a plain JSON value.
///
/// # Errors
///
/// Returns `Encode` for an unsigned integer above `i64::MAX`, which
/// `integerValue` cannot hold and `doubleValue` would round.
pub fn encode_value(value: &Value) -> Result<Value, FirestoreError> {
    Ok(match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => encode_number(n)?,
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values = items.iter().map(encode_value).collect::<Result<Vec<_>, _>>()?;
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map)? } }),
    })
}

/// Encode an object into a Firestore `fields` map.
///
/// # Errors
///
/// See [`encode_value`].
pub fn encode_fields(map: &Map<String, Value>) -> Result<Value, FirestoreError> {
    map.iter()
        .map(|(k, v)| encode_value(v).map(|encoded| (k.clone(), encoded)))
        .collect::<Result<Map<_, _>, _>>()
        .map(Value::Object)
}

fn encode_number(n: &Number) -> Result<Value, FirestoreError> {
    if let Some(i) = n.as_i64() {
        return Ok(json!({ "integerValue": i.to_string() }));
    }
    if n.is_u64() {
        return Err(FirestoreError::Encode(format!("integer {n} is out of range for integerValue")));
    }
    n.as_f64()
        .map(|f| json!({ "doubleValue": f }))
        .ok_or_else(|| FirestoreError::Encode(format!("unrepresentable number {n}")))
}

/// Decode a single typed value.
///
/// # Errors
///
/// Returns `Decode` for an unknown type tag or a malformed payload.
pub fn decode_value(value: &Value) -> Result<Value, FirestoreError> {
    let Some((tag, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Err(decode_error("expected a typed value object", value));
    };

    match tag.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner.as_bool().map(Value::Bool).ok_or_else(|| decode_error("bad booleanValue", inner)),
        "integerValue" => decode_integer(inner),
        "doubleValue" => decode_double(inner),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_owned()))
            .ok_or_else(|| decode_error(tag, inner)),
        "geoPointValue" => Ok(json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(json!(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(json!(0.0)),
        })),
        "arrayValue" => {
            let values = match inner.get("values") {
                None => return Ok(Value::Array(Vec::new())),
                Some(Value::Array(values)) => values,
                Some(other) => return Err(decode_error("bad arrayValue", other)),
            };
            values.iter().map(decode_value).collect::<Result<Vec<_>, _>>().map(Value::Array)
        }
        "mapValue" => match inner.get("fields") {
            None => Ok(Value::Object(Map::new())),
            Some(fields) => decode_fields(fields),
        },
        other => Err(decode_error(&format!("unknown value type `{other}`"), inner)),
    }
}

/// Decode a Firestore `fields` map into a plain object.
///
/// # Errors
///
/// Returns `Decode` if `fields` is not an object or any value is malformed.
pub fn decode_fields(fields: &Value) -> Result<Value, FirestoreError> {
    let Some(map) = fields.as_object() else {
        return Err(decode_error("expected a fields object", fields));
    };
    map.iter()
        .map(|(k, v)| decode_value(v).map(|decoded| (k.clone(), decoded)))
        .collect::<Result<Map<_, _>, _>>()
        .map(Value::Object)
}

fn decode_integer(inner: &Value) -> Result<Value, FirestoreError> {
    let parsed = match inner {
        Value::String(s) => s.parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    };
    parsed.map(Value::from).ok_or_else(|| decode_error("bad integerValue", inner))
}

fn decode_double(inner: &Value) -> Result<Value, FirestoreError> {
    let parsed = match inner {
        Value::Number(n) => n.as_f64(),
        // NaN and Infinity arrive as strings and have no JSON form.
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| decode_error("bad doubleValue", inner))
}

fn decode_error(what: &str, value: &Value) -> FirestoreError {
    FirestoreError::Decode(format!("{what}: {value}"))
}

#[cfg(test)]
#[path = "value_test.rs"]
mod tests;
