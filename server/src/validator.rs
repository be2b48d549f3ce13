//! Decoding and validation of client messages.
//!
//! Everything here is pure: a frame goes in, and either a normalized job or the reason it was
//! rejected comes out.

use crate::config::ServerConfig;
use crate::errors::RequestError;
use bytes::Bytes;
use joblib::JobSpec;
use protocol::KILL;
use rmpv::Value;
use std::sync::Arc;
use std::time::Duration;

/// A message accepted while a job is running.
#[derive(Debug, PartialEq, Eq)]
pub enum Control {
    Kill,
}

/// Deepest nesting a frame may have. A request needs three levels: map, array, string.
const MAX_DEPTH: usize = 8;

/// Decode exactly one msgpack value from `frame`.
pub fn decode(frame: &[u8]) -> Result<Value, RequestError> {
    let mut rest = frame;
    let value = rmpv::decode::read_value_with_max_depth(&mut rest, MAX_DEPTH)
        .map_err(|err| RequestError::Decode(err.to_string()))?;
    if !rest.is_empty() {
        return Err(RequestError::ExtraData);
    }
    Ok(value)
}

pub fn parse_control(value: &Value) -> Result<Control, RequestError> {
    match value.as_str() {
        Some(KILL) => Ok(Control::Kill),
        _ => Err(RequestError::ExpectedKill),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "boolean",
        Value::Integer(_) => "integer",
        Value::F32(_) | Value::F64(_) => "float",
        Value::String(s) if s.is_str() => "string",
        Value::String(_) => "non-UTF-8 string",
        Value::Binary(_) => "binary",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Ext(..) => "extension",
    }
}

#[derive(Default)]
struct Fields {
    language: Option<Value>,
    code: Option<Value>,
    input: Option<Value>,
    arguments: Option<Value>,
    options: Option<Value>,
    timeout: Option<Value>,
}

impl Fields {
    fn collect(value: Value) -> Result<Self, RequestError> {
        let entries = match value {
            Value::Map(entries) => entries,
            other => return Err(RequestError::NotAMap(kind(&other))),
        };
        let mut fields = Fields::default();
        for (key, value) in entries {
            let name = match key.as_str() {
                Some(name) => name,
                None => return Err(RequestError::FieldName(kind(&key))),
            };
            let slot = match name {
                "language" => &mut fields.language,
                "code" => &mut fields.code,
                "input" => &mut fields.input,
                "arguments" => &mut fields.arguments,
                "options" => &mut fields.options,
                "timeout" => &mut fields.timeout,
                other => return Err(RequestError::UnknownField(other.to_string())),
            };
            if slot.replace(value).is_some() {
                return Err(RequestError::DuplicateField(name.to_string()));
            }
        }
        Ok(fields)
    }
}

fn string(field: &'static str, value: Value) -> Result<String, RequestError> {
    match value {
        Value::String(s) if s.is_str() => Ok(s.into_str().unwrap_or_default()),
        other => Err(RequestError::InvalidType {
            field,
            expected: "string",
            found: kind(&other),
        }),
    }
}

fn input(value: Value) -> Result<Bytes, RequestError> {
    match value {
        // taken as raw bytes, whether or not they are valid UTF-8
        Value::String(s) => Ok(Bytes::from(s.into_bytes())),
        Value::Binary(bytes) => Ok(Bytes::from(bytes)),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match &item {
                Value::Integer(n) => n
                    .as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| RequestError::InvalidByte(n.to_string())),
                other => Err(RequestError::InvalidByte(kind(other).to_string())),
            })
            .collect::<Result<Vec<u8>, _>>()
            .map(Bytes::from),
        other => Err(RequestError::InvalidType {
            field: "input",
            expected: "string, binary or array of bytes",
            found: kind(&other),
        }),
    }
}

fn string_list(field: &'static str, value: Value) -> Result<Vec<String>, RequestError> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(RequestError::InvalidType {
                field,
                expected: "array of strings",
                found: kind(&other),
            })
        }
    };
    items
        .into_iter()
        .map(|item| {
            let arg = string(field, item)?;
            if arg.contains('\0') {
                return Err(RequestError::NullByte);
            }
            Ok(arg)
        })
        .collect()
}

fn timeout(value: Value, max: i64) -> Result<Duration, RequestError> {
    let n = match value {
        Value::Integer(n) => n,
        other => {
            return Err(RequestError::InvalidType {
                field: "timeout",
                expected: "integer",
                found: kind(&other),
            })
        }
    };
    match n.as_i64() {
        Some(secs) if (1..=max).contains(&secs) => Ok(Duration::from_secs(secs as u64)),
        _ => Err(RequestError::TimeoutOutOfRange {
            value: n.to_string(),
            max,
        }),
    }
}

/// Validate a decoded request and normalize it into a job.
pub fn parse_request(value: Value, config: &ServerConfig) -> Result<JobSpec, RequestError> {
    let fields = Fields::collect(value)?;

    let language = string(
        "language",
        fields
            .language
            .ok_or(RequestError::MissingField("language"))?,
    )?;
    let launcher = match config.language(&language) {
        Some(language) => Arc::clone(&language.launcher),
        None => return Err(RequestError::NoSuchLanguage(language)),
    };
    let code = string(
        "code",
        fields.code.ok_or(RequestError::MissingField("code"))?,
    )?;
    let input = fields.input.map(input).transpose()?.unwrap_or_default();
    let arguments = fields
        .arguments
        .map(|value| string_list("arguments", value))
        .transpose()?
        .unwrap_or_default();
    let options = fields
        .options
        .map(|value| string_list("options", value))
        .transpose()?
        .unwrap_or_default();
    let timeout = match fields.timeout {
        Some(value) => timeout(value, config.max_timeout)?,
        None => Duration::from_secs(config.max_timeout as u64),
    };

    Ok(JobSpec {
        launcher,
        code,
        input,
        arguments,
        options,
        timeout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(overrides: Vec<(&str, Value)>) -> Value {
        let mut entries = vec![
            ("language", Value::from("sh")),
            ("code", Value::from("sleep 1")),
            ("input", Value::from("")),
            ("arguments", Value::Array(vec![])),
            ("options", Value::Array(vec![])),
            ("timeout", Value::from(60)),
        ];
        for (key, value) in overrides {
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
        }
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::from(k), v))
                .collect(),
        )
    }

    fn without(field: &str) -> Value {
        match request(vec![]) {
            Value::Map(entries) => Value::Map(
                entries
                    .into_iter()
                    .filter(|(k, _)| k.as_str() != Some(field))
                    .collect(),
            ),
            _ => unreachable!(),
        }
    }

    fn validate(value: Value) -> Result<JobSpec, String> {
        parse_request(value, &ServerConfig::default()).map_err(|err| err.to_string())
    }

    fn encode(value: &Value) -> Vec<u8> {
        let mut buf = vec![];
        rmpv::encode::write_value(&mut buf, value).unwrap();
        buf
    }

    #[test]
    fn deep_nesting_is_rejected_without_recursing() {
        // 65536 one-element array headers
        let frame = vec![0x91; 65536];
        assert!(matches!(decode(&frame), Err(RequestError::Decode(_))));

        let mut nested = Value::from("x");
        for _ in 0..MAX_DEPTH - 2 {
            nested = Value::Array(vec![nested]);
        }
        assert!(decode(&encode(&nested)).is_ok());
    }

    #[test]
    fn accepts_a_full_request() {
        let job = validate(request(vec![
            ("input", Value::from("hello")),
            ("arguments", Value::Array(vec!["foo".into(), "bar".into()])),
            ("options", Value::Array(vec!["-e".into()])),
            ("timeout", Value::from(5)),
        ]))
        .unwrap();
        assert_eq!(job.code, "sleep 1");
        assert_eq!(job.input, Bytes::from_static(b"hello"));
        assert_eq!(job.arguments, ["foo", "bar"]);
        assert_eq!(job.options, ["-e"]);
        assert_eq!(job.timeout, Duration::from_secs(5));
        assert_eq!(job.launcher.program(), "sh");
    }

    #[test]
    fn optional_fields_default() {
        let mut value = without("timeout");
        if let Value::Map(entries) = &mut value {
            entries.retain(|(k, _)| {
                !matches!(k.as_str(), Some("input") | Some("arguments") | Some("options"))
            });
        }
        let job = validate(value).unwrap();
        assert_eq!(job.timeout, Duration::from_secs(60));
        assert!(job.input.is_empty());
        assert!(job.arguments.is_empty());
        assert!(job.options.is_empty());
    }

    #[test]
    fn input_shapes_normalize_to_bytes() {
        let as_bytes = |input: Value| validate(request(vec![("input", input)])).unwrap().input;
        assert_eq!(as_bytes(Value::from("bytes")), &b"bytes"[..]);
        assert_eq!(as_bytes(Value::Binary(b"bytes".to_vec())), &b"bytes"[..]);
        let list = Value::Array(b"bytes".iter().map(|&b| Value::from(b)).collect());
        assert_eq!(as_bytes(list), &b"bytes"[..]);
    }

    #[test]
    fn rejects_bad_input() {
        let err = validate(request(vec![("input", Value::Array(vec![Value::from(256)]))]));
        assert_eq!(err.unwrap_err(), "invalid byte in input: 256");
        let err = validate(request(vec![("input", Value::from(3))]));
        assert!(err.unwrap_err().starts_with("invalid type for input"));
    }

    #[test]
    fn timeout_range() {
        for (value, shown) in [(61, "61"), (0, "0"), (-4, "-4")] {
            let err = validate(request(vec![("timeout", Value::from(value))])).unwrap_err();
            assert_eq!(err, format!("timeout not in range 1-60: {}", shown));
        }
        let huge = validate(request(vec![("timeout", Value::from(u64::MAX))])).unwrap_err();
        assert_eq!(huge, format!("timeout not in range 1-60: {}", u64::MAX));
        assert!(validate(request(vec![("timeout", Value::from(1))])).is_ok());
        assert!(validate(request(vec![("timeout", Value::from(60))])).is_ok());
    }

    #[test]
    fn timeout_types() {
        for value in [
            Value::from("60"),
            Value::from(60.0),
            Value::Nil,
            Value::Array(vec![Value::from(60)]),
        ] {
            let err = validate(request(vec![("timeout", value)])).unwrap_err();
            assert!(err.starts_with("invalid type for timeout"), "{}", err);
        }
    }

    #[test]
    fn language_must_match_exactly() {
        let err = validate(request(vec![("language", Value::from("doesntexist"))]));
        assert_eq!(err.unwrap_err(), "no such language: doesntexist");
        let err = validate(request(vec![("language", Value::from("ZSH"))]));
        assert_eq!(err.unwrap_err(), "no such language: ZSH");
    }

    #[test]
    fn null_bytes_in_arguments_and_options() {
        for field in ["arguments", "options"] {
            let value = Value::Array(vec![Value::from("null\0byte")]);
            let err = validate(request(vec![(field, value)])).unwrap_err();
            assert_eq!(err, "argument contains null byte");
        }
    }

    #[test]
    fn shape_errors() {
        assert_eq!(
            validate(Value::from("Kill")).unwrap_err(),
            "expected a map, found string"
        );
        assert_eq!(
            validate(without("code")).unwrap_err(),
            "missing field: code"
        );
        assert_eq!(
            validate(request(vec![("extra", Value::from(1))])).unwrap_err(),
            "unknown field: extra"
        );
        let mut duplicated = request(vec![]);
        if let Value::Map(entries) = &mut duplicated {
            entries.push((Value::from("code"), Value::from("echo")));
        }
        assert_eq!(
            validate(duplicated).unwrap_err(),
            "duplicate field: code"
        );
    }

    #[test]
    fn decode_is_strict() {
        let frame = encode(&request(vec![]));
        assert!(decode(&frame).is_ok());

        let mut junk = frame.clone();
        junk.extend_from_slice(b"extra junk");
        assert_eq!(decode(&junk), Err(RequestError::ExtraData));

        assert!(matches!(decode(&frame[..20]), Err(RequestError::Decode(_))));
        assert!(matches!(decode(b""), Err(RequestError::Decode(_))));
    }

    #[test]
    fn control_messages() {
        assert_eq!(parse_control(&Value::from("Kill")), Ok(Control::Kill));
        assert_eq!(
            parse_control(&Value::from("kill")),
            Err(RequestError::ExpectedKill)
        );
        assert_eq!(
            parse_control(&request(vec![])),
            Err(RequestError::ExpectedKill)
        );
    }
}
