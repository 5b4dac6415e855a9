use miette::NamedSource;
use miette::SourceSpan;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use toml::Value;

use crate::parser::StatusSpec;
use crate::validator::Assertion;
use crate::validator::ExpectedHeader;
use crate::validator::ExpectedStatus;
use crate::validator::PayloadKind;
use crate::validator::ValidationError;

/// Helper function to find the span of a key in the source contents.
fn find_key_span(src: Option<&(String, String)>, key: &str) -> Option<SourceSpan> {
    let (_, content) = src?;
    // This simple find assumes the key is unique and finds its first occurrence.
    let start = content.find(key)?;
    Some(SourceSpan::new(start.into(), key.len()))
}

/// Helper function to find the span of a value in the source contents.
fn find_value_span(src: Option<&(String, String)>, value: &str) -> Option<SourceSpan> {
    let (_, content) = src?;
    let start = content.find(&format!("\"{value}\""))?;
    Some(SourceSpan::new((start + 1).into(), value.len()))
}

macro_rules! validation_err {
    ($src:expr, $field:expr, $message:expr, $span_fn:expr) => {
        ValidationError {
            field: $field.to_string(),
            message: $message,
            src: $src.map(|(name, content)| NamedSource::new(name.clone(), content.clone())),
            span: $span_fn,
        }
    };
}

fn header_value_str<'a>(
    key: &str,
    value: &'a Value,
    src: Option<&(String, String)>,
) -> Result<&'a str, ValidationError> {
    value.as_str().ok_or_else(|| {
        validation_err!(
            src,
            key,
            format!("Header value must be a string, got {value:?}"),
            find_key_span(src, key)
        )
    })
}

fn header_name(key: &str, src: Option<&(String, String)>) -> Result<HeaderName, ValidationError> {
    HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
        validation_err!(
            src,
            key,
            format!("Invalid header name `{key}`: {e}"),
            find_key_span(src, key)
        )
    })
}

fn header_table<'a>(
    value: &'a Value,
    src: Option<&(String, String)>,
) -> Result<&'a toml::Table, ValidationError> {
    value.as_table().ok_or_else(|| {
        validation_err!(
            src,
            "headers",
            format!("Expected a table for headers, got {value:?}"),
            None
        )
    })
}

/// Parses a TOML table of request headers into a HeaderMap.
pub fn parse_header_map(
    value: &Value,
    src: Option<&(String, String)>,
) -> Result<HeaderMap, ValidationError> {
    let mut header_map = HeaderMap::new();

    for (k, v) in header_table(value, src)? {
        let v_str = header_value_str(k, v, src)?;
        let name = header_name(k, src)?;
        let h_value = HeaderValue::from_str(v_str).map_err(|e| {
            validation_err!(
                src,
                k,
                format!("Invalid header value for `{k}`: {e}"),
                find_value_span(src, v_str)
            )
        })?;

        header_map.insert(name, h_value);
    }

    Ok(header_map)
}

/// Parses the expected response headers. An empty string only requires the
/// header to be present.
pub fn parse_expected_headers(
    value: &Value,
    src: Option<&(String, String)>,
) -> Result<Vec<ExpectedHeader>, ValidationError> {
    header_table(value, src)?
        .iter()
        .map(|(k, v)| {
            let contains = header_value_str(k, v, src)?;
            let name = header_name(k, src)?;

            Ok(if contains.is_empty() {
                ExpectedHeader::present(name)
            } else {
                ExpectedHeader::containing(name, contains)
            })
        })
        .collect()
}

fn parse_status(
    spec: &StatusSpec,
    src: Option<&(String, String)>,
) -> Result<ExpectedStatus, ValidationError> {
    let check = |code: u16| {
        StatusCode::from_u16(code).map(|_| code).map_err(|e| {
            validation_err!(
                src,
                "expect_status",
                format!("Invalid status code {code}: {e}"),
                find_key_span(src, &code.to_string())
            )
        })
    };

    match spec {
        StatusSpec::One(code) => Ok(ExpectedStatus::One(check(*code)?)),
        StatusSpec::Many(codes) => Ok(ExpectedStatus::Set(
            codes.iter().map(|c| check(*c)).collect::<Result<_, _>>()?,
        )),
        StatusSpec::Range { from, to } => {
            if from > to {
                return Err(validation_err!(
                    src,
                    "expect_status",
                    format!("Status range is empty: {from} > {to}"),
                    find_key_span(src, "expect_status")
                ));
            }
            Ok(ExpectedStatus::Range(check(*from)?..=check(*to)?))
        }
    }
}

/// Parses all expectations of a test into assertions, checked in the order
/// status, headers, payload.
pub fn parse_assertions(
    expect_status: &Option<StatusSpec>,
    expect_headers: &Option<Value>,
    expect_payload: &Option<String>,
    src: Option<&(String, String)>,
) -> Result<Vec<Assertion>, ValidationError> {
    let mut assert_vec = vec![];

    if let Some(status) = expect_status {
        assert_vec.push(Assertion::Status(parse_status(status, src)?));
    }

    if let Some(value) = expect_headers {
        let headers = parse_expected_headers(value, src)?;
        if !headers.is_empty() {
            assert_vec.push(Assertion::Headers(headers));
        }
    }

    if let Some(kind) = expect_payload {
        let kind = kind.parse::<PayloadKind>().map_err(|message| {
            validation_err!(
                src,
                "expect_payload",
                message,
                find_value_span(src, kind)
            )
        })?;
        assert_vec.push(Assertion::Payload(kind));
    }

    Ok(assert_vec)
}
