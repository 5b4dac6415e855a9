use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use thiserror::Error;

use crate::runner::CapturedResponse;
use crate::validator::Assertion;
use crate::validator::ExpectedHeader;
use crate::validator::ExpectedStatus;
use crate::validator::PayloadKind;

/// Why a response did not meet the expectations of its test.
#[derive(Debug, Error)]
pub enum Mismatch {
    #[error("Got status {got}. Expected {expected}")]
    Status {
        expected: ExpectedStatus,
        got: StatusCode,
    },

    #[error("Header {0} not present")]
    MissingHeader(HeaderName),

    #[error("Header {name} does not contain {expected} but {got}")]
    HeaderValue {
        name: HeaderName,
        expected: String,
        got: String,
    },

    #[error("Expected empty payload, but got {0} bytes")]
    UnexpectedPayload(usize),

    #[error("Expected some {0} response payload, but got empty")]
    EmptyPayload(PayloadKind),

    #[error("Expected json response payload, but got error: {0}")]
    Json(String),

    #[error("Expected yaml response payload, but got error: {0}")]
    Yaml(String),
}

pub trait Assert {
    fn assert(&self, response: &CapturedResponse) -> Result<(), Mismatch>;
}

impl Assert for Assertion {
    fn assert(&self, response: &CapturedResponse) -> Result<(), Mismatch> {
        match self {
            Assertion::Status(expected) => assert_status(expected, response.status),
            Assertion::Headers(expected) => assert_headers(expected, &response.headers),
            Assertion::Payload(kind) => assert_payload(*kind, &response.body),
        }
    }
}

/// Checks every assertion in order and stops at the first mismatch.
pub fn assert_all(assertions: &[Assertion], response: &CapturedResponse) -> Result<(), Mismatch> {
    assertions.iter().try_for_each(|a| a.assert(response))
}

fn assert_status(expected: &ExpectedStatus, status: StatusCode) -> Result<(), Mismatch> {
    if expected.accepts(status) {
        return Ok(());
    }

    Err(Mismatch::Status {
        expected: expected.clone(),
        got: status,
    })
}

fn assert_headers(expected: &[ExpectedHeader], actual: &HeaderMap) -> Result<(), Mismatch> {
    for header in expected {
        if !actual.contains_key(&header.name) {
            return Err(Mismatch::MissingHeader(header.name.clone()));
        }

        let Some(contains) = &header.contains else {
            continue;
        };

        let got = actual
            .get_all(&header.name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");

        if !got.to_lowercase().contains(&contains.to_lowercase()) {
            return Err(Mismatch::HeaderValue {
                name: header.name.clone(),
                expected: contains.clone(),
                got,
            });
        }
    }

    Ok(())
}

fn assert_payload(kind: PayloadKind, body: &[u8]) -> Result<(), Mismatch> {
    match kind {
        PayloadKind::Empty if !body.is_empty() => Err(Mismatch::UnexpectedPayload(body.len())),
        PayloadKind::Empty => Ok(()),
        PayloadKind::Json => serde_json::from_slice::<serde_json::Value>(body)
            .map(|_| ())
            .map_err(|e| Mismatch::Json(e.to_string())),
        PayloadKind::Yaml => serde_yaml::from_slice::<serde_yaml::Value>(body)
            .map(|_| ())
            .map_err(|e| Mismatch::Yaml(e.to_string())),
        PayloadKind::Text | PayloadKind::Binary if body.is_empty() => {
            Err(Mismatch::EmptyPayload(kind))
        }
        PayloadKind::Text | PayloadKind::Binary => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use reqwest::StatusCode;
    use reqwest::header::CONTENT_TYPE;
    use reqwest::header::HeaderMap;
    use reqwest::header::LOCATION;

    use crate::asserter::Mismatch;
    use crate::asserter::assert_all;
    use crate::runner::CapturedResponse;
    use crate::validator::Assertion;
    use crate::validator::ExpectedHeader;
    use crate::validator::ExpectedStatus;
    use crate::validator::PayloadKind;

    fn response(status: StatusCode, headers: &[(&str, &str)], body: &str) -> CapturedResponse {
        let mut header_map = HeaderMap::new();
        for (k, v) in headers {
            header_map.append(
                reqwest::header::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                v.parse().unwrap(),
            );
        }

        CapturedResponse {
            status,
            headers: header_map,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn assert_status_test() {
        let created = response(StatusCode::CREATED, &[], "");

        assert!(assert_all(&[Assertion::Status(ExpectedStatus::One(201))], &created).is_ok());
        assert!(matches!(
            assert_all(&[Assertion::Status(ExpectedStatus::One(200))], &created),
            Err(Mismatch::Status { got: StatusCode::CREATED, .. })
        ));
        assert!(
            assert_all(
                &[Assertion::Status(ExpectedStatus::Set(vec![201, 204]))],
                &created
            )
            .is_ok()
        );
        assert!(
            assert_all(&[Assertion::Status(ExpectedStatus::Range(400..=499))], &created)
                .is_err()
        );
    }

    #[test]
    fn assert_headers() {
        let resp = response(
            StatusCode::CREATED,
            &[
                ("location", "/admin/v1/vim_accounts/abc123"),
                ("content-type", "Application/JSON; charset=utf-8"),
            ],
            "{}",
        );

        let expected = Assertion::Headers(vec![
            ExpectedHeader::containing(LOCATION, "/admin/v1/vim_accounts/"),
            ExpectedHeader::containing(CONTENT_TYPE, "application/json"),
        ]);
        assert!(assert_all(&[expected], &resp).is_ok());

        let wrong_type = Assertion::Headers(vec![ExpectedHeader::containing(
            CONTENT_TYPE,
            "application/yaml",
        )]);
        let err = assert_all(&[wrong_type], &resp).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Header content-type does not contain application/yaml but Application/JSON; charset=utf-8"
        );

        let missing = Assertion::Headers(vec![ExpectedHeader::present("x-missing".parse().unwrap())]);
        assert!(matches!(
            assert_all(&[missing], &resp),
            Err(Mismatch::MissingHeader(_))
        ));
    }

    #[test]
    fn assert_json() {
        let not_json = response(StatusCode::OK, &[], "not json");
        let empty_object = response(StatusCode::OK, &[], "{}");
        let json = [Assertion::Payload(PayloadKind::Json)];

        assert!(matches!(assert_all(&json, &not_json), Err(Mismatch::Json(_))));
        assert!(assert_all(&json, &empty_object).is_ok());
    }

    #[test]
    fn assert_yaml() {
        let yaml = [Assertion::Payload(PayloadKind::Yaml)];
        let good = response(StatusCode::OK, &[], "code: NOT_FOUND\nstatus: 404\n");
        let bad = response(StatusCode::OK, &[], "key: [unclosed");

        assert!(assert_all(&yaml, &good).is_ok());
        assert!(matches!(assert_all(&yaml, &bad), Err(Mismatch::Yaml(_))));
    }

    #[test]
    fn assert_payload_presence() {
        let empty = response(StatusCode::NO_CONTENT, &[], "");
        let some = response(StatusCode::OK, &[], "vnfd:\n  id: cirros\n");

        assert!(assert_all(&[Assertion::Payload(PayloadKind::Empty)], &empty).is_ok());
        assert!(matches!(
            assert_all(&[Assertion::Payload(PayloadKind::Empty)], &some),
            Err(Mismatch::UnexpectedPayload(_))
        ));
        assert!(assert_all(&[Assertion::Payload(PayloadKind::Text)], &some).is_ok());
        assert!(matches!(
            assert_all(&[Assertion::Payload(PayloadKind::Binary)], &empty),
            Err(Mismatch::EmptyPayload(PayloadKind::Binary))
        ));
    }

    #[test]
    fn stops_at_first_mismatch() {
        let resp = response(StatusCode::NOT_FOUND, &[], "not json");
        let err = assert_all(
            &[
                Assertion::Status(ExpectedStatus::One(200)),
                Assertion::Payload(PayloadKind::Json),
            ],
            &resp,
        )
        .unwrap_err();

        assert!(matches!(err, Mismatch::Status { .. }));
    }
}
