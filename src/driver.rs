use reqwest::header::AUTHORIZATION;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::InvalidHeaderValue;
use thiserror::Error;

use crate::runner::CapturedResponse;
use crate::runner::Runner;
use crate::runner::RunnerError;
use crate::validator::IR;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("Test {test}: response has no string field `{field}` holding a token")]
    MissingToken { test: String, field: String },

    #[error("Test {test}: token cannot be sent as a header: {source}")]
    InvalidToken {
        test: String,
        source: InvalidHeaderValue,
    },
}

/// Runs every group of the plan in order and stops at the first error.
pub async fn run_plan(ir: IR, runner: &mut Runner) -> Result<(), DriverError> {
    for group in ir.groups {
        tracing::debug!(group = %group.name, tests = group.tests.len(), "running test group");

        for test in group.tests {
            let response = runner.execute(&test.case).await?;

            if let Some(field) = &test.bearer_from {
                let headers = bearer_header(&test.case.name, &response, field)?;
                runner.set_header(headers);
                tracing::debug!(test = %test.case.name, "authorization header set");
            }
        }
    }

    Ok(())
}

fn bearer_header(
    test: &str,
    response: &CapturedResponse,
    field: &str,
) -> Result<HeaderMap, DriverError> {
    let token = response
        .json()
        .ok()
        .and_then(|body| body.get(field).and_then(|v| v.as_str()).map(String::from))
        .ok_or_else(|| DriverError::MissingToken {
            test: test.into(),
            field: field.into(),
        })?;

    let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|source| {
        DriverError::InvalidToken {
            test: test.into(),
            source,
        }
    })?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

#[cfg(test)]
mod test {
    use axum::Router;
    use axum::http::HeaderMap as AxumHeaders;
    use axum::http::StatusCode;
    use axum::http::header;
    use axum::routing::get;
    use axum::routing::post;
    use reqwest::Method;

    use crate::driver::DriverError;
    use crate::driver::run_plan;
    use crate::runner::RunEvent;
    use crate::runner::Runner;
    use crate::runner::RunnerError;
    use crate::runner::Session;
    use crate::test_server::serve;
    use crate::validator::IR;
    use crate::validator::PayloadKind;
    use crate::validator::PayloadSource;
    use crate::validator::PlannedTest;
    use crate::validator::TestCase;
    use crate::validator::TestGroup;

    fn authorized(headers: &AxumHeaders) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .is_some_and(|v| v == "Bearer t0k3n")
    }

    fn nbi() -> Router {
        Router::new()
            .route(
                "/admin/v1/tokens",
                post(|| async {
                    (
                        [(header::CONTENT_TYPE, "application/json")],
                        r#"{"id": "t0k3n", "expires": 3600}"#,
                    )
                }),
            )
            .route(
                "/admin/v1/users",
                get(|headers: AxumHeaders| async move {
                    if authorized(&headers) {
                        (StatusCode::OK, "[]")
                    } else {
                        (StatusCode::UNAUTHORIZED, r#"{"code": "UNAUTHORIZED"}"#)
                    }
                }),
            )
            .route(
                "/nsd/v1/ns_descriptors",
                post(|headers: AxumHeaders| async move {
                    if !authorized(&headers) {
                        return (StatusCode::UNAUTHORIZED, [(header::LOCATION, "")], "");
                    }
                    (
                        StatusCode::CREATED,
                        [(header::LOCATION, "/nsd/v1/ns_descriptors/nsd-42")],
                        r#"{"id": "nsd-42"}"#,
                    )
                }),
            )
            .route(
                "/nsd/v1/ns_descriptors/{id}",
                get(|axum::extract::Path(id): axum::extract::Path<String>| async move {
                    if id == "nsd-42" {
                        (StatusCode::OK, format!("id: {id}\n"))
                    } else {
                        (StatusCode::NOT_FOUND, String::new())
                    }
                }),
            )
    }

    fn plan(login_field: &str) -> IR {
        let login = PlannedTest {
            case: TestCase::new("token1", "Obtain token", Method::POST, "/admin/v1/tokens")
                .payload(PayloadSource::Mapping(
                    serde_json::json!({ "username": "admin", "password": "admin" }),
                ))
                .expect_status([200, 201])
                .expect_payload(PayloadKind::Json),
            bearer_from: Some(login_field.into()),
        };

        IR {
            global_headers: Default::default(),
            groups: vec![
                TestGroup {
                    name: "not authorized".into(),
                    tests: vec![
                        TestCase::new("NA1", "Invalid token", Method::GET, "/admin/v1/users")
                            .expect_status(401)
                            .expect_payload(PayloadKind::Json)
                            .into(),
                    ],
                },
                TestGroup {
                    name: "token".into(),
                    tests: vec![login],
                },
                TestGroup {
                    name: "nsd".into(),
                    tests: vec![
                        TestCase::new("NSD1", "Onboard NSD step 1", Method::POST, "/nsd/v1/ns_descriptors")
                            .expect_status(201)
                            .into(),
                        TestCase::new("NSD3", "Show NSD", Method::GET, "/nsd/v1/ns_descriptors/{NSD1}")
                            .expect_status(200)
                            .expect_payload(PayloadKind::Yaml)
                            .into(),
                    ],
                },
            ],
        }
    }

    #[tokio::test]
    async fn token_unlocks_later_groups() {
        let base_url = serve(nbi()).await;
        let (tx, rx) = flume::unbounded();
        let mut runner = Runner::new(Session::new(&base_url)).unwrap().with_events(tx);

        run_plan(plan("id"), &mut runner).await.unwrap();

        assert_eq!(runner.identifiers().get("NSD1"), Some("nsd-42"));

        drop(runner);
        let events: Vec<RunEvent> = rx.drain().collect();
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| matches!(e, RunEvent::Passed { .. })));
    }

    #[tokio::test]
    async fn missing_token_field_stops_the_run() {
        let base_url = serve(nbi()).await;
        let mut runner = Runner::new(Session::new(&base_url)).unwrap();

        let err = run_plan(plan("token"), &mut runner).await.unwrap_err();

        assert!(matches!(err, DriverError::MissingToken { ref field, .. } if field == "token"));
        assert_eq!(runner.identifiers().get("NSD1"), None);
    }

    #[tokio::test]
    async fn first_failure_stops_the_run() {
        let base_url = serve(nbi()).await;
        let mut runner = Runner::new(Session::new(&base_url)).unwrap();

        let mut ir = plan("id");
        // Without the login group the create request is rejected.
        ir.groups.remove(1);

        let err = run_plan(ir, &mut runner).await.unwrap_err();
        assert!(matches!(
            err,
            DriverError::Runner(RunnerError::ExpectationMismatch { ref test, .. }) if test == "NSD1"
        ));
    }
}
