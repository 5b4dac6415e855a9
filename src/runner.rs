#![allow(clippy::enum_variant_names)]

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use flume::Sender;
use reqwest::Client;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::LOCATION;
use thiserror::Error;
use url::Url;

use crate::asserter::Mismatch;
use crate::asserter::assert_all;
use crate::validator::PayloadSource;
use crate::validator::TestCase;

/// Key under which the most recently captured identifier is stored.
pub const LAST_ID: &str = "";

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Test {test} failed: {mismatch}")]
    ExpectationMismatch {
        test: String,
        mismatch: Mismatch,
        response: Box<CapturedResponse>,
    },

    #[error("Test {test}: cannot open file {}: {source}", .path.display())]
    PayloadFile {
        test: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Test {test}: cannot encode payload as JSON: {source}")]
    JsonEncoding {
        test: String,
        source: serde_json::Error,
    },

    #[error("Test {test}: cannot encode payload as YAML: {source}")]
    YamlEncoding {
        test: String,
        source: serde_yaml::Error,
    },

    #[error("Test {test}: invalid URL {url}: {source}")]
    InvalidUrl {
        test: String,
        url: String,
        source: url::ParseError,
    },

    #[error("Test {test}: request to {url} failed: {source}")]
    Transport {
        test: String,
        url: String,
        source: reqwest::Error,
    },

    #[error("failed to build the http client: {0}")]
    ClientError(reqwest::Error),
}

/// Progress of a run, consumed by the outputter.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Passed {
        name: String,
        method: String,
        url: String,
        status: StatusCode,
    },
    Failed {
        name: String,
        description: String,
        method: String,
        url: String,
        reason: String,
        response: Option<(StatusCode, String)>,
    },
}

#[derive(Debug, Clone)]
pub struct Session {
    pub base_url: String,
    pub headers: HeaderMap,
    pub verify_tls: bool,
    pub timeout: Option<Duration>,
}

impl Session {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.into(),
            headers: HeaderMap::new(),
            verify_tls: true,
            timeout: None,
        }
    }

    /// An empty URL targets the base URL itself, an `http...` URL is used as
    /// is and anything else is appended to the base URL.
    pub fn absolute_url(&self, url: &str) -> String {
        if url.is_empty() {
            self.base_url.clone()
        } else if url.starts_with("http") {
            url.into()
        } else {
            format!("{}{}", self.base_url, url)
        }
    }
}

/// Identifiers captured from `Location` headers, keyed by test name.
#[derive(Debug, Default, Clone)]
pub struct IdentifierStore(HashMap<String, String>);

impl IdentifierStore {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: &str, id: &str) {
        self.0.insert(name.into(), id.into());
        self.0.insert(LAST_ID.into(), id.into());
    }

    /// Replaces every `{name}` whose identifier is known. Substituted text is
    /// not scanned again; unknown placeholders are kept verbatim and scanning
    /// resumes right after their opening brace. `{}` is the last identifier.
    pub fn resolve(&self, url: &str) -> String {
        let mut resolved = String::with_capacity(url.len());
        let mut rest = url;

        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                break;
            };

            match self.get(&after[..close]) {
                Some(id) => {
                    resolved.push_str(&rest[..open]);
                    resolved.push_str(id);
                    rest = &after[close + 1..];
                }
                None => {
                    resolved.push_str(&rest[..=open]);
                    rest = after;
                }
            }
        }

        resolved.push_str(rest);
        resolved
    }
}

/// Trailing path segment of a `Location` header, if any.
pub fn location_id(location: &str) -> Option<&str> {
    location.rsplit('/').next().filter(|id| !id.is_empty())
}

#[derive(Debug)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl CapturedResponse {
    pub async fn from_response(resp: Response) -> Result<Self, reqwest::Error> {
        let status = resp.status();
        let headers = resp.headers().clone();

        // Consume the body exactly once
        let body = resp.bytes().await?.to_vec();

        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

pub struct Runner {
    session: Session,
    client: Client,
    ids: IdentifierStore,
    events: Option<Sender<RunEvent>>,
}

impl Runner {
    pub fn new(session: Session) -> Result<Self, RunnerError> {
        let mut builder = Client::builder().danger_accept_invalid_certs(!session.verify_tls);
        if let Some(timeout) = session.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(RunnerError::ClientError)?;

        Ok(Self {
            session,
            client,
            ids: IdentifierStore::default(),
            events: None,
        })
    }

    pub fn with_events(mut self, tx: Sender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Merges `headers` into the defaults sent with every later request.
    pub fn set_header(&mut self, headers: HeaderMap) {
        for (key, value) in headers {
            if let Some(key) = key {
                self.session.headers.insert(key, value);
            }
        }
    }

    #[cfg(test)]
    pub fn identifiers(&self) -> &IdentifierStore {
        &self.ids
    }

    /// Sends one test request and verifies the response.
    ///
    /// On success the identifier of a `Location` header is captured under the
    /// test name so later URLs can refer to it as `{name}`. Any error is logged
    /// with the full request context and ends the test.
    pub async fn execute(&mut self, case: &TestCase) -> Result<CapturedResponse, RunnerError> {
        let url = self.ids.resolve(&self.session.absolute_url(&case.url));
        tracing::debug!(
            "Test {} {} {} {}",
            case.name,
            case.description,
            case.method,
            url
        );

        match self.send_and_verify(case, &url).await {
            Ok(response) => {
                if let Some(id) = response
                    .headers
                    .get(LOCATION)
                    .and_then(|location| location.to_str().ok())
                    .and_then(location_id)
                {
                    tracing::debug!(test = %case.name, id, "captured identifier");
                    self.ids.insert(&case.name, id);
                }

                self.emit(RunEvent::Passed {
                    name: case.name.clone(),
                    method: case.method.to_string(),
                    url,
                    status: response.status,
                })
                .await;

                Ok(response)
            }
            Err(error) => {
                let response = match &error {
                    RunnerError::ExpectationMismatch { response, .. } => {
                        Some((response.status, response.text()))
                    }
                    _ => None,
                };

                match &response {
                    Some((status, body)) => tracing::error!(
                        test = %case.name,
                        description = %case.description,
                        method = %case.method,
                        url = %url,
                        "{error}\nRX code {status}: {body}"
                    ),
                    None => tracing::error!(
                        test = %case.name,
                        description = %case.description,
                        method = %case.method,
                        url = %url,
                        "{error}"
                    ),
                }

                self.emit(RunEvent::Failed {
                    name: case.name.clone(),
                    description: case.description.clone(),
                    method: case.method.to_string(),
                    url,
                    reason: error.to_string(),
                    response,
                })
                .await;

                Err(error)
            }
        }
    }

    async fn send_and_verify(
        &self,
        case: &TestCase,
        url: &str,
    ) -> Result<CapturedResponse, RunnerError> {
        let parsed = Url::parse(url).map_err(|source| RunnerError::InvalidUrl {
            test: case.name.clone(),
            url: url.into(),
            source,
        })?;

        // Per-test headers take precedence over the session defaults.
        let mut headers = self.session.headers.clone();
        for (key, value) in case.headers.clone() {
            if let Some(key) = key {
                headers.insert(key, value);
            }
        }

        let body = prepare_payload(case, &headers).await?;

        let request = self.client.request(case.method.clone(), parsed).headers(headers);
        let request = match body {
            Some(body) => request.body(body),
            None => request,
        };

        let transport = |source| RunnerError::Transport {
            test: case.name.clone(),
            url: url.into(),
            source,
        };

        let resp = request.send().await.map_err(transport)?;
        let response = CapturedResponse::from_response(resp)
            .await
            .map_err(transport)?;

        tracing::debug!("RX {}: {}", response.status, response.text());

        if let Err(mismatch) = assert_all(&case.assertions, &response) {
            return Err(RunnerError::ExpectationMismatch {
                test: case.name.clone(),
                mismatch,
                response: Box::new(response),
            });
        }

        Ok(response)
    }

    async fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events
            && let Err(error) = tx.send_async(event).await
        {
            tracing::warn!("progress output is gone: {error}");
        }
    }
}

async fn prepare_payload(
    case: &TestCase,
    headers: &HeaderMap,
) -> Result<Option<Vec<u8>>, RunnerError> {
    let file_error = |path: &Path, source| RunnerError::PayloadFile {
        test: case.name.clone(),
        path: path.to_path_buf(),
        source,
    };

    match &case.payload {
        PayloadSource::None => Ok(None),
        PayloadSource::Inline(bytes) => Ok(Some(bytes.clone())),
        PayloadSource::TextFile(path) => tokio::fs::read_to_string(path)
            .await
            .map(|text| Some(text.into_bytes()))
            .map_err(|e| file_error(path, e)),
        PayloadSource::BinaryFile(path) => tokio::fs::read(path)
            .await
            .map(Some)
            .map_err(|e| file_error(path, e)),
        PayloadSource::Mapping(value) => {
            let wants_yaml = headers
                .get(CONTENT_TYPE)
                .and_then(|ct| ct.to_str().ok())
                .is_some_and(|ct| ct.to_lowercase().contains("yaml"));

            if wants_yaml {
                serde_yaml::to_string(value)
                    .map(|text| Some(text.into_bytes()))
                    .map_err(|source| RunnerError::YamlEncoding {
                        test: case.name.clone(),
                        source,
                    })
            } else {
                serde_json::to_vec(value)
                    .map(Some)
                    .map_err(|source| RunnerError::JsonEncoding {
                        test: case.name.clone(),
                        source,
                    })
            }
        }
    }
}
