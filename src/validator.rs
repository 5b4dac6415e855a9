use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;

use miette::Diagnostic;
use miette::NamedSource;
use miette::SourceSpan;
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use thiserror::Error;

mod parser_assertion;

use crate::parser;
use crate::parser::TestPlan;

const PATH_URL_MISSING_SLASH: &str =
    "The URL of a test must be empty, absolute (http...) or begin with a leading /.";
const TOO_MANY_PAYLOADS: &str =
    "Only one of `body`, `text`, `file` or `binary_file` can be set on a test.";

/// Status codes a test accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedStatus {
    One(u16),
    Set(Vec<u16>),
    Range(RangeInclusive<u16>),
}

impl ExpectedStatus {
    pub fn accepts(&self, status: StatusCode) -> bool {
        let code = status.as_u16();
        match self {
            ExpectedStatus::One(expected) => *expected == code,
            ExpectedStatus::Set(expected) => expected.contains(&code),
            ExpectedStatus::Range(range) => range.contains(&code),
        }
    }
}

impl From<u16> for ExpectedStatus {
    fn from(code: u16) -> Self {
        ExpectedStatus::One(code)
    }
}

impl<const N: usize> From<[u16; N]> for ExpectedStatus {
    fn from(codes: [u16; N]) -> Self {
        ExpectedStatus::Set(codes.to_vec())
    }
}

impl From<RangeInclusive<u16>> for ExpectedStatus {
    fn from(range: RangeInclusive<u16>) -> Self {
        ExpectedStatus::Range(range)
    }
}

impl fmt::Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedStatus::One(code) => write!(f, "{code}"),
            ExpectedStatus::Set(codes) => {
                let codes: Vec<String> = codes.iter().map(u16::to_string).collect();
                write!(f, "({})", codes.join(", "))
            }
            ExpectedStatus::Range(range) => write!(f, "{}..={}", range.start(), range.end()),
        }
    }
}

/// A response header that must be present, optionally containing `contains`
/// (compared case-insensitively).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedHeader {
    pub name: HeaderName,
    pub contains: Option<String>,
}

impl ExpectedHeader {
    pub fn present(name: HeaderName) -> Self {
        Self {
            name,
            contains: None,
        }
    }

    pub fn containing(name: HeaderName, value: &str) -> Self {
        Self {
            name,
            contains: Some(value.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Empty,
    Json,
    Yaml,
    Text,
    Binary,
}

impl FromStr for PayloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "empty" => Ok(PayloadKind::Empty),
            "json" => Ok(PayloadKind::Json),
            "yaml" => Ok(PayloadKind::Yaml),
            "text" => Ok(PayloadKind::Text),
            "binary" | "zip" => Ok(PayloadKind::Binary),
            other => Err(format!(
                "Unknown payload kind `{other}`, expected one of none, json, yaml, text, binary"
            )),
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            PayloadKind::Empty => "none",
            PayloadKind::Json => "json",
            PayloadKind::Yaml => "yaml",
            PayloadKind::Text => "text",
            PayloadKind::Binary => "binary",
        };
        write!(f, "{kind}")
    }
}

/// Request body of a test.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadSource {
    None,
    Inline(Vec<u8>),
    TextFile(PathBuf),
    BinaryFile(PathBuf),
    Mapping(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Assertion {
    Status(ExpectedStatus),
    Headers(Vec<ExpectedHeader>),
    Payload(PayloadKind),
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub description: String,
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub payload: PayloadSource,
    pub assertions: Vec<Assertion>,
}

impl TestCase {
    pub fn new(name: &str, description: &str, method: Method, url: &str) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            payload: PayloadSource::None,
            assertions: vec![],
        }
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn payload(mut self, payload: PayloadSource) -> Self {
        self.payload = payload;
        self
    }

    pub fn expect_status(mut self, status: impl Into<ExpectedStatus>) -> Self {
        self.assertions.push(Assertion::Status(status.into()));
        self
    }

    pub fn expect_headers(mut self, headers: Vec<ExpectedHeader>) -> Self {
        if !headers.is_empty() {
            self.assertions.push(Assertion::Headers(headers));
        }
        self
    }

    pub fn expect_payload(mut self, kind: PayloadKind) -> Self {
        self.assertions.push(Assertion::Payload(kind));
        self
    }
}

#[derive(Debug, Clone)]
pub struct PlannedTest {
    pub case: TestCase,
    /// JSON field of the response holding a bearer token for later requests.
    pub bearer_from: Option<String>,
}

impl From<TestCase> for PlannedTest {
    fn from(case: TestCase) -> Self {
        Self {
            case,
            bearer_from: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestGroup {
    pub name: String,
    pub tests: Vec<PlannedTest>,
}

#[derive(Debug, Clone, Default)]
pub struct IR {
    pub global_headers: HeaderMap,
    pub groups: Vec<TestGroup>,
}

impl IR {
    pub fn n_tests(&self) -> usize {
        self.groups.iter().map(|group| group.tests.len()).sum()
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("Invalid field `{field}`: {message}")]
pub struct ValidationError {
    field: String,
    message: String,
    #[source_code]
    src: Option<NamedSource<String>>,
    #[label("invalid value here")]
    span: Option<SourceSpan>,
}

macro_rules! validation_err {
    ($field:expr, $msg:expr, $self:expr, $snippet:expr) => {
        ValidationError {
            field: $field.to_string(),
            message: $msg.to_string(),
            src: Some(NamedSource::new(
                $self.file_name.clone(),
                $self.toml_src.clone(),
            )),
            span: find_span($snippet, &$self.toml_src),
        }
    };
}

pub struct Validator {
    plan: TestPlan,
    toml_src: String,
    file_name: String,
}

impl Validator {
    pub fn new(plan: &TestPlan, toml_src: &str, file_name: &str) -> Self {
        Self {
            plan: plan.clone(),
            toml_src: toml_src.into(),
            file_name: file_name.into(),
        }
    }

    pub fn validate(&self) -> miette::Result<IR, ValidationError> {
        let src = (self.file_name.clone(), self.toml_src.clone());

        let global_headers = match self.plan.global.as_ref().and_then(|g| g.headers.as_ref()) {
            Some(value) => parser_assertion::parse_header_map(value, Some(&src))?,
            None => HeaderMap::new(),
        };

        let groups = self
            .plan
            .groups
            .iter()
            .map(|group| {
                let tests = group
                    .tests
                    .iter()
                    .map(|test| self.create_test(test, &src))
                    .collect::<Result<Vec<_>, ValidationError>>()?;

                Ok(TestGroup {
                    name: group.name.clone(),
                    tests,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(IR {
            global_headers,
            groups,
        })
    }

    fn create_test(
        &self,
        test: &parser::Test,
        src: &(String, String),
    ) -> Result<PlannedTest, ValidationError> {
        let method = parse_method(&test.method.to_uppercase()).map_err(|e| {
            validation_err!(format!("{} - method", test.name), e, self, &test.method)
        })?;

        let url = test.url.clone().unwrap_or_default();
        if !(url.is_empty() || url.starts_with("http") || url.starts_with('/')) {
            return Err(validation_err!(
                format!("{}/url", test.name),
                PATH_URL_MISSING_SLASH,
                self,
                &url
            ));
        }

        let payload = self.create_payload(test)?;

        let headers = match &test.headers {
            Some(value) => parser_assertion::parse_header_map(value, Some(src))?,
            None => HeaderMap::new(),
        };

        let assertions = parser_assertion::parse_assertions(
            &test.expect_status,
            &test.expect_headers,
            &test.expect_payload,
            Some(src),
        )?;

        Ok(PlannedTest {
            case: TestCase {
                name: test.name.clone(),
                description: test.description.clone().unwrap_or_default(),
                method,
                url,
                headers,
                payload,
                assertions,
            },
            bearer_from: test.bearer_from.clone(),
        })
    }

    fn create_payload(&self, test: &parser::Test) -> Result<PayloadSource, ValidationError> {
        let mut payloads = vec![];

        if let Some(body) = &test.body {
            payloads.push(PayloadSource::Mapping(body.clone()));
        }
        if let Some(text) = &test.text {
            payloads.push(PayloadSource::Inline(text.clone().into_bytes()));
        }
        if let Some(path) = &test.file {
            payloads.push(PayloadSource::TextFile(PathBuf::from(path)));
        }
        if let Some(path) = &test.binary_file {
            payloads.push(PayloadSource::BinaryFile(PathBuf::from(path)));
        }

        if payloads.len() > 1 {
            return Err(validation_err!(
                format!("{} - payload", test.name),
                TOO_MANY_PAYLOADS,
                self,
                &test.name
            ));
        }

        Ok(payloads.pop().unwrap_or(PayloadSource::None))
    }
}

fn parse_method(method: &str) -> Result<reqwest::Method, String> {
    let method = Method::from_str(method).map_err(|e| e.to_string())?;

    if !matches!(
        method,
        Method::GET
            | Method::POST
            | Method::PUT
            | Method::DELETE
            | Method::PATCH
            | Method::HEAD
            | Method::OPTIONS
    ) {
        return Err(format!("Invalid HTTP method: {}", method));
    }

    Ok(method)
}

fn find_span(needle: &str, toml_src: &str) -> Option<SourceSpan> {
    let pattern = format!("\"{}\"", needle);
    toml_src
        .find(&pattern)
        .map(|start| SourceSpan::new((start + 1).into(), needle.len()))
}
