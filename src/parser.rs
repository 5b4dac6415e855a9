use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestPlan {
    pub global: Option<Global>,
    pub groups: Vec<TestGroup>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Global {
    pub headers: Option<toml::Value>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestGroup {
    pub name: String,
    pub tests: Vec<Test>,
}

/// Accepted shapes for `expect_status`: `201`, `[201, 204]` or
/// `{ from = 200, to = 299 }`.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum StatusSpec {
    One(u16),
    Many(Vec<u16>),
    Range { from: u16, to: u16 },
}

#[derive(Deserialize, Debug, Clone)]
pub struct Test {
    pub name: String,
    pub description: Option<String>,
    pub method: String,
    pub url: Option<String>,
    pub headers: Option<toml::Value>,
    pub body: Option<serde_json::Value>,
    pub text: Option<String>,
    pub file: Option<String>,
    pub binary_file: Option<String>,
    pub expect_status: Option<StatusSpec>,
    pub expect_headers: Option<toml::Value>,
    pub expect_payload: Option<String>,
    pub bearer_from: Option<String>,
}
