//! The scripted NBI smoke test: unauthenticated probes, login, authenticated
//! probes, then the VIM, VNFD and NSD lifecycles.

use std::path::PathBuf;

use reqwest::Method;
use reqwest::header::ACCEPT;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::LOCATION;
use serde_json::json;

use crate::validator::ExpectedHeader;
use crate::validator::IR;
use crate::validator::PayloadKind;
use crate::validator::PayloadSource;
use crate::validator::PlannedTest;
use crate::validator::TestCase;
use crate::validator::TestGroup;

const JSON: &str = "application/json";
const YAML: &str = "application/yaml";
const TEXT: &str = "text/plain";
const OCTET: &str = "application/octet-stream";
const ZIP: &str = "application/zip";

pub struct ScenarioOptions {
    pub user: String,
    pub password: String,
    pub project: String,
    pub vnfd_file: PathBuf,
    pub vnfd_package: PathBuf,
    pub nsd_file: PathBuf,
    pub nsd_package: PathBuf,
}

fn headers(pairs: &[(reqwest::header::HeaderName, &'static str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.insert(name.clone(), HeaderValue::from_static(*value));
    }
    map
}

fn send_json() -> HeaderMap {
    headers(&[(CONTENT_TYPE, JSON), (ACCEPT, JSON)])
}

fn send_yaml() -> HeaderMap {
    headers(&[(CONTENT_TYPE, YAML), (ACCEPT, YAML)])
}

fn send_text() -> HeaderMap {
    headers(&[(CONTENT_TYPE, TEXT)])
}

fn send_zip() -> HeaderMap {
    headers(&[(CONTENT_TYPE, ZIP)])
}

fn accept_text() -> HeaderMap {
    headers(&[(ACCEPT, TEXT)])
}

fn accept_zip() -> HeaderMap {
    headers(&[(ACCEPT, ZIP)])
}

fn returns(content_type: &str) -> Vec<ExpectedHeader> {
    vec![ExpectedHeader::containing(CONTENT_TYPE, content_type)]
}

fn created(path: &str) -> Vec<ExpectedHeader> {
    vec![
        ExpectedHeader::containing(LOCATION, path),
        ExpectedHeader::containing(CONTENT_TYPE, JSON),
    ]
}

fn vim_account() -> serde_json::Value {
    json!({
        "schema_version": "1.0",
        "schema_type": "No idea",
        "name": "myVim",
        "description": "Descriptor name",
        "vim_type": "openstack",
        "vim_url": "http://localhost:/vim",
        "vim_tenant_name": "vimTenant",
        "vim_user": "user",
        "vim_password": "password",
        "config": { "config_param": 1 }
    })
}

fn group(name: &str, cases: Vec<TestCase>) -> TestGroup {
    TestGroup {
        name: name.into(),
        tests: cases.into_iter().map(PlannedTest::from).collect(),
    }
}

fn not_authorized() -> TestGroup {
    group(
        "not authorized",
        vec![
            TestCase::new("NA1", "Invalid token", Method::GET, "/admin/v1/users")
                .headers(send_json())
                .expect_status(401)
                .expect_headers(returns(JSON))
                .expect_payload(PayloadKind::Json),
            TestCase::new("NA2", "Invalid URL", Method::POST, "/admin/v1/nonexist")
                .headers(send_yaml())
                .expect_status(405)
                .expect_headers(returns(YAML))
                .expect_payload(PayloadKind::Yaml),
            TestCase::new("NA3", "Invalid version", Method::DELETE, "/admin/v2/users")
                .headers(send_yaml())
                .expect_status(405)
                .expect_headers(returns(YAML))
                .expect_payload(PayloadKind::Yaml),
        ],
    )
}

fn token(opts: &ScenarioOptions) -> TestGroup {
    let login = TestCase::new("token1", "Obtain token", Method::POST, "/admin/v1/tokens")
        .headers(send_json())
        .payload(PayloadSource::Mapping(json!({
            "username": opts.user,
            "password": opts.password,
            "project_id": opts.project,
        })))
        .expect_status([200, 201])
        .expect_headers(returns(JSON))
        .expect_payload(PayloadKind::Json);

    TestGroup {
        name: "token".into(),
        tests: vec![PlannedTest {
            case: login,
            bearer_from: Some("id".into()),
        }],
    }
}

fn authorized() -> TestGroup {
    group(
        "authorized",
        vec![
            TestCase::new(
                "AU1",
                "Invalid vnfd id",
                Method::GET,
                "/vnfpkgm/v1/vnf_packages/non-existing-id",
            )
            .headers(send_json())
            .expect_status(404)
            .expect_headers(returns(JSON))
            .expect_payload(PayloadKind::Json),
            TestCase::new(
                "AU2",
                "Invalid nsd id",
                Method::GET,
                "/nsd/v1/ns_descriptors/non-existing-id",
            )
            .headers(send_yaml())
            .expect_status(404)
            .expect_headers(returns(YAML))
            .expect_payload(PayloadKind::Yaml),
            TestCase::new(
                "AU3",
                "Invalid nsd id",
                Method::DELETE,
                "/nsd/v1/ns_descriptors_content/non-existing-id",
            )
            .headers(send_yaml())
            .expect_status(404)
            .expect_headers(returns(YAML))
            .expect_payload(PayloadKind::Yaml),
        ],
    )
}

fn vim_accounts() -> TestGroup {
    let mut vim_bad = vim_account();
    if let Some(fields) = vim_bad.as_object_mut() {
        fields.remove("name");
    }

    group(
        "vim accounts",
        vec![
            TestCase::new("VIM1", "Create VIM", Method::POST, "/admin/v1/vim_accounts")
                .headers(send_json())
                .payload(PayloadSource::Mapping(vim_account()))
                .expect_status([201, 204])
                .expect_headers(created("/admin/v1/vim_accounts/"))
                .expect_payload(PayloadKind::Json),
            TestCase::new(
                "VIM2",
                "Create VIM bad schema",
                Method::POST,
                "/admin/v1/vim_accounts",
            )
            .headers(send_json())
            .payload(PayloadSource::Mapping(vim_bad))
            .expect_status(422),
            TestCase::new(
                "VIM2",
                "Create VIM name repeated",
                Method::POST,
                "/admin/v1/vim_accounts",
            )
            .headers(send_json())
            .payload(PayloadSource::Mapping(vim_account()))
            .expect_status(409),
            TestCase::new("VIM4", "Show VIMs", Method::GET, "/admin/v1/vim_accounts")
                .headers(send_yaml())
                .expect_status(200)
                .expect_headers(returns(YAML))
                .expect_payload(PayloadKind::Yaml),
            TestCase::new("VIM5", "Show VIM", Method::GET, "/admin/v1/vim_accounts/{VIM1}")
                .headers(send_yaml())
                .expect_status(200)
                .expect_headers(returns(YAML))
                .expect_payload(PayloadKind::Yaml),
            TestCase::new("VIM6", "Delete VIM", Method::DELETE, "/admin/v1/vim_accounts/{VIM1}")
                .headers(send_yaml())
                .expect_status(202)
                .expect_payload(PayloadKind::Empty),
        ],
    )
}

fn vnfd(opts: &ScenarioOptions) -> TestGroup {
    let content = "/vnfpkgm/v1/vnf_packages/{VNFD1}/package_content";
    let osm_format = "/vnfpkgm/v1/vnf_packages_content/{VNFD1}";

    group(
        "vnfd onboarding",
        vec![
            TestCase::new("VNFD1", "Onboard VNFD step 1", Method::POST, "/vnfpkgm/v1/vnf_packages")
                .headers(send_json())
                .expect_status(201)
                .expect_headers(created("/vnfpkgm/v1/vnf_packages/"))
                .expect_payload(PayloadKind::Json),
            TestCase::new("VNFD2", "Onboard VNFD step 2 as TEXT", Method::PUT, content)
                .headers(send_text())
                .payload(PayloadSource::TextFile(opts.vnfd_file.clone()))
                .expect_status(204)
                .expect_payload(PayloadKind::Empty),
            TestCase::new("VNFD3", "Show VNFD OSM format", Method::GET, osm_format)
                .headers(send_json())
                .expect_status(200)
                .expect_headers(returns(JSON))
                .expect_payload(PayloadKind::Json),
            TestCase::new("VNFD4", "Show VNFD SOL005 text", Method::GET, content)
                .headers(accept_text())
                .expect_status(200)
                .expect_headers(returns(TEXT))
                .expect_payload(PayloadKind::Text),
            TestCase::new("VNFD5", "Onboard VNFD step 3 replace with ZIP", Method::PUT, content)
                .headers(send_zip())
                .payload(PayloadSource::BinaryFile(opts.vnfd_package.clone()))
                .expect_status(204)
                .expect_payload(PayloadKind::Empty),
            TestCase::new("VNFD6", "Show VNFD OSM format", Method::GET, osm_format)
                .headers(send_json())
                .expect_status(200)
                .expect_headers(returns(JSON))
                .expect_payload(PayloadKind::Json),
            TestCase::new("VNFD7", "Show VNFD SOL005 zip", Method::GET, content)
                .headers(accept_zip())
                .expect_status(200)
                .expect_headers(returns(ZIP))
                .expect_payload(PayloadKind::Binary),
            TestCase::new(
                "VNFD8",
                "Show VNFD descriptor",
                Method::GET,
                "/vnfpkgm/v1/vnf_packages/{VNFD1}/vnfd",
            )
            .headers(accept_text())
            .expect_status(200)
            .expect_headers(returns(TEXT))
            .expect_payload(PayloadKind::Text),
            TestCase::new(
                "VNFD9",
                "Show VNFD artifact",
                Method::GET,
                "/vnfpkgm/v1/vnf_packages/{VNFD1}/artifacts/icons/cirros-64.png",
            )
            .headers(accept_text())
            .expect_status(200)
            .expect_headers(returns(OCTET))
            .expect_payload(PayloadKind::Binary),
        ],
    )
}

fn nsd(opts: &ScenarioOptions) -> TestGroup {
    let content = "/nsd/v1/ns_descriptors/{NSD1}/nsd_content";
    let osm_format = "/nsd/v1/ns_descriptors_content/{NSD1}";

    group(
        "nsd onboarding",
        vec![
            TestCase::new("NSD1", "Onboard NSD step 1", Method::POST, "/nsd/v1/ns_descriptors")
                .headers(send_json())
                .expect_status(201)
                .expect_headers(created("/nsd/v1/ns_descriptors/"))
                .expect_payload(PayloadKind::Json),
            TestCase::new(
                "NSD2",
                "Onboard NSD with missing vnfd",
                Method::PUT,
                "/nsd/v1/ns_descriptors/{NSD1}/nsd_content?constituent-vnfd.0.vnfd-id-ref=NONEXISTING-VNFD",
            )
            .headers(send_text())
            .payload(PayloadSource::TextFile(opts.nsd_file.clone()))
            .expect_status(409)
            .expect_headers(returns(YAML))
            .expect_payload(PayloadKind::Yaml),
            TestCase::new("NSD2", "Onboard NSD step 2 as TEXT", Method::PUT, content)
                .headers(send_text())
                .payload(PayloadSource::TextFile(opts.nsd_file.clone()))
                .expect_status(204)
                .expect_payload(PayloadKind::Empty),
            TestCase::new("NSD3", "Show NSD OSM format", Method::GET, osm_format)
                .headers(send_json())
                .expect_status(200)
                .expect_headers(returns(JSON))
                .expect_payload(PayloadKind::Json),
            TestCase::new("NSD4", "Show NSD SOL005 text", Method::GET, content)
                .headers(accept_text())
                .expect_status(200)
                .expect_headers(returns(TEXT))
                .expect_payload(PayloadKind::Text),
            TestCase::new("NSD5", "Onboard NSD step 3 replace with ZIP", Method::PUT, content)
                .headers(send_zip())
                .payload(PayloadSource::BinaryFile(opts.nsd_package.clone()))
                .expect_status(204)
                .expect_payload(PayloadKind::Empty),
            TestCase::new("NSD6", "Show NSD OSM format", Method::GET, osm_format)
                .headers(send_json())
                .expect_status(200)
                .expect_headers(returns(JSON))
                .expect_payload(PayloadKind::Json),
            TestCase::new("NSD7", "Show NSD SOL005 zip", Method::GET, content)
                .headers(accept_zip())
                .expect_status(200)
                .expect_headers(returns(ZIP))
                .expect_payload(PayloadKind::Binary),
            TestCase::new(
                "NSD8",
                "Show NSD descriptor",
                Method::GET,
                "/nsd/v1/ns_descriptors/{NSD1}/nsd",
            )
            .headers(accept_text())
            .expect_status(200)
            .expect_headers(returns(TEXT))
            .expect_payload(PayloadKind::Text),
            TestCase::new(
                "NSD9",
                "Show NSD artifact",
                Method::GET,
                "/nsd/v1/ns_descriptors/{NSD1}/artifacts/icons/osm_2x.png",
            )
            .headers(accept_text())
            .expect_status(200)
            .expect_headers(returns(OCTET))
            .expect_payload(PayloadKind::Binary),
        ],
    )
}

/// The VNFD cannot go while the NSD still references it.
fn cleanup() -> TestGroup {
    group(
        "cleanup",
        vec![
            TestCase::new(
                "VNFD10",
                "Delete VNFD conflict",
                Method::DELETE,
                "/vnfpkgm/v1/vnf_packages/{VNFD1}",
            )
            .headers(send_yaml())
            .expect_status(409)
            .expect_headers(returns(YAML))
            .expect_payload(PayloadKind::Yaml),
            TestCase::new(
                "NSD10",
                "Delete NSD SOL005 text",
                Method::DELETE,
                "/nsd/v1/ns_descriptors/{NSD1}",
            )
            .headers(send_yaml())
            .expect_status(204)
            .expect_payload(PayloadKind::Empty),
            TestCase::new(
                "VNFD10",
                "Delete VNFD SOL005 text",
                Method::DELETE,
                "/vnfpkgm/v1/vnf_packages/{VNFD1}",
            )
            .headers(send_yaml())
            .expect_status(204)
            .expect_payload(PayloadKind::Empty),
        ],
    )
}

pub fn nbi_scenario(opts: &ScenarioOptions) -> IR {
    IR {
        global_headers: HeaderMap::new(),
        groups: vec![
            not_authorized(),
            token(opts),
            authorized(),
            vim_accounts(),
            vnfd(opts),
            nsd(opts),
            cleanup(),
        ],
    }
}
