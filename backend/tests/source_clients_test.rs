//! GitLab and GitHub clients against a mock HTTP backend.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use package_gateway_backend::models::project::Project;
use package_gateway_backend::services::github_client::{GitHubClient, GitHubConfig};
use package_gateway_backend::services::gitlab_client::{GitLabClient, GitLabConfig};
use package_gateway_backend::services::source_registry::Source;

const MANIFEST_YAML: &str = r#"
version: 1.0.0
packages:
  - name: tool
    downloads:
      - os: linux
        arch: amd64
        url: https://example.com/tool.tar.gz
"#;

fn gitlab(server: &MockServer) -> GitLabClient {
    GitLabClient::new(GitLabConfig::new(server.uri())).unwrap()
}

fn gitlab_project(server: &MockServer, token: Option<&str>) -> Project {
    let mut project = Project::new("proj", format!("{}/org/proj", server.uri()), "gitlab");
    project.token = token.map(str::to_string);
    project
}

fn github(server: &MockServer, token: Option<&str>) -> GitHubClient {
    GitHubClient::new(GitHubConfig {
        web_url: server.uri(),
        api_url: server.uri(),
        default_token: token.map(str::to_string),
        ..Default::default()
    })
    .unwrap()
}

fn github_project(server: &MockServer) -> Project {
    Project::new("tool", format!("{}/acme/tool", server.uri()), "github")
}

fn pkt(line: &str) -> String {
    format!("{:04x}{}", line.len() + 4, line)
}

// ---------------------------------------------------------------------------
// GitLab
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_gitlab_versions_follow_pagination() {
    let server = MockServer::start().await;
    let packages = "/api/v4/projects/org%2Fproj/packages";

    Mock::given(method("GET"))
        .and(path(packages))
        .and(query_param("page", "1"))
        .and(query_param("package_name", "release"))
        .and(header("PRIVATE-TOKEN", "glpat-abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-next-page", "2")
                .set_body_json(json!([{ "version": "1.0.0" }, { "version": "1.1.0" }])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(packages))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-next-page", "")
                .set_body_json(json!([{ "version": "1.1.0" }, { "version": "2.0.0" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let versions = gitlab(&server)
        .get_versions(&gitlab_project(&server, Some("glpat-abc")))
        .await
        .unwrap();
    assert_eq!(versions, vec!["1.0.0", "1.1.0", "2.0.0"]);
}

#[tokio::test]
async fn test_gitlab_missing_project_is_upstream_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("{\"message\":\"404 Project Not Found\"}"))
        .mount(&server)
        .await;

    let err = gitlab(&server)
        .get_versions(&gitlab_project(&server, None))
        .await
        .unwrap_err();
    assert!(err.is_upstream_not_found());
}

#[tokio::test]
async fn test_gitlab_manifest_and_file() {
    let server = MockServer::start().await;
    let release = "/api/v4/projects/org%2Fproj/packages/generic/release/1.0.0";

    Mock::given(method("GET"))
        .and(path(format!("{}/manifest.yml", release)))
        .respond_with(ResponseTemplate::new(200).set_body_string(MANIFEST_YAML))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/tool.tar.gz", release)))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/gzip")
                .set_body_bytes(b"gz-bytes".to_vec()),
        )
        .mount(&server)
        .await;

    let client = gitlab(&server);
    let project = gitlab_project(&server, None);

    let manifest = client.get_manifest(&project, "1.0.0").await.unwrap();
    assert_eq!(manifest.version, "1.0.0");
    assert_eq!(manifest.packages[0].name, "tool");

    let response = client
        .get_file_response(&project, "1.0.0", "tool.tar.gz")
        .await
        .unwrap();
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/gzip"
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"gz-bytes");
}

#[tokio::test]
async fn test_gitlab_parses_its_own_download_urls() {
    let server = MockServer::start().await;
    let client = gitlab(&server);
    let url = format!(
        "{}/api/v4/projects/42/packages/generic/release/1.0.0/tool.tar.gz",
        server.uri()
    );
    let parsed = client.parse_file_url(&url).unwrap();
    assert_eq!(parsed.version, "1.0.0");
    assert_eq!(parsed.filename, "tool.tar.gz");
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_github_versions_from_releases() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/tool/releases"))
        .and(header("authorization", "Bearer ghp-default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "tag_name": "v1.1.0", "assets": [] },
            { "tag_name": "v1.0.0", "assets": [] },
            { "tag_name": "" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let versions = github(&server, Some("ghp-default"))
        .get_versions(&github_project(&server))
        .await
        .unwrap();
    assert_eq!(versions, vec!["v1.1.0", "v1.0.0"]);
}

#[tokio::test]
async fn test_github_rate_limit_falls_back_to_smart_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/tool/releases"))
        .respond_with(ResponseTemplate::new(403).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let sha = "0123456789abcdef0123456789abcdef01234567";
    let mut body = pkt("# service=git-upload-pack\n");
    body.push_str("0000");
    body.push_str(&pkt(&format!("{} HEAD\0multi_ack side-band-64k\n", sha)));
    body.push_str(&pkt(&format!("{} refs/heads/main\n", sha)));
    body.push_str(&pkt(&format!("{} refs/tags/v1.0.0\n", sha)));
    body.push_str(&pkt(&format!("{} refs/tags/v1.0.0^{{}}\n", sha)));
    body.push_str(&pkt(&format!("{} refs/tags/v1.1.0\n", sha)));
    body.push_str("0000");

    Mock::given(method("GET"))
        .and(path("/acme/tool.git/info/refs"))
        .and(query_param("service", "git-upload-pack"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let versions = github(&server, None)
        .get_versions(&github_project(&server))
        .await
        .unwrap();
    assert_eq!(versions, vec!["v1.0.0", "v1.1.0"]);
}

#[tokio::test]
async fn test_github_server_error_does_not_fall_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/tool/releases"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = github(&server, None)
        .get_versions(&github_project(&server))
        .await
        .unwrap_err();
    assert_eq!(err.upstream_status(), Some(502));
}

#[tokio::test]
async fn test_github_manifest_from_contents_api() {
    let server = MockServer::start().await;
    let encoded = STANDARD.encode(MANIFEST_YAML);
    // the contents API wraps base64 at 60 columns
    let wrapped: String = encoded
        .as_bytes()
        .chunks(60)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join("\n");

    Mock::given(method("GET"))
        .and(path("/repos/acme/tool/contents/manifest.yml"))
        .and(query_param("ref", "v1.0.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": wrapped,
            "encoding": "base64"
        })))
        .mount(&server)
        .await;

    let manifest = github(&server, None)
        .get_manifest(&github_project(&server), "v1.0.0")
        .await
        .unwrap();
    assert_eq!(manifest.packages[0].name, "tool");
}

#[tokio::test]
async fn test_github_manifest_without_base64_encoding_is_used_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/tool/contents/manifest.yml"))
        .and(query_param("ref", "v1.0.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": MANIFEST_YAML,
            "encoding": "none"
        })))
        .mount(&server)
        .await;

    let manifest = github(&server, None)
        .get_manifest(&github_project(&server), "v1.0.0")
        .await
        .unwrap();
    assert_eq!(manifest.version, "1.0.0");
    assert_eq!(manifest.packages[0].name, "tool");
}

#[tokio::test]
async fn test_github_download_falls_back_to_release_asset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/tool/releases/download/v1.0.0/tool.tar.gz"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/tool/releases/tags/v1.0.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tag_name": "v1.0.0",
            "assets": [
                { "name": "other.zip", "url": format!("{}/assets/1", server.uri()) },
                { "name": "tool.tar.gz", "url": format!("{}/assets/2", server.uri()) }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/assets/2"))
        .and(header("accept", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"asset".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let response = github(&server, None)
        .get_file_response(&github_project(&server), "v1.0.0", "tool.tar.gz")
        .await
        .unwrap();
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"asset");
}

#[tokio::test]
async fn test_github_missing_asset_is_upstream_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/tool/releases/download/v1.0.0/missing.bin"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/tool/releases/tags/v1.0.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tag_name": "v1.0.0",
            "assets": []
        })))
        .mount(&server)
        .await;

    let err = github(&server, None)
        .get_file_response(&github_project(&server), "v1.0.0", "missing.bin")
        .await
        .unwrap_err();
    assert!(err.is_upstream_not_found());
}
