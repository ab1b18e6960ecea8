use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use yagwr::AppState;
use yagwr::dispatch::Shell;
use yagwr::handlers::router;
use yagwr::rules::RuleSet;

fn app(rules_yaml: &str) -> axum::Router {
    let rules = RuleSet::from_yaml(rules_yaml).unwrap();
    router(Arc::new(AppState::new(rules, Shell::default())))
}

/// Actions run in the background, so poll until the file has the expected content.
async fn wait_for_content(path: &Path, expected: &str) -> String {
    let mut content = String::new();
    for _ in 0..100 {
        content = std::fs::read_to_string(path).unwrap_or_default();
        if content == expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    content
}

fn push_request(uri: &str, token: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("X-Gitlab-Token", token)
        .header("X-Gitlab-Event", "Push Hook")
        .header("X-Gitlab-Instance", "https://gitlab1.example.com")
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = app("- condition: path = /\n  action: 'true'\n");

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/?format=json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total_rules"], 1);
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_matching_rules_run_in_order_with_headers_and_body() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    let yaml = format!(
        r#"
- condition: gitlab_token = 0xdeadbeef
  action: printf '%s\n' "$YAGWR_X_GITLAB_TOKEN" >> '{out}'
- condition:
    all:
      - any:
          - gitlab_event = "Push Hook"
          - gitlab_event = "Tag Push Hook"
      - not: gitlab_host = "invalid.example.com"
  action: exit 7
- condition:
    all:
      - path ~= ^/hooks/
      - gitlab_host ~= gitlab[0-9]+.example.com
  action: cat >> '{out}'; echo >> '{out}'
- condition: gitlab_event = "Merge Request Hook"
  action: echo never >> '{out}'
"#,
        out = out.display()
    );

    let response = app(&yaml)
        .oneshot(push_request(
            "/hooks/deploy",
            "0xdeadbeef",
            r#"{"object_kind":"push"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let expected = "0xdeadbeef\n{\"object_kind\":\"push\"}\n";
    assert_eq!(wait_for_content(&out, expected).await, expected);
}

#[tokio::test]
async fn test_large_body_reaches_the_action() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("size.txt");
    let yaml = format!(
        "- condition: path = /\n  action: wc -c | tr -d ' ' > '{}'\n",
        out.display()
    );
    let body = vec![b'x'; 3 * 1024 * 1024];

    let response = app(&yaml)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("X-Gitlab-Event", "Push Hook")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let expected = "3145728\n";
    assert_eq!(wait_for_content(&out, expected).await, expected);
}

#[tokio::test]
async fn test_non_matching_request_still_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    let yaml = format!(
        "- condition: gitlab_token = secret\n  action: echo ran > '{}'\n",
        out.display()
    );

    let response = app(&yaml)
        .oneshot(push_request("/", "wrong", "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!out.exists());
}

#[tokio::test]
async fn test_get_on_webhook_path_is_not_allowed() {
    let response = app("- condition: path = /\n  action: 'true'\n")
        .oneshot(
            Request::builder()
                .uri("/hooks/deploy")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[test]
fn test_example_rules_file_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("yagwr_rules.example.yaml");
    let rules = RuleSet::load(path).unwrap();
    assert_eq!(rules.len(), 3);
}
