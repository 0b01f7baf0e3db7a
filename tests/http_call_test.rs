//! `call: http` against a wiremock server

mod common;

use braid::error::BraidError;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// OUTPUT MODES
// =============================================================================

#[tokio::test]
async fn test_content_output_is_parsed_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/1"))
        .and(query_param("expand", "profile"))
        .and(header("x-tenant", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "ada"})))
        .expect(1)
        .mount(&server)
        .await;

    let yaml = r#"
document:
  name: fetch_user
do:
  - user:
      call: http
      with:
        method: get
        endpoint: ${ input.base + '/users/1' }
        headers:
          x-tenant: acme
        query:
          expand: profile
      export:
        as: ${ result.name }
"#;
    let output = common::run(yaml, json!({"base": server.uri()})).await.unwrap();
    assert_eq!(output, json!("ada"));
}

#[tokio::test]
async fn test_response_output_wraps_status_and_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(body_json(json!({"qty": 2})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "o-1"})))
        .mount(&server)
        .await;

    let yaml = r#"
document:
  name: create_order
do:
  - order:
      call: http
      with:
        method: post
        endpoint:
          uri: ${ input.base + '/orders' }
        body:
          qty: ${ input.qty }
        output: response
      export:
        as: ${ result }
"#;
    let output = common::run(yaml, json!({"base": server.uri(), "qty": 2}))
        .await
        .unwrap();
    assert_eq!(output["statusCode"], json!(201));
    assert_eq!(output["content"], json!({"id": "o-1"}));
}

#[tokio::test]
async fn test_plain_text_content_is_a_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let yaml = r#"
document:
  name: health
do:
  - ping:
      call: http
      with:
        endpoint: ${ input.base + '/health' }
      export:
        as: ${ result }
"#;
    let output = common::run(yaml, json!({"base": server.uri()})).await.unwrap();
    assert_eq!(output, json!("ok"));
}

// =============================================================================
// FAILURES AND RETRIES
// =============================================================================

const FLAKY: &str = r#"
document:
  name: flaky
do:
  - fetch:
      call: http
      with:
        endpoint: ${ input.base + '/flaky' }
"#;

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = common::run(FLAKY, json!({"base": server.uri()}))
        .await
        .unwrap_err();
    assert!(matches!(err, BraidError::HttpStatus { status: 404, .. }));
}

#[tokio::test]
async fn test_server_error_is_retried_until_attempts_run_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = common::run(FLAKY, json!({"base": server.uri()}))
        .await
        .unwrap_err();
    assert!(matches!(err, BraidError::HttpStatus { status: 503, .. }));
}

#[tokio::test]
async fn test_http_failure_is_catchable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let yaml = r#"
document:
  name: guarded_fetch
do:
  - guarded:
      try:
        - fetch:
            call: http
            with:
              endpoint: ${ input.base + '/missing' }
      catch:
        as: failure
        do:
          - fallback:
              set:
                status: ${ data.failure.status }
              export:
                as: ${ data.status }
      export:
        as: ${ result }
"#;
    let output = common::run(yaml, json!({"base": server.uri()})).await.unwrap();
    assert_eq!(output, json!(404));
}
