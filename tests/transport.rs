//! HTTP transport and key validation against a mock server.

use paper_comic::{
    ApiKeyStorage, ComicConfig, ComicError, CredentialSource, HttpTransport, KeyValidator,
    KeyValidity, Provider, Transport,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> HttpTransport {
    HttpTransport::new(Duration::from_secs(5)).unwrap()
}

// ── Transport ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn posts_json_with_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(header("x-title", "Comic"))
        .and(body_json(json!({ "hello": "world" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let body = transport()
        .post(
            &format!("{}/echo", server.uri()),
            &json!({ "hello": "world" }),
            &[("X-Title".to_string(), "Comic".to_string())],
        )
        .await
        .unwrap();
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn concatenated_json_body_uses_first_value() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":0}{"code":1}"#))
        .mount(&server)
        .await;

    let body = transport()
        .post(&server.uri(), &json!({}), &[])
        .await
        .unwrap();
    assert_eq!(body, json!({ "code": 0 }));
}

#[tokio::test]
async fn non_json_error_body_is_previewed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let err = transport()
        .post(&server.uri(), &json!({}), &[])
        .await
        .unwrap_err();
    match err {
        ComicError::Transport { message } => assert_eq!(message, "<html>Bad Gateway</html>"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn forbidden_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "message": "forbidden" })))
        .mount(&server)
        .await;

    let err = transport()
        .post(&server.uri(), &json!({}), &[])
        .await
        .unwrap_err();
    assert!(err.is_auth(), "got {err:?}");
}

#[tokio::test]
async fn unreachable_host_is_transport_error() {
    let err = transport()
        .post("http://127.0.0.1:9/chat/completions", &json!({}), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ComicError::Transport { .. }), "got {err:?}");
}

// ── Key validation and storage ───────────────────────────────────────────────

#[tokio::test]
async fn validator_checks_both_providers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("authorization", "Bearer good-or"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/client/common/getCredits"))
        .and(query_param("apikey", "good-crsai"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "data": { "credits": 10 } })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/client/common/getCredits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": -1, "msg": "bad key" })))
        .mount(&server)
        .await;

    let config = ComicConfig::builder()
        .openrouter_base_url(server.uri())
        .crsai_base_url(server.uri())
        .build()
        .unwrap();
    let validator = KeyValidator::new(&config).unwrap();

    assert_eq!(
        validator.validate("good-or", "good-crsai").await,
        KeyValidity { open_router: true, crsai: true }
    );
    assert_eq!(
        validator.validate("bad-or", "bad-crsai").await,
        KeyValidity { open_router: false, crsai: false }
    );
    assert!(!validator.validate_openrouter("").await);
}

#[tokio::test]
async fn stored_keys_round_trip_and_gate_on_validity() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("nested").join("keys.json");

    let store = ApiKeyStorage::new(
        "or-key".into(),
        "crsai-key".into(),
        KeyValidity { open_router: false, crsai: true },
    );
    store.save(&file).await.unwrap();

    let loaded = ApiKeyStorage::load(&file).await;
    assert_eq!(loaded, store);
    assert_eq!(loaded.active_provider(), Some(Provider::Crsai));
    assert_eq!(loaded.api_key(Provider::OpenRouter), None);
    assert_eq!(loaded.api_key(Provider::Crsai).as_deref(), Some("crsai-key"));

    ApiKeyStorage::clear(&file).await.unwrap();
    assert!(!ApiKeyStorage::load(&file).await.has_valid_key());
    ApiKeyStorage::clear(&file).await.unwrap();
}
