//! Admin Directory client tests against a mock API

mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use federa_identity::providers::HttpClient;
use federa_identity::{
    AdminDirectoryClient, DirectoryClient, DirectoryClientFactory, FederaError,
    ServiceAccountFactory, ServiceAccountKey,
};

const GROUPS_PATH: &str = "/admin/directory/v1/groups";

fn client(server: &MockServer, subject: Option<&str>) -> AdminDirectoryClient {
    AdminDirectoryClient::new(
        Arc::new(service_account_key(server)),
        subject.map(String::from),
        server.uri(),
        HttpClient::new(5).unwrap(),
    )
}

// =============================================================================
// Credentials
// =============================================================================

#[test]
fn test_rejects_non_service_account_credentials() {
    let json = json!({
        "type": "authorized_user",
        "client_email": "someone@example.com",
        "private_key": "unused"
    });

    let err = ServiceAccountKey::from_json(json.to_string().as_bytes()).unwrap_err();
    assert!(matches!(err, FederaError::CredentialsError { .. }));
}

#[test]
fn test_missing_key_file() {
    let err = ServiceAccountKey::from_file("/nonexistent/federa/key.json").unwrap_err();
    assert!(err.to_string().contains("error reading credentials"));
}

#[test]
fn test_token_uri_defaults_to_google() {
    let json = json!({
        "type": "service_account",
        "client_email": "federa@project.iam.gserviceaccount.com",
        "private_key": SIGNING_KEY_PEM
    });

    let key = ServiceAccountKey::from_json(json.to_string().as_bytes()).unwrap();
    assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
}

// =============================================================================
// Group Listing
// =============================================================================

#[tokio::test]
async fn test_list_groups_with_delegated_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sa/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .and(body_string_contains("assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sa-access-token",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(GROUPS_PATH))
        .and(query_param("userKey", "alice@example.com"))
        .and(header("authorization", "Bearer sa-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "admin#directory#groups",
            "groups": [
                { "id": "01", "email": "eng@example.com", "name": "Engineering" },
                { "id": "02", "email": "all@example.com", "name": "Everyone" }
            ]
        })))
        .mount(&server)
        .await;

    let client = client(&server, Some("admin@example.com"));

    let page = client.list_groups("alice@example.com", None).await.unwrap();
    assert_eq!(page.groups, vec!["eng@example.com", "all@example.com"]);
    assert_eq!(page.next_token(), None);

    // Second call reuses the cached access token
    client.list_groups("alice@example.com", None).await.unwrap();
}

#[tokio::test]
async fn test_list_groups_follows_page_token() {
    let server = MockServer::start().await;
    mount_service_account_token(&server).await;

    Mock::given(method("GET"))
        .and(path(GROUPS_PATH))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "groups": [{ "email": "late@example.com" }]
        })))
        .mount(&server)
        .await;

    let client = client(&server, Some("admin@example.com"));
    let page = client
        .list_groups("alice@example.com", Some("page-2"))
        .await
        .unwrap();

    assert_eq!(page.groups, vec!["late@example.com"]);
}

#[tokio::test]
async fn test_list_groups_reports_next_page() {
    let server = MockServer::start().await;
    mount_service_account_token(&server).await;

    Mock::given(method("GET"))
        .and(path(GROUPS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "groups": [{ "email": "eng@example.com" }],
            "nextPageToken": "page-2"
        })))
        .mount(&server)
        .await;

    let page = client(&server, None)
        .list_groups("alice@example.com", None)
        .await
        .unwrap();

    assert_eq!(page.next_token(), Some("page-2"));
}

#[tokio::test]
async fn test_member_without_groups() {
    let server = MockServer::start().await;
    mount_service_account_token(&server).await;

    Mock::given(method("GET"))
        .and(path(GROUPS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "kind": "admin#directory#groups" })),
        )
        .mount(&server)
        .await;

    let page = client(&server, None)
        .list_groups("loner@example.com", None)
        .await
        .unwrap();

    assert!(page.groups.is_empty());
}

#[tokio::test]
async fn test_api_error_names_member() {
    let server = MockServer::start().await;
    mount_service_account_token(&server).await;

    Mock::given(method("GET"))
        .and(path(GROUPS_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("Not Authorized to access this resource/api"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, Some("admin@example.com"))
        .list_groups("alice@example.com", None)
        .await
        .unwrap_err();

    match err {
        FederaError::DirectoryQueryFailed { member, message } => {
            assert_eq!(member, "alice@example.com");
            assert!(message.contains("403"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_token_failure_is_a_query_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sa/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "unauthorized_client"
        })))
        .mount(&server)
        .await;

    let err = client(&server, Some("admin@example.com"))
        .list_groups("alice@example.com", None)
        .await
        .unwrap_err();

    assert!(matches!(err, FederaError::DirectoryQueryFailed { .. }));
}

// =============================================================================
// Factory
// =============================================================================

#[tokio::test]
async fn test_factory_clients_target_base_url() {
    let server = MockServer::start().await;
    mount_service_account_token(&server).await;

    Mock::given(method("GET"))
        .and(path(GROUPS_PATH))
        .and(query_param("userKey", "bob@example.org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "groups": [{ "email": "ops@example.org" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let factory = ServiceAccountFactory::new(service_account_key(&server))
        .unwrap()
        .with_base_url(server.uri());
    let client = factory.create("admin@example.org").await.unwrap();

    let page = client.list_groups("bob@example.org", None).await.unwrap();
    assert_eq!(page.groups, vec!["ops@example.org"]);
}
