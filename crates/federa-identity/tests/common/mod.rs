//! Mock Google endpoints shared by the integration tests
#![allow(dead_code)]

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use federa_identity::{ConnectorConfig, ServiceAccountKey};

pub const CLIENT_ID: &str = "client-123";
pub const REDIRECT_URI: &str = "https://dex.example.com/callback";
pub const SIGNING_KID: &str = "test-key-1";
pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");
pub const JWKS_JSON: &str = include_str!("../fixtures/jwks.json");

/// Connector settings pointing at the mock issuer
pub fn config_for(server: &MockServer) -> ConnectorConfig {
    ConnectorConfig {
        client_id: CLIENT_ID.to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: REDIRECT_URI.to_string(),
        issuer_url: server.uri(),
        ..Default::default()
    }
}

/// Serve the discovery document for `server` as issuer
pub async fn mount_discovery(server: &MockServer) {
    mount_discovery_with_issuer(server, &server.uri()).await;
}

pub async fn mount_discovery_with_issuer(server: &MockServer, issuer: &str) {
    mount_discovery_document(server, issuer, &["RS256"]).await;
}

/// Discovery document advertising `algs` as ID token signing algorithms
pub async fn mount_discovery_document(server: &MockServer, issuer: &str, algs: &[&str]) {
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{}/o/oauth2/v2/auth", base),
            "token_endpoint": format!("{}/token", base),
            "userinfo_endpoint": format!("{}/userinfo", base),
            "jwks_uri": format!("{}/oauth2/v3/certs", base),
            "id_token_signing_alg_values_supported": algs
        })))
        .mount(server)
        .await;
}

pub async fn mount_jwks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/oauth2/v3/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(JWKS_JSON, "application/json"))
        .mount(server)
        .await;
}

/// Token endpoint answering with `id_token`
pub async fn mount_token_success(server: &MockServer, id_token: &str, refresh_token: Option<&str>) {
    let mut body = json!({
        "access_token": "ya29.mock_google_access_token",
        "token_type": "Bearer",
        "expires_in": 3599,
        "scope": "openid profile email",
        "id_token": id_token
    });
    if let Some(refresh_token) = refresh_token {
        body["refresh_token"] = json!(refresh_token);
    }

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_token_error(server: &MockServer, error: &str, description: &str, status: u16) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "error": error,
            "error_description": description
        })))
        .mount(server)
        .await;
}

/// Claims of a valid ID token for alice issued by `issuer`
pub fn alice_claims(issuer: &str, hosted_domain: &str) -> serde_json::Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "iss": issuer,
        "aud": CLIENT_ID,
        "sub": "110169484474386276334",
        "iat": now,
        "exp": now + 600,
        "name": "Alice",
        "email": "alice@example.com",
        "email_verified": true,
        "hd": hosted_domain
    })
}

/// Sign `claims` with the fixture key
pub fn sign_id_token(claims: &serde_json::Value) -> String {
    sign_id_token_with_kid(claims, SIGNING_KID)
}

pub fn sign_id_token_with_kid(claims: &serde_json::Value, kid: &str) -> String {
    sign_id_token_with(claims, kid, Algorithm::RS256)
}

pub fn sign_id_token_with(claims: &serde_json::Value, kid: &str, alg: Algorithm) -> String {
    let mut header = Header::new(alg);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(SIGNING_KEY_PEM.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// Service account key whose token URI points at `server`
pub fn service_account_key(server: &MockServer) -> ServiceAccountKey {
    let json = json!({
        "type": "service_account",
        "client_email": "federa@project.iam.gserviceaccount.com",
        "private_key": SIGNING_KEY_PEM,
        "private_key_id": SIGNING_KID,
        "token_uri": format!("{}/sa/token", server.uri())
    });
    ServiceAccountKey::from_json(json.to_string().as_bytes()).unwrap()
}

/// Service account token endpoint handing out `sa-access-token`
pub async fn mount_service_account_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/sa/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sa-access-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}
