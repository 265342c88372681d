//! Bearer-token authentication by introspection.
//!
//! Tokens are never verified locally. Each protected request forwards its token
//! to the identity service's profile endpoint and trusts the user record that
//! comes back. Nothing is cached between requests.

use axum::extract::{ FromRef, FromRequestParts };
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use log::{ info, warn };
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::error::ApiError;

const PROFILE_PATH: &str = "/api/auth/profile";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no bearer token supplied")]
    MissingToken,

    #[error("authorization header is not '<scheme> <token>' with a Bearer scheme")]
    MalformedHeader,

    #[error("identity service answered with status {0}")]
    Rejected(u16),

    #[error("identity service response carries no data.user")]
    MissingUser,

    #[error("identity service call failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl AuthError {
    /// Text shown to the caller. Introspection details stay in the logs.
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "Authentication token is required",
            AuthError::MalformedHeader => "Invalid authorization header format",
            _ => "Invalid or expired token",
        }
    }
}

/// User record returned by the identity service, passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser(pub Value);

impl AuthUser {
    /// Email if present, else id, for request logs.
    pub fn label(&self) -> String {
        ["email", "id", "_id"]
            .iter()
            .find_map(|key| {
                self.0.get(*key).and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
            })
            .unwrap_or_else(|| "?".to_string())
    }
}

pub fn extract_bearer(headers: &HeaderMap) -> Result<String, AuthError> {
    let header = match headers.get(AUTHORIZATION) {
        Some(h) => h,
        None => return Err(AuthError::MissingToken),
    };
    let raw = header.to_str().map_err(|_| AuthError::MalformedHeader)?;

    let mut parts = raw.trim_start().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().ok_or(AuthError::MalformedHeader)?.trim();
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token.to_string())
}

pub struct AuthClient {
    http: HttpClient,
    profile_url: String,
}

impl AuthClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let base = Url::parse(base_url).map_err(|e|
            format!("Invalid AUTH_BACKEND_URL '{}': {}", base_url, e)
        )?;
        let profile_url = format!("{}{}", base.as_str().trim_end_matches('/'), PROFILE_PATH);
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self { http, profile_url })
    }

    pub fn profile_url(&self) -> &str {
        &self.profile_url
    }

    /// Resolves `token` to a user. Any non-200 answer, transport failure or
    /// timeout is an authentication failure.
    pub async fn introspect(&self, token: &str) -> Result<AuthUser, AuthError> {
        let resp = self.http.get(&self.profile_url).bearer_auth(token).send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            warn!("Auth verify failed: status={} body={}", status, body);
            return Err(AuthError::Rejected(status.as_u16()));
        }
        let body: Value = resp.json().await?;
        match body.get("data").and_then(|d| d.get("user")) {
            Some(user) if !user.is_null() => Ok(AuthUser(user.clone())),
            _ => Err(AuthError::MissingUser),
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let token = extract_bearer(headers)?;
        self.introspect(&token).await.map_err(|e| {
            warn!("Token verification error: {}", e);
            e
        })
    }
}

/// The authenticated caller. Taking this as a handler argument rejects the
/// request with 401 before the handler body runs.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

impl<S> FromRequestParts<S> for CurrentUser
    where Arc<AuthClient>: FromRef<S>, S: Send + Sync
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthClient>::from_ref(state);
        let user = auth.authenticate(&parts.headers).await?;
        info!("[REQ] {} {} user={}", parts.method, parts.uri.path(), user.label());
        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{ HeaderValue, StatusCode };
    use axum::{ routing::get, Json, Router };
    use serde_json::json;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    async fn spawn_identity_service() -> String {
        let app = Router::new().route(
            "/api/auth/profile",
            get(|headers: HeaderMap| async move {
                match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
                    Some("Bearer good") =>
                        (
                            StatusCode::OK,
                            Json(json!({"success": true, "data": {"user": {"id": "u1", "email": "a@b.c"}}})),
                        ),
                    Some("Bearer nouser") => (StatusCode::OK, Json(json!({"success": true, "data": {}}))),
                    _ => (StatusCode::UNAUTHORIZED, Json(json!({"success": false}))),
                }
            })
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn bearer_extraction() {
        assert!(matches!(extract_bearer(&HeaderMap::new()), Err(AuthError::MissingToken)));
        assert!(matches!(extract_bearer(&headers_with("Bearer")), Err(AuthError::MalformedHeader)));
        assert!(matches!(extract_bearer(&headers_with("Bearer ")), Err(AuthError::MissingToken)));
        assert!(matches!(extract_bearer(&headers_with("Basic abc")), Err(AuthError::MalformedHeader)));
        assert_eq!(extract_bearer(&headers_with("Bearer abc.def")).unwrap(), "abc.def");
        assert_eq!(extract_bearer(&headers_with("bearer xyz")).unwrap(), "xyz");
    }

    #[test]
    fn client_messages() {
        assert_eq!(AuthError::MissingToken.client_message(), "Authentication token is required");
        assert_eq!(AuthError::MalformedHeader.client_message(), "Invalid authorization header format");
        assert_eq!(AuthError::Rejected(401).client_message(), "Invalid or expired token");
        assert_eq!(AuthError::MissingUser.client_message(), "Invalid or expired token");
    }

    #[test]
    fn user_label_prefers_email() {
        assert_eq!(AuthUser(json!({"id": "u1", "email": "a@b.c"})).label(), "a@b.c");
        assert_eq!(AuthUser(json!({"id": 7})).label(), "7");
        assert_eq!(AuthUser(json!({})).label(), "?");
    }

    #[test]
    fn profile_url_is_joined_once() {
        let client = AuthClient::new("http://localhost:5001/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.profile_url(), "http://localhost:5001/api/auth/profile");
        assert!(AuthClient::new("not a url", Duration::from_secs(5)).is_err());
    }

    #[tokio::test]
    async fn introspection_outcomes() {
        let base = spawn_identity_service().await;
        let client = AuthClient::new(&base, Duration::from_secs(5)).unwrap();

        let user = client.introspect("good").await.unwrap();
        assert_eq!(user.0["id"], "u1");

        assert!(matches!(client.introspect("bad").await, Err(AuthError::Rejected(401))));
        assert!(matches!(client.introspect("nouser").await, Err(AuthError::MissingUser)));
    }

    #[tokio::test]
    async fn unreachable_service_is_auth_failure() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = AuthClient::new(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
        let err = client.authenticate(&headers_with("Bearer good")).await.unwrap_err();
        assert!(matches!(err, AuthError::Transport(_)));
        assert_eq!(err.client_message(), "Invalid or expired token");
    }

    #[tokio::test]
    async fn slow_service_times_out_as_auth_failure() {
        let app = Router::new().route(
            "/api/auth/profile",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({"success": true, "data": {"user": {"id": "u1"}}}))
            })
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = AuthClient::new(
            &format!("http://{}", addr),
            Duration::from_millis(500)
        ).unwrap();
        let err = client.authenticate(&headers_with("Bearer good")).await.unwrap_err();
        match &err {
            AuthError::Transport(e) => assert!(e.is_timeout()),
            other => panic!("expected a timeout, got {:?}", other),
        }
        assert_eq!(err.client_message(), "Invalid or expired token");
    }
}
