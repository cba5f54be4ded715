//! Authenticated transport for the backend API.
//!
//! Every outbound request reads the current credential from the persisted
//! store at dispatch time and carries it as a bearer authorization header;
//! a 401 on any response tears the session down before the error reaches
//! the caller. All other statuses pass through unmodified.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::auth::session::SessionShared;
use crate::config::Config;
use crate::models::Profile;

use super::ApiError;

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Profile lookup route on the identity provider
const PROFILE_PATH: &str = "/users/me/";

/// Authenticated API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<SessionShared>,
}

impl ApiClient {
    pub(crate) fn new(config: &Config, session: Arc<SessionShared>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            session,
        })
    }

    /// Bearer authorization for the current credential, if one is persisted.
    ///
    /// Read from the store on every call rather than captured at client
    /// construction: requests may be issued long after the credential
    /// changed.
    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = self.session.credential() {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check a response, treating a 401 as the invalidation signal: the
    /// session is torn down, then the caller still observes the failure.
    async fn check_response(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            debug!("401 received; invalidating session");
            self.session.invalidate();
        }
        Err(ApiError::from_status(status, &body))
    }

    /// GET a JSON resource from the backend.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .await
            .with_context(|| format!("Failed to send GET request to {}", url))?;

        let response = self.check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    /// POST a JSON body to the backend and parse the JSON response.
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send POST request to {}", url))?;

        let response = self.check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    /// Resolve the current credential to a user profile.
    pub async fn fetch_profile(&self) -> Result<Profile> {
        self.get(PROFILE_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::auth::{SessionStore, TokenStore};
    use crate::coordinator::SessionEvent;

    fn open_transport(
        server: &MockServer,
        dir: &TempDir,
    ) -> (
        SessionStore,
        ApiClient,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let config = Config::new(server.uri(), dir.path());
        let (session, events) = SessionStore::open(&config).expect("open session store");
        let api = session.transport();
        (session, api, events)
    }

    fn seed_credential(dir: &TempDir, token: &str) {
        let store = TokenStore::open(dir.path().to_path_buf()).expect("open token store");
        store.set(token).expect("seed credential");
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn attaches_bearer_header_from_persisted_credential() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        seed_credential(&dir, "tok-1");
        let (_session, api, _events) = open_transport(&server, &dir);

        Mock::given(method("GET"))
            .and(path("/widgets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let _: serde_json::Value = api.get("/widgets").await.expect("request");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0]
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok()),
            Some("Bearer tok-1")
        );
        assert_eq!(
            requests[0]
                .headers
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn dispatches_unauthenticated_without_credential() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let (_session, api, _events) = open_transport(&server, &dir);

        Mock::given(method("GET"))
            .and(path("/widgets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let _: serde_json::Value = api.get("/widgets").await.expect("request");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn posts_json_bodies_with_credential() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        seed_credential(&dir, "tok-1");
        let (_session, api, _events) = open_transport(&server, &dir);

        Mock::given(method("POST"))
            .and(path("/chats"))
            .and(body_json(serde_json::json!({"title": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let reply: serde_json::Value = api
            .post("/chats", &serde_json::json!({"title": "hello"}))
            .await
            .expect("request");
        assert_eq!(reply["ok"], true);
    }

    #[tokio::test]
    async fn non_401_failures_pass_through_without_teardown() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        seed_credential(&dir, "tok-1");
        let (session, api, mut events) = open_transport(&server, &dir);

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such thing"))
            .mount(&server)
            .await;

        let err = api
            .get::<serde_json::Value>("/missing")
            .await
            .expect_err("must fail");
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::NotFound(_))
        ));

        // the session is untouched
        assert_eq!(session.current_state().credential, None); // not yet initialized
        let store = TokenStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.get().as_deref(), Some("tok-1"));
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn concurrent_unauthorized_responses_tear_down_once() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        seed_credential(&dir, "tok-1");
        let (session, api, mut events) = open_transport(&server, &dir);

        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(
                ResponseTemplate::new(401).set_delay(std::time::Duration::from_millis(100)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(
                ResponseTemplate::new(401).set_delay(std::time::Duration::from_millis(100)),
            )
            .mount(&server)
            .await;

        let (ra, rb) = tokio::join!(
            api.get::<serde_json::Value>("/a"),
            api.get::<serde_json::Value>("/b")
        );
        assert!(ra.is_err());
        assert!(rb.is_err());

        // both callers observed the failure, but teardown ran once
        assert_eq!(drain(&mut events), vec![SessionEvent::Invalidated]);
        let store = TokenStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.get(), None);
        let _ = session;
    }

    #[tokio::test]
    async fn credential_is_read_at_dispatch_time() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let (session, api, _events) = open_transport(&server, &dir);

        Mock::given(method("GET"))
            .and(path("/users/me/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "1", "username": "bob", "email": "b@x.com"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/widgets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        // `api` was cloned before any credential existed
        session.initialize().await;
        session.login("late-tok").await.expect("login");

        let _: serde_json::Value = api.get("/widgets").await.expect("request");

        let requests = server.received_requests().await.unwrap();
        let widget_req = requests
            .iter()
            .find(|r| r.url.path() == "/widgets")
            .expect("widgets request");
        assert_eq!(
            widget_req
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok()),
            Some("Bearer late-tok")
        );
    }
}
