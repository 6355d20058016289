//! OceanStor REST Session
//!
//! Owns one authenticated session against an array: login, token and
//! cookie storage, base-URL derivation and JSON marshalling.

use crate::array::envelope::{Envelope, SessionRecord, ERROR_CONNECT_TO_SERVER};
use crate::domain::ports::{ArrayRequest, ArrayTransport, HttpVerb};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION, CONTENT_TYPE};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// Constants
// =============================================================================

/// Timeout for everything except login
pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(52);
/// Timeout for the login exchange
pub const LOGIN_SOCKET_TIMEOUT: Duration = Duration::from_secs(4);

const TOKEN_HEADER: &str = "iBaseToken";

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings for one array
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// REST root, e.g. `https://10.0.0.1:8088/deviceManager/rest/`
    pub rest_url: String,
    pub username: String,
    pub password: String,
    pub login_timeout: Duration,
    pub call_timeout: Duration,
    /// Arrays ship self-signed certificates by default
    pub accept_invalid_certs: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rest_url: String::new(),
            username: String::new(),
            password: String::new(),
            login_timeout: LOGIN_SOCKET_TIMEOUT,
            call_timeout: SOCKET_TIMEOUT,
            accept_invalid_certs: true,
        }
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone)]
struct SessionState {
    device_id: String,
    base_url: String,
    token: String,
}

/// Authenticated session against one array
pub struct RestSession {
    config: SessionConfig,
    client: reqwest::Client,
    state: RwLock<Option<SessionState>>,
}

impl RestSession {
    /// Create a session; no network traffic happens until [`login`](Self::login)
    pub fn new(config: SessionConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            config,
            client,
            state: RwLock::new(None),
        })
    }

    /// Exchange credentials for a device ID and token
    pub async fn login(&self) -> Result<String> {
        let url = format!("{}xx/sessions", self.config.rest_url);
        let body = json!({
            "username": self.config.username,
            "password": self.config.password,
            "scope": "0",
        });

        *self.state.write() = None;

        let envelope = self
            .do_call(&url, HttpVerb::Post, Some(&body), None, self.config.login_timeout)
            .await?;

        let session = self.login_record(envelope)?;
        let base_url = format!("{}{}", self.config.rest_url, session.device_id);

        info!("Login success: {}", self.config.rest_url);

        *self.state.write() = Some(SessionState {
            device_id: session.device_id.clone(),
            base_url,
            token: session.token,
        });

        Ok(session.device_id)
    }

    /// Split a login response into connectivity failures, credential
    /// rejections and the session record
    fn login_record(&self, envelope: Envelope) -> Result<SessionRecord> {
        if envelope.error.code == ERROR_CONNECT_TO_SERVER {
            warn!(
                "Login to {} failed, array unreachable: {}",
                self.config.rest_url, envelope.error.description
            );
            return Err(Error::Connectivity {
                reason: envelope.error.description,
            });
        }

        if !envelope.is_success() || envelope.data.is_none() {
            warn!(
                "Login to {} rejected: code {}, {}",
                self.config.rest_url, envelope.error.code, envelope.error.description
            );
            return Err(Error::Authentication(format!(
                "code {}: {}",
                envelope.error.code, envelope.error.description
            )));
        }

        envelope.into_data("login")
    }

    /// End the session, if one is open
    pub async fn logout(&self) -> Result<()> {
        if self.state.read().is_none() {
            return Ok(());
        }

        let result = self
            .send(ArrayRequest {
                verb: HttpVerb::Delete,
                path: "/sessions".to_string(),
                body: None,
            })
            .await;
        // The token is dead either way.
        *self.state.write() = None;
        result?.assert_success("logout session")
    }

    /// Device ID of the current session
    pub fn device_id(&self) -> Option<String> {
        self.state.read().as_ref().map(|s| s.device_id.clone())
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.read().is_some()
    }

    async fn do_call(
        &self,
        url: &str,
        verb: HttpVerb,
        body: Option<&Value>,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Envelope> {
        let mut request = match verb {
            HttpVerb::Get => self.client.get(url),
            HttpVerb::Post => self.client.post(url),
            HttpVerb::Put => self.client.put(url),
            HttpVerb::Delete => self.client.delete(url),
        }
        .timeout(timeout);

        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        if url.ends_with("xx/sessions") {
            debug!("Request URL: {} ({})", url, verb);
        } else {
            debug!("Request URL: {} ({}), data: {:?}", url, verb, body);
        }

        let text = match request.send().await {
            Ok(response) => match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Bad response from server: {}. Error: {}", url, e);
                    return Ok(Envelope::unreachable(format!("Connect to server error: {}", e)));
                }
            },
            Err(e) => {
                warn!("Bad response from server: {}. Error: {}", url, e);
                return Ok(Envelope::unreachable(format!("Connect to server error: {}", e)));
            }
        };

        if !url.ends_with("xx/sessions") {
            debug!("Response data: {}", text);
        }

        serde_json::from_str(&text).map_err(|e| {
            warn!("JSON transfer error for {}: {}", url, e);
            Error::JsonParse(e)
        })
    }
}

#[async_trait]
impl ArrayTransport for RestSession {
    async fn send(&self, request: ArrayRequest) -> Result<Envelope> {
        let state = self
            .state
            .read()
            .clone()
            .ok_or_else(|| Error::Authentication("no active session".to_string()))?;

        let url = format!("{}{}", state.base_url, request.path);
        self.do_call(
            &url,
            request.verb,
            request.body.as_ref(),
            Some(&state.token),
            self.config.call_timeout,
        )
        .await
    }
}
