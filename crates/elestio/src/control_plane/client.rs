use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::endpoints::LOGIN_PATH;
use super::envelope::{inspect_status, response_message, StatusCheck};
use super::{ControlPlane, Endpoint, Method};
use crate::error::{ElestioError, Result};

const LOGIN_ENDPOINT_NAME: &str = "auth.check_api_token";
const LOG_EXCERPT_CHARS: usize = 160;

/// reqwest-backed control-plane client holding the session JWT in memory.
pub struct HttpControlPlane {
    http: reqwest::Client,
    base_url: String,
    email: String,
    api_token: String,
    jwt: Mutex<Option<String>>,
}

impl fmt::Debug for HttpControlPlane {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpControlPlane")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &"***")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    jwt: Option<String>,
}

enum Attempt {
    Done(Value),
    AuthRejected(String),
}

impl HttpControlPlane {
    #[must_use]
    pub fn new(base_url: &str, email: &str, api_token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
            api_token: api_token.to_string(),
            jwt: Mutex::new(None),
        }
    }

    async fn session_token(&self) -> Result<String> {
        if let Some(jwt) = self.jwt.lock().await.clone() {
            return Ok(jwt);
        }
        self.authenticate().await
    }

    async fn authenticate(&self) -> Result<String> {
        let url = format!("{}{LOGIN_PATH}", self.base_url);
        let response = self
            .http
            .post(url)
            .json(&json!({ "email": self.email, "token": self.api_token }))
            .send()
            .await
            .map_err(|error| ElestioError::remote_call(LOGIN_ENDPOINT_NAME, error.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ElestioError::remote_call(
                LOGIN_ENDPOINT_NAME,
                format!("HTTP {status}: {}", log_excerpt(&text)),
            ));
        }

        let value = parse_body(LOGIN_ENDPOINT_NAME, &text)?;
        if let StatusCheck::AuthRejected(message) | StatusCheck::Failed(message) =
            inspect_status(&value)
        {
            return Err(ElestioError::remote_call(LOGIN_ENDPOINT_NAME, message));
        }

        let jwt = serde_json::from_value::<LoginResponse>(value)
            .ok()
            .and_then(|login| login.jwt)
            .filter(|jwt| !jwt.trim().is_empty())
            .ok_or_else(|| {
                ElestioError::remote_call(LOGIN_ENDPOINT_NAME, "response did not include a jwt")
            })?;

        *self.jwt.lock().await = Some(jwt.clone());
        debug!("control-plane session established");
        Ok(jwt)
    }

    async fn send(
        &self,
        endpoint: Endpoint,
        method: Method,
        body: &Value,
        jwt: &str,
    ) -> Result<Attempt> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        debug!(
            endpoint = endpoint.name(),
            body = %log_excerpt(&body.to_string()),
            "control-plane request"
        );

        let request = match method {
            Method::Post => self.http.post(url).json(&with_jwt(body, jwt)),
            Method::Get => self.http.get(url).query(&query_pairs(body, jwt)),
        };

        let response = request
            .send()
            .await
            .map_err(|error| ElestioError::remote_call(endpoint.name(), error.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .as_ref()
                .and_then(response_message)
                .unwrap_or_else(|| "unauthorized".to_string());
            return Ok(Attempt::AuthRejected(message));
        }

        if !status.is_success() {
            return Err(ElestioError::remote_call(
                endpoint.name(),
                format!("HTTP {status}: {}", log_excerpt(&text)),
            ));
        }

        let value = parse_body(endpoint.name(), &text)?;
        match inspect_status(&value) {
            StatusCheck::Ok => Ok(Attempt::Done(value)),
            StatusCheck::AuthRejected(message) => Ok(Attempt::AuthRejected(message)),
            StatusCheck::Failed(message) => Err(ElestioError::remote_call(endpoint.name(), message)),
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn call(&self, endpoint: Endpoint, method: Method, body: Value) -> Result<Value> {
        let jwt = self.session_token().await?;
        match self.send(endpoint, method, &body, &jwt).await? {
            Attempt::Done(value) => Ok(value),
            Attempt::AuthRejected(reason) => {
                info!(
                    endpoint = endpoint.name(),
                    %reason,
                    "session rejected, re-authenticating once"
                );
                let jwt = self.authenticate().await?;
                match self.send(endpoint, method, &body, &jwt).await? {
                    Attempt::Done(value) => Ok(value),
                    Attempt::AuthRejected(message) => {
                        Err(ElestioError::remote_call(endpoint.name(), message))
                    }
                }
            }
        }
    }
}

fn parse_body(endpoint: &str, text: &str) -> Result<Value> {
    serde_json::from_str::<Value>(text).map_err(|error| {
        ElestioError::remote_call(
            endpoint,
            format!("malformed response body ({error}): {}", log_excerpt(text)),
        )
    })
}

fn with_jwt(body: &Value, jwt: &str) -> Value {
    let mut object = match body {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    object.insert("jwt".to_string(), Value::String(jwt.to_string()));
    Value::Object(object)
}

fn query_pairs(body: &Value, jwt: &str) -> Vec<(String, String)> {
    let mut pairs = body
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(key, value)| {
                    let rendered = match value {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), rendered)
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    pairs.push(("jwt".to_string(), jwt.to_string()));
    pairs
}

/// Collapses a body onto one line and cuts it at [`LOG_EXCERPT_CHARS`]
/// characters for logs and error messages.
fn log_excerpt(text: &str) -> String {
    let mut words = text.split_whitespace().peekable();
    if words.peek().is_none() {
        return "<empty>".to_string();
    }

    let collapsed = words.collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(LOG_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &collapsed[..cut]),
        None => collapsed,
    }
}
