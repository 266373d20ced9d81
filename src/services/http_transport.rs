// src/services/http_transport.rs
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use super::session_manager::{ChatSession, HttpMethod, KeyValue};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("endpoint answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid header {0:?}")]
    InvalidHeader(String),
}

/// Echo of exactly what went over the wire, kept for debugging.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SentRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HttpExchange {
    pub request: SentRequest,
    pub response: Value,
    pub extracted: String,
}

/// `Cookie` header value from every pair with both a name and a value.
pub fn cookie_header(cookies: &[KeyValue]) -> Option<String> {
    let pairs: Vec<String> = cookies
        .iter()
        .filter(|c| !c.key.is_empty() && !c.value.is_empty())
        .map(|c| format!("{}={}", c.key, c.value))
        .collect();
    (!pairs.is_empty()).then(|| pairs.join("; "))
}

/// Content type first, then user headers (later entries win), then cookies.
pub fn merged_headers(session: &ChatSession) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = vec![(CONTENT_TYPE.as_str().to_string(), "application/json".to_string())];
    let mut set = |key: &str, value: &str| {
        match merged.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(entry) => entry.1 = value.to_string(),
            None => merged.push((key.to_string(), value.to_string())),
        }
    };
    for header in session.config.headers.iter().filter(|h| !h.key.is_empty()) {
        set(&header.key, &header.value);
    }
    if let Some(cookie) = cookie_header(&session.config.cookies) {
        set(COOKIE.as_str(), &cookie);
    }
    merged
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Runs one request/response cycle for `message` against the session endpoint.
    pub async fn send(&self, session: &ChatSession, message: &str) -> Result<HttpExchange, TransportError> {
        let config = &session.config;
        let body = config.request_body.materialize(message);
        let headers = merged_headers(session);

        let mut header_map = HeaderMap::new();
        for (key, value) in &headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| TransportError::InvalidHeader(key.clone()))?;
            let value = HeaderValue::from_str(value).map_err(|_| TransportError::InvalidHeader(key.clone()))?;
            header_map.insert(name, value);
        }

        let mut builder = self.client.request(config.method.into(), &config.url).headers(header_map);
        let sent_body = if config.method == HttpMethod::Get {
            None
        } else {
            builder = builder.body(serde_json::to_vec(&body)?);
            Some(body)
        };

        tracing::debug!(session_id = %session.id, url = %config.url, method = config.method.as_str(), "sending request");
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status { status: status.as_u16(), body: text });
        }

        let data: Value = serde_json::from_str(&text)?;
        let extracted = config.response_body_mapping.extract(&data);
        tracing::debug!(session_id = %session.id, status = status.as_u16(), "response received");

        Ok(HttpExchange {
            request: SentRequest { url: config.url.clone(), method: config.method, headers, body: sent_body },
            response: data,
            extracted,
        })
    }
}
