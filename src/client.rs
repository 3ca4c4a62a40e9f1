//! Graylog REST client: one authenticated HTTP call per operation, status codes
//! classified into `GraylogMcpError` variants. No retries.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::GraylogConfig;
use crate::error::{GraylogMcpError, Result};
use crate::model::{AggregationParams, BackendRange, SearchParams};

pub const SEARCH_RELATIVE_PATH: &str = "/api/search/universal/relative";
pub const SEARCH_ABSOLUTE_PATH: &str = "/api/search/universal/absolute";
pub const STREAMS_PATH: &str = "/api/streams";
pub const SYSTEM_PATH: &str = "/api/system";

/// A fully shaped backend call, built from validated parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl BackendRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn search(params: &SearchParams) -> Self {
        let mut query: Vec<(String, String)> = vec![("query".into(), params.query.clone())];
        let path = match &params.range {
            BackendRange::Relative { seconds } => {
                query.push(("range".into(), seconds.to_string()));
                SEARCH_RELATIVE_PATH
            }
            BackendRange::Absolute { from, to } => {
                query.push(("from".into(), from.clone()));
                query.push(("to".into(), to.clone().unwrap_or_else(now_timestamp)));
                SEARCH_ABSOLUTE_PATH
            }
        };
        query.push(("limit".into(), params.limit.to_string()));
        query.push(("offset".into(), params.offset.to_string()));
        if let Some((field, direction)) = &params.sort {
            query.push(("sort".into(), format!("{field}:{}", direction.as_str())));
        }
        if !params.fields.is_empty() {
            query.push(("fields".into(), params.fields.join(",")));
        }
        if let Some(stream_id) = &params.stream_id {
            query.push(("streams".into(), stream_id.clone()));
        }
        if let Some(decorate) = params.decorate {
            query.push(("decorate".into(), decorate.to_string()));
        }
        if let Some(filter) = &params.filter {
            query.push(("filter".into(), filter.clone()));
        }
        if let Some(highlight) = params.highlight {
            query.push(("highlight".into(), highlight.to_string()));
        }

        Self {
            method: Method::GET,
            path: path.to_string(),
            query,
            body: None,
        }
    }

    pub fn aggregation(params: &AggregationParams) -> Self {
        let mut body = json!({
            "query": params.query,
            "field": params.field,
            "size": params.size,
        });
        let base = match &params.range {
            BackendRange::Relative { seconds } => {
                body["range"] = json!(seconds);
                SEARCH_RELATIVE_PATH
            }
            BackendRange::Absolute { from, to } => {
                body["from"] = json!(from);
                body["to"] = json!(to.clone().unwrap_or_else(now_timestamp));
                SEARCH_ABSOLUTE_PATH
            }
        };
        if let Some(interval) = &params.interval {
            body["interval"] = json!(interval);
        }

        Self {
            method: Method::POST,
            path: format!("{base}/{}", params.kind.as_str()),
            query: Vec::new(),
            body: Some(body),
        }
    }
}

// open-ended absolute ranges end at the time of the call
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Clone)]
pub struct GraylogClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    timeout_secs: u64,
}

impl GraylogClient {
    pub fn new(config: &GraylogConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .user_agent(concat!("graylog-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GraylogMcpError::ConfigError(format!("cannot build http client: {e}")))?;
        if !config.verify_ssl {
            warn!(endpoint = %config.endpoint, "TLS certificate verification disabled");
        }
        Ok(Self {
            http,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    pub async fn execute(&self, request: &BackendRequest) -> Result<Value> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = %request.method, path = %request.path, params = ?request.query, "graylog request");

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .basic_auth(&self.username, Some(&self.password))
            .header(ACCEPT, "application/json")
            // Graylog rejects state-changing verbs without it
            .header("X-Requested-By", "graylog-mcp");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!(status = status.as_u16(), bytes = text.len(), "graylog response");

        if !status.is_success() {
            let err = classify_status(status, &text);
            warn!(status = status.as_u16(), path = %request.path, error = %err, "graylog request failed");
            return Err(err);
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| GraylogMcpError::ServerError {
            status: status.as_u16(),
            message: format!("invalid JSON in backend response: {e}"),
        })
    }

    pub async fn search(&self, params: &SearchParams) -> Result<Value> {
        self.execute(&BackendRequest::search(params)).await
    }

    pub async fn aggregate(&self, params: &AggregationParams) -> Result<Value> {
        self.execute(&BackendRequest::aggregation(params)).await
    }

    pub async fn list_streams(&self) -> Result<Vec<Value>> {
        let response = self.execute(&BackendRequest::get(STREAMS_PATH)).await?;
        Ok(match response.get("streams") {
            Some(Value::Array(streams)) => streams.clone(),
            _ => Vec::new(),
        })
    }

    pub async fn stream(&self, stream_id: &str) -> Result<Value> {
        let path = format!("{STREAMS_PATH}/{}", urlencoding::encode(stream_id));
        self.execute(&BackendRequest::get(path)).await
    }

    pub async fn system_info(&self) -> Result<Value> {
        self.execute(&BackendRequest::get(SYSTEM_PATH)).await
    }

    fn transport_error(&self, e: reqwest::Error) -> GraylogMcpError {
        if e.is_timeout() {
            GraylogMcpError::TimeoutError(format!(
                "no response from {} within {}s",
                self.base_url, self.timeout_secs
            ))
        } else {
            GraylogMcpError::ConnectionError(error_chain(&e))
        }
    }
}

/// 把非 2xx 状态码映射为错误类型；401 单独归为认证失败。
pub fn classify_status(status: StatusCode, body: &str) -> GraylogMcpError {
    let message = backend_message(status, body);
    if status == StatusCode::UNAUTHORIZED {
        GraylogMcpError::AuthenticationError(message)
    } else if status.is_client_error() {
        GraylogMcpError::ClientError {
            status: status.as_u16(),
            message,
        }
    } else {
        GraylogMcpError::ServerError {
            status: status.as_u16(),
            message,
        }
    }
}

fn backend_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) {
        if let Some(Value::String(msg)) = obj.get("message") {
            return msg.clone();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
