use serde_json::{json, Value};
use thiserror::Error;

use crate::validator::Bounds;

pub type Result<T> = std::result::Result<T, GraylogMcpError>;

/// 参数校验失败。发生在任何后端调用之前。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("invalid time range `{0}`: expected <int><m|h|d|w> (e.g. 1h, 24h, 7d) or ISO-8601 timestamps")]
    InvalidTimeRange(String),

    #[error("{field} must be {bounds}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        bounds: Bounds,
    },

    #[error("unknown aggregation type `{0}` (expected one of: terms, date_histogram, cardinality, stats, min, max, avg, sum)")]
    UnknownAggregation(String),

    #[error("interval is required for date_histogram aggregations")]
    MissingInterval,

    #[error("{field} must be one of {expected}, got `{value}`")]
    InvalidEnum {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{0} is required")]
    MissingField(&'static str),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::EmptyQuery => "EmptyQuery",
            ValidationError::InvalidTimeRange(_) => "InvalidTimeRange",
            ValidationError::OutOfRange { .. } => "OutOfRange",
            ValidationError::UnknownAggregation(_) => "UnknownAggregation",
            ValidationError::MissingInterval => "MissingInterval",
            ValidationError::InvalidEnum { .. } => "InvalidEnum",
            ValidationError::MissingField(_) => "MissingField",
        }
    }
}

#[derive(Debug, Error)]
pub enum GraylogMcpError {
    #[error("validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("invalid arguments: {0}")]
    InvalidRequest(String),

    #[error("authentication failed (401), check username and password: {0}")]
    AuthenticationError(String),

    #[error("backend rejected request ({status}): {message}")]
    ClientError { status: u16, message: String },

    #[error("backend server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("cannot reach backend: {0}")]
    ConnectionError(String),

    #[error("backend request timed out: {0}")]
    TimeoutError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GraylogMcpError {
    /// 错误分类名，对应工具输出中的 `kind` 字段。
    pub fn kind(&self) -> &'static str {
        match self {
            GraylogMcpError::ValidationError(_) | GraylogMcpError::InvalidRequest(_) => {
                "ValidationError"
            }
            GraylogMcpError::AuthenticationError(_) => "AuthenticationError",
            GraylogMcpError::ClientError { .. } => "ClientError",
            GraylogMcpError::ServerError { .. } => "ServerError",
            GraylogMcpError::ConnectionError(_) => "ConnectionError",
            GraylogMcpError::TimeoutError(_) => "TimeoutError",
            GraylogMcpError::ConfigError(_) | GraylogMcpError::Io(_) => "InternalError",
        }
    }

    /// 结构化错误对象：`error` 为可读信息，`kind` 为分类，必要时附带 `reason` / `status`。
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        match self {
            GraylogMcpError::ValidationError(v) => {
                body["reason"] = json!(v.code());
            }
            GraylogMcpError::InvalidRequest(_) => {
                body["reason"] = json!("InvalidArguments");
            }
            GraylogMcpError::AuthenticationError(_) => {
                body["status"] = json!(401);
            }
            GraylogMcpError::ClientError { status, .. }
            | GraylogMcpError::ServerError { status, .. } => {
                body["status"] = json!(status);
            }
            _ => {}
        }
        body
    }
}
