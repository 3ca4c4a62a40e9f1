use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GraylogMcpError, Result};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:9000";
pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    Stdio,
    Http,
    Both,
}

impl FromStr for ServerMode {
    type Err = GraylogMcpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(ServerMode::Stdio),
            "http" | "sse" => Ok(ServerMode::Http),
            "both" => Ok(ServerMode::Both),
            other => Err(GraylogMcpError::ConfigError(format!(
                "unknown server mode `{other}` (expected stdio, http or both)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = GraylogMcpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "plain" | "pretty" => Ok(LogFormat::Text),
            other => Err(GraylogMcpError::ConfigError(format!(
                "unknown log format `{other}` (expected json or text)"
            ))),
        }
    }
}

/// 后端连接配置。
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraylogConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub verify_ssl: bool,
    pub timeout_secs: u64,
    /// Refuse to start on the built-in admin/admin credentials.
    pub require_credentials: bool,
}

impl Default for GraylogConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            verify_ssl: true,
            timeout_secs: 30,
            require_credentials: false,
        }
    }
}

impl fmt::Debug for GraylogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraylogConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("verify_ssl", &self.verify_ssl)
            .field("timeout_secs", &self.timeout_secs)
            .field("require_credentials", &self.require_credentials)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub mode: ServerMode,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: ServerMode::Stdio,
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub graylog: GraylogConfig,
    pub server: ServerConfig,
}

impl Config {
    /// 从 YAML 或 JSON 文件加载，按扩展名区分。
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraylogMcpError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| GraylogMcpError::ConfigError(format!("{}: {e}", path.display()))),
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| GraylogMcpError::ConfigError(format!("{}: {e}", path.display()))),
            _ => Err(GraylogMcpError::ConfigError(format!(
                "unsupported config format: {} (use .yaml, .yml or .json)",
                path.display()
            ))),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// 用 `lookup` 提供的变量覆盖当前值，变量名与部署脚本一致（`GRAYLOG_*`、`MCP_SERVER_*`）。
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GRAYLOG_ENDPOINT") {
            self.graylog.endpoint = v.trim().to_string();
        }
        if let Some(v) = get("GRAYLOG_USERNAME") {
            self.graylog.username = v;
        }
        if let Some(v) = get("GRAYLOG_PASSWORD") {
            self.graylog.password = v;
        }
        if let Some(v) = get("GRAYLOG_VERIFY_SSL") {
            self.graylog.verify_ssl = parse_bool("GRAYLOG_VERIFY_SSL", &v)?;
        }
        if let Some(v) = get("GRAYLOG_TIMEOUT") {
            self.graylog.timeout_secs = parse_number("GRAYLOG_TIMEOUT", &v)?;
        }
        if let Some(v) = get("GRAYLOG_REQUIRE_CREDENTIALS") {
            self.graylog.require_credentials = parse_bool("GRAYLOG_REQUIRE_CREDENTIALS", &v)?;
        }
        if let Some(v) = get("MCP_SERVER_MODE") {
            self.server.mode = v.parse()?;
        }
        if let Some(v) = get("MCP_SERVER_HOST") {
            self.server.host = v.trim().to_string();
        }
        if let Some(v) = get("MCP_SERVER_PORT") {
            self.server.port = parse_number("MCP_SERVER_PORT", &v)?;
        }
        if let Some(v) = get("MCP_SERVER_LOG_LEVEL") {
            self.server.log_level = v.trim().to_ascii_lowercase();
        }
        if let Some(v) = get("MCP_SERVER_LOG_FORMAT") {
            self.server.log_format = v.parse()?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.graylog.endpoint).map_err(|e| {
            GraylogMcpError::ConfigError(format!(
                "invalid graylog endpoint `{}`: {e}",
                self.graylog.endpoint
            ))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(GraylogMcpError::ConfigError(format!(
                "graylog endpoint must use http or https, got `{}`",
                url.scheme()
            )));
        }
        if self.graylog.timeout_secs == 0 {
            return Err(GraylogMcpError::ConfigError(
                "graylog timeout must be at least 1 second".into(),
            ));
        }
        if self.graylog.require_credentials && self.uses_default_credentials() {
            return Err(GraylogMcpError::ConfigError(
                "GRAYLOG_USERNAME and GRAYLOG_PASSWORD must both be set when credentials are required"
                    .into(),
            ));
        }
        Ok(())
    }

    /// 仍停留在内置默认值的连接字段（endpoint / username / password），启动时逐个告警。
    pub fn defaulted_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.graylog.endpoint == DEFAULT_ENDPOINT {
            fields.push("endpoint");
        }
        if self.graylog.username == DEFAULT_USERNAME {
            fields.push("username");
        }
        if self.graylog.password == DEFAULT_PASSWORD {
            fields.push("password");
        }
        fields
    }

    /// True when either half of the credential pair is the built-in `admin`.
    pub fn uses_default_credentials(&self) -> bool {
        self.graylog.username == DEFAULT_USERNAME || self.graylog.password == DEFAULT_PASSWORD
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(GraylogMcpError::ConfigError(format!(
            "{key}: expected a boolean, got `{other}`"
        ))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        GraylogMcpError::ConfigError(format!("{key}: expected a number, got `{}`", value.trim()))
    })
}
