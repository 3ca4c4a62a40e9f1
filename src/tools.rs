//! 对外暴露的工具集合。每个工具：解析参数 → 校验 → 时间范围转换 → 调用后端 → JSON 文本。

use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::client::GraylogClient;
use crate::error::{GraylogMcpError, Result};
use crate::model::{
    AggregationArgs, ErrorLogsArgs, LastEventArgs, LevelCountArgs, SearchLogsArgs, StreamIdArgs,
    StreamNameArgs, StreamSearchArgs, DEFAULT_AGGREGATION_SIZE,
};
use crate::validator::{validate_aggregation, validate_required, validate_search, validate_stream_search};

pub const ERROR_LOG_QUERY: &str = "level:ERROR OR level:CRITICAL OR level:FATAL";
pub const ERROR_LOG_FIELDS: [&str; 4] = ["message", "level", "source", "timestamp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    SearchLogs,
    SearchStreamLogs,
    GetLogStatistics,
    ListStreams,
    SearchStreamsByName,
    GetStreamInfo,
    GetErrorLogs,
    GetLogCountByLevel,
    GetSystemInfo,
    TestConnection,
    GetLastEventFromStream,
}

impl Tool {
    pub const ALL: [Tool; 11] = [
        Tool::SearchLogs,
        Tool::SearchStreamLogs,
        Tool::GetLogStatistics,
        Tool::ListStreams,
        Tool::SearchStreamsByName,
        Tool::GetStreamInfo,
        Tool::GetErrorLogs,
        Tool::GetLogCountByLevel,
        Tool::GetSystemInfo,
        Tool::TestConnection,
        Tool::GetLastEventFromStream,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::SearchLogs => "search_logs",
            Tool::SearchStreamLogs => "search_stream_logs",
            Tool::GetLogStatistics => "get_log_statistics",
            Tool::ListStreams => "list_streams",
            Tool::SearchStreamsByName => "search_streams_by_name",
            Tool::GetStreamInfo => "get_stream_info",
            Tool::GetErrorLogs => "get_error_logs",
            Tool::GetLogCountByLevel => "get_log_count_by_level",
            Tool::GetSystemInfo => "get_system_info",
            Tool::TestConnection => "test_connection",
            Tool::GetLastEventFromStream => "get_last_event_from_stream",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Tool::ALL.iter().copied().find(|t| t.name() == name)
    }

    pub fn descriptor(&self) -> Value {
        let (description, schema) = match self {
            Tool::SearchLogs => (
                "Search logs in Graylog using Elasticsearch query syntax. Defaults to the last hour.",
                json!({
                    "type": "object",
                    "required": ["query"],
                    "properties": {
                        "query": { "type": "string", "description": "Search query, e.g. level:ERROR AND source:nginx" },
                        "time_range": { "type": "string", "description": "Relative range (30m, 1h, 24h, 7d, 1w) or ISO-8601 timestamp(s) joined by '/'", "default": "1h" },
                        "fields": { "type": "array", "items": { "type": "string" } },
                        "limit": { "type": "integer", "minimum": 1, "maximum": 1000, "default": 50 },
                        "offset": { "type": "integer", "minimum": 0, "default": 0 },
                        "sort": { "type": "string", "description": "Sort field, e.g. timestamp" },
                        "sort_direction": { "type": "string", "enum": ["asc", "desc"], "default": "desc" },
                        "stream_id": { "type": "string" },
                        "decorate": { "type": "boolean" },
                        "filter": { "type": "string" },
                        "highlight": { "type": "boolean" }
                    }
                }),
            ),
            Tool::SearchStreamLogs => (
                "Search logs within one Graylog stream. Query defaults to '*' (all messages).",
                json!({
                    "type": "object",
                    "required": ["stream_id"],
                    "properties": {
                        "stream_id": { "type": "string" },
                        "query": { "type": "string", "default": "*" },
                        "time_range": { "type": "string", "default": "1h" },
                        "fields": { "type": "array", "items": { "type": "string" } },
                        "limit": { "type": "integer", "minimum": 1, "maximum": 100, "default": 50 },
                        "offset": { "type": "integer", "minimum": 0, "default": 0 },
                        "sort": { "type": "string" },
                        "sort_direction": { "type": "string", "enum": ["asc", "desc"], "default": "desc" }
                    }
                }),
            ),
            Tool::GetLogStatistics => (
                "Aggregate logs: terms, date_histogram (needs interval), cardinality, stats, min, max, avg, sum.",
                json!({
                    "type": "object",
                    "required": ["query", "aggregation_type", "field"],
                    "properties": {
                        "query": { "type": "string" },
                        "time_range": { "type": "string", "default": "1h" },
                        "aggregation_type": {
                            "type": "string",
                            "enum": ["terms", "date_histogram", "cardinality", "stats", "min", "max", "avg", "sum"]
                        },
                        "field": { "type": "string" },
                        "size": { "type": "integer", "minimum": 1, "maximum": 100, "default": DEFAULT_AGGREGATION_SIZE },
                        "interval": { "type": "string", "description": "Required for date_histogram, e.g. minute, hour, day" }
                    }
                }),
            ),
            Tool::ListStreams => (
                "List all Graylog streams with their IDs and metadata.",
                json!({ "type": "object", "properties": {} }),
            ),
            Tool::SearchStreamsByName => (
                "Find streams whose title contains the given text (case-insensitive).",
                json!({
                    "type": "object",
                    "required": ["stream_name"],
                    "properties": { "stream_name": { "type": "string" } }
                }),
            ),
            Tool::GetStreamInfo => (
                "Get detailed information about one stream.",
                json!({
                    "type": "object",
                    "required": ["stream_id"],
                    "properties": { "stream_id": { "type": "string" } }
                }),
            ),
            Tool::GetErrorLogs => (
                "Get ERROR, CRITICAL and FATAL logs from the given time range.",
                json!({
                    "type": "object",
                    "properties": {
                        "time_range": { "type": "string", "default": "1h" },
                        "limit": { "type": "integer", "minimum": 1, "maximum": 1000, "default": 100 }
                    }
                }),
            ),
            Tool::GetLogCountByLevel => (
                "Count logs per level over the given time range.",
                json!({
                    "type": "object",
                    "properties": { "time_range": { "type": "string", "default": "1h" } }
                }),
            ),
            Tool::GetSystemInfo => (
                "Get Graylog system information and status.",
                json!({ "type": "object", "properties": {} }),
            ),
            Tool::TestConnection => (
                "Check connectivity and authentication against the Graylog server.",
                json!({ "type": "object", "properties": {} }),
            ),
            Tool::GetLastEventFromStream => (
                "Get the most recent message of a stream within the time range.",
                json!({
                    "type": "object",
                    "required": ["stream_id"],
                    "properties": {
                        "stream_id": { "type": "string" },
                        "time_range": { "type": "string", "default": "1h" }
                    }
                }),
            ),
        };
        json!({
            "name": self.name(),
            "description": description,
            "inputSchema": schema,
        })
    }
}

/// 工具调用的文本结果。`is_error` 为真时 `text` 是结构化错误对象。
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    fn ok(value: &Value) -> Self {
        Self {
            text: pretty(value),
            is_error: false,
        }
    }

    fn error(err: &GraylogMcpError) -> Self {
        Self {
            text: pretty(&err.to_json()),
            is_error: true,
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[derive(Debug, Default, Deserialize)]
struct NoArgs {}

/// 工具参数必须是 JSON 对象；`{"request": {...}}` 形式的包装会被展开。
pub fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    let object = match arguments {
        Value::Null => Map::new(),
        Value::Object(mut map) => {
            if map.len() == 1 && map.get("request").is_some_and(Value::is_object) {
                match map.remove("request") {
                    Some(Value::Object(inner)) => inner,
                    _ => map,
                }
            } else {
                map
            }
        }
        Value::String(_) => {
            return Err(GraylogMcpError::InvalidRequest(
                "arguments must be a JSON object, not a pre-serialized JSON string".into(),
            ))
        }
        other => {
            return Err(GraylogMcpError::InvalidRequest(format!(
                "arguments must be a JSON object, got {}",
                json_type(&other)
            )))
        }
    };
    serde_json::from_value(Value::Object(object))
        .map_err(|e| GraylogMcpError::InvalidRequest(e.to_string()))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub struct GraylogTools {
    client: GraylogClient,
}

impl GraylogTools {
    pub fn new(client: GraylogClient) -> Self {
        Self { client }
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }

    pub fn descriptors() -> Vec<Value> {
        Tool::ALL.iter().map(Tool::descriptor).collect()
    }

    pub async fn call(&self, tool: Tool, arguments: Value) -> ToolOutput {
        let started = Instant::now();
        match self.dispatch(tool, arguments).await {
            Ok(value) => {
                info!(
                    tool = tool.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "tool call completed"
                );
                ToolOutput::ok(&value)
            }
            Err(e) => {
                warn!(
                    tool = tool.name(),
                    kind = e.kind(),
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "tool call failed"
                );
                ToolOutput::error(&e)
            }
        }
    }

    async fn dispatch(&self, tool: Tool, arguments: Value) -> Result<Value> {
        match tool {
            Tool::SearchLogs => self.search_logs(parse_args(arguments)?).await,
            Tool::SearchStreamLogs => self.search_stream_logs(parse_args(arguments)?).await,
            Tool::GetLogStatistics => self.get_log_statistics(parse_args(arguments)?).await,
            Tool::ListStreams => {
                parse_args::<NoArgs>(arguments)?;
                self.list_streams().await
            }
            Tool::SearchStreamsByName => self.search_streams_by_name(parse_args(arguments)?).await,
            Tool::GetStreamInfo => self.get_stream_info(parse_args(arguments)?).await,
            Tool::GetErrorLogs => self.get_error_logs(parse_args(arguments)?).await,
            Tool::GetLogCountByLevel => self.get_log_count_by_level(parse_args(arguments)?).await,
            Tool::GetSystemInfo => {
                parse_args::<NoArgs>(arguments)?;
                self.get_system_info().await
            }
            Tool::TestConnection => {
                parse_args::<NoArgs>(arguments)?;
                Ok(self.test_connection().await)
            }
            Tool::GetLastEventFromStream => {
                self.get_last_event_from_stream(parse_args(arguments)?).await
            }
        }
    }

    pub async fn search_logs(&self, args: SearchLogsArgs) -> Result<Value> {
        let params = validate_search(&args)?;
        self.client.search(&params).await
    }

    pub async fn search_stream_logs(&self, args: StreamSearchArgs) -> Result<Value> {
        let params = validate_stream_search(&args)?;
        self.client.search(&params).await
    }

    pub async fn get_log_statistics(&self, args: AggregationArgs) -> Result<Value> {
        let params = validate_aggregation(&args)?;
        self.client.aggregate(&params).await
    }

    pub async fn list_streams(&self) -> Result<Value> {
        let streams = self.client.list_streams().await?;
        Ok(json!({ "streams": streams }))
    }

    pub async fn search_streams_by_name(&self, args: StreamNameArgs) -> Result<Value> {
        let term = validate_required("stream_name", &args.stream_name)?;
        let needle = term.to_lowercase();
        let matches: Vec<Value> = self
            .client
            .list_streams()
            .await?
            .iter()
            .filter(|s| {
                s.get("title")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.to_lowercase().contains(&needle))
            })
            .map(|s| {
                json!({
                    "id": s.get("id"),
                    "title": s.get("title"),
                    "description": s.get("description"),
                    "disabled": s.get("disabled").and_then(Value::as_bool).unwrap_or(false),
                })
            })
            .collect();
        Ok(json!({
            "search_term": term,
            "total_matches": matches.len(),
            "matches": matches,
        }))
    }

    pub async fn get_stream_info(&self, args: StreamIdArgs) -> Result<Value> {
        let stream_id = validate_required("stream_id", &args.stream_id)?;
        self.client.stream(&stream_id).await
    }

    pub async fn get_error_logs(&self, args: ErrorLogsArgs) -> Result<Value> {
        let mut search = SearchLogsArgs::new(ERROR_LOG_QUERY);
        search.time_range = args.time_range;
        search.limit = args.limit;
        search.fields = Some(ERROR_LOG_FIELDS.iter().map(|f| f.to_string()).collect());
        self.search_logs(search).await
    }

    pub async fn get_log_count_by_level(&self, args: LevelCountArgs) -> Result<Value> {
        self.get_log_statistics(AggregationArgs {
            query: "*".into(),
            time_range: args.time_range,
            aggregation_type: "terms".into(),
            field: "level".into(),
            size: DEFAULT_AGGREGATION_SIZE,
            interval: None,
        })
        .await
    }

    pub async fn get_last_event_from_stream(&self, args: LastEventArgs) -> Result<Value> {
        self.search_stream_logs(StreamSearchArgs {
            stream_id: args.stream_id,
            query: Some("*".into()),
            time_range: args.time_range,
            fields: None,
            limit: 1,
            offset: 0,
            sort: Some("timestamp".into()),
            sort_direction: "desc".into(),
        })
        .await
    }

    pub async fn get_system_info(&self) -> Result<Value> {
        self.client.system_info().await
    }

    /// 连接探测不会失败：结果里用 `connected` 表示状态，失败时附带错误分类。
    pub async fn test_connection(&self) -> Value {
        match self.client.system_info().await {
            Ok(info) => json!({
                "connected": true,
                "endpoint": self.endpoint(),
                "version": info.get("version").cloned().unwrap_or(Value::Null),
            }),
            Err(e) => json!({
                "connected": false,
                "endpoint": self.endpoint(),
                "error": e.to_string(),
                "kind": e.kind(),
            }),
        }
    }
}
