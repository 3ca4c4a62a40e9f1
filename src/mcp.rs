use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::tools::{GraylogTools, Tool};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::failure(Value::Null, -32700, message)
    }
}

/// 处理单个 JSON-RPC 请求；通知（无 id）不产生响应。
pub async fn process_request(tools: &GraylogTools, req: RpcRequest) -> Option<RpcResponse> {
    if req.is_notification() {
        debug!(method = %req.method, "notification received");
        return None;
    }
    let id = req.id.clone().unwrap_or(Value::Null);

    let resp = match req.method.as_str() {
        "initialize" => RpcResponse::success(id, initialize_result()),
        "ping" => RpcResponse::success(id, json!({})),
        "tools/list" => RpcResponse::success(id, json!({ "tools": GraylogTools::descriptors() })),
        "tools/call" => handle_tool_call(tools, id, &req.params).await,
        _ => RpcResponse::failure(id, -32601, format!("method not found: {}", req.method)),
    };
    Some(resp)
}

async fn handle_tool_call(tools: &GraylogTools, id: Value, params: &Value) -> RpcResponse {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return RpcResponse::failure(id, -32602, "tools/call requires string field `name`");
    };
    let Some(tool) = Tool::from_name(name) else {
        return RpcResponse::failure(id, -32602, format!("unknown tool: {name}"));
    };
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    let output = tools.call(tool, arguments).await;
    RpcResponse::success(
        id,
        json!({
            "content": [{ "type": "text", "text": output.text }],
            "isError": output.is_error,
        }),
    )
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": false }
        },
        "serverInfo": {
            "name": "graylog-mcp",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// stdio 传输：每行一个 JSON-RPC 消息，按到达顺序处理。stdin 关闭时返回。
pub async fn run_stdio(tools: Arc<GraylogTools>) -> Result<()> {
    info!("MCP stdio transport ready");
    serve_lines(&tools, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    info!("stdin closed, stdio transport stopped");
    Ok(())
}

/// 逐行读取原始字节；非 UTF-8 或非 JSON 的行回复 -32700 后继续。
pub async fn serve_lines<R, W>(tools: &GraylogTools, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "non UTF-8 JSON-RPC message");
                write_response(&mut writer, &RpcResponse::parse_error(format!("parse error: {e}")))
                    .await?;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let req: RpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "unparsable JSON-RPC message");
                write_response(&mut writer, &RpcResponse::parse_error(format!("parse error: {e}")))
                    .await?;
                continue;
            }
        };

        if let Some(resp) = process_request(tools, req).await {
            write_response(&mut writer, &resp).await?;
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, resp: &RpcResponse) -> Result<()> {
    let line = serde_json::to_string(resp).unwrap_or_else(|_| "{}".to_string());
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GraylogClient;
    use crate::config::GraylogConfig;

    // nothing listens here; tests below never reach the backend
    fn offline_tools() -> GraylogTools {
        let cfg = GraylogConfig {
            endpoint: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
            ..GraylogConfig::default()
        };
        GraylogTools::new(GraylogClient::new(&cfg).unwrap())
    }

    fn request(id: Option<Value>, method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            id,
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let tools = offline_tools();
        let resp = process_request(&tools, request(Some(json!(1)), "initialize", Value::Null))
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "graylog-mcp");
        assert_eq!(resp.id, json!(1));
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let tools = offline_tools();
        let resp = process_request(
            &tools,
            request(None, "notifications/initialized", Value::Null),
        )
        .await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn tools_list_returns_all_tools() {
        let tools = offline_tools();
        let resp = process_request(&tools, request(Some(json!("a")), "tools/list", Value::Null))
            .await
            .unwrap();
        let listed = resp.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(listed, Tool::ALL.len());
    }

    #[tokio::test]
    async fn unknown_method_and_tool() {
        let tools = offline_tools();
        let resp = process_request(&tools, request(Some(json!(2)), "resources/list", Value::Null))
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, -32601);

        let resp = process_request(
            &tools,
            request(Some(json!(3)), "tools/call", json!({ "name": "delete_stream" })),
        )
        .await
        .unwrap();
        assert_eq!(resp.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn validation_failure_is_tool_error_not_rpc_error() {
        let tools = offline_tools();
        let resp = process_request(
            &tools,
            request(
                Some(json!(4)),
                "tools/call",
                json!({ "name": "search_logs", "arguments": { "query": "" } }),
            ),
        )
        .await
        .unwrap();
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        let text = result["content"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["kind"], "ValidationError");
        assert_eq!(body["reason"], "EmptyQuery");
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_end_the_session() {
        let tools = offline_tools();
        let input: &[u8] = b"\xff\xfe\n\n{not json}\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";
        let mut output = Vec::new();
        serve_lines(&tools, input, &mut output).await.unwrap();

        let lines: Vec<Value> = std::str::from_utf8(&output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["error"]["code"], -32700);
        assert_eq!(lines[1]["error"]["code"], -32700);
        assert_eq!(lines[2]["id"], 1);
        assert_eq!(lines[2]["result"], json!({}));
    }
}
