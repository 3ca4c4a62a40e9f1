//! Graylog MCP 适配层核心库
//! 参数校验、时间范围转换、后端客户端与工具门面各自独立，传输层（stdio / HTTP）只负责分发。

pub mod config;
pub mod error;
pub mod model;
pub mod timerange;
pub mod validator;
pub mod client;
pub mod tools;
pub mod mcp;
pub mod http;
