//! 基于 stdio 的 JSON-RPC 2.0 分发器
//!
//! 逐行读取请求，校验信封，路由到 `initialize` / `tools/list` / `tools/call` 等方法，
//! 每个请求写回恰好一行响应。通知（没有 `id` 键的消息）永不应答。
//! 请求按到达顺序逐个处理，上一个响应写出后才读取下一行。

use crate::error::Result;
use crate::mcp::types::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, InitializeParams, InitializeResult,
    JSONRPC_VERSION, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND, McpToolCallResult,
    McpToolsListResult, PARSE_ERROR, SERVER_NOT_INITIALIZED, ServerCapabilities, ServerInfo,
    ToolsCapability,
};
use crate::tools::{ToolManager, ToolParameters};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26"];

/// 信封校验结果
enum Envelope {
    Request(JsonRpcRequest),
    /// 直接以错误应答
    Reject(JsonRpcResponse),
    /// 无效的通知，静默丢弃
    Ignore,
}

pub struct McpServer {
    tools: ToolManager,
    initialized: bool,
    server_info: ServerInfo,
}

impl McpServer {
    pub fn new(tools: ToolManager) -> Self {
        Self {
            tools,
            initialized: false,
            server_info: ServerInfo::default(),
        }
    }

    pub fn with_server_info(mut self, server_info: ServerInfo) -> Self {
        self.server_info = server_info;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 在进程的 stdin / stdout 上运行，直到 stdin EOF
    pub async fn serve_stdio(&mut self) -> Result<()> {
        self.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// 读取循环。读到 EOF 时正常返回；只有读写本身失败才返回错误。
    pub async fn run<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(tools = self.tools.len(), "🚀 MCP 服务已启动，等待请求");
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let response = match std::str::from_utf8(&buf) {
                Ok(line) => self.handle_line(line).await,
                Err(e) => {
                    warn!(error = %e, "⚠️ 收到非 UTF-8 输入");
                    Some(JsonRpcResponse::error(
                        Value::Null,
                        PARSE_ERROR,
                        format!("Parse error: invalid UTF-8: {}", e),
                    ))
                }
            };
            if let Some(response) = response {
                write_response(&mut writer, &response).await?;
            }
        }
        info!("stdin 已关闭，MCP 服务退出");
        Ok(())
    }

    /// 处理一行输入，返回需要写出的响应（通知与空行返回 `None`）
    pub async fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match parse_envelope(line) {
            Envelope::Request(request) => self.handle_request(request).await,
            Envelope::Reject(response) => {
                warn!(error = ?response.error, "⚠️ 请求被拒绝");
                Some(response)
            }
            Envelope::Ignore => {
                debug!("丢弃无效通知");
                None
            }
        }
    }

    async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);
        debug!(method = %request.method, id = %id, "📨 收到请求");

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params),
            "initialized" | "notifications/initialized" => {
                self.initialized = true;
                JsonRpcResponse::success(id, json!({}))
            }
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" | "tools/call" if !self.initialized => {
                JsonRpcResponse::error(id, SERVER_NOT_INITIALIZED, "server not initialized")
            }
            "tools/list" => to_response(
                id,
                &McpToolsListResult {
                    tools: self.tools.definitions(),
                },
            ),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            other => {
                JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", other))
            }
        };
        Some(response)
    }

    fn handle_notification(&mut self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "initialized" | "notifications/initialized" => {
                self.initialized = true;
                info!("🤝 客户端已完成初始化");
            }
            "notifications/cancelled" => {
                debug!(params = ?request.params, "客户端取消请求（忽略）");
            }
            other => debug!(method = %other, "忽略通知"),
        }
    }

    fn handle_initialize(&mut self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params: InitializeParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e));
            }
            None => {
                return JsonRpcResponse::error(
                    id,
                    INVALID_PARAMS,
                    "Invalid params: protocolVersion is required",
                );
            }
        };

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
            warn!(version = %params.protocol_version, "⚠️ 不支持的协议版本");
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                format!(
                    "Unsupported protocol version '{}' (supported: {})",
                    params.protocol_version,
                    SUPPORTED_PROTOCOL_VERSIONS.join(", ")
                ),
            );
        }

        self.initialized = true;
        info!(
            version = %params.protocol_version,
            client = params.client_info.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown"),
            "🤝 initialize 完成"
        );
        to_response(
            id,
            &InitializeResult {
                protocol_version: params.protocol_version,
                capabilities: ServerCapabilities {
                    tools: Some(ToolsCapability {
                        list_changed: false,
                    }),
                },
                server_info: self.server_info.clone(),
            },
        )
    }

    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(Value::Object(mut params)) = params else {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                "Invalid params: expected an object with name and arguments",
            );
        };
        let name = match params.remove("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name,
            _ => {
                return JsonRpcResponse::error(
                    id,
                    INVALID_PARAMS,
                    "Invalid params: name must be a non-empty string",
                );
            }
        };
        let arguments: ToolParameters = match params.remove("arguments") {
            Some(Value::Object(map)) => map.into_iter().collect(),
            _ => {
                return JsonRpcResponse::error(
                    id,
                    INVALID_PARAMS,
                    "Invalid params: arguments must be an object",
                );
            }
        };
        if self.tools.get_tool(&name).is_none() {
            return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Unknown tool: {}", name));
        }

        match self.tools.execute_tool(&name, arguments).await {
            Ok(result) if result.success => to_response(id, &McpToolCallResult::text(result.output)),
            Ok(result) => {
                let message = result
                    .error
                    .unwrap_or_else(|| format!("tool '{}' failed", name));
                warn!(tool = %name, error = %message, "⚠️ 工具返回失败结果");
                to_response(id, &McpToolCallResult::error(message))
            }
            Err(e) if e.is_invalid_params() => {
                warn!(tool = %name, error = %e, "⚠️ 工具参数无效");
                JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string())
            }
            Err(e) => {
                error!(tool = %name, error = %e, "❌ 工具执行失败");
                JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string())
            }
        }
    }
}

fn parse_envelope(line: &str) -> Envelope {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            return Envelope::Reject(JsonRpcResponse::error(
                Value::Null,
                PARSE_ERROR,
                format!("Parse error: {}", e),
            ));
        }
    };
    let Value::Object(mut message) = value else {
        return Envelope::Reject(JsonRpcResponse::error(
            Value::Null,
            INVALID_REQUEST,
            "Invalid Request: expected a single JSON object (batches are not supported)",
        ));
    };

    // 超出 i64/u64 的整数 id 会被 serde_json 解析为 f64，回显时类型不变但数值可能改写（如 1e22）
    let id = match message.remove("id") {
        None => None,
        Some(id @ (Value::String(_) | Value::Number(_) | Value::Null)) => Some(id),
        Some(_) => {
            return Envelope::Reject(JsonRpcResponse::error(
                Value::Null,
                INVALID_REQUEST,
                "Invalid Request: id must be a string, number or null",
            ));
        }
    };

    if message.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return reject(id, "Invalid Request: jsonrpc must be \"2.0\"");
    }
    let method = match message.remove("method") {
        Some(Value::String(method)) => method,
        _ => return reject(id, "Invalid Request: method must be a string"),
    };

    Envelope::Request(JsonRpcRequest {
        id,
        method,
        params: message.remove("params"),
    })
}

fn reject(id: Option<Value>, message: &str) -> Envelope {
    match id {
        Some(id) => Envelope::Reject(JsonRpcResponse::error(id, INVALID_REQUEST, message)),
        None => Envelope::Ignore,
    }
}

fn to_response<T: Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> Result<()> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
