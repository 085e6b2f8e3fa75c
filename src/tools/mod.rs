//! 工具系统
//!
//! 定义 [`Tool`] trait 和 [`ToolManager`]（按注册顺序保存、查找、执行）。
//! 记录相关工具位于 [`record`]，任务专属工具位于 [`task`]，项目统计位于 [`project`]。

pub mod project;
pub mod record;
pub mod task;

use crate::error::{MdmemError, Result, ToolError};
use crate::mcp::types::McpTool;
use crate::store::{RecordKind, RecordStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// 工具执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: String) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
        }
    }

    /// 以格式化 JSON 作为输出
    pub fn json(value: &Value) -> Self {
        let output = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self::success(output)
    }
}

pub type ToolParameters = HashMap<String, Value>;

/// 工具接口，所有对外暴露的操作均实现此 trait
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// 工具参数的 JSON Schema 定义
    fn parameters(&self) -> Value;
    async fn execute(&self, parameters: ToolParameters) -> Result<ToolResult>;
}

/// 工具注册表，启动时构建一次
#[derive(Default)]
pub struct ToolManager {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// 注册顺序，决定 tools/list 的输出顺序
    order: Vec<String>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名工具会被替换，但保留原位置
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, Arc::from(tool));
    }

    pub fn register_tools(&mut self, tools: Vec<Box<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn list_tools(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn get_tool(&self, tool_name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(tool_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// tools/list 使用的工具定义
    pub fn definitions(&self) -> Vec<McpTool> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| McpTool {
                name: tool.name().to_string(),
                description: Some(tool.description().to_string()),
                input_schema: tool.parameters(),
            })
            .collect()
    }

    /// 执行工具。工具在独立的 tokio 任务中运行并被立即等待，panic 转为错误返回。
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: ToolParameters,
    ) -> Result<ToolResult> {
        let tool = self
            .get_tool(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        debug!(tool = %tool_name, "🔧 执行工具");
        let handle = tokio::spawn(async move { tool.execute(parameters).await });
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(tool = %tool_name, error = %e, "💥 工具执行异常终止");
                Err(MdmemError::Other(format!(
                    "tool '{}' aborted: {}",
                    tool_name, e
                )))
            }
        }
    }
}

/// 全部内置工具，按目录顺序
pub fn builtin_tools(store: Arc<dyn RecordStore>) -> Vec<Box<dyn Tool>> {
    let mut tools: Vec<Box<dyn Tool>> = Vec::new();
    for kind in [RecordKind::Memory, RecordKind::Task] {
        tools.push(Box::new(record::CreateRecordTool::new(store.clone(), kind)));
        tools.push(Box::new(record::GetRecordTool::new(store.clone(), kind)));
        tools.push(Box::new(record::ListRecordsTool::new(store.clone(), kind)));
        tools.push(Box::new(record::SearchRecordsTool::new(store.clone(), kind)));
        tools.push(Box::new(record::UpdateRecordTool::new(store.clone(), kind)));
        tools.push(Box::new(record::DeleteRecordTool::new(store.clone(), kind)));
    }
    tools.push(Box::new(task::LinkTaskMemoryTool::new(store.clone())));
    tools.push(Box::new(project::ListProjectsTool::new(store)));
    tools
}

// ── 参数解析 ──────────────────────────────────────────────────────────────────

fn invalid(name: &str, message: impl Into<String>) -> MdmemError {
    ToolError::InvalidParameter {
        name: name.to_string(),
        message: message.into(),
    }
    .into()
}

/// 必填的非空字符串参数
pub(crate) fn required_str<'a>(params: &'a ToolParameters, name: &str) -> Result<&'a str> {
    match params.get(name) {
        None | Some(Value::Null) => Err(ToolError::MissingParameter(name.to_string()).into()),
        Some(Value::String(s)) if s.trim().is_empty() => Err(invalid(name, "must not be empty")),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(invalid(name, "expected a string")),
    }
}

/// 可选字符串参数；`null` 视为未提供
pub(crate) fn optional_str(params: &ToolParameters, name: &str) -> Result<Option<String>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(name, "expected a string")),
    }
}

/// 可选的正整数参数
pub(crate) fn optional_usize(params: &ToolParameters, name: &str) -> Result<Option<usize>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(0) => Err(invalid(name, "must be greater than 0")),
            Some(n) => Ok(Some(usize::try_from(n).unwrap_or(usize::MAX))),
            None => Err(invalid(name, "expected a positive integer")),
        },
    }
}

pub(crate) fn optional_f64(params: &ToolParameters, name: &str) -> Result<Option<f64>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .filter(|f| f.is_finite())
            .map(Some)
            .ok_or_else(|| invalid(name, "expected a number")),
    }
}

/// 标签：字符串数组，或逗号分隔的字符串
pub(crate) fn optional_tags(params: &ToolParameters, name: &str) -> Result<Option<Vec<String>>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(
            s.split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        )),
        Some(Value::Array(items)) => items
            .iter()
            .map(|t| {
                t.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| invalid(name, "expected an array of strings"))
            })
            .collect::<Result<Vec<_>>>()
            .map(|tags| Some(tags.into_iter().filter(|t| !t.is_empty()).collect())),
        Some(_) => Err(invalid(name, "expected an array of strings")),
    }
}
