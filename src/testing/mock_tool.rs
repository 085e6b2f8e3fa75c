//! Mock 工具，用于在不依赖真实存储的情况下测试分发器的工具调用路径。
//!
//! # 典型用途
//! - 测试 `tools/call` 成功 / 软失败（`isError`）/ 硬错误（`-32603`）三条路径
//! - 测试工具 panic 时分发器的容错行为
//! - 检查分发器传给工具的参数
//!
//! # 示例
//!
//! ```rust
//! use mdmem::testing::MockTool;
//! use mdmem::tools::Tool;
//! use std::collections::HashMap;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let tool = MockTool::new("lookup")
//!     .with_description("查找记录")
//!     .with_response(r#"{"count":0}"#)
//!     .with_error("磁盘不可用");
//!
//! let result = tool.execute(HashMap::new()).await.unwrap();
//! assert!(result.success);
//! assert!(tool.execute(HashMap::new()).await.is_err());
//! assert_eq!(tool.call_count(), 2);
//! # }
//! ```

use crate::error::{MdmemError, Result};
use crate::tools::{Tool, ToolParameters, ToolResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// 预设执行结果
enum MockToolResponse {
    Success(String),
    /// `ToolResult::error`，协议层仍然成功
    Failure(String),
    /// `Err(..)`，分发器映射为内部错误
    Error(String),
    Panic,
}

/// 可脚本化的 Mock Tool。
///
/// 按顺序返回预设的执行结果；队列耗尽后返回默认成功响应 `"mock response"`。
pub struct MockTool {
    name: String,
    description: String,
    parameters: Value,
    responses: Arc<Mutex<VecDeque<MockToolResponse>>>,
    /// 每次调用时收到的参数，按顺序记录
    calls: Arc<Mutex<Vec<ToolParameters>>>,
}

impl MockTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "A mock tool for testing".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }

    fn push(self, response: MockToolResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// 追加一条成功响应文本
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.push(MockToolResponse::Success(text.into()))
    }

    /// 追加一条软失败响应
    pub fn with_failure(self, msg: impl Into<String>) -> Self {
        self.push(MockToolResponse::Failure(msg.into()))
    }

    /// 追加一条硬错误
    pub fn with_error(self, msg: impl Into<String>) -> Self {
        self.push(MockToolResponse::Error(msg.into()))
    }

    /// 下一次调用直接 panic
    pub fn with_panic(self) -> Self {
        self.push(MockToolResponse::Panic)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// 最后一次调用时传入的参数（若从未调用则返回 `None`）
    pub fn last_args(&self) -> Option<ToolParameters> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, params: ToolParameters) -> Result<ToolResult> {
        self.calls.lock().unwrap().push(params);

        let response = self.responses.lock().unwrap().pop_front();
        match response {
            Some(MockToolResponse::Success(text)) => Ok(ToolResult::success(text)),
            Some(MockToolResponse::Failure(msg)) => Ok(ToolResult::error(msg)),
            Some(MockToolResponse::Error(msg)) => Err(MdmemError::Other(msg)),
            Some(MockToolResponse::Panic) => panic!("mock tool '{}' panicked", self.name),
            None => Ok(ToolResult::success("mock response".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_and_call_log() {
        let tool = MockTool::new("m").with_failure("bad").with_response("ok");
        let mut args = ToolParameters::new();
        args.insert("x".into(), json!(1));

        let first = tool.execute(args.clone()).await.unwrap();
        assert!(!first.success);
        assert_eq!(first.error.as_deref(), Some("bad"));
        assert_eq!(tool.execute(ToolParameters::new()).await.unwrap().output, "ok");
        assert_eq!(tool.execute(ToolParameters::new()).await.unwrap().output, "mock response");
        assert_eq!(tool.call_count(), 3);
        assert!(tool.last_args().unwrap().is_empty());
    }
}
