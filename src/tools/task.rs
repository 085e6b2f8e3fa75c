use crate::error::Result;
use crate::store::{MemoryConnection, RecordStore};
use crate::tools::{Tool, ToolParameters, ToolResult, optional_f64, optional_str, required_str};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// 为任务关联一条记忆（软链接，不校验记忆是否存在）
pub struct LinkTaskMemoryTool {
    store: Arc<dyn RecordStore>,
}

impl LinkTaskMemoryTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for LinkTaskMemoryTool {
    fn name(&self) -> &str {
        "link_task_memory"
    }

    fn description(&self) -> &str {
        "将一条记忆关联到任务上。同一 memory_id 重复关联时覆盖 relevance 与 connection_type。"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": { "type": "string", "description": "任务 id" },
                "memory_id": { "type": "string", "description": "记忆 id" },
                "relevance": {
                    "type": "number",
                    "description": "相关度，默认 1.0"
                },
                "connection_type": {
                    "type": "string",
                    "description": "关联类型，默认 related"
                }
            },
            "required": ["task_id", "memory_id"]
        })
    }

    async fn execute(&self, parameters: ToolParameters) -> Result<ToolResult> {
        let task_id = required_str(&parameters, "task_id")?;
        let mut connection = MemoryConnection::new(required_str(&parameters, "memory_id")?);
        if let Some(relevance) = optional_f64(&parameters, "relevance")? {
            connection.relevance = relevance;
        }
        if let Some(kind) = optional_str(&parameters, "connection_type")?
            && !kind.trim().is_empty()
        {
            connection.connection_type = kind.trim().to_string();
        }

        debug!(task = %task_id, memory = %connection.memory_id, "🔗 link_task_memory");
        let record = self.store.link_memory(task_id, connection).await?;
        Ok(ToolResult::json(&record.to_json()))
    }
}
