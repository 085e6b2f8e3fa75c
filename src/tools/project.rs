use crate::error::{Result, ToolError};
use crate::store::{RecordKind, RecordStore};
use crate::tools::{Tool, ToolParameters, ToolResult, optional_str};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// 列出项目目录及各自的记录数
pub struct ListProjectsTool {
    store: Arc<dyn RecordStore>,
}

impl ListProjectsTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for ListProjectsTool {
    fn name(&self) -> &str {
        "list_projects"
    }

    fn description(&self) -> &str {
        "列出已有项目及记录数。kind 为 memory 或 task；不填时两者都返回。"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "kind": {
                    "type": "string",
                    "enum": ["memory", "task"],
                    "description": "记录种类"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, parameters: ToolParameters) -> Result<ToolResult> {
        let kinds = match optional_str(&parameters, "kind")? {
            None => vec![RecordKind::Memory, RecordKind::Task],
            Some(raw) => vec![RecordKind::parse(&raw).ok_or_else(|| {
                ToolError::InvalidParameter {
                    name: "kind".to_string(),
                    message: format!("'{}' is not one of memory, task", raw),
                }
            })?],
        };

        let mut out = Map::new();
        for kind in kinds {
            let projects: Vec<Value> = self
                .store
                .projects(kind)
                .await?
                .into_iter()
                .map(|(name, count)| json!({ "name": name, "count": count }))
                .collect();
            out.insert(kind.dir_name().to_string(), Value::Array(projects));
        }
        Ok(ToolResult::json(&Value::Object(out)))
    }
}
