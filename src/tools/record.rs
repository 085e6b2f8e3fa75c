//! 记录工具：记忆与任务共用同一组实现，按 [`RecordKind`] 区分
//!
//! | 工具 | 对应 Store 操作 |
//! |------|-----------------|
//! | `create_memory` / `create_task` | `store.create(kind, draft)` |
//! | `get_memory` / `get_task` | `store.get(kind, id)` |
//! | `list_memories` / `list_tasks` | `store.list(kind, filter)` |
//! | `search_memories` / `search_tasks` | `store.search(kind, query, project, limit)` |
//! | `update_memory` / `update_task` | `store.update(kind, id, patch)` |
//! | `delete_memory` / `delete_task` | `store.delete(kind, id)` |

use crate::error::{Result, ToolError};
use crate::store::{MemoryConnection, NewRecord, RecordFilter, RecordKind, RecordPatch, RecordStore};
use crate::tools::{
    Tool, ToolParameters, ToolResult, optional_str, optional_tags, optional_usize, required_str,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

fn noun(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Memory => "memory",
        RecordKind::Task => "task",
    }
}

/// 记录公共字段的 schema
fn common_properties(kind: RecordKind) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert(
        "project".into(),
        json!({ "type": "string", "description": "项目名，默认 default" }),
    );
    props.insert(
        "category".into(),
        json!({ "type": "string", "description": "分类，默认 general" }),
    );
    props.insert(
        "priority".into(),
        json!({ "type": "string", "description": "优先级，如 low / medium / high" }),
    );
    props.insert(
        "status".into(),
        json!({
            "type": "string",
            "description": format!("状态，默认 {}", kind.default_status())
        }),
    );
    props.insert(
        "tags".into(),
        json!({
            "type": "array",
            "items": { "type": "string" },
            "description": "标签列表（也接受逗号分隔的字符串）"
        }),
    );
    let body_desc = match kind {
        RecordKind::Memory => "记忆正文（markdown）",
        RecordKind::Task => "任务描述（markdown）",
    };
    props.insert(
        kind.body_field().into(),
        json!({ "type": "string", "description": body_desc }),
    );
    if kind == RecordKind::Task {
        props.insert(
            "title".into(),
            json!({ "type": "string", "description": "任务标题" }),
        );
    }
    props
}

fn schema(properties: Map<String, Value>, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn id_property(kind: RecordKind) -> Value {
    json!({
        "type": "string",
        "description": format!("{} id，如 {}-…", noun(kind), kind.id_prefix())
    })
}

// ── CreateRecordTool ─────────────────────────────────────────────────────────

pub struct CreateRecordTool {
    store: Arc<dyn RecordStore>,
    kind: RecordKind,
}

impl CreateRecordTool {
    pub fn new(store: Arc<dyn RecordStore>, kind: RecordKind) -> Self {
        Self { store, kind }
    }
}

#[async_trait::async_trait]
impl Tool for CreateRecordTool {
    fn name(&self) -> &str {
        match self.kind {
            RecordKind::Memory => "create_memory",
            RecordKind::Task => "create_task",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            RecordKind::Memory => "新建一条记忆，保存为 markdown 文件。返回完整记录（含分配的 id）。",
            RecordKind::Task => {
                "新建一个任务，自动分配项目内序号（T-0001…）。\
                 可通过 parent_task 挂到已有任务下作为子任务。"
            }
        }
    }

    fn parameters(&self) -> Value {
        let mut props = common_properties(self.kind);
        let required: &[&str] = match self.kind {
            RecordKind::Memory => &["content"],
            RecordKind::Task => {
                props.insert(
                    "parent_task".into(),
                    json!({ "type": "string", "description": "父任务 id（可选，必须已存在）" }),
                );
                props.insert(
                    "memory_connections".into(),
                    json!({
                        "type": "array",
                        "description": "关联的记忆",
                        "items": {
                            "type": "object",
                            "properties": {
                                "memory_id": { "type": "string" },
                                "relevance": { "type": "number" },
                                "connection_type": { "type": "string" }
                            },
                            "required": ["memory_id"]
                        }
                    }),
                );
                &["title"]
            }
        };
        schema(props, required)
    }

    async fn execute(&self, parameters: ToolParameters) -> Result<ToolResult> {
        let body_field = self.kind.body_field();
        let body = match self.kind {
            RecordKind::Memory => required_str(&parameters, body_field)?.to_string(),
            RecordKind::Task => optional_str(&parameters, body_field)?.unwrap_or_default(),
        };

        let mut draft = NewRecord {
            project: optional_str(&parameters, "project")?,
            category: optional_str(&parameters, "category")?,
            priority: optional_str(&parameters, "priority")?,
            status: optional_str(&parameters, "status")?,
            tags: optional_tags(&parameters, "tags")?.unwrap_or_default(),
            body,
            ..Default::default()
        };
        if self.kind == RecordKind::Task {
            draft.title = Some(required_str(&parameters, "title")?.to_string());
            draft.parent_task = optional_str(&parameters, "parent_task")?;
            draft.memory_connections = memory_connections(&parameters)?;
        }

        let record = self.store.create(self.kind, draft).await?;
        debug!(kind = %self.kind, id = %record.id, "📝 create 工具完成");
        Ok(ToolResult::json(&record.to_json()))
    }
}

fn memory_connections(parameters: &ToolParameters) -> Result<Vec<MemoryConnection>> {
    match parameters.get("memory_connections") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            ToolError::InvalidParameter {
                name: "memory_connections".to_string(),
                message: e.to_string(),
            }
            .into()
        }),
    }
}

// ── GetRecordTool ────────────────────────────────────────────────────────────

pub struct GetRecordTool {
    store: Arc<dyn RecordStore>,
    kind: RecordKind,
}

impl GetRecordTool {
    pub fn new(store: Arc<dyn RecordStore>, kind: RecordKind) -> Self {
        Self { store, kind }
    }
}

#[async_trait::async_trait]
impl Tool for GetRecordTool {
    fn name(&self) -> &str {
        match self.kind {
            RecordKind::Memory => "get_memory",
            RecordKind::Task => "get_task",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            RecordKind::Memory => "按 id 读取一条记忆",
            RecordKind::Task => "按 id 读取一个任务",
        }
    }

    fn parameters(&self) -> Value {
        let mut props = Map::new();
        props.insert("id".into(), id_property(self.kind));
        schema(props, &["id"])
    }

    async fn execute(&self, parameters: ToolParameters) -> Result<ToolResult> {
        let id = required_str(&parameters, "id")?;
        let record = self.store.get(self.kind, id).await?;
        Ok(ToolResult::json(&record.to_json()))
    }
}

// ── ListRecordsTool ──────────────────────────────────────────────────────────

pub struct ListRecordsTool {
    store: Arc<dyn RecordStore>,
    kind: RecordKind,
}

impl ListRecordsTool {
    pub fn new(store: Arc<dyn RecordStore>, kind: RecordKind) -> Self {
        Self { store, kind }
    }
}

#[async_trait::async_trait]
impl Tool for ListRecordsTool {
    fn name(&self) -> &str {
        match self.kind {
            RecordKind::Memory => "list_memories",
            RecordKind::Task => "list_tasks",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            RecordKind::Memory => "列出记忆，可按 project / status / category / priority / tag 精确过滤",
            RecordKind::Task => {
                "列出任务，可按 project / status / category / priority / tag / parent_task 精确过滤"
            }
        }
    }

    fn parameters(&self) -> Value {
        let mut props = Map::new();
        for field in ["project", "status", "category", "priority"] {
            props.insert(
                field.into(),
                json!({ "type": "string", "description": format!("按 {} 精确匹配", field) }),
            );
        }
        props.insert(
            "tag".into(),
            json!({ "type": "string", "description": "包含该标签" }),
        );
        if self.kind == RecordKind::Task {
            props.insert(
                "parent_task".into(),
                json!({ "type": "string", "description": "只列出该任务的直接子任务" }),
            );
        }
        props.insert(
            "limit".into(),
            json!({ "type": "integer", "minimum": 1, "description": "最多返回条数" }),
        );
        schema(props, &[])
    }

    async fn execute(&self, parameters: ToolParameters) -> Result<ToolResult> {
        let filter = RecordFilter {
            project: optional_str(&parameters, "project")?,
            status: optional_str(&parameters, "status")?,
            category: optional_str(&parameters, "category")?,
            priority: optional_str(&parameters, "priority")?,
            tag: optional_str(&parameters, "tag")?,
            parent_task: match self.kind {
                RecordKind::Task => optional_str(&parameters, "parent_task")?,
                RecordKind::Memory => None,
            },
            limit: optional_usize(&parameters, "limit")?,
        };
        let records = self.store.list(self.kind, &filter).await?;
        Ok(ToolResult::json(&json!({
            "count": records.len(),
            self.kind.dir_name(): records.iter().map(|r| r.to_json()).collect::<Vec<_>>(),
        })))
    }
}

// ── SearchRecordsTool ────────────────────────────────────────────────────────

pub struct SearchRecordsTool {
    store: Arc<dyn RecordStore>,
    kind: RecordKind,
}

impl SearchRecordsTool {
    pub fn new(store: Arc<dyn RecordStore>, kind: RecordKind) -> Self {
        Self { store, kind }
    }
}

#[async_trait::async_trait]
impl Tool for SearchRecordsTool {
    fn name(&self) -> &str {
        match self.kind {
            RecordKind::Memory => "search_memories",
            RecordKind::Task => "search_tasks",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            RecordKind::Memory => "在记忆文件全文（frontmatter + 正文）中做大小写不敏感的子串搜索",
            RecordKind::Task => "在任务文件全文（frontmatter + 描述）中做大小写不敏感的子串搜索",
        }
    }

    fn parameters(&self) -> Value {
        let mut props = Map::new();
        props.insert(
            "query".into(),
            json!({ "type": "string", "description": "要查找的文本" }),
        );
        props.insert(
            "project".into(),
            json!({ "type": "string", "description": "只在该项目中搜索" }),
        );
        props.insert(
            "limit".into(),
            json!({ "type": "integer", "minimum": 1, "description": "最多返回条数" }),
        );
        schema(props, &["query"])
    }

    async fn execute(&self, parameters: ToolParameters) -> Result<ToolResult> {
        let query = required_str(&parameters, "query")?;
        let project = optional_str(&parameters, "project")?;
        let limit = optional_usize(&parameters, "limit")?;
        let hits = self
            .store
            .search(self.kind, query, project.as_deref(), limit)
            .await?;
        let results: Vec<Value> = hits
            .iter()
            .map(|hit| {
                let mut value = hit.record.to_json();
                if let Value::Object(map) = &mut value {
                    map.insert("excerpt".into(), Value::String(hit.excerpt.clone()));
                }
                value
            })
            .collect();
        Ok(ToolResult::json(&json!({
            "query": query,
            "count": results.len(),
            "results": results,
        })))
    }
}

// ── UpdateRecordTool ─────────────────────────────────────────────────────────

pub struct UpdateRecordTool {
    store: Arc<dyn RecordStore>,
    kind: RecordKind,
}

impl UpdateRecordTool {
    pub fn new(store: Arc<dyn RecordStore>, kind: RecordKind) -> Self {
        Self { store, kind }
    }
}

#[async_trait::async_trait]
impl Tool for UpdateRecordTool {
    fn name(&self) -> &str {
        match self.kind {
            RecordKind::Memory => "update_memory",
            RecordKind::Task => "update_task",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            RecordKind::Memory => "更新记忆的部分字段；修改 project 会把文件移动到新项目目录",
            RecordKind::Task => "更新任务的部分字段；修改 project 会把文件移动到新项目目录",
        }
    }

    fn parameters(&self) -> Value {
        let mut props = common_properties(self.kind);
        props.insert("id".into(), id_property(self.kind));
        schema(props, &["id"])
    }

    async fn execute(&self, parameters: ToolParameters) -> Result<ToolResult> {
        let id = required_str(&parameters, "id")?;
        let patch = RecordPatch {
            project: optional_str(&parameters, "project")?,
            category: optional_str(&parameters, "category")?,
            priority: optional_str(&parameters, "priority")?,
            status: optional_str(&parameters, "status")?,
            tags: optional_tags(&parameters, "tags")?,
            body: optional_str(&parameters, self.kind.body_field())?,
            title: match self.kind {
                RecordKind::Task => optional_str(&parameters, "title")?,
                RecordKind::Memory => None,
            },
        };
        if patch.is_empty() {
            debug!(kind = %self.kind, id = %id, "update 工具收到空补丁，仅刷新 updated");
        }
        let record = self.store.update(self.kind, id, patch).await?;
        Ok(ToolResult::json(&record.to_json()))
    }
}

// ── DeleteRecordTool ─────────────────────────────────────────────────────────

pub struct DeleteRecordTool {
    store: Arc<dyn RecordStore>,
    kind: RecordKind,
}

impl DeleteRecordTool {
    pub fn new(store: Arc<dyn RecordStore>, kind: RecordKind) -> Self {
        Self { store, kind }
    }
}

#[async_trait::async_trait]
impl Tool for DeleteRecordTool {
    fn name(&self) -> &str {
        match self.kind {
            RecordKind::Memory => "delete_memory",
            RecordKind::Task => "delete_task",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            RecordKind::Memory => "删除一条记忆",
            RecordKind::Task => "删除一个任务及其全部子任务，返回删除的文件数",
        }
    }

    fn parameters(&self) -> Value {
        let mut props = Map::new();
        props.insert("id".into(), id_property(self.kind));
        schema(props, &["id"])
    }

    async fn execute(&self, parameters: ToolParameters) -> Result<ToolResult> {
        let id = required_str(&parameters, "id")?;
        let removed = self.store.delete(self.kind, id).await?;
        Ok(ToolResult::json(&json!({
            "id": id,
            "deleted": removed > 0,
            "removed": removed,
        })))
    }
}
