//! 记录类型定义：记忆（memory）与任务（task）共享同一结构

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_PROJECT: &str = "default";
pub const DEFAULT_CATEGORY: &str = "general";
pub const DEFAULT_PRIORITY: &str = "medium";

/// 记录种类，决定存储子目录、id 前缀与正文字段名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Memory,
    Task,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Memory => "memory",
            RecordKind::Task => "task",
        }
    }

    /// `<store_root>/<dir_name>/<project>/`
    pub fn dir_name(&self) -> &'static str {
        match self {
            RecordKind::Memory => "memories",
            RecordKind::Task => "tasks",
        }
    }

    pub fn id_prefix(&self) -> &'static str {
        match self {
            RecordKind::Memory => "mem",
            RecordKind::Task => "task",
        }
    }

    /// 正文在 JSON 载荷中的字段名
    pub fn body_field(&self) -> &'static str {
        match self {
            RecordKind::Memory => "content",
            RecordKind::Task => "description",
        }
    }

    pub fn default_status(&self) -> &'static str {
        match self {
            RecordKind::Memory => "active",
            RecordKind::Task => "todo",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "memories" => Some(RecordKind::Memory),
            "task" | "tasks" => Some(RecordKind::Task),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务到记忆的软链接，写入时不校验记忆是否存在
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConnection {
    pub memory_id: String,
    #[serde(default = "default_relevance")]
    pub relevance: f64,
    #[serde(default = "default_connection_type")]
    pub connection_type: String,
}

fn default_relevance() -> f64 {
    1.0
}

fn default_connection_type() -> String {
    "related".to_string()
}

impl MemoryConnection {
    pub fn new(memory_id: impl Into<String>) -> Self {
        Self {
            memory_id: memory_id.into(),
            relevance: default_relevance(),
            connection_type: default_connection_type(),
        }
    }
}

/// 仅任务拥有的字段
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskFields {
    pub title: String,
    /// 项目内唯一的序号，如 `T-0003`
    pub serial: String,
    pub parent_task: Option<String>,
    pub memory_connections: Vec<MemoryConnection>,
    pub subtasks: Vec<String>,
}

/// 一条记录。`task` 在且仅在 `kind == Task` 时为 `Some`。
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    pub id: String,
    /// 创建时间（记忆写作 `timestamp`，任务写作 `created`）
    pub created: String,
    pub updated: String,
    pub project: String,
    pub category: String,
    pub priority: String,
    pub status: String,
    pub tags: Vec<String>,
    /// 正文（记忆的 content / 任务的 description）
    pub body: String,
    pub task: Option<TaskFields>,
    /// 手工编辑时加入的未知 frontmatter 键，原样保留
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Record {
    /// 以默认值构造一条空记录
    pub fn new(kind: RecordKind, id: impl Into<String>, created: impl Into<String>) -> Self {
        let created = created.into();
        Self {
            kind,
            id: id.into(),
            updated: created.clone(),
            created,
            project: DEFAULT_PROJECT.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            priority: DEFAULT_PRIORITY.to_string(),
            status: kind.default_status().to_string(),
            tags: Vec::new(),
            body: String::new(),
            task: match kind {
                RecordKind::Memory => None,
                RecordKind::Task => Some(TaskFields::default()),
            },
            extra: BTreeMap::new(),
        }
    }

    pub fn serial(&self) -> Option<&str> {
        self.task.as_ref().map(|t| t.serial.as_str())
    }

    pub fn parent_task(&self) -> Option<&str> {
        self.task.as_ref().and_then(|t| t.parent_task.as_deref())
    }

    pub fn subtasks(&self) -> &[String] {
        self.task.as_ref().map(|t| t.subtasks.as_slice()).unwrap_or(&[])
    }

    /// 对外返回的 JSON 视图
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("kind".into(), Value::String(self.kind.as_str().into()));
        map.insert("id".into(), Value::String(self.id.clone()));
        let created_key = match self.kind {
            RecordKind::Memory => "timestamp",
            RecordKind::Task => "created",
        };
        map.insert(created_key.into(), Value::String(self.created.clone()));
        map.insert("updated".into(), Value::String(self.updated.clone()));
        map.insert("project".into(), Value::String(self.project.clone()));
        map.insert("category".into(), Value::String(self.category.clone()));
        map.insert("priority".into(), Value::String(self.priority.clone()));
        map.insert("status".into(), Value::String(self.status.clone()));
        map.insert(
            "tags".into(),
            Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
        );
        if let Some(task) = &self.task {
            map.insert("title".into(), Value::String(task.title.clone()));
            map.insert("serial".into(), Value::String(task.serial.clone()));
            map.insert(
                "parent_task".into(),
                task.parent_task.clone().map(Value::String).unwrap_or(Value::Null),
            );
            map.insert(
                "memory_connections".into(),
                serde_json::to_value(&task.memory_connections).unwrap_or(Value::Array(vec![])),
            );
            map.insert(
                "subtasks".into(),
                Value::Array(task.subtasks.iter().cloned().map(Value::String).collect()),
            );
        }
        for (key, value) in &self.extra {
            if let Ok(v) = serde_json::to_value(value) {
                map.entry(key.clone()).or_insert(v);
            }
        }
        map.insert(
            self.kind.body_field().into(),
            Value::String(self.body.clone()),
        );
        Value::Object(map)
    }
}

/// create 的输入。未给出的字段取默认值。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRecord {
    pub project: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub tags: Vec<String>,
    pub body: String,
    /// 以下仅对任务生效
    pub title: Option<String>,
    pub parent_task: Option<String>,
    pub memory_connections: Vec<MemoryConnection>,
}

impl NewRecord {
    pub fn with_body(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn parent(mut self, parent_task: impl Into<String>) -> Self {
        self.parent_task = Some(parent_task.into());
        self
    }
}

/// update 的补丁：`None` 表示保持原值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub project: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    pub body: Option<String>,
    pub title: Option<String>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        *self == RecordPatch::default()
    }

    /// 合并到记录上（不处理 `project`，迁移由存储层负责）
    pub(crate) fn apply(&self, record: &mut Record) {
        if let Some(category) = &self.category {
            record.category = category.clone();
        }
        if let Some(priority) = &self.priority {
            record.priority = priority.clone();
        }
        if let Some(status) = &self.status {
            record.status = status.clone();
        }
        if let Some(tags) = &self.tags {
            record.tags = tags.clone();
        }
        if let Some(body) = &self.body {
            record.body = normalize_body(body);
        }
        if let (Some(title), Some(task)) = (&self.title, record.task.as_mut()) {
            task.title = title.clone();
        }
    }
}

/// list 的精确匹配过滤条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub project: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    /// 标签包含
    pub tag: Option<String>,
    /// 仅任务：父任务 id
    pub parent_task: Option<String>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        fn eq(want: &Option<String>, have: &str) -> bool {
            want.as_deref().is_none_or(|w| w == have)
        }
        eq(&self.project, &record.project)
            && eq(&self.status, &record.status)
            && eq(&self.category, &record.category)
            && eq(&self.priority, &record.priority)
            && self
                .tag
                .as_deref()
                .is_none_or(|t| record.tags.iter().any(|have| have == t))
            && self
                .parent_task
                .as_deref()
                .is_none_or(|p| record.parent_task() == Some(p))
    }
}

/// 搜索命中：记录本身 + 命中位置附近的摘录
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: Record,
    pub excerpt: String,
}

/// 正文规范化：只去掉首尾的空白行，最后一行内容的行尾空格保留（markdown 硬换行）
pub fn normalize_body(body: &str) -> String {
    let mut start = 0;
    for line in body.split_inclusive('\n') {
        if line.trim().is_empty() {
            start += line.len();
        } else {
            break;
        }
    }
    let rest = &body[start..];
    let mut end = 0;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        if !line.trim().is_empty() {
            end = offset - (line.len() - line.trim_end_matches(['\n', '\r']).len());
        }
    }
    rest[..end].to_string()
}
