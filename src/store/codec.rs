//! 记录编解码：YAML frontmatter + 自由文本正文
//!
//! ```text
//! ---
//! id: mem-5f0c2a...
//! timestamp: 2026-10-16T08:30:00.000000Z
//! ...
//! ---
//!
//! 正文原样写入，不做 YAML 转义
//! ```
//!
//! 解码时只认第一个结束分隔符，之后的内容（包括正文里单独一行的 `---`）全部视为正文。
//! 不属于该记录种类的已知键（如记忆上的 `title`）与未知键一样原样保留，重写时写回。

use crate::error::CodecError;
use crate::store::record::{
    normalize_body, MemoryConnection, Record, RecordKind, TaskFields, DEFAULT_CATEGORY,
    DEFAULT_PRIORITY, DEFAULT_PROJECT,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

const DELIMITER: &str = "---";

/// 磁盘上的 frontmatter 形态。全部字段可缺省，以兼容旧文件和手工编辑。
#[derive(Debug, Default, Serialize, Deserialize)]
struct Frontmatter {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "lenient_string")]
    serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "lenient_string")]
    timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "lenient_string")]
    created: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    updated: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    project: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    category: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    priority: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    status: Option<String>,
    #[serde(default, deserialize_with = "lenient_tags")]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "lenient_string")]
    parent_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "lenient_connections")]
    memory_connections: Option<Vec<MemoryConnection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "lenient_list")]
    subtasks: Option<Vec<String>>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_yaml::Value>,
}

impl Frontmatter {
    fn from_record(record: &Record) -> Self {
        let mut fm = Frontmatter {
            id: Some(record.id.clone()),
            updated: Some(record.updated.clone()),
            project: Some(record.project.clone()),
            category: Some(record.category.clone()),
            priority: Some(record.priority.clone()),
            status: Some(record.status.clone()),
            tags: record.tags.clone(),
            extra: record.extra.clone(),
            ..Default::default()
        };
        match &record.task {
            None => fm.timestamp = Some(record.created.clone()),
            Some(task) => {
                fm.created = Some(record.created.clone());
                fm.serial = Some(task.serial.clone());
                fm.title = Some(task.title.clone());
                fm.parent_task = task.parent_task.clone();
                fm.memory_connections = Some(task.memory_connections.clone());
                fm.subtasks = Some(task.subtasks.clone());
            }
        }
        fm
    }

    fn into_record(self, kind: RecordKind, body: String) -> Result<Record, CodecError> {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or(CodecError::MissingField("id"))?;
        let created = self.created.or(self.timestamp).unwrap_or_default();
        let updated = self.updated.unwrap_or_else(|| created.clone());
        let task = match kind {
            RecordKind::Memory => None,
            RecordKind::Task => Some(TaskFields {
                title: self.title.unwrap_or_default(),
                serial: self.serial.unwrap_or_default(),
                parent_task: self.parent_task.filter(|p| !p.is_empty()),
                memory_connections: self.memory_connections.unwrap_or_default(),
                subtasks: self.subtasks.unwrap_or_default(),
            }),
        };
        Ok(Record {
            kind,
            id,
            created,
            updated,
            project: self
                .project
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            category: self.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            priority: self.priority.unwrap_or_else(|| DEFAULT_PRIORITY.to_string()),
            status: self
                .status
                .unwrap_or_else(|| kind.default_status().to_string()),
            tags: self.tags,
            body,
            task,
            extra: self.extra,
        })
    }
}

/// 记录 → 文件文本
pub fn encode(record: &Record) -> Result<String, CodecError> {
    let yaml = serde_yaml::to_string(&Frontmatter::from_record(record))
        .map_err(|e| CodecError::InvalidYaml(e.to_string()))?;
    let mut out = String::with_capacity(yaml.len() + record.body.len() + 16);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    out.push_str(DELIMITER);
    out.push_str("\n\n");
    if !record.body.is_empty() {
        out.push_str(&record.body);
        out.push('\n');
    }
    Ok(out)
}

/// 文件文本 → 记录
pub fn decode(kind: RecordKind, text: &str) -> Result<Record, CodecError> {
    let (frontmatter, body) = split_frontmatter(text)?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(frontmatter).map_err(|e| CodecError::InvalidYaml(e.to_string()))?;
    let serde_yaml::Value::Mapping(mut map) = value else {
        return Err(CodecError::NotAMapping);
    };
    let foreign: Vec<(&str, serde_yaml::Value)> = foreign_keys(kind, &map)
        .into_iter()
        .filter_map(|key| map.remove(key).map(|v| (key, v)))
        .collect();
    let mut fm: Frontmatter = serde_yaml::from_value(serde_yaml::Value::Mapping(map))
        .map_err(|e| CodecError::InvalidYaml(e.to_string()))?;
    for (key, value) in foreign {
        fm.extra.insert(key.to_string(), value);
    }
    fm.into_record(kind, normalize_body(body))
}

/// 该种类不会写出的已知键。`created` 与 `timestamp` 同时存在时，
/// 编码不写的那个也归入此类。
fn foreign_keys(kind: RecordKind, map: &serde_yaml::Mapping) -> Vec<&'static str> {
    let (mut keys, own_time, other_time) = match kind {
        RecordKind::Memory => (
            vec!["serial", "title", "parent_task", "memory_connections", "subtasks"],
            "timestamp",
            "created",
        ),
        RecordKind::Task => (Vec::new(), "created", "timestamp"),
    };
    if map.contains_key(own_time) && map.contains_key(other_time) {
        keys.push(other_time);
    }
    keys
}

/// 按行切分：首行必须是 `---`，随后第一行 `---` 为结束分隔符
fn split_frontmatter(text: &str) -> Result<(&str, &str), CodecError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.split_inclusive('\n');
    let first = lines.next().ok_or(CodecError::MissingOpeningDelimiter)?;
    if first.trim_end() != DELIMITER {
        return Err(CodecError::MissingOpeningDelimiter);
    }
    let start = first.len();
    let mut offset = start;
    for line in lines {
        if line.trim_end_matches(['\n', '\r']) == DELIMITER {
            return Ok((&text[start..offset], &text[offset + line.len()..]));
        }
        offset += line.len();
    }
    Err(CodecError::MissingClosingDelimiter)
}

/// 接受字符串 / 数字 / 布尔标量，统一转为字符串；映射或序列按缺省处理
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_to_string))
}

/// 接受序列或逗号分隔的字符串
fn lenient_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(value.map(list_from_value).unwrap_or_default())
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(value.map(list_from_value))
}

/// 形状不对的条目直接丢弃，其余照常加载
fn lenient_connections<'de, D>(deserializer: D) -> Result<Option<Vec<MemoryConnection>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_yaml::Value::Sequence(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| serde_yaml::from_value(item).ok())
                .collect(),
        ),
        _ => None,
    })
}

fn list_from_value(value: serde_yaml::Value) -> Vec<String> {
    match value {
        serde_yaml::Value::Sequence(items) => items.iter().filter_map(scalar_to_string).collect(),
        serde_yaml::Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_memory() -> Record {
        let mut rec = Record::new(
            RecordKind::Memory,
            "mem-0123456789abcdef0123456789abcdef",
            "2026-10-16T08:30:00.000000Z",
        );
        rec.updated = "2026-10-16T09:00:00.000000Z".into();
        rec.project = "home".into();
        rec.category = "errands".into();
        rec.priority = "high".into();
        rec.tags = vec!["shopping".into(), "weekly".into()];
        rec.body = "buy milk\n\n- whole\n- 2 liters".into();
        rec
    }

    fn sample_task() -> Record {
        let mut rec = Record::new(
            RecordKind::Task,
            "task-fedcba9876543210fedcba9876543210",
            "2026-10-16T08:30:00.000000Z",
        );
        rec.status = "in_progress".into();
        rec.body = "Write the release notes.".into();
        let task = rec.task.as_mut().unwrap();
        task.title = "Release notes".into();
        task.serial = "T-0007".into();
        task.parent_task = Some("task-parent".into());
        task.memory_connections = vec![MemoryConnection {
            memory_id: "mem-abc".into(),
            relevance: 0.75,
            connection_type: "reference".into(),
        }];
        task.subtasks = vec!["task-a".into(), "task-b".into()];
        rec
    }

    #[test]
    fn test_encode_layout() {
        let text = encode(&sample_memory()).unwrap();
        assert!(text.starts_with("---\nid: mem-0123456789abcdef0123456789abcdef\n"));
        assert!(text.contains("\n---\n\nbuy milk\n"));
        assert!(text.contains("timestamp:"));
        assert!(!text.contains("created:"));
        assert!(text.ends_with("2 liters\n"));
    }

    #[test]
    fn test_round_trip_memory() {
        let rec = sample_memory();
        assert_eq!(decode(RecordKind::Memory, &encode(&rec).unwrap()).unwrap(), rec);
    }

    #[test]
    fn test_round_trip_task() {
        let rec = sample_task();
        let text = encode(&rec).unwrap();
        assert!(text.contains("created:"));
        assert!(text.contains("serial: T-0007"));
        assert_eq!(decode(RecordKind::Task, &text).unwrap(), rec);
    }

    #[test]
    fn test_round_trip_body_with_delimiter_line() {
        let mut rec = sample_memory();
        rec.body = "before\n---\nafter: not yaml\n---\nend".into();
        assert_eq!(decode(RecordKind::Memory, &encode(&rec).unwrap()).unwrap(), rec);
    }

    #[test]
    fn test_round_trip_empty_body_and_odd_strings() {
        let mut rec = sample_memory();
        rec.body.clear();
        rec.category = "---".into();
        rec.tags = vec!["123".into(), "true".into(), "a: b".into()];
        assert_eq!(decode(RecordKind::Memory, &encode(&rec).unwrap()).unwrap(), rec);
    }

    #[test]
    fn test_decode_fills_defaults() {
        let text = "---\nid: mem-1\n---\n\n\n  hello\n\n";
        let rec = decode(RecordKind::Memory, text).unwrap();
        assert_eq!(rec.status, "active");
        assert_eq!(rec.priority, "medium");
        assert_eq!(rec.project, "default");
        assert!(rec.tags.is_empty());
        assert_eq!(rec.body, "  hello");

        let task = decode(RecordKind::Task, "---\nid: task-1\n---\n").unwrap();
        assert_eq!(task.status, "todo");
        assert_eq!(task.serial(), Some(""));
        assert!(task.subtasks().is_empty());
    }

    #[test]
    fn test_decode_hand_edited_file() {
        let text = "---\r\nid: 42\r\ncreated: 2026-01-01\r\npriority: 3\r\ntags: a, b\r\nmood: happy\r\n---\r\nbody\r\n";
        let rec = decode(RecordKind::Memory, text).unwrap();
        assert_eq!(rec.id, "42");
        assert_eq!(rec.created, "2026-01-01");
        assert_eq!(rec.updated, "2026-01-01");
        assert_eq!(rec.priority, "3");
        assert_eq!(rec.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(rec.body, "body");
        assert_eq!(
            rec.extra.get("mood"),
            Some(&serde_yaml::Value::String("happy".into()))
        );

        let reencoded = encode(&rec).unwrap();
        assert!(reencoded.contains("mood: happy"));
    }

    #[test]
    fn test_hand_edited_memory_keeps_task_keys_and_second_timestamp() {
        let text = "---\nid: mem-1\ntitle: Groceries\nsubtasks: [x]\ncreated: 2026-01-01\ntimestamp: 2025-12-31\n---\n\nbody\n";
        let rec = decode(RecordKind::Memory, text).unwrap();
        assert_eq!(rec.created, "2025-12-31");
        assert!(rec.task.is_none());

        let out = encode(&rec).unwrap();
        assert!(out.contains("title: Groceries"));
        assert!(out.contains("timestamp: 2025-12-31"));
        assert!(out.contains("created: 2026-01-01"));
        assert!(out.contains("subtasks:"));
        assert_eq!(decode(RecordKind::Memory, &out).unwrap(), rec);
    }

    #[test]
    fn test_task_keeps_stray_timestamp() {
        let text = "---\nid: task-1\ncreated: 2026-01-01\ntimestamp: 2025-12-31\n---\n";
        let rec = decode(RecordKind::Task, text).unwrap();
        assert_eq!(rec.created, "2026-01-01");
        let out = encode(&rec).unwrap();
        assert!(out.contains("timestamp: 2025-12-31"));
        assert_eq!(out.matches("created:").count(), 1);
    }

    #[test]
    fn test_round_trip_keeps_trailing_spaces() {
        let mut rec = sample_memory();
        rec.body = "line one  \nhard break  ".into();
        assert_eq!(decode(RecordKind::Memory, &encode(&rec).unwrap()).unwrap(), rec);
    }

    #[test]
    fn test_non_scalar_values_stay_loadable() {
        let text = "---\nid: task-1\ncategory: [a, b]\nstatus: {x: 1}\ntags: {a: 1}\nsubtasks: task-2\nmemory_connections: [{memory_id: mem-1}, 7]\n---\n";
        let rec = decode(RecordKind::Task, text).unwrap();
        assert_eq!(rec.category, "general");
        assert_eq!(rec.status, "todo");
        assert!(rec.tags.is_empty());
        assert_eq!(rec.subtasks(), ["task-2".to_string()]);
        assert_eq!(rec.task.as_ref().unwrap().memory_connections.len(), 1);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode(RecordKind::Memory, "id: x\n"),
            Err(CodecError::MissingOpeningDelimiter)
        ));
        assert!(matches!(
            decode(RecordKind::Memory, "---\nid: x\n"),
            Err(CodecError::MissingClosingDelimiter)
        ));
        assert!(matches!(
            decode(RecordKind::Memory, "---\nid: [unclosed\n---\n"),
            Err(CodecError::InvalidYaml(_))
        ));
        assert!(matches!(
            decode(RecordKind::Memory, "---\n- a\n- b\n---\n"),
            Err(CodecError::NotAMapping)
        ));
        assert!(matches!(
            decode(RecordKind::Memory, "---\nstatus: active\n---\n"),
            Err(CodecError::MissingField("id"))
        ));
    }
}
