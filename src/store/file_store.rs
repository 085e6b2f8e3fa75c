//! 基于 markdown 文件的记录存储
//!
//! 每条记录一个文件，路径为 `<root>/<kind>/<project>/<YYYYMMDD-HHMMSS>-<id8>.md`。
//! 扫描时单个文件解码失败只记 warn 日志并跳过，不影响整体结果；
//! 根目录不存在时读取视为空。

use crate::config::{Config, expand_tilde};
use crate::error::{MdmemError, Result, StoreError};
use crate::store::RecordStore;
use crate::store::codec;
use crate::store::record::{
    DEFAULT_CATEGORY, DEFAULT_PRIORITY, DEFAULT_PROJECT, MemoryConnection, NewRecord, Record,
    RecordFilter, RecordKind, RecordPatch, SearchHit, normalize_body,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// 已读入的记录文件
struct StoredRecord {
    path: PathBuf,
    text: String,
    record: Record,
}

pub struct FileStore {
    root: PathBuf,
    list_limit: usize,
    search_limit: usize,
    excerpt_chars: usize,
}

impl FileStore {
    /// 以默认 limit 打开根目录（目录在首次写入时创建）
    pub fn new(root: impl AsRef<Path>) -> Self {
        let defaults = Config::default();
        Self {
            root: expand_tilde(root.as_ref()),
            list_limit: defaults.list_limit,
            search_limit: defaults.search_limit,
            excerpt_chars: defaults.excerpt_chars,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        info!(root = %config.store_root.display(), "🗄️ FileStore 初始化");
        Self {
            root: expand_tilde(&config.store_root),
            list_limit: config.list_limit.max(1),
            search_limit: config.search_limit.max(1),
            excerpt_chars: config.excerpt_chars.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: RecordKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// 指定项目或全部项目下的 `.md` 文件，按文件名倒序
    async fn record_paths(&self, kind: RecordKind, project: Option<&str>) -> Result<Vec<PathBuf>> {
        let dirs = match project {
            Some(p) => vec![self.kind_dir(kind).join(sanitize_project(p))],
            None => list_subdirs(&self.kind_dir(kind)).await?,
        };
        let mut paths = Vec::new();
        for dir in dirs {
            paths.extend(list_md_files(&dir).await?);
        }
        paths.sort_by(|a, b| b.file_name().cmp(&a.file_name()).then_with(|| b.cmp(a)));
        Ok(paths)
    }

    async fn load(&self, kind: RecordKind, path: &Path) -> Option<StoredRecord> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "⚠️ 读取记录文件失败，已跳过");
                return None;
            }
        };
        match codec::decode(kind, &text) {
            Ok(record) => Some(StoredRecord {
                path: path.to_path_buf(),
                text,
                record,
            }),
            Err(source) => {
                let err = StoreError::Decode {
                    path: path.display().to_string(),
                    source,
                };
                warn!(error = %err, "⚠️ 记录文件解码失败，已跳过");
                None
            }
        }
    }

    async fn scan(&self, kind: RecordKind, project: Option<&str>) -> Result<Vec<StoredRecord>> {
        let mut out = Vec::new();
        for path in self.record_paths(kind, project).await? {
            if let Some(stored) = self.load(kind, &path).await {
                out.push(stored);
            }
        }
        Ok(out)
    }

    /// 全量扫描直到找到 id
    async fn locate(&self, kind: RecordKind, id: &str) -> Result<Option<StoredRecord>> {
        for path in self.record_paths(kind, None).await? {
            if let Some(stored) = self.load(kind, &path).await
                && stored.record.id == id
            {
                return Ok(Some(stored));
            }
        }
        Ok(None)
    }

    async fn project_serials(&self, project: &str) -> Result<HashSet<String>> {
        Ok(self
            .scan(RecordKind::Task, Some(project))
            .await?
            .into_iter()
            .filter_map(|s| s.record.task.map(|t| t.serial))
            .filter(|s| !s.is_empty())
            .collect())
    }

    async fn next_serial(&self, project: &str) -> Result<String> {
        let max = self
            .project_serials(project)
            .await?
            .iter()
            .filter_map(|s| parse_serial(s))
            .max()
            .unwrap_or(0);
        Ok(format_serial(max + 1))
    }

    /// 新文件，已存在时报错而不是覆盖
    async fn write_new(&self, path: &Path, text: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        debug!(path = %path.display(), "💾 记录已写入");
        Ok(())
    }

    /// 整文件写入临时文件后 rename 覆盖
    async fn overwrite(&self, path: &Path, record: &Record) -> Result<()> {
        let text = codec::encode(record)?;
        let tmp = path.with_extension("md.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), "💾 记录已覆盖");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn create(&self, kind: RecordKind, draft: NewRecord) -> Result<Record> {
        let now = Utc::now().trunc_subsecs(6);
        let id = new_id(kind);
        let project = sanitize_project(draft.project.as_deref().unwrap_or(DEFAULT_PROJECT));

        let parent = match (kind, draft.parent_task.as_deref().map(str::trim)) {
            (RecordKind::Task, Some(pid)) if !pid.is_empty() => {
                Some(self.locate(RecordKind::Task, pid).await?.ok_or_else(|| {
                    StoreError::InvalidArgument(format!("parent task '{}' does not exist", pid))
                })?)
            }
            _ => None,
        };

        let mut record = Record::new(kind, id.clone(), format_timestamp(now));
        record.project = project.clone();
        record.category = non_empty(draft.category).unwrap_or_else(|| DEFAULT_CATEGORY.into());
        record.priority = non_empty(draft.priority).unwrap_or_else(|| DEFAULT_PRIORITY.into());
        record.status =
            non_empty(draft.status).unwrap_or_else(|| kind.default_status().to_string());
        record.tags = clean_tags(draft.tags);
        record.body = normalize_body(&draft.body);
        if let Some(task) = record.task.as_mut() {
            task.title = draft.title.unwrap_or_default().trim().to_string();
            task.serial = self.next_serial(&project).await?;
            task.parent_task = parent.as_ref().map(|p| p.record.id.clone());
            task.memory_connections = draft.memory_connections;
        }

        let path = self
            .kind_dir(kind)
            .join(&project)
            .join(record_file_name(now, &id));
        self.write_new(&path, &codec::encode(&record)?).await?;
        info!(kind = %kind, id = %id, project = %project, "📝 记录已创建");

        if let Some(parent) = parent {
            let mut parent_record = parent.record;
            if let Some(task) = parent_record.task.as_mut()
                && !task.subtasks.contains(&id)
            {
                task.subtasks.push(id.clone());
            }
            parent_record.updated = next_timestamp(&parent_record.updated);
            self.overwrite(&parent.path, &parent_record).await?;
            debug!(parent = %parent_record.id, child = %id, "🔗 已挂到父任务");
        }

        Ok(record)
    }

    async fn get(&self, kind: RecordKind, id: &str) -> Result<Record> {
        self.locate(kind, id)
            .await?
            .map(|s| s.record)
            .ok_or_else(|| not_found(kind, id))
    }

    async fn list(&self, kind: RecordKind, filter: &RecordFilter) -> Result<Vec<Record>> {
        let mut filter = filter.clone();
        filter.project = filter.project.map(|p| sanitize_project(&p));
        let limit = filter.limit.unwrap_or(self.list_limit);
        let records: Vec<Record> = self
            .scan(kind, filter.project.as_deref())
            .await?
            .into_iter()
            .map(|s| s.record)
            .filter(|r| filter.matches(r))
            .take(limit)
            .collect();
        debug!(kind = %kind, count = records.len(), "📋 list");
        Ok(records)
    }

    async fn search(
        &self,
        kind: RecordKind,
        query: &str,
        project: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(StoreError::InvalidArgument("search query must not be empty".into()).into());
        }
        let needle: Vec<char> = query.chars().flat_map(char::to_lowercase).collect();
        let limit = limit.unwrap_or(self.search_limit);
        let project = project.map(sanitize_project);

        let mut hits = Vec::new();
        for stored in self.scan(kind, project.as_deref()).await? {
            if hits.len() >= limit {
                break;
            }
            if let Some(pos) = find_case_insensitive(&stored.text, &needle) {
                hits.push(SearchHit {
                    excerpt: excerpt_at(&stored.text, pos, self.excerpt_chars),
                    record: stored.record,
                });
            }
        }
        debug!(kind = %kind, query = %query, hits = hits.len(), "🔍 search");
        Ok(hits)
    }

    async fn update(&self, kind: RecordKind, id: &str, patch: RecordPatch) -> Result<Record> {
        let stored = self
            .locate(kind, id)
            .await?
            .ok_or_else(|| not_found(kind, id))?;
        let mut record = stored.record.clone();
        patch.apply(&mut record);
        record.updated = next_timestamp(&record.updated);

        let target = patch
            .project
            .as_deref()
            .map(sanitize_project)
            .filter(|p| *p != record.project);

        let Some(project) = target else {
            self.overwrite(&stored.path, &record).await?;
            debug!(kind = %kind, id = %id, "✏️ 记录已更新");
            return Ok(record);
        };

        if let Some(task) = record.task.as_mut()
            && self.project_serials(&project).await?.contains(&task.serial)
        {
            task.serial = self.next_serial(&project).await?;
        }
        let from = std::mem::replace(&mut record.project, project.clone());

        let dir = self.kind_dir(kind).join(&project);
        let mut new_path = match stored.path.file_name() {
            Some(name) => dir.join(name),
            None => dir.join(record_file_name(Utc::now(), &record.id)),
        };
        if tokio::fs::try_exists(&new_path).await? {
            new_path = dir.join(record_file_name(Utc::now(), &record.id));
        }
        self.write_new(&new_path, &codec::encode(&record)?).await?;
        tokio::fs::remove_file(&stored.path).await?;
        info!(kind = %kind, id = %id, from = %from, to = %project, "📦 记录已迁移项目");
        Ok(record)
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<usize> {
        let Some(stored) = self.locate(kind, id).await? else {
            debug!(kind = %kind, id = %id, "delete: 记录不存在");
            return Ok(0);
        };

        if kind == RecordKind::Memory {
            tokio::fs::remove_file(&stored.path).await?;
            info!(kind = %kind, id = %id, "🗑️ 记录已删除");
            return Ok(1);
        }

        let all = self.scan(RecordKind::Task, None).await?;
        let mut doomed: HashSet<String> = HashSet::from([id.to_string()]);
        let mut queue = VecDeque::from([stored.record.clone()]);
        while let Some(current) = queue.pop_front() {
            for candidate in &all {
                if doomed.contains(&candidate.record.id) {
                    continue;
                }
                if candidate.record.parent_task() == Some(current.id.as_str())
                    || current.subtasks().contains(&candidate.record.id)
                {
                    doomed.insert(candidate.record.id.clone());
                    queue.push_back(candidate.record.clone());
                }
            }
        }

        tokio::fs::remove_file(&stored.path).await?;
        let mut removed = 1;
        for s in all
            .iter()
            .filter(|s| s.path != stored.path && doomed.contains(&s.record.id))
        {
            match tokio::fs::remove_file(&s.path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        // 幸存任务里指向已删除任务的 subtasks 一并清理
        for s in all.iter().filter(|s| !doomed.contains(&s.record.id)) {
            if !s.record.subtasks().iter().any(|c| doomed.contains(c)) {
                continue;
            }
            let mut record = s.record.clone();
            if let Some(task) = record.task.as_mut() {
                task.subtasks.retain(|c| !doomed.contains(c));
            }
            record.updated = next_timestamp(&record.updated);
            self.overwrite(&s.path, &record).await?;
        }

        info!(kind = %kind, id = %id, removed = removed, "🗑️ 任务及子任务已删除");
        Ok(removed)
    }

    async fn projects(&self, kind: RecordKind) -> Result<Vec<(String, usize)>> {
        let mut out = Vec::new();
        for dir in list_subdirs(&self.kind_dir(kind)).await? {
            let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            out.push((name, list_md_files(&dir).await?.len()));
        }
        Ok(out)
    }

    async fn link_memory(&self, task_id: &str, connection: MemoryConnection) -> Result<Record> {
        if connection.memory_id.trim().is_empty() {
            return Err(StoreError::InvalidArgument("memory_id must not be empty".into()).into());
        }
        let stored = self
            .locate(RecordKind::Task, task_id)
            .await?
            .ok_or_else(|| not_found(RecordKind::Task, task_id))?;
        let mut record = stored.record.clone();
        if let Some(task) = record.task.as_mut() {
            match task
                .memory_connections
                .iter_mut()
                .find(|c| c.memory_id == connection.memory_id)
            {
                Some(existing) => *existing = connection,
                None => task.memory_connections.push(connection),
            }
        }
        record.updated = next_timestamp(&record.updated);
        self.overwrite(&stored.path, &record).await?;
        Ok(record)
    }
}

// ── 私有工具函数 ──────────────────────────────────────────────────────────────

fn not_found(kind: RecordKind, id: &str) -> MdmemError {
    StoreError::NotFound {
        kind: kind.to_string(),
        id: id.to_string(),
    }
    .into()
}

fn new_id(kind: RecordKind) -> String {
    format!("{}-{}", kind.id_prefix(), uuid::Uuid::new_v4().simple())
}

fn short_id(id: &str) -> String {
    let tail = id.split_once('-').map(|(_, rest)| rest).unwrap_or(id);
    tail.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect()
}

fn record_file_name(now: DateTime<Utc>, id: &str) -> String {
    format!("{}-{}.md", now.format("%Y%m%d-%H%M%S"), short_id(id))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// 严格大于 `prev` 的当前时间
pub(crate) fn next_timestamp(prev: &str) -> String {
    let now = Utc::now().trunc_subsecs(6);
    let next = match DateTime::parse_from_rfc3339(prev) {
        Ok(prev) => {
            let prev = prev.with_timezone(&Utc);
            if now <= prev {
                prev + Duration::microseconds(1)
            } else {
                now
            }
        }
        Err(_) => now,
    };
    format_timestamp(next)
}

fn parse_serial(serial: &str) -> Option<u64> {
    serial.strip_prefix("T-")?.parse().ok()
}

fn format_serial(n: u64) -> String {
    format!("T-{:04}", n)
}

/// 项目名转为安全的目录名
pub fn sanitize_project(project: &str) -> String {
    let mut cleaned: String = project
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.starts_with('.') {
        cleaned.replace_range(0..1, "_");
    }
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        DEFAULT_PROJECT.to_string()
    } else {
        cleaned
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

fn find_case_insensitive(haystack: &str, needle: &[char]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.char_indices().map(|(i, _)| i).find(|&i| {
        let mut lowered = haystack[i..].chars().flat_map(char::to_lowercase);
        needle.iter().all(|c| lowered.next() == Some(*c))
    })
}

/// 从命中位置前约 1/4 窗口处开始截取，空白折叠为单个空格
fn excerpt_at(text: &str, pos: usize, max_chars: usize) -> String {
    let lead = max_chars / 4;
    let before: Vec<usize> = text[..pos].char_indices().map(|(i, _)| i).collect();
    let start = if before.len() > lead {
        before[before.len() - lead]
    } else {
        0
    };
    let window = &text[start..];
    let truncated = window.chars().nth(max_chars).is_some();
    let snippet: String = window.chars().take(max_chars).collect();
    let mut excerpt = snippet.split_whitespace().collect::<Vec<_>>().join(" ");
    if start > 0 {
        excerpt.insert(0, '…');
    }
    if truncated {
        excerpt.push('…');
    }
    excerpt
}

async fn list_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

async fn list_md_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some("md")
        {
            files.push(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        (dir, store)
    }

    fn record_file(root: &Path, id: &str) -> PathBuf {
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).unwrap().flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if std::fs::read_to_string(&path)
                    .is_ok_and(|text| text.contains(&format!("id: {}\n", id)))
                {
                    return path;
                }
            }
        }
        panic!("no file for {}", id);
    }

    fn count_md_files(root: &Path) -> usize {
        let mut count = 0;
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
                    count += 1;
                }
            }
        }
        count
    }

    #[tokio::test]
    async fn test_memory_lifecycle_scenario() {
        let (_dir, store) = store();
        let rec = store
            .create(
                RecordKind::Memory,
                NewRecord::with_body("buy milk").project("home"),
            )
            .await
            .unwrap();
        assert!(rec.id.starts_with("mem-"));

        let got = store.get(RecordKind::Memory, &rec.id).await.unwrap();
        assert_eq!(got.body, "buy milk");
        assert_eq!(got.project, "home");
        assert_eq!(got.status, "active");
        assert_eq!(got, rec);

        let hits = store
            .search(RecordKind::Memory, "milk", None, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, rec.id);

        assert_eq!(store.delete(RecordKind::Memory, &rec.id).await.unwrap(), 1);
        let err = store.get(RecordKind::Memory, &rec.id).await.unwrap_err();
        assert!(matches!(err, MdmemError::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_file_layout() {
        let (dir, store) = store();
        let rec = store
            .create(RecordKind::Memory, NewRecord::with_body("x").project("work"))
            .await
            .unwrap();
        let project_dir = dir.path().join("memories").join("work");
        let files: Vec<_> = std::fs::read_dir(&project_dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 1);
        let name = &files[0];
        assert!(name.ends_with(&format!("-{}.md", &rec.id[4..12])));
        assert_eq!(name.len(), "20261016-083000-12345678.md".len());

        let text = std::fs::read_to_string(project_dir.join(name)).unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.contains("\n---\n\nx\n"));
    }

    #[tokio::test]
    async fn test_ids_and_serials_unique() {
        let (_dir, store) = store();
        let mut ids = HashSet::new();
        let mut serials = HashSet::new();
        for i in 0..12 {
            let rec = store
                .create(
                    RecordKind::Task,
                    NewRecord::with_body(format!("task {i}")).project("p"),
                )
                .await
                .unwrap();
            assert!(ids.insert(rec.id.clone()));
            assert!(serials.insert(rec.serial().unwrap().to_string()));
        }
        assert!(serials.contains("T-0001"));
        assert!(serials.contains("T-0012"));

        let other = store
            .create(RecordKind::Task, NewRecord::with_body("x").project("q"))
            .await
            .unwrap();
        assert_eq!(other.serial(), Some("T-0001"));
    }

    #[tokio::test]
    async fn test_noop_update_only_advances_updated() {
        let (_dir, store) = store();
        let rec = store
            .create(RecordKind::Memory, NewRecord::with_body("note"))
            .await
            .unwrap();
        let first = store
            .update(RecordKind::Memory, &rec.id, RecordPatch::default())
            .await
            .unwrap();
        let second = store
            .update(RecordKind::Memory, &rec.id, RecordPatch::default())
            .await
            .unwrap();

        assert!(first.updated > rec.updated);
        assert!(second.updated > first.updated);
        let mut normalized = second.clone();
        normalized.updated = rec.updated.clone();
        assert_eq!(normalized, rec);

        let stored = store.get(RecordKind::Memory, &rec.id).await.unwrap();
        assert_eq!(stored, second);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let (_dir, store) = store();
        let rec = store
            .create(
                RecordKind::Task,
                NewRecord::with_body("draft").title("Old"),
            )
            .await
            .unwrap();
        let patch = RecordPatch {
            status: Some("done".into()),
            tags: Some(vec!["x".into()]),
            body: Some("\nfinal\n\n".into()),
            title: Some("New".into()),
            ..Default::default()
        };
        let updated = store.update(RecordKind::Task, &rec.id, patch).await.unwrap();
        assert_eq!(updated.status, "done");
        assert_eq!(updated.tags, vec!["x".to_string()]);
        assert_eq!(updated.body, "final");
        assert_eq!(updated.task.as_ref().unwrap().title, "New");
        assert_eq!(updated.priority, rec.priority);
        assert_eq!(updated.created, rec.created);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store
            .update(RecordKind::Task, "task-nope", RecordPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MdmemError::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_project_move_relocates_file() {
        let (dir, store) = store();
        let rec = store
            .create(RecordKind::Memory, NewRecord::with_body("m").project("a"))
            .await
            .unwrap();
        let moved = store
            .update(
                RecordKind::Memory,
                &rec.id,
                RecordPatch {
                    project: Some("b".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.project, "b");
        assert_eq!(count_md_files(&dir.path().join("memories/a")), 0);
        assert_eq!(count_md_files(&dir.path().join("memories/b")), 1);

        let in_a = store
            .list(RecordKind::Memory, &RecordFilter::default().project("a"))
            .await
            .unwrap();
        assert!(in_a.is_empty());
        let in_b = store
            .list(RecordKind::Memory, &RecordFilter::default().project("b"))
            .await
            .unwrap();
        assert_eq!(in_b.len(), 1);
        assert_eq!(in_b[0].id, rec.id);
    }

    #[tokio::test]
    async fn test_project_move_reassigns_colliding_serial() {
        let (_dir, store) = store();
        let a = store
            .create(RecordKind::Task, NewRecord::with_body("a").project("a"))
            .await
            .unwrap();
        store
            .create(RecordKind::Task, NewRecord::with_body("b").project("b"))
            .await
            .unwrap();
        assert_eq!(a.serial(), Some("T-0001"));
        let moved = store
            .update(
                RecordKind::Task,
                &a.id,
                RecordPatch {
                    project: Some("b".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.serial(), Some("T-0002"));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_subtasks() {
        let (dir, store) = store();
        let parent = store
            .create(RecordKind::Task, NewRecord::with_body("parent"))
            .await
            .unwrap();
        let c1 = store
            .create(RecordKind::Task, NewRecord::with_body("c1").parent(&parent.id))
            .await
            .unwrap();
        store
            .create(RecordKind::Task, NewRecord::with_body("c2").parent(&parent.id))
            .await
            .unwrap();
        let unrelated = store
            .create(RecordKind::Task, NewRecord::with_body("other"))
            .await
            .unwrap();

        let reloaded = store.get(RecordKind::Task, &parent.id).await.unwrap();
        assert_eq!(reloaded.subtasks().len(), 2);
        assert!(reloaded.subtasks().contains(&c1.id));
        assert_eq!(count_md_files(dir.path()), 4);

        assert_eq!(store.delete(RecordKind::Task, &parent.id).await.unwrap(), 3);
        assert_eq!(count_md_files(dir.path()), 1);
        assert!(store.get(RecordKind::Task, &unrelated.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_cascades_recursively() {
        let (dir, store) = store();
        let root = store
            .create(RecordKind::Task, NewRecord::with_body("root"))
            .await
            .unwrap();
        let child = store
            .create(RecordKind::Task, NewRecord::with_body("child").parent(&root.id))
            .await
            .unwrap();
        let grandchild = store
            .create(RecordKind::Task, NewRecord::with_body("grandchild").parent(&child.id))
            .await
            .unwrap();
        store
            .create(RecordKind::Task, NewRecord::with_body("great").parent(&grandchild.id))
            .await
            .unwrap();
        let survivor = store
            .create(RecordKind::Task, NewRecord::with_body("other"))
            .await
            .unwrap();

        assert_eq!(store.delete(RecordKind::Task, &root.id).await.unwrap(), 4);
        assert_eq!(count_md_files(dir.path()), 1);
        assert!(store.get(RecordKind::Task, &survivor.id).await.is_ok());
        assert!(store.get(RecordKind::Task, &grandchild.id).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_cascades_through_hand_edited_subtasks() {
        let (dir, store) = store();
        let parent = store
            .create(RecordKind::Task, NewRecord::with_body("parent"))
            .await
            .unwrap();
        // 只出现在父任务 subtasks 中、自身没有 parent_task 的子任务
        let listed = store
            .create(RecordKind::Task, NewRecord::with_body("listed"))
            .await
            .unwrap();
        let nested = store
            .create(RecordKind::Task, NewRecord::with_body("nested").parent(&listed.id))
            .await
            .unwrap();
        assert!(listed.parent_task().is_none());

        let path = record_file(dir.path(), &parent.id);
        let text = std::fs::read_to_string(&path).unwrap();
        let mut edited = codec::decode(RecordKind::Task, &text).unwrap();
        edited.task.as_mut().unwrap().subtasks.push(listed.id.clone());
        std::fs::write(&path, codec::encode(&edited).unwrap()).unwrap();

        assert_eq!(store.delete(RecordKind::Task, &parent.id).await.unwrap(), 3);
        assert_eq!(count_md_files(dir.path()), 0);
        assert!(store.get(RecordKind::Task, &nested.id).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_child_prunes_parent_subtasks() {
        let (_dir, store) = store();
        let parent = store
            .create(RecordKind::Task, NewRecord::with_body("parent"))
            .await
            .unwrap();
        let child = store
            .create(RecordKind::Task, NewRecord::with_body("c").parent(&parent.id))
            .await
            .unwrap();
        assert_eq!(store.delete(RecordKind::Task, &child.id).await.unwrap(), 1);
        let parent = store.get(RecordKind::Task, &parent.id).await.unwrap();
        assert!(parent.subtasks().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_returns_zero() {
        let (_dir, store) = store();
        assert_eq!(store.delete(RecordKind::Memory, "mem-missing").await.unwrap(), 0);
        assert_eq!(store.delete(RecordKind::Task, "task-missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_with_unknown_parent_fails() {
        let (dir, store) = store();
        let err = store
            .create(RecordKind::Task, NewRecord::with_body("c").parent("task-ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, MdmemError::Store(StoreError::InvalidArgument(_))));
        assert_eq!(count_md_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_list_filters_and_limit() {
        let (_dir, store) = store();
        for i in 0..5 {
            let mut draft = NewRecord::with_body(format!("m{i}")).project("home");
            draft.status = Some(if i % 2 == 0 { "active" } else { "archived" }.into());
            store.create(RecordKind::Memory, draft).await.unwrap();
        }
        store
            .create(RecordKind::Memory, NewRecord::with_body("w").project("work"))
            .await
            .unwrap();

        let all = store
            .list(RecordKind::Memory, &RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 6);

        let active_home = store
            .list(
                RecordKind::Memory,
                &RecordFilter::default().project("home").status("active"),
            )
            .await
            .unwrap();
        assert_eq!(active_home.len(), 3);

        let limited = store
            .list(RecordKind::Memory, &RecordFilter::default().limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_list_reverse_filename_order() {
        let (dir, store) = store();
        let project_dir = dir.path().join("memories").join("default");
        std::fs::create_dir_all(&project_dir).unwrap();
        for (name, id) in [
            ("20240101-000000-aaaaaaaa.md", "mem-old"),
            ("20260101-000000-bbbbbbbb.md", "mem-new"),
            ("20250101-000000-cccccccc.md", "mem-mid"),
        ] {
            std::fs::write(project_dir.join(name), format!("---\nid: {id}\n---\n\nbody\n")).unwrap();
        }
        let ids: Vec<String> = store
            .list(RecordKind::Memory, &RecordFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["mem-new", "mem-mid", "mem-old"]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_skipped() {
        let (dir, store) = store();
        let good = store
            .create(RecordKind::Memory, NewRecord::with_body("milk run"))
            .await
            .unwrap();
        let project_dir = dir.path().join("memories").join("default");
        std::fs::write(project_dir.join("99999999-999999-broken.md"), "milk but no frontmatter").unwrap();
        std::fs::write(project_dir.join("99999999-999998-badyaml.md"), "---\nid: [milk\n---\n").unwrap();

        let all = store
            .list(RecordKind::Memory, &RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        let hits = store
            .search(RecordKind::Memory, "milk", None, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, good.id);
    }

    #[tokio::test]
    async fn test_missing_root_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("not-yet"));
        assert!(store
            .list(RecordKind::Task, &RecordFilter::default())
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .search(RecordKind::Task, "x", None, None)
            .await
            .unwrap()
            .is_empty());
        assert!(store.projects(RecordKind::Task).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_case_insensitive_with_project_and_excerpt() {
        let (_dir, store) = store();
        let long_body = format!("{} Remember the MILK carton {}", "a".repeat(300), "b".repeat(300));
        let rec = store
            .create(RecordKind::Memory, NewRecord::with_body(long_body).project("home"))
            .await
            .unwrap();
        store
            .create(RecordKind::Memory, NewRecord::with_body("milk elsewhere").project("work"))
            .await
            .unwrap();

        let hits = store
            .search(RecordKind::Memory, "milk", Some("home"), None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, rec.id);
        assert!(hits[0].excerpt.contains("MILK"));
        assert!(hits[0].excerpt.starts_with('…'));
        assert!(hits[0].excerpt.ends_with('…'));

        let frontmatter_hit = store
            .search(RecordKind::Memory, "PROJECT: WORK", None, None)
            .await
            .unwrap();
        assert_eq!(frontmatter_hit.len(), 1);

        let limited = store
            .search(RecordKind::Memory, "milk", None, Some(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        let err = store
            .search(RecordKind::Memory, "   ", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MdmemError::Store(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_link_memory_replaces_by_id() {
        let (_dir, store) = store();
        let task = store
            .create(RecordKind::Task, NewRecord::with_body("t"))
            .await
            .unwrap();
        store
            .link_memory(&task.id, MemoryConnection::new("mem-1"))
            .await
            .unwrap();
        let linked = store
            .link_memory(
                &task.id,
                MemoryConnection {
                    memory_id: "mem-1".into(),
                    relevance: 0.5,
                    connection_type: "blocker".into(),
                },
            )
            .await
            .unwrap();
        let conns = &linked.task.as_ref().unwrap().memory_connections;
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].connection_type, "blocker");
        assert_eq!(store.get(RecordKind::Task, &task.id).await.unwrap(), linked);
    }

    #[tokio::test]
    async fn test_projects_counts() {
        let (_dir, store) = store();
        for project in ["b", "a", "a"] {
            store
                .create(RecordKind::Memory, NewRecord::with_body("x").project(project))
                .await
                .unwrap();
        }
        let projects = store.projects(RecordKind::Memory).await.unwrap();
        assert_eq!(projects, vec![("a".to_string(), 2), ("b".to_string(), 1)]);
    }

    #[test]
    fn test_sanitize_project() {
        assert_eq!(sanitize_project("home"), "home");
        assert_eq!(sanitize_project("../etc/passwd"), "_._etc_passwd");
        assert_eq!(sanitize_project("  "), "default");
        assert_eq!(sanitize_project("工作 notes"), "工作 notes");
        assert_eq!(sanitize_project("a/b\\c"), "a_b_c");
    }

    #[test]
    fn test_next_timestamp_strictly_increases() {
        let future = "2999-01-01T00:00:00.000000Z";
        assert_eq!(next_timestamp(future), "2999-01-01T00:00:00.000001Z");
        let a = next_timestamp("not a date");
        let b = next_timestamp(&a);
        assert!(b > a);
    }

    #[test]
    fn test_excerpt_short_text_untouched() {
        assert_eq!(excerpt_at("hello\n world", 0, 160), "hello world");
        assert_eq!(find_case_insensitive("Grüße", &['ü']), Some(2));
    }
}
