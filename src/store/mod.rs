//! 记录存储
//!
//! 记忆与任务以 markdown + YAML frontmatter 文件的形式保存在项目分目录下：
//!
//! ```text
//! <store_root>/
//! ├── memories/
//! │   └── <project>/20261016-083000-5f0c2a1b.md
//! └── tasks/
//!     └── <project>/20261016-083512-9e4d7c20.md
//! ```
//!
//! | 层次 | 实现 |
//! |------|------|
//! | 编解码 | [`codec::encode`] / [`codec::decode`]，纯函数 |
//! | 存储 | [`RecordStore`] / [`FileStore`]，负责全部文件 IO |
//!
//! 没有索引也没有缓存：每次读取都扫描目录。
//!
//! ```rust,no_run
//! use mdmem::store::{FileStore, NewRecord, RecordKind, RecordStore};
//!
//! # async fn example() -> mdmem::error::Result<()> {
//! let store = FileStore::new("~/.mdmem");
//! let rec = store
//!     .create(RecordKind::Memory, NewRecord::with_body("buy milk").project("home"))
//!     .await?;
//! let hits = store.search(RecordKind::Memory, "milk", None, None).await?;
//! assert_eq!(hits[0].record.id, rec.id);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod file_store;
pub mod record;

pub use file_store::FileStore;
pub use record::{
    MemoryConnection, NewRecord, Record, RecordFilter, RecordKind, RecordPatch, SearchHit,
    TaskFields,
};

use crate::error::Result;
use async_trait::async_trait;

/// 记录存储的统一接口
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 新建记录，分配 id / 时间戳（任务还会分配项目内唯一的 serial）
    async fn create(&self, kind: RecordKind, draft: NewRecord) -> Result<Record>;

    /// 按 id 获取，不存在时返回 `StoreError::NotFound`
    async fn get(&self, kind: RecordKind, id: &str) -> Result<Record>;

    /// 精确匹配过滤，按文件名倒序（近似最新优先），截断到 limit
    async fn list(&self, kind: RecordKind, filter: &RecordFilter) -> Result<Vec<Record>>;

    /// 大小写不敏感的子串过滤，不排序打分
    async fn search(
        &self,
        kind: RecordKind,
        query: &str,
        project: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>>;

    /// 合并补丁并刷新 `updated`；修改 project 时迁移文件
    async fn update(&self, kind: RecordKind, id: &str, patch: RecordPatch) -> Result<Record>;

    /// 删除记录，任务会级联删除子任务。返回删除的文件数，id 不存在时为 0。
    async fn delete(&self, kind: RecordKind, id: &str) -> Result<usize>;

    /// 列出项目及其记录数
    async fn projects(&self, kind: RecordKind) -> Result<Vec<(String, usize)>>;

    /// 为任务添加记忆软链接（同一 memory_id 覆盖旧值）
    async fn link_memory(&self, task_id: &str, connection: MemoryConnection) -> Result<Record>;
}
