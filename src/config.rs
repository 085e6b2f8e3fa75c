//! 运行配置
//!
//! 优先级（低 → 高）：内置默认值 → YAML 配置文件 → 命令行参数 / 环境变量。
//!
//! ```yaml
//! store_root: ~/.mdmem
//! list_limit: 20
//! search_limit: 10
//! excerpt_chars: 160
//! ```

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_STORE_ROOT: &str = "~/.mdmem";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 记录树根目录
    pub store_root: PathBuf,
    /// list 未指定 limit 时的默认条数
    pub list_limit: usize,
    /// search 未指定 limit 时的默认条数
    pub search_limit: usize,
    /// 搜索摘录的最大字符数
    pub excerpt_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from(DEFAULT_STORE_ROOT),
            list_limit: 20,
            search_limit: 10,
            excerpt_chars: 160,
        }
    }
}

impl Config {
    /// 从 YAML 文件加载，缺省字段使用默认值
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = expand_tilde(path.as_ref());
        let file = std::fs::File::open(&path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        let config: Config = serde_yaml::from_reader(file)
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validated()
    }

    pub fn with_store_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.store_root = root.into();
        self
    }

    pub fn with_list_limit(mut self, limit: usize) -> Self {
        self.list_limit = limit;
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    /// 校验数值并展开 `~/`
    pub fn validated(mut self) -> Result<Self> {
        for (field, value) in [
            ("list_limit", self.list_limit),
            ("search_limit", self.search_limit),
            ("excerpt_chars", self.excerpt_chars),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "must be greater than 0".to_string(),
                }
                .into());
            }
        }
        self.store_root = expand_tilde(&self.store_root);
        Ok(self)
    }
}

pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.starts_with("~/")
        && let Some(home) = std::env::var("HOME")
            .ok()
            .or_else(|| std::env::var("USERPROFILE").ok())
    {
        return PathBuf::from(home).join(&s[2..]);
    }
    path.to_path_buf()
}
