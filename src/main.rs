//! mdmem —— 以 markdown 文件保存记忆与任务的 MCP stdio 服务
//!
//! ```bash
//! mdmem --root ~/notes/mdmem --log-level debug
//! ```
//!
//! stdout 只用于协议输出，所有日志写到 stderr。

use clap::Parser;
use mdmem::config::Config;
use mdmem::mcp::McpServer;
use mdmem::store::{FileStore, RecordStore};
use mdmem::tools::{ToolManager, builtin_tools};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mdmem", version, about = "Markdown memory & task store served over MCP stdio")]
struct Cli {
    /// YAML 配置文件
    #[arg(long, env = "MDMEM_CONFIG")]
    config: Option<PathBuf>,

    /// 记录树根目录（覆盖配置文件）
    #[arg(long, env = "MDMEM_ROOT")]
    root: Option<PathBuf>,

    /// list 默认条数
    #[arg(long, env = "MDMEM_LIST_LIMIT")]
    list_limit: Option<usize>,

    /// search 默认条数
    #[arg(long, env = "MDMEM_SEARCH_LIMIT")]
    search_limit: Option<usize>,

    /// 日志过滤，如 `info` 或 `mdmem=debug`；未设置时读取 RUST_LOG
    #[arg(long, env = "MDMEM_LOG")]
    log_level: Option<String>,
}

impl Cli {
    /// 默认值 ← 配置文件 ← 命令行 / 环境变量
    fn resolve_config(&self) -> mdmem::error::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(root) = &self.root {
            config = config.with_store_root(root);
        }
        if let Some(limit) = self.list_limit {
            config = config.with_list_limit(limit);
        }
        if let Some(limit) = self.search_limit {
            config = config.with_search_limit(limit);
        }
        config.validated()
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config = cli.resolve_config()?;
    info!(
        root = %config.store_root.display(),
        list_limit = config.list_limit,
        search_limit = config.search_limit,
        "⚙️ 配置已加载"
    );

    let store: Arc<dyn RecordStore> = Arc::new(FileStore::from_config(&config));
    let mut tools = ToolManager::new();
    tools.register_tools(builtin_tools(store));

    McpServer::new(tools).serve_stdio().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"store_root: /tmp/from-file\nlist_limit: 7\n").unwrap();

        let cli = Cli::parse_from([
            "mdmem",
            "--config",
            file.path().to_str().unwrap(),
            "--search-limit",
            "3",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.store_root, PathBuf::from("/tmp/from-file"));
        assert_eq!(config.list_limit, 7);
        assert_eq!(config.search_limit, 3);

        let cli = Cli::parse_from(["mdmem", "--root", "/tmp/flag", "--list-limit", "0"]);
        assert!(cli.resolve_config().is_err());
    }
}
