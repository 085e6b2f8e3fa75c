//! MCP 服务端：stdio 上的 JSON-RPC 2.0 分发
//!
//! 典型用法：
//! ```rust,no_run
//! use mdmem::mcp::McpServer;
//! use mdmem::store::{FileStore, RecordStore};
//! use mdmem::tools::{ToolManager, builtin_tools};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> mdmem::error::Result<()> {
//! let store: Arc<dyn RecordStore> = Arc::new(FileStore::new("~/.mdmem"));
//! let mut tools = ToolManager::new();
//! tools.register_tools(builtin_tools(store));
//!
//! McpServer::new(tools).serve_stdio().await?;
//! # Ok(())
//! # }
//! ```

pub mod server;
pub mod types;

pub use server::{McpServer, SUPPORTED_PROTOCOL_VERSIONS};
pub use types::{JsonRpcResponse, McpContent, McpTool, McpToolCallResult};
