pub mod config;
pub mod error;
pub mod mcp;
pub mod store;
pub mod testing;
pub mod tools;

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{MdmemError, Result};
    pub use crate::mcp::McpServer;
    pub use crate::store::{FileStore, NewRecord, Record, RecordKind, RecordStore};
    pub use crate::tools::{Tool, ToolManager, ToolParameters, ToolResult, builtin_tools};
}
