//! 测试基础设施
//!
//! | 类型 | 用途 |
//! |------|------|
//! | [`MockTool`] | 替代真实工具，用于测试分发器的工具调用 / 错误处理路径 |
//!
//! - **可脚本化**：通过 `with_response()` / `with_failure()` / `with_error()` 精确控制返回值
//! - **可观测**：通过 `call_count()` / `last_args()` 检查调用情况
//! - **线程安全**：内部使用 `Arc<Mutex<_>>`，工具在 tokio 任务中执行时可安全共享

mod mock_tool;

pub use mock_tool::MockTool;
