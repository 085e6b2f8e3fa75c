use std::fmt;

/// mdmem 的统一错误类型
#[derive(Debug)]
pub enum MdmemError {
    /// 记录编解码错误
    Codec(CodecError),
    /// 存储层错误
    Store(StoreError),
    /// 工具执行错误
    Tool(ToolError),
    /// 配置错误
    Config(ConfigError),
    /// IO 错误
    Io(std::io::Error),
    /// JSON 序列化错误
    Json(String),
    /// 其他错误
    Other(String),
}

/// 记录编解码错误
#[derive(Debug)]
pub enum CodecError {
    /// 缺少起始 `---`
    MissingOpeningDelimiter,
    /// 缺少结束 `---`
    MissingClosingDelimiter,
    /// frontmatter 不是合法 YAML
    InvalidYaml(String),
    /// frontmatter 不是映射
    NotAMapping,
    /// 缺少必需字段
    MissingField(&'static str),
}

/// 存储层错误
#[derive(Debug)]
pub enum StoreError {
    /// 记录不存在
    NotFound { kind: String, id: String },
    /// 文件解码失败
    Decode { path: String, source: CodecError },
    /// 参数无效（如空查询、不存在的父任务）
    InvalidArgument(String),
}

/// 工具执行错误
#[derive(Debug)]
pub enum ToolError {
    /// 工具未找到
    NotFound(String),
    /// 参数缺失
    MissingParameter(String),
    /// 参数类型错误
    InvalidParameter { name: String, message: String },
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),
    /// 配置解析失败
    ParseFailed(String),
    /// 配置值无效
    InvalidValue { field: String, message: String },
}

impl MdmemError {
    /// 是否属于调用方参数问题（映射为 JSON-RPC `-32602`）
    pub fn is_invalid_params(&self) -> bool {
        matches!(
            self,
            MdmemError::Tool(ToolError::MissingParameter(_))
                | MdmemError::Tool(ToolError::InvalidParameter { .. })
                | MdmemError::Tool(ToolError::NotFound(_))
                | MdmemError::Store(StoreError::InvalidArgument(_))
        )
    }
}

impl fmt::Display for MdmemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MdmemError::Codec(e) => write!(f, "Codec error: {}", e),
            MdmemError::Store(e) => write!(f, "Store error: {}", e),
            MdmemError::Tool(e) => write!(f, "Tool error: {}", e),
            MdmemError::Config(e) => write!(f, "Config error: {}", e),
            MdmemError::Io(e) => write!(f, "IO error: {}", e),
            MdmemError::Json(msg) => write!(f, "JSON error: {}", msg),
            MdmemError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::MissingOpeningDelimiter => {
                write!(f, "missing opening '---' delimiter")
            }
            CodecError::MissingClosingDelimiter => {
                write!(f, "missing closing '---' delimiter")
            }
            CodecError::InvalidYaml(msg) => write!(f, "invalid frontmatter YAML: {}", msg),
            CodecError::NotAMapping => write!(f, "frontmatter is not a YAML mapping"),
            CodecError::MissingField(name) => write!(f, "missing frontmatter field '{}'", name),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { kind, id } => write!(f, "{} '{}' not found", kind, id),
            StoreError::Decode { path, source } => {
                write!(f, "failed to decode '{}': {}", path, source)
            }
            StoreError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool '{}' not found", name),
            ToolError::MissingParameter(name) => write!(f, "Missing parameter: {}", name),
            ToolError::InvalidParameter { name, message } => {
                write!(f, "Invalid parameter '{}': {}", name, message)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseFailed(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, message } => {
                write!(f, "Invalid config value for '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for MdmemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MdmemError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for CodecError {}
impl std::error::Error for StoreError {}
impl std::error::Error for ToolError {}
impl std::error::Error for ConfigError {}

impl From<std::io::Error> for MdmemError {
    fn from(err: std::io::Error) -> Self {
        MdmemError::Io(err)
    }
}

impl From<serde_json::Error> for MdmemError {
    fn from(err: serde_json::Error) -> Self {
        MdmemError::Json(err.to_string())
    }
}

impl From<serde_yaml::Error> for MdmemError {
    fn from(err: serde_yaml::Error) -> Self {
        MdmemError::Codec(CodecError::InvalidYaml(err.to_string()))
    }
}

impl From<CodecError> for MdmemError {
    fn from(err: CodecError) -> Self {
        MdmemError::Codec(err)
    }
}

impl From<StoreError> for MdmemError {
    fn from(err: StoreError) -> Self {
        MdmemError::Store(err)
    }
}

impl From<ToolError> for MdmemError {
    fn from(err: ToolError) -> Self {
        MdmemError::Tool(err)
    }
}

impl From<ConfigError> for MdmemError {
    fn from(err: ConfigError) -> Self {
        MdmemError::Config(err)
    }
}

// 便捷的 Result 类型别名
pub type Result<T> = std::result::Result<T, MdmemError>;
