//! 错误类型（对外暴露）
use thiserror::Error;

/// 核心库错误
#[derive(Debug, Error)]
pub enum HarnessError {
    /// 参数无法保证扫描前进（例如空标记、占位符与标记冲突）
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 配置文件读取或解析失败
    #[error("config error: {0}")]
    Config(String),

    /// 枚举事件协议的编解码错误
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        HarnessError::InvalidArgument(msg.into())
    }
}
