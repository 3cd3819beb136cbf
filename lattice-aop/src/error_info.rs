//! 错误信息结构
//!
//! 提供结构化的错误信息传递给切面

/// 结构化的错误信息
///
/// 用于在 after_throwing 通知中传递错误及其原因链
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub message: String,

    /// 原因链，从直接原因到根因
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    pub fn from_error(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            source_chain: error.chain().skip(1).map(|cause| cause.to_string()).collect(),
        }
    }

    /// 只包含消息
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source_chain: Vec::new(),
        }
    }

    pub fn root_cause(&self) -> &str {
        self.source_chain.last().unwrap_or(&self.message)
    }

    /// 获取完整的错误描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!("{}\nCaused by:\n  {}", self.message, self.source_chain.join("\n  "))
        }
    }
}
