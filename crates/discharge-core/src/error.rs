//! 错误定义模块

use thiserror::Error;

/// 出院协调系统统一错误类型
#[derive(Error, Debug)]
pub enum DischargeError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("消息验证错误: {0}")]
    Validation(String),

    #[error("未知影像类型: {0}")]
    UnknownImagingType(String),

    #[error("存储不可用: {0}")]
    StoreUnavailable(String),

    #[error("消息代理错误: {0}")]
    Broker(String),

    #[error("消息发布失败: {0}")]
    Publish(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },
}

/// 错误分类
///
/// 决定被拒绝的消息是否重新入队。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 消息本身无效，重试无意义
    Terminal,
    /// 依赖暂时不可用，等待重新投递
    Transient,
}

impl DischargeError {
    /// 错误分类
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) | Self::UnknownImagingType(_) | Self::Serialization(_) => {
                ErrorClass::Terminal
            }
            Self::StoreUnavailable(_)
            | Self::Broker(_)
            | Self::Publish(_)
            | Self::Config(_)
            | Self::InvalidStateTransition { .. } => ErrorClass::Transient,
        }
    }

    /// 拒绝消息时是否重新入队
    pub fn requeue(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// 出院协调系统统一结果类型
pub type Result<T> = std::result::Result<T, DischargeError>;
