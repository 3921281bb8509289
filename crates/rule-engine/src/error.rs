//! 规则引擎错误类型
//!
//! 这里只包含规则定义错误（构造/编译期）。校验失败不是错误，
//! 而是 [`FormErrors`](crate::models::FormErrors) 形式的正常返回值。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("无效的前置条件规则 '{0}': 缺少子规则")]
    InvalidPrecondition(String),

    #[error("无效的规则 '{path}': 缺少必填属性 {attributes}")]
    MissingAttributes { path: String, attributes: String },

    #[error("无效的规则 '{0}': 需要 'operator' 或 'filter' 属性")]
    MissingTest(String),

    #[error("操作符尚未实现: {0}")]
    OperatorNotImplemented(String),

    #[error("无效的规则树: {0}")]
    InvalidTree(String),

    #[error("规则集未找到: {0}")]
    RuleSetNotFound(String),

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("读取规则文件失败: {0}")]
    Io(#[from] std::io::Error),
}

impl RuleError {
    /// 是否为规则定义本身的问题（需要修正配置，而不是重试）
    pub fn is_definition_error(&self) -> bool {
        !matches!(self, Self::RuleSetNotFound(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
