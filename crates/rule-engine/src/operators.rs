//! 规则操作符定义

use crate::error::{Result, RuleError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 比较操作符
///
/// 序列化形式与后端 `RuleVO.operator` 一致（`=`、`NOT IN` 等）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RuleOperator {
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    In,
    NotIn,
    Between,
    Null,
    NotNull,
}

impl RuleOperator {
    /// 全部已知操作符
    pub const ALL: [RuleOperator; 11] = [
        Self::Eq,
        Self::Neq,
        Self::Lt,
        Self::Gt,
        Self::Lte,
        Self::Gte,
        Self::In,
        Self::NotIn,
        Self::Between,
        Self::Null,
        Self::NotNull,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Lte => "<=",
            Self::Gte => ">=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Between => "BETWEEN",
            Self::Null => "NULL",
            Self::NotNull => "NOT NULL",
        }
    }

    /// 逻辑取反后的操作符
    ///
    /// `BETWEEN` 没有单一的反向操作符，返回 `OperatorNotImplemented`。
    pub fn inverse(self) -> Result<Self> {
        let inverse = match self {
            Self::Eq => Self::Neq,
            Self::Neq => Self::Eq,
            Self::Lt => Self::Gte,
            Self::Gte => Self::Lt,
            Self::Gt => Self::Lte,
            Self::Lte => Self::Gt,
            Self::In => Self::NotIn,
            Self::NotIn => Self::In,
            Self::Null => Self::NotNull,
            Self::NotNull => Self::Null,
            Self::Between => {
                return Err(RuleError::OperatorNotImplemented(self.to_string()));
            }
        };
        Ok(inverse)
    }
}

/// 对文本形式的操作符取反，未知操作符返回 `OperatorNotImplemented`
pub fn inverse_operator(operator: &str) -> Result<RuleOperator> {
    operator.parse::<RuleOperator>()?.inverse()
}

impl fmt::Display for RuleOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RuleOperator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().split_whitespace().collect::<Vec<_>>().join(" ");
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| RuleError::OperatorNotImplemented(s.to_string()))
    }
}

impl TryFrom<String> for RuleOperator {
    type Error = RuleError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RuleOperator> for String {
    fn from(op: RuleOperator) -> Self {
        op.as_str().to_string()
    }
}
