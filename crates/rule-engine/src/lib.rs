//! 参照数据规则引擎
//!
//! 对任意 JSON 对象执行声明式校验规则，支持：
//! - 与后端 `RuleVO` 兼容的规则定义和解析
//! - 前置条件（条件满足时才评估子规则）
//! - 规则取反
//! - 扁平规则列表的树组装
//! - 线程安全的规则集缓存

pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod models;
pub mod operators;
pub mod store;
pub mod tree;
pub mod utils;

pub use compiler::{CompiledRule, Predicate, RuleCompiler};
pub use error::{Result, RuleError};
pub use evaluator::{Comparator, ConditionEvaluator};
pub use executor::RuleExecutor;
pub use models::{
    AsObjectOptions, EvaluationResult, Expected, FormErrors, FromObjectOptions, Rule, RuleFilter,
    get_path, merge_form_errors,
};
pub use operators::{RuleOperator, inverse_operator};
pub use store::{RuleStore, RuleStoreStats};
pub use tree::{RuleTree, RuleTreeNode};
pub use utils::{RuleSet, RuleUtils};
