//! 规则编译器
//!
//! 将声明式规则编译为不可变的执行树。编译是纯函数，不会修改原始规则，
//! 因此同一份规则可以在多个线程中并发编译和执行。

use crate::error::{Result, RuleError};
use crate::evaluator::{Comparator, ConditionEvaluator};
use crate::models::{Expected, Rule, RuleFilter, get_path, is_blank};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// 单个节点的判定函数
#[derive(Clone)]
pub enum Predicate {
    /// 按路径取值后与期望值比较
    Comparison {
        path: Vec<String>,
        comparator: Comparator,
        expected: Expected,
    },
    /// 调用方提供的过滤函数
    Custom(RuleFilter),
}

impl Predicate {
    /// 对候选对象求值
    pub fn test(&self, source: &Value) -> bool {
        match self {
            Self::Comparison {
                path,
                comparator,
                expected,
            } => ConditionEvaluator::evaluate(get_path(source, path), *comparator, expected),
            Self::Custom(filter) => filter(source),
        }
    }

    /// 转换为闭包形式的过滤函数
    pub fn into_filter(self) -> RuleFilter {
        match self {
            Self::Custom(filter) => filter,
            comparison => Arc::new(move |source: &Value| comparison.test(source)),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comparison {
                path,
                comparator,
                expected,
            } => f
                .debug_struct("Comparison")
                .field("path", &path.join("."))
                .field("comparator", comparator)
                .field("expected", expected)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// 编译后的规则
#[derive(Debug, Clone)]
pub enum CompiledRule {
    /// 普通校验规则，失败时产生 `{name: {label: message}}`
    Check {
        label: String,
        name: String,
        message: String,
        predicate: Predicate,
    },
    /// 前置条件：`gate` 通过时才评估子规则
    Precondition {
        label: String,
        gate: Predicate,
        children: Vec<CompiledRule>,
    },
}

impl CompiledRule {
    pub fn label(&self) -> &str {
        match self {
            Self::Check { label, .. } | Self::Precondition { label, .. } => label,
        }
    }

    /// 节点自身的判定函数
    pub fn predicate(&self) -> &Predicate {
        match self {
            Self::Check { predicate, .. } => predicate,
            Self::Precondition { gate, .. } => gate,
        }
    }

    /// 规则树中引用的所有字段路径
    pub fn required_fields(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, fields: &mut BTreeSet<String>) {
        if let Predicate::Comparison { path, .. } = self.predicate() {
            fields.insert(path.join("."));
        }
        if let Self::Precondition { children, .. } = self {
            for child in children {
                child.collect_fields(fields);
            }
        }
    }

    /// 树中节点总数
    pub fn node_count(&self) -> usize {
        match self {
            Self::Check { .. } => 1,
            Self::Precondition { children, .. } => {
                1 + children.iter().map(CompiledRule::node_count).sum::<usize>()
            }
        }
    }
}

/// 规则编译器
pub struct RuleCompiler {
    compile_version: u64,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self { compile_version: 0 }
    }

    /// 已完成的编译次数（用于缓存失效判断）
    pub fn compile_version(&self) -> u64 {
        self.compile_version
    }

    /// 从 JSON 字符串编译规则
    pub fn compile_from_json(&mut self, json: &str) -> Result<CompiledRule> {
        let rule: Rule = serde_json::from_str(json)?;
        self.compile(&rule)
    }

    /// 编译规则（包括整棵子树）
    pub fn compile(&mut self, rule: &Rule) -> Result<CompiledRule> {
        let compiled = Self::compile_node(rule, "root")?;
        self.compile_version += 1;
        Ok(compiled)
    }

    fn compile_node(rule: &Rule, path: &str) -> Result<CompiledRule> {
        Self::validate_node(rule, path)?;
        let predicate = Self::predicate(rule, path)?;

        if rule.precondition {
            let children = rule
                .children
                .iter()
                .enumerate()
                .map(|(i, child)| {
                    let child_path = format!("{}.children[{}]", path, i);
                    Self::compile_node(child, &child_path)
                })
                .collect::<Result<Vec<_>>>()?;

            return Ok(CompiledRule::Precondition {
                label: rule.label.clone(),
                gate: predicate,
                children,
            });
        }

        Ok(CompiledRule::Check {
            label: rule.label.clone(),
            name: rule.name.clone(),
            message: rule.message.clone(),
            predicate,
        })
    }

    /// 验证单个节点（不递归）
    fn validate_node(rule: &Rule, path: &str) -> Result<()> {
        if rule.precondition {
            if rule.children.is_empty() {
                return Err(RuleError::InvalidPrecondition(Self::describe(rule, path)));
            }
            return Ok(());
        }

        let missing: Vec<&str> = [
            ("'label'", &rule.label),
            ("'name'", &rule.name),
            ("'message'", &rule.message),
        ]
        .into_iter()
        .filter(|(_, value)| is_blank(value))
        .map(|(attribute, _)| attribute)
        .collect();

        if !missing.is_empty() {
            return Err(RuleError::MissingAttributes {
                path: Self::describe(rule, path),
                attributes: missing.join(", "),
            });
        }

        if rule.operator.is_none() && rule.filter.is_none() {
            return Err(RuleError::MissingTest(Self::describe(rule, path)));
        }

        Ok(())
    }

    /// 构建节点自身的判定函数，自定义过滤函数优先于操作符
    fn predicate(rule: &Rule, path: &str) -> Result<Predicate> {
        if let Some(filter) = &rule.filter {
            return Ok(Predicate::Custom(filter.clone()));
        }

        let operator = rule
            .operator
            .ok_or_else(|| RuleError::MissingTest(Self::describe(rule, path)))?;

        if is_blank(&rule.name) {
            return Err(RuleError::MissingAttributes {
                path: Self::describe(rule, path),
                attributes: "'name'".to_string(),
            });
        }

        Ok(Predicate::Comparison {
            path: rule.name.split('.').map(str::to_string).collect(),
            comparator: Comparator::try_from(operator)?,
            expected: rule.expected(),
        })
    }

    fn describe(rule: &Rule, path: &str) -> String {
        if is_blank(rule.display_name()) {
            path.to_string()
        } else {
            format!("{} ({})", rule.display_name(), path)
        }
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule {
    /// 将规则自身（不含子规则）转换为过滤函数
    pub fn as_filter_fn(&self) -> Result<RuleFilter> {
        RuleCompiler::validate_node(self, "root")?;
        Ok(RuleCompiler::predicate(self, "root")?.into_filter())
    }
}
