//! 规则执行器
//!
//! 对候选对象执行编译后的规则树，返回错误映射和可选的评估追踪。

use crate::compiler::{CompiledRule, RuleCompiler};
use crate::error::Result;
use crate::models::{EvaluationResult, FormErrors, Rule, merge_form_errors};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

/// 规则执行器
pub struct RuleExecutor {
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self {
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 根据 debug 标志创建执行器
    pub fn with_debug(debug: bool) -> Self {
        if debug { Self::new().with_trace() } else { Self::new() }
    }

    /// 执行规则并返回错误映射，`None` 表示没有错误
    pub fn control(&self, source: &Value, rule: &CompiledRule) -> Option<FormErrors> {
        let mut trace = Vec::new();
        self.control_node(source, rule, 0, &mut trace)
    }

    /// 依次执行多条规则并合并错误，同名键以后执行的规则为准
    pub fn control_all(&self, source: &Value, rules: &[CompiledRule]) -> Option<FormErrors> {
        let mut trace = Vec::new();
        let errors: Vec<FormErrors> = rules
            .iter()
            .filter_map(|rule| self.control_node(source, rule, 0, &mut trace))
            .collect();
        merge_form_errors(errors)
    }

    /// 执行规则，附带评估追踪和耗时
    pub fn execute(&self, source: &Value, rule: &CompiledRule) -> EvaluationResult {
        let start = Instant::now();
        let mut result = EvaluationResult::default();

        result.errors = self.control_node(source, rule, 0, &mut result.evaluation_trace);
        result.evaluation_time_us = start.elapsed().as_micros() as i64;

        result
    }

    fn control_node(
        &self,
        source: &Value,
        rule: &CompiledRule,
        depth: usize,
        trace: &mut Vec<String>,
    ) -> Option<FormErrors> {
        match rule {
            CompiledRule::Precondition {
                label,
                gate,
                children,
            } => {
                // 前置条件不满足：整棵子树不适用
                if !gate.test(source) {
                    self.trace(trace, depth, || format!("[rule] [{}] precondition KO", label));
                    return None;
                }

                self.trace(trace, depth, || {
                    format!("[rule] [{}] precondition OK - value: {}", label, source)
                });

                let errors: Vec<FormErrors> = children
                    .iter()
                    .filter_map(|child| self.control_node(source, child, depth + 1, trace))
                    .collect();

                merge_form_errors(errors)
            }
            CompiledRule::Check {
                label,
                name,
                message,
                predicate,
            } => {
                if predicate.test(source) {
                    self.trace(trace, depth, || format!("[rule] [{}] OK", label));
                    return None;
                }

                self.trace(trace, depth, || format!("[rule] [{}] KO - {}", label, message));

                Some(FormErrors::from([(
                    name.clone(),
                    BTreeMap::from([(label.clone(), message.clone())]),
                )]))
            }
        }
    }

    fn trace<F>(&self, trace: &mut Vec<String>, depth: usize, line: F)
    where
        F: FnOnce() -> String,
    {
        if !self.trace_enabled {
            return;
        }

        let line = format!("{}{}", "  ".repeat(depth), line());
        debug!("{}", line);
        trace.push(line);
    }
}

impl Default for RuleExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule {
    /// 编译并执行规则，`Ok(None)` 表示没有错误
    pub fn control(&self, source: &Value, debug: bool) -> Result<Option<FormErrors>> {
        let compiled = RuleCompiler::new().compile(self)?;
        Ok(RuleExecutor::with_debug(debug).control(source, &compiled))
    }
}
