//! 规则集合工具
//!
//! `RuleUtils` 对一组顶层规则做整体校验；`RuleSet` 在此基础上缓存编译结果。

use crate::compiler::{CompiledRule, RuleCompiler};
use crate::error::Result;
use crate::executor::RuleExecutor;
use crate::models::{FormErrors, Rule, merge_form_errors};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

impl Rule {
    /// 生成逻辑取反后的规则，原规则保持不变
    ///
    /// 有操作符时只替换为反向操作符（过滤函数在编译时按新操作符重建）；
    /// 没有操作符时对原过滤函数取反。前置条件只对自身的判定取反，子规则原样保留。
    pub fn not(&self) -> Result<Rule> {
        let mut target = self.clone();

        match self.operator {
            Some(operator) => {
                target.operator = Some(operator.inverse()?);
                target.filter = None;
            }
            None => {
                let filter = self.as_filter_fn()?;
                target.filter = Some(Arc::new(move |source: &Value| !filter(source)));
            }
        }

        Ok(target)
    }
}

/// 顶层规则列表的批量操作
pub struct RuleUtils;

impl RuleUtils {
    /// 编译全部规则
    pub fn compile(rules: &[Rule]) -> Result<Vec<CompiledRule>> {
        let mut compiler = RuleCompiler::new();
        rules.iter().map(|rule| compiler.compile(rule)).collect()
    }

    /// 执行全部规则并合并错误，`Ok(None)` 表示没有错误
    pub fn control(source: &Value, rules: &[Rule], debug: bool) -> Result<Option<FormErrors>> {
        let compiled = Self::compile(rules)?;
        Ok(RuleExecutor::with_debug(debug).control_all(source, &compiled))
    }

    /// 是否通过全部规则
    pub fn valid(entity: &Value, rules: &[Rule], debug: bool) -> Result<bool> {
        Ok(Self::control(entity, rules, debug)?.is_none())
    }

    /// 对每条规则取反，保持顺序和树结构
    pub fn not(rules: &[Rule]) -> Result<Vec<Rule>> {
        rules.iter().map(Rule::not).collect()
    }
}

/// 带编译缓存的有序规则集
///
/// 缓存由读写锁保护，可在多个线程间共享。
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
    compiled: RwLock<Vec<Option<Arc<CompiledRule>>>>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        let compiled = RwLock::new(vec![None; rules.len()]);
        Self { rules, compiled }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 规则树中的节点总数
    pub fn node_count(&self) -> usize {
        fn count(rule: &Rule) -> usize {
            1 + rule.children.iter().map(count).sum::<usize>()
        }
        self.rules.iter().map(count).sum()
    }

    /// 是否所有规则都已编译
    pub fn is_built(&self) -> bool {
        self.compiled.read().iter().all(Option::is_some)
    }

    /// 编译尚未编译的规则；`force` 为 true 时全部重新编译
    ///
    /// 遇到无效规则时立即返回错误，此前已编译的规则保留在缓存中。
    pub fn build(&self, force: bool) -> Result<()> {
        let mut compiler = RuleCompiler::new();
        let mut cache = self.compiled.write();

        for (rule, slot) in self.rules.iter().zip(cache.iter_mut()) {
            if force || slot.is_none() {
                *slot = Some(Arc::new(compiler.compile(rule)?));
            }
        }

        debug!(
            rules = self.rules.len(),
            compiled = compiler.compile_version(),
            force,
            "规则集已编译"
        );
        Ok(())
    }

    /// 执行全部规则；未缓存的规则临时编译，不写入缓存
    pub fn control(&self, source: &Value, debug: bool) -> Result<Option<FormErrors>> {
        let executor = RuleExecutor::with_debug(debug);
        let cache = self.compiled.read();
        let mut errors = Vec::new();

        for (rule, slot) in self.rules.iter().zip(cache.iter()) {
            let result = match slot {
                Some(compiled) => executor.control(source, compiled),
                None => executor.control(source, &RuleCompiler::new().compile(rule)?),
            };
            errors.extend(result);
        }

        Ok(merge_form_errors(errors))
    }

    pub fn valid(&self, entity: &Value, debug: bool) -> Result<bool> {
        Ok(self.control(entity, debug)?.is_none())
    }

    /// 取反后的新规则集（未编译）
    pub fn not(&self) -> Result<RuleSet> {
        Ok(RuleSet::new(RuleUtils::not(&self.rules)?))
    }
}

impl From<Vec<Rule>> for RuleSet {
    fn from(rules: Vec<Rule>) -> Self {
        Self::new(rules)
    }
}
