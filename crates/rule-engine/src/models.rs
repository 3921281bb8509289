//! 规则引擎领域模型
//!
//! `Rule` 是声明式的规则定义，与后端 `RuleVO` 的 JSON 结构保持兼容；
//! 编译后的可执行形式见 [`crate::compiler::CompiledRule`]。

use crate::error::{Result, RuleError};
use crate::operators::RuleOperator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// 自定义过滤函数（不参与序列化）
pub type RuleFilter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// 校验错误映射：`name -> label -> message`
pub type FormErrors = BTreeMap<String, BTreeMap<String, String>>;

/// 规则定义
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub label: String,
    /// 被校验属性的路径，如 `measurementValues.12`
    #[serde(
        default,
        alias = "controlledAttribute",
        deserialize_with = "string_or_empty"
    )]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default = "default_operator",
        deserialize_with = "operator_or_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub operator: Option<RuleOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "bool_or_false")]
    pub bidirectional: bool,
    #[serde(default, deserialize_with = "bool_or_false")]
    pub precondition: bool,
    #[serde(default, deserialize_with = "bool_or_false")]
    pub blocking: bool,
    #[serde(default, alias = "errorMessage", deserialize_with = "string_or_empty")]
    pub message: String,
    /// 父规则 ID，仅在扁平结构中使用，序列化时可通过 minify 去除
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    #[serde(
        default,
        deserialize_with = "vec_or_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub children: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_date: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub filter: Option<RuleFilter>,
}

fn default_operator() -> Option<RuleOperator> {
    Some(RuleOperator::Eq)
}

/// 缺省或空白的操作符视为 `=`，与后端的默认值保持一致
fn operator_or_default<'de, D>(deserializer: D) -> std::result::Result<Option<RuleOperator>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(s) if !is_blank(&s) => s.parse().map(Some).map_err(serde::de::Error::custom),
        _ => Ok(default_operator()),
    }
}

fn bool_or_false<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn string_or_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn vec_or_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<Rule>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Rule>>::deserialize(deserializer)?.unwrap_or_default())
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("name", &self.name)
            .field("operator", &self.operator)
            .field("value", &self.value)
            .field("values", &self.values)
            .field("precondition", &self.precondition)
            .field("message", &self.message)
            .field("parent_id", &self.parent_id)
            .field("children", &self.children)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// `Rule::from_object` 选项
#[derive(Debug, Clone, Copy)]
pub struct FromObjectOptions {
    pub with_children: bool,
}

impl Default for FromObjectOptions {
    fn default() -> Self {
        Self {
            with_children: true,
        }
    }
}

/// `Rule::as_object` 选项
#[derive(Debug, Clone, Copy, Default)]
pub struct AsObjectOptions {
    /// 去除父规则引用等仅用于本地树结构的字段
    pub minify: bool,
}

/// 规则的期望值
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    Scalar(Value),
    List(Vec<Value>),
    Missing,
}

impl Rule {
    /// 创建比较规则
    pub fn comparison(
        label: impl Into<String>,
        name: impl Into<String>,
        operator: RuleOperator,
        message: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            name: name.into(),
            operator: Some(operator),
            message: message.into(),
            ..Default::default()
        }
    }

    /// 创建前置条件规则：条件满足时才评估子规则
    pub fn precondition(
        label: impl Into<String>,
        name: impl Into<String>,
        operator: RuleOperator,
        children: Vec<Rule>,
    ) -> Self {
        Self {
            label: label.into(),
            name: name.into(),
            operator: Some(operator),
            precondition: true,
            children,
            ..Default::default()
        }
    }

    /// 创建使用自定义过滤函数的规则
    pub fn custom<F>(
        label: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
        filter: F,
    ) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            name: name.into(),
            message: message.into(),
            filter: Some(Arc::new(filter)),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_parent_id(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_children(mut self, children: Vec<Rule>) -> Self {
        self.children = children;
        self
    }

    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// 从后端返回的 JSON 对象构建规则
    pub fn from_object(source: &Value, opts: FromObjectOptions) -> Result<Self> {
        let mut rule: Rule = serde_json::from_value(source.clone())?;
        if !opts.with_children {
            rule.children.clear();
        }
        Ok(rule)
    }

    /// 序列化为 JSON 对象
    pub fn as_object(&self, opts: AsObjectOptions) -> Result<Value> {
        let mut target = serde_json::to_value(self)?;
        if opts.minify {
            strip_parent_links(&mut target);
        }
        Ok(target)
    }

    /// 期望值：优先使用非空的 `value`，否则使用 `values`
    ///
    /// `value` 本身是数组时按列表处理（成员匹配）。
    pub fn expected(&self) -> Expected {
        match (&self.value, &self.values) {
            (Some(Value::Array(items)), _) => Expected::List(items.clone()),
            (Some(value), _) if !is_value_blank(value) => Expected::Scalar(value.clone()),
            (_, Some(values)) => Expected::List(values.clone()),
            _ => Expected::Missing,
        }
    }

    /// 用于错误信息和日志的显示名
    pub fn display_name(&self) -> &str {
        if is_blank(&self.label) {
            &self.name
        } else {
            &self.label
        }
    }

    /// 检查规则定义是否完整（不编译）
    pub fn check(&self) -> Result<()> {
        if self.precondition {
            if self.children.is_empty() {
                return Err(RuleError::InvalidPrecondition(
                    self.display_name().to_string(),
                ));
            }
        } else if is_blank(&self.label) || is_blank(&self.message) {
            return Err(RuleError::MissingAttributes {
                path: self.display_name().to_string(),
                attributes: "'label', 'message'".to_string(),
            });
        }

        if (self.operator.is_none() || is_blank(&self.name)) && self.filter.is_none() {
            return Err(RuleError::MissingTest(self.display_name().to_string()));
        }

        Ok(())
    }
}

/// 递归去除 `parentId`
fn strip_parent_links(target: &mut Value) {
    if let Value::Object(map) = target {
        map.remove("parentId");
        if let Some(Value::Array(children)) = map.get_mut("children") {
            children.iter_mut().for_each(strip_parent_links);
        }
    }
}

/// 字符串是否为空白
pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// 值是否为 null 或空白字符串
pub fn is_value_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => is_blank(s),
        _ => false,
    }
}

/// 按路径取值（对象按键、数组按下标），中间值缺失或为 null 时返回 `None`
pub fn get_path<'a, S: AsRef<str>>(source: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut current = source;

    for part in path {
        let part = part.as_ref();
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    if current.is_null() { None } else { Some(current) }
}

/// 合并多个错误映射，同名键以后者为准（不做深度合并）
pub fn merge_form_errors<I>(errors: I) -> Option<FormErrors>
where
    I: IntoIterator<Item = FormErrors>,
{
    errors.into_iter().fold(None, |merged, error| {
        let mut merged = merged.unwrap_or_default();
        merged.extend(error);
        Some(merged)
    })
}

/// 评估结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationResult {
    pub errors: Option<FormErrors>,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_us: i64,
}

impl EvaluationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_none()
    }
}
