//! 条件评估器
//!
//! 后端常把数值序列化为字符串，因此相等比较采用统一的宽松语义（见 [`ConditionEvaluator::loose_eq`]）：
//!
//! - 缺失值与 `null` 互相相等，且不等于任何其他值
//! - 数值与数值按数值比较
//! - 数值与字符串：字符串去除首尾空白后按数值解析（空白字符串不匹配）
//! - 布尔值与数值/数值字符串比较时视为 1/0
//! - 字符串与字符串、布尔值与布尔值精确比较
//! - 数组和对象按结构比较

use crate::error::{Result, RuleError};
use crate::models::Expected;
use crate::operators::RuleOperator;
use serde_json::Value;

/// 可执行的比较方式
///
/// 只包含已实现的操作符，`<`、`>`、`BETWEEN` 等在编译阶段即被拒绝。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equal,
    NotEqual,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl TryFrom<RuleOperator> for Comparator {
    type Error = RuleError;

    fn try_from(operator: RuleOperator) -> Result<Self> {
        match operator {
            RuleOperator::Eq => Ok(Self::Equal),
            RuleOperator::Neq => Ok(Self::NotEqual),
            RuleOperator::In => Ok(Self::In),
            RuleOperator::NotIn => Ok(Self::NotIn),
            RuleOperator::Null => Ok(Self::IsNull),
            RuleOperator::NotNull => Ok(Self::IsNotNull),
            RuleOperator::Lt
            | RuleOperator::Gt
            | RuleOperator::Lte
            | RuleOperator::Gte
            | RuleOperator::Between => Err(RuleError::OperatorNotImplemented(operator.to_string())),
        }
    }
}

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件
    ///
    /// # Arguments
    /// * `field_value` - 按规则路径从候选对象中取出的值
    /// * `comparator` - 比较方式
    /// * `expected` - 规则中定义的期望值
    pub fn evaluate(field_value: Option<&Value>, comparator: Comparator, expected: &Expected) -> bool {
        match comparator {
            Comparator::IsNull => Self::is_nil(field_value),
            Comparator::IsNotNull => !Self::is_nil(field_value),
            Comparator::Equal => Self::eq(field_value, expected),
            Comparator::NotEqual => !Self::eq(field_value, expected),
            Comparator::In => Self::in_list(field_value, expected),
            Comparator::NotIn => !Self::in_list(field_value, expected),
        }
    }

    fn is_nil(value: Option<&Value>) -> bool {
        matches!(value, None | Some(Value::Null))
    }

    /// 相等：期望值为列表时判断是否为其成员
    fn eq(field: Option<&Value>, expected: &Expected) -> bool {
        match expected {
            Expected::List(values) => values.iter().any(|v| Self::loose_eq(field, v)),
            Expected::Scalar(value) => Self::loose_eq(field, value),
            Expected::Missing => Self::is_nil(field),
        }
    }

    /// 包含：字段值本身可以是列表，任一元素匹配即可
    fn in_list(field: Option<&Value>, expected: &Expected) -> bool {
        let candidates: Vec<Option<&Value>> = match field {
            Some(Value::Array(items)) => items.iter().map(Some).collect(),
            other => vec![other],
        };

        candidates
            .into_iter()
            .any(|candidate| Self::eq(candidate, expected))
    }

    /// 宽松相等比较
    pub fn loose_eq(field: Option<&Value>, expected: &Value) -> bool {
        let field = match field {
            None | Some(Value::Null) => return expected.is_null(),
            Some(v) => v,
        };

        match (field, expected) {
            (_, Value::Null) => false,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
                field == expected
            }
            // 数值比较统一转为浮点数，避免 100 与 "100" 或 100.0 比较失败
            _ => match (Self::as_f64(field), Self::as_f64(expected)) {
                (Some(f1), Some(f2)) => f1 == f2,
                _ => false,
            },
        }
    }

    /// 尝试将 Value 转换为 f64
    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) if !s.trim().is_empty() => {
                s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
            }
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scalar(value: Value) -> Expected {
        Expected::Scalar(value)
    }

    fn list(values: Value) -> Expected {
        match values {
            Value::Array(items) => Expected::List(items),
            other => panic!("expected an array, got {other}"),
        }
    }

    #[test]
    fn test_eq_numbers() {
        assert!(ConditionEvaluator::evaluate(
            Some(&json!(100)),
            Comparator::Equal,
            &scalar(json!(100))
        ));
        assert!(ConditionEvaluator::evaluate(
            Some(&json!(100.0)),
            Comparator::Equal,
            &scalar(json!(100))
        ));
    }

    #[test]
    fn test_eq_numeric_string() {
        assert!(ConditionEvaluator::evaluate(
            Some(&json!("5")),
            Comparator::Equal,
            &scalar(json!(5))
        ));
        assert!(ConditionEvaluator::evaluate(
            Some(&json!(5)),
            Comparator::Equal,
            &scalar(json!(" 5.0 "))
        ));
        assert!(!ConditionEvaluator::evaluate(
            Some(&json!(0)),
            Comparator::Equal,
            &scalar(json!(""))
        ));
    }

    #[test]
    fn test_eq_strings_are_exact() {
        assert!(ConditionEvaluator::evaluate(
            Some(&json!("MNZ")),
            Comparator::Equal,
            &scalar(json!("MNZ"))
        ));
        assert!(!ConditionEvaluator::evaluate(
            Some(&json!("5")),
            Comparator::Equal,
            &scalar(json!("5.0"))
        ));
    }

    #[test]
    fn test_eq_bool_coercion() {
        assert!(ConditionEvaluator::loose_eq(Some(&json!(true)), &json!(1)));
        assert!(ConditionEvaluator::loose_eq(Some(&json!("0")), &json!(false)));
        assert!(!ConditionEvaluator::loose_eq(Some(&json!(true)), &json!("true")));
    }

    #[test]
    fn test_nullish_equality() {
        assert!(ConditionEvaluator::loose_eq(None, &json!(null)));
        assert!(ConditionEvaluator::loose_eq(Some(&json!(null)), &json!(null)));
        assert!(!ConditionEvaluator::loose_eq(None, &json!(0)));
        assert!(!ConditionEvaluator::loose_eq(Some(&json!(0)), &json!(null)));
    }

    #[test]
    fn test_eq_list_membership() {
        let expected = list(json!([1, 2, 3]));
        assert!(ConditionEvaluator::evaluate(Some(&json!("2")), Comparator::Equal, &expected));
        assert!(!ConditionEvaluator::evaluate(Some(&json!(4)), Comparator::Equal, &expected));
        assert!(ConditionEvaluator::evaluate(Some(&json!(4)), Comparator::NotEqual, &expected));
    }

    #[test]
    fn test_eq_missing_expected() {
        assert!(ConditionEvaluator::evaluate(None, Comparator::Equal, &Expected::Missing));
        assert!(!ConditionEvaluator::evaluate(
            Some(&json!(1)),
            Comparator::Equal,
            &Expected::Missing
        ));
    }

    #[test]
    fn test_in_list() {
        let expected = list(json!([1, 2, 3]));
        assert!(ConditionEvaluator::evaluate(Some(&json!(2)), Comparator::In, &expected));
        assert!(!ConditionEvaluator::evaluate(Some(&json!(4)), Comparator::In, &expected));
        assert!(ConditionEvaluator::evaluate(Some(&json!([2, 9])), Comparator::In, &expected));
        assert!(!ConditionEvaluator::evaluate(Some(&json!([7, 9])), Comparator::In, &expected));
        assert!(!ConditionEvaluator::evaluate(None, Comparator::In, &expected));
    }

    #[test]
    fn test_in_scalar_expected() {
        let expected = scalar(json!("MNZ"));
        assert!(ConditionEvaluator::evaluate(
            Some(&json!(["COD", "MNZ"])),
            Comparator::In,
            &expected
        ));
        assert!(!ConditionEvaluator::evaluate(Some(&json!("COD")), Comparator::In, &expected));
    }

    #[test]
    fn test_not_in_is_negation_of_in() {
        let expected = list(json!(["a", "b"]));
        for field in [json!("a"), json!("c"), json!(["c", "b"]), json!([])] {
            assert_eq!(
                ConditionEvaluator::evaluate(Some(&field), Comparator::NotIn, &expected),
                !ConditionEvaluator::evaluate(Some(&field), Comparator::In, &expected)
            );
        }
    }

    #[test]
    fn test_null_checks() {
        assert!(ConditionEvaluator::evaluate(None, Comparator::IsNull, &Expected::Missing));
        assert!(ConditionEvaluator::evaluate(
            Some(&json!(null)),
            Comparator::IsNull,
            &Expected::Missing
        ));
        assert!(!ConditionEvaluator::evaluate(
            Some(&json!(0)),
            Comparator::IsNull,
            &Expected::Missing
        ));
        assert!(ConditionEvaluator::evaluate(
            Some(&json!("")),
            Comparator::IsNotNull,
            &Expected::Missing
        ));
    }

    #[test]
    fn test_unimplemented_operators() {
        for op in [
            RuleOperator::Lt,
            RuleOperator::Gt,
            RuleOperator::Lte,
            RuleOperator::Gte,
            RuleOperator::Between,
        ] {
            assert!(matches!(
                Comparator::try_from(op),
                Err(RuleError::OperatorNotImplemented(_))
            ));
        }
        assert_eq!(Comparator::try_from(RuleOperator::NotIn).unwrap(), Comparator::NotIn);
    }

    #[test]
    fn test_tiny_numbers_are_distinct() {
        assert!(!ConditionEvaluator::loose_eq(Some(&json!(2e-17)), &json!(1e-17)));
        assert!(ConditionEvaluator::loose_eq(Some(&json!(1e-17)), &json!("1e-17")));
        assert!(ConditionEvaluator::evaluate(
            Some(&json!(2e-17)),
            Comparator::NotEqual,
            &scalar(json!(1e-17))
        ));
    }
}
