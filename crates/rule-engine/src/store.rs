//! 规则集存储管理
//!
//! 使用 DashMap 提供线程安全的规则集缓存。规则集通常按项目/策略标签下发，
//! 加载时即完成编译，格式错误的规则集不会覆盖已加载的版本。

use crate::error::{Result, RuleError};
use crate::models::{FormErrors, Rule};
use crate::tree::RuleTree;
use crate::utils::RuleSet;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 规则集存储
#[derive(Clone)]
pub struct RuleStore {
    /// 规则集缓存：key -> 已编译的规则集
    sets: Arc<DashMap<String, Arc<RuleSet>>>,
    /// 最后加载时间
    last_loaded_at: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl RuleStore {
    /// 创建新的规则集存储
    pub fn new() -> Self {
        Self {
            sets: Arc::new(DashMap::new()),
            last_loaded_at: Arc::new(RwLock::new(None)),
        }
    }

    /// 获取当前存储的规则集数量
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// 检查存储是否为空
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// 加载规则集（替换同名规则集），返回顶层规则数量
    #[instrument(skip(self, rules), fields(rules = rules.len()))]
    pub fn load(&self, key: &str, rules: Vec<Rule>) -> Result<usize> {
        let set = RuleSet::new(rules);
        if let Err(e) = set.build(false) {
            warn!(error = %e, "规则集加载失败，保留当前版本: {}", key);
            return Err(e);
        }

        let count = set.len();
        self.sets.insert(key.to_string(), Arc::new(set));
        *self.last_loaded_at.write() = Some(Utc::now());

        info!("规则集已加载: {} ({} 条规则)", key, count);
        Ok(count)
    }

    /// 从 JSON 加载规则集
    ///
    /// 支持嵌套数组、带 `parentId` 的扁平数组，以及单个规则对象。
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, key: &str, json: &str) -> Result<usize> {
        let rules = Self::parse_rules(json)?;
        self.load(key, rules)
    }

    /// 从文件加载规则集
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn load_file(&self, key: &str, path: impl AsRef<Path>) -> Result<usize> {
        let json = std::fs::read_to_string(path.as_ref())?;
        self.load_from_json(key, &json)
    }

    /// 解析规则 JSON
    pub fn parse_rules(json: &str) -> Result<Vec<Rule>> {
        let value: Value = serde_json::from_str(json)?;
        let rules: Vec<Rule> = if value.is_array() {
            serde_json::from_value(value)?
        } else if value.is_object() {
            vec![serde_json::from_value(value)?]
        } else {
            return Err(RuleError::InvalidTree(format!(
                "规则定义必须是对象或数组，实际为: {}",
                value
            )));
        };

        if rules.iter().any(|rule| rule.parent_id.is_some()) {
            return Ok(RuleTree::from_flat(rules)?.into_rules());
        }

        Ok(rules)
    }

    /// 获取规则集
    pub fn get(&self, key: &str) -> Option<Arc<RuleSet>> {
        self.sets.get(key).map(|set| set.value().clone())
    }

    /// 检查规则集是否存在
    pub fn contains(&self, key: &str) -> bool {
        self.sets.contains_key(key)
    }

    /// 删除规则集
    #[instrument(skip(self))]
    pub fn remove(&self, key: &str) -> Result<()> {
        if self.sets.remove(key).is_some() {
            info!("规则集已删除: {}", key);
            Ok(())
        } else {
            warn!("删除不存在的规则集: {}", key);
            Err(RuleError::RuleSetNotFound(key.to_string()))
        }
    }

    /// 获取所有规则集 key
    pub fn keys(&self) -> Vec<String> {
        self.sets.iter().map(|entry| entry.key().clone()).collect()
    }

    /// 清空所有规则集
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.sets.len();
        self.sets.clear();
        info!("已清空 {} 个规则集", count);
    }

    /// 使用指定规则集校验对象
    pub fn control(&self, key: &str, source: &Value, debug: bool) -> Result<Option<FormErrors>> {
        let set = self
            .get(key)
            .ok_or_else(|| RuleError::RuleSetNotFound(key.to_string()))?;
        set.control(source, debug)
    }

    pub fn valid(&self, key: &str, source: &Value) -> Result<bool> {
        Ok(self.control(key, source, false)?.is_none())
    }

    /// 获取存储统计信息
    pub fn stats(&self) -> RuleStoreStats {
        let (rules_count, nodes_count) = self
            .sets
            .iter()
            .fold((0, 0), |(rules, nodes), entry| {
                (rules + entry.len(), nodes + entry.node_count())
            });

        RuleStoreStats {
            sets_count: self.sets.len(),
            rules_count,
            nodes_count,
            last_loaded_at: *self.last_loaded_at.read(),
        }
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 规则存储统计信息
#[derive(Debug, Clone)]
pub struct RuleStoreStats {
    /// 规则集数量
    pub sets_count: usize,
    /// 顶层规则总数
    pub rules_count: usize,
    /// 包括子规则在内的节点总数
    pub nodes_count: usize,
    pub last_loaded_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::RuleOperator;
    use serde_json::json;

    fn sample_rules() -> Vec<Rule> {
        vec![
            Rule::precondition(
                "LANDING",
                "isLanding",
                RuleOperator::Eq,
                vec![Rule::comparison("WEIGHT", "weight", RuleOperator::NotNull, "Weight is required")],
            )
            .with_value(true),
            Rule::comparison("TAXON", "taxonGroup.label", RuleOperator::In, "Unexpected taxon group")
                .with_values(["COD", "MNZ"]),
        ]
    }

    fn flat_rules_json() -> &'static str {
        r#"
        [
            {"id": 10, "label": "WEIGHT", "name": "weight", "operator": "NOT NULL",
             "message": "Weight is required", "parentId": 1},
            {"id": 1, "label": "LANDING", "name": "isLanding", "value": true, "precondition": true}
        ]
        "#
    }

    #[test]
    fn test_load_rules() {
        let store = RuleStore::new();
        let count = store.load("SIH-OBSMER", sample_rules()).unwrap();

        assert_eq!(count, 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains("SIH-OBSMER"));
        assert!(store.get("SIH-OBSMER").unwrap().is_built());
    }

    #[test]
    fn test_load_flat_json() {
        let store = RuleStore::new();
        let count = store.load_from_json("flat", flat_rules_json()).unwrap();
        assert_eq!(count, 1);

        let set = store.get("flat").unwrap();
        assert_eq!(set.rules()[0].children.len(), 1);
        assert!(set.rules()[0].children[0].parent_id.is_none());

        let errors = store
            .control("flat", &json!({"isLanding": true}), false)
            .unwrap()
            .unwrap();
        assert_eq!(errors["weight"]["WEIGHT"], "Weight is required");
    }

    #[test]
    fn test_load_single_object() {
        let store = RuleStore::new();
        let json = r#"{"label": "REQ", "name": "x", "operator": "NOT NULL", "message": "x is required"}"#;

        assert_eq!(store.load_from_json("single", json).unwrap(), 1);
        assert!(store.valid("single", &json!({"x": 1})).unwrap());
        assert!(!store.valid("single", &json!({})).unwrap());
    }

    #[test]
    fn test_invalid_json_shape() {
        let store = RuleStore::new();
        assert!(matches!(
            store.load_from_json("bad", "42"),
            Err(RuleError::InvalidTree(_))
        ));
    }

    #[test]
    fn test_malformed_set_keeps_previous_version() {
        let store = RuleStore::new();
        store.load("program", sample_rules()).unwrap();

        let broken = vec![Rule::precondition("EMPTY", "x", RuleOperator::NotNull, vec![])];
        assert!(store.load("program", broken).is_err());

        assert_eq!(store.get("program").unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_operator_in_json() {
        let store = RuleStore::new();
        let json = r#"[{"label": "A", "name": "a", "operator": "~=", "message": "m"}]"#;
        let err = store.load_from_json("bad", json).unwrap_err();
        assert!(err.to_string().contains("~="));
        assert!(!store.contains("bad"));
    }

    #[test]
    fn test_control_unknown_set() {
        let store = RuleStore::new();
        assert!(matches!(
            store.control("missing", &json!({}), false),
            Err(RuleError::RuleSetNotFound(_))
        ));
    }

    #[test]
    fn test_remove_and_clear() {
        let store = RuleStore::new();
        store.load("a", sample_rules()).unwrap();
        store.load("b", sample_rules()).unwrap();

        store.remove("a").unwrap();
        assert!(store.remove("a").is_err());
        assert_eq!(store.keys(), vec!["b".to_string()]);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_stats() {
        let store = RuleStore::new();
        assert!(store.stats().last_loaded_at.is_none());

        store.load("a", sample_rules()).unwrap();
        store.load("b", sample_rules()).unwrap();

        let stats = store.stats();
        assert_eq!(stats.sets_count, 2);
        assert_eq!(stats.rules_count, 4);
        assert_eq!(stats.nodes_count, 6);
        assert!(stats.last_loaded_at.is_some());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let store = RuleStore::new();
        let store_clone = store.clone();

        let handle = thread::spawn(move || {
            for i in 0..50 {
                store_clone.load(&format!("set-{}", i), sample_rules()).unwrap();
            }
        });

        for i in 50..100 {
            store.load(&format!("set-{}", i), sample_rules()).unwrap();
        }

        handle.join().unwrap();

        assert_eq!(store.len(), 100);
    }
}
