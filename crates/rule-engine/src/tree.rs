//! 规则树组装
//!
//! 后端的规则可能以扁平列表（通过 `parentId` 关联）下发。这里用 arena + 下标的方式
//! 维护父子关系，父引用只存在于树结构中，不会写回规则本身。

use crate::error::{Result, RuleError};
use crate::models::Rule;
use std::collections::HashMap;

/// 规则树节点
#[derive(Debug, Clone)]
pub struct RuleTreeNode {
    /// 规则本身（`children` 已移入树结构）
    pub rule: Rule,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// 基于 arena 的规则树
#[derive(Debug, Clone, Default)]
pub struct RuleTree {
    nodes: Vec<RuleTreeNode>,
    roots: Vec<usize>,
}

impl RuleTree {
    /// 从嵌套结构构建，忽略 `parentId`
    pub fn from_nested(rules: Vec<Rule>) -> Self {
        let mut tree = Self::default();
        for rule in rules {
            let idx = tree.push(rule, None);
            tree.roots.push(idx);
        }
        tree
    }

    /// 从扁平列表构建：按 `parentId` 挂接到对应 `id` 的规则下，
    /// 子节点顺序与输入顺序一致
    pub fn from_flat(rules: Vec<Rule>) -> Result<Self> {
        let mut tree = Self::default();
        let mut pending = Vec::with_capacity(rules.len());
        for rule in rules {
            pending.push(tree.push(rule, None));
        }

        let mut by_id = HashMap::new();
        for (idx, node) in tree.nodes.iter().enumerate() {
            if let Some(id) = node.rule.id {
                if by_id.insert(id, idx).is_some() {
                    return Err(RuleError::InvalidTree(format!("重复的规则 ID: {}", id)));
                }
            }
        }

        for idx in pending {
            let Some(parent_id) = tree.nodes[idx].rule.parent_id else {
                tree.roots.push(idx);
                continue;
            };

            let parent = *by_id.get(&parent_id).ok_or_else(|| {
                RuleError::InvalidTree(format!(
                    "规则 '{}' 的父规则不存在: {}",
                    tree.nodes[idx].rule.display_name(),
                    parent_id
                ))
            })?;

            tree.nodes[idx].parent = Some(parent);
            tree.nodes[parent].children.push(idx);
        }

        // 环上的节点无法从任何根节点到达
        let reachable = tree.reachable_count();
        if reachable != tree.nodes.len() {
            return Err(RuleError::InvalidTree(format!(
                "存在循环引用: {} 个规则无法从根节点到达",
                tree.nodes.len() - reachable
            )));
        }

        Ok(tree)
    }

    fn push(&mut self, mut rule: Rule, parent: Option<usize>) -> usize {
        let children = std::mem::take(&mut rule.children);
        let idx = self.nodes.len();
        self.nodes.push(RuleTreeNode {
            rule,
            parent,
            children: Vec::new(),
        });

        for child in children {
            let child_idx = self.push(child, Some(idx));
            self.nodes[idx].children.push(child_idx);
        }

        idx
    }

    fn reachable_count(&self) -> usize {
        let mut stack: Vec<usize> = self.roots.clone();
        let mut visited = vec![false; self.nodes.len()];
        let mut count = 0;

        while let Some(idx) = stack.pop() {
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            count += 1;
            stack.extend(self.nodes[idx].children.iter().copied());
        }

        count
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn get(&self, idx: usize) -> Option<&RuleTreeNode> {
        self.nodes.get(idx)
    }

    pub fn parent(&self, idx: usize) -> Option<usize> {
        self.nodes.get(idx)?.parent
    }

    pub fn children(&self, idx: usize) -> &[usize] {
        self.nodes
            .get(idx)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    /// 祖先节点，由近及远
    pub fn ancestors(&self, idx: usize) -> Vec<usize> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(idx);
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.parent(parent);
        }
        ancestors
    }

    pub fn find_by_id(&self, id: i64) -> Option<usize> {
        self.nodes.iter().position(|node| node.rule.id == Some(id))
    }

    /// 还原为嵌套规则，`parentId` 被清除
    pub fn into_rules(self) -> Vec<Rule> {
        let mut slots: Vec<Option<RuleTreeNode>> = self.nodes.into_iter().map(Some).collect();
        self.roots
            .iter()
            .filter_map(|&idx| Self::assemble(&mut slots, idx))
            .collect()
    }

    fn assemble(slots: &mut [Option<RuleTreeNode>], idx: usize) -> Option<Rule> {
        let node = slots.get_mut(idx)?.take()?;
        let mut rule = node.rule;
        rule.parent_id = None;
        rule.children = node
            .children
            .iter()
            .filter_map(|&child| Self::assemble(slots, child))
            .collect();
        Some(rule)
    }
}
