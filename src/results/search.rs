//! # 结果树搜索
//!
//! - `find_first`: 深度优先查找第一个匹配键的值
//! - `find_all`: 收集所有含目标键的映射，并标注深度
//!
//! ## 深度约定
//! 根映射及其直接子映射为深度 0，此后每下降一层映射加 1，
//! 穿过序列不增加深度。
//!
//! ## 依赖关系
//! - 被 `results/readers.rs`, `commands/inspect.rs` 使用
//! - 使用 `results/tree.rs`

use crate::error::{Result, SuliError};
use crate::results::tree::Node;

use indexmap::IndexMap;

/// 深度过滤区间（闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthBand {
    pub min: usize,
    pub max: usize,
}

impl Default for DepthBand {
    fn default() -> Self {
        DepthBand {
            min: 0,
            max: usize::MAX,
        }
    }
}

impl DepthBand {
    pub fn new(min: Option<usize>, max: Option<usize>) -> Self {
        DepthBand {
            min: min.unwrap_or(0),
            max: max.unwrap_or(usize::MAX),
        }
    }

    fn contains(&self, depth: usize) -> bool {
        depth >= self.min && depth <= self.max
    }
}

/// 一次匹配
#[derive(Debug, Clone, PartialEq)]
pub struct Found<'a> {
    pub depth: usize,
    /// 拥有目标键的映射
    pub map: &'a IndexMap<String, Node>,
}

impl Found<'_> {
    pub fn label(&self) -> String {
        format!("Depth {}", self.depth)
    }
}

/// 深度优先查找第一个匹配键的值，未找到返回 None
pub fn find_first<'a>(tree: &'a Node, key: &str) -> Option<&'a Node> {
    match tree {
        Node::Map(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|v| find_first(v, key))),
        Node::Seq(items) => items.iter().find_map(|v| find_first(v, key)),
        Node::Leaf(_) => None,
    }
}

/// 收集所有含目标键的映射
///
/// 根节点为标量时无法搜索，返回 `InvalidTree`。
pub fn find_all<'a>(tree: &'a Node, key: &str, band: DepthBand) -> Result<Vec<Found<'a>>> {
    let mut results = Vec::new();

    match tree {
        Node::Map(map) => {
            if map.contains_key(key) && band.contains(0) {
                results.push(Found { depth: 0, map });
            }
            for value in map.values() {
                descend(value, key, 0, band, &mut results);
            }
        }
        Node::Seq(items) => {
            for item in items {
                descend(item, key, 0, band, &mut results);
            }
        }
        Node::Leaf(_) => {
            return Err(SuliError::InvalidTree {
                key: key.to_string(),
                found: tree.kind().to_string(),
            })
        }
    }

    Ok(results)
}

fn descend<'a>(node: &'a Node, key: &str, depth: usize, band: DepthBand, out: &mut Vec<Found<'a>>) {
    match node {
        Node::Map(map) => {
            if map.contains_key(key) && band.contains(depth) {
                out.push(Found { depth, map });
            }
            for value in map.values() {
                descend(value, key, depth + 1, band, out);
            }
        }
        Node::Seq(items) => {
            for item in items {
                descend(item, key, depth, band, out);
            }
        }
        Node::Leaf(_) => {}
    }
}
