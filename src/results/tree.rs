//! # 结果树
//!
//! 精修引擎的结果是映射、序列与标量混合的嵌套结构，
//! 这里用显式的三分支枚举表示，保留映射键的插入顺序。
//!
//! ## 依赖关系
//! - 被 `results/search.rs`, `results/readers.rs`, `engine/` 使用
//! - 使用 `indexmap`, `serde`, `serde_json`

use crate::error::{Result, SuliError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::path::Path;

/// 标量叶子
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => write!(f, "None"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

/// 结果树节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Map(IndexMap<String, Node>),
    Seq(Vec<Node>),
    Leaf(Scalar),
}

impl Node {
    /// 从 JSON 文件读取
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SuliError::read(path, e))?;
        serde_json::from_str(&content).map_err(|e| SuliError::ParseError {
            format: "result tree".to_string(),
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// 节点类别名称
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Map(_) => "mapping",
            Node::Seq(_) => "sequence",
            Node::Leaf(_) => "scalar",
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Node::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Node]> {
        match self {
            Node::Seq(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Leaf(Scalar::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Leaf(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// 映射取键
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// 序列取下标
    pub fn index(&self, i: usize) -> Option<&Node> {
        self.as_seq().and_then(|s| s.get(i))
    }

    /// 按键路径逐层下行
    pub fn path(&self, keys: &[&str]) -> Option<&Node> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    /// 按键路径下行，缺失时报告第一个缺失的键
    pub fn require(&self, keys: &[&str]) -> Result<&Node> {
        let mut node = self;
        for (depth, key) in keys.iter().enumerate() {
            node = node.get(key).ok_or_else(|| SuliError::KeyNotFound {
                key: key.to_string(),
                context: if depth == 0 {
                    "result tree root".to_string()
                } else {
                    keys[..depth].join("/")
                },
            })?;
        }
        Ok(node)
    }

    /// 数值序列
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        self.as_seq()?.iter().map(Node::as_f64).collect()
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Leaf(Scalar::Null),
            Value::Bool(b) => Node::Leaf(Scalar::Bool(b)),
            Value::Number(n) => Node::Leaf(n.as_f64().map(Scalar::Number).unwrap_or(Scalar::Null)),
            Value::String(s) => Node::Leaf(Scalar::Text(s)),
            Value::Array(items) => Node::Seq(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => Node::Map(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect()),
        }
    }
}

impl From<f64> for Node {
    fn from(n: f64) -> Self {
        Node::Leaf(Scalar::Number(n))
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Leaf(Scalar::Text(s.to_string()))
    }
}

/// 按缩进渲染树结构（每行带层级编号）
pub fn format_tree(node: &Node) -> String {
    let mut out = String::new();
    match node {
        Node::Map(map) => write_map(map, 0, 0, &mut out),
        other => out.push_str(&format!("0. {}\n", render_leaf(other))),
    }
    out
}

fn write_map(map: &IndexMap<String, Node>, indent: usize, depth: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    let child_pad = " ".repeat(indent + 4);
    for (key, value) in map {
        out.push_str(&format!("{}{}. {}\n", pad, depth, key));
        match value {
            Node::Map(inner) => write_map(inner, indent + 4, depth + 1, out),
            other => out.push_str(&format!("{}{}. {}\n", child_pad, depth, render_leaf(other))),
        }
    }
}

/// 非映射节点的单行表示
fn render_leaf(node: &Node) -> String {
    match node {
        Node::Leaf(s) => s.to_string(),
        Node::Seq(items) => {
            let parts: Vec<String> = items.iter().map(render_leaf).collect();
            format!("[{}]", parts.join(", "))
        }
        Node::Map(m) => format!("{{{} keys}}", m.len()),
    }
}
