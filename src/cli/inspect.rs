//! # inspect 子命令 CLI 定义
//!
//! 查看 `refine --dump-tree` 导出的结果树。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/inspect.rs`

use clap::Args;
use std::path::PathBuf;

/// inspect 子命令参数
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Result tree (JSON)
    pub tree: PathBuf,

    /// Look up a key (first depth-first match)
    #[arg(short, long)]
    pub key: Option<String>,

    /// With --key: list every mapping that owns the key, with its depth
    #[arg(short, long, default_value_t = false, requires = "key")]
    pub all: bool,

    /// Minimum depth for --all
    #[arg(long, requires = "all")]
    pub min_depth: Option<usize>,

    /// Maximum depth for --all
    #[arg(long, requires = "all")]
    pub max_depth: Option<usize>,

    /// Print the whole tree with depth markers
    #[arg(long, default_value_t = false)]
    pub tree_view: bool,

    /// List phases with their cell constants
    #[arg(long, default_value_t = false)]
    pub phases: bool,

    /// Include cell angles with --phases
    #[arg(long, default_value_t = false)]
    pub angles: bool,

    /// Print per-histogram fit quality of a sequential refinement
    #[arg(long, default_value_t = false)]
    pub scores: bool,

    /// Write the parameter correlation matrix to a CSV file
    #[arg(long)]
    pub correlation: Option<PathBuf>,
}
