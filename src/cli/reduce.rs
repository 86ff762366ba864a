//! # reduce 子命令 CLI 定义
//!
//! 将二维衍射数据集约化为径向谱线，估计背景并导出。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/reduce.rs`

use clap::Args;
use std::path::PathBuf;

/// reduce 子命令参数
#[derive(Args, Debug)]
pub struct ReduceArgs {
    /// Input dataset (.json)
    pub dataset: PathBuf,

    /// Radial window in q (1/Å), e.g. '1.2-9.5'; default is the full range
    #[arg(short, long)]
    pub q_range: Option<String>,

    /// Anchor background (dataset or two-column q/intensity file)
    #[arg(short, long)]
    pub background: Option<PathBuf>,

    /// arPLS smoothness parameter
    #[arg(long, default_value_t = 1e5)]
    pub lam: f64,

    /// Output file; format chosen by extension (.csv, .xy, .png, .svg)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Figure size as WIDTHxHEIGHT (png/svg output)
    #[arg(long, default_value = "1200x800")]
    pub size: String,
}
