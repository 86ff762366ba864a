//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `refiner/`, `xrd/`, `results/`, `utils/`
//! - 子模块: convert, reduce, refine, inspect

pub mod convert;
pub mod inspect;
pub mod reduce;
pub mod refine;

use crate::cli::Commands;
use crate::error::Result;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Convert(args) => convert::execute(args),
        Commands::Reduce(args) => reduce::execute(args),
        Commands::Refine(args) => refine::execute(args),
        Commands::RefineSeq(args) => refine::execute_sequential(args),
        Commands::Inspect(args) => inspect::execute(args),
    }
}
