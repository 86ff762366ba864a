//! # suli - XRD 约化与 GSAS-II 精修编排工具
//!
//! 将同步辐射二维衍射数据（cake）约化为径向谱线，估计背景，
//! 转换为 GSAS-II 输入并编排单扫描或顺序 Rietveld/LeBail 精修。
//!
//! ## 子命令
//! - `convert` - 2θ / q / d 单位换算
//! - `reduce` - 径向约化与背景估计
//! - `refine` - 单扫描精修
//! - `refine-seq` - 顺序精修
//! - `inspect` - 查看精修结果树
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── refiner/  (精修编排)
//!   │     ├── engine/   (GSAS-II 引擎接口)
//!   │     ├── xrd/      (数值处理、导出、绘图)
//!   │     ├── results/  (结果树)
//!   │     └── models/   (数据模型)
//!   ├── utils/      (工具函数)
//!   └── error.rs    (错误处理)
//! ```

mod batch;
mod cli;
mod commands;
mod engine;
mod error;
mod models;
mod parsers;
mod refiner;
mod results;
mod utils;
mod xrd;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
