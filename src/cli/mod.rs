//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `convert`: 2θ / q / d 单位换算
//! - `reduce`: 二维数据约化为径向谱线并估计背景
//! - `refine`: 单扫描精修（可依次换用新数据集）
//! - `refine-seq`: 顺序精修
//! - `inspect`: 查看精修结果树
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: convert, reduce, refine, inspect

pub mod convert;
pub mod inspect;
pub mod reduce;
pub mod refine;

use clap::{Parser, Subcommand};

/// suli - XRD 约化与 GSAS-II 精修编排工具
#[derive(Parser)]
#[command(name = "suli")]
#[command(author = "SULI XRD team")]
#[command(version)]
#[command(about = "XRD cake reduction and GSAS-II refinement orchestration", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Convert between 2θ, q and d-spacing, or re-express 2θ at another wavelength
    Convert(convert::ConvertArgs),

    /// Reduce a 2D dataset to a radial profile and estimate its background
    Reduce(reduce::ReduceArgs),

    /// Refine one dataset (optionally continuing on further datasets)
    Refine(refine::RefineArgs),

    /// Refine many datasets sequentially in one shared project
    #[command(name = "refine-seq")]
    RefineSeq(refine::RefineSeqArgs),

    /// Inspect a refinement result tree (JSON)
    Inspect(inspect::InspectArgs),
}
