//! # 精修编排模块
//!
//! 将测量数据集转换为引擎输入，按步骤驱动精修引擎，并把结果写回数据集。
//!
//! ## 子模块
//! - `config`: 显式配置
//! - `scratch`: 随机命名的临时目录
//! - `ingest`: 共用的摄取流程与逆变换
//! - `single`: 单扫描编排器
//! - `sequential`: 顺序精修编排器
//! - `recipe`: 命令行精修步骤序列
//!
//! ## 依赖关系
//! - 被 `commands/refine.rs` 使用
//! - 使用 `engine/`, `xrd/`, `models/`, `results/`

pub mod config;
pub mod ingest;
pub mod recipe;
pub mod scratch;
pub mod sequential;
pub mod single;

pub use config::RefinerConfig;
pub use recipe::{Recipe, RecipeStep, RefinementSteps};
pub use scratch::{CleanupMode, ScratchDir};
pub use sequential::SeqRefiner;
pub use single::{Refiner, RefinerState};

/// 一个精修步骤的记录
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub label: String,
    /// 步骤前的 Rwp；尚未精修过时为 None
    pub rwp_before: Option<f64>,
    pub rwp_after: Option<f64>,
    pub gof_after: Option<f64>,
}

/// Rwp 显示文本，缺失时为 `na`
pub fn format_rwp(rwp: Option<f64>) -> String {
    match rwp {
        Some(v) => format!("{:.3}", v),
        None => "na".to_string(),
    }
}
