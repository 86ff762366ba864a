//! # XRD 数据处理模块
//!
//! 衍射谱线从积分图到精修输入的数值处理。
//!
//! ## 子模块
//! - `units`: 2θ / q / d 单位换算
//! - `baseline`: arPLS 基线估计
//! - `background`: 背景归一化流程（自动 / 锚定）
//! - `scaling`: 引擎强度缓冲变换
//! - `export`: 数据导出
//! - `plot`: 图表生成
//!
//! ## 依赖关系
//! - 被 `refiner/`, `commands/` 使用
//! - 使用 `models/`

pub mod background;
pub mod baseline;
pub mod export;
pub mod plot;
pub mod scaling;
pub mod units;

pub use background::{estimate_background, BackgroundEstimate};
pub use baseline::{Arpls, BaselineEstimator};
pub use scaling::IntensityScaling;
