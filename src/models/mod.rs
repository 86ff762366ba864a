//! # 数据模型模块
//!
//! 定义测量数据集、径向谱线、物相描述与精修产物。
//!
//! ## 依赖关系
//! - 被 `xrd/`, `refiner/`, `commands/` 使用
//! - 子模块: measurement, profile, phase, products

pub mod measurement;
pub mod phase;
pub mod products;
pub mod profile;

pub use measurement::Measurement;
pub use phase::PhaseSpec;
pub use products::RefinementProducts;
pub use profile::{QRange, RadialProfile};
