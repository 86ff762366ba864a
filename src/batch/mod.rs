//! # 批量处理模块
//!
//! 为顺序精修收集数据集文件列表。
//!
//! ## 功能
//! - 自动检测输入类型（文件/目录）
//! - 收集匹配文件列表，顺序稳定
//!
//! ## 依赖关系
//! - 被 `commands/refine.rs` 使用
//! - 使用 `walkdir`, `glob`

pub mod collector;

pub use collector::FileCollector;
