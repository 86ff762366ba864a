//! # 解析器模块
//!
//! 外部文本格式的解析器。
//!
//! ## 依赖关系
//! - 被 `refiner/`, `commands/` 使用
//! - 子模块: instprm

pub mod instprm;

pub use instprm::{parse_instprm_content, parse_instprm_file, read_wavelength, InstprmBlock};
