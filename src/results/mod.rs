//! # 结果树模块
//!
//! 精修引擎结果树的显式表示、搜索工具和按固定布局的读取器。
//!
//! ## 依赖关系
//! - 被 `engine/`, `refiner/`, `commands/inspect.rs` 使用
//! - 子模块: tree, search, readers

pub mod readers;
pub mod search;
pub mod tree;

pub use readers::{
    cell_constants, correlation_matrix, fit_quality, histogram_key, instrument_parameters,
    sequential_fit_quality, valid_phases, CellConstants, CorrelationMatrix, FitQuality,
    InstrumentParameters, INSTPRM_KEYS,
};
pub use search::{find_all, find_first, DepthBand, Found};
pub use tree::{format_tree, Node, Scalar};
