//! # convert 子命令 CLI 定义
//!
//! 衍射坐标单位换算，或将 2θ 换算到另一波长。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/convert.rs`

use crate::xrd::units::Unit;

use clap::{Args, ValueEnum};

/// 波长换算的默认源波长（Å）
pub const DEFAULT_SOURCE_WAVELENGTH: f64 = 0.187;

/// 波长换算的默认目标波长（Å）
pub const DEFAULT_TARGET_WAVELENGTH: f64 = 0.4592;

/// 坐标单位
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum UnitArg {
    /// Two-theta in degrees
    Tth,
    /// Two-theta in radians
    TthRad,
    /// Scattering vector q (1/Å)
    Q,
    /// d-spacing (Å)
    D,
}

impl UnitArg {
    /// 是否需要波长
    pub fn needs_wavelength(&self) -> bool {
        matches!(self, UnitArg::Tth | UnitArg::TthRad)
    }
}

impl From<UnitArg> for Unit {
    fn from(arg: UnitArg) -> Self {
        match arg {
            UnitArg::Tth => Unit::TwoThetaDeg,
            UnitArg::TthRad => Unit::TwoThetaRad,
            UnitArg::Q => Unit::Q,
            UnitArg::D => Unit::D,
        }
    }
}

impl std::fmt::Display for UnitArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Unit::from(*self))
    }
}

/// convert 子命令参数
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Values to convert
    #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
    pub values: Vec<f64>,

    /// Unit of the input values
    #[arg(short, long, value_enum, default_value_t = UnitArg::Tth)]
    pub from: UnitArg,

    /// Unit of the output values
    #[arg(short, long, value_enum, default_value_t = UnitArg::Q)]
    pub to: UnitArg,

    /// X-ray wavelength in Å (required when two-theta is involved)
    #[arg(short, long)]
    pub wavelength: Option<f64>,

    /// Re-express two-theta (degrees) measured at --wavelength (default 0.187 Å)
    /// at this wavelength (default 0.4592 Å); ignores --from/--to
    #[arg(long, num_args = 0..=1, default_missing_value = "0.4592")]
    pub to_wavelength: Option<f64>,
}
