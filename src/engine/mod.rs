//! # 精修引擎接口
//!
//! 将外部精修引擎抽象为注入的能力接口，编排逻辑只依赖此 trait，
//! 可在测试中替换为内存实现。
//!
//! ## 子模块
//! - `gsas2`: 通过 Python 辅助脚本驱动 GSASIIscriptable
//! - `fake`: 测试用内存引擎
//!
//! ## 依赖关系
//! - 被 `refiner/` 使用
//! - 使用 `models/phase.rs`, `results/tree.rs`

pub mod gsas2;

#[cfg(test)]
pub mod fake;

pub use gsas2::{EngineConfig, Gsas2Bridge};

use crate::error::{Result, SuliError};
use crate::models::PhaseSpec;
use crate::results::Node;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// 可精修的仪器参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentParameter {
    X,
    Y,
    Z,
    Zero,
    #[serde(rename = "SH/L")]
    ShL,
    U,
    V,
    W,
}

impl InstrumentParameter {
    /// 默认精修列表
    pub const DEFAULT: [InstrumentParameter; 8] = [
        InstrumentParameter::X,
        InstrumentParameter::Y,
        InstrumentParameter::Z,
        InstrumentParameter::Zero,
        InstrumentParameter::ShL,
        InstrumentParameter::U,
        InstrumentParameter::V,
        InstrumentParameter::W,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            InstrumentParameter::X => "X",
            InstrumentParameter::Y => "Y",
            InstrumentParameter::Z => "Z",
            InstrumentParameter::Zero => "Zero",
            InstrumentParameter::ShL => "SH/L",
            InstrumentParameter::U => "U",
            InstrumentParameter::V => "V",
            InstrumentParameter::W => "W",
        }
    }
}

impl std::fmt::Display for InstrumentParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for InstrumentParameter {
    type Err = SuliError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(InstrumentParameter::X),
            "y" => Ok(InstrumentParameter::Y),
            "z" => Ok(InstrumentParameter::Z),
            "zero" => Ok(InstrumentParameter::Zero),
            "sh/l" | "shl" => Ok(InstrumentParameter::ShL),
            "u" => Ok(InstrumentParameter::U),
            "v" => Ok(InstrumentParameter::V),
            "w" => Ok(InstrumentParameter::W),
            other => Err(SuliError::InvalidArgument(format!(
                "unknown instrument parameter '{}' (expected one of X, Y, Z, Zero, SH/L, U, V, W)",
                other
            ))),
        }
    }
}

/// 展宽模型
///
/// 微应变支持 isotropic / uniaxial / generalized，
/// 晶粒尺寸支持 isotropic / uniaxial / ellipsoidal。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadeningModel {
    #[default]
    Isotropic,
    Uniaxial,
    Generalized,
    Ellipsoidal,
}

impl BroadeningModel {
    pub fn name(&self) -> &'static str {
        match self {
            BroadeningModel::Isotropic => "isotropic",
            BroadeningModel::Uniaxial => "uniaxial",
            BroadeningModel::Generalized => "generalized",
            BroadeningModel::Ellipsoidal => "ellipsoidal",
        }
    }

    /// 可用于微应变展宽
    pub fn supports_strain(&self) -> bool {
        !matches!(self, BroadeningModel::Ellipsoidal)
    }

    /// 可用于晶粒尺寸展宽
    pub fn supports_size(&self) -> bool {
        !matches!(self, BroadeningModel::Generalized)
    }
}

impl std::fmt::Display for BroadeningModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BroadeningModel {
    type Err = SuliError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isotropic" | "iso" => Ok(BroadeningModel::Isotropic),
            "uniaxial" | "uni" => Ok(BroadeningModel::Uniaxial),
            "generalized" | "gen" => Ok(BroadeningModel::Generalized),
            "ellipsoidal" | "ell" => Ok(BroadeningModel::Ellipsoidal),
            other => Err(SuliError::InvalidArgument(format!(
                "unknown broadening model '{}' (expected isotropic, uniaxial, generalized or ellipsoidal)",
                other
            ))),
        }
    }
}

/// 参数组：一次精修步骤中开启/关闭的一组参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterGroup {
    /// 直方图背景（chebyschev-1）
    Background { coeffs: u32 },
    /// 物相晶胞；`phase` 为 None 表示所有物相
    Cell { phase: Option<usize> },
    /// 物相-直方图晶胞应变（顺序精修中的晶胞精修）
    #[serde(rename = "hstrain")]
    HStrain,
    /// 微应变展宽
    Mustrain { model: BroadeningModel },
    /// 晶粒尺寸展宽
    Size { model: BroadeningModel },
    /// 仪器参数
    Instrument { parameters: Vec<InstrumentParameter> },
}

impl ParameterGroup {
    /// 微应变展宽；模型不适用时报错
    pub fn mustrain(model: BroadeningModel) -> Result<Self> {
        if !model.supports_strain() {
            return Err(SuliError::InvalidArgument(format!(
                "'{}' is not a strain broadening model (expected isotropic, uniaxial or generalized)",
                model
            )));
        }
        Ok(ParameterGroup::Mustrain { model })
    }

    /// 晶粒尺寸展宽；模型不适用时报错
    pub fn size(model: BroadeningModel) -> Result<Self> {
        if !model.supports_size() {
            return Err(SuliError::InvalidArgument(format!(
                "'{}' is not a size broadening model (expected isotropic, uniaxial or ellipsoidal)",
                model
            )));
        }
        Ok(ParameterGroup::Size { model })
    }

    /// 参数组类别名（用于记录与查找）
    pub fn kind(&self) -> &'static str {
        match self {
            ParameterGroup::Background { .. } => "background",
            ParameterGroup::Cell { .. } => "cell",
            ParameterGroup::HStrain => "hstrain",
            ParameterGroup::Mustrain { .. } => "mustrain",
            ParameterGroup::Size { .. } => "size",
            ParameterGroup::Instrument { .. } => "instrument",
        }
    }
}

impl std::fmt::Display for ParameterGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterGroup::Background { coeffs } => {
                write!(f, "background (chebyschev-1, {} coeffs)", coeffs)
            }
            ParameterGroup::Cell { phase: None } => write!(f, "cell (all phases)"),
            ParameterGroup::Cell { phase: Some(i) } => write!(f, "cell (phase #{})", i),
            ParameterGroup::HStrain => write!(f, "cell (HStrain)"),
            ParameterGroup::Mustrain { model } => write!(f, "strain broadening ({})", model),
            ParameterGroup::Size { model } => write!(f, "size broadening ({})", model),
            ParameterGroup::Instrument { parameters } => {
                let names: Vec<&str> = parameters.iter().map(|p| p.name()).collect();
                write!(f, "instrument [{}]", names.join(", "))
            }
        }
    }
}

/// 直方图数据（引擎内部强度单位）
///
/// 引擎侧的非有限值以 null 传输，读入后还原为 NaN。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistogramData {
    /// 2θ（度）
    #[serde(deserialize_with = "nullable_f64s")]
    pub x: Vec<f64>,
    #[serde(deserialize_with = "nullable_f64s")]
    pub yobs: Vec<f64>,
    /// 计算强度，包含引擎背景
    #[serde(deserialize_with = "nullable_f64s")]
    pub ycalc: Vec<f64>,
    #[serde(deserialize_with = "nullable_f64s")]
    pub background: Vec<f64>,
}

fn nullable_f64s<'de, D>(deserializer: D) -> std::result::Result<Vec<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

impl HistogramData {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// 精修引擎能力接口
///
/// 参数组的开启/关闭作用于项目中所有直方图与物相。
pub trait RefinementEngine {
    /// 在给定路径创建新项目
    fn create_project(&mut self, project: &Path) -> Result<()>;

    /// 设置最大最小二乘循环数
    fn set_max_cycles(&mut self, cycles: u32) -> Result<()>;

    /// 注册粉末直方图，返回直方图名称；`link_phases` 为需关联的物相名
    fn add_histogram(&mut self, data: &Path, instprm: &Path, link_phases: &[String])
        -> Result<String>;

    /// 用新的 `data.xy` 替换第 `index` 个直方图的观测数据，不重新注册
    fn replace_histogram_data(&mut self, index: usize, data: &Path) -> Result<()>;

    /// 清除直方图的冻结参数列表
    fn clear_frozen(&mut self, histogram: &str) -> Result<()>;

    /// 注册物相，返回物相名称；`link_histograms` 为需关联的直方图名
    fn add_phase(&mut self, phase: &PhaseSpec, link_histograms: &[String]) -> Result<String>;

    /// 开启顺序精修：所有直方图、循环数、参数向后传递
    fn configure_sequential(&mut self, cycles: u32, copy_forward: bool) -> Result<()>;

    /// 开启或关闭参数组
    fn set_refinement(&mut self, group: &ParameterGroup, enable: bool) -> Result<()>;

    /// LeBail 模式开关
    fn set_lebail(&mut self, enabled: bool) -> Result<()>;

    /// 执行精修，返回引擎控制台输出
    fn refine(&mut self) -> Result<String>;

    /// 读取第 `index` 个直方图的数据
    fn histogram_data(&self, index: usize) -> Result<HistogramData>;

    /// 读取整个项目结果树
    fn result_tree(&self) -> Result<Node>;

    /// 保存项目
    fn save(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_parameter_names() {
        let names: Vec<String> = InstrumentParameter::DEFAULT.iter().map(|p| p.to_string()).collect();
        assert_eq!(names, vec!["X", "Y", "Z", "Zero", "SH/L", "U", "V", "W"]);
        assert_eq!("sh/l".parse::<InstrumentParameter>().unwrap(), InstrumentParameter::ShL);
        assert_eq!("ZERO".parse::<InstrumentParameter>().unwrap(), InstrumentParameter::Zero);
        assert!("Lam".parse::<InstrumentParameter>().is_err());
    }

    #[test]
    fn test_parameter_group_wire_format() {
        let g = ParameterGroup::Background { coeffs: 5 };
        assert_eq!(
            serde_json::to_value(&g).unwrap(),
            serde_json::json!({"kind": "background", "coeffs": 5})
        );
        let g = ParameterGroup::Instrument {
            parameters: vec![InstrumentParameter::ShL, InstrumentParameter::U],
        };
        assert_eq!(
            serde_json::to_value(&g).unwrap(),
            serde_json::json!({"kind": "instrument", "parameters": ["SH/L", "U"]})
        );
        assert_eq!(
            serde_json::to_value(&ParameterGroup::HStrain).unwrap(),
            serde_json::json!({"kind": "hstrain"})
        );
        let g = ParameterGroup::Mustrain {
            model: BroadeningModel::Isotropic,
        };
        assert_eq!(serde_json::to_value(&g).unwrap()["model"], "isotropic");
    }

    #[test]
    fn test_broadening_models() {
        assert_eq!("uni".parse::<BroadeningModel>().unwrap(), BroadeningModel::Uniaxial);
        assert_eq!("Generalized".parse::<BroadeningModel>().unwrap(), BroadeningModel::Generalized);
        assert!("anisotropic".parse::<BroadeningModel>().is_err());

        assert!(ParameterGroup::mustrain(BroadeningModel::Generalized).is_ok());
        assert!(ParameterGroup::mustrain(BroadeningModel::Ellipsoidal).is_err());
        assert!(ParameterGroup::size(BroadeningModel::Ellipsoidal).is_ok());
        assert!(ParameterGroup::size(BroadeningModel::Generalized).is_err());

        let g = ParameterGroup::size(BroadeningModel::Uniaxial).unwrap();
        assert_eq!(serde_json::to_value(&g).unwrap()["model"], "uniaxial");
    }

    #[test]
    fn test_histogram_data_null_becomes_nan() {
        let h: HistogramData = serde_json::from_value(serde_json::json!({
            "x": [1.0, 2.0], "yobs": [10.0, null], "ycalc": [11.0, 12.0], "background": [10.0, 10.0]
        }))
        .unwrap();
        assert_eq!(h.len(), 2);
        assert!(h.yobs[1].is_nan());
    }
}
