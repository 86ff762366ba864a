//! # 精修配置
//!
//! 编排器的全部输入显式收集在 `RefinerConfig` 中，由 CLI 参数构造。
//!
//! ## 依赖关系
//! - 被 `refiner/single.rs`, `refiner/sequential.rs`, `commands/refine.rs` 使用
//! - 使用 `models/`, `xrd/baseline.rs`

use crate::error::{Result, SuliError};
use crate::models::{PhaseSpec, QRange, RadialProfile};
use crate::parsers::instprm::read_wavelength;
use crate::xrd::baseline::Arpls;
use crate::xrd::units::METRES_TO_ANGSTROM;

use std::path::PathBuf;

/// 默认临时目录根
pub const DEFAULT_SCRATCH_ROOT: &str = ".gsas2_scratch";

/// 默认最大循环数
pub const DEFAULT_MAX_CYCLES: u32 = 100;

/// 精修配置
#[derive(Debug, Clone)]
pub struct RefinerConfig {
    /// 仪器参数文件
    pub instprm: PathBuf,
    /// 物相列表
    pub phases: Vec<PhaseSpec>,
    /// 指定的临时目录；None 时在 `scratch_root` 下随机创建
    pub scratch_dir: Option<PathBuf>,
    pub scratch_root: PathBuf,
    /// q 范围；None 时取首个数据集的完整径向范围
    pub q_range: Option<QRange>,
    /// 锚定背景谱
    pub background: Option<RadialProfile>,
    pub arpls: Arpls,
    pub max_cycles: u32,
    pub verbose: bool,
    /// 数据集缺少波长时使用的波长（米）
    pub fallback_wavelength: Option<f64>,
}

impl RefinerConfig {
    pub fn new(instprm: impl Into<PathBuf>, phases: Vec<PhaseSpec>) -> Self {
        RefinerConfig {
            instprm: instprm.into(),
            phases,
            scratch_dir: None,
            scratch_root: PathBuf::from(DEFAULT_SCRATCH_ROOT),
            q_range: None,
            background: None,
            arpls: Arpls::default(),
            max_cycles: DEFAULT_MAX_CYCLES,
            verbose: false,
            fallback_wavelength: None,
        }
    }

    pub fn with_q_range(mut self, range: Option<QRange>) -> Self {
        self.q_range = range;
        self
    }

    pub fn with_background(mut self, background: Option<RadialProfile>) -> Self {
        self.background = background;
        self
    }

    pub fn with_scratch(mut self, dir: Option<PathBuf>, root: Option<PathBuf>) -> Self {
        self.scratch_dir = dir;
        if let Some(root) = root {
            self.scratch_root = root;
        }
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// 校验输入文件
    pub fn validate(&self) -> Result<()> {
        if !self.instprm.is_file() {
            return Err(SuliError::FileNotFound {
                path: self.instprm.display().to_string(),
            });
        }
        for phase in &self.phases {
            if !phase.cif_path.is_file() {
                return Err(SuliError::FileNotFound {
                    path: phase.cif_path.display().to_string(),
                });
            }
        }
        if self.max_cycles == 0 {
            return Err(SuliError::InvalidArgument(
                "max cycles must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// 备用波长（Å）：显式配置优先，其次仪器参数文件中的 `Lam`
    pub fn fallback_wavelength_angstrom(&self) -> Option<f64> {
        self.fallback_wavelength
            .map(|w| w * METRES_TO_ANGSTROM)
            .or_else(|| read_wavelength(&self.instprm).ok().flatten())
    }
}
