//! # 扫描摄取流程
//!
//! 单扫描与顺序精修共用的数据准备：
//!
//! ```text
//! 数据集 → 选择 q 范围 → 方位角平均 → 背景估计 → 强度缓冲 → data.xy
//! ```
//!
//! 精修完成后由 `IngestedScan::recover` 把引擎曲线逆变换回物理单位。
//!
//! ## 依赖关系
//! - 被 `refiner/single.rs`, `refiner/sequential.rs` 使用
//! - 使用 `xrd/`, `models/`, `engine::HistogramData`

use crate::engine::HistogramData;
use crate::error::{Result, SuliError};
use crate::models::{Measurement, QRange, RadialProfile, RefinementProducts};
use crate::xrd::background::{estimate_background, BackgroundEstimate};
use crate::xrd::baseline::Arpls;
use crate::xrd::export::write_engine_xy;
use crate::xrd::scaling::IntensityScaling;
use crate::xrd::units::{q_to_d_all, q_to_twotheta_deg_all, METRES_TO_ANGSTROM};

use std::path::{Path, PathBuf};

/// 波长来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavelengthSource {
    /// 数据集自身的 `wavelength` 属性
    Dataset,
    /// 调用方提供的备用值
    Fallback,
    /// 顺序精修中所有扫描共用的波长
    Shared,
}

/// 摄取流程参数
#[derive(Debug, Clone)]
pub struct ScanPipeline {
    pub anchor: Option<RadialProfile>,
    pub arpls: Arpls,
}

/// 一次摄取的结果
#[derive(Debug, Clone)]
pub struct IngestedScan {
    pub path: PathBuf,
    pub measurement: Measurement,
    pub profile: RadialProfile,
    pub background: BackgroundEstimate,
    pub scaling: IntensityScaling,
    /// 波长（Å）
    pub wavelength: f64,
    pub wavelength_source: WavelengthSource,
    /// 引擎使用的 2θ（度）
    pub two_theta: Vec<f64>,
    /// 缓冲后的引擎强度
    pub engine_intensity: Vec<f64>,
}

impl ScanPipeline {
    pub fn new(anchor: Option<RadialProfile>, arpls: Arpls) -> Self {
        ScanPipeline { anchor, arpls }
    }

    /// 读取数据集并摄取
    ///
    /// `fallback` 为数据集缺少波长时使用的波长（Å）。
    pub fn ingest(&self, path: &Path, range: &QRange, fallback: Option<f64>) -> Result<IngestedScan> {
        let mut measurement = Measurement::load(path)?;
        measurement.clear_derived();

        let (wavelength, source) = match (measurement.wavelength_angstrom(), fallback) {
            (Some(w), _) => (w, WavelengthSource::Dataset),
            (None, Some(w)) => {
                measurement.set_wavelength_m(w / METRES_TO_ANGSTROM);
                (w, WavelengthSource::Fallback)
            }
            (None, None) => {
                return Err(SuliError::MissingWavelength {
                    path: path.display().to_string(),
                })
            }
        };

        self.ingest_measurement(path, measurement, range, wavelength, source)
    }

    /// 以给定波长摄取已加载的数据集
    pub fn ingest_measurement(
        &self,
        path: &Path,
        measurement: Measurement,
        range: &QRange,
        wavelength: f64,
        wavelength_source: WavelengthSource,
    ) -> Result<IngestedScan> {
        let profile = measurement.radial_profile(Some(range))?;
        let anchor = self.anchor.as_ref().map(|a| a.window(range));
        let background = estimate_background(&profile, anchor.as_ref(), &self.arpls)?;
        let scaling = IntensityScaling::fit(&profile.intensity, &background.curve)?;
        let engine_intensity = scaling.forward_all(&profile.intensity, &background.curve);
        let two_theta = q_to_twotheta_deg_all(&profile.q, wavelength)?;

        Ok(IngestedScan {
            path: path.to_path_buf(),
            measurement,
            profile,
            background,
            scaling,
            wavelength,
            wavelength_source,
            two_theta,
            engine_intensity,
        })
    }
}

impl IngestedScan {
    /// 写出引擎谱线文件
    pub fn write_engine_profile(&self, path: &Path) -> Result<()> {
        write_engine_xy(path, &self.two_theta, &self.engine_intensity)
    }

    /// 将引擎直方图逆变换为物理单位的精修产物
    pub fn recover(&self, histogram: &HistogramData) -> Result<RefinementProducts> {
        let n = self.profile.len();
        for (what, found) in [
            ("histogram x", histogram.x.len()),
            ("histogram ycalc", histogram.ycalc.len()),
            ("histogram background", histogram.background.len()),
        ] {
            if found != n {
                return Err(SuliError::LengthMismatch {
                    what: what.to_string(),
                    expected: n,
                    found,
                });
            }
        }

        let y_bkg_gsas: Vec<f64> = histogram
            .background
            .iter()
            .map(|b| self.scaling.to_physical(*b))
            .collect();
        let y_calc = histogram
            .ycalc
            .iter()
            .zip(&y_bkg_gsas)
            .map(|(c, b)| self.scaling.to_physical(*c) - b)
            .collect();

        Ok(RefinementProducts {
            x_in_q: self.profile.q.clone(),
            x_in_tth: histogram.x.clone(),
            x_in_d: q_to_d_all(&self.profile.q),
            y_obs: self.profile.intensity.clone(),
            y_calc,
            y_bkg_gsas,
            y_bkg_auto: self.background.curve.clone(),
            gsas_lst: None,
        })
    }

    /// 数据集文件名（用于标题与表格）
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
