//! # 测量数据集
//!
//! 一次二维衍射测量（cake 图样）及其元数据，以自描述 JSON 保存：
//!
//! ```json
//! {
//!   "radial":    [...],              // q, Å⁻¹
//!   "azimuthal": [...],              // 度
//!   "i2d":       {"v":1,"dim":[R,A],"data":[...]},
//!   "attrs":     {"wavelength": 1.8e-11, "HAB_temperature": 25.0},
//!   "refinement": { ... }            // 可选，精修产物
//! }
//! ```
//!
//! ## 约定
//! - `attrs.wavelength` 以米为单位
//! - 保存时先写同目录临时文件再原子重命名
//!
//! ## 依赖关系
//! - 被 `refiner/`, `commands/` 使用
//! - 使用 `models/profile.rs`, `models/products.rs`
//! - 使用 `ndarray`, `indexmap`, `serde_json`, `tempfile`

use crate::error::{Result, SuliError};
use crate::models::{QRange, RadialProfile, RefinementProducts};
use crate::xrd::units::METRES_TO_ANGSTROM;

use indexmap::IndexMap;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// 波长属性名
pub const WAVELENGTH_ATTR: &str = "wavelength";

/// 温度属性名
pub const TEMPERATURE_ATTR: &str = "HAB_temperature";

/// 一次二维衍射测量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    /// 径向坐标 q（Å⁻¹）
    pub radial: Vec<f64>,
    /// 方位角坐标（度）
    pub azimuthal: Vec<f64>,
    /// 强度，形状 (radial, azimuthal)
    pub i2d: Array2<f64>,
    /// 有序元数据
    #[serde(default)]
    pub attrs: IndexMap<String, Value>,
    /// 精修产物
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement: Option<RefinementProducts>,
    #[serde(skip)]
    source: Option<PathBuf>,
}

impl Measurement {
    /// 创建并校验形状
    pub fn new(radial: Vec<f64>, azimuthal: Vec<f64>, i2d: Array2<f64>) -> Result<Self> {
        let m = Measurement {
            radial,
            azimuthal,
            i2d,
            attrs: IndexMap::new(),
            refinement: None,
            source: None,
        };
        m.validate()?;
        Ok(m)
    }

    /// 从 JSON 数据集读取
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SuliError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let file = std::fs::File::open(path).map_err(|e| SuliError::read(path, e))?;
        let mut m: Measurement =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| SuliError::ParseError {
                format: "dataset".to_string(),
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        m.validate().map_err(|e| SuliError::ParseError {
            format: "dataset".to_string(),
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        m.source = Some(path.to_path_buf());
        Ok(m)
    }

    /// 原子写入：同目录临时文件 + 重命名
    pub fn save_atomic(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".suli-")
            .suffix(".json.new")
            .tempfile_in(&parent)
            .map_err(|e| SuliError::write(path, e))?;

        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, self)?;
            writer.flush().map_err(|e| SuliError::write(path, e))?;
        }

        tmp.persist(path).map_err(|e| SuliError::write(path, e.error))?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let (rows, cols) = self.i2d.dim();
        if rows != self.radial.len() {
            return Err(SuliError::LengthMismatch {
                what: "i2d radial axis".to_string(),
                expected: self.radial.len(),
                found: rows,
            });
        }
        if cols != self.azimuthal.len() {
            return Err(SuliError::LengthMismatch {
                what: "i2d azimuthal axis".to_string(),
                expected: self.azimuthal.len(),
                found: cols,
            });
        }
        Ok(())
    }

    /// 数据集来源路径（用于错误信息）
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn source_label(&self) -> String {
        self.source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<in-memory dataset>".to_string())
    }

    /// 清除上一次精修留下的派生字段
    pub fn clear_derived(&mut self) {
        self.refinement = None;
        self.attrs.shift_remove("gsas_lst");
    }

    /// 波长（米）
    pub fn wavelength_m(&self) -> Option<f64> {
        self.attrs
            .get(WAVELENGTH_ATTR)
            .and_then(Value::as_f64)
            .filter(|w| w.is_finite() && *w > 0.0)
    }

    /// 波长（Å）
    pub fn wavelength_angstrom(&self) -> Option<f64> {
        self.wavelength_m().map(|w| w * METRES_TO_ANGSTROM)
    }

    /// 波长（Å），缺失时报错
    pub fn require_wavelength_angstrom(&self) -> Result<f64> {
        self.wavelength_angstrom()
            .ok_or_else(|| SuliError::MissingWavelength {
                path: self.source_label(),
            })
    }

    /// 设置波长（米）
    pub fn set_wavelength_m(&mut self, wavelength: f64) {
        self.attrs.insert(WAVELENGTH_ATTR.to_string(), Value::from(wavelength));
    }

    /// 温度属性的显示文本
    pub fn temperature_label(&self) -> Option<String> {
        self.attrs.get(TEMPERATURE_ATTR).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// 整个径向范围
    pub fn full_range(&self) -> Result<QRange> {
        let finite = self.radial.iter().copied().filter(|q| q.is_finite());
        let (low, high) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), q| {
            (lo.min(q), hi.max(q))
        });
        if low > high {
            return Err(SuliError::EmptySelection {
                low,
                high,
                path: self.source_label(),
            });
        }
        QRange::new(low, high)
    }

    fn selected_rows(&self, range: Option<&QRange>) -> Result<Vec<usize>> {
        let rows: Vec<usize> = match range {
            None => (0..self.radial.len()).collect(),
            Some(r) => self
                .radial
                .iter()
                .enumerate()
                .filter(|(_, q)| r.contains(**q))
                .map(|(i, _)| i)
                .collect(),
        };

        if rows.is_empty() {
            let (low, high) = range
                .map(|r| (r.low, r.high))
                .unwrap_or((f64::NAN, f64::NAN));
            return Err(SuliError::EmptySelection {
                low,
                high,
                path: self.source_label(),
            });
        }
        Ok(rows)
    }

    /// 选择径向范围后对方位角取平均（忽略 NaN）
    pub fn radial_profile(&self, range: Option<&QRange>) -> Result<RadialProfile> {
        let rows = self.selected_rows(range)?;

        let q = rows.iter().map(|&i| self.radial[i]).collect();
        let intensity = rows
            .iter()
            .map(|&i| {
                let (sum, count) = self
                    .i2d
                    .row(i)
                    .iter()
                    .filter(|v| v.is_finite())
                    .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
                if count == 0 {
                    f64::NAN
                } else {
                    sum / count as f64
                }
            })
            .collect();

        Ok(RadialProfile { q, intensity })
    }

    /// 选择径向范围内的二维强度（用于绘图）
    pub fn cake_window(&self, range: Option<&QRange>) -> Result<(Vec<f64>, Array2<f64>)> {
        let rows = self.selected_rows(range)?;
        let q = rows.iter().map(|&i| self.radial[i]).collect();
        Ok((q, self.i2d.select(Axis(0), &rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> Measurement {
        let radial: Vec<f64> = (0..10).map(|i| 1.0 + i as f64 * 0.5).collect();
        let azimuthal = vec![-90.0, 0.0, 90.0];
        let i2d = Array2::from_shape_fn((10, 3), |(i, j)| (i * 10 + j) as f64);
        let mut m = Measurement::new(radial, azimuthal, i2d).unwrap();
        m.set_wavelength_m(1.8e-11);
        m
    }

    #[test]
    fn test_shape_validation() {
        let err = Measurement::new(vec![1.0, 2.0], vec![0.0], Array2::zeros((3, 1)));
        assert!(matches!(err, Err(SuliError::LengthMismatch { expected: 2, found: 3, .. })));
        let err = Measurement::new(vec![1.0], vec![0.0, 1.0], Array2::zeros((1, 3)));
        assert!(err.is_err());
    }

    #[test]
    fn test_radial_profile_mean() {
        let m = sample();
        let range = QRange::new(2.0, 3.0).unwrap();
        let p = m.radial_profile(Some(&range)).unwrap();
        assert_eq!(p.q, vec![2.0, 2.5, 3.0]);
        // 第 2 行: 20, 21, 22
        assert_relative_eq!(p.intensity[0], 21.0);
        assert_relative_eq!(p.intensity[2], 41.0);
    }

    #[test]
    fn test_radial_profile_skips_nan() {
        let mut m = sample();
        m.i2d[[0, 1]] = f64::NAN;
        let p = m.radial_profile(None).unwrap();
        assert_relative_eq!(p.intensity[0], 1.0);
    }

    #[test]
    fn test_empty_selection() {
        let m = sample();
        let range = QRange::new(20.0, 30.0).unwrap();
        assert!(matches!(
            m.radial_profile(Some(&range)),
            Err(SuliError::EmptySelection { .. })
        ));
    }

    #[test]
    fn test_wavelength_units() {
        let mut m = sample();
        assert_relative_eq!(m.wavelength_angstrom().unwrap(), 0.18, epsilon = 1e-12);
        m.attrs.shift_remove(WAVELENGTH_ATTR);
        assert!(m.wavelength_m().is_none());
        assert!(matches!(
            m.require_wavelength_angstrom(),
            Err(SuliError::MissingWavelength { .. })
        ));
    }

    #[test]
    fn test_full_range_and_cake_window() {
        let m = sample();
        let r = m.full_range().unwrap();
        assert_eq!((r.low, r.high), (1.0, 5.5));
        let (q, cake) = m.cake_window(Some(&QRange::new(1.0, 1.5).unwrap())).unwrap();
        assert_eq!(q, vec![1.0, 1.5]);
        assert_eq!(cake.dim(), (2, 3));
    }

    #[test]
    fn test_save_and_load_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_0001.json");
        let mut m = sample();
        m.attrs.insert(TEMPERATURE_ATTR.to_string(), Value::from(125.0));
        m.save_atomic(&path).unwrap();

        let loaded = Measurement::load(&path).unwrap();
        assert_eq!(loaded.i2d, m.i2d);
        assert_eq!(loaded.source(), Some(path.as_path()));
        assert_eq!(loaded.temperature_label().as_deref(), Some("125.0"));
        // 不留临时文件
        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_load_rejects_bad_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"radial":[1.0,2.0],"azimuthal":[0.0],"i2d":{"v":1,"dim":[1,1],"data":[3.0]}}"#,
        )
        .unwrap();
        assert!(matches!(
            Measurement::load(&path),
            Err(SuliError::ParseError { .. })
        ));
    }
}
