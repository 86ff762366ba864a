//! # 径向谱线与 q 范围
//!
//! `RadialProfile` 为按方位角平均后的一维谱线，`QRange` 为闭区间径向范围。
//!
//! ## 支持的谱线文件
//! - 数据集（`.json`）：按全范围平均为谱线
//! - 两列文本：`q intensity`，空白或逗号分隔，`#` 开头为注释
//!
//! ## 依赖关系
//! - 被 `xrd/background.rs`, `refiner/`, `commands/reduce.rs` 使用
//! - 使用 `models/measurement.rs` 读取数据集

use crate::error::{Result, SuliError};
use crate::models::Measurement;

use std::path::Path;
use std::str::FromStr;

/// 闭区间径向范围（Å⁻¹）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QRange {
    pub low: f64,
    pub high: f64,
}

impl QRange {
    /// 创建并校验范围，`low > high` 时返回错误
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if !low.is_finite() || !high.is_finite() {
            return Err(SuliError::InvalidRange(format!(
                "q range bounds must be finite, got [{}, {}]",
                low, high
            )));
        }
        if low > high {
            return Err(SuliError::InvalidRange(format!(
                "q range lower bound {} exceeds upper bound {}",
                low, high
            )));
        }
        Ok(QRange { low, high })
    }

    /// 解析 "min-max" 格式，如 "1.2-9.5"
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        // 跳过首字符，允许负数下界
        let split = s
            .char_indices()
            .skip(1)
            .find(|(i, c)| *c == '-' && !s[..*i].ends_with(|p: char| p == 'e' || p == 'E'))
            .map(|(i, _)| i)
            .ok_or_else(|| SuliError::InvalidRange(s.to_string()))?;

        let low: f64 = s[..split]
            .trim()
            .parse()
            .map_err(|_| SuliError::InvalidRange(s.to_string()))?;
        let high: f64 = s[split + 1..]
            .trim()
            .parse()
            .map_err(|_| SuliError::InvalidRange(s.to_string()))?;

        QRange::new(low, high)
    }

    pub fn contains(&self, q: f64) -> bool {
        q >= self.low && q <= self.high
    }
}

impl FromStr for QRange {
    type Err = SuliError;

    fn from_str(s: &str) -> Result<Self> {
        QRange::parse(s)
    }
}

impl std::fmt::Display for QRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

/// 一维径向谱线
#[derive(Debug, Clone, PartialEq)]
pub struct RadialProfile {
    /// 径向坐标 q（Å⁻¹）
    pub q: Vec<f64>,
    /// 方位角平均强度
    pub intensity: Vec<f64>,
}

impl RadialProfile {
    pub fn new(q: Vec<f64>, intensity: Vec<f64>) -> Result<Self> {
        if q.len() != intensity.len() {
            return Err(SuliError::LengthMismatch {
                what: "radial profile intensity".to_string(),
                expected: q.len(),
                found: intensity.len(),
            });
        }
        Ok(RadialProfile { q, intensity })
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    /// 从数据集或两列文本读取谱线
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SuliError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let is_dataset = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_dataset {
            return Measurement::load(path)?.radial_profile(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| SuliError::read(path, e))?;
        Self::parse_columns(&content, path)
    }

    fn parse_columns(content: &str, path: &Path) -> Result<Self> {
        let mut q = Vec::new();
        let mut intensity = Vec::new();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|f| !f.is_empty())
                .collect();

            let parse = |field: Option<&&str>| -> Result<f64> {
                field.and_then(|f| f.parse().ok()).ok_or_else(|| SuliError::ParseError {
                    format: "profile".to_string(),
                    path: path.display().to_string(),
                    reason: format!("line {}: expected two numeric columns", lineno + 1),
                })
            };

            q.push(parse(fields.first())?);
            intensity.push(parse(fields.get(1))?);
        }

        if q.is_empty() {
            return Err(SuliError::ParseError {
                format: "profile".to_string(),
                path: path.display().to_string(),
                reason: "no data rows".to_string(),
            });
        }

        Ok(RadialProfile { q, intensity })
    }

    /// 截取闭区间范围内的样本
    pub fn window(&self, range: &QRange) -> RadialProfile {
        let (q, intensity) = self
            .q
            .iter()
            .zip(&self.intensity)
            .filter(|(q, _)| range.contains(**q))
            .map(|(q, y)| (*q, *y))
            .unzip();
        RadialProfile { q, intensity }
    }
}
