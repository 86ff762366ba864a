//! # 引擎强度缓冲
//!
//! 将扣除背景后的谱线线性缩放到引擎期望的计数范围：
//!
//! ```text
//! y' = floor + scale · (y − background)
//! y  = (y' − floor) / scale + background
//! ```
//!
//! 其中 `scale = 1000 / max(y − background)`，`floor = 10`，
//! 对同一测量保持不变，保证正反变换精确互逆。
//!
//! ## 依赖关系
//! - 被 `refiner/ingest.rs` 调用
//! - 无外部模块依赖

use crate::error::{Result, SuliError};

/// 缩放后信号的最大值
pub const TARGET_CEILING: f64 = 1000.0;

/// 加性底数，保证强度严格为正
pub const BASELINE_FLOOR: f64 = 10.0;

/// 一次测量的缩放参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityScaling {
    pub scale: f64,
    pub floor: f64,
}

impl IntensityScaling {
    /// 由谱线与背景计算缩放参数
    pub fn fit(profile: &[f64], background: &[f64]) -> Result<Self> {
        if profile.len() != background.len() {
            return Err(SuliError::LengthMismatch {
                what: "background curve".to_string(),
                expected: profile.len(),
                found: background.len(),
            });
        }

        let max = profile
            .iter()
            .zip(background)
            .map(|(y, b)| y - b)
            .fold(f64::NEG_INFINITY, f64::max);

        if !(max > 0.0) || !max.is_finite() {
            return Err(SuliError::DegenerateSignal { max });
        }

        Ok(IntensityScaling {
            scale: TARGET_CEILING / max,
            floor: BASELINE_FLOOR,
        })
    }

    /// 单点正变换
    pub fn forward(&self, y: f64, background: f64) -> f64 {
        self.floor + self.scale * (y - background)
    }

    /// 整条谱线正变换
    pub fn forward_all(&self, profile: &[f64], background: &[f64]) -> Vec<f64> {
        profile
            .iter()
            .zip(background)
            .map(|(y, b)| self.forward(*y, *b))
            .collect()
    }

    /// 逆变换，加回背景
    pub fn inverse(&self, y_engine: f64, background: f64) -> f64 {
        (y_engine - self.floor) / self.scale + background
    }

    /// 逆变换到物理单位，不加背景（用于计算峰强度与引擎背景）
    pub fn to_physical(&self, y_engine: f64) -> f64 {
        (y_engine - self.floor) / self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let profile = vec![120.5, 340.25, 1800.0, 95.125, 400.0];
        let background = vec![90.0, 100.0, 110.0, 95.0, 105.0];
        let s = IntensityScaling::fit(&profile, &background).unwrap();

        let engine = s.forward_all(&profile, &background);
        for ((y, b), e) in profile.iter().zip(&background).zip(&engine) {
            assert!((s.inverse(*e, *b) - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_maximum_maps_to_ceiling_plus_floor() {
        let profile = vec![10.0, 60.0, 30.0];
        let background = vec![5.0, 10.0, 5.0];
        let s = IntensityScaling::fit(&profile, &background).unwrap();
        assert!((s.scale - 20.0).abs() < 1e-12);
        assert!((s.forward(60.0, 10.0) - 1010.0).abs() < 1e-9);
        // 背景点映射到 floor
        assert!((s.forward(5.0, 5.0) - BASELINE_FLOOR).abs() < 1e-12);
        assert!((s.to_physical(1010.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_signal() {
        assert!(matches!(
            IntensityScaling::fit(&[1.0, 1.0], &[1.0, 2.0]),
            Err(SuliError::DegenerateSignal { .. })
        ));
        assert!(IntensityScaling::fit(&[1.0], &[1.0, 2.0]).is_err());
    }
}
