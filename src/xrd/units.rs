//! # 衍射坐标单位换算
//!
//! 2θ（弧度/角度）、散射矢量 q 与 d 间距之间的换算。
//!
//! ## 约定
//! - 波长单位为 Å，q 单位为 Å⁻¹，d 单位为 Å
//! - 函数名显式标注 2θ 的单位（`_deg` / `_rad`），不接受隐式单位
//! - 反正弦越界返回 `DomainError`，不产生 NaN
//!
//! ## 依赖关系
//! - 被 `xrd/background.rs`, `refiner/`, `commands/convert.rs` 使用
//! - 无外部模块依赖

use crate::error::{Result, SuliError};

use std::f64::consts::PI;

/// 原始数据集中波长以米存储，换算到 Å
pub const METRES_TO_ANGSTROM: f64 = 1.0e10;

/// 坐标单位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// 2θ（度）
    TwoThetaDeg,
    /// 2θ（弧度）
    TwoThetaRad,
    /// 散射矢量 q（Å⁻¹）
    Q,
    /// d 间距（Å）
    D,
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unit::TwoThetaDeg => write!(f, "2θ (°)"),
            Unit::TwoThetaRad => write!(f, "2θ (rad)"),
            Unit::Q => write!(f, "q (Å⁻¹)"),
            Unit::D => write!(f, "d (Å)"),
        }
    }
}

/// 2θ（弧度）转 q
pub fn twotheta_to_q(twotheta_rad: f64, wavelength: f64) -> f64 {
    (4.0 * PI / wavelength) * (twotheta_rad / 2.0).sin()
}

/// 2θ（度）转 q
pub fn twotheta_deg_to_q(twotheta_deg: f64, wavelength: f64) -> f64 {
    twotheta_to_q(twotheta_deg.to_radians(), wavelength)
}

/// q 转 2θ（弧度）
///
/// 当 `|q·λ/(4π)| > 1` 时没有实数解，返回 `DomainError`。
pub fn q_to_twotheta(q: f64, wavelength: f64) -> Result<f64> {
    let arg = q * wavelength / (4.0 * PI);
    if !arg.is_finite() || arg.abs() > 1.0 {
        return Err(SuliError::DomainError {
            operation: format!("q_to_twotheta(q = {}, wavelength = {})", q, wavelength),
            value: arg,
        });
    }
    Ok(2.0 * arg.asin())
}

/// q 转 2θ（度）
pub fn q_to_twotheta_deg(q: f64, wavelength: f64) -> Result<f64> {
    q_to_twotheta(q, wavelength).map(f64::to_degrees)
}

/// 批量 q 转 2θ（度），遇到第一个越界值即失败
pub fn q_to_twotheta_deg_all(q: &[f64], wavelength: f64) -> Result<Vec<f64>> {
    q.iter()
        .map(|&value| q_to_twotheta_deg(value, wavelength))
        .collect()
}

/// q 转 d 间距
pub fn q_to_d(q: f64) -> f64 {
    2.0 * PI / q
}

/// d 间距转 q
///
/// 与 `q_to_d` 公式相同：q = 2π/d 与 d = 2π/q 互为倒数关系，
/// 因此该对函数是对合的。
pub fn d_to_q(d: f64) -> f64 {
    2.0 * PI / d
}

/// 批量 q 转 d
pub fn q_to_d_all(q: &[f64]) -> Vec<f64> {
    q.iter().map(|&value| q_to_d(value)).collect()
}

/// 2θ（度）转 d 间距：d = λ / (2 sin(θ))
pub fn twotheta_deg_to_d(twotheta_deg: f64, wavelength: f64) -> f64 {
    twotheta_rad_to_d(twotheta_deg.to_radians(), wavelength)
}

/// 2θ（弧度）转 d 间距
pub fn twotheta_rad_to_d(twotheta_rad: f64, wavelength: f64) -> f64 {
    wavelength / (2.0 * (twotheta_rad / 2.0).sin())
}

/// 将波长 `wl1` 下测得的 2θ（度）换算为波长 `wl2` 下的等效 2θ（度）
pub fn tth_wl1_to_wl2(tth_deg: f64, wl1: f64, wl2: f64) -> Result<f64> {
    let q = twotheta_deg_to_q(tth_deg, wl1);
    q_to_twotheta_deg(q, wl2)
}

/// 通用单位换算（经由 q）
pub fn convert(value: f64, from: Unit, to: Unit, wavelength: f64) -> Result<f64> {
    if from == to {
        return Ok(value);
    }

    let q = match from {
        Unit::TwoThetaDeg => twotheta_deg_to_q(value, wavelength),
        Unit::TwoThetaRad => twotheta_to_q(value, wavelength),
        Unit::Q => value,
        Unit::D => d_to_q(value),
    };

    match to {
        Unit::TwoThetaDeg => q_to_twotheta_deg(q, wavelength),
        Unit::TwoThetaRad => q_to_twotheta(q, wavelength),
        Unit::Q => Ok(q),
        Unit::D => Ok(q_to_d(q)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_twotheta_q_round_trip() {
        for &wl in &[0.1818, 0.4592, 1.5406] {
            for i in 1..60 {
                let tth = i as f64 * PI / 60.0;
                let q = twotheta_to_q(tth, wl);
                let back = q_to_twotheta(q, wl).unwrap();
                assert_relative_eq!(back, tth, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_q_to_twotheta_domain_error() {
        // q·λ/(4π) = 2 -> 无解
        let wl = 1.0;
        let q = 8.0 * PI;
        match q_to_twotheta(q, wl) {
            Err(SuliError::DomainError { value, .. }) => assert_relative_eq!(value, 2.0),
            other => panic!("expected domain error, got {:?}", other),
        }
        assert!(q_to_twotheta_deg_all(&[1.0, q], wl).is_err());
    }

    #[test]
    fn test_d_q_involution() {
        for &q in &[0.5, 1.0, 2.5, 7.3, -3.0] {
            assert_relative_eq!(d_to_q(q_to_d(q)), q, max_relative = 1e-15);
        }
    }

    #[test]
    fn test_twotheta_to_d_units_agree() {
        // Cu Kα, Si (111) 约 28.44°
        let wl = 1.5406;
        let d_deg = twotheta_deg_to_d(28.44, wl);
        let d_rad = twotheta_rad_to_d(28.44_f64.to_radians(), wl);
        assert_relative_eq!(d_deg, d_rad, epsilon = 1e-12);
        assert!((d_deg - 3.1356).abs() < 1e-3);
        // 与 q 路径一致
        assert_relative_eq!(q_to_d(twotheta_deg_to_q(28.44, wl)), d_deg, epsilon = 1e-9);
    }

    #[test]
    fn test_tth_wl1_to_wl2() {
        let tth = 10.0;
        let converted = tth_wl1_to_wl2(tth, 0.187, 0.4592).unwrap();
        // q 守恒
        assert_relative_eq!(
            twotheta_deg_to_q(converted, 0.4592),
            twotheta_deg_to_q(tth, 0.187),
            epsilon = 1e-10
        );
        assert!(converted > tth);
        // 原路返回
        let back = tth_wl1_to_wl2(converted, 0.4592, 0.187).unwrap();
        assert_relative_eq!(back, tth, epsilon = 1e-9);
    }

    #[test]
    fn test_convert_between_units() {
        let wl = 0.4592;
        let d = convert(12.0, Unit::TwoThetaDeg, Unit::D, wl).unwrap();
        assert_relative_eq!(d, twotheta_deg_to_d(12.0, wl), epsilon = 1e-9);
        let tth = convert(d, Unit::D, Unit::TwoThetaDeg, wl).unwrap();
        assert_relative_eq!(tth, 12.0, epsilon = 1e-9);
        assert_eq!(convert(3.3, Unit::Q, Unit::Q, wl).unwrap(), 3.3);
    }
}
