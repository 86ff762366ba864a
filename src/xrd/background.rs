//! # 背景归一化
//!
//! 为径向谱线估计背景曲线，保证扣除背景后的信号处处非负。
//!
//! ## 两种模式
//! - **自动模式**：直接对谱线做基线估计，再整体平移使 `profile − curve ≥ 0`
//! - **锚定模式**：使用外部背景谱
//!   1. 校验长度与径向网格（最大偏差 ≤ `GRID_TOLERANCE`）
//!   2. 初始缩放 `profile[0] / background[0]`，每次乘 0.95 直到残差非负
//!   3. 对残差做基线估计，平移后加回缩放后的背景
//!
//! ## 依赖关系
//! - 被 `refiner/ingest.rs`, `commands/reduce.rs` 调用
//! - 使用 `xrd/baseline.rs` 的 BaselineEstimator
//! - 使用 `models/profile.rs` 的 RadialProfile

use crate::error::{Result, SuliError};
use crate::models::RadialProfile;
use crate::xrd::baseline::BaselineEstimator;

/// 背景与谱线径向网格允许的最大绝对偏差
pub const GRID_TOLERANCE: f64 = 1e-6;

/// 锚定缩放每次迭代的收缩因子
pub const SCALE_STEP: f64 = 0.95;

/// 锚定缩放的最大迭代次数
pub const MAX_SCALE_ITERATIONS: usize = 1000;

/// 背景估计结果
#[derive(Debug, Clone)]
pub struct BackgroundEstimate {
    /// 与谱线等长的背景曲线
    pub curve: Vec<f64>,
    /// 锚定模式下外部背景的最终缩放因子
    pub anchor_scale: Option<f64>,
}

impl BackgroundEstimate {
    /// 扣除背景后的信号
    pub fn subtract_from(&self, profile: &RadialProfile) -> Vec<f64> {
        profile
            .intensity
            .iter()
            .zip(&self.curve)
            .map(|(y, b)| y - b)
            .collect()
    }
}

/// 估计背景曲线
///
/// `anchor` 为 None 时使用自动模式。
pub fn estimate_background(
    profile: &RadialProfile,
    anchor: Option<&RadialProfile>,
    estimator: &dyn BaselineEstimator,
) -> Result<BackgroundEstimate> {
    match anchor {
        None => {
            let baseline = estimator.estimate(&profile.q, &profile.intensity)?;
            let curve = shift_under(&profile.intensity, baseline);
            Ok(BackgroundEstimate {
                curve,
                anchor_scale: None,
            })
        }
        Some(background) => {
            let background = reconcile_grids(profile, background)?;
            let scale = fit_anchor_scale(&profile.intensity, &background)?;

            let scaled: Vec<f64> = background.iter().map(|b| scale * b).collect();
            let residual: Vec<f64> = profile
                .intensity
                .iter()
                .zip(&scaled)
                .map(|(y, b)| y - b)
                .collect();

            let baseline = estimator.estimate(&profile.q, &residual)?;
            let shifted = shift_under(&residual, baseline);
            let mut curve: Vec<f64> = shifted.iter().zip(&scaled).map(|(a, b)| a + b).collect();
            clamp_under(&profile.intensity, &mut curve);

            Ok(BackgroundEstimate {
                curve,
                anchor_scale: Some(scale),
            })
        }
    }
}

/// 校验外部背景的网格并返回重锚定到谱线网格上的背景强度
pub fn reconcile_grids(profile: &RadialProfile, background: &RadialProfile) -> Result<Vec<f64>> {
    if background.len() != profile.len() {
        return Err(SuliError::LengthMismatch {
            what: "background profile".to_string(),
            expected: profile.len(),
            found: background.len(),
        });
    }

    let mut max_diff = 0.0_f64;
    let mut worst = 0;
    for (i, (a, b)) in profile.q.iter().zip(&background.q).enumerate() {
        let diff = (a - b).abs();
        if diff > max_diff || diff.is_nan() {
            max_diff = diff;
            worst = i;
        }
    }

    if !(max_diff <= GRID_TOLERANCE) {
        return Err(SuliError::GridMismatch {
            max_diff,
            index: worst,
            tolerance: GRID_TOLERANCE,
        });
    }

    Ok(background.intensity.clone())
}

/// 缩小外部背景直到 `profile − scale·background` 处处非负
pub fn fit_anchor_scale(profile: &[f64], background: &[f64]) -> Result<f64> {
    let first_profile = profile.first().copied().unwrap_or(f64::NAN);
    let first_background = background.first().copied().unwrap_or(f64::NAN);
    let mut scale = first_profile / first_background;

    if !scale.is_finite() {
        return Err(SuliError::BackgroundNormalization {
            iterations: 0,
            scale,
            min_residual: f64::NAN,
        });
    }

    let mut min_residual = f64::NAN;
    for _ in 0..=MAX_SCALE_ITERATIONS {
        min_residual = min_difference(profile, background, scale);
        if min_residual >= 0.0 {
            return Ok(scale);
        }
        scale *= SCALE_STEP;
    }

    Err(SuliError::BackgroundNormalization {
        iterations: MAX_SCALE_ITERATIONS,
        scale,
        min_residual,
    })
}

fn min_difference(profile: &[f64], background: &[f64], scale: f64) -> f64 {
    profile
        .iter()
        .zip(background)
        .map(|(y, b)| y - scale * b)
        .fold(f64::INFINITY, f64::min)
}

/// 平移基线使其不高于 `signal`
fn shift_under(signal: &[f64], baseline: Vec<f64>) -> Vec<f64> {
    let shift = min_difference(signal, &baseline, 1.0);
    let mut curve: Vec<f64> = baseline.into_iter().map(|b| b + shift).collect();
    clamp_under(signal, &mut curve);
    curve
}

/// 舍入误差导致的微小越界直接钳制
fn clamp_under(signal: &[f64], curve: &mut [f64]) {
    for (c, y) in curve.iter_mut().zip(signal) {
        if *y - *c < 0.0 {
            *c = *y;
        }
    }
}
