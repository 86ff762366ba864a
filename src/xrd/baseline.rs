//! # 基线估计
//!
//! 非对称重加权惩罚最小二乘 (arPLS) 基线拟合。
//!
//! ## 算法概述
//! 1. 构造二阶差分惩罚矩阵 λ·DᵀD（五对角）
//! 2. 求解 (W + λDᵀD) z = W y
//! 3. 根据负残差的均值和标准差更新权重（logistic 函数）
//! 4. 权重相对变化小于容差或达到最大迭代次数时停止
//!
//! ## 参考
//! - Baek et al., Analyst 140 (2015) 250-257
//! - pybaselines.whittaker.arpls
//!
//! ## 依赖关系
//! - 被 `xrd/background.rs` 调用
//! - 无外部模块依赖

use crate::error::{Result, SuliError};

/// 基线估计器接口
///
/// 输入为采样曲线 (x, y)，输出与 y 等长的平滑基线。
pub trait BaselineEstimator {
    fn estimate(&self, x: &[f64], y: &[f64]) -> Result<Vec<f64>>;
}

/// arPLS 参数
#[derive(Debug, Clone, Copy)]
pub struct Arpls {
    /// 平滑参数 λ
    pub lam: f64,
    /// 最大迭代次数
    pub max_iter: usize,
    /// 权重相对变化收敛容差
    pub tol: f64,
}

impl Default for Arpls {
    fn default() -> Self {
        Arpls {
            lam: 1e5,
            max_iter: 50,
            tol: 1e-3,
        }
    }
}

impl Arpls {
    pub fn with_lam(lam: f64) -> Self {
        Arpls {
            lam,
            ..Default::default()
        }
    }
}

impl BaselineEstimator for Arpls {
    fn estimate(&self, x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
        if x.len() != y.len() {
            return Err(SuliError::LengthMismatch {
                what: "baseline x/y samples".to_string(),
                expected: y.len(),
                found: x.len(),
            });
        }
        if y.is_empty() {
            return Err(SuliError::BaselineError("empty input curve".to_string()));
        }
        if y.len() < 3 {
            // 二阶差分不存在，惩罚项为零
            return Ok(y.to_vec());
        }
        if !(self.lam > 0.0) {
            return Err(SuliError::BaselineError(format!(
                "smoothing parameter must be positive, got {}",
                self.lam
            )));
        }

        let penalty = PenaltyBands::second_order(y.len(), self.lam);
        let mut weights = vec![1.0; y.len()];
        let mut baseline = penalty.solve_weighted(&weights, y)?;

        for _ in 0..self.max_iter {
            let new_weights = match arpls_weights(y, &baseline) {
                Some(w) => w,
                None => break,
            };

            let diff_norm: f64 = weights
                .iter()
                .zip(&new_weights)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            let norm: f64 = weights.iter().map(|w| w * w).sum::<f64>().sqrt();

            weights = new_weights;
            baseline = penalty.solve_weighted(&weights, y)?;

            if norm > 0.0 && diff_norm / norm < self.tol {
                break;
            }
        }

        Ok(baseline)
    }
}

/// arPLS 权重更新；没有负残差或负残差无离散度时返回 None
fn arpls_weights(y: &[f64], baseline: &[f64]) -> Option<Vec<f64>> {
    let residual: Vec<f64> = y.iter().zip(baseline).map(|(a, b)| a - b).collect();
    let negatives: Vec<f64> = residual.iter().copied().filter(|r| *r < 0.0).collect();
    if negatives.is_empty() {
        return None;
    }

    let count = negatives.len() as f64;
    let mean = negatives.iter().sum::<f64>() / count;
    let var = negatives.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / count;
    let std = var.sqrt();
    if !(std > f64::EPSILON * mean.abs().max(1.0)) {
        return None;
    }

    Some(
        residual
            .iter()
            .map(|r| expit(-(2.0 / std) * (r - (2.0 * std - mean))))
            .collect(),
    )
}

/// 数值稳定的 logistic 函数
fn expit(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// λ·DᵀD 的三条带（主对角、第一/第二副对角）
struct PenaltyBands {
    diag: Vec<f64>,
    off1: Vec<f64>,
    off2: Vec<f64>,
}

impl PenaltyBands {
    /// 二阶差分惩罚矩阵
    fn second_order(n: usize, lam: f64) -> Self {
        let mut diag = vec![0.0; n];
        let mut off1 = vec![0.0; n.saturating_sub(1)];
        let mut off2 = vec![0.0; n.saturating_sub(2)];
        let coeffs = [1.0, -2.0, 1.0];

        // 每一行差分 [1, -2, 1] 对 DᵀD 的贡献
        for k in 0..n.saturating_sub(2) {
            for a in 0..3 {
                diag[k + a] += lam * coeffs[a] * coeffs[a];
            }
            off1[k] += lam * coeffs[0] * coeffs[1];
            off1[k + 1] += lam * coeffs[1] * coeffs[2];
            off2[k] += lam * coeffs[0] * coeffs[2];
        }

        PenaltyBands { diag, off1, off2 }
    }

    /// 求解 (diag(w) + λDᵀD) z = w·y（带状 Cholesky）
    fn solve_weighted(&self, weights: &[f64], y: &[f64]) -> Result<Vec<f64>> {
        let n = y.len();
        let mut l0 = vec![0.0; n];
        let mut l1 = vec![0.0; n];
        let mut l2 = vec![0.0; n];

        for i in 0..n {
            if i >= 2 {
                l2[i] = self.off2[i - 2] / l0[i - 2];
            }
            if i >= 1 {
                l1[i] = (self.off1[i - 1] - l2[i] * l1[i - 1]) / l0[i - 1];
            }
            let pivot = self.diag[i] + weights[i] - l1[i] * l1[i] - l2[i] * l2[i];
            if !(pivot > 0.0) || !pivot.is_finite() {
                return Err(SuliError::BaselineError(format!(
                    "penalized system is not positive definite at sample {} (pivot {})",
                    i, pivot
                )));
            }
            l0[i] = pivot.sqrt();
        }

        // L u = w·y
        let mut u = vec![0.0; n];
        for i in 0..n {
            let mut acc = weights[i] * y[i];
            if i >= 1 {
                acc -= l1[i] * u[i - 1];
            }
            if i >= 2 {
                acc -= l2[i] * u[i - 2];
            }
            u[i] = acc / l0[i];
        }

        // Lᵀ z = u
        let mut z = vec![0.0; n];
        for i in (0..n).rev() {
            let mut acc = u[i];
            if i + 1 < n {
                acc -= l1[i + 1] * z[i + 1];
            }
            if i + 2 < n {
                acc -= l2[i + 2] * z[i + 2];
            }
            z[i] = acc / l0[i];
        }

        Ok(z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_with_peak(n: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).map(|i| i as f64 * 0.05 + 1.0).collect();
        let line: Vec<f64> = x.iter().map(|v| 50.0 - 2.0 * v).collect();
        let y: Vec<f64> = x
            .iter()
            .zip(&line)
            .map(|(v, l)| l + 400.0 * (-((v - 3.5) / 0.05).powi(2) / 2.0).exp())
            .collect();
        (x, line, y)
    }

    #[test]
    fn test_solver_reproduces_linear_input() {
        // 直线的二阶差分为零，惩罚项不起作用
        let n = 40;
        let y: Vec<f64> = (0..n).map(|i| 3.0 + 0.5 * i as f64).collect();
        let bands = PenaltyBands::second_order(n, 1e5);
        let z = bands.solve_weighted(&vec![1.0; n], &y).unwrap();
        for (a, b) in z.iter().zip(&y) {
            assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_arpls_ignores_peak() {
        let (x, line, y) = linear_with_peak(100);
        let baseline = Arpls::default().estimate(&x, &y).unwrap();
        assert_eq!(baseline.len(), y.len());

        // 峰位处基线接近底层直线，远低于峰顶
        let peak_idx = 50;
        assert!(baseline[peak_idx] < line[peak_idx] + 40.0);
        assert!(y[peak_idx] - baseline[peak_idx] > 300.0);

        // 远离峰位处贴合直线
        for i in [5, 20, 80, 95] {
            assert!((baseline[i] - line[i]).abs() < 5.0, "i={} {}", i, baseline[i]);
        }
    }

    #[test]
    fn test_short_and_invalid_inputs() {
        assert_eq!(
            Arpls::default().estimate(&[1.0, 2.0], &[4.0, 5.0]).unwrap(),
            vec![4.0, 5.0]
        );
        assert!(Arpls::default().estimate(&[], &[]).is_err());
        assert!(Arpls::default().estimate(&[1.0, 2.0, 3.0], &[1.0, 2.0]).is_err());
        assert!(Arpls::with_lam(-1.0)
            .estimate(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0])
            .is_err());
    }

    #[test]
    fn test_expit_is_stable() {
        assert!((expit(0.0) - 0.5).abs() < 1e-15);
        assert!(expit(-800.0) >= 0.0);
        assert!((expit(800.0) - 1.0).abs() < 1e-15);
    }
}
