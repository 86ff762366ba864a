//! # 精修产物
//!
//! 精修完成后写回测量数据集的派生曲线，全部为物理单位，
//! 与选定 q 范围内的径向谱线逐点对应。
//!
//! ## 依赖关系
//! - 被 `models/measurement.rs`, `refiner/`, `xrd/plot.rs`, `xrd/export.rs` 使用
//! - 无外部模块依赖

use serde::{Deserialize, Serialize};

/// 精修产物
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementProducts {
    /// 径向坐标 q（Å⁻¹）
    pub x_in_q: Vec<f64>,
    /// 引擎使用的 2θ（度）
    pub x_in_tth: Vec<f64>,
    /// d 间距（Å）
    pub x_in_d: Vec<f64>,
    /// 观测强度（方位角平均）
    pub y_obs: Vec<f64>,
    /// 计算峰强度，不含任何背景
    pub y_calc: Vec<f64>,
    /// 引擎拟合的剩余背景
    pub y_bkg_gsas: Vec<f64>,
    /// 精修前扣除的背景曲线
    pub y_bkg_auto: Vec<f64>,
    /// 引擎诊断日志全文
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gsas_lst: Option<String>,
}

impl RefinementProducts {
    pub fn len(&self) -> usize {
        self.x_in_q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_in_q.is_empty()
    }

    /// 总背景 = 预扣背景 + 引擎背景
    pub fn total_background(&self) -> Vec<f64> {
        self.y_bkg_auto
            .iter()
            .zip(&self.y_bkg_gsas)
            .map(|(a, g)| a + g)
            .collect()
    }

    /// 完整计算谱 = 峰 + 总背景
    pub fn total_calculated(&self) -> Vec<f64> {
        self.y_calc
            .iter()
            .zip(self.total_background())
            .map(|(c, b)| c + b)
            .collect()
    }

    /// 残差 = 观测 − 计算峰 − 总背景
    pub fn difference(&self) -> Vec<f64> {
        self.y_obs
            .iter()
            .zip(self.total_calculated())
            .map(|(o, c)| o - c)
            .collect()
    }
}
