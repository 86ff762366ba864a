//! # 结果树读取器
//!
//! 按 GSAS-II 项目树的固定布局读取物相、晶胞常数、拟合质量、
//! 仪器参数与相关矩阵。
//!
//! ## 直方图命名
//! 第 0 个直方图的键为 `PWDR data.xy`，其余为 `PWDR data.xy_<i>`，
//! 这是引擎的命名方式，必须逐字复现。
//!
//! ## 依赖关系
//! - 被 `refiner/`, `commands/inspect.rs`, `xrd/plot.rs` 使用
//! - 使用 `results/tree.rs`, `results/search.rs`

use crate::error::{Result, SuliError};
use crate::results::search::find_first;
use crate::results::tree::Node;

use indexmap::IndexMap;

/// 直方图基础名称
pub const HISTOGRAM_BASE: &str = "PWDR data.xy";

/// 仪器参数文件中的键顺序
pub const INSTPRM_KEYS: [&str; 11] = [
    "Lam", "Polariz.", "Azimuth", "Zero", "U", "V", "W", "X", "Y", "Z", "SH/L",
];

/// 第 `index` 个直方图在结果树中的键
pub fn histogram_key(index: usize) -> String {
    if index == 0 {
        HISTOGRAM_BASE.to_string()
    } else {
        format!("{}_{}", HISTOGRAM_BASE, index)
    }
}

/// 有效物相名称（`Phases` 的键，去掉首个 `data` 条目）
pub fn valid_phases(tree: &Node) -> Result<Vec<String>> {
    let phases = tree.require(&["Phases"])?;
    let map = phases.as_map().ok_or_else(|| SuliError::InvalidTree {
        key: "Phases".to_string(),
        found: phases.kind().to_string(),
    })?;
    Ok(map.keys().skip(1).cloned().collect())
}

/// 晶胞常数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellConstants {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// (α, β, γ)，度
    pub angles: Option<(f64, f64, f64)>,
}

impl std::fmt::Display for CellConstants {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a = {:.6}, b = {:.6}, c = {:.6}", self.a, self.b, self.c)?;
        if let Some((alpha, beta, gamma)) = self.angles {
            write!(f, ", α = {:.4}, β = {:.4}, γ = {:.4}", alpha, beta, gamma)?;
        }
        Ok(())
    }
}

/// 读取物相的晶胞常数
///
/// `Cell` 布局为 `[refine, a, b, c, α, β, γ, volume]`。
pub fn cell_constants(tree: &Node, phase: &str, include_angles: bool) -> Result<CellConstants> {
    let phase_node = tree.require(&["Phases", phase])?;
    let cell = find_first(phase_node, "Cell").ok_or_else(|| SuliError::KeyNotFound {
        key: "Cell".to_string(),
        context: format!("Phases/{}", phase),
    })?;

    let value = |i: usize| -> Result<f64> {
        cell.index(i)
            .and_then(Node::as_f64)
            .ok_or_else(|| SuliError::KeyNotFound {
                key: format!("Cell[{}]", i),
                context: format!("Phases/{}", phase),
            })
    };

    let angles = if include_angles {
        Some((value(4)?, value(5)?, value(6)?))
    } else {
        None
    };

    Ok(CellConstants {
        a: value(1)?,
        b: value(2)?,
        c: value(3)?,
        angles,
    })
}

/// 拟合质量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitQuality {
    pub rwp: f64,
    pub gof: f64,
}

fn read_rvals(rvals: &Node, context: &str) -> Result<FitQuality> {
    let read = |key: &str| -> Result<f64> {
        rvals
            .get(key)
            .and_then(Node::as_f64)
            .ok_or_else(|| SuliError::KeyNotFound {
                key: key.to_string(),
                context: context.to_string(),
            })
    };
    Ok(FitQuality {
        rwp: read("Rwp")?,
        gof: read("GOF")?,
    })
}

/// 整体拟合质量：`Covariance/data/Rvals`
pub fn fit_quality(tree: &Node) -> Result<FitQuality> {
    let rvals = tree.require(&["Covariance", "data", "Rvals"])?;
    read_rvals(rvals, "Covariance/data/Rvals")
}

/// 顺序精修中第 `index` 个扫描的拟合质量
pub fn sequential_fit_quality(tree: &Node, index: usize) -> Result<FitQuality> {
    let key = histogram_key(index);
    let rvals = tree.require(&["Sequential results", "data", key.as_str(), "Rvals"])?;
    read_rvals(rvals, &format!("Sequential results/data/{}/Rvals", key))
}

/// 精修后的仪器参数（按 `INSTPRM_KEYS` 排序）
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentParameters {
    pub values: IndexMap<String, f64>,
}

impl InstrumentParameters {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}

/// 读取第 `index` 个直方图的仪器参数
///
/// 每个参数在树中为 `[初始值, 当前值, ...]`，取当前值。
pub fn instrument_parameters(tree: &Node, index: usize) -> Result<InstrumentParameters> {
    let key = histogram_key(index);
    let params = tree
        .require(&[key.as_str(), "Instrument Parameters"])?
        .index(0)
        .ok_or_else(|| SuliError::KeyNotFound {
            key: "[0]".to_string(),
            context: format!("{}/Instrument Parameters", key),
        })?;

    let mut values = IndexMap::new();
    for name in INSTPRM_KEYS {
        let value = params
            .get(name)
            .and_then(|entry| entry.index(1))
            .and_then(Node::as_f64)
            .ok_or_else(|| SuliError::KeyNotFound {
                key: name.to_string(),
                context: format!("{}/Instrument Parameters[0]", key),
            })?;
        values.insert(name.to_string(), value);
    }

    Ok(InstrumentParameters { values })
}

/// 相关矩阵
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    /// 行优先
    pub values: Vec<Vec<f64>>,
}

/// 由协方差矩阵计算相关矩阵，|r| > 1 的元素置零
pub fn correlation_matrix(tree: &Node) -> Result<CorrelationMatrix> {
    let data = tree.require(&["Covariance", "data"])?;
    let context = "Covariance/data";

    let missing = |key: &str| SuliError::KeyNotFound {
        key: key.to_string(),
        context: context.to_string(),
    };

    let sig = data
        .get("sig")
        .and_then(Node::to_f64_vec)
        .ok_or_else(|| missing("sig"))?;
    let labels: Vec<String> = data
        .get("varyList")
        .and_then(Node::as_seq)
        .ok_or_else(|| missing("varyList"))?
        .iter()
        .map(|n| n.as_str().map(str::to_string).unwrap_or_else(|| "?".to_string()))
        .collect();
    let rows = data
        .get("covMatrix")
        .and_then(Node::as_seq)
        .ok_or_else(|| missing("covMatrix"))?;

    let n = sig.len();
    if rows.len() != n || labels.len() != n {
        return Err(SuliError::LengthMismatch {
            what: "covariance matrix".to_string(),
            expected: n,
            found: rows.len(),
        });
    }

    let mut values = Vec::with_capacity(n);
    for (i, row) in rows.iter().enumerate() {
        let row = row.to_f64_vec().filter(|r| r.len() == n).ok_or_else(|| {
            SuliError::InvalidTree {
                key: format!("covMatrix[{}]", i),
                found: row.kind().to_string(),
            }
        })?;
        let corr: Vec<f64> = row
            .iter()
            .enumerate()
            .map(|(j, cov)| {
                let r = cov / (sig[i] * sig[j]);
                if r.is_finite() && r.abs() <= 1.0 {
                    r
                } else {
                    0.0
                }
            })
            .collect();
        values.push(corr);
    }

    Ok(CorrelationMatrix { labels, values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gpx_tree() -> Node {
        Node::from(json!({
            "Controls": {"data": {"max cyc": 100}},
            "Covariance": {"data": {
                "Rvals": {"Rwp": 8.25, "GOF": 1.5},
                "varyList": [":0:Zero", "0::A0"],
                "sig": [0.1, 0.2],
                "covMatrix": [[0.01, 0.01], [0.01, 0.04]]
            }},
            "Sequential results": {"data": {
                "PWDR data.xy": {"Rvals": {"Rwp": 9.0, "GOF": 1.1}},
                "PWDR data.xy_1": {"Rvals": {"Rwp": 10.0, "GOF": 1.3}}
            }},
            "Phases": {
                "data": null,
                "LaB6": {"General": {"Cell": [false, 4.1569, 4.1569, 4.1569, 90.0, 90.0, 90.0, 71.83]}},
                "CeO2": {"General": {"Cell": [true, 5.41, 5.41, 5.41, 90.0, 90.0, 90.0, 158.3]}}
            },
            "PWDR data.xy": {"Instrument Parameters": [{
                "Type": ["PXC", "PXC", false],
                "Lam": [0.1818, 0.1818, false],
                "Polariz.": [0.99, 0.99, false],
                "Azimuth": [0.0, 0.0, false],
                "Zero": [0.0, -0.0012, true],
                "U": [2.0, 1.5, true],
                "V": [-2.0, -1.0, true],
                "W": [5.0, 4.0, true],
                "X": [0.0, 0.1, true],
                "Y": [0.0, 0.2, true],
                "Z": [0.0, 0.0, false],
                "SH/L": [0.002, 0.002, false]
            }, {}]}
        }))
    }

    #[test]
    fn test_histogram_key() {
        assert_eq!(histogram_key(0), "PWDR data.xy");
        assert_eq!(histogram_key(1), "PWDR data.xy_1");
        assert_eq!(histogram_key(12), "PWDR data.xy_12");
    }

    #[test]
    fn test_valid_phases_skip_data_entry() {
        assert_eq!(valid_phases(&gpx_tree()).unwrap(), vec!["LaB6", "CeO2"]);
        assert!(valid_phases(&Node::from(json!({}))).is_err());
    }

    #[test]
    fn test_cell_constants() {
        let t = gpx_tree();
        let c = cell_constants(&t, "LaB6", false).unwrap();
        assert_eq!((c.a, c.b, c.c), (4.1569, 4.1569, 4.1569));
        assert!(c.angles.is_none());
        let c = cell_constants(&t, "CeO2", true).unwrap();
        assert_eq!(c.angles, Some((90.0, 90.0, 90.0)));
        assert!(cell_constants(&t, "Si", false).is_err());
    }

    #[test]
    fn test_fit_quality() {
        let t = gpx_tree();
        assert_eq!(fit_quality(&t).unwrap(), FitQuality { rwp: 8.25, gof: 1.5 });
        assert_eq!(sequential_fit_quality(&t, 0).unwrap().rwp, 9.0);
        assert_eq!(sequential_fit_quality(&t, 1).unwrap().gof, 1.3);
        assert!(matches!(
            sequential_fit_quality(&t, 2),
            Err(SuliError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_instrument_parameters_in_file_order() {
        let p = instrument_parameters(&gpx_tree(), 0).unwrap();
        let keys: Vec<&str> = p.values.keys().map(String::as_str).collect();
        assert_eq!(keys, INSTPRM_KEYS.to_vec());
        assert_eq!(p.get("Zero"), Some(-0.0012));
        assert_eq!(p.get("U"), Some(1.5));
        assert!(instrument_parameters(&gpx_tree(), 1).is_err());
    }

    #[test]
    fn test_correlation_matrix() {
        let m = correlation_matrix(&gpx_tree()).unwrap();
        assert_eq!(m.labels, vec![":0:Zero", "0::A0"]);
        assert!((m.values[0][0] - 1.0).abs() < 1e-12);
        assert!((m.values[0][1] - 0.5).abs() < 1e-12);
        assert!((m.values[1][1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_matrix_zeroes_unphysical() {
        let t = Node::from(json!({"Covariance": {"data": {
            "varyList": ["a", "b"],
            "sig": [0.1, 0.1],
            "covMatrix": [[0.01, 0.05], [0.05, 0.01]]
        }}}));
        let m = correlation_matrix(&t).unwrap();
        assert_eq!(m.values[0][1], 0.0);
    }
}
