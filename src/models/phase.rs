//! # 物相描述
//!
//! 调用方提供的物相：结构文件路径、显示名称、强度缩放因子，
//! 原样传递给精修引擎。
//!
//! 命令行语法：`path/to/file.cif:Name[:scale]`
//!
//! ## 依赖关系
//! - 被 `engine/`, `refiner/`, `cli/` 使用

use crate::error::{Result, SuliError};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// 物相描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub cif_path: PathBuf,
    pub name: String,
    pub scale: f64,
}

impl PhaseSpec {
    pub fn new(cif_path: impl Into<PathBuf>, name: impl Into<String>, scale: f64) -> Self {
        PhaseSpec {
            cif_path: cif_path.into(),
            name: name.into(),
            scale,
        }
    }
}

impl FromStr for PhaseSpec {
    type Err = SuliError;

    fn from_str(s: &str) -> Result<Self> {
        // 从右侧拆分，允许路径中含 ':'（如 Windows 盘符）
        let invalid = || {
            SuliError::InvalidArgument(format!(
                "phase '{}' must look like path.cif:Name[:scale]",
                s
            ))
        };

        let parts: Vec<&str> = s.rsplitn(3, ':').collect();
        let (path, name, scale) = match parts.as_slice() {
            [last, middle, first] => match last.parse::<f64>() {
                Ok(scale) => (*first, *middle, scale),
                Err(_) => (s.rsplit_once(':').map(|(p, _)| p).ok_or_else(invalid)?, *last, 1.0),
            },
            [name, path] => (*path, *name, 1.0),
            _ => return Err(invalid()),
        };

        if path.trim().is_empty() || name.trim().is_empty() {
            return Err(invalid());
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(SuliError::InvalidArgument(format!(
                "phase scale must be positive, got {}",
                scale
            )));
        }

        Ok(PhaseSpec::new(path.trim(), name.trim(), scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_phase() {
        let p: PhaseSpec = "cifs/LaB6.cif:LaB6".parse().unwrap();
        assert_eq!(p.cif_path, PathBuf::from("cifs/LaB6.cif"));
        assert_eq!(p.name, "LaB6");
        assert_eq!(p.scale, 1.0);

        let p: PhaseSpec = "cifs/CeO2.cif:CeO2:0.5".parse().unwrap();
        assert_eq!(p.name, "CeO2");
        assert_eq!(p.scale, 0.5);

        let p: PhaseSpec = "C:/data/Si.cif:Si".parse().unwrap();
        assert_eq!(p.cif_path, PathBuf::from("C:/data/Si.cif"));
        assert_eq!(p.name, "Si");
    }

    #[test]
    fn test_parse_phase_errors() {
        assert!("LaB6.cif".parse::<PhaseSpec>().is_err());
        assert!(":LaB6".parse::<PhaseSpec>().is_err());
        assert!("a.cif:A:-1".parse::<PhaseSpec>().is_err());
    }
}
