//! # GSAS-II 仪器参数文件解析器
//!
//! ## .instprm 格式说明
//! ```text
//! #GSAS-II instrument parameter file; do not add/delete items!
//! Type:PXC
//! Bank:1.0
//! Lam:0.1818
//! Polariz.:0.99
//! ...
//! ```
//!
//! 每行一个 `Key:value`，`#` 开头为注释。多直方图导出文件中，
//! 各块之间以空行分隔。
//!
//! ## 依赖关系
//! - 被 `refiner/`, `commands/refine.rs` 使用
//! - 使用 `regex`

use crate::error::{Result, SuliError};

use indexmap::IndexMap;
use regex::Regex;

use std::fs;
use std::path::Path;

/// 一个仪器参数块
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstprmBlock {
    pub entries: IndexMap<String, String>,
}

impl InstprmBlock {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// 波长（Å）
    pub fn wavelength(&self) -> Option<f64> {
        self.get_f64("Lam").filter(|w| w.is_finite() && *w > 0.0)
    }
}

fn line_pattern() -> Result<Regex> {
    Regex::new(r"^\s*([^#:\s][^:]*?)\s*:\s*(.*?)\s*$")
        .map_err(|e| SuliError::Other(format!("invalid instprm pattern: {}", e)))
}

/// 读取 .instprm 文件（所有块）
pub fn parse_instprm_file(path: &Path) -> Result<Vec<InstprmBlock>> {
    let content = fs::read_to_string(path).map_err(|e| SuliError::read(path, e))?;
    let blocks = parse_instprm_content(&content)?;
    if blocks.is_empty() {
        return Err(SuliError::ParseError {
            format: "instprm".to_string(),
            path: path.display().to_string(),
            reason: "no Key:value entries".to_string(),
        });
    }
    Ok(blocks)
}

/// 从字符串解析，空行分隔多个块
pub fn parse_instprm_content(content: &str) -> Result<Vec<InstprmBlock>> {
    let re = line_pattern()?;
    let mut blocks = Vec::new();
    let mut current = InstprmBlock::default();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !current.entries.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        if let Some(caps) = re.captures(trimmed) {
            current
                .entries
                .insert(caps[1].to_string(), caps[2].to_string());
        }
    }

    if !current.entries.is_empty() {
        blocks.push(current);
    }
    Ok(blocks)
}

/// 读取文件中第一个块的波长（Å）
pub fn read_wavelength(path: &Path) -> Result<Option<f64>> {
    Ok(parse_instprm_file(path)?
        .first()
        .and_then(InstprmBlock::wavelength))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#GSAS-II instrument parameter file; do not add/delete items!
Type:PXC
Bank:1.0
Lam:0.1818
Polariz.:0.99
Azimuth:0.0
Zero:0.0
U:2.0
V:-2.0
W:5.0
X:0.0
Y:0.0
Z:0.0
SH/L:0.002
";

    #[test]
    fn test_parse_single_block() {
        let blocks = parse_instprm_content(SAMPLE).unwrap();
        assert_eq!(blocks.len(), 1);
        let b = &blocks[0];
        assert_eq!(b.get("Type"), Some("PXC"));
        assert_eq!(b.get_f64("SH/L"), Some(0.002));
        assert_eq!(b.get_f64("Polariz."), Some(0.99));
        assert_eq!(b.wavelength(), Some(0.1818));
        let keys: Vec<&String> = b.entries.keys().collect();
        assert_eq!(keys[0], "Type");
        assert_eq!(keys.len(), 13);
    }

    #[test]
    fn test_parse_multiple_blocks() {
        let content = format!("{}\n{}\n", SAMPLE, SAMPLE.replace("Lam:0.1818", "Lam:0.2"));
        let blocks = parse_instprm_content(&content).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].wavelength(), Some(0.2));
    }

    #[test]
    fn test_tolerates_spaces_and_junk() {
        let blocks = parse_instprm_content("  Lam : 1.5406 \nnot a pair\n").unwrap();
        assert_eq!(blocks[0].wavelength(), Some(1.5406));
        assert_eq!(blocks[0].entries.len(), 1);
    }

    #[test]
    fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gsas.instprm");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(read_wavelength(&path).unwrap(), Some(0.1818));

        let empty = dir.path().join("empty.instprm");
        std::fs::write(&empty, "# nothing\n").unwrap();
        assert!(parse_instprm_file(&empty).is_err());
    }
}
