//! # 数据导出
//!
//! ## 支持格式
//! - 引擎谱线 `data.xy`：每行 `2θ 强度`，`%.4f %.4f`
//! - 仪器参数文件 `.instprm`：两行 `#` 横幅 + `Type`/`Bank` + 固定顺序的键
//! - CSV：精修产物（逐点所有曲线）或约化结果（q、强度、背景）
//! - XY：约化后的径向谱线
//!
//! ## 依赖关系
//! - 被 `refiner/`, `commands/reduce.rs`, `commands/refine.rs` 调用
//! - 使用 `models/`, `results/readers.rs` 的 InstrumentParameters
//! - 使用 `csv` 库写入 CSV 文件

use crate::error::{Result, SuliError};
use crate::models::{RadialProfile, RefinementProducts};
use crate::results::{InstrumentParameters, INSTPRM_KEYS};

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// 仪器参数文件横幅
pub const INSTPRM_BANNER: [&str; 2] = [
    "#GSAS-II instrument parameter file; do not add/delete items!",
    "#Refined values exported by suli",
];

/// 写出引擎谱线文件
pub fn write_engine_xy(path: &Path, two_theta_deg: &[f64], intensity: &[f64]) -> Result<()> {
    if two_theta_deg.len() != intensity.len() {
        return Err(SuliError::LengthMismatch {
            what: "engine profile".to_string(),
            expected: two_theta_deg.len(),
            found: intensity.len(),
        });
    }

    let file = File::create(path).map_err(|e| SuliError::write(path, e))?;
    let mut out = BufWriter::new(file);
    for (x, y) in two_theta_deg.iter().zip(intensity) {
        writeln!(out, "{:.4} {:.4}", x, y).map_err(|e| SuliError::write(path, e))?;
    }
    out.flush().map_err(|e| SuliError::write(path, e))?;
    Ok(())
}

/// 读取两列文本谱线，跳过 `#` 注释和空行
pub fn read_xy(path: &Path) -> Result<(Vec<f64>, Vec<f64>)> {
    let content = fs::read_to_string(path).map_err(|e| SuliError::read(path, e))?;
    let mut xs = Vec::new();
    let mut ys = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut cols = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty());
        let parsed = match (cols.next(), cols.next()) {
            (Some(x), Some(y)) => x.parse::<f64>().ok().zip(y.parse::<f64>().ok()),
            _ => None,
        };
        let (x, y) = parsed.ok_or_else(|| SuliError::ParseError {
            format: "xy".to_string(),
            path: path.display().to_string(),
            reason: format!("line {}: expected two numeric columns", lineno + 1),
        })?;
        xs.push(x);
        ys.push(y);
    }

    Ok((xs, ys))
}

fn instprm_block(params: &InstrumentParameters) -> Result<String> {
    let mut block = String::new();
    block.push_str("Type:PXC\n");
    block.push_str("Bank:1.0\n");
    for key in INSTPRM_KEYS {
        let value = params.get(key).ok_or_else(|| SuliError::KeyNotFound {
            key: key.to_string(),
            context: "instrument parameters".to_string(),
        })?;
        block.push_str(&format!("{}:{}\n", key, value));
    }
    Ok(block)
}

/// 写出单直方图仪器参数文件
pub fn write_instprm(path: &Path, params: &InstrumentParameters) -> Result<()> {
    write_instprm_blocks(path, std::slice::from_ref(params))
}

/// 写出多直方图仪器参数文件，块之间以空行分隔
pub fn write_instprm_blocks(path: &Path, blocks: &[InstrumentParameters]) -> Result<()> {
    let mut content = String::new();
    for line in INSTPRM_BANNER {
        content.push_str(line);
        content.push('\n');
    }
    let rendered: Vec<String> = blocks.iter().map(instprm_block).collect::<Result<_>>()?;
    content.push_str(&rendered.join("\n"));

    fs::write(path, content).map_err(|e| SuliError::write(path, e))
}

/// 导出精修产物为 CSV
pub fn products_to_csv(products: &RefinementProducts, output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "q", "2theta", "d", "y_obs", "y_calc", "y_bkg_gsas", "y_bkg_auto", "y_total", "diff",
    ])?;

    let total = products.total_calculated();
    let diff = products.difference();
    for i in 0..products.len() {
        wtr.write_record([
            format!("{:.6}", products.x_in_q[i]),
            format!("{:.6}", products.x_in_tth[i]),
            format!("{:.6}", products.x_in_d[i]),
            format!("{:.6}", products.y_obs[i]),
            format!("{:.6}", products.y_calc[i]),
            format!("{:.6}", products.y_bkg_gsas[i]),
            format!("{:.6}", products.y_bkg_auto[i]),
            format!("{:.6}", total[i]),
            format!("{:.6}", diff[i]),
        ])?;
    }

    wtr.flush().map_err(|e| SuliError::write(output_path, e))?;
    Ok(())
}

/// 导出约化结果为 CSV
pub fn reduction_to_csv(
    profile: &RadialProfile,
    background: &[f64],
    output_path: &Path,
) -> Result<()> {
    if background.len() != profile.len() {
        return Err(SuliError::LengthMismatch {
            what: "background".to_string(),
            expected: profile.len(),
            found: background.len(),
        });
    }

    let mut wtr = csv::Writer::from_path(output_path)?;
    wtr.write_record(["q", "intensity", "background", "subtracted"])?;
    for ((q, y), b) in profile.q.iter().zip(&profile.intensity).zip(background) {
        wtr.write_record([
            format!("{:.6}", q),
            format!("{:.6}", y),
            format!("{:.6}", b),
            format!("{:.6}", y - b),
        ])?;
    }

    wtr.flush().map_err(|e| SuliError::write(output_path, e))?;
    Ok(())
}

/// 导出径向谱线为 XY
pub fn profile_to_xy(profile: &RadialProfile, output_path: &Path) -> Result<()> {
    let file = File::create(output_path).map_err(|e| SuliError::write(output_path, e))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "# Columns: q (1/Angstrom), Intensity (azimuthal mean)")
        .map_err(|e| SuliError::write(output_path, e))?;
    for (q, y) in profile.q.iter().zip(&profile.intensity) {
        writeln!(out, "{:.6}\t{:.6}", q, y).map_err(|e| SuliError::write(output_path, e))?;
    }
    out.flush().map_err(|e| SuliError::write(output_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::instprm::parse_instprm_file;
    use indexmap::IndexMap;

    fn params(lam: f64) -> InstrumentParameters {
        let mut values = IndexMap::new();
        for key in INSTPRM_KEYS {
            values.insert(key.to_string(), 0.0);
        }
        values.insert("Lam".to_string(), lam);
        values.insert("Polariz.".to_string(), 0.99);
        values.insert("U".to_string(), 1.5);
        InstrumentParameters { values }
    }

    #[test]
    fn test_engine_xy_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.xy");
        write_engine_xy(&path, &[1.0, 2.123456], &[10.0, 1000.00004]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "1.0000 10.0000\n2.1235 1000.0000\n");

        let (x, y) = read_xy(&path).unwrap();
        assert_eq!(x, vec![1.0, 2.1235]);
        assert_eq!(y, vec![10.0, 1000.0]);

        assert!(matches!(
            write_engine_xy(&path, &[1.0], &[]),
            Err(SuliError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_read_xy_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.xy");
        std::fs::write(&path, "# header\n1.0 2.0\nabc\n").unwrap();
        let err = read_xy(&path).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_instprm_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gsas.instprm.new");
        write_instprm(&path, &params(0.1818)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with('#'));
        assert!(lines[1].starts_with('#'));
        assert_eq!(lines[2], "Type:PXC");
        assert_eq!(lines[3], "Bank:1.0");
        assert_eq!(lines[4], "Lam:0.1818");
        assert_eq!(lines[5], "Polariz.:0.99");
        assert_eq!(lines[14], "SH/L:0");
        assert_eq!(lines.len(), 15);
    }

    #[test]
    fn test_instprm_blocks_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seq.instprm.new");
        write_instprm_blocks(&path, &[params(0.1818), params(0.2)]).unwrap();
        let blocks = parse_instprm_file(&path).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].wavelength(), Some(0.1818));
        assert_eq!(blocks[1].wavelength(), Some(0.2));
        assert_eq!(blocks[1].get_f64("U"), Some(1.5));
    }

    #[test]
    fn test_instprm_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = params(1.0);
        p.values.shift_remove("SH/L");
        assert!(matches!(
            write_instprm(&dir.path().join("x.instprm"), &p),
            Err(SuliError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_products_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.csv");
        let p = RefinementProducts {
            x_in_q: vec![1.0],
            x_in_tth: vec![5.0],
            x_in_d: vec![6.283185],
            y_obs: vec![20.0],
            y_calc: vec![8.0],
            y_bkg_gsas: vec![1.0],
            y_bkg_auto: vec![10.0],
            gsas_lst: None,
        };
        products_to_csv(&p, &path).unwrap();
        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.len(), 9);
        let row = rdr.records().next().unwrap().unwrap();
        assert_eq!(&row[7], "19.000000");
        assert_eq!(&row[8], "1.000000");
    }

    #[test]
    fn test_reduction_csv_and_xy() {
        let dir = tempfile::tempdir().unwrap();
        let profile = RadialProfile::new(vec![1.0, 2.0], vec![5.0, 7.0]).unwrap();
        let csv_path = dir.path().join("r.csv");
        reduction_to_csv(&profile, &[1.0, 2.0], &csv_path).unwrap();
        let text = std::fs::read_to_string(&csv_path).unwrap();
        assert!(text.contains("2.000000,7.000000,2.000000,5.000000"));
        assert!(reduction_to_csv(&profile, &[1.0], &csv_path).is_err());

        let xy_path = dir.path().join("r.xy");
        profile_to_xy(&profile, &xy_path).unwrap();
        let (q, y) = read_xy(&xy_path).unwrap();
        assert_eq!(q, vec![1.0, 2.0]);
        assert_eq!(y, vec![5.0, 7.0]);
    }
}
