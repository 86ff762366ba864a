//! # reduce 命令实现
//!
//! 选择 q 范围 → 方位角平均 → 背景估计 → 导出。
//!
//! ## 依赖关系
//! - 使用 `cli/reduce.rs` 定义的参数
//! - 使用 `models/`, `xrd/background.rs`, `xrd/export.rs`, `xrd/plot.rs`
//! - 使用 `utils/output.rs`

use crate::cli::reduce::ReduceArgs;
use crate::error::{Result, SuliError};
use crate::models::{Measurement, QRange, RadialProfile};
use crate::utils::output;
use crate::xrd::export::{profile_to_xy, reduction_to_csv};
use crate::xrd::plot::plot_reduction;
use crate::xrd::{estimate_background, Arpls};

use std::path::Path;
use tabled::{Table, Tabled};

/// 约化摘要行
#[derive(Debug, Clone, Tabled)]
struct SummaryRow {
    #[tabled(rename = "Property")]
    property: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl SummaryRow {
    fn new(property: &str, value: impl Into<String>) -> Self {
        SummaryRow {
            property: property.to_string(),
            value: value.into(),
        }
    }
}

/// 执行 reduce 命令
pub fn execute(args: ReduceArgs) -> Result<()> {
    output::print_header(&format!("Reducing '{}'", args.dataset.display()));

    let measurement = Measurement::load(&args.dataset)?;
    let range = match args.q_range.as_deref() {
        Some(s) => QRange::parse(s)?,
        None => measurement.full_range()?,
    };
    let profile = measurement.radial_profile(Some(&range))?;

    let anchor = match args.background.as_deref() {
        Some(path) => {
            output::print_info(&format!("Anchoring background to '{}'", path.display()));
            Some(RadialProfile::load(path)?.window(&range))
        }
        None => None,
    };
    let estimate = estimate_background(&profile, anchor.as_ref(), &Arpls::with_lam(args.lam))?;
    let subtracted = estimate.subtract_from(&profile);

    let max_signal = subtracted
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);

    let mut rows = vec![
        SummaryRow::new("q range (1/Å)", range.to_string()),
        SummaryRow::new("Radial points", profile.len().to_string()),
        SummaryRow::new("Azimuthal bins", measurement.azimuthal.len().to_string()),
        SummaryRow::new(
            "Wavelength (Å)",
            measurement
                .wavelength_angstrom()
                .map(|w| format!("{:.6}", w))
                .unwrap_or_else(|| "na".to_string()),
        ),
        SummaryRow::new(
            "Temperature (C)",
            measurement.temperature_label().unwrap_or_else(|| "na".to_string()),
        ),
        SummaryRow::new("Max subtracted signal", format!("{:.3}", max_signal)),
    ];
    if let Some(scale) = estimate.anchor_scale {
        rows.push(SummaryRow::new("Anchor scale", format!("{:.4}", scale)));
    }
    println!("{}", Table::new(&rows));

    if let Some(ref out) = args.output {
        write_output(out, &profile, &estimate.curve, &args)?;
        output::print_success(&format!("Saved '{}'", out.display()));
    }

    Ok(())
}

fn write_output(path: &Path, profile: &RadialProfile, background: &[f64], args: &ReduceArgs) -> Result<()> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => reduction_to_csv(profile, background, path),
        "xy" | "dat" | "txt" => profile_to_xy(profile, path),
        "png" | "svg" => {
            let title = args
                .dataset
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            plot_reduction(profile, Some(background), &title, path, parse_size(&args.size)?)
        }
        other => Err(SuliError::InvalidArgument(format!(
            "unsupported output format '{}' (expected csv, xy, png or svg)",
            other
        ))),
    }
}

/// 解析 `WIDTHxHEIGHT`
pub fn parse_size(s: &str) -> Result<(u32, u32)> {
    let invalid =
        || SuliError::InvalidArgument(format!("invalid size '{}' (expected WIDTHxHEIGHT)", s));
    let lower = s.to_ascii_lowercase();
    let (w, h) = lower.split_once('x').ok_or_else(invalid)?;
    let w: u32 = w.trim().parse().map_err(|_| invalid())?;
    let h: u32 = h.trim().parse().map_err(|_| invalid())?;
    if w == 0 || h == 0 {
        return Err(invalid());
    }
    Ok((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1200x800").unwrap(), (1200, 800));
        assert_eq!(parse_size("640X480").unwrap(), (640, 480));
        assert!(parse_size("1200").is_err());
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("ax10").is_err());
    }
}
