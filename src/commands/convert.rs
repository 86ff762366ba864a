//! # convert 命令实现
//!
//! 批量换算衍射坐标，结果以表格显示。
//!
//! ## 依赖关系
//! - 使用 `cli/convert.rs` 定义的参数
//! - 使用 `xrd/units.rs`
//! - 使用 `utils/output.rs`

use crate::cli::convert::{ConvertArgs, UnitArg, DEFAULT_SOURCE_WAVELENGTH};
use crate::error::{Result, SuliError};
use crate::utils::output;
use crate::xrd::units::{convert, tth_wl1_to_wl2};

use tabled::{Table, Tabled};

/// 换算结果行
#[derive(Debug, Clone, Tabled)]
struct ConversionRow {
    #[tabled(rename = "Input")]
    input: String,
    #[tabled(rename = "Output")]
    output: String,
}

/// 执行 convert 命令
pub fn execute(args: ConvertArgs) -> Result<()> {
    let (header, from_label, to_label, results) = match args.to_wavelength {
        Some(wl2) => {
            let wl1 = args.wavelength.unwrap_or(DEFAULT_SOURCE_WAVELENGTH);
            check_wavelength(wl1)?;
            check_wavelength(wl2)?;
            (
                format!("Re-expressing 2θ from λ = {} Å to λ = {} Å", wl1, wl2),
                format!("2θ (°) @ {} Å", wl1),
                format!("2θ (°) @ {} Å", wl2),
                args.values
                    .iter()
                    .map(|v| tth_wl1_to_wl2(*v, wl1, wl2))
                    .collect::<Vec<_>>(),
            )
        }
        None => {
            let wavelength = match args.wavelength {
                Some(w) => {
                    check_wavelength(w)?;
                    w
                }
                None if args.from.needs_wavelength() || args.to.needs_wavelength() => {
                    return Err(SuliError::InvalidArgument(
                        "--wavelength is required when converting to or from two-theta"
                            .to_string(),
                    ))
                }
                // q ↔ d 不依赖波长
                None => f64::NAN,
            };
            (
                format!("Converting {} → {}", args.from, args.to),
                args.from.to_string(),
                args.to.to_string(),
                convert_values(&args.values, args.from, args.to, wavelength),
            )
        }
    };

    output::print_header(&header);

    let mut failed = 0;
    let rows: Vec<ConversionRow> = args
        .values
        .iter()
        .zip(&results)
        .map(|(value, result)| ConversionRow {
            input: format!("{} {}", value, from_label),
            output: match result {
                Ok(v) => format!("{:.6} {}", v, to_label),
                Err(_) => {
                    failed += 1;
                    "out of range".to_string()
                }
            },
        })
        .collect();

    println!("{}", Table::new(&rows));

    if failed > 0 {
        output::print_warning(&format!(
            "{} value(s) have no real solution at this wavelength",
            failed
        ));
    }
    Ok(())
}

fn check_wavelength(w: f64) -> Result<()> {
    if !w.is_finite() || w <= 0.0 {
        return Err(SuliError::InvalidArgument(format!(
            "wavelength must be a positive number of Å, got {}",
            w
        )));
    }
    Ok(())
}

/// 逐个换算，保留每个值的成败
fn convert_values(values: &[f64], from: UnitArg, to: UnitArg, wavelength: f64) -> Vec<Result<f64>> {
    values
        .iter()
        .map(|v| convert(*v, from.into(), to.into(), wavelength))
        .collect()
}
