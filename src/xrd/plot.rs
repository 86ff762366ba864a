//! # 精修与约化图表
//!
//! 使用 `plotters` 生成图表，输出格式由扩展名决定（`.svg` 为 SVG，其余为 PNG）。
//!
//! ## 精修图
//! 标题为数据集名称，副标题为 `(Rwp=…, GoF=…, Temp(C)=…)`，三个面板：
//! - 二维衍射饼图（对数强度），横轴 q
//! - 对数观测谱（黑）、对数完整计算谱（黄）、填充的总背景
//! - 残差 观测 − 计算峰 − 总背景（红）
//!
//! ## 约化图
//! 方位角平均谱线、背景曲线与扣除背景后的谱线。
//!
//! ## 依赖关系
//! - 被 `commands/refine.rs`, `commands/reduce.rs` 调用
//! - 使用 `models/products.rs`, `models/measurement.rs`
//! - 使用 `plotters` 渲染图表

use crate::error::{Result, SuliError};
use crate::models::{Measurement, QRange, RadialProfile, RefinementProducts};
use crate::results::FitQuality;

use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

/// 默认图像尺寸
pub const DEFAULT_SIZE: (u32, u32) = (1000, 1200);

fn plot_err<E: std::fmt::Debug>(e: E) -> SuliError {
    SuliError::PlotError(format!("{:?}", e))
}

/// 是否输出 SVG
pub fn is_svg(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("svg"))
        .unwrap_or(false)
}

/// 精修图副标题
pub fn refinement_subtitle(quality: Option<FitQuality>, temperature: Option<&str>) -> String {
    let (rwp, gof) = match quality {
        Some(q) => (format!("{:.3}", q.rwp), format!("{:.3}", q.gof)),
        None => ("na".to_string(), "na".to_string()),
    };
    format!(
        "(Rwp={} GoF={}, Temp(C)={})",
        rwp,
        gof,
        temperature.unwrap_or("na")
    )
}

/// 相邻坐标中点构成的单元边界，长度为 n + 1
pub fn cell_edges(centers: &[f64]) -> Vec<f64> {
    match centers.len() {
        0 => Vec::new(),
        1 => vec![centers[0] - 0.5, centers[0] + 0.5],
        n => {
            let mut edges = Vec::with_capacity(n + 1);
            edges.push(centers[0] - (centers[1] - centers[0]) / 2.0);
            for w in centers.windows(2) {
                edges.push((w[0] + w[1]) / 2.0);
            }
            edges.push(centers[n - 1] + (centers[n - 1] - centers[n - 2]) / 2.0);
            edges
        }
    }
}

/// 取 log10 的点，丢弃非正与非有限值
pub fn log_points(x: &[f64], y: &[f64]) -> Vec<(f64, f64)> {
    x.iter()
        .zip(y)
        .filter(|(x, y)| x.is_finite() && y.is_finite() && **y > 0.0)
        .map(|(x, y)| (*x, y.log10()))
        .collect()
}

/// 有限值的范围，带 5% 边距；没有有限值时为 None
pub fn padded_bounds<I: IntoIterator<Item = f64>>(values: I) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        return None;
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 1.0 };
    Some((lo - pad, hi + pad))
}

/// 生成精修图
pub fn plot_refinement(
    measurement: &Measurement,
    products: &RefinementProducts,
    name: &str,
    quality: Option<FitQuality>,
    output_path: &Path,
    size: (u32, u32),
) -> Result<()> {
    let subtitle = refinement_subtitle(quality, measurement.temperature_label().as_deref());
    if is_svg(output_path) {
        let root = SVGBackend::new(output_path, size).into_drawing_area();
        draw_refinement(&root, measurement, products, name, &subtitle)?;
        root.present().map_err(plot_err)?;
    } else {
        let root = BitMapBackend::new(output_path, size).into_drawing_area();
        draw_refinement(&root, measurement, products, name, &subtitle)?;
        root.present().map_err(plot_err)?;
    }
    Ok(())
}

fn draw_refinement<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    measurement: &Measurement,
    products: &RefinementProducts,
    name: &str,
    subtitle: &str,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).map_err(plot_err)?;
    let area = root
        .titled(name, ("sans-serif", 26).into_font())
        .map_err(plot_err)?;
    let area = area
        .titled(subtitle, ("sans-serif", 18).into_font())
        .map_err(plot_err)?;

    let panels = area.split_evenly((3, 1));
    let (q_min, q_max) = padded_bounds(products.x_in_q.iter().copied())
        .ok_or_else(|| SuliError::PlotError("no finite q values to plot".to_string()))?;

    // 饼图
    let window = QRange::new(
        products.x_in_q.first().copied().unwrap_or(q_min),
        products.x_in_q.last().copied().unwrap_or(q_max),
    )?;
    let (cake_q, cake) = measurement.cake_window(Some(&window))?;
    draw_cake(&panels[0], &cake_q, &measurement.azimuthal, &cake, (q_min, q_max))?;

    // 对数谱线
    let obs = log_points(&products.x_in_q, &products.y_obs);
    let calc = log_points(&products.x_in_q, &products.total_calculated());
    let bkg = log_points(&products.x_in_q, &products.total_background());
    let (y_lo, y_hi) = padded_bounds(
        obs.iter().chain(&calc).chain(&bkg).map(|(_, y)| *y),
    )
    .unwrap_or((0.0, 1.0));

    let mut chart = ChartBuilder::on(&panels[1])
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(q_min..q_max, y_lo..y_hi)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc("q (Å⁻¹)")
        .y_desc("log(Intensity)")
        .x_label_style(("sans-serif", 14))
        .y_label_style(("sans-serif", 14))
        .axis_desc_style(("sans-serif", 16))
        .draw()
        .map_err(plot_err)?;

    let bkg_color = RGBColor(0, 102, 204);
    chart
        .draw_series(AreaSeries::new(bkg.iter().copied(), y_lo, bkg_color.mix(0.2)))
        .map_err(plot_err)?
        .label("Ybkg")
        .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], bkg_color.mix(0.4).filled()));
    chart
        .draw_series(LineSeries::new(obs.iter().copied(), BLACK.stroke_width(2)))
        .map_err(plot_err)?
        .label("Yobs")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK.stroke_width(2)));
    let calc_color = RGBColor(230, 180, 0);
    chart
        .draw_series(LineSeries::new(calc.iter().copied(), calc_color.stroke_width(2)))
        .map_err(plot_err)?
        .label("Ycalc+Ybkg")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], calc_color.stroke_width(2)));
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(("sans-serif", 14))
        .draw()
        .map_err(plot_err)?;

    // 残差
    let diff: Vec<(f64, f64)> = products
        .x_in_q
        .iter()
        .copied()
        .zip(products.difference())
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    let (d_lo, d_hi) = padded_bounds(diff.iter().map(|(_, y)| *y)).unwrap_or((-1.0, 1.0));

    let mut chart = ChartBuilder::on(&panels[2])
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(q_min..q_max, d_lo..d_hi)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc("q (Å⁻¹)")
        .y_desc("Yobs-Ycalc-Ybkg")
        .x_label_style(("sans-serif", 14))
        .y_label_style(("sans-serif", 14))
        .axis_desc_style(("sans-serif", 16))
        .draw()
        .map_err(plot_err)?;
    chart
        .draw_series(LineSeries::new(diff, RED.stroke_width(1)))
        .map_err(plot_err)?;

    Ok(())
}

fn draw_cake<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    q: &[f64],
    azimuthal: &[f64],
    cake: &ndarray::Array2<f64>,
    (q_min, q_max): (f64, f64),
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let q_edges = cell_edges(q);
    let az_edges = cell_edges(azimuthal);
    let (az_min, az_max) = match (az_edges.first(), az_edges.last()) {
        (Some(lo), Some(hi)) if hi > lo => (*lo, *hi),
        _ => (-180.0, 180.0),
    };

    let logs = cake.mapv(|v| if v > 0.0 { v.log10() } else { f64::NAN });
    let (lo, hi) = logs
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let span = if hi > lo { hi - lo } else { 1.0 };

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(q_min..q_max, az_min..az_max)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("q (Å⁻¹)")
        .y_desc("Azimuth (°)")
        .x_label_style(("sans-serif", 14))
        .y_label_style(("sans-serif", 14))
        .axis_desc_style(("sans-serif", 16))
        .draw()
        .map_err(plot_err)?;

    let cells = logs.indexed_iter().filter(|(_, v)| v.is_finite()).map(|((i, j), v)| {
        let t = (v - lo) / span;
        let color = HSLColor(0.7 * (1.0 - t), 0.85, 0.2 + 0.4 * t);
        Rectangle::new(
            [(q_edges[i], az_edges[j]), (q_edges[i + 1], az_edges[j + 1])],
            color.filled(),
        )
    });
    chart.draw_series(cells).map_err(plot_err)?;
    Ok(())
}

/// 生成约化图；`background` 与谱线逐点对应
pub fn plot_reduction(
    profile: &RadialProfile,
    background: Option<&[f64]>,
    title: &str,
    output_path: &Path,
    size: (u32, u32),
) -> Result<()> {
    if let Some(b) = background {
        if b.len() != profile.len() {
            return Err(SuliError::LengthMismatch {
                what: "background curve".to_string(),
                expected: profile.len(),
                found: b.len(),
            });
        }
    }
    if is_svg(output_path) {
        let root = SVGBackend::new(output_path, size).into_drawing_area();
        draw_reduction(&root, profile, background, title)?;
        root.present().map_err(plot_err)?;
    } else {
        let root = BitMapBackend::new(output_path, size).into_drawing_area();
        draw_reduction(&root, profile, background, title)?;
        root.present().map_err(plot_err)?;
    }
    Ok(())
}

fn draw_reduction<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    profile: &RadialProfile,
    background: Option<&[f64]>,
    title: &str,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).map_err(plot_err)?;

    let points = |y: &[f64]| -> Vec<(f64, f64)> {
        profile
            .q
            .iter()
            .copied()
            .zip(y.iter().copied())
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect()
    };
    let raw = points(&profile.intensity);
    let bkg = background.map(points).unwrap_or_default();
    let subtracted: Vec<(f64, f64)> = background
        .map(|b| {
            let diff: Vec<f64> = profile.intensity.iter().zip(b).map(|(y, b)| y - b).collect();
            points(&diff)
        })
        .unwrap_or_default();

    let (x_lo, x_hi) = padded_bounds(raw.iter().map(|(x, _)| *x))
        .ok_or_else(|| SuliError::PlotError("no finite points to plot".to_string()))?;
    let (y_lo, y_hi) = padded_bounds(
        raw.iter().chain(&bkg).chain(&subtracted).map(|(_, y)| *y),
    )
    .unwrap_or((0.0, 1.0));

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 28).into_font())
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc("q (Å⁻¹)")
        .y_desc("Intensity")
        .x_label_style(("sans-serif", 16))
        .y_label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()
        .map_err(plot_err)?;

    let line_color = RGBColor(0, 102, 204);
    chart
        .draw_series(LineSeries::new(raw, line_color.stroke_width(2)))
        .map_err(plot_err)?
        .label("profile")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], line_color.stroke_width(2)));

    if !bkg.is_empty() {
        chart
            .draw_series(LineSeries::new(bkg, RED.stroke_width(2)))
            .map_err(plot_err)?
            .label("background")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));
        let sub_color = RGBColor(0, 150, 70);
        chart
            .draw_series(LineSeries::new(subtracted, sub_color.stroke_width(1)))
            .map_err(plot_err)?
            .label("subtracted")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], sub_color.stroke_width(1)));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(("sans-serif", 14))
        .draw()
        .map_err(plot_err)?;

    Ok(())
}
