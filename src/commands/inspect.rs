//! # inspect 命令实现
//!
//! 查看导出的结果树：键查找、按深度列出、树形打印、物相晶胞、
//! 顺序精修得分和相关矩阵导出。
//!
//! ## 依赖关系
//! - 使用 `cli/inspect.rs` 定义的参数
//! - 使用 `results/`
//! - 使用 `utils/output.rs`

use crate::cli::inspect::InspectArgs;
use crate::error::{Result, SuliError};
use crate::results::{
    cell_constants, correlation_matrix, find_all, find_first, fit_quality, format_tree,
    histogram_key, sequential_fit_quality, valid_phases, CorrelationMatrix, DepthBand, Node,
};
use crate::utils::output;

use std::path::Path;
use tabled::{Table, Tabled};

/// 物相表格行
#[derive(Debug, Clone, Tabled)]
struct PhaseRow {
    #[tabled(rename = "Phase")]
    name: String,
    #[tabled(rename = "Cell")]
    cell: String,
}

/// 得分表格行
#[derive(Debug, Clone, Tabled)]
struct ScoreRow {
    #[tabled(rename = "Histogram")]
    histogram: String,
    #[tabled(rename = "Rwp")]
    rwp: String,
    #[tabled(rename = "GoF")]
    gof: String,
}

/// 执行 inspect 命令
pub fn execute(args: InspectArgs) -> Result<()> {
    let tree = Node::load(&args.tree)?;
    output::print_header(&format!("Result tree '{}'", args.tree.display()));

    match fit_quality(&tree) {
        Ok(q) => output::print_info(&format!("Rwp = {:.3}, GoF = {:.3}", q.rwp, q.gof)),
        Err(_) => output::print_info("No refinement statistics in this tree"),
    }

    if let Some(ref key) = args.key {
        if args.all {
            let band = DepthBand::new(args.min_depth, args.max_depth);
            let found = find_all(&tree, key, band)?;
            if found.is_empty() {
                output::print_warning(&format!(
                    "'{}' not found between depth {} and {}",
                    key,
                    band.min,
                    args.max_depth.map(|d| d.to_string()).unwrap_or_else(|| "∞".to_string())
                ));
            }
            for f in found {
                let value = f.map.get(key).map(render).unwrap_or_default();
                println!("{}: {}", f.label(), value);
            }
        } else {
            match find_first(&tree, key) {
                Some(value) => println!("{} = {}", key, render(value)),
                None => output::print_warning(&format!("'{}' not found", key)),
            }
        }
    }

    if args.tree_view {
        print!("{}", format_tree(&tree));
    }

    if args.phases {
        let rows: Vec<PhaseRow> = valid_phases(&tree)?
            .into_iter()
            .map(|name| {
                let cell = match cell_constants(&tree, &name, args.angles) {
                    Ok(c) => c.to_string(),
                    Err(e) => format!("unavailable ({})", e),
                };
                PhaseRow { name, cell }
            })
            .collect();
        output::print_header("Phases");
        println!("{}", Table::new(&rows));
    }

    if args.scores {
        let rows = sequential_scores(&tree);
        if rows.is_empty() {
            output::print_warning("No sequential results in this tree");
        } else {
            output::print_header("Sequential fit quality");
            println!("{}", Table::new(&rows));
        }
    }

    if let Some(ref path) = args.correlation {
        let matrix = correlation_matrix(&tree)?;
        write_correlation(&matrix, path)?;
        output::print_success(&format!(
            "{}x{} correlation matrix written to '{}'",
            matrix.labels.len(),
            matrix.labels.len(),
            path.display()
        ));
    }

    Ok(())
}

/// 连续读取 `histogram_key(0..)` 直到缺失
fn sequential_scores(tree: &Node) -> Vec<ScoreRow> {
    (0..)
        .map_while(|i| {
            sequential_fit_quality(tree, i).ok().map(|q| ScoreRow {
                histogram: histogram_key(i),
                rwp: format!("{:.3}", q.rwp),
                gof: format!("{:.3}", q.gof),
            })
        })
        .collect()
}

fn render(node: &Node) -> String {
    serde_json::to_string(node).unwrap_or_else(|_| format!("<{}>", node.kind()))
}

fn write_correlation(matrix: &CorrelationMatrix, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec![String::new()];
    header.extend(matrix.labels.iter().cloned());
    wtr.write_record(&header)?;

    for (label, row) in matrix.labels.iter().zip(&matrix.values) {
        let mut record = vec![label.clone()];
        record.extend(row.iter().map(|v| format!("{:.6}", v)));
        wtr.write_record(&record)?;
    }

    wtr.flush().map_err(|e| SuliError::write(path, e))?;
    Ok(())
}
