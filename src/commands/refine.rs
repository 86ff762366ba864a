//! # refine / refine-seq 命令实现
//!
//! 由命令行参数构造 `RefinerConfig` 与 GSAS-II 引擎，按配方执行精修，
//! 再根据选项写出图表、CSV、数据集、项目文件和仪器参数。
//!
//! ## 依赖关系
//! - 使用 `cli/refine.rs` 定义的参数
//! - 使用 `refiner/`, `engine/gsas2.rs`, `batch/collector.rs`
//! - 使用 `xrd/plot.rs`, `xrd/export.rs`, `utils/`

use crate::batch::FileCollector;
use crate::cli::refine::{RefineArgs, RefineOptions, RefineSeqArgs};
use crate::engine::{EngineConfig, Gsas2Bridge};
use crate::error::{Result, SuliError};
use crate::models::{Measurement, PhaseSpec, QRange, RadialProfile, RefinementProducts};
use crate::refiner::{format_rwp, Recipe, Refiner, RefinerConfig, SeqRefiner, StepRecord};
use crate::results::{FitQuality, Node};
use crate::utils::{output, progress};
use crate::xrd::export::products_to_csv;
use crate::xrd::plot::{plot_refinement, DEFAULT_SIZE};
use crate::xrd::units::METRES_TO_ANGSTROM;
use crate::xrd::Arpls;

use std::fs;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

/// 精修步骤表格行
#[derive(Debug, Clone, Tabled)]
struct StepRow {
    #[tabled(rename = "Step")]
    step: String,
    #[tabled(rename = "Rwp before")]
    rwp_before: String,
    #[tabled(rename = "Rwp after")]
    rwp_after: String,
    #[tabled(rename = "GoF")]
    gof: String,
}

impl From<&StepRecord> for StepRow {
    fn from(record: &StepRecord) -> Self {
        StepRow {
            step: record.label.clone(),
            rwp_before: format_rwp(record.rwp_before),
            rwp_after: format_rwp(record.rwp_after),
            gof: format_rwp(record.gof_after),
        }
    }
}

/// 顺序精修逐扫描得分行
#[derive(Debug, Clone, Tabled)]
struct ScoreRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Dataset")]
    dataset: String,
    #[tabled(rename = "Rwp")]
    rwp: String,
    #[tabled(rename = "GoF")]
    gof: String,
}

/// 执行 refine 命令
pub fn execute(args: RefineArgs) -> Result<()> {
    let opts = &args.options;
    output::print_header("GSAS-II Refinement");

    let recipe = Recipe::parse(&opts.steps)?;
    let config = build_config(opts)?;
    let engine = start_engine(opts)?;

    let (first, _) = args
        .datasets
        .split_first()
        .ok_or_else(|| SuliError::InvalidArgument("no dataset given".to_string()))?;
    let mut refiner = Refiner::new(engine, config, first)?;
    output::print_info(&format!(
        "Scratch directory: {} (q range {})",
        refiner.scratch().path().display(),
        refiner.q_range()
    ));

    for (i, dataset) in args.datasets.iter().enumerate() {
        if i > 0 {
            refiner.set_new_data(dataset)?;
        }
        output::print_info(&format!("Refining '{}' with [{}]", dataset.display(), recipe));

        let done = refiner.history().len();
        recipe.apply(&mut refiner)?;
        print_steps(&refiner.history()[done..]);

        let products = refiner.save_refinement()?.clone();
        let quality = refiner.fit_quality().ok();
        if let Some(q) = quality {
            output::print_success(&format!("Rwp = {:.3}, GoF = {:.3}", q.rwp, q.gof));
        }
        write_scan_outputs(opts, refiner.measurement(), &products, dataset, quality)?;

        if opts.update_dataset {
            refiner.update_dataset_file()?;
            output::print_success(&format!("Updated '{}'", dataset.display()));
        }
        if opts.update_gpx {
            let gpx = refiner.update_project_file()?;
            output::print_success(&format!("Saved project '{}'", gpx.display()));
        }
    }

    if opts.export_instprm {
        let path = refiner.export_instrument_parameters()?;
        output::print_success(&format!("Instrument parameters written to '{}'", path.display()));
    }
    if let Some(ref path) = opts.dump_tree {
        dump_tree(&refiner.result_tree()?, path)?;
    }
    if let Some(mode) = opts.cleanup {
        refiner.cleanup(mode.into())?;
    }

    output::print_done(&format!("Refined {} dataset(s)", args.datasets.len()));
    Ok(())
}

/// 执行 refine-seq 命令
pub fn execute_sequential(args: RefineSeqArgs) -> Result<()> {
    let opts = &args.options;
    output::print_header("GSAS-II Sequential Refinement");

    let files = FileCollector::new(args.inputs.clone())
        .with_pattern(&args.pattern)?
        .recursive(args.recursive)
        .collect()?;
    output::print_info(&format!("Found {} dataset(s)", files.len()));

    let recipe = Recipe::parse(&opts.steps)?;
    let config = build_config(opts)?;
    let engine = start_engine(opts)?;

    let mut refiner = SeqRefiner::new(engine, config, &files)?;
    refiner.set_steps_isolated(!args.keep_enabled);
    output::print_info(&format!(
        "Scratch directory: {} (q range {}, λ = {:.6} Å)",
        refiner.scratch().path().display(),
        refiner.q_range(),
        refiner.wavelength()
    ));

    output::print_info(&format!("Refining with [{}]", recipe));
    recipe.apply(&mut refiner)?;
    print_steps(refiner.history());

    refiner.save_refinement()?;

    let rows: Vec<ScoreRow> = refiner
        .scans()
        .iter()
        .enumerate()
        .map(|(i, scan)| {
            let quality = refiner.ref_scores(i).ok();
            ScoreRow {
                index: i,
                dataset: scan.name(),
                rwp: format_rwp(quality.map(|q| q.rwp)),
                gof: format_rwp(quality.map(|q| q.gof)),
            }
        })
        .collect();
    output::print_header("Per-scan fit quality");
    println!("{}", Table::new(&rows));

    for (i, scan) in refiner.scans().iter().enumerate() {
        if let Some(ref products) = scan.measurement.refinement {
            let quality = refiner.ref_scores(i).ok();
            write_scan_outputs(opts, &scan.measurement, products, &scan.path, quality)?;
        }
    }

    if opts.update_dataset {
        refiner.update_dataset_files()?;
        output::print_success(&format!("Updated {} dataset file(s)", refiner.len()));
    }
    if opts.update_gpx {
        let written = refiner.update_project_files()?;
        output::print_success(&format!("Saved {} project file(s)", written.len()));
    }
    if opts.export_instprm {
        let path = refiner.export_instrument_parameters()?;
        output::print_success(&format!("Instrument parameters written to '{}'", path.display()));
    }
    if let Some(ref path) = opts.dump_tree {
        dump_tree(&refiner.result_tree()?, path)?;
    }
    if let Some(mode) = opts.cleanup {
        refiner.cleanup(mode.into())?;
    }

    output::print_done(&format!("Sequentially refined {} dataset(s)", refiner.len()));
    Ok(())
}

/// 由命令行选项构造配置并校验输入文件
fn build_config(opts: &RefineOptions) -> Result<RefinerConfig> {
    let phases = opts
        .phases
        .iter()
        .map(|s| s.parse::<PhaseSpec>())
        .collect::<Result<Vec<_>>>()?;
    let q_range = opts.q_range.as_deref().map(QRange::parse).transpose()?;
    let background = opts.background.as_deref().map(RadialProfile::load).transpose()?;

    let mut config = RefinerConfig::new(&opts.instprm, phases)
        .with_q_range(q_range)
        .with_background(background)
        .with_scratch(opts.scratch.clone(), Some(opts.scratch_root.clone()))
        .with_verbose(opts.verbose);
    config.arpls = Arpls::with_lam(opts.lam);
    config.max_cycles = opts.max_cycles;
    config.fallback_wavelength = opts.wavelength.map(|w| w / METRES_TO_ANGSTROM);

    config.validate()?;
    Ok(config)
}

fn start_engine(opts: &RefineOptions) -> Result<Gsas2Bridge> {
    let spinner = progress::create_spinner("Starting GSAS-II engine...");
    let engine = Gsas2Bridge::new(EngineConfig {
        python: opts.python.clone(),
        gsas_path: opts.gsas_path.clone(),
    });
    spinner.finish_and_clear();
    engine
}

fn print_steps(records: &[StepRecord]) {
    if records.is_empty() {
        return;
    }
    let rows: Vec<StepRow> = records.iter().map(StepRow::from).collect();
    println!("{}", Table::new(&rows));
}

/// 按选项写出单个扫描的图表与 CSV
fn write_scan_outputs(
    opts: &RefineOptions,
    measurement: &Measurement,
    products: &RefinementProducts,
    dataset: &Path,
    quality: Option<FitQuality>,
) -> Result<()> {
    if opts.plot {
        let path = dataset.with_extension(opts.plot_format.extension());
        plot_refinement(
            measurement,
            products,
            &dataset_name(dataset),
            quality,
            &path,
            DEFAULT_SIZE,
        )?;
        output::print_success(&format!("Figure saved to '{}'", path.display()));
    }
    if opts.csv {
        let path = refined_csv_path(dataset);
        products_to_csv(products, &path)?;
        output::print_success(&format!("Curves saved to '{}'", path.display()));
    }
    Ok(())
}

fn dataset_name(dataset: &Path) -> String {
    dataset
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| dataset.display().to_string())
}

/// `<stem>_refined.csv`
fn refined_csv_path(dataset: &Path) -> PathBuf {
    let stem = dataset
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset".to_string());
    dataset.with_file_name(format!("{}_refined.csv", stem))
}

fn dump_tree(tree: &Node, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(tree)?;
    fs::write(path, content).map_err(|e| SuliError::write(path, e))?;
    output::print_success(&format!("Result tree written to '{}'", path.display()));
    Ok(())
}
