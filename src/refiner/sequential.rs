//! # 顺序精修编排
//!
//! 多个数据集共用一个引擎项目：先注册物相，再为每个数据集注册一个
//! 直方图（关联所有物相），最后开启顺序精修控制（参数向后传递）。
//!
//! ## 与单扫描的差异
//! - 每个扫描独立拟合强度缓冲参数
//! - 所有扫描使用同一波长（首个数据集，或备用值）
//! - 步骤作用于所有直方图/物相，`set_to_false` 决定步骤后是否关闭参数组
//! - 晶胞精修使用物相-直方图的 `HStrain`
//!
//! ## 依赖关系
//! - 被 `commands/refine.rs` 使用
//! - 使用 `engine::RefinementEngine`, `refiner/ingest.rs`, `utils/progress.rs`

use crate::engine::{BroadeningModel, InstrumentParameter, ParameterGroup, RefinementEngine};
use crate::error::{Result, SuliError};
use crate::models::{Measurement, QRange};
use crate::refiner::config::RefinerConfig;
use crate::refiner::ingest::{IngestedScan, ScanPipeline, WavelengthSource};
use crate::refiner::scratch::{CleanupMode, ScratchDir};
use crate::refiner::single::{
    copy_project_beside, disable_after_failure, new_instprm_path, read_engine_log,
};
use crate::refiner::{format_rwp, StepRecord};
use crate::results::{
    fit_quality, instrument_parameters, sequential_fit_quality, FitQuality, Node,
};
use crate::utils::output::{print_info, print_success, print_warning};
use crate::utils::progress::create_progress_bar;
use crate::xrd::export::write_instprm_blocks;
use crate::xrd::units::METRES_TO_ANGSTROM;

use std::path::{Path, PathBuf};

/// 顺序精修编排器
pub struct SeqRefiner<E: RefinementEngine> {
    engine: E,
    config: RefinerConfig,
    scratch: ScratchDir,
    range: QRange,
    /// 共用波长（Å）
    wavelength: f64,
    scans: Vec<IngestedScan>,
    histograms: Vec<String>,
    history: Vec<StepRecord>,
    /// 配方步骤结束后是否关闭参数组
    set_to_false: bool,
}

impl<E: RefinementEngine> SeqRefiner<E> {
    /// 摄取所有数据集并建立共享项目
    pub fn new(mut engine: E, config: RefinerConfig, datasets: &[PathBuf]) -> Result<Self> {
        let first = datasets.first().ok_or_else(|| {
            SuliError::InvalidArgument("sequential refinement needs at least one dataset".to_string())
        })?;

        let scratch = ScratchDir::create(config.scratch_dir.as_deref(), &config.scratch_root)?;
        let instprm = scratch.stage_instprm(&config.instprm)?;

        let head = Measurement::load(first)?;
        let range = match config.q_range {
            Some(r) => r,
            None => head.full_range()?,
        };
        let wavelength = match head.wavelength_angstrom() {
            Some(w) => w,
            None => {
                print_warning("No wavelength present in the first dataset.");
                config
                    .fallback_wavelength_angstrom()
                    .ok_or_else(|| SuliError::MissingWavelength {
                        path: first.display().to_string(),
                    })?
            }
        };

        engine.create_project(&scratch.project_file())?;
        let mut phase_names = Vec::with_capacity(config.phases.len());
        for phase in &config.phases {
            phase_names.push(engine.add_phase(phase, &[])?);
        }

        let pipeline = ScanPipeline::new(config.background.clone(), config.arpls);
        let pb = create_progress_bar(datasets.len() as u64, "Ingesting datasets");
        let mut scans = Vec::with_capacity(datasets.len());
        let mut histograms = Vec::with_capacity(datasets.len());

        for (i, path) in datasets.iter().enumerate() {
            if config.verbose {
                pb.println(format!("Saving file {} to project", i));
            }
            let mut measurement = Measurement::load(path)?;
            measurement.clear_derived();
            if measurement.wavelength_m().is_none() {
                measurement.set_wavelength_m(wavelength / METRES_TO_ANGSTROM);
            }

            let scan = pipeline.ingest_measurement(
                path,
                measurement,
                &range,
                wavelength,
                WavelengthSource::Shared,
            )?;
            scan.write_engine_profile(&scratch.data_file())?;
            let histogram = engine.add_histogram(&scratch.data_file(), &instprm, &phase_names)?;
            engine.clear_frozen(&histogram)?;
            histograms.push(histogram);
            scans.push(scan);
            pb.inc(1);
        }
        pb.finish_and_clear();

        engine.configure_sequential(config.max_cycles, true)?;
        engine.save()?;

        if config.verbose {
            print_info(&format!(
                "Sequential project created in {} ({} histograms, q range {})",
                scratch.path().display(),
                histograms.len(),
                range
            ));
        }

        Ok(SeqRefiner {
            engine,
            config,
            scratch,
            range,
            wavelength,
            scans,
            histograms,
            history: Vec::new(),
            set_to_false: true,
        })
    }

    /// 配方步骤是否在结束后关闭参数组（默认 true）
    pub fn set_steps_isolated(&mut self, set_to_false: bool) {
        self.set_to_false = set_to_false;
    }

    pub fn steps_isolated(&self) -> bool {
        self.set_to_false
    }

    fn current_rwp(&self) -> Option<f64> {
        self.engine
            .result_tree()
            .ok()
            .and_then(|tree| fit_quality(&tree).ok())
            .map(|q| q.rwp)
    }

    fn run_engine(&mut self) -> Result<()> {
        let log = self.engine.refine()?;
        if self.config.verbose && !log.is_empty() {
            print!("{}", log);
        }
        Ok(())
    }

    fn run_step(
        &mut self,
        label: String,
        enable: &ParameterGroup,
        disable: &ParameterGroup,
        set_to_false: bool,
    ) -> Result<()> {
        let rwp_before = self.current_rwp();
        self.engine.set_refinement(enable, true)?;
        if let Err(e) = self.run_engine() {
            if set_to_false {
                disable_after_failure(&mut self.engine, disable);
            }
            return Err(e);
        }
        let quality = fit_quality(&self.engine.result_tree()?).ok();
        if set_to_false {
            self.engine.set_refinement(disable, false)?;
        }
        self.engine.save()?;

        let rwp_after = quality.map(|q| q.rwp);
        if self.config.verbose {
            print_success(&format!(
                "{} is refined: Rwp={} (was {})",
                label,
                format_rwp(rwp_after),
                format_rwp(rwp_before)
            ));
        }
        self.history.push(StepRecord {
            label,
            rwp_before,
            rwp_after,
            gof_after: quality.map(|q| q.gof),
        });
        Ok(())
    }

    /// LeBail 模式开关，并立即精修一次
    pub fn set_lebail(&mut self, enabled: bool) -> Result<()> {
        self.engine.set_lebail(enabled)?;
        self.run_engine()?;
        self.engine.save()?;
        if self.config.verbose {
            print_info(&format!("LeBail is set to {}", enabled));
        }
        Ok(())
    }

    pub fn refine_background(&mut self, coeffs: u32, set_to_false: bool) -> Result<()> {
        let group = ParameterGroup::Background { coeffs };
        self.run_step("Background".to_string(), &group, &group, set_to_false)
    }

    /// 晶胞精修（HStrain）
    pub fn refine_cell_params(&mut self, set_to_false: bool) -> Result<()> {
        let group = ParameterGroup::HStrain;
        self.run_step("Cell parameters (HStrain)".to_string(), &group, &group, set_to_false)
    }

    pub fn refine_strain_broadening(
        &mut self,
        model: BroadeningModel,
        set_to_false: bool,
    ) -> Result<()> {
        let group = ParameterGroup::mustrain(model)?;
        let label = format!("Strain broadening ({})", model);
        self.run_step(label, &group, &group, set_to_false)
    }

    pub fn refine_size_broadening(
        &mut self,
        model: BroadeningModel,
        set_to_false: bool,
    ) -> Result<()> {
        let group = ParameterGroup::size(model)?;
        let label = format!("Size broadening ({})", model);
        self.run_step(label, &group, &group, set_to_false)
    }

    pub fn refine_inst_parameters(
        &mut self,
        parameters: &[InstrumentParameter],
        set_to_false: bool,
    ) -> Result<()> {
        let parameters = if parameters.is_empty() {
            InstrumentParameter::DEFAULT.to_vec()
        } else {
            parameters.to_vec()
        };
        let names: Vec<&str> = parameters.iter().map(|p| p.name()).collect();
        let label = format!("Instrument parameters [{}]", names.join(", "));
        self.run_step(
            label,
            &ParameterGroup::Instrument { parameters },
            &ParameterGroup::Instrument {
                parameters: InstrumentParameter::DEFAULT.to_vec(),
            },
            set_to_false,
        )
    }

    /// 第 `index` 个扫描的 (Rwp, GoF)
    pub fn ref_scores(&self, index: usize) -> Result<FitQuality> {
        self.check_index(index)?;
        sequential_fit_quality(&self.engine.result_tree()?, index)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.scans.len() {
            return Err(SuliError::InvalidArgument(format!(
                "scan index {} out of range ({} datasets)",
                index,
                self.scans.len()
            )));
        }
        Ok(())
    }

    /// 把每个直方图的结果写回对应数据集
    pub fn save_refinement(&mut self) -> Result<()> {
        let log = read_engine_log(&self.scratch, self.config.verbose)?;
        for (i, scan) in self.scans.iter_mut().enumerate() {
            let histogram = self.engine.histogram_data(i)?;
            let mut products = scan.recover(&histogram)?;
            products.gsas_lst = log.clone();
            scan.measurement.refinement = Some(products);
        }
        Ok(())
    }

    /// 原子替换所有数据集文件
    pub fn update_dataset_files(&self) -> Result<()> {
        for scan in &self.scans {
            scan.measurement.save_atomic(&scan.path)?;
        }
        Ok(())
    }

    /// 将共享项目复制到每个数据集旁
    pub fn update_project_files(&self) -> Result<Vec<PathBuf>> {
        self.scans
            .iter()
            .map(|scan| copy_project_beside(&self.scratch.project_file(), &scan.path))
            .collect()
    }

    /// 每个直方图一个参数块，写到 `<instprm>.new`
    pub fn export_instrument_parameters(&self) -> Result<PathBuf> {
        let tree = self.engine.result_tree()?;
        let blocks = (0..self.histograms.len())
            .map(|i| instrument_parameters(&tree, i))
            .collect::<Result<Vec<_>>>()?;
        let target = new_instprm_path(&self.config.instprm);
        write_instprm_blocks(&target, &blocks)?;
        Ok(target)
    }

    pub fn cleanup(&self, mode: CleanupMode) -> Result<()> {
        self.scratch.cleanup(mode)
    }

    /// 第 `index` 个扫描的 (q, 观测, 计算峰, 总背景)
    pub fn y_vals(&self, index: usize) -> Result<Option<(Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>)>> {
        self.check_index(index)?;
        Ok(self.scans[index].measurement.refinement.as_ref().map(|p| {
            (
                p.x_in_q.clone(),
                p.y_obs.clone(),
                p.y_calc.clone(),
                p.total_background(),
            )
        }))
    }

    pub fn result_tree(&self) -> Result<Node> {
        self.engine.result_tree()
    }

    pub fn scans(&self) -> &[IngestedScan] {
        &self.scans
    }

    pub fn histograms(&self) -> &[String] {
        &self.histograms
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    pub fn q_range(&self) -> QRange {
        self.range
    }

    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn dataset(&self, index: usize) -> Option<&Path> {
        self.scans.get(index).map(|s| s.path.as_path())
    }
}
