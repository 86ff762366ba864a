//! # 单扫描精修编排
//!
//! 一个数据集对应一个引擎项目。每个精修步骤遵循同一模式：
//!
//! ```text
//! 记录 Rwp → 开启参数组 → 精修 → 读取 Rwp → 关闭参数组 → 保存
//! ```
//!
//! ## 状态
//! `new` 完成后处于 `HasProject`，任意步骤后为 `Refined`，
//! `save_refinement` 之后为 `Saved`。
//!
//! ## 依赖关系
//! - 被 `commands/refine.rs` 使用
//! - 使用 `engine::RefinementEngine`, `refiner/ingest.rs`, `refiner/scratch.rs`

use crate::engine::{BroadeningModel, InstrumentParameter, ParameterGroup, RefinementEngine};
use crate::error::{Result, SuliError};
use crate::models::{Measurement, QRange, RefinementProducts};
use crate::refiner::config::RefinerConfig;
use crate::refiner::ingest::{IngestedScan, ScanPipeline, WavelengthSource};
use crate::refiner::scratch::{CleanupMode, ScratchDir};
use crate::refiner::{format_rwp, StepRecord};
use crate::results::{fit_quality, instrument_parameters, FitQuality, Node};
use crate::utils::output::{print_info, print_success, print_warning};
use crate::xrd::export::write_instprm;

use std::fs;
use std::path::{Path, PathBuf};

/// 编排器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinerState {
    HasProject,
    Refined,
    Saved,
}

/// 单扫描精修编排器
pub struct Refiner<E: RefinementEngine> {
    engine: E,
    config: RefinerConfig,
    scratch: ScratchDir,
    pipeline: ScanPipeline,
    range: QRange,
    scan: IngestedScan,
    state: RefinerState,
    history: Vec<StepRecord>,
}

impl<E: RefinementEngine> Refiner<E> {
    /// 摄取数据集并建立项目
    pub fn new(mut engine: E, config: RefinerConfig, dataset: &Path) -> Result<Self> {
        let scratch = ScratchDir::create(config.scratch_dir.as_deref(), &config.scratch_root)?;
        let instprm = scratch.stage_instprm(&config.instprm)?;

        let range = match config.q_range {
            Some(r) => r,
            None => Measurement::load(dataset)?.full_range()?,
        };
        let pipeline = ScanPipeline::new(config.background.clone(), config.arpls);
        let scan = pipeline.ingest(dataset, &range, config.fallback_wavelength_angstrom())?;
        if scan.wavelength_source == WavelengthSource::Fallback {
            print_warning(&format!(
                "{} has no wavelength; using {:.6} Å",
                dataset.display(),
                scan.wavelength
            ));
        }
        scan.write_engine_profile(&scratch.data_file())?;

        engine.create_project(&scratch.project_file())?;
        engine.set_max_cycles(config.max_cycles)?;
        let histogram = engine.add_histogram(&scratch.data_file(), &instprm, &[])?;
        for phase in &config.phases {
            engine.add_phase(phase, std::slice::from_ref(&histogram))?;
        }
        engine.save()?;

        if config.verbose {
            print_info(&format!(
                "Project created in {} (q range {}, {} points)",
                scratch.path().display(),
                range,
                scan.profile.len()
            ));
        }

        Ok(Refiner {
            engine,
            config,
            scratch,
            pipeline,
            range,
            scan,
            state: RefinerState::HasProject,
            history: Vec::new(),
        })
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

    /// 快照 → 开启 → 精修 → 读取 → 关闭 → 保存
    fn run_step(&mut self, label: String, enable: &ParameterGroup, disable: &ParameterGroup) -> Result<()> {
        let rwp_before = self.current_rwp();
        self.engine.set_refinement(enable, true)?;
        if let Err(e) = self.run_engine() {
            disable_after_failure(&mut self.engine, disable);
            return Err(e);
        }
        self.engine.set_refinement(disable, false)?;
        let quality = fit_quality(&self.engine.result_tree()?)?;
        self.engine.save()?;
        self.state = RefinerState::Refined;

        if self.config.verbose {
            print_success(&format!(
                "{} is refined: Rwp={:.3} (was {})",
                label,
                quality.rwp,
                format_rwp(rwp_before)
            ));
        }
        self.history.push(StepRecord {
            label,
            rwp_before,
            rwp_after: Some(quality.rwp),
            gof_after: Some(quality.gof),
        });
        Ok(())
    }

    /// LeBail 模式开关
    pub fn set_lebail(&mut self, enabled: bool) -> Result<()> {
        self.engine.set_lebail(enabled)?;
        self.engine.save()?;
        if self.config.verbose {
            print_info(&format!("LeBail is set to {}", enabled));
        }
        Ok(())
    }

    /// 精修背景（chebyschev-1，`coeffs` 个系数）
    pub fn refine_background(&mut self, coeffs: u32) -> Result<()> {
        let group = ParameterGroup::Background { coeffs };
        self.run_step("Background".to_string(), &group, &group)
    }

    /// 精修晶胞参数；`phase` 为 None 时同时精修所有物相
    pub fn refine_cell_params(&mut self, phase: Option<usize>) -> Result<()> {
        if let Some(i) = phase {
            if i >= self.config.phases.len() {
                return Err(SuliError::InvalidArgument(format!(
                    "phase #{} does not exist ({} phases registered)",
                    i,
                    self.config.phases.len()
                )));
            }
        }
        let label = match phase {
            None => "Cell parameters of all phases".to_string(),
            Some(i) => format!("Cell parameters of phase #{}", i),
        };
        self.run_step(
            label,
            &ParameterGroup::Cell { phase },
            &ParameterGroup::Cell { phase: None },
        )
    }

    /// 精修微应变展宽
    pub fn refine_strain_broadening(&mut self, model: BroadeningModel) -> Result<()> {
        let group = ParameterGroup::mustrain(model)?;
        self.run_step(format!("Strain broadening ({})", model), &group, &group)
    }

    /// 精修晶粒尺寸展宽
    pub fn refine_size_broadening(&mut self, model: BroadeningModel) -> Result<()> {
        let group = ParameterGroup::size(model)?;
        self.run_step(format!("Size broadening ({})", model), &group, &group)
    }

    /// 精修仪器参数；结束后关闭完整默认列表
    pub fn refine_inst_parameters(&mut self, parameters: &[InstrumentParameter]) -> Result<()> {
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
        )
    }

    /// 把精修结果写回内存中的数据集
    pub fn save_refinement(&mut self) -> Result<&RefinementProducts> {
        let histogram = self.engine.histogram_data(0)?;
        let mut products = self.scan.recover(&histogram)?;
        products.gsas_lst = read_engine_log(&self.scratch, self.config.verbose)?;

        self.state = RefinerState::Saved;
        let stored = self.scan.measurement.refinement.insert(products);
        Ok(&*stored)
    }

    /// 换用新数据集继续精修，沿用项目中已精修的参数
    ///
    /// 不重新注册直方图与物相，只替换项目中直方图的观测数据；
    /// 新数据集缺少波长时沿用上一个。
    pub fn set_new_data(&mut self, dataset: &Path) -> Result<()> {
        let previous = self.scan.wavelength;
        let scan = self.pipeline.ingest(dataset, &self.range, Some(previous))?;
        if scan.wavelength_source == WavelengthSource::Fallback && self.config.verbose {
            print_info("Note, wavelength not found; using previous wavelength");
        }
        scan.write_engine_profile(&self.scratch.data_file())?;
        self.engine.replace_histogram_data(0, &self.scratch.data_file())?;
        self.scan = scan;
        self.engine.save()?;
        self.state = RefinerState::HasProject;
        Ok(())
    }

    /// 原子替换磁盘上的数据集文件
    pub fn update_dataset_file(&self) -> Result<()> {
        self.scan.measurement.save_atomic(&self.scan.path)
    }

    /// 将项目文件复制到数据集旁，命名为 `<stem>.gpx`
    pub fn update_project_file(&self) -> Result<PathBuf> {
        copy_project_beside(&self.scratch.project_file(), &self.scan.path)
    }

    /// 写出精修后的仪器参数到 `<instprm>.new`
    pub fn export_instrument_parameters(&self) -> Result<PathBuf> {
        let params = instrument_parameters(&self.engine.result_tree()?, 0)?;
        let target = new_instprm_path(&self.config.instprm);
        write_instprm(&target, &params)?;
        Ok(target)
    }

    /// 清理临时目录
    pub fn cleanup(&self, mode: CleanupMode) -> Result<()> {
        self.scratch.cleanup(mode)
    }

    /// 当前整体拟合质量
    pub fn fit_quality(&self) -> Result<FitQuality> {
        fit_quality(&self.engine.result_tree()?)
    }

    /// (q, 观测, 计算峰, 总背景)；`save_refinement` 之前为 None
    pub fn y_vals(&self) -> Option<(Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>)> {
        self.scan.measurement.refinement.as_ref().map(|p| {
            (
                p.x_in_q.clone(),
                p.y_obs.clone(),
                p.y_calc.clone(),
                p.total_background(),
            )
        })
    }

    pub fn result_tree(&self) -> Result<Node> {
        self.engine.result_tree()
    }

    pub fn measurement(&self) -> &Measurement {
        &self.scan.measurement
    }

    pub fn scan(&self) -> &IngestedScan {
        &self.scan
    }

    pub fn q_range(&self) -> QRange {
        self.range
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    pub fn state(&self) -> RefinerState {
        self.state
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

/// 精修失败后关闭参数组；关闭失败只警告，保留原错误
pub(crate) fn disable_after_failure<E: RefinementEngine>(engine: &mut E, group: &ParameterGroup) {
    if let Err(e) = engine.set_refinement(group, false) {
        print_warning(&format!("Could not disable {} after a failed refinement: {}", group, e));
    }
}

/// 读取引擎日志；缺失时只警告
pub(crate) fn read_engine_log(scratch: &ScratchDir, verbose: bool) -> Result<Option<String>> {
    if !scratch.exists() {
        print_warning(&format!(
            "Directory does not exist: {}",
            scratch.path().display()
        ));
        return Ok(None);
    }
    if verbose {
        print_info(&format!("Directory exists: {}", scratch.path().display()));
    }
    let log = scratch.read_log()?;
    if log.is_none() {
        print_warning(&format!("File not found: {}", scratch.log_file().display()));
    }
    Ok(log)
}

/// `<instprm>.new`
pub(crate) fn new_instprm_path(instprm: &Path) -> PathBuf {
    let mut name = instprm.as_os_str().to_owned();
    name.push(".new");
    PathBuf::from(name)
}

/// 复制项目文件到 `<数据集 stem>.gpx`
pub(crate) fn copy_project_beside(project: &Path, dataset: &Path) -> Result<PathBuf> {
    let target = dataset.with_extension("gpx");
    fs::copy(project, &target).map_err(|e| SuliError::read(project, e))?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngine;
    use crate::models::PhaseSpec;
    use crate::refiner::ingest::tests::{write_dataset, write_dataset_with_peak};
    use crate::xrd::export::read_xy;

    const INSTPRM: &str = "#GSAS-II instrument parameter file; do not add/delete items!
Type:PXC
Bank:1.0
Lam:0.18
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

    fn setup(dir: &Path) -> (RefinerConfig, PathBuf) {
        let instprm = dir.join("beamline.instprm");
        std::fs::write(&instprm, INSTPRM).unwrap();
        let cif = dir.join("LaB6.cif");
        std::fs::write(&cif, "data_LaB6\n").unwrap();
        let dataset = write_dataset(dir, "scan_001.json", 400.0, Some(1.8e-11));
        let config = RefinerConfig::new(&instprm, vec![PhaseSpec::new(&cif, "LaB6", 1.0)])
            .with_scratch(None, Some(dir.join("scratch")));
        (config, dataset)
    }

    #[test]
    fn test_construction_registers_project() {
        let dir = tempfile::tempdir().unwrap();
        let (config, dataset) = setup(dir.path());
        let r = Refiner::new(FakeEngine::new(), config, &dataset).unwrap();

        assert_eq!(r.state(), RefinerState::HasProject);
        let e = r.engine();
        assert_eq!(e.max_cycles, Some(100));
        assert_eq!(e.histograms.len(), 1);
        assert_eq!(e.histograms[0].name, "PWDR data.xy");
        assert_eq!(e.histograms[0].phases, vec!["LaB6"]);
        assert_eq!(e.save_calls, 1);
        assert!(r.scratch().data_file().is_file());
        assert!(r.scratch().instprm_file().is_file());

        // 默认 q 范围为完整径向范围
        let full = r.measurement().full_range().unwrap();
        assert_eq!(r.q_range(), full);
    }

    #[test]
    fn test_step_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let (config, dataset) = setup(dir.path());
        let mut r = Refiner::new(FakeEngine::new(), config, &dataset).unwrap();

        r.refine_background(5).unwrap();
        let calls = &r.engine().calls;
        let tail: Vec<&str> = calls[calls.len() - 4..].iter().map(String::as_str).collect();
        assert_eq!(tail, vec!["enable background", "refine", "disable background", "save"]);
        assert!(r.engine().enabled.is_empty());
        assert_eq!(r.state(), RefinerState::Refined);

        r.refine_cell_params(None).unwrap();
        r.refine_strain_broadening(BroadeningModel::Isotropic).unwrap();
        r.refine_size_broadening(BroadeningModel::Ellipsoidal).unwrap();
        r.refine_inst_parameters(&[InstrumentParameter::U, InstrumentParameter::V]).unwrap();
        assert!(r.engine().enabled.is_empty());

        let h = r.history();
        assert_eq!(h.len(), 5);
        assert_eq!(h[0].rwp_before, None);
        assert_eq!(h[0].rwp_after, Some(20.0));
        assert_eq!(h[1].rwp_before, Some(20.0));
        assert_eq!(h[1].rwp_after, Some(10.0));
        assert!(h[4].label.contains("U, V"));
        assert_eq!(h[3].label, "Size broadening (ellipsoidal)");
        assert!(r.refine_cell_params(Some(3)).is_err());
        assert!(r.refine_strain_broadening(BroadeningModel::Ellipsoidal).is_err());
        assert_eq!(r.history().len(), 5);
    }

    #[test]
    fn test_save_refinement_and_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let (config, dataset) = setup(dir.path());
        let mut r = Refiner::new(FakeEngine::new(), config, &dataset).unwrap();
        r.set_lebail(true).unwrap();
        assert!(r.engine().lebail);
        r.refine_background(3).unwrap();

        let products = r.save_refinement().unwrap().clone();
        assert_eq!(r.state(), RefinerState::Saved);
        assert!(products.gsas_lst.as_deref().unwrap().contains("Refinement 1"));
        // data.xy 保留 4 位小数
        for d in products.difference() {
            assert!(d.abs() < 1e-3);
        }
        let (x, _, _, bkg) = r.y_vals().unwrap();
        assert_eq!(x.len(), bkg.len());

        r.update_dataset_file().unwrap();
        let reloaded = Measurement::load(&dataset).unwrap();
        assert!(reloaded.refinement.is_some());

        let gpx = r.update_project_file().unwrap();
        assert_eq!(gpx, dir.path().join("scan_001.gpx"));
        assert!(gpx.is_file());

        let new = r.export_instrument_parameters().unwrap();
        assert_eq!(new, dir.path().join("beamline.instprm.new"));
        let text = std::fs::read_to_string(&new).unwrap();
        assert!(text.contains("Lam:0.18\n"));

        r.cleanup(CleanupMode::Files).unwrap();
        assert!(!r.scratch().project_file().exists());
        assert!(r.scratch().instprm_file().exists());
        r.cleanup(CleanupMode::Tree).unwrap();
        assert!(!r.scratch().exists());
    }

    #[test]
    fn test_set_new_data_keeps_project() {
        let dir = tempfile::tempdir().unwrap();
        let (config, dataset) = setup(dir.path());
        let mut r = Refiner::new(FakeEngine::new(), config, &dataset).unwrap();
        r.refine_background(3).unwrap();

        let next = write_dataset(dir.path(), "scan_002.json", 800.0, None);
        let before = std::fs::read_to_string(r.scratch().data_file()).unwrap();
        r.set_new_data(&next).unwrap();
        let after = std::fs::read_to_string(r.scratch().data_file()).unwrap();

        assert_ne!(before, after);
        assert_eq!(r.engine().count("add_histogram PWDR data.xy"), 1);
        assert_eq!(r.engine().histograms.len(), 1);
        assert_eq!(r.scan().wavelength_source, WavelengthSource::Fallback);
        assert!((r.scan().wavelength - 0.18).abs() < 1e-12);
        assert!(r.measurement().refinement.is_none());
    }

    #[test]
    fn test_missing_log_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (config, dataset) = setup(dir.path());
        let mut r = Refiner::new(FakeEngine::new(), config, &dataset).unwrap();
        // 未精修时没有 gsas.lst
        let products = r.save_refinement().unwrap();
        assert!(products.gsas_lst.is_none());
    }

    #[test]
    fn test_engine_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let (config, dataset) = setup(dir.path());
        let engine = FakeEngine {
            fail_refine: true,
            ..FakeEngine::default()
        };
        let mut r = Refiner::new(engine, config, &dataset).unwrap();
        assert!(matches!(
            r.refine_background(3),
            Err(SuliError::EngineError { .. })
        ));
        // 失败的步骤不能让参数组保持开启
        assert!(r.engine().enabled.is_empty());
        assert_eq!(r.engine().count("disable background"), 1);
        assert!(r.history().is_empty());
    }

    #[test]
    fn test_set_new_data_refits_new_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let (config, dataset) = setup(dir.path());
        let mut r = Refiner::new(FakeEngine::new(), config, &dataset).unwrap();
        r.refine_background(3).unwrap();

        let moved = write_dataset_with_peak(dir.path(), "scan_moved.json", 400.0, 5.5, Some(1.8e-11));
        r.set_new_data(&moved).unwrap();
        r.refine_background(3).unwrap();
        let products = r.save_refinement().unwrap().clone();

        let (_, written) = read_xy(&r.scratch().data_file()).unwrap();
        let engine_yobs = &r.engine().histograms[0].yobs;
        assert_eq!(r.engine().histograms[0].replaced, 1);
        assert_eq!(engine_yobs.len(), written.len());
        for (a, b) in engine_yobs.iter().zip(&written) {
            assert!((a - b).abs() < 1e-9);
        }
        // 计算曲线跟随新数据集的峰位
        for d in products.difference() {
            assert!(d.abs() < 1e-3);
        }
    }

    #[test]
    fn test_new_instprm_path() {
        assert_eq!(
            new_instprm_path(Path::new("/a/gsas.instprm")),
            PathBuf::from("/a/gsas.instprm.new")
        );
    }
}
