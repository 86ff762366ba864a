//! # 内存精修引擎（测试用）
//!
//! 记录所有调用，在注册直方图时读入 `data.xy` 快照，
//! 精修时生成与引擎布局一致的结果树。
//!
//! - 计算强度等于观测强度，引擎背景恒为 `BASELINE_FLOOR`
//! - 第 k 次精修后 Rwp = 20 / k，GOF = 1 + 1 / k
//!
//! ## 依赖关系
//! - 被 `refiner/` 的测试使用
//! - 使用 `xrd/export.rs`, `parsers/instprm.rs`

use crate::engine::{HistogramData, ParameterGroup, RefinementEngine};
use crate::error::{Result, SuliError};
use crate::models::PhaseSpec;
use crate::parsers::instprm::parse_instprm_file;
use crate::results::{histogram_key, Node, INSTPRM_KEYS};
use crate::xrd::export::read_xy;
use crate::xrd::scaling::BASELINE_FLOOR;

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FakeHistogram {
    pub name: String,
    pub x: Vec<f64>,
    pub yobs: Vec<f64>,
    pub instprm: IndexMap<String, f64>,
    pub phases: Vec<String>,
    /// 替换观测数据的次数
    pub replaced: usize,
}

#[derive(Debug, Default)]
pub struct FakeEngine {
    pub project: Option<PathBuf>,
    pub max_cycles: Option<u32>,
    pub sequential: Option<(u32, bool)>,
    pub histograms: Vec<FakeHistogram>,
    pub phases: Vec<PhaseSpec>,
    pub enabled: IndexMap<&'static str, ParameterGroup>,
    /// 调用记录，如 `enable background`, `refine`, `save`
    pub calls: Vec<String>,
    pub lebail: bool,
    pub refine_calls: usize,
    pub save_calls: usize,
    pub fail_refine: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        FakeEngine::default()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| c.as_str() == call).count()
    }

    fn project(&self) -> Result<&Path> {
        self.project.as_deref().ok_or_else(|| SuliError::EngineError {
            operation: "project".to_string(),
            reason: "no project has been created".to_string(),
        })
    }

    fn rwp(&self) -> f64 {
        20.0 / self.refine_calls as f64
    }

    fn write_project(&self) -> Result<()> {
        let path = self.project()?;
        let content = format!(
            "fake project: {} histograms, {} phases, {} refinements\n",
            self.histograms.len(),
            self.phases.len(),
            self.refine_calls
        );
        fs::write(path, content).map_err(|e| SuliError::write(path, e))
    }
}

impl RefinementEngine for FakeEngine {
    fn create_project(&mut self, project: &Path) -> Result<()> {
        self.project = Some(project.to_path_buf());
        self.calls.push("create".to_string());
        self.write_project()
    }

    fn set_max_cycles(&mut self, cycles: u32) -> Result<()> {
        self.max_cycles = Some(cycles);
        self.calls.push(format!("max_cycles {}", cycles));
        Ok(())
    }

    fn add_histogram(&mut self, data: &Path, instprm: &Path, link_phases: &[String]) -> Result<String> {
        self.project()?;
        let (x, yobs) = read_xy(data)?;
        let block = parse_instprm_file(instprm)?
            .into_iter()
            .next()
            .unwrap_or_default();
        let mut params = IndexMap::new();
        for key in INSTPRM_KEYS {
            params.insert(key.to_string(), block.get_f64(key).unwrap_or(0.0));
        }

        let name = histogram_key(self.histograms.len());
        self.histograms.push(FakeHistogram {
            name: name.clone(),
            x,
            yobs,
            instprm: params,
            phases: link_phases.to_vec(),
            replaced: 0,
        });
        self.calls.push(format!("add_histogram {}", name));
        Ok(name)
    }

    fn replace_histogram_data(&mut self, index: usize, data: &Path) -> Result<()> {
        self.project()?;
        let (x, yobs) = read_xy(data)?;
        let hist = self.histograms.get_mut(index).ok_or_else(|| SuliError::EngineError {
            operation: "replace_histogram_data".to_string(),
            reason: format!("no histogram #{}", index),
        })?;
        hist.x = x;
        hist.yobs = yobs;
        hist.replaced += 1;
        self.calls.push(format!("replace_histogram {}", hist.name));
        Ok(())
    }

    fn clear_frozen(&mut self, histogram: &str) -> Result<()> {
        self.project()?;
        self.calls.push(format!("clear_frozen {}", histogram));
        Ok(())
    }

    fn add_phase(&mut self, phase: &PhaseSpec, link_histograms: &[String]) -> Result<String> {
        self.project()?;
        for hist in self.histograms.iter_mut() {
            if link_histograms.contains(&hist.name) {
                hist.phases.push(phase.name.clone());
            }
        }
        self.phases.push(phase.clone());
        self.calls.push(format!("add_phase {}", phase.name));
        Ok(phase.name.clone())
    }

    fn configure_sequential(&mut self, cycles: u32, copy_forward: bool) -> Result<()> {
        self.sequential = Some((cycles, copy_forward));
        self.calls.push("sequential".to_string());
        Ok(())
    }

    fn set_refinement(&mut self, group: &ParameterGroup, enable: bool) -> Result<()> {
        if enable {
            self.enabled.insert(group.kind(), group.clone());
            self.calls.push(format!("enable {}", group.kind()));
        } else {
            self.enabled.shift_remove(group.kind());
            self.calls.push(format!("disable {}", group.kind()));
        }
        Ok(())
    }

    fn set_lebail(&mut self, enabled: bool) -> Result<()> {
        self.lebail = enabled;
        self.calls.push(format!("lebail {}", enabled));
        Ok(())
    }

    fn refine(&mut self) -> Result<String> {
        let project = self.project()?.to_path_buf();
        if self.fail_refine {
            return Err(SuliError::EngineError {
                operation: "refine".to_string(),
                reason: "singular matrix".to_string(),
            });
        }
        self.refine_calls += 1;
        let kinds: Vec<&str> = self.enabled.keys().copied().collect();
        self.calls.push("refine".to_string());

        let log = format!(
            "Refinement {} with [{}]: Rwp = {:.3}\n",
            self.refine_calls,
            kinds.join(", "),
            self.rwp()
        );
        let lst = project.with_extension("lst");
        fs::write(&lst, &log).map_err(|e| SuliError::write(&lst, e))?;
        Ok(log)
    }

    fn histogram_data(&self, index: usize) -> Result<HistogramData> {
        let hist = self.histograms.get(index).ok_or_else(|| SuliError::EngineError {
            operation: "histogram_data".to_string(),
            reason: format!("no histogram #{}", index),
        })?;
        Ok(HistogramData {
            x: hist.x.clone(),
            yobs: hist.yobs.clone(),
            ycalc: hist.yobs.clone(),
            background: vec![BASELINE_FLOOR; hist.x.len()],
        })
    }

    fn result_tree(&self) -> Result<Node> {
        let project = self.project()?;
        let mut root = Map::new();
        root.insert(
            "Controls".to_string(),
            json!({"data": {
                "max cyc": self.max_cycles,
                "LastSavedAs": project.display().to_string(),
            }}),
        );

        if self.refine_calls > 0 {
            let vary: Vec<&str> = self.enabled.keys().copied().collect();
            let n = vary.len();
            let cov: Vec<Vec<f64>> = (0..n)
                .map(|i| (0..n).map(|j| if i == j { 0.01 } else { 0.005 }).collect())
                .collect();
            root.insert(
                "Covariance".to_string(),
                json!({"data": {
                    "Rvals": {"Rwp": self.rwp(), "GOF": 1.0 + 1.0 / self.refine_calls as f64},
                    "varyList": vary,
                    "sig": vec![0.1; n],
                    "covMatrix": cov,
                }}),
            );

            if self.sequential.is_some() {
                let mut seq = Map::new();
                for (i, hist) in self.histograms.iter().enumerate() {
                    seq.insert(
                        hist.name.clone(),
                        json!({"Rvals": {"Rwp": self.rwp() + i as f64, "GOF": 1.0 + 0.1 * i as f64}}),
                    );
                }
                root.insert("Sequential results".to_string(), json!({ "data": seq }));
            }
        }

        let mut phases = Map::new();
        phases.insert("data".to_string(), Value::Null);
        let cell_on = self.enabled.contains_key("cell");
        for (i, phase) in self.phases.iter().enumerate() {
            let a = 4.0 + i as f64;
            phases.insert(
                phase.name.clone(),
                json!({"General": {"Cell": [cell_on, a, a, a, 90.0, 90.0, 90.0, a * a * a]}}),
            );
        }
        root.insert("Phases".to_string(), Value::Object(phases));

        for hist in &self.histograms {
            let mut params = Map::new();
            params.insert("Type".to_string(), json!(["PXC", "PXC", false]));
            for (key, value) in &hist.instprm {
                params.insert(key.clone(), json!([value, value, false]));
            }
            root.insert(
                hist.name.clone(),
                json!({"Instrument Parameters": [Value::Object(params), {}]}),
            );
        }

        Ok(Node::from(Value::Object(root)))
    }

    fn save(&mut self) -> Result<()> {
        self.save_calls += 1;
        self.calls.push("save".to_string());
        self.write_project()
    }
}
