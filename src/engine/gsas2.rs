//! # GSAS-II 引擎桥接
//!
//! 每次调用启动一个 Python 进程运行内嵌的辅助脚本，
//! 通过 stdin 传入一个 JSON 请求，从 stdout 读取一个 JSON 响应。
//! 项目状态完全保存在 `.gpx` 文件中，每个修改操作结束时都会保存。
//!
//! ## 协议
//! - 请求: `{"op", "project", "gsas_path", "args"}`
//! - 响应: `{"ok", "result", "log", "error", "missing"}`
//!
//! ## 错误映射
//! - 解释器无法启动 → `CommandNotFound`
//! - GSAS-II 无法导入 → `EngineUnavailable`（构造时检查）
//! - 其他失败 → `EngineError`
//!
//! ## 依赖关系
//! - 被 `commands/refine.rs` 使用
//! - 实现 `engine::RefinementEngine`
//! - 使用 `serde_json`, `tempfile`

use crate::engine::{HistogramData, ParameterGroup, RefinementEngine};
use crate::error::{Result, SuliError};
use crate::models::PhaseSpec;
use crate::results::Node;

use serde::Deserialize;
use serde_json::{json, Value};

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// 内嵌的 Python 辅助脚本
const BRIDGE_SCRIPT: &str = include_str!("../../scripts/gsas2_bridge.py");

/// 引擎配置
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Python 解释器
    pub python: String,
    /// GSAS-II 安装目录（加入 sys.path）
    pub gsas_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            python: "python3".to_string(),
            gsas_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BridgeResponse {
    ok: bool,
    result: Value,
    log: String,
    error: Option<String>,
    missing: bool,
}

/// GSAS-II 桥接引擎
pub struct Gsas2Bridge {
    config: EngineConfig,
    script: tempfile::NamedTempFile,
    project: Option<PathBuf>,
}

impl Gsas2Bridge {
    /// 写出辅助脚本并确认 GSAS-II 可用
    pub fn new(config: EngineConfig) -> Result<Self> {
        let mut script = tempfile::Builder::new()
            .prefix("suli-gsas2-bridge-")
            .suffix(".py")
            .tempfile()
            .map_err(|e| SuliError::Other(format!("cannot create bridge script: {}", e)))?;
        script
            .write_all(BRIDGE_SCRIPT.as_bytes())
            .map_err(|e| SuliError::write(script.path(), e))?;

        let bridge = Gsas2Bridge {
            config,
            script,
            project: None,
        };

        match bridge.call("ping", json!({})) {
            Ok(_) => Ok(bridge),
            Err(SuliError::EngineError { reason, .. }) => Err(SuliError::EngineUnavailable {
                interpreter: bridge.config.python.clone(),
                reason,
            }),
            Err(e) => Err(e),
        }
    }

    fn project(&self) -> Result<&Path> {
        self.project.as_deref().ok_or_else(|| SuliError::EngineError {
            operation: "project".to_string(),
            reason: "no project has been created".to_string(),
        })
    }

    /// 执行一次请求，返回 (result, log)
    fn call_with_log(&self, op: &str, args: Value) -> Result<(Value, String)> {
        let request = json!({
            "op": op,
            "project": self.project.as_ref().map(|p| p.display().to_string()),
            "gsas_path": self.config.gsas_path.as_ref().map(|p| p.display().to_string()),
            "args": args,
        });

        let mut child = Command::new(&self.config.python)
            .arg(self.script.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|_| SuliError::CommandNotFound {
                command: self.config.python.clone(),
            })?;

        if let Some(ref mut stdin) = child.stdin {
            stdin
                .write_all(request.to_string().as_bytes())
                .map_err(|e| SuliError::CommandFailed {
                    command: format!("{} <bridge:{}>", self.config.python, op),
                    stderr: e.to_string(),
                })?;
        }
        // 关闭 stdin，脚本才能读到 EOF
        drop(child.stdin.take());

        let output = child
            .wait_with_output()
            .map_err(|e| SuliError::CommandFailed {
                command: format!("{} <bridge:{}>", self.config.python, op),
                stderr: e.to_string(),
            })?;

        let response: BridgeResponse =
            serde_json::from_slice(&output.stdout).map_err(|_| SuliError::CommandFailed {
                command: format!("{} <bridge:{}>", self.config.python, op),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })?;

        if response.ok {
            return Ok((response.result, response.log));
        }

        let reason = response
            .error
            .unwrap_or_else(|| "unknown failure".to_string());
        if response.missing {
            Err(SuliError::EngineUnavailable {
                interpreter: self.config.python.clone(),
                reason,
            })
        } else {
            Err(SuliError::EngineError {
                operation: op.to_string(),
                reason,
            })
        }
    }

    fn call(&self, op: &str, args: Value) -> Result<Value> {
        self.call_with_log(op, args).map(|(result, _)| result)
    }

    fn expect_name(op: &str, value: Value) -> Result<String> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(SuliError::EngineError {
                operation: op.to_string(),
                reason: format!("expected a name, got {}", other),
            }),
        }
    }
}

impl RefinementEngine for Gsas2Bridge {
    fn create_project(&mut self, project: &Path) -> Result<()> {
        self.project = Some(project.to_path_buf());
        self.call("create", json!({})).map(|_| ())
    }

    fn set_max_cycles(&mut self, cycles: u32) -> Result<()> {
        self.project()?;
        self.call("set_controls", json!({ "max_cycles": cycles }))
            .map(|_| ())
    }

    fn add_histogram(&mut self, data: &Path, instprm: &Path, link_phases: &[String]) -> Result<String> {
        self.project()?;
        let result = self.call(
            "add_histogram",
            json!({
                "data": data.display().to_string(),
                "instprm": instprm.display().to_string(),
                "phases": link_phases,
            }),
        )?;
        Self::expect_name("add_histogram", result)
    }

    fn replace_histogram_data(&mut self, index: usize, data: &Path) -> Result<()> {
        self.project()?;
        self.call(
            "replace_histogram",
            json!({ "index": index, "data": data.display().to_string() }),
        )
        .map(|_| ())
    }

    fn clear_frozen(&mut self, histogram: &str) -> Result<()> {
        self.project()?;
        self.call("clear_frozen", json!({ "histogram": histogram }))
            .map(|_| ())
    }

    fn add_phase(&mut self, phase: &PhaseSpec, link_histograms: &[String]) -> Result<String> {
        self.project()?;
        let result = self.call(
            "add_phase",
            json!({
                "cif": phase.cif_path.display().to_string(),
                "name": phase.name,
                "scale": phase.scale,
                "histograms": link_histograms,
            }),
        )?;
        Self::expect_name("add_phase", result)
    }

    fn configure_sequential(&mut self, cycles: u32, copy_forward: bool) -> Result<()> {
        self.project()?;
        self.call(
            "set_controls",
            json!({ "sequential": true, "cycles": cycles, "copy_forward": copy_forward }),
        )
        .map(|_| ())
    }

    fn set_refinement(&mut self, group: &ParameterGroup, enable: bool) -> Result<()> {
        self.project()?;
        self.call("set_refinement", json!({ "group": group, "enable": enable }))
            .map(|_| ())
    }

    fn set_lebail(&mut self, enabled: bool) -> Result<()> {
        self.project()?;
        self.call("set_lebail", json!({ "enabled": enabled }))
            .map(|_| ())
    }

    fn refine(&mut self) -> Result<String> {
        self.project()?;
        self.call_with_log("refine", json!({})).map(|(_, log)| log)
    }

    fn histogram_data(&self, index: usize) -> Result<HistogramData> {
        self.project()?;
        let value = self.call("histogram_data", json!({ "index": index }))?;
        serde_json::from_value(value).map_err(|e| SuliError::EngineError {
            operation: "histogram_data".to_string(),
            reason: e.to_string(),
        })
    }

    fn result_tree(&self) -> Result<Node> {
        self.project()?;
        let value = self.call("tree", json!({}))?;
        Ok(Node::from(value))
    }

    fn save(&mut self) -> Result<()> {
        self.project()?;
        self.call("save", json!({})).map(|_| ())
    }
}
