//! # 精修临时目录
//!
//! 每个编排器独占一个临时目录，存放引擎输入与项目文件：
//!
//! ```text
//! .gsas2_scratch/
//! └── 1718035200.42_Xk3P9aQ.tmp/
//!     ├── data.xy        引擎谱线
//!     ├── gsas.instprm   仪器参数副本
//!     ├── gsas.gpx       项目
//!     └── gsas.lst       引擎诊断日志
//! ```
//!
//! ## 依赖关系
//! - 被 `refiner/single.rs`, `refiner/sequential.rs` 使用
//! - 使用 `tempfile` 生成随机目录名

use crate::error::{Result, SuliError};

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

pub const DATA_FILE: &str = "data.xy";
pub const PROJECT_FILE: &str = "gsas.gpx";
pub const LOG_FILE: &str = "gsas.lst";
pub const INSTPRM_FILE: &str = "gsas.instprm";

/// 随机后缀长度
const RANDOM_CHARS: usize = 7;

/// 清理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
    /// 删除除 `gsas.instprm` 外的所有普通文件
    Files,
    /// 删除整个目录
    Tree,
}

impl FromStr for CleanupMode {
    type Err = SuliError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" | "files" => Ok(CleanupMode::Files),
            "tree" => Ok(CleanupMode::Tree),
            other => Err(SuliError::InvalidArgument(format!(
                "unknown cleanup mode '{}' (expected 'files' or 'tree')",
                other
            ))),
        }
    }
}

/// 临时目录
#[derive(Debug, Clone)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// 使用指定目录，或在 `root` 下创建 `<unix 时间>_<7 个随机字符>.tmp`
    pub fn create(explicit: Option<&Path>, root: &Path) -> Result<Self> {
        if let Some(dir) = explicit {
            fs::create_dir_all(dir).map_err(|e| SuliError::write(dir, e))?;
            return Ok(ScratchDir {
                path: dir.to_path_buf(),
            });
        }

        fs::create_dir_all(root).map_err(|e| SuliError::write(root, e))?;
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let dir = tempfile::Builder::new()
            .prefix(&format!("{:.2}_", secs))
            .suffix(".tmp")
            .rand_bytes(RANDOM_CHARS)
            .tempdir_in(root)
            .map_err(|e| SuliError::write(root, e))?;

        Ok(ScratchDir {
            path: dir.into_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    pub fn data_file(&self) -> PathBuf {
        self.path.join(DATA_FILE)
    }

    pub fn project_file(&self) -> PathBuf {
        self.path.join(PROJECT_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    pub fn instprm_file(&self) -> PathBuf {
        self.path.join(INSTPRM_FILE)
    }

    /// 将仪器参数文件复制为 `gsas.instprm`
    pub fn stage_instprm(&self, source: &Path) -> Result<PathBuf> {
        let target = self.instprm_file();
        if source != target {
            fs::copy(source, &target).map_err(|e| SuliError::read(source, e))?;
        }
        Ok(target)
    }

    /// 读取引擎日志；目录或文件缺失时返回 None
    pub fn read_log(&self) -> Result<Option<String>> {
        let log = self.log_file();
        if !log.is_file() {
            return Ok(None);
        }
        fs::read_to_string(&log)
            .map(Some)
            .map_err(|e| SuliError::read(&log, e))
    }

    /// 清理临时目录
    pub fn cleanup(&self, mode: CleanupMode) -> Result<()> {
        if !self.exists() {
            return Ok(());
        }
        match mode {
            CleanupMode::Tree => {
                fs::remove_dir_all(&self.path).map_err(|e| SuliError::write(&self.path, e))
            }
            CleanupMode::Files => {
                let entries = fs::read_dir(&self.path).map_err(|e| SuliError::read(&self.path, e))?;
                for entry in entries.filter_map(|e| e.ok()) {
                    let path = entry.path();
                    if path.is_file() && entry.file_name() != INSTPRM_FILE {
                        fs::remove_file(&path).map_err(|e| SuliError::write(&path, e))?;
                    }
                }
                Ok(())
            }
        }
    }
}
