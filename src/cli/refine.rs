//! # refine / refine-seq 子命令 CLI 定义
//!
//! 两个子命令共用 `RefineOptions`：输入文件、配方、临时目录、
//! 引擎位置和输出选项。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/refine.rs`

use crate::batch::collector::DEFAULT_PATTERN;
use crate::refiner::config::{DEFAULT_MAX_CYCLES, DEFAULT_SCRATCH_ROOT};
use crate::refiner::recipe::DEFAULT_RECIPE;
use crate::refiner::CleanupMode;

use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// 临时目录清理方式
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum CleanupArg {
    /// Remove scratch files but keep the staged instrument parameters
    Files,
    /// Remove the whole scratch directory
    Tree,
}

impl From<CleanupArg> for CleanupMode {
    fn from(arg: CleanupArg) -> Self {
        match arg {
            CleanupArg::Files => CleanupMode::Files,
            CleanupArg::Tree => CleanupMode::Tree,
        }
    }
}

/// 图像格式
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum PlotFormat {
    Png,
    Svg,
}

impl PlotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PlotFormat::Png => "png",
            PlotFormat::Svg => "svg",
        }
    }
}

/// 精修共用参数
#[derive(Args, Debug)]
pub struct RefineOptions {
    /// GSAS-II instrument parameter file (.instprm)
    #[arg(short, long)]
    pub instprm: PathBuf,

    /// Phase as path.cif:Name[:scale] (repeatable)
    #[arg(short, long = "phase", required = true, num_args = 1..)]
    pub phases: Vec<String>,

    /// Refinement recipe: lebail, nolebail, background[:N], cell[:i], strain[:model], size[:model], inst[:U+V+W]
    #[arg(short, long, default_value = DEFAULT_RECIPE)]
    pub steps: String,

    /// Radial window in q (1/Å), e.g. '1.2-9.5'; default is the full range
    #[arg(short, long)]
    pub q_range: Option<String>,

    /// Anchor background (dataset or two-column q/intensity file)
    #[arg(short, long)]
    pub background: Option<PathBuf>,

    /// arPLS smoothness parameter
    #[arg(long, default_value_t = 1e5)]
    pub lam: f64,

    /// Maximum least-squares cycles per refinement
    #[arg(long, default_value_t = DEFAULT_MAX_CYCLES)]
    pub max_cycles: u32,

    /// Fallback wavelength in Å for datasets without one
    #[arg(short, long)]
    pub wavelength: Option<f64>,

    /// Scratch directory (default: random directory under --scratch-root)
    #[arg(long)]
    pub scratch: Option<PathBuf>,

    /// Root for randomly named scratch directories
    #[arg(long, default_value = DEFAULT_SCRATCH_ROOT)]
    pub scratch_root: PathBuf,

    /// Python interpreter with GSAS-II available
    #[arg(long, env = "SULI_PYTHON", default_value = "python3")]
    pub python: String,

    /// GSAS-II installation directory (added to the Python path)
    #[arg(long, env = "GSASII_PATH")]
    pub gsas_path: Option<PathBuf>,

    /// Save a refinement figure next to each dataset
    #[arg(long, default_value_t = false)]
    pub plot: bool,

    /// Figure format for --plot
    #[arg(long, value_enum, default_value_t = PlotFormat::Png)]
    pub plot_format: PlotFormat,

    /// Export refined curves as <stem>_refined.csv next to each dataset
    #[arg(long, default_value_t = false)]
    pub csv: bool,

    /// Write refinement products back into the dataset files
    #[arg(long, default_value_t = false)]
    pub update_dataset: bool,

    /// Copy the project file next to each dataset as <stem>.gpx
    #[arg(long, default_value_t = false)]
    pub update_gpx: bool,

    /// Write refined instrument parameters to <instprm>.new
    #[arg(long, default_value_t = false)]
    pub export_instprm: bool,

    /// Dump the final result tree as JSON
    #[arg(long)]
    pub dump_tree: Option<PathBuf>,

    /// Clean up the scratch directory when done
    #[arg(long, value_enum)]
    pub cleanup: Option<CleanupArg>,

    /// Print engine output and step details
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// refine 子命令参数
#[derive(Args, Debug)]
pub struct RefineArgs {
    /// Dataset(s); the first builds the project, later ones continue from the refined state
    #[arg(required = true, num_args = 1..)]
    pub datasets: Vec<PathBuf>,

    #[command(flatten)]
    pub options: RefineOptions,
}

/// refine-seq 子命令参数
#[derive(Args, Debug)]
pub struct RefineSeqArgs {
    /// Dataset files and/or directories
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Glob pattern(s) for datasets inside directories (comma separated)
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// Recurse into subdirectories
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,

    /// Leave each parameter group enabled after its step (cumulative refinement)
    #[arg(long, default_value_t = false)]
    pub keep_enabled: bool,

    #[command(flatten)]
    pub options: RefineOptions,
}
