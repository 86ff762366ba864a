//! # 统一错误处理模块
//!
//! 定义 suli 的所有错误类型，使用 `thiserror` 派生。
//!
//! ## 错误分类
//! - 依赖缺失（引擎或解释器不可用）：致命
//! - 数值定义域错误（反三角函数越界）：显式传播
//! - 网格不一致（背景与谱线径向坐标超出容差）：致命
//! - 文件系统状态（草稿目录或日志缺失）：仅警告，不在此处
//! - 结果树搜索错误：可恢复
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// suli 统一错误类型
#[derive(Error, Debug)]
pub enum SuliError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // 数值错误
    // ─────────────────────────────────────────────────────────────
    #[error("Numeric domain error in {operation}: argument {value} is outside [-1, 1]")]
    DomainError { operation: String, value: f64 },

    #[error(
        "Background grid differs from the profile grid by {max_diff:e} at sample {index} \
         (tolerance {tolerance:e})"
    )]
    GridMismatch {
        max_diff: f64,
        index: usize,
        tolerance: f64,
    },

    #[error("Length mismatch for {what}: expected {expected} samples, found {found}")]
    LengthMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error(
        "Could not normalize background after {iterations} iterations \
         (scale {scale:e}, min residual {min_residual})"
    )]
    BackgroundNormalization {
        iterations: usize,
        scale: f64,
        min_residual: f64,
    },

    #[error("Baseline estimation failed: {0}")]
    BaselineError(String),

    #[error("Background-subtracted signal has no positive maximum (max = {max})")]
    DegenerateSignal { max: f64 },

    #[error("No radial samples inside q range [{low}, {high}] of {path}")]
    EmptySelection { low: f64, high: f64, path: String },

    #[error("No wavelength available for dataset: {path}")]
    MissingWavelength { path: String },

    // ─────────────────────────────────────────────────────────────
    // 结果树错误
    // ─────────────────────────────────────────────────────────────
    #[error("Not a valid dictionary: cannot search for '{key}' in a {found}")]
    InvalidTree { key: String, found: String },

    #[error("Key '{key}' not found in {context}")]
    KeyNotFound { key: String, context: String },

    // ─────────────────────────────────────────────────────────────
    // 外部引擎错误
    // ─────────────────────────────────────────────────────────────
    #[error("External command '{command}' not found in PATH")]
    CommandNotFound { command: String },

    #[error("External command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("GSAS-II engine unavailable via '{interpreter}': {reason}\nInstall GSAS-II and pass --gsas-path (or set GSASII_PATH)")]
    EngineUnavailable { interpreter: String, reason: String },

    #[error("Engine operation '{operation}' failed: {reason}")]
    EngineError { operation: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // 参数错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid range format: {0}")]
    InvalidRange(String),

    // ─────────────────────────────────────────────────────────────
    // CSV / 绘图错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Plotting failed: {0}")]
    PlotError(String),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("No matching files found with pattern: {pattern}")]
    NoFilesFound { pattern: String },

    #[error("{0}")]
    Other(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, SuliError>;

impl SuliError {
    /// 构造读文件错误
    pub fn read(path: &std::path::Path, source: std::io::Error) -> Self {
        SuliError::FileReadError {
            path: path.display().to_string(),
            source,
        }
    }

    /// 构造写文件错误
    pub fn write(path: &std::path::Path, source: std::io::Error) -> Self {
        SuliError::FileWriteError {
            path: path.display().to_string(),
            source,
        }
    }
}
