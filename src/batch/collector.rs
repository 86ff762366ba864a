//! # 数据集收集器
//!
//! 根据输入路径和模式收集顺序精修的数据集列表。
//!
//! ## 功能
//! - 支持多个文件和目录输入
//! - glob 模式匹配（逗号分隔多模式）
//! - 可选递归目录搜索
//! - 目录内文件按路径排序，保证扫描顺序稳定
//!
//! ## 依赖关系
//! - 被 `commands/refine.rs` 调用
//! - 使用 `walkdir` 遍历目录，`glob` 匹配文件名

use crate::error::{Result, SuliError};

use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 默认数据集模式
pub const DEFAULT_PATTERN: &str = "*.json";

/// 文件收集器
pub struct FileCollector {
    /// 输入路径
    inputs: Vec<PathBuf>,
    /// 匹配模式列表
    patterns: Vec<Pattern>,
    /// 是否递归
    recursive: bool,
}

impl FileCollector {
    /// 创建新的文件收集器
    pub fn new(inputs: Vec<PathBuf>) -> Self {
        Self {
            inputs,
            patterns: Vec::new(),
            recursive: false,
        }
    }

    /// 设置匹配模式（逗号分隔的多模式）
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        self.patterns = pattern
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Pattern::new(s).map_err(|e| {
                    SuliError::InvalidArgument(format!("invalid pattern '{}': {}", s, e))
                })
            })
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// 设置是否递归搜索
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// 收集所有匹配的文件
    ///
    /// 显式给出的文件原样保留顺序；目录中的匹配文件排序后追加。
    pub fn collect(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for input in &self.inputs {
            if input.is_file() {
                files.push(input.clone());
                continue;
            }
            if !input.is_dir() {
                return Err(SuliError::FileNotFound {
                    path: input.display().to_string(),
                });
            }

            let max_depth = if self.recursive { usize::MAX } else { 1 };
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .max_depth(max_depth)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| self.matches_patterns(e.path()))
                .map(|e| e.path().to_path_buf())
                .collect();
            found.sort();
            files.extend(found);
        }

        if files.is_empty() {
            return Err(SuliError::NoFilesFound {
                pattern: self.describe(),
            });
        }
        Ok(files)
    }

    /// 检查文件是否匹配任一模式
    fn matches_patterns(&self, path: &Path) -> bool {
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };

        if self.patterns.is_empty() {
            return Pattern::new(DEFAULT_PATTERN)
                .map(|p| p.matches(filename))
                .unwrap_or(false);
        }
        self.patterns.iter().any(|p| p.matches(filename))
    }

    fn describe(&self) -> String {
        let patterns: Vec<&str> = self.patterns.iter().map(Pattern::as_str).collect();
        let patterns = if patterns.is_empty() {
            DEFAULT_PATTERN.to_string()
        } else {
            patterns.join(",")
        };
        let inputs: Vec<String> = self.inputs.iter().map(|p| p.display().to_string()).collect();
        format!("{} in {}", patterns, inputs.join(", "))
    }
}
