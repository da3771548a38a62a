//! 扫描选项与统计信息（模块）

use crate::excerpt::{DEFAULT_MARGIN, DEFAULT_PLACEHOLDER, PROBE_MARKER};

/// 扫描选项
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// 探针标记
    pub marker: String,
    /// 标记两侧保留的字符数
    pub margin: usize,
    /// 首选占位符（与标记冲突时自动替换）
    pub placeholder: char,
    /// 最大文件大小（字节）；超过则跳过
    pub max_file_size: Option<u64>,
    /// 是否递归进入子目录（默认只扫描一层）
    pub recursive: bool,
    /// 线程数：None 表示自动（等于 CPU 核数）；Some(1) 走串行
    pub threads: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            marker: PROBE_MARKER.to_string(),
            margin: DEFAULT_MARGIN,
            placeholder: DEFAULT_PLACEHOLDER,
            max_file_size: None,
            recursive: false,
            threads: None,
        }
    }
}

/// 扫描统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub excerpts_found: usize,
}
