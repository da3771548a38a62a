//! 注入探针辅助库
//!
//! 设计要点：
//! - 页面内容一律视为扁平文本，不做 HTML 结构解析；只检测此前注入的探针标记是否原样残留。
//! - 摘录扫描为纯函数：调用方的文本不会被修改，每次调用各自持有工作副本，可并发调用。
//! - 文件扫描输出为流式 JSON 数组，文件按名称排序、文件内按出现顺序，保证可复现。
//! - 子域名枚举任务以事件流报告进度，结果事件只出现一次。

mod config;
mod error;
mod excerpt;
mod harness;
mod options;
mod scan;
mod types;

pub mod enumerate;

pub use config::{
    load_config, resolve_config, EnumerateSection, HarnessConfig, ProbeSection, ShortcutEntry, DEFAULT_CONFIG_PATH,
};
pub use error::HarnessError;
pub use excerpt::{
    extract_matching_excerpts, Excerpt, ExcerptScanner, DEFAULT_MARGIN, DEFAULT_PLACEHOLDER, PROBE_MARKER,
};
pub use harness::{inject, Action, Focus, Harness, InjectOutcome, KeyChord, Outcome, ScanReport, ShortcutTable};
pub use options::{ScanOptions, ScanStats};
pub use scan::{scan_and_write, scan_file};
pub use types::OutputItem;
