//! 配置文件加载（TOML）
//!
//! 所有字段均可省略，缺省时取内置默认值；`[[shortcuts]]` 在默认快捷键表之上追加或覆盖。
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::HarnessError;
use crate::excerpt::{ExcerptScanner, DEFAULT_MARGIN, DEFAULT_PLACEHOLDER, PROBE_MARKER};
use crate::harness::{Action, KeyChord, ShortcutTable};

/// 未显式指定时尝试读取的配置文件
pub const DEFAULT_CONFIG_PATH: &str = "./hackhelper.toml";

/// `[probe]` 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    pub marker: String,
    pub margin: usize,
    pub placeholder: char,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self { marker: PROBE_MARKER.to_string(), margin: DEFAULT_MARGIN, placeholder: DEFAULT_PLACEHOLDER }
    }
}

/// 单条快捷键绑定
#[derive(Debug, Clone, Deserialize)]
pub struct ShortcutEntry {
    pub chord: String,
    pub action: Action,
}

/// `[enumerate]` 段
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnumerateSection {
    /// 结果中保留根域名本身
    pub include_domain: bool,
    /// 爆破字典路径
    pub wordlist: Option<PathBuf>,
    /// 爆破解析线程数；None 表示自动
    pub threads: Option<usize>,
}

/// 顶层配置文件结构
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub probe: ProbeSection,
    pub shortcuts: Vec<ShortcutEntry>,
    pub enumerate: EnumerateSection,
}

impl HarnessConfig {
    /// 从 TOML 文本解析
    pub fn from_toml(txt: &str) -> Result<Self, HarnessError> {
        toml::from_str(txt).map_err(|e| HarnessError::Config(e.to_string()))
    }

    /// 按 `[probe]` 段构建摘录扫描器
    pub fn scanner(&self) -> Result<ExcerptScanner, HarnessError> {
        ExcerptScanner::with_placeholder(&self.probe.marker, self.probe.margin, self.probe.placeholder)
    }

    /// 默认快捷键表叠加配置中的绑定
    pub fn shortcut_table(&self) -> Result<ShortcutTable, HarnessError> {
        let mut table = ShortcutTable::default();
        for entry in &self.shortcuts {
            let chord: KeyChord = entry.chord.parse()?;
            table.bind(chord, entry.action);
        }
        Ok(table)
    }
}

/// 读取并解析配置文件
pub fn load_config(path: &Path) -> Result<HarnessConfig, HarnessError> {
    let txt = std::fs::read_to_string(path)
        .map_err(|e| HarnessError::Config(format!("read {}: {e}", path.display())))?;
    HarnessConfig::from_toml(&txt)
}

/// 显式路径必须可读；否则尝试默认路径，仍不存在则使用内置默认值
pub fn resolve_config(explicit: Option<&Path>) -> Result<HarnessConfig, HarnessError> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    let fallback = Path::new(DEFAULT_CONFIG_PATH);
    if fallback.is_file() {
        debug!(path = %fallback.display(), "loading default config file");
        return load_config(fallback);
    }
    Ok(HarnessConfig::default())
}
