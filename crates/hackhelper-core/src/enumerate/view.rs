//! 消费端视图：进度日志、结果列表与导出文件
use std::path::{Path, PathBuf};
use tracing::debug;

use super::protocol::JobEvent;
use crate::error::HarnessError;

/// 可下载的结果文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub contents: String,
}

impl Artifact {
    /// 写入目录，返回完整路径
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, HarnessError> {
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.contents)?;
        Ok(path)
    }
}

/// 单个任务的展示状态
#[derive(Debug, Clone)]
pub struct JobView {
    domain: String,
    progress: Vec<String>,
    results: Option<Vec<String>>,
}

impl JobView {
    pub fn new(domain: impl Into<String>) -> Self {
        Self { domain: domain.into(), progress: Vec::new(), results: None }
    }

    /// 应用一个事件；进度与错误按到达顺序追加到同一日志。
    /// 结果到达后任务结束，之后的事件忽略。返回任务是否已结束。
    pub fn apply(&mut self, event: JobEvent) -> bool {
        if self.is_finished() {
            debug!(event = event.name(), "ignoring event after result");
            return true;
        }
        match event {
            JobEvent::Progress(msg) | JobEvent::Error(msg) => self.progress.push(msg),
            JobEvent::Result(list) => self.results = Some(list),
        }
        self.is_finished()
    }

    pub fn is_finished(&self) -> bool {
        self.results.is_some()
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn progress(&self) -> &[String] {
        &self.progress
    }

    pub fn results(&self) -> Option<&[String]> {
        self.results.as_deref()
    }

    /// 纯文本渲染
    pub fn render(&self) -> String {
        let mut out = String::from("Progress\n");
        for line in &self.progress {
            out.push_str(line);
            out.push('\n');
        }
        match &self.results {
            None => out.push_str("Results\nWaiting for results\n"),
            Some(list) => {
                out.push_str(&format!("Results ({})\n", list.len()));
                for s in list {
                    out.push_str(s);
                    out.push('\n');
                }
            }
        }
        out
    }

    /// 结果文件 `<domain>.txt`，内容以换行连接；尚无结果时为 None
    pub fn artifact(&self) -> Option<Artifact> {
        self.results.as_ref().map(|list| Artifact { file_name: format!("{}.txt", self.domain), contents: list.join("\n") })
    }
}

/// 输出目录必须不存在（将被创建）或只包含隐藏条目
pub fn prepare_output_dir(dir: &Path) -> Result<(), HarnessError> {
    if dir.is_dir() {
        let visible = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .any(|e| !e.file_name().to_string_lossy().starts_with('.'));
        if visible {
            return Err(HarnessError::invalid(format!(
                "output directory {} already exists and is not empty",
                dir.display()
            )));
        }
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}
