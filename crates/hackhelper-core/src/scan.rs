//! 页面快照扫描主流程与并行调度
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::excerpt::{Excerpt, ExcerptScanner};
use crate::options::{ScanOptions, ScanStats};
use crate::types::OutputItem;

/// 单个文件的扫描结果：None 表示被跳过（过大、二进制或读取失败）
type FileResult = Option<Vec<Excerpt>>;

/// 扫描单个页面快照（整读）；二进制文件没有摘录
///
/// 查找在原始字节上进行，摘录偏移是文件内的字节偏移。
pub fn scan_file(path: &Path, scanner: &ExcerptScanner) -> Result<Vec<Excerpt>> {
    Ok(scan_page(path, scanner)?.unwrap_or_default())
}

/// None 表示文件看起来是二进制
fn scan_page(path: &Path, scanner: &ExcerptScanner) -> Result<Option<Vec<Excerpt>>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;

    if is_probably_binary(&buf) {
        debug!(path = %path.display(), "skipping binary file");
        return Ok(None);
    }
    Ok(Some(scanner.find_excerpts_in_bytes(&buf)))
}

/// 扫描文件或目录，并将命中摘录以 JSON 数组流式写入 `out`
/// 稳定性保证：
/// - 文件级：按文件名排序，输出顺序可复现
/// - 文件内：按出现顺序（从左到右）
pub fn scan_and_write(input: &Path, out: &mut dyn Write, opts: &ScanOptions) -> Result<ScanStats> {
    let scanner = Arc::new(ExcerptScanner::with_placeholder(&opts.marker, opts.margin, opts.placeholder)?);
    let files = collect_files(input, opts.recursive)?;
    let mut stats = ScanStats::default();

    let threads = opts.threads.unwrap_or_else(num_cpus::get);
    let mut writer = JsonArrayWriter::new(out)?;

    if threads > 1 && files.len() > 1 {
        scan_parallel(input, &files, &mut writer, opts, &scanner, &mut stats, threads)?;
    } else {
        for path in &files {
            let res = scan_one(path, opts.max_file_size, &scanner);
            emit(&mut writer, &mut stats, input, path, res)?;
        }
    }

    writer.finish()?;
    Ok(stats)
}

/// 收集待扫描文件；单个文件直接返回
fn collect_files(input: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        anyhow::bail!("input {} is neither a file nor a directory", input.display());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    // 按相对路径排序，确保输出顺序稳定
    files.sort();
    Ok(files)
}

fn scan_one(path: &Path, max_file_size: Option<u64>, scanner: &ExcerptScanner) -> FileResult {
    if let Some(max) = max_file_size {
        match std::fs::metadata(path) {
            Ok(md) if md.len() > max => return None,
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    match scan_page(path, scanner) {
        Ok(found) => found,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to scan file");
            None
        }
    }
}

fn emit(writer: &mut JsonArrayWriter<'_>, stats: &mut ScanStats, root: &Path, path: &Path, res: FileResult) -> Result<()> {
    let Some(found) = res else {
        stats.files_skipped += 1;
        return Ok(());
    };
    stats.files_scanned += 1;
    let name = display_name(root, path);
    for e in &found {
        stats.excerpts_found += 1;
        writer.push(&OutputItem { file: &name, offset: e.offset, excerpt: &e.text })?;
    }
    Ok(())
}

/// 输出中使用相对于输入根的路径
fn display_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).ok().filter(|p| !p.as_os_str().is_empty());
    match rel {
        Some(p) => p.display().to_string(),
        None => path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
    }
}

/// 并行调度：
/// - Rayon 线程池并行扫描，结果带文件序号经通道回传
/// - 当前线程按序号重排后流式写 JSON，输出与串行路径一致
fn scan_parallel(
    root: &Path,
    files: &[PathBuf],
    writer: &mut JsonArrayWriter<'_>,
    opts: &ScanOptions,
    scanner: &Arc<ExcerptScanner>,
    stats: &mut ScanStats,
    threads: usize,
) -> Result<()> {
    use crossbeam_channel as channel;
    use rayon::prelude::*;

    type Msg = (usize, FileResult);
    let (tx, rx) = channel::bounded::<Msg>(256);

    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().context("build rayon pool")?;
    let scanner = Arc::clone(scanner);
    let max_file_size = opts.max_file_size;
    let jobs: Vec<(usize, PathBuf)> = files.iter().cloned().enumerate().collect();

    let scan_thread = std::thread::spawn(move || {
        pool.install(|| {
            // 接收端关闭后停止派发剩余文件
            let _ = jobs
                .par_iter()
                .try_for_each(|(idx, path)| tx.send((*idx, scan_one(path, max_file_size, &scanner))));
        });
        // 线程结束时 Sender 被丢弃，Receiver 随之关闭
    });

    let mut next_idx = 0usize;
    let mut pending: BTreeMap<usize, FileResult> = BTreeMap::new();
    let mut written = Ok(());
    'recv: while let Ok((idx, res)) = rx.recv() {
        pending.insert(idx, res);
        while let Some(res) = pending.remove(&next_idx) {
            written = emit(writer, stats, root, &files[next_idx], res);
            if written.is_err() {
                break 'recv;
            }
            next_idx += 1;
        }
    }

    // 写出失败时先关闭接收端，让工作线程尽快退出，再回收它
    drop(rx);
    scan_thread.join().map_err(|_| anyhow::anyhow!("scan worker panicked"))?;
    written
}

/// 逐项写出 JSON 数组
struct JsonArrayWriter<'a> {
    out: &'a mut dyn Write,
    first: bool,
}

impl<'a> JsonArrayWriter<'a> {
    fn new(out: &'a mut dyn Write) -> Result<Self> {
        write!(out, "[")?;
        Ok(Self { out, first: true })
    }

    fn push(&mut self, item: &OutputItem<'_>) -> Result<()> {
        if !self.first {
            write!(self.out, ",")?;
        } else {
            self.first = false;
        }
        serde_json::to_writer(&mut *self.out, item)?;
        Ok(())
    }

    fn finish(self) -> Result<()> {
        write!(self.out, "]")?;
        Ok(())
    }
}

/// 判定缓冲区是否“明显是二进制”
/// - 包含 NUL 字节即认为二进制；
/// - 否则只看前 8KiB，可打印 ASCII（含 tab/CR/LF）与非 ASCII 字节合计低于 25% 则认为二进制。
fn is_probably_binary(buf: &[u8]) -> bool {
    if buf.is_empty() {
        return false;
    }
    let sample = &buf[..buf.len().min(8192)];
    if sample.contains(&0) {
        return true;
    }
    let texty = sample
        .iter()
        .filter(|&&b| matches!(b, 0x09 | 0x0A | 0x0D) || (0x20..=0x7E).contains(&b) || b >= 0x80)
        .count();
    (texty as f32 / sample.len() as f32) < 0.25
}
