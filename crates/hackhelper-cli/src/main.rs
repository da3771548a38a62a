use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hackhelper_core::enumerate::{
    encode_event, prepare_output_dir, DnsResolver, DumpFileSource, EnumerationJob, FindSubdomainsRequest, JobEvent,
    JobView, SubdomainSource, WordlistSource,
};
use hackhelper_core::{
    resolve_config, scan_and_write, scan_file, ExcerptScanner, Focus, Harness, HarnessConfig, InjectOutcome, KeyChord, Outcome,
    ScanOptions, ScanReport,
};
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "hackhelper", version, about = "Injection probe verifier and subdomain enumeration helper")]
struct Cli {
    /// 配置文件（TOML），默认尝试 ./hackhelper.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 在保存的页面中查找残留的探针标记
    Scan {
        /// 页面文件或目录
        #[arg(long)]
        input: PathBuf,

        /// 输出 JSON 数组的文件；单个页面且未指定时打印可读报告，目录时写到标准输出
        #[arg(long)]
        output: Option<PathBuf>,

        /// 覆盖配置中的探针标记
        #[arg(long)]
        marker: Option<String>,

        /// 覆盖配置中的边距
        #[arg(long)]
        margin: Option<usize>,

        /// 线程数（"auto"=CPU 核心数）
        #[arg(long, default_value = "auto")]
        threads: String,

        /// 最大扫描文件大小（字节）
        #[arg(long)]
        max_file_size: Option<u64>,

        /// 递归进入子目录
        #[arg(long)]
        recursive: bool,
    },

    /// 把探针标记追加到给定的值后输出
    Inject {
        #[arg(default_value = "")]
        value: String,
    },

    /// 模拟一次快捷键：按快捷键表执行注入或扫描
    Key {
        /// 按键组合，例如 ctrl+alt+KeyF
        chord: String,

        /// 扫描动作使用的页面文件
        #[arg(long)]
        page: Option<PathBuf>,

        /// 当前输入框的值；不指定表示焦点不在输入框上
        #[arg(long)]
        value: Option<String>,
    },

    /// 枚举一个或多个域名的子域名
    Enumerate {
        #[arg(required = true)]
        domains: Vec<String>,

        /// 结果中保留根域名本身
        #[arg(long)]
        include_domain: bool,

        /// 结果文件目录（必须不存在或为空）
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// 离线数据导出文件（证书日志、归档 URL 列表等），可多次指定
        #[arg(long)]
        dump: Vec<PathBuf>,

        /// 爆破字典
        #[arg(long)]
        wordlist: Option<PathBuf>,

        /// 爆破解析线程数（"auto"=CPU 核心数）
        #[arg(long)]
        threads: Option<String>,

        /// 以事件流（每行一个 JSON）输出
        #[arg(long)]
        json: bool,
    },

    /// 从标准输入逐行读取枚举请求，事件逐行写到标准输出
    Companion {
        #[arg(long)]
        dump: Vec<PathBuf>,

        #[arg(long)]
        wordlist: Option<PathBuf>,

        #[arg(long)]
        include_domain: bool,
    },

    /// 打印当前探针标记
    Marker,
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();
    let cfg = resolve_config(cli.config.as_deref()).context("load config")?;

    match cli.command {
        Commands::Scan { input, output, marker, margin, threads, max_file_size, recursive } => {
            let opts = ScanOptions {
                marker: marker.unwrap_or_else(|| cfg.probe.marker.clone()),
                margin: margin.unwrap_or(cfg.probe.margin),
                placeholder: cfg.probe.placeholder,
                max_file_size,
                recursive,
                threads: parse_threads(&threads),
            };
            run_scan(&input, output.as_deref(), &opts)?;
        }
        Commands::Inject { value } => {
            let scanner = cfg.scanner()?;
            println!("{value}{}", scanner.marker());
        }
        Commands::Key { chord, page, value } => run_key(&cfg, &chord, page.as_deref(), value)?,
        Commands::Enumerate { domains, include_domain, output_dir, dump, wordlist, threads, json } => {
            let threads = threads.as_deref().map(parse_threads).unwrap_or(cfg.enumerate.threads);
            let wordlist = wordlist.or_else(|| cfg.enumerate.wordlist.clone());
            let include_domain = include_domain || cfg.enumerate.include_domain;
            let sources = SourceSpec { dump, wordlist, threads };
            run_enumerate(&domains, include_domain, output_dir.as_deref(), &sources, json)?;
        }
        Commands::Companion { dump, wordlist, include_domain } => {
            let sources = SourceSpec {
                dump,
                wordlist: wordlist.or_else(|| cfg.enumerate.wordlist.clone()),
                threads: cfg.enumerate.threads,
            };
            run_companion(&sources, include_domain || cfg.enumerate.include_domain)?;
        }
        Commands::Marker => println!("{}", cfg.probe.marker),
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 日志写到标准错误，标准输出留给数据
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).with_writer(io::stderr).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 解析线程参数
fn parse_threads(s: &str) -> Option<usize> {
    if s.eq_ignore_ascii_case("auto") {
        return None;
    }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Some(n),
        _ => None,
    }
}

fn run_scan(input: &Path, output: Option<&Path>, opts: &ScanOptions) -> Result<()> {
    info!(?input, ?output, "starting scan");

    // 单个页面且未指定输出文件：打印可读报告
    if input.is_file() && output.is_none() {
        let scanner = ExcerptScanner::with_placeholder(&opts.marker, opts.margin, opts.placeholder)?;
        let found = scan_file(input, &scanner)?;
        let report = ScanReport { excerpts: found.into_iter().map(|e| e.text).collect() };
        print_report(&report);
        return Ok(());
    }

    let stats = match output {
        Some(path) => {
            let mut out = BufWriter::new(File::create(path).context("create output file")?);
            let stats = scan_and_write(input, &mut out, opts).context("scan and write failed")?;
            out.flush()?;
            stats
        }
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let stats = scan_and_write(input, &mut out, opts).context("scan and write failed")?;
            writeln!(out)?;
            out.flush()?;
            stats
        }
    };

    info!(
        files_scanned = stats.files_scanned,
        files_skipped = stats.files_skipped,
        excerpts_found = stats.excerpts_found,
        "scan finished"
    );
    Ok(())
}

fn print_report(report: &ScanReport) {
    for line in report.lines() {
        if line.starts_with("Found") {
            warn!("{line}");
        } else {
            info!("{line}");
        }
    }
}

fn run_key(cfg: &HarnessConfig, chord: &str, page: Option<&Path>, value: Option<String>) -> Result<()> {
    let harness = Harness::new(cfg.scanner()?, cfg.shortcut_table()?);
    let event: KeyChord = chord.parse()?;
    let page_text = match page {
        Some(p) => String::from_utf8_lossy(&std::fs::read(p).with_context(|| format!("read {}", p.display()))?)
            .into_owned(),
        None => String::new(),
    };
    let mut focus = match value {
        Some(value) => Focus::Input { value },
        None => Focus::Other,
    };

    match harness.handle(&event, &mut focus, &page_text) {
        None => info!(%event, "no action bound to this shortcut"),
        Some(Outcome::Injected(InjectOutcome::Injected)) => {
            if let Focus::Input { value } = &focus {
                println!("{value}");
            }
        }
        Some(Outcome::Injected(InjectOutcome::NotAnInput)) => info!("Not input"),
        Some(Outcome::Scanned(report)) => print_report(&report),
    }
    Ok(())
}

/// 枚举来源的命令行描述；每个任务单独构建一组来源
struct SourceSpec {
    dump: Vec<PathBuf>,
    wordlist: Option<PathBuf>,
    threads: Option<usize>,
}

impl SourceSpec {
    fn build(&self) -> Result<Vec<Box<dyn SubdomainSource>>> {
        let mut sources: Vec<Box<dyn SubdomainSource>> = Vec::new();
        for path in &self.dump {
            sources.push(Box::new(DumpFileSource::new(path.clone())));
        }
        if let Some(path) = &self.wordlist {
            sources.push(Box::new(WordlistSource::from_file(path, DnsResolver::from_system_conf()?, self.threads)?));
        }
        if sources.is_empty() {
            anyhow::bail!("no subdomain sources configured; pass --dump and/or --wordlist");
        }
        Ok(sources)
    }
}

fn run_enumerate(
    domains: &[String],
    include_domain: bool,
    output_dir: Option<&Path>,
    sources: &SourceSpec,
    json: bool,
) -> Result<()> {
    if let Some(dir) = output_dir {
        prepare_output_dir(dir)?;
    }

    let mut total = 0usize;
    for domain in domains {
        info!("Searching for subdomains of '{domain}'");
        let job = EnumerationJob::new(sources.build()?, include_domain);
        let rx = job.spawn(FindSubdomainsRequest { domain: domain.clone() });

        let mut view = JobView::new(domain.clone());
        for event in rx.iter() {
            if json {
                println!("{}", encode_event(&event)?);
            } else {
                match &event {
                    JobEvent::Progress(msg) => info!("{msg}"),
                    JobEvent::Error(msg) => error!("{msg}"),
                    JobEvent::Result(_) => {}
                }
            }
            if view.apply(event) {
                break;
            }
        }

        let Some(artifact) = view.artifact() else {
            warn!(domain = domain.as_str(), "enumeration finished without a result");
            continue;
        };
        let count = view.results().map(|r| r.len()).unwrap_or(0);
        total += count;

        match output_dir {
            Some(dir) => {
                let path = artifact.write_to(dir)?;
                info!("Saved {count} subdomains to '{}'", path.display());
            }
            None if !json => {
                println!("Found {count} subdomains for {domain}:");
                for s in view.results().unwrap_or_default() {
                    println!("  - {s}");
                }
            }
            None => {}
        }
    }

    info!("Finished enumerating {} domains and found {total} subdomains in total", domains.len());
    Ok(())
}

/// 标准输入/输出上的持久双向通道：一行一个请求，事件按发出顺序逐行写回
fn run_companion(sources: &SourceSpec, include_domain: bool) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let job = EnumerationJob::new(sources.build()?, include_domain);
        let mut write_err: Option<io::Error> = None;
        job.run_line(&line, &mut |event| {
            if write_err.is_some() {
                return;
            }
            let res = encode_event(&event)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
                .and_then(|l| writeln!(out, "{l}").and_then(|_| out.flush()));
            if let Err(e) = res {
                write_err = Some(e);
            }
        });
        if let Some(e) = write_err {
            return Err(e).context("write event");
        }
    }
    Ok(())
}
