//! 子域名来源
//!
//! 内置来源都不依赖第三方在线服务：固定列表、离线数据导出（证书日志、归档 URL 列表等）、
//! 以及基于字典的解析爆破。
use anyhow::{Context, Result};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// 子域名来源
pub trait SubdomainSource: Send + Sync {
    /// 用于进度日志的来源名称
    fn name(&self) -> &str;
    /// 返回候选主机名（可以包含 URL，由调用方归一化）
    fn fetch(&self, domain: &str) -> Result<Vec<String>>;
}

/// 从 URL 中取出主机名：去掉协议、路径、用户信息与端口
pub fn extract_subdomain(url: &str) -> &str {
    let rest = url.rsplit("://").next().unwrap_or(url);
    let host = rest.split('/').next().unwrap_or(rest);
    let host = host.rsplit('@').next().unwrap_or(host);
    host.split(':').next().unwrap_or(host)
}

fn domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?i)[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)*$")
            .expect("valid domain regex")
    })
}

fn host_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9][A-Za-z0-9.-]*").expect("valid host token regex"))
}

/// 校验主机名语法（不解析）
pub fn is_valid_domain(domain: &str) -> bool {
    domain.len() <= 253 && domain_regex().is_match(domain)
}

/// 从任意文本中收集属于 `domain` 的主机名（含根域名本身），按出现顺序去重
///
/// 证书日志的 JSON 导出里多个名字以转义的 `\n` 相连，先还原为换行再切分。
pub fn harvest_hosts(text: &str, domain: &str) -> Vec<String> {
    let text = text.replace("\\n", "\n");
    let domain = domain.to_ascii_lowercase();
    let suffix = format!(".{domain}");
    let mut seen = std::collections::HashSet::new();
    host_token_regex()
        .find_iter(&text)
        .map(|m| m.as_str().trim_end_matches(['.', '-']).to_ascii_lowercase())
        .filter(|h| *h == domain || h.ends_with(&suffix))
        .filter(|h| seen.insert(h.clone()))
        .collect()
}

/// 固定列表
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    hosts: Vec<String>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, hosts: Vec<String>) -> Self {
        Self { name: name.into(), hosts }
    }
}

impl SubdomainSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, _domain: &str) -> Result<Vec<String>> {
        Ok(self.hosts.clone())
    }
}

/// 离线导出文件：从文件全文中收集主机名
#[derive(Debug, Clone)]
pub struct DumpFileSource {
    name: String,
    path: PathBuf,
}

impl DumpFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self { name: path.display().to_string(), path }
    }
}

impl SubdomainSource for DumpFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, domain: &str) -> Result<Vec<String>> {
        let bytes = std::fs::read(&self.path).with_context(|| format!("read {}", self.path.display()))?;
        Ok(harvest_hosts(&String::from_utf8_lossy(&bytes), domain))
    }
}

/// 主机名解析
pub trait Resolver: Send + Sync {
    fn resolves(&self, host: &str) -> bool;
}

/// DNS 解析器：按系统解析配置（/etc/resolv.conf）查询 A/AAAA 记录
///
/// 查询是异步的，自带一个小的 tokio 运行时；`resolves` 可在多个 rayon 线程上同时阻塞等待。
pub struct DnsResolver {
    runtime: tokio::runtime::Runtime,
    resolver: TokioResolver,
}

impl DnsResolver {
    pub fn from_system_conf() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("hackhelper-dns")
            .enable_all()
            .build()
            .context("build dns runtime")?;
        let resolver = {
            let _guard = runtime.enter();
            TokioResolver::builder(TokioConnectionProvider::default())
                .context("read system resolver configuration")?
                .build()
        };
        Ok(Self { runtime, resolver })
    }
}

impl Resolver for DnsResolver {
    fn resolves(&self, host: &str) -> bool {
        // 末尾加点，避免套用 search 域
        let fqdn = format!("{}.", host.trim_end_matches('.'));
        let found = self
            .runtime
            .block_on(self.resolver.lookup_ip(fqdn.as_str()))
            .is_ok_and(|ips| ips.iter().next().is_some());
        debug!(host, found, "resolved candidate");
        found
    }
}

/// 字典爆破：`<word>.<domain>` 能解析即视为存在
pub struct WordlistSource<R: Resolver> {
    words: Vec<String>,
    resolver: R,
    threads: Option<usize>,
}

impl<R: Resolver> WordlistSource<R> {
    pub fn new(words: Vec<String>, resolver: R, threads: Option<usize>) -> Self {
        Self { words, resolver, threads }
    }

    /// 每行一个词；空行与 `#` 注释行忽略
    pub fn from_file(path: &Path, resolver: R, threads: Option<usize>) -> Result<Self> {
        let txt = std::fs::read_to_string(path).with_context(|| format!("read wordlist {}", path.display()))?;
        let words = txt
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        Ok(Self::new(words, resolver, threads))
    }
}

impl<R: Resolver> SubdomainSource for WordlistSource<R> {
    fn name(&self) -> &str {
        "bruteforce"
    }

    fn fetch(&self, domain: &str) -> Result<Vec<String>> {
        use rayon::prelude::*;

        let threads = self.threads.unwrap_or_else(num_cpus::get).max(1);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().context("build rayon pool")?;
        debug!(words = self.words.len(), threads, "resolving candidates");

        let found = pool.install(|| {
            self.words
                .par_iter()
                .map(|w| format!("{}.{domain}", w.trim_matches('.')))
                .filter(|host| is_valid_domain(host) && self.resolver.resolves(host))
                .collect::<Vec<_>>()
        });
        Ok(found)
    }
}
