//! 枚举任务：依次查询各来源，推送进度，最后给出去重排序后的结果
use crossbeam_channel::{unbounded, Receiver};
use std::collections::BTreeSet;
use tracing::{info, warn};

use super::protocol::{decode_request, FindSubdomainsRequest, JobEvent};
use super::sources::{extract_subdomain, is_valid_domain, SubdomainSource};
use crate::error::HarnessError;

/// 依次查询来源并汇总
///
/// - 单个来源失败只推送一条错误事件，继续下一个来源；
/// - 只保留 `domain` 之下的主机名，根域名本身仅在 `include_domain` 时保留；
/// - 域名语法不合法时直接失败，不查询任何来源。
pub fn find_subdomains(
    domain: &str,
    sources: &[Box<dyn SubdomainSource>],
    include_domain: bool,
    emit: &mut dyn FnMut(JobEvent),
) -> Result<Vec<String>, HarnessError> {
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    if !is_valid_domain(&domain) {
        return Err(HarnessError::invalid(format!("{domain:?} is not a valid domain name")));
    }
    let suffix = format!(".{domain}");

    let mut found: BTreeSet<String> = BTreeSet::new();
    for source in sources {
        let name = source.name();
        emit(JobEvent::Progress(format!("Searching '{name}'")));
        match source.fetch(&domain) {
            Ok(hosts) => {
                let before = found.len();
                found.extend(
                    hosts
                        .iter()
                        .map(|h| extract_subdomain(h.trim()).trim_end_matches('.').to_ascii_lowercase())
                        .filter(|h| h.ends_with(&suffix) && is_valid_domain(h)),
                );
                let count = found.len() - before;
                info!(source = name, count, "source finished");
                emit(JobEvent::Progress(format!("Found {count} new subdomains")));
            }
            Err(e) => {
                warn!(source = name, error = %e, "source failed");
                emit(JobEvent::Error(format!("Failed to search '{name}': {e:#}")));
            }
        }
    }

    if include_domain {
        found.insert(domain.clone());
    }
    emit(JobEvent::Progress(format!("Found {} subdomains for {domain}", found.len())));
    Ok(found.into_iter().collect())
}

/// 一组来源加上汇总选项；可同步运行，也可在后台线程运行并以通道推送事件
pub struct EnumerationJob {
    sources: Vec<Box<dyn SubdomainSource>>,
    include_domain: bool,
}

impl EnumerationJob {
    pub fn new(sources: Vec<Box<dyn SubdomainSource>>, include_domain: bool) -> Self {
        Self { sources, include_domain }
    }

    /// 同步运行；成功时最后一个事件是唯一的结果事件，致命错误时以错误事件结束
    pub fn run(&self, request: &FindSubdomainsRequest, emit: &mut dyn FnMut(JobEvent)) {
        match find_subdomains(&request.domain, &self.sources, self.include_domain, emit) {
            Ok(subdomains) => emit(JobEvent::Result(subdomains)),
            Err(e) => emit(JobEvent::Error(format!("Subdomain finder encountered fatal error: {e}"))),
        }
    }

    /// 处理一行原始请求；请求无法解析时只推送一条错误事件
    pub fn run_line(&self, line: &str, emit: &mut dyn FnMut(JobEvent)) {
        match decode_request(line) {
            Ok(request) => self.run(&request, emit),
            Err(HarnessError::Protocol(msg)) => emit(JobEvent::Error(msg)),
            Err(e) => emit(JobEvent::Error(e.to_string())),
        }
    }

    /// 在后台线程运行；任务结束后通道关闭
    pub fn spawn(self, request: FindSubdomainsRequest) -> Receiver<JobEvent> {
        let (tx, rx) = unbounded();
        std::thread::spawn(move || {
            self.run(&request, &mut |event| {
                // 消费端已离开时不再推送
                let _ = tx.send(event);
            });
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::sources::StaticSource;

    struct Failing;

    impl SubdomainSource for Failing {
        fn name(&self) -> &str {
            "broken.example"
        }

        fn fetch(&self, _domain: &str) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("Status code 503")
        }
    }

    fn sources() -> Vec<Box<dyn SubdomainSource>> {
        vec![
            Box::new(StaticSource::new(
                "first",
                vec!["www.example.com".into(), "https://API.example.com/v2".into(), "example.com".into()],
            )),
            Box::new(Failing),
            Box::new(StaticSource::new(
                "second",
                vec!["www.example.com".into(), "cdn.example.com".into(), "other.org".into()],
            )),
        ]
    }

    fn collect(job: &EnumerationJob, domain: &str) -> Vec<JobEvent> {
        let mut events = Vec::new();
        job.run(&FindSubdomainsRequest { domain: domain.into() }, &mut |e| events.push(e));
        events
    }

    #[test]
    fn aggregates_sources_in_order() {
        let events = collect(&EnumerationJob::new(sources(), false), "example.com");
        assert_eq!(
            events,
            vec![
                JobEvent::Progress("Searching 'first'".into()),
                JobEvent::Progress("Found 2 new subdomains".into()),
                JobEvent::Progress("Searching 'broken.example'".into()),
                JobEvent::Error("Failed to search 'broken.example': Status code 503".into()),
                JobEvent::Progress("Searching 'second'".into()),
                JobEvent::Progress("Found 1 new subdomains".into()),
                JobEvent::Progress("Found 3 subdomains for example.com".into()),
                JobEvent::Result(vec!["api.example.com".into(), "cdn.example.com".into(), "www.example.com".into()]),
            ]
        );
    }

    #[test]
    fn include_domain_keeps_root() {
        let events = collect(&EnumerationJob::new(sources(), true), "Example.com.");
        let Some(JobEvent::Result(list)) = events.last() else { panic!("missing result") };
        assert_eq!(list.first().map(String::as_str), Some("api.example.com"));
        assert!(list.contains(&"example.com".to_string()));
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn invalid_domain_is_fatal() {
        let events = collect(&EnumerationJob::new(sources(), false), "not a domain");
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], JobEvent::Error(msg) if msg.starts_with("Subdomain finder encountered fatal error")));
    }

    #[test]
    fn missing_domain_line_reports_error_only() {
        let job = EnumerationJob::new(sources(), false);
        let mut events = Vec::new();
        job.run_line(r#"{"event":"find-subdomains","data":{"dom":"x"}}"#, &mut |e| events.push(e));
        assert_eq!(events, vec![JobEvent::Error("Missing 'domain' query parameter".into())]);
    }

    #[test]
    fn spawned_job_streams_until_result() {
        let rx = EnumerationJob::new(sources(), false).spawn(FindSubdomainsRequest { domain: "example.com".into() });
        let events: Vec<JobEvent> = rx.iter().collect();
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().is_terminal());
    }
}
